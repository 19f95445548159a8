//! Per-thread recording mode.
//!
//! Cursors created while the mode is [`RecordingMode::RaiseOnQuery`] refuse every
//! operation with [`QueryTriggered`](crate::QueryTriggered). Presentation code wraps
//! work that must not touch the database (template rendering, for instance) in
//! [`forbid_queries`] to surface hidden queries as errors.

use std::cell::Cell;

/// How cursors created on the current thread behave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordingMode {
    /// Statements run and are recorded.
    #[default]
    Observe,
    /// Any cursor operation fails immediately.
    RaiseOnQuery,
}

thread_local! {
    static MODE: Cell<RecordingMode> = const { Cell::new(RecordingMode::Observe) };
}

/// The current thread's recording mode.
pub fn mode() -> RecordingMode {
    MODE.with(Cell::get)
}

/// Set the current thread's recording mode, returning the previous one.
pub fn set_mode(mode: RecordingMode) -> RecordingMode {
    MODE.with(|cell| cell.replace(mode))
}

/// Toggle between observing (`true`) and raising on queries (`false`).
pub fn set_enabled(enabled: bool) {
    set_mode(if enabled {
        RecordingMode::Observe
    } else {
        RecordingMode::RaiseOnQuery
    });
}

pub fn is_enabled() -> bool {
    mode() == RecordingMode::Observe
}

/// Forbids queries on the current thread until dropped.
///
/// Guards nest; dropping one restores whatever mode was active when it was created.
#[derive(Debug)]
#[must_use = "queries are allowed again as soon as the guard is dropped"]
pub struct QueryBlocker {
    previous: RecordingMode,
}

impl QueryBlocker {
    pub fn new() -> Self {
        Self {
            previous: set_mode(RecordingMode::RaiseOnQuery),
        }
    }
}

impl Default for QueryBlocker {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for QueryBlocker {
    fn drop(&mut self) {
        set_mode(self.previous);
    }
}

/// Run `f` with queries forbidden on the current thread.
///
/// The previous mode is restored when `f` returns or unwinds.
pub fn forbid_queries<T>(f: impl FnOnce() -> T) -> T {
    let _blocker = QueryBlocker::new();
    f()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_mode_observes() {
        std::thread::spawn(|| assert_eq!(mode(), RecordingMode::Observe))
            .join()
            .unwrap();
    }

    #[test]
    fn test_set_enabled() {
        set_enabled(false);
        assert!(!is_enabled());
        set_enabled(true);
        assert!(is_enabled());
    }

    #[test]
    fn test_nested_blockers_restore_in_order() {
        assert!(is_enabled());
        {
            let _outer = QueryBlocker::new();
            assert_eq!(mode(), RecordingMode::RaiseOnQuery);
            {
                let _inner = QueryBlocker::new();
                assert_eq!(mode(), RecordingMode::RaiseOnQuery);
            }
            assert_eq!(mode(), RecordingMode::RaiseOnQuery);
        }
        assert_eq!(mode(), RecordingMode::Observe);
    }

    #[test]
    fn test_forbid_queries_restores_after_panic() {
        let result = std::panic::catch_unwind(|| {
            forbid_queries(|| panic!("template blew up"));
        });
        assert!(result.is_err());
        assert_eq!(mode(), RecordingMode::Observe);
    }

    #[test]
    fn test_mode_is_per_thread() {
        let _blocker = QueryBlocker::new();
        let other = std::thread::spawn(mode).join().unwrap();
        assert_eq!(other, RecordingMode::Observe);
        assert_eq!(mode(), RecordingMode::RaiseOnQuery);
    }
}
