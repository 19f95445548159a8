//! Configuration for query recording.

use std::path::PathBuf;
use std::time::Duration;

/// Configuration options read by the recording core at every statement.
///
/// # Example
///
/// ```rust
/// use sql_debug_panel::PanelConfig;
/// use std::time::Duration;
///
/// let config = PanelConfig::default()
///     .with_stack_traces(false)
///     .with_slow_query_threshold(Duration::from_millis(100));
/// ```
#[derive(Debug, Clone)]
pub struct PanelConfig {
    /// Whether to capture a call stack for every recorded statement.
    /// Default: `true`
    pub capture_stack_traces: bool,

    /// Whether frames belonging to the toolchain or host framework are dropped
    /// from captured stacks.
    /// Default: `true`
    pub hide_framework_frames: bool,

    /// Source path prefixes treated as framework code.
    /// Default: `/rustc` (standard library sources as recorded in debug info)
    pub framework_paths: Vec<PathBuf>,

    /// Function path prefixes treated as framework code.
    /// Default: `std::`, `core::`, `alloc::`, `test::`
    pub framework_modules: Vec<String>,

    /// Frames whose function name contains any of these markers are always dropped.
    /// Default: `__traceback_hide__`
    pub hidden_frame_markers: Vec<String>,

    /// Statements slower than this are flagged `is_slow` and logged at WARN.
    /// Default: 500ms
    pub slow_query_threshold: Duration,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            capture_stack_traces: true,
            hide_framework_frames: true,
            framework_paths: vec![PathBuf::from("/rustc")],
            framework_modules: ["std::", "core::", "alloc::", "test::"]
                .into_iter()
                .map(String::from)
                .collect(),
            hidden_frame_markers: vec!["__traceback_hide__".to_string()],
            slow_query_threshold: Duration::from_millis(500),
        }
    }
}

impl PanelConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable stack capture for recorded statements.
    pub fn with_stack_traces(mut self, enabled: bool) -> Self {
        self.capture_stack_traces = enabled;
        self
    }

    /// Enable or disable hiding of framework frames.
    pub fn with_framework_frames_hidden(mut self, hidden: bool) -> Self {
        self.hide_framework_frames = hidden;
        self
    }

    /// Treat sources under `path` as framework code.
    ///
    /// Useful to keep a web framework's dispatch frames out of captured stacks.
    pub fn with_framework_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.framework_paths.push(path.into());
        self
    }

    /// Treat functions under the module prefix `module` (e.g. `"axum::"`) as framework code.
    pub fn with_framework_module(mut self, module: impl Into<String>) -> Self {
        self.framework_modules.push(module.into());
        self
    }

    /// Drop frames whose function name contains `marker`.
    pub fn with_hidden_frame_marker(mut self, marker: impl Into<String>) -> Self {
        self.hidden_frame_markers.push(marker.into());
        self
    }

    /// Set the threshold for slow query flagging.
    pub fn with_slow_query_threshold(mut self, threshold: Duration) -> Self {
        self.slow_query_threshold = threshold;
        self
    }

    /// Create a configuration that keeps every frame, useful when debugging the host framework.
    pub fn development() -> Self {
        Self {
            hide_framework_frames: false,
            slow_query_threshold: Duration::from_millis(100),
            ..Self::default()
        }
    }

    /// Create a configuration with minimal per-statement overhead (no stack capture).
    pub fn lightweight() -> Self {
        Self {
            capture_stack_traces: false,
            ..Self::default()
        }
    }
}
