//! Call stack capture for recorded statements.

use std::backtrace::{Backtrace, BacktraceStatus};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::config::PanelConfig;

/// Frames from this crate's own sources are never reported.
const LIBRARY_MODULE: &str = concat!(env!("CARGO_CRATE_NAME"), "::");
const LIBRARY_SRC: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/src");
const UNKNOWN_SYMBOL: &str = "<unknown>";

// Full-format frames read `  12:     0x55d0c1a3b2c1 - app::main::h0123456789abcdef`.
static SYMBOL_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*\d+:\s+(?:0x[0-9a-fA-F]+\s+-\s+)?(.+?)\s*$").unwrap());
static LOCATION_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*at (.+?):(\d+)(?::\d+)?$").unwrap());
static SYMBOL_HASH: Lazy<Regex> = Lazy::new(|| Regex::new(r"::h[0-9a-f]{16}$").unwrap());

/// One retained frame of a captured call stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StackFrame {
    pub path: String,
    pub line: u32,
    pub function: String,
    /// The trimmed source line, empty when the file cannot be read.
    pub source: String,
}

impl StackFrame {
    fn retrieval_failure(reason: &str) -> Self {
        Self {
            path: String::new(),
            line: 0,
            function: "Error retrieving stack".to_string(),
            source: format!("Could not retrieve stack. {reason}"),
        }
    }
}

/// Capture the current call stack, outermost frame first.
///
/// Returns an empty stack when capture is disabled, and a single placeholder frame
/// when the platform cannot produce one.
pub fn capture(config: &PanelConfig) -> Vec<StackFrame> {
    if !config.capture_stack_traces {
        return Vec::new();
    }

    let backtrace = Backtrace::force_capture();
    match backtrace.status() {
        BacktraceStatus::Captured => from_rendered(&format!("{backtrace:#}"), config),
        status => {
            tracing::debug!(?status, "stack capture unavailable");
            vec![StackFrame::retrieval_failure(
                "Backtraces are not supported on this platform.",
            )]
        }
    }
}

/// Build the retained frames from a rendered backtrace.
fn from_rendered(rendered: &str, config: &PanelConfig) -> Vec<StackFrame> {
    let mut frames = parse(rendered);
    if frames.is_empty() {
        tracing::debug!("captured backtrace has no recognisable frames");
        return vec![StackFrame::retrieval_failure(
            "The captured backtrace could not be read.",
        )];
    }
    frames.reverse();
    tidy(frames, config)
}

#[derive(Debug)]
struct RawFrame {
    function: String,
    path: Option<PathBuf>,
    line: u32,
}

/// Parse the alternate `Display` form of a std backtrace, innermost frame first.
fn parse(rendered: &str) -> Vec<RawFrame> {
    let mut frames: Vec<RawFrame> = Vec::new();
    for line in rendered.lines() {
        if let Some(caps) = SYMBOL_LINE.captures(line) {
            frames.push(RawFrame {
                function: SYMBOL_HASH.replace(&caps[1], "").into_owned(),
                path: None,
                line: 0,
            });
        } else if let Some(caps) = LOCATION_LINE.captures(line) {
            if let Some(frame) = frames.last_mut().filter(|f| f.path.is_none()) {
                frame.path = Some(PathBuf::from(&caps[1]));
                frame.line = caps[2].parse().unwrap_or(0);
            }
        }
    }
    frames
}

fn tidy(frames: Vec<RawFrame>, config: &PanelConfig) -> Vec<StackFrame> {
    let library_src = resolve(Path::new(LIBRARY_SRC));
    let mut sources = SourceCache::default();

    frames
        .into_iter()
        .filter_map(|frame| {
            if frame.function == UNKNOWN_SYMBOL {
                return None;
            }
            if config
                .hidden_frame_markers
                .iter()
                .any(|marker| frame.function.contains(marker.as_str()))
            {
                return None;
            }

            // Trait impls render as `<Type as Trait>::method`.
            let function = frame.function.trim_start_matches('<');
            let path = frame.path.as_deref();
            if config.hide_framework_frames && is_framework(function, path, config) {
                return None;
            }
            let resolved = path.map(resolve);
            if function.starts_with(LIBRARY_MODULE)
                || resolved.as_ref().is_some_and(|p| p.starts_with(&library_src))
            {
                return None;
            }

            // Builds without line tables still name their frames.
            let source = resolved
                .as_ref()
                .map(|p| sources.line(p, frame.line))
                .unwrap_or_default();
            Some(StackFrame {
                path: path.map(|p| p.display().to_string()).unwrap_or_default(),
                line: frame.line,
                function: frame.function,
                source,
            })
        })
        .collect()
}

fn is_framework(function: &str, path: Option<&Path>, config: &PanelConfig) -> bool {
    config
        .framework_modules
        .iter()
        .any(|module| function.starts_with(module.as_str()))
        || path.is_some_and(|path| {
            config
                .framework_paths
                .iter()
                .any(|prefix| path.starts_with(prefix))
        })
}

fn resolve(path: &Path) -> PathBuf {
    if let Ok(real) = std::fs::canonicalize(path) {
        return real;
    }
    if path.is_relative() {
        if let Ok(cwd) = std::env::current_dir() {
            return cwd.join(path);
        }
    }
    path.to_path_buf()
}

#[derive(Default)]
struct SourceCache {
    files: HashMap<PathBuf, Option<Vec<String>>>,
}

impl SourceCache {
    fn line(&mut self, path: &Path, line: u32) -> String {
        let lines = self.files.entry(path.to_path_buf()).or_insert_with(|| {
            std::fs::read_to_string(path)
                .ok()
                .map(|text| text.lines().map(str::to_string).collect())
        });

        lines
            .as_ref()
            .and_then(|lines| lines.get((line as usize).checked_sub(1)?))
            .map(|text| text.trim().to_string())
            .unwrap_or_default()
    }
}
