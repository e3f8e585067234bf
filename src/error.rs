//! Error kinds reported to the user

use std::path::PathBuf;
use thiserror::Error;

use crate::types::{CropRect, Size};

/// Number of log lines quoted in a tool failure message
const LOG_TAIL_LINES: usize = 12;

#[derive(Error, Debug)]
pub enum CropperError {
    #[error("File not found or unreadable: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("Unsupported video format: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    #[error("{0} is required but was not found on PATH. Install ffmpeg and try again.")]
    ToolMissing(String),

    #[error("{tool} exited with code {code:?}:\n{}", tail_lines(.log, LOG_TAIL_LINES))]
    ToolFailed {
        tool: String,
        code: Option<i32>,
        log: String,
    },

    #[error("{tool} finished but produced no output at {}", .path.display())]
    MissingOutput { tool: String, path: PathBuf },

    #[error("Crop {rect} is empty or does not fit inside the {frame} frame")]
    DegenerateCrop { rect: CropRect, frame: Size },

    #[error("An export is already running; wait for it or cancel it first")]
    ExportInProgress,

    #[error("Export cancelled by user")]
    Cancelled,

    #[error("Could not read video metadata: {0}")]
    Probe(String),
}

/// Keep only the last `count` non-empty lines of a tool log
pub fn tail_lines(log: &str, count: usize) -> String {
    let lines: Vec<&str> = log.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(count);
    lines[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tail_lines_keeps_end() {
        let log = "a\n\nb\nc\nd\n";
        assert_eq!(tail_lines(log, 2), "c\nd");
        assert_eq!(tail_lines(log, 10), "a\nb\nc\nd");
    }

    #[test]
    fn test_tool_failed_message_quotes_log() {
        let err = CropperError::ToolFailed {
            tool: "ffmpeg".to_string(),
            code: Some(1),
            log: "Invalid crop size\n".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("ffmpeg exited with code Some(1)"));
        assert!(msg.contains("Invalid crop size"));
    }
}
