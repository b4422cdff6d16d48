//! Error types for the OCR pipeline.
//!
//! [`PipelineError`] is fatal: no document can be produced. [`PageError`]
//! belongs to a single page and ends up inline in that page's section of the
//! output, so the rest of the document still completes.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{name} not found; install it or point {hint} at it")]
    ToolNotFound { name: String, hint: String },

    /// An explicit override pointed somewhere that is not an executable.
    #[error("{name} override is not an executable: {}", .path.display())]
    ToolOverrideInvalid { name: String, path: PathBuf },

    #[error("cannot start {}: {source}", .program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("rasterizer exited with {}: {stderr}", exit_code_display(.code))]
    Rasterization { code: Option<i32>, stderr: String },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

/// Why one page produced no text.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PageError {
    #[error("cannot start OCR engine: {0}")]
    Spawn(String),

    /// The engine exited non-zero; carries its stderr.
    #[error("{}", failed_message(.code, .stderr))]
    Failed { code: Option<i32>, stderr: String },

    #[error("OCR engine timed out after {0}s")]
    TimedOut(u64),

    #[error("worker panicked: {0}")]
    Panicked(String),

    #[error("no result was recorded for this page")]
    Missing,
}

fn exit_code_display(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("exit code {c}"),
        None => "no exit code (killed by signal)".to_string(),
    }
}

fn failed_message(code: &Option<i32>, stderr: &str) -> String {
    let stderr = stderr.trim();
    if stderr.is_empty() {
        format!("OCR engine failed with {}", exit_code_display(code))
    } else {
        stderr.to_string()
    }
}
