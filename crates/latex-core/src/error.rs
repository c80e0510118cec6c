//! Error types for `latex-core`.

use thiserror::Error;

#[derive(Debug, Error)]
/// Errors produced by the fallible parts of the `latex-core` API.
///
/// Analysis results (syntax problems in the LaTeX source) are never reported through this type;
/// they are attached to lines as [`SyntaxError`](crate::overlay::SyntaxError) overlays.
pub enum LatexCoreError {
    #[error("line {index} is out of range (document has {line_count} lines)")]
    /// A line index did not address an existing line.
    LineOutOfRange {
        /// The requested line index.
        index: usize,
        /// The number of lines in the buffer at the time of the request.
        line_count: usize,
    },

    #[error("invalid command signature '{signature}': {reason}")]
    /// A command signature string could not be parsed.
    InvalidSignature {
        /// The signature string as given.
        signature: String,
        /// What was wrong with it.
        reason: &'static str,
    },

    #[error("invalid pattern: {0}")]
    /// A configured regular expression failed to compile.
    InvalidPattern(#[from] regex::Error),

    #[error("failed to spawn the syntax checker worker: {0}")]
    /// The checker thread could not be started.
    WorkerSpawn(#[from] std::io::Error),
}

/// Convenience alias for results returned by `latex-core`.
pub type Result<T> = std::result::Result<T, LatexCoreError>;
