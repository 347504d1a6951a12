//! Error types for driving a watched process

use std::path::PathBuf;

/// Result alias for harness operations
pub type Result<T> = std::result::Result<T, HarnessError>;

/// Everything that can go wrong while a scenario runs
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    /// The output stream ended while a line was awaited
    #[error("Line reader closed.")]
    LineReaderClosed,

    /// An output line did not contain the expected fragment
    #[error("Expected '{actual}' to include '{expected}'.")]
    Mismatch { expected: String, actual: String },

    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// A variant's setup command exited unsuccessfully
    #[error("setup `{command}` failed: {status}")]
    Setup { command: String, status: String },

    /// Signalling or reaping the process group failed
    #[error("failed to terminate process {pid}: {reason}")]
    Terminate { pid: u32, reason: String },

    #[error("scenario timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("shutdown requested")]
    Interrupted,

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid scenario: {0}")]
    Config(String),
}

impl HarnessError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_reader_closed_message() {
        assert_eq!(HarnessError::LineReaderClosed.to_string(), "Line reader closed.");
    }

    #[test]
    fn test_mismatch_names_both_sides() {
        let err = HarnessError::Mismatch {
            expected: "1 passing".to_string(),
            actual: "  0 passing (3ms)".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Expected '  0 passing (3ms)' to include '1 passing'."
        );
    }

    #[test]
    fn test_io_error_includes_path() {
        let err = HarnessError::io(
            "/tmp/nope/new.ts",
            std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        );
        assert!(err.to_string().starts_with("/tmp/nope/new.ts:"));
    }
}
