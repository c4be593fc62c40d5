//! Errors raised while driving the JaCoCo command-line tool.

/// JaCoCo adapter errors.
#[derive(Debug, thiserror::Error)]
pub enum JacocoError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{command} timed out after {timeout_secs} seconds")]
    Timeout { command: String, timeout_secs: u64 },

    #[error("{command} exited with code {exit_code}: {stderr}")]
    Failed {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("malformed coverage csv at line {line}: {detail}")]
    Csv { line: usize, detail: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for JaCoCo adapter operations.
pub type Result<T> = std::result::Result<T, JacocoError>;
