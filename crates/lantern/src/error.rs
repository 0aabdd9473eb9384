//
// error.rs
//
// Fault taxonomy for metadata acquisition.
//

use thiserror::Error;

/// Classified failure of a metadata acquisition step.
///
/// Repositories catch every variant internally and keep serving the prior
/// snapshot; the only place that raises instead of swallowing is the bridge's
/// output extraction.
#[derive(Debug, Error)]
pub enum Fault {
    /// Subprocess could not be spawned, exited non-zero, timed out, or
    /// produced more output than the configured cap.
    #[error("process fault: {0}")]
    Process(String),

    /// The application raised an uncaught error inside the executed
    /// fragment; the message was recovered from the error marker.
    #[error("runtime fault: {0}")]
    Runtime(String),

    /// Structured output did not match the expected schema.
    #[error("parse fault: {0}")]
    Parse(String),

    /// An expected directory or file was missing or unreadable.
    #[error("filesystem fault: {0}")]
    Filesystem(String),
}

impl From<serde_json::Error> for Fault {
    fn from(err: serde_json::Error) -> Self {
        Fault::Parse(err.to_string())
    }
}

impl From<std::io::Error> for Fault {
    fn from(err: std::io::Error) -> Self {
        Fault::Filesystem(err.to_string())
    }
}
