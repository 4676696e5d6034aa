use thiserror::Error;

use parley_shared::ProtocolError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The durable log could not be written. An acknowledged append must
    /// survive a crash, so this is fatal to the process.
    #[error("backlog write failed: {0}")]
    BacklogWrite(std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TLS configuration error: {0}")]
    TlsConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// Errors that must take the whole process down, not just one session.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ServerError::BacklogWrite(_))
    }
}
