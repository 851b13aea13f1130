use thiserror::Error;

/// Error taxonomy for the realtime engine and its REST collaborators.
///
/// The session itself never returns these across its public API for
/// expected failure modes (closed socket, send failure, fetch rejection);
/// those are absorbed into booleans, empty results, and the debug sink.
/// `LiveError` shows up at configuration and HTTP boundaries.
#[derive(Error, Debug)]
pub enum LiveError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Endpoint error: {0}")]
    Endpoint(String),

    #[error("Socket error: {0}")]
    Socket(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Timeout error: operation timed out after {seconds} seconds")]
    Timeout { seconds: u64 },
}

impl LiveError {
    /// Whether a retry could plausibly succeed without operator action
    pub fn is_recoverable(&self) -> bool {
        match self {
            LiveError::Socket(_) => true,
            LiveError::Http(_) => true,
            LiveError::Timeout { .. } => true,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for LiveError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LiveError::Timeout { seconds: 0 }
        } else {
            LiveError::Http(err.to_string())
        }
    }
}

pub type LiveResult<T> = Result<T, LiveError>;
