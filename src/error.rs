use thiserror::Error;

/// Server-side marker for a transaction the database rolled back.
pub const TRANSACTION_ABORTED_MARKER: &str = "transaction is aborted";

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Endpoint not found: {url}. Please check the API URL and port.")]
    EndpointNotFound { url: String },

    #[error("Server transaction error: {0}")]
    TransientServer(String),

    #[error("Database schema error: {0}")]
    Schema(String),

    #[error("Server returned HTTP {status}: {message}")]
    Server { status: u16, message: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Remote log cleanup still running after {waited_secs}s")]
    CleaningTimeout { waited_secs: u64 },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),
}

impl SyncError {
    /// Errors the server is expected to recover from after a short pause.
    pub fn is_transient(&self) -> bool {
        matches!(self, SyncError::TransientServer(_))
            || self.to_string().contains(TRANSACTION_ABORTED_MARKER)
    }

    /// Errors that no amount of retrying will fix.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SyncError::Schema(_) | SyncError::Validation(_))
    }

    /// Classify an error message returned alongside a failed inventory post.
    pub fn from_server_message(status: u16, message: String) -> Self {
        if message.contains("column") && message.contains("does not exist") {
            SyncError::Schema(message)
        } else if status == 500 && message.contains(TRANSACTION_ABORTED_MARKER) {
            SyncError::TransientServer(message)
        } else {
            SyncError::Server { status, message }
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SyncError::Transport(format!("request timed out: {}", err))
        } else if err.is_connect() {
            SyncError::Transport(format!(
                "connection error: {}. Please check if the server is running and the port is correct.",
                err
            ))
        } else {
            SyncError::Transport(err.to_string())
        }
    }
}

impl From<serde_yaml::Error> for SyncError {
    fn from(err: serde_yaml::Error) -> Self {
        SyncError::Config(err.to_string())
    }
}
