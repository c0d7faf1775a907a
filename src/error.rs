use thiserror::Error;

#[derive(Error, Debug)]
pub enum RosterError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Remote store error (status {status}): {message}")]
    Remote { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Mail delivery failed: {0}")]
    Mail(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RosterError {
    pub fn validation(msg: impl Into<String>) -> Self {
        RosterError::Validation(msg.into())
    }

    /// Validation failures are reported to the user; everything else is an
    /// infrastructure fault.
    pub fn is_validation(&self) -> bool {
        matches!(self, RosterError::Validation(_))
    }
}

pub type Result<T> = std::result::Result<T, RosterError>;
