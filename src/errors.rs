use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum RankError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Busy: {0}")]
    Busy(String),

    #[error("Lookup error: {0}")]
    Lookup(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Not running: {0}")]
    NotRunning(String),

    #[error("Session token mismatch: {0}")]
    TokenMismatch(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RankError {
    /// Short machine-readable code used in HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            RankError::Validation(_) => "validation_error",
            RankError::Busy(_) => "busy",
            RankError::Lookup(_) => "lookup_error",
            RankError::Persistence(_) => "persistence_error",
            RankError::NotFound(_) => "not_found",
            RankError::NotRunning(_) => "not_running",
            RankError::TokenMismatch(_) => "token_mismatch",
            RankError::Config(_) => "config_error",
            RankError::Internal(_) => "internal_error",
        }
    }
}

impl From<std::io::Error> for RankError {
    fn from(err: std::io::Error) -> Self {
        RankError::Persistence(err.to_string())
    }
}

impl From<csv::Error> for RankError {
    fn from(err: csv::Error) -> Self {
        RankError::Persistence(err.to_string())
    }
}

impl From<reqwest::Error> for RankError {
    fn from(err: reqwest::Error) -> Self {
        RankError::Lookup(err.to_string())
    }
}

impl From<serde_json::Error> for RankError {
    fn from(err: serde_json::Error) -> Self {
        RankError::Internal(err.to_string())
    }
}
