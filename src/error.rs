use thiserror::Error;

/// Application error types.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Insufficient history for {symbol}: have {have} bars, need {need}")]
    InsufficientHistory {
        symbol: String,
        have: usize,
        need: usize,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("External API error: {0}")]
    ExternalApi(String),

    #[error(transparent)]
    Database(#[from] rusqlite::Error),

    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),

    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
}

impl AppError {
    /// Whether the error only means "try again next cycle".
    pub fn is_insufficient_history(&self) -> bool {
        matches!(self, AppError::InsufficientHistory { .. })
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_history_message() {
        let err = AppError::InsufficientHistory {
            symbol: "AAPL".to_string(),
            have: 12,
            need: 210,
        };
        assert!(err.is_insufficient_history());
        assert_eq!(
            err.to_string(),
            "Insufficient history for AAPL: have 12 bars, need 210"
        );
    }

    #[test]
    fn test_database_error_is_not_insufficient_history() {
        let err: AppError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(!err.is_insufficient_history());
    }
}
