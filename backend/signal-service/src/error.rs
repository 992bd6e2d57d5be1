use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Unknown signal type: {0}")]
    UnknownSignalType(String),

    #[error("Invalid rating value: {0} (expected an integer between 1 and 5)")]
    InvalidRatingValue(String),

    #[error("Invalid exclusion type: {0}")]
    InvalidExclusionType(String),

    #[error("Invalid reaction type: {0}")]
    InvalidReactionType(String),

    #[error("Exclusion {0} not found or not owned by this visitor")]
    ExclusionNotFound(i64),

    #[error("Signal tracker is not available")]
    TrackerUnavailable,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Redis error: {0}")]
    Redis(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Errors raised while validating caller input, as opposed to collaborator failures.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            AppError::UnknownSignalType(_)
                | AppError::InvalidRatingValue(_)
                | AppError::InvalidExclusionType(_)
                | AppError::InvalidReactionType(_)
                | AppError::Validation(_)
        )
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(err.to_string())
    }
}

impl From<redis::RedisError> for AppError {
    fn from(err: redis::RedisError) -> Self {
        AppError::Redis(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejections_are_classified() {
        assert!(AppError::UnknownSignalType("x".into()).is_rejection());
        assert!(AppError::InvalidRatingValue("6".into()).is_rejection());
        assert!(!AppError::TrackerUnavailable.is_rejection());
        assert!(!AppError::Database("down".into()).is_rejection());
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            AppError::ExclusionNotFound(7).to_string(),
            "Exclusion 7 not found or not owned by this visitor"
        );
        assert_eq!(
            AppError::InvalidExclusionType("mute_tag".into()).to_string(),
            "Invalid exclusion type: mute_tag"
        );
    }

    #[test]
    fn test_redis_errors_convert() {
        let err: AppError =
            redis::RedisError::from((redis::ErrorKind::IoError, "connection refused")).into();
        assert!(matches!(err, AppError::Redis(ref msg) if msg.contains("connection refused")));
        assert!(!err.is_rejection());
    }
}
