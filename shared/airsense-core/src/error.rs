//! Error types for Airsense services

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AirsenseError>;

#[derive(Error, Debug)]
pub enum AirsenseError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Upstream contract violated: {0}")]
    Contract(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AirsenseError {
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::NotFound(_) => 404,
            Self::Contract(_) => 502,
            Self::Unavailable(_) => 503,
            _ => 500,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG_ERROR",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Network(_) => "NETWORK_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Unavailable(_) => "UNAVAILABLE",
            Self::Contract(_) => "CONTRACT_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<std::io::Error> for AirsenseError {
    fn from(err: std::io::Error) -> Self {
        AirsenseError::Network(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(AirsenseError::NotFound("d1".into()).status_code(), 404);
        assert_eq!(AirsenseError::Unavailable("ml".into()).status_code(), 503);
        assert_eq!(AirsenseError::Contract("len".into()).status_code(), 502);
        assert_eq!(AirsenseError::Database("down".into()).status_code(), 500);
    }

    #[test]
    fn test_io_error_maps_to_network() {
        let err: AirsenseError = std::io::Error::new(std::io::ErrorKind::AddrInUse, "busy").into();
        assert_eq!(err.error_code(), "NETWORK_ERROR");
    }
}
