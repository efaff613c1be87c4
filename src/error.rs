use crate::models::AuditId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("audit {id} not found")]
    NotFound { id: AuditId },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error(transparent)]
    Config(#[from] config::ConfigError),
}

pub type AnalyticsResult<T> = Result<T, AnalyticsError>;
