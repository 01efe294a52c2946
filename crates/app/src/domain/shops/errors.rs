//! Shops service errors.

use recoup::config::ConfigError;
use thiserror::Error;

use crate::store::RepositoryError;

#[derive(Debug, Error)]
pub enum ShopsServiceError {
    #[error("shop not found")]
    NotFound,

    #[error("invalid shop settings")]
    Invalid(#[from] ConfigError),

    #[error("storage error")]
    Repository(#[source] RepositoryError),
}

impl From<RepositoryError> for ShopsServiceError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::NotFound => Self::NotFound,
            error => Self::Repository(error),
        }
    }
}
