//! Outcomes service errors.

use thiserror::Error;

use crate::store::RepositoryError;

#[derive(Debug, Error)]
pub enum OutcomesServiceError {
    #[error("impression not found")]
    NotFound,

    #[error("storage error")]
    Repository(#[source] RepositoryError),
}

impl From<RepositoryError> for OutcomesServiceError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::NotFound => Self::NotFound,
            error => Self::Repository(error),
        }
    }
}
