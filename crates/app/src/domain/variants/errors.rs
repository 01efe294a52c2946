//! Variants service errors.

use recoup::variants::LifecycleError;
use thiserror::Error;

use crate::store::RepositoryError;

#[derive(Debug, Error)]
pub enum VariantsServiceError {
    #[error("variant already exists")]
    AlreadyExists,

    #[error("variant not found")]
    NotFound,

    #[error("shop not found")]
    UnknownShop,

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    /// The variant changed status while the request was in flight.
    #[error("variant was modified concurrently")]
    Conflict,

    #[error("storage error")]
    Repository(#[source] RepositoryError),
}

impl From<RepositoryError> for VariantsServiceError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::AlreadyExists => Self::AlreadyExists,
            RepositoryError::NotFound => Self::NotFound,
            RepositoryError::InvalidReference => Self::UnknownShop,
            RepositoryError::Conflict => Self::Conflict,
            error => Self::Repository(error),
        }
    }
}
