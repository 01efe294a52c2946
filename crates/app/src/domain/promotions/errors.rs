//! Promotions service errors.

use thiserror::Error;

use crate::store::RepositoryError;

#[derive(Debug, Error)]
pub enum PromotionsServiceError {
    #[error("an open promotion with this code already exists")]
    AlreadyExists,

    #[error("promotion not found")]
    NotFound,

    #[error("shop not found")]
    UnknownShop,

    #[error("promotion has ended")]
    Ended,

    #[error("storage error")]
    Repository(#[source] RepositoryError),
}

impl From<RepositoryError> for PromotionsServiceError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::AlreadyExists => Self::AlreadyExists,
            RepositoryError::NotFound => Self::NotFound,
            RepositoryError::InvalidReference => Self::UnknownShop,
            RepositoryError::Conflict => Self::Ended,
            error => Self::Repository(error),
        }
    }
}
