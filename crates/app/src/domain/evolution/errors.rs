//! Evolution service errors.

use thiserror::Error;

use crate::store::RepositoryError;

#[derive(Debug, Error)]
pub enum EvolutionServiceError {
    #[error("shop not found")]
    UnknownShop,

    /// The population changed while the cycle was being applied.
    #[error("population was modified concurrently")]
    Conflict,

    #[error("storage error")]
    Repository(#[source] RepositoryError),
}

impl From<RepositoryError> for EvolutionServiceError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::InvalidReference => Self::UnknownShop,
            RepositoryError::Conflict => Self::Conflict,
            error => Self::Repository(error),
        }
    }
}
