//! Store
//!
//! Shared persistence plumbing: the repository error type, serving-path timeouts,
//! the in-memory store and the column codecs the Postgres repositories share.

use std::{str::FromStr, sync::Arc, time::Duration};

use recoup::variants::UnknownValue;
use sqlx::{
    Error, Row,
    error::{DatabaseError, ErrorKind},
    postgres::PgRow,
};
use thiserror::Error;

use crate::{
    database::Db,
    domain::{
        budgets::{BudgetsRepository, PgBudgetsRepository},
        impressions::{ImpressionsRepository, PgImpressionsRepository},
        promotions::{PgPromotionsRepository, PromotionsRepository},
        shops::{PgShopsRepository, ShopsRepository},
        variants::{PgVariantsRepository, VariantsRepository},
    },
};

mod memory;

pub use memory::MemoryStore;

/// Errors raised by every repository implementation.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    AlreadyExists,

    #[error("record not found")]
    NotFound,

    #[error("related record not found")]
    InvalidReference,

    #[error("missing required data")]
    MissingRequiredData,

    #[error("invalid data")]
    InvalidData,

    /// A compare-and-swap write found the record in an unexpected state.
    #[error("record was modified concurrently")]
    Conflict,

    #[error("store call timed out")]
    Timeout,

    #[error("could not compute budget period")]
    Calendar(#[from] jiff::Error),

    #[error("storage error")]
    Sql(#[source] Error),
}

impl From<Error> for RepositoryError {
    fn from(error: Error) -> Self {
        if matches!(error, Error::RowNotFound) {
            return Self::NotFound;
        }

        match error.as_database_error().map(DatabaseError::kind) {
            Some(ErrorKind::UniqueViolation) => Self::AlreadyExists,
            Some(ErrorKind::ForeignKeyViolation) => Self::InvalidReference,
            Some(ErrorKind::NotNullViolation) => Self::MissingRequiredData,
            Some(ErrorKind::CheckViolation) => Self::InvalidData,
            _ => Self::Sql(error),
        }
    }
}

/// Run a store call under `limit`, mapping expiry to [`RepositoryError::Timeout`].
///
/// # Errors
///
/// Returns the call's own error, or [`RepositoryError::Timeout`].
pub async fn bounded<T, F>(limit: Duration, call: F) -> Result<T, RepositoryError>
where
    F: Future<Output = Result<T, RepositoryError>>,
{
    tokio::time::timeout(limit, call)
        .await
        .unwrap_or(Err(RepositoryError::Timeout))
}

/// One handle per repository, all backed by the same store.
#[derive(Clone)]
pub struct Repositories {
    pub shops: Arc<dyn ShopsRepository>,
    pub variants: Arc<dyn VariantsRepository>,
    pub impressions: Arc<dyn ImpressionsRepository>,
    pub promotions: Arc<dyn PromotionsRepository>,
    pub budgets: Arc<dyn BudgetsRepository>,
}

impl std::fmt::Debug for Repositories {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repositories").finish_non_exhaustive()
    }
}

impl Repositories {
    /// Postgres-backed repositories.
    #[must_use]
    pub fn postgres(db: &Db) -> Self {
        Self {
            shops: Arc::new(PgShopsRepository::new(db.clone())),
            variants: Arc::new(PgVariantsRepository::new(db.clone())),
            impressions: Arc::new(PgImpressionsRepository::new(db.clone())),
            promotions: Arc::new(PgPromotionsRepository::new(db.clone())),
            budgets: Arc::new(PgBudgetsRepository::new(db.clone())),
        }
    }

    /// Repositories sharing one in-memory store.
    #[must_use]
    pub fn memory(store: &MemoryStore) -> Self {
        Self {
            shops: Arc::new(store.clone()),
            variants: Arc::new(store.clone()),
            impressions: Arc::new(store.clone()),
            promotions: Arc::new(store.clone()),
            budgets: Arc::new(store.clone()),
        }
    }
}

/// Bind a counter as `BIGINT`.
pub(crate) fn encode_u64(column: &str, value: u64) -> Result<i64, Error> {
    i64::try_from(value).map_err(|e| Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}

/// Read a non-negative `BIGINT` column.
pub(crate) fn decode_u64(row: &PgRow, column: &str) -> Result<u64, Error> {
    let value: i64 = row.try_get(column)?;

    u64::try_from(value).map_err(|e| Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}

/// Read a non-negative `SMALLINT` column.
pub(crate) fn decode_u8(row: &PgRow, column: &str) -> Result<u8, Error> {
    let value: i16 = row.try_get(column)?;

    u8::try_from(value).map_err(|e| Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}

/// Read a text column holding an enum's storage representation.
pub(crate) fn decode_enum<T>(row: &PgRow, column: &str) -> Result<T, Error>
where
    T: FromStr<Err = UnknownValue>,
{
    let value: String = row.try_get(column)?;

    parse_enum(column, &value)
}

/// Read a nullable text column holding an enum's storage representation.
pub(crate) fn decode_optional_enum<T>(row: &PgRow, column: &str) -> Result<Option<T>, Error>
where
    T: FromStr<Err = UnknownValue>,
{
    let value: Option<String> = row.try_get(column)?;

    value.map(|value| parse_enum(column, &value)).transpose()
}

fn parse_enum<T>(column: &str, value: &str) -> Result<T, Error>
where
    T: FromStr<Err = UnknownValue>,
{
    value.parse().map_err(|e: UnknownValue| Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bounded_maps_expiry_to_timeout() {
        let result: Result<(), RepositoryError> = bounded(Duration::from_millis(5), async {
            tokio::time::sleep(Duration::from_secs(5)).await;

            Ok(())
        })
        .await;

        assert!(
            matches!(result, Err(RepositoryError::Timeout)),
            "expected Timeout, got {result:?}"
        );
    }

    #[tokio::test]
    async fn bounded_passes_through_results() {
        let result = bounded(Duration::from_secs(1), async { Ok::<_, RepositoryError>(7) }).await;

        assert!(matches!(result, Ok(7)), "expected Ok(7), got {result:?}");
    }

    #[test]
    fn row_not_found_maps_to_not_found() {
        assert!(matches!(
            RepositoryError::from(Error::RowNotFound),
            RepositoryError::NotFound
        ));
    }
}
