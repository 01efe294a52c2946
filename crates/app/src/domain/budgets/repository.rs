//! Budgets Repository

use async_trait::async_trait;
use jiff::Timestamp;
use jiff_sqlx::Timestamp as SqlxTimestamp;
use mockall::automock;
use recoup::{
    budget::{BudgetError, BudgetLedger, BudgetSettings},
    ids::ShopUuid,
};
use sqlx::{FromRow, Postgres, Row, postgres::PgRow, query, query_as};

use crate::{
    database::Db,
    store::{RepositoryError, decode_enum, decode_u64, encode_u64},
};

const ENSURE_LEDGER_SQL: &str = include_str!("sql/ensure_ledger.sql");
const GET_LEDGER_FOR_UPDATE_SQL: &str = include_str!("sql/get_ledger_for_update.sql");
const GET_LEDGER_SQL: &str = include_str!("sql/get_ledger.sql");
const SAVE_LEDGER_SQL: &str = include_str!("sql/save_ledger.sql");
const RELEASE_BUDGET_SQL: &str = include_str!("sql/release_budget.sql");

/// Outcome of a budget reservation, with the ledger as it stands afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    /// The cost was recorded.
    Granted(BudgetLedger),

    /// The cost would exceed the cap; nothing was recorded.
    Denied(BudgetLedger),
}

impl Reservation {
    /// Reserve `cost` on `ledger`, mapping an exhausted budget to [`Reservation::Denied`].
    ///
    /// # Errors
    ///
    /// Returns an error if a period boundary cannot be computed.
    pub fn against(
        ledger: &mut BudgetLedger,
        settings: &BudgetSettings,
        cost: u64,
        now: Timestamp,
    ) -> Result<Self, RepositoryError> {
        match ledger.try_reserve(settings, cost, now) {
            Ok(()) => Ok(Self::Granted(*ledger)),
            Err(BudgetError::Exceeded { .. }) => Ok(Self::Denied(*ledger)),
            Err(BudgetError::Calendar(error)) => Err(RepositoryError::Calendar(error)),
        }
    }
}

#[automock]
#[async_trait]
pub trait BudgetsRepository: Send + Sync {
    /// Atomically check the cap and record `cost` against the shop's current period.
    async fn reserve(
        &self,
        shop: ShopUuid,
        settings: &BudgetSettings,
        cost: u64,
        now: Timestamp,
    ) -> Result<Reservation, RepositoryError>;

    /// Give back `cost` reserved at `reserved_at`.
    ///
    /// A no-op once the ledger has rolled over into a later period.
    async fn release(
        &self,
        shop: ShopUuid,
        cost: u64,
        reserved_at: Timestamp,
    ) -> Result<(), RepositoryError>;

    /// The shop's ledger, if it has ever reserved budget.
    async fn ledger(&self, shop: ShopUuid) -> Result<Option<BudgetLedger>, RepositoryError>;
}

struct LedgerRecord(BudgetLedger);

impl<'r> FromRow<'r, PgRow> for LedgerRecord {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self(BudgetLedger {
            period: decode_enum(row, "period")?,
            period_start: row.try_get::<SqlxTimestamp, _>("period_start")?.to_jiff(),
            period_end: row.try_get::<SqlxTimestamp, _>("period_end")?.to_jiff(),
            spent: decode_u64(row, "spent")?,
        }))
    }
}

#[derive(Debug, Clone)]
pub struct PgBudgetsRepository {
    db: Db,
}

impl PgBudgetsRepository {
    #[must_use]
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

#[async_trait]
impl BudgetsRepository for PgBudgetsRepository {
    async fn reserve(
        &self,
        shop: ShopUuid,
        settings: &BudgetSettings,
        cost: u64,
        now: Timestamp,
    ) -> Result<Reservation, RepositoryError> {
        let fresh = BudgetLedger::open(settings.period, now)?;

        let mut tx = self.db.begin_shop_transaction(shop).await?;

        query(ENSURE_LEDGER_SQL)
            .bind(shop.into_uuid())
            .bind(fresh.period.as_str())
            .bind(SqlxTimestamp::from(fresh.period_start))
            .bind(SqlxTimestamp::from(fresh.period_end))
            .execute(&mut *tx)
            .await?;

        // The row lock makes check-and-reserve atomic across concurrent decisions.
        let mut ledger = query_as::<Postgres, LedgerRecord>(GET_LEDGER_FOR_UPDATE_SQL)
            .bind(shop.into_uuid())
            .fetch_one(&mut *tx)
            .await?
            .0;

        let reservation = Reservation::against(&mut ledger, settings, cost, now)?;

        query(SAVE_LEDGER_SQL)
            .bind(shop.into_uuid())
            .bind(ledger.period.as_str())
            .bind(SqlxTimestamp::from(ledger.period_start))
            .bind(SqlxTimestamp::from(ledger.period_end))
            .bind(encode_u64("spent", ledger.spent)?)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(reservation)
    }

    async fn release(
        &self,
        shop: ShopUuid,
        cost: u64,
        reserved_at: Timestamp,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.db.begin_shop_transaction(shop).await?;

        query(RELEASE_BUDGET_SQL)
            .bind(shop.into_uuid())
            .bind(encode_u64("cost", cost)?)
            .bind(SqlxTimestamp::from(reserved_at))
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(())
    }

    async fn ledger(&self, shop: ShopUuid) -> Result<Option<BudgetLedger>, RepositoryError> {
        let mut tx = self.db.begin_shop_transaction(shop).await?;

        let record = query_as::<Postgres, LedgerRecord>(GET_LEDGER_SQL)
            .bind(shop.into_uuid())
            .fetch_optional(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(record.map(|record| record.0))
    }
}
