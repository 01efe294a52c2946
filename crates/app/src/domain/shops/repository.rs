//! Shops Repository

use async_trait::async_trait;
use mockall::automock;
use recoup::{
    budget::BudgetSettings,
    config::{Aggression, ShopConfig},
    ids::ShopUuid,
};
use sqlx::{FromRow, Postgres, Row, postgres::PgRow, query, query_as};

use crate::{
    database::Db,
    store::{RepositoryError, decode_enum, decode_u8, decode_u64, encode_u64},
};

const GET_CONFIG_SQL: &str = include_str!("sql/get_config.sql");
const UPSERT_CONFIG_SQL: &str = include_str!("sql/upsert_config.sql");

#[automock]
#[async_trait]
pub trait ShopsRepository: Send + Sync {
    /// The shop's settings, or `None` for an unknown shop.
    async fn get_config(&self, shop: ShopUuid) -> Result<Option<ShopConfig>, RepositoryError>;

    /// Create the shop or replace its settings.
    async fn upsert_config(
        &self,
        shop: ShopUuid,
        config: &ShopConfig,
    ) -> Result<(), RepositoryError>;
}

struct ShopConfigRecord(ShopConfig);

impl<'r> FromRow<'r, PgRow> for ShopConfigRecord {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let population_size: i16 = row.try_get("population_size")?;

        Ok(Self(ShopConfig {
            mutation_rate: decode_u8(row, "mutation_rate")?,
            crossover_rate: decode_u8(row, "crossover_rate")?,
            selection_pressure: decode_u8(row, "selection_pressure")?,
            population_size: u16::try_from(population_size).map_err(|e| {
                sqlx::Error::ColumnDecode {
                    index: "population_size".to_string(),
                    source: Box::new(e),
                }
            })?,
            goal: decode_enum(row, "goal")?,
            aggression: Aggression::new(decode_u8(row, "aggression")?),
            discounts_enabled: row.try_get("discounts_enabled")?,
            segmentation_enabled: row.try_get("segmentation_enabled")?,
            budget: BudgetSettings {
                enabled: row.try_get("budget_enabled")?,
                amount: decode_u64(row, "budget_amount")?,
                period: decode_enum(row, "budget_period")?,
            },
        }))
    }
}

#[derive(Debug, Clone)]
pub struct PgShopsRepository {
    db: Db,
}

impl PgShopsRepository {
    #[must_use]
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ShopsRepository for PgShopsRepository {
    async fn get_config(&self, shop: ShopUuid) -> Result<Option<ShopConfig>, RepositoryError> {
        let mut tx = self.db.begin_shop_transaction(shop).await?;

        let record = query_as::<Postgres, ShopConfigRecord>(GET_CONFIG_SQL)
            .bind(shop.into_uuid())
            .fetch_optional(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(record.map(|record| record.0))
    }

    async fn upsert_config(
        &self,
        shop: ShopUuid,
        config: &ShopConfig,
    ) -> Result<(), RepositoryError> {
        let population_size =
            i16::try_from(config.population_size).or(Err(RepositoryError::InvalidData))?;

        let mut tx = self.db.begin_shop_transaction(shop).await?;

        query(UPSERT_CONFIG_SQL)
            .bind(shop.into_uuid())
            .bind(i16::from(config.mutation_rate))
            .bind(i16::from(config.crossover_rate))
            .bind(i16::from(config.selection_pressure))
            .bind(population_size)
            .bind(config.goal.as_str())
            .bind(i16::from(config.aggression.level()))
            .bind(config.discounts_enabled)
            .bind(config.segmentation_enabled)
            .bind(config.budget.enabled)
            .bind(encode_u64("budget_amount", config.budget.amount)?)
            .bind(config.budget.period.as_str())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(())
    }
}
