//! Impressions Repository

use async_trait::async_trait;
use jiff::Timestamp;
use jiff_sqlx::Timestamp as SqlxTimestamp;
use mockall::automock;
use recoup::{
    ids::{ImpressionUuid, ShopUuid, VariantUuid},
    impressions::{Impression, OutcomeEvent},
    signals::VisitorSignals,
    variants::Segment,
};
use sqlx::{FromRow, Postgres, Row, postgres::PgRow, query, query_as, query_scalar, types::Json};
use uuid::Uuid;

use crate::{
    database::Db,
    domain::impressions::StatsDelta,
    store::{RepositoryError, decode_enum, decode_u64, encode_u64},
};

const RECORD_IMPRESSION_SQL: &str = include_str!("sql/record_impression.sql");
const COUNT_SERVED_SQL: &str = include_str!("sql/count_served.sql");
const GET_IMPRESSION_SQL: &str = include_str!("sql/get_impression.sql");
const GET_IMPRESSION_FOR_UPDATE_SQL: &str = include_str!("sql/get_impression_for_update.sql");
const UPDATE_OUTCOME_SQL: &str = include_str!("sql/update_outcome.sql");
const ADD_VARIANT_OUTCOME_SQL: &str = include_str!("sql/add_variant_outcome.sql");
const LIST_FOR_VARIANTS_SQL: &str = include_str!("sql/list_for_variants.sql");
const COUNT_SINCE_SQL: &str = include_str!("sql/count_since.sql");

#[automock]
#[async_trait]
pub trait ImpressionsRepository: Send + Sync {
    /// Append a served impression and count it against its variant.
    async fn record(&self, impression: &Impression) -> Result<(), RepositoryError>;

    /// Retrieve a single impression.
    async fn get(
        &self,
        shop: ShopUuid,
        impression: ImpressionUuid,
    ) -> Result<Impression, RepositoryError>;

    /// Fold an outcome into an impression and its variant's stats.
    ///
    /// Returns `false` when the outcome had already been applied.
    async fn apply_outcome(
        &self,
        shop: ShopUuid,
        impression: ImpressionUuid,
        event: OutcomeEvent,
        revenue: u64,
    ) -> Result<bool, RepositoryError>;

    /// Every impression served by any of `variants`.
    async fn list_for_variants(
        &self,
        shop: ShopUuid,
        variants: &[VariantUuid],
    ) -> Result<Vec<Impression>, RepositoryError>;

    /// Variant-served impressions across every population of the shop after `since`.
    async fn count_since(
        &self,
        shop: ShopUuid,
        since: Option<Timestamp>,
    ) -> Result<u64, RepositoryError>;
}

struct ImpressionRecord(Impression);

impl<'r> FromRow<'r, PgRow> for ImpressionRecord {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let variant: Option<Uuid> = row.try_get("variant_uuid")?;
        let Json(signals): Json<VisitorSignals> = row.try_get("signals")?;

        Ok(Self(Impression {
            uuid: ImpressionUuid::from_uuid(row.try_get("uuid")?),
            shop: ShopUuid::from_uuid(row.try_get("shop_uuid")?),
            variant: variant.map(VariantUuid::from_uuid),
            baseline: decode_enum(row, "baseline")?,
            segment: Segment::new(row.try_get::<String, _>("segment")?),
            signals,
            served_at: row.try_get::<SqlxTimestamp, _>("served_at")?.to_jiff(),
            during_promotion: row.try_get("during_promotion")?,
            offer: decode_enum(row, "offer")?,
            discount_cost: decode_u64(row, "discount_cost")?,
            clicked: row.try_get("clicked")?,
            converted: row.try_get("converted")?,
            revenue: decode_u64(row, "revenue")?,
        }))
    }
}

#[derive(Debug, Clone)]
pub struct PgImpressionsRepository {
    db: Db,
}

impl PgImpressionsRepository {
    #[must_use]
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ImpressionsRepository for PgImpressionsRepository {
    async fn record(&self, impression: &Impression) -> Result<(), RepositoryError> {
        let mut tx = self.db.begin_shop_transaction(impression.shop).await?;

        query(RECORD_IMPRESSION_SQL)
            .bind(impression.uuid.into_uuid())
            .bind(impression.shop.into_uuid())
            .bind(impression.variant.map(VariantUuid::into_uuid))
            .bind(impression.baseline.as_str())
            .bind(impression.segment.as_str())
            .bind(Json(&impression.signals))
            .bind(SqlxTimestamp::from(impression.served_at))
            .bind(impression.during_promotion)
            .bind(impression.offer.as_str())
            .bind(encode_u64("discount_cost", impression.discount_cost)?)
            .bind(impression.clicked)
            .bind(impression.converted)
            .bind(encode_u64("revenue", impression.revenue)?)
            .execute(&mut *tx)
            .await?;

        if let Some(variant) = impression.variant {
            query(COUNT_SERVED_SQL)
                .bind(variant.into_uuid())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        Ok(())
    }

    async fn get(
        &self,
        shop: ShopUuid,
        impression: ImpressionUuid,
    ) -> Result<Impression, RepositoryError> {
        let mut tx = self.db.begin_shop_transaction(shop).await?;

        let record = query_as::<Postgres, ImpressionRecord>(GET_IMPRESSION_SQL)
            .bind(impression.into_uuid())
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(record.0)
    }

    async fn apply_outcome(
        &self,
        shop: ShopUuid,
        impression: ImpressionUuid,
        event: OutcomeEvent,
        revenue: u64,
    ) -> Result<bool, RepositoryError> {
        let mut tx = self.db.begin_shop_transaction(shop).await?;

        // The row lock serialises redeliveries of the same outcome.
        let before = query_as::<Postgres, ImpressionRecord>(GET_IMPRESSION_FOR_UPDATE_SQL)
            .bind(impression.into_uuid())
            .fetch_one(&mut *tx)
            .await?
            .0;

        let mut after = before.clone();

        if !after.apply_outcome(event, revenue) {
            tx.commit().await?;

            return Ok(false);
        }

        query(UPDATE_OUTCOME_SQL)
            .bind(impression.into_uuid())
            .bind(after.clicked)
            .bind(after.converted)
            .bind(encode_u64("revenue", after.revenue)?)
            .execute(&mut *tx)
            .await?;

        if let Some(variant) = after.variant {
            let delta = StatsDelta::between(&before, &after);

            query(ADD_VARIANT_OUTCOME_SQL)
                .bind(variant.into_uuid())
                .bind(encode_u64("clicks", delta.clicks)?)
                .bind(encode_u64("conversions", delta.conversions)?)
                .bind(encode_u64("revenue", delta.revenue)?)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        Ok(true)
    }

    async fn list_for_variants(
        &self,
        shop: ShopUuid,
        variants: &[VariantUuid],
    ) -> Result<Vec<Impression>, RepositoryError> {
        let variants: Vec<Uuid> = variants.iter().map(|uuid| uuid.into_uuid()).collect();

        let mut tx = self.db.begin_shop_transaction(shop).await?;

        let records = query_as::<Postgres, ImpressionRecord>(LIST_FOR_VARIANTS_SQL)
            .bind(shop.into_uuid())
            .bind(&variants)
            .fetch_all(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(records.into_iter().map(|record| record.0).collect())
    }

    async fn count_since(
        &self,
        shop: ShopUuid,
        since: Option<Timestamp>,
    ) -> Result<u64, RepositoryError> {
        let mut tx = self.db.begin_shop_transaction(shop).await?;

        let count: i64 = query_scalar(COUNT_SINCE_SQL)
            .bind(shop.into_uuid())
            .bind(since.map(SqlxTimestamp::from))
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(u64::try_from(count).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use recoup::{decisions::OfferKind, variants::Baseline};

    use super::*;

    fn impression() -> Impression {
        Impression {
            uuid: ImpressionUuid::new(),
            shop: ShopUuid::new(),
            variant: Some(VariantUuid::new()),
            baseline: Baseline::RevenueWithDiscount,
            segment: Segment::new("desktop-direct-low"),
            signals: VisitorSignals::default(),
            served_at: Timestamp::UNIX_EPOCH,
            during_promotion: false,
            offer: OfferKind::Percentage,
            discount_cost: 150,
            clicked: false,
            converted: false,
            revenue: 0,
        }
    }

    #[test]
    fn conversion_delta_counts_the_implied_click() {
        let before = impression();
        let mut after = before.clone();
        after.apply_outcome(OutcomeEvent::Conversion, 4_200);

        assert_eq!(
            StatsDelta::between(&before, &after),
            StatsDelta {
                clicks: 1,
                conversions: 1,
                revenue: 4_200,
            }
        );
    }

    #[test]
    fn conversion_after_click_adds_no_click() {
        let mut before = impression();
        before.apply_outcome(OutcomeEvent::Click, 0);

        let mut after = before.clone();
        after.apply_outcome(OutcomeEvent::Conversion, 900);

        assert_eq!(StatsDelta::between(&before, &after).clicks, 0);
        assert_eq!(StatsDelta::between(&before, &after).conversions, 1);
    }
}
