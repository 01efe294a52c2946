//! Promotions Repository

use async_trait::async_trait;
use jiff::Timestamp;
use jiff_sqlx::Timestamp as SqlxTimestamp;
use mockall::automock;
use recoup::{
    ids::{PromotionUuid, ShopUuid},
    promotions::{MerchantOverride, Promotion},
};
use sqlx::{FromRow, Postgres, Row, postgres::PgRow, query, query_as};

use crate::{
    database::Db,
    store::{RepositoryError, decode_enum, decode_optional_enum, decode_u64, encode_u64},
};

const CREATE_PROMOTION_SQL: &str = include_str!("sql/create_promotion.sql");
const GET_PROMOTION_SQL: &str = include_str!("sql/get_promotion.sql");
const LIST_PROMOTIONS_SQL: &str = include_str!("sql/list_promotions.sql");
const LIST_OPEN_PROMOTIONS_SQL: &str = include_str!("sql/list_open_promotions.sql");
const FIND_OPEN_BY_CODE_FOR_UPDATE_SQL: &str = include_str!("sql/find_open_by_code_for_update.sql");
const INSERT_USAGE_SQL: &str = include_str!("sql/insert_usage.sql");
const INCREMENT_USAGE_SQL: &str = include_str!("sql/increment_usage.sql");
const SAVE_CLASSIFICATION_SQL: &str = include_str!("sql/save_classification.sql");
const SET_OVERRIDE_SQL: &str = include_str!("sql/set_override.sql");
const END_PROMOTION_SQL: &str = include_str!("sql/end_promotion.sql");

#[automock]
#[async_trait]
pub trait PromotionsRepository: Send + Sync {
    /// Store a newly detected promotion. Codes are unique among open promotions.
    async fn create(&self, promotion: &Promotion) -> Result<(), RepositoryError>;

    /// Retrieve a single promotion.
    async fn get(
        &self,
        shop: ShopUuid,
        promotion: PromotionUuid,
    ) -> Result<Promotion, RepositoryError>;

    /// Every promotion of the shop, newest first.
    async fn list(&self, shop: ShopUuid) -> Result<Vec<Promotion>, RepositoryError>;

    /// Promotions open at `now`.
    async fn list_open(
        &self,
        shop: ShopUuid,
        now: Timestamp,
    ) -> Result<Vec<Promotion>, RepositoryError>;

    /// Count an order against the open promotion with `code`.
    ///
    /// Returns `None` when no open promotion uses the code. Redelivering the same
    /// order returns the promotion unchanged.
    async fn record_usage(
        &self,
        shop: ShopUuid,
        code: &str,
        order_id: &str,
        at: Timestamp,
    ) -> Result<Option<Promotion>, RepositoryError>;

    /// Persist classification, strategy and status without touching the override.
    async fn save_classification(&self, promotion: &Promotion) -> Result<(), RepositoryError>;

    /// Set or clear the merchant override.
    async fn set_override(
        &self,
        shop: ShopUuid,
        promotion: PromotionUuid,
        merchant_override: Option<MerchantOverride>,
    ) -> Result<Promotion, RepositoryError>;

    /// End an open promotion.
    async fn end(
        &self,
        shop: ShopUuid,
        promotion: PromotionUuid,
        at: Timestamp,
    ) -> Result<Promotion, RepositoryError>;
}

struct PromotionRecord(Promotion);

impl<'r> FromRow<'r, PgRow> for PromotionRecord {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let override_kind: Option<String> = row.try_get("override_kind")?;
        let override_aggression: Option<i16> = row.try_get("override_aggression")?;

        let merchant_override = override_kind
            .map(|kind| {
                let aggression = override_aggression.and_then(|level| u8::try_from(level).ok());

                MerchantOverride::from_parts(&kind, aggression).map_err(|e| {
                    sqlx::Error::ColumnDecode {
                        index: "override_kind".to_string(),
                        source: Box::new(e),
                    }
                })
            })
            .transpose()?;

        let optional_timestamp = |column: &str| -> Result<Option<Timestamp>, sqlx::Error> {
            Ok(row
                .try_get::<Option<SqlxTimestamp>, _>(column)?
                .map(SqlxTimestamp::to_jiff))
        };

        Ok(Self(Promotion {
            uuid: PromotionUuid::from_uuid(row.try_get("uuid")?),
            shop: ShopUuid::from_uuid(row.try_get("shop_uuid")?),
            code: row.try_get("code")?,
            amount: decode_u64(row, "amount")?,
            discount_type: decode_enum(row, "discount_type")?,
            detected_at: row.try_get::<SqlxTimestamp, _>("detected_at")?.to_jiff(),
            ends_at: optional_timestamp("ends_at")?,
            status: decode_enum(row, "status")?,
            classification: decode_optional_enum(row, "classification")?,
            strategy: decode_optional_enum(row, "strategy")?,
            merchant_override,
            usage_total: decode_u64(row, "usage_total")?,
            usage_last_24h: decode_u64(row, "usage_last_24h")?,
            last_used_at: optional_timestamp("last_used_at")?,
            classified_at: optional_timestamp("classified_at")?,
            ended_at: optional_timestamp("ended_at")?,
        }))
    }
}

fn override_columns(merchant_override: Option<MerchantOverride>) -> (Option<&'static str>, Option<i16>) {
    (
        merchant_override.map(MerchantOverride::as_str),
        merchant_override
            .and_then(MerchantOverride::aggression)
            .map(|aggression| i16::from(aggression.level())),
    )
}

#[derive(Debug, Clone)]
pub struct PgPromotionsRepository {
    db: Db,
}

impl PgPromotionsRepository {
    #[must_use]
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

#[async_trait]
impl PromotionsRepository for PgPromotionsRepository {
    async fn create(&self, promotion: &Promotion) -> Result<(), RepositoryError> {
        let (override_kind, override_aggression) = override_columns(promotion.merchant_override);

        let mut tx = self.db.begin_shop_transaction(promotion.shop).await?;

        query(CREATE_PROMOTION_SQL)
            .bind(promotion.uuid.into_uuid())
            .bind(promotion.shop.into_uuid())
            .bind(&promotion.code)
            .bind(encode_u64("amount", promotion.amount)?)
            .bind(promotion.discount_type.as_str())
            .bind(SqlxTimestamp::from(promotion.detected_at))
            .bind(promotion.ends_at.map(SqlxTimestamp::from))
            .bind(promotion.status.as_str())
            .bind(promotion.classification.map(|c| c.as_str()))
            .bind(promotion.strategy.map(|s| s.as_str()))
            .bind(override_kind)
            .bind(override_aggression)
            .bind(encode_u64("usage_total", promotion.usage_total)?)
            .bind(encode_u64("usage_last_24h", promotion.usage_last_24h)?)
            .bind(promotion.last_used_at.map(SqlxTimestamp::from))
            .bind(promotion.classified_at.map(SqlxTimestamp::from))
            .bind(promotion.ended_at.map(SqlxTimestamp::from))
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(())
    }

    async fn get(
        &self,
        shop: ShopUuid,
        promotion: PromotionUuid,
    ) -> Result<Promotion, RepositoryError> {
        let mut tx = self.db.begin_shop_transaction(shop).await?;

        let record = query_as::<Postgres, PromotionRecord>(GET_PROMOTION_SQL)
            .bind(promotion.into_uuid())
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(record.0)
    }

    async fn list(&self, shop: ShopUuid) -> Result<Vec<Promotion>, RepositoryError> {
        let mut tx = self.db.begin_shop_transaction(shop).await?;

        let records = query_as::<Postgres, PromotionRecord>(LIST_PROMOTIONS_SQL)
            .bind(shop.into_uuid())
            .fetch_all(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(records.into_iter().map(|record| record.0).collect())
    }

    async fn list_open(
        &self,
        shop: ShopUuid,
        now: Timestamp,
    ) -> Result<Vec<Promotion>, RepositoryError> {
        let mut tx = self.db.begin_shop_transaction(shop).await?;

        let records = query_as::<Postgres, PromotionRecord>(LIST_OPEN_PROMOTIONS_SQL)
            .bind(shop.into_uuid())
            .bind(SqlxTimestamp::from(now))
            .fetch_all(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(records.into_iter().map(|record| record.0).collect())
    }

    async fn record_usage(
        &self,
        shop: ShopUuid,
        code: &str,
        order_id: &str,
        at: Timestamp,
    ) -> Result<Option<Promotion>, RepositoryError> {
        let mut tx = self.db.begin_shop_transaction(shop).await?;

        let open = query_as::<Postgres, PromotionRecord>(FIND_OPEN_BY_CODE_FOR_UPDATE_SQL)
            .bind(shop.into_uuid())
            .bind(code)
            .bind(SqlxTimestamp::from(at))
            .fetch_optional(&mut *tx)
            .await?;

        let Some(PromotionRecord(promotion)) = open else {
            tx.commit().await?;

            return Ok(None);
        };

        let inserted = query(INSERT_USAGE_SQL)
            .bind(promotion.uuid.into_uuid())
            .bind(shop.into_uuid())
            .bind(order_id)
            .bind(SqlxTimestamp::from(at))
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if inserted == 0 {
            tx.commit().await?;

            return Ok(Some(promotion));
        }

        let updated = query_as::<Postgres, PromotionRecord>(INCREMENT_USAGE_SQL)
            .bind(promotion.uuid.into_uuid())
            .bind(SqlxTimestamp::from(at))
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(Some(updated.0))
    }

    async fn save_classification(&self, promotion: &Promotion) -> Result<(), RepositoryError> {
        let mut tx = self.db.begin_shop_transaction(promotion.shop).await?;

        let updated = query(SAVE_CLASSIFICATION_SQL)
            .bind(promotion.uuid.into_uuid())
            .bind(promotion.classification.map(|c| c.as_str()))
            .bind(promotion.strategy.map(|s| s.as_str()))
            .bind(promotion.classified_at.map(SqlxTimestamp::from))
            .bind(promotion.status.as_str())
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if updated == 0 {
            return Err(RepositoryError::Conflict);
        }

        tx.commit().await?;

        Ok(())
    }

    async fn set_override(
        &self,
        shop: ShopUuid,
        promotion: PromotionUuid,
        merchant_override: Option<MerchantOverride>,
    ) -> Result<Promotion, RepositoryError> {
        let (override_kind, override_aggression) = override_columns(merchant_override);

        let mut tx = self.db.begin_shop_transaction(shop).await?;

        let record = query_as::<Postgres, PromotionRecord>(SET_OVERRIDE_SQL)
            .bind(promotion.into_uuid())
            .bind(override_kind)
            .bind(override_aggression)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(record.0)
    }

    async fn end(
        &self,
        shop: ShopUuid,
        promotion: PromotionUuid,
        at: Timestamp,
    ) -> Result<Promotion, RepositoryError> {
        let mut tx = self.db.begin_shop_transaction(shop).await?;

        let ended = query_as::<Postgres, PromotionRecord>(END_PROMOTION_SQL)
            .bind(promotion.into_uuid())
            .bind(SqlxTimestamp::from(at))
            .fetch_optional(&mut *tx)
            .await?;

        if let Some(record) = ended {
            tx.commit().await?;

            return Ok(record.0);
        }

        let exists = query_as::<Postgres, PromotionRecord>(GET_PROMOTION_SQL)
            .bind(promotion.into_uuid())
            .fetch_optional(&mut *tx)
            .await?
            .is_some();

        Err(if exists {
            RepositoryError::Conflict
        } else {
            RepositoryError::NotFound
        })
    }
}
