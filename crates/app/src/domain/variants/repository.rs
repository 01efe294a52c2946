//! Variants Repository

use async_trait::async_trait;
use jiff::Timestamp;
use jiff_sqlx::Timestamp as SqlxTimestamp;
use mockall::automock;
use recoup::{
    evolution::EvolutionPlan,
    genes::Genes,
    ids::{ShopUuid, VariantUuid},
    variants::{PopulationKey, Segment, Variant, VariantStats, VariantStatus},
};
use sqlx::{FromRow, Postgres, Row, Transaction, postgres::PgRow, query, query_as, query_scalar};
use uuid::Uuid;

use crate::{
    database::Db,
    store::{RepositoryError, decode_enum, decode_u64, encode_u64},
};

const CREATE_VARIANT_SQL: &str = include_str!("sql/create_variant.sql");
const GET_VARIANT_SQL: &str = include_str!("sql/get_variant.sql");
const GET_VARIANT_FOR_UPDATE_SQL: &str = include_str!("sql/get_variant_for_update.sql");
const LIST_POPULATION_SQL: &str = include_str!("sql/list_population.sql");
const LIST_SERVABLE_SQL: &str = include_str!("sql/list_servable.sql");
const LIST_POPULATIONS_SQL: &str = include_str!("sql/list_populations.sql");
const UPDATE_STATUS_SQL: &str = include_str!("sql/update_status.sql");
const DEMOTE_CHAMPION_SQL: &str = include_str!("sql/demote_champion.sql");
const KILL_VARIANTS_SQL: &str = include_str!("sql/kill_variants.sql");
const LOCK_VARIANTS_SQL: &str = include_str!("sql/lock_variants.sql");
const REFRESH_STATS_SQL: &str = include_str!("sql/refresh_stats.sql");
const GET_LAST_CYCLE_SQL: &str = include_str!("sql/get_last_cycle.sql");
const RECORD_CYCLE_SQL: &str = include_str!("sql/record_cycle.sql");

#[automock]
#[async_trait]
pub trait VariantsRepository: Send + Sync {
    /// Store a new variant.
    async fn create(&self, variant: &Variant) -> Result<(), RepositoryError>;

    /// Retrieve a single variant.
    async fn get(&self, shop: ShopUuid, variant: VariantUuid) -> Result<Variant, RepositoryError>;

    /// Variants of one population, oldest first.
    async fn list_population(
        &self,
        shop: ShopUuid,
        key: &PopulationKey,
        include_killed: bool,
    ) -> Result<Vec<Variant>, RepositoryError>;

    /// Every non-killed variant of the shop, across all populations.
    async fn list_servable(&self, shop: ShopUuid) -> Result<Vec<Variant>, RepositoryError>;

    /// Every population the shop has variants in.
    async fn list_populations(&self, shop: ShopUuid) -> Result<Vec<PopulationKey>, RepositoryError>;

    /// Move a variant from `from` to `to`.
    ///
    /// Fails with [`RepositoryError::Conflict`] when the stored status is no longer
    /// `from`.
    async fn update_status(
        &self,
        shop: ShopUuid,
        variant: VariantUuid,
        from: VariantStatus,
        to: VariantStatus,
    ) -> Result<Variant, RepositoryError>;

    /// Make a variant its population's champion, demoting the previous champion in
    /// the same transaction.
    async fn promote_champion(
        &self,
        shop: ShopUuid,
        variant: VariantUuid,
        from: VariantStatus,
    ) -> Result<Variant, RepositoryError>;

    /// Kill and insert the variants of an evolution plan atomically.
    async fn apply_plan(&self, shop: ShopUuid, plan: &EvolutionPlan) -> Result<(), RepositoryError>;

    /// Recompute the cached stats of `variants` from the impression log.
    ///
    /// Reading the log and writing the counters is one atomic step, so impressions and
    /// outcomes recorded concurrently are never dropped from the cache.
    async fn refresh_stats(
        &self,
        shop: ShopUuid,
        variants: &[VariantUuid],
    ) -> Result<(), RepositoryError>;

    /// When the shop last completed a threshold-triggered round of cycles.
    async fn last_cycle_at(&self, shop: ShopUuid) -> Result<Option<Timestamp>, RepositoryError>;

    /// Record a completed round of cycles. Never moves the clock backwards.
    async fn record_cycle(&self, shop: ShopUuid, at: Timestamp) -> Result<(), RepositoryError>;
}

fn population_key(baseline: &str, segment_key: String) -> Result<PopulationKey, sqlx::Error> {
    let baseline = baseline.parse().map_err(|e| sqlx::Error::ColumnDecode {
        index: "baseline".to_string(),
        source: Box::new(e),
    })?;

    let segment = (!segment_key.is_empty()).then(|| Segment::new(segment_key));

    Ok(PopulationKey::new(baseline, segment))
}

struct VariantRecord(Variant);

impl<'r> FromRow<'r, PgRow> for VariantRecord {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let baseline: String = row.try_get("baseline")?;
        let generation: i32 = row.try_get("generation")?;
        let status: VariantStatus = decode_enum(row, "status")?;

        let mut variant = Variant {
            uuid: VariantUuid::from_uuid(row.try_get("uuid")?),
            shop: ShopUuid::from_uuid(row.try_get("shop_uuid")?),
            key: population_key(&baseline, row.try_get("segment_key")?)?,
            genes: Genes {
                headline: row.try_get("headline")?,
                subhead: row.try_get("subhead")?,
                cta: row.try_get("cta")?,
                offer_type: decode_enum(row, "offer_type")?,
                offer_amount: decode_u64(row, "offer_amount")?,
                redirect: decode_enum(row, "redirect")?,
                urgency: row.try_get("urgency")?,
            },
            generation: u32::try_from(generation).map_err(|e| sqlx::Error::ColumnDecode {
                index: "generation".to_string(),
                source: Box::new(e),
            })?,
            status,
            is_champion: false,
            stats: VariantStats {
                impressions: decode_u64(row, "impressions")?,
                clicks: decode_u64(row, "clicks")?,
                conversions: decode_u64(row, "conversions")?,
                revenue: decode_u64(row, "revenue")?,
            },
            created_at: row.try_get::<SqlxTimestamp, _>("created_at")?.to_jiff(),
        };
        variant.set_status(status);

        Ok(Self(variant))
    }
}

struct PopulationRecord(PopulationKey);

impl<'r> FromRow<'r, PgRow> for PopulationRecord {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let baseline: String = row.try_get("baseline")?;

        Ok(Self(population_key(&baseline, row.try_get("segment_key")?)?))
    }
}

#[derive(Debug, Clone)]
pub struct PgVariantsRepository {
    db: Db,
}

impl PgVariantsRepository {
    #[must_use]
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    async fn insert(
        tx: &mut Transaction<'_, Postgres>,
        variant: &Variant,
    ) -> Result<(), sqlx::Error> {
        let generation = i32::try_from(variant.generation).map_err(|e| sqlx::Error::Encode(Box::new(e)))?;

        query(CREATE_VARIANT_SQL)
            .bind(variant.uuid.into_uuid())
            .bind(variant.shop.into_uuid())
            .bind(variant.key.baseline.as_str())
            .bind(variant.key.segment_key())
            .bind(&variant.genes.headline)
            .bind(&variant.genes.subhead)
            .bind(&variant.genes.cta)
            .bind(variant.genes.offer_type.as_str())
            .bind(encode_u64("offer_amount", variant.genes.offer_amount)?)
            .bind(variant.genes.redirect.as_str())
            .bind(variant.genes.urgency)
            .bind(generation)
            .bind(variant.status.as_str())
            .bind(encode_u64("impressions", variant.stats.impressions)?)
            .bind(encode_u64("clicks", variant.stats.clicks)?)
            .bind(encode_u64("conversions", variant.stats.conversions)?)
            .bind(encode_u64("revenue", variant.stats.revenue)?)
            .bind(SqlxTimestamp::from(variant.created_at))
            .execute(&mut **tx)
            .await?;

        Ok(())
    }

    /// Distinguish a lost compare-and-swap from a missing row.
    async fn conflict_or_missing(
        tx: &mut Transaction<'_, Postgres>,
        variant: VariantUuid,
    ) -> RepositoryError {
        let existing = query_as::<Postgres, VariantRecord>(GET_VARIANT_SQL)
            .bind(variant.into_uuid())
            .fetch_optional(&mut **tx)
            .await;

        match existing {
            Ok(Some(_)) => RepositoryError::Conflict,
            Ok(None) => RepositoryError::NotFound,
            Err(error) => RepositoryError::from(error),
        }
    }
}

#[async_trait]
impl VariantsRepository for PgVariantsRepository {
    async fn create(&self, variant: &Variant) -> Result<(), RepositoryError> {
        let mut tx = self.db.begin_shop_transaction(variant.shop).await?;

        Self::insert(&mut tx, variant).await?;

        tx.commit().await?;

        Ok(())
    }

    async fn get(&self, shop: ShopUuid, variant: VariantUuid) -> Result<Variant, RepositoryError> {
        let mut tx = self.db.begin_shop_transaction(shop).await?;

        let record = query_as::<Postgres, VariantRecord>(GET_VARIANT_SQL)
            .bind(variant.into_uuid())
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(record.0)
    }

    async fn list_population(
        &self,
        shop: ShopUuid,
        key: &PopulationKey,
        include_killed: bool,
    ) -> Result<Vec<Variant>, RepositoryError> {
        let mut tx = self.db.begin_shop_transaction(shop).await?;

        let records = query_as::<Postgres, VariantRecord>(LIST_POPULATION_SQL)
            .bind(shop.into_uuid())
            .bind(key.baseline.as_str())
            .bind(key.segment_key())
            .bind(include_killed)
            .fetch_all(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(records.into_iter().map(|record| record.0).collect())
    }

    async fn list_servable(&self, shop: ShopUuid) -> Result<Vec<Variant>, RepositoryError> {
        let mut tx = self.db.begin_shop_transaction(shop).await?;

        let records = query_as::<Postgres, VariantRecord>(LIST_SERVABLE_SQL)
            .bind(shop.into_uuid())
            .fetch_all(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(records.into_iter().map(|record| record.0).collect())
    }

    async fn list_populations(&self, shop: ShopUuid) -> Result<Vec<PopulationKey>, RepositoryError> {
        let mut tx = self.db.begin_shop_transaction(shop).await?;

        let records = query_as::<Postgres, PopulationRecord>(LIST_POPULATIONS_SQL)
            .bind(shop.into_uuid())
            .fetch_all(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(records.into_iter().map(|record| record.0).collect())
    }

    async fn update_status(
        &self,
        shop: ShopUuid,
        variant: VariantUuid,
        from: VariantStatus,
        to: VariantStatus,
    ) -> Result<Variant, RepositoryError> {
        let mut tx = self.db.begin_shop_transaction(shop).await?;

        let updated = query_as::<Postgres, VariantRecord>(UPDATE_STATUS_SQL)
            .bind(variant.into_uuid())
            .bind(from.as_str())
            .bind(to.as_str())
            .fetch_optional(&mut *tx)
            .await?;

        let Some(updated) = updated else {
            return Err(Self::conflict_or_missing(&mut tx, variant).await);
        };

        tx.commit().await?;

        Ok(updated.0)
    }

    async fn promote_champion(
        &self,
        shop: ShopUuid,
        variant: VariantUuid,
        from: VariantStatus,
    ) -> Result<Variant, RepositoryError> {
        let mut tx = self.db.begin_shop_transaction(shop).await?;

        let current = query_as::<Postgres, VariantRecord>(GET_VARIANT_FOR_UPDATE_SQL)
            .bind(variant.into_uuid())
            .fetch_one(&mut *tx)
            .await?
            .0;

        if current.status != from {
            return Err(RepositoryError::Conflict);
        }

        query(DEMOTE_CHAMPION_SQL)
            .bind(shop.into_uuid())
            .bind(current.key.baseline.as_str())
            .bind(current.key.segment_key())
            .bind(variant.into_uuid())
            .execute(&mut *tx)
            .await?;

        // A concurrent promotion in the same population trips the partial unique index.
        let promoted = query_as::<Postgres, VariantRecord>(UPDATE_STATUS_SQL)
            .bind(variant.into_uuid())
            .bind(from.as_str())
            .bind(VariantStatus::Champion.as_str())
            .fetch_one(&mut *tx)
            .await
            .map_err(|error| match RepositoryError::from(error) {
                RepositoryError::AlreadyExists => RepositoryError::Conflict,
                error => error,
            })?;

        tx.commit().await?;

        Ok(promoted.0)
    }

    async fn apply_plan(&self, shop: ShopUuid, plan: &EvolutionPlan) -> Result<(), RepositoryError> {
        let mut tx = self.db.begin_shop_transaction(shop).await?;

        let kills: Vec<Uuid> = plan.kills.iter().map(|uuid| uuid.into_uuid()).collect();

        let killed = query(KILL_VARIANTS_SQL)
            .bind(shop.into_uuid())
            .bind(&kills)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        // A merchant protected or promoted a doomed variant mid-cycle.
        if usize::try_from(killed).ok() != Some(kills.len()) {
            return Err(RepositoryError::Conflict);
        }

        for child in &plan.offspring {
            Self::insert(&mut tx, child).await?;
        }

        tx.commit().await?;

        Ok(())
    }

    async fn refresh_stats(
        &self,
        shop: ShopUuid,
        variants: &[VariantUuid],
    ) -> Result<(), RepositoryError> {
        let uuids: Vec<Uuid> = variants.iter().map(|variant| variant.into_uuid()).collect();
        let mut tx = self.db.begin_shop_transaction(shop).await?;

        // Counter writers queue behind these locks, so the aggregate below sees every
        // impression whose counter update has committed.
        let locked: Vec<Uuid> = query_scalar(LOCK_VARIANTS_SQL)
            .bind(shop.into_uuid())
            .bind(&uuids)
            .fetch_all(&mut *tx)
            .await?;

        if locked.len() != uuids.len() {
            return Err(RepositoryError::NotFound);
        }

        query(REFRESH_STATS_SQL)
            .bind(shop.into_uuid())
            .bind(&uuids)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(())
    }

    async fn last_cycle_at(&self, shop: ShopUuid) -> Result<Option<Timestamp>, RepositoryError> {
        let mut tx = self.db.begin_shop_transaction(shop).await?;

        let last: Option<SqlxTimestamp> = query_scalar(GET_LAST_CYCLE_SQL)
            .bind(shop.into_uuid())
            .fetch_optional(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(last.map(SqlxTimestamp::to_jiff))
    }

    async fn record_cycle(&self, shop: ShopUuid, at: Timestamp) -> Result<(), RepositoryError> {
        let mut tx = self.db.begin_shop_transaction(shop).await?;

        query(RECORD_CYCLE_SQL)
            .bind(shop.into_uuid())
            .bind(SqlxTimestamp::from(at))
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(())
    }
}
