//! In-memory store
//!
//! Implements every repository over per-shop partitions. Each partition sits behind
//! its own `tokio` mutex, so shops never contend with one another and every
//! multi-record write is atomic within its shop.

use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use async_trait::async_trait;
use jiff::{SignedDuration, Timestamp};
use recoup::{
    budget::{BudgetLedger, BudgetSettings},
    config::ShopConfig,
    evolution::EvolutionPlan,
    fitness::{FitnessMetrics, evaluate},
    ids::{ImpressionUuid, PromotionUuid, ShopUuid, VariantUuid},
    impressions::{Impression, ImpressionFilter, OutcomeEvent},
    promotions::{MerchantOverride, Promotion, PromotionStatus},
    variants::{PopulationKey, Variant, VariantStatus},
};
use rustc_hash::{FxHashMap, FxHashSet};
use slotmap::{SlotMap, new_key_type};
use tokio::sync::Mutex;

use crate::{
    domain::{
        budgets::{BudgetsRepository, Reservation},
        impressions::{ImpressionsRepository, StatsDelta},
        promotions::PromotionsRepository,
        shops::ShopsRepository,
        variants::VariantsRepository,
    },
    store::RepositoryError,
};

const USAGE_WINDOW: SignedDuration = SignedDuration::from_hours(24);

new_key_type! {
    struct VariantKey;
}

#[derive(Debug, Default)]
struct ShopPartition {
    config: Option<ShopConfig>,
    variants: SlotMap<VariantKey, Variant>,
    variant_index: FxHashMap<VariantUuid, VariantKey>,
    champions: FxHashMap<PopulationKey, VariantKey>,
    last_cycle_at: Option<Timestamp>,
    impressions: FxHashMap<ImpressionUuid, Impression>,
    promotions: FxHashMap<PromotionUuid, Promotion>,
    usages: FxHashMap<PromotionUuid, FxHashMap<String, Timestamp>>,
    ledger: Option<BudgetLedger>,
}

impl ShopPartition {
    fn require_shop(&self) -> Result<(), RepositoryError> {
        if self.config.is_none() {
            return Err(RepositoryError::InvalidReference);
        }

        Ok(())
    }

    fn variant(&self, uuid: VariantUuid) -> Result<&Variant, RepositoryError> {
        self.variant_index
            .get(&uuid)
            .and_then(|key| self.variants.get(*key))
            .ok_or(RepositoryError::NotFound)
    }

    fn variant_mut(&mut self, uuid: VariantUuid) -> Result<&mut Variant, RepositoryError> {
        self.variant_index
            .get(&uuid)
            .and_then(|key| self.variants.get_mut(*key))
            .ok_or(RepositoryError::NotFound)
    }

    fn insert_variant(&mut self, variant: Variant) -> Result<(), RepositoryError> {
        if self.variant_index.contains_key(&variant.uuid) {
            return Err(RepositoryError::AlreadyExists);
        }

        let uuid = variant.uuid;
        let champion = variant.status == VariantStatus::Champion;
        let population = variant.key.clone();

        if champion && self.champions.contains_key(&population) {
            return Err(RepositoryError::AlreadyExists);
        }

        let key = self.variants.insert(variant);
        self.variant_index.insert(uuid, key);

        if champion {
            self.champions.insert(population, key);
        }

        Ok(())
    }

    fn sorted<'a>(variants: impl Iterator<Item = &'a Variant>) -> Vec<Variant> {
        let mut variants: Vec<Variant> = variants.cloned().collect();
        variants.sort_by_key(|variant| (variant.created_at, variant.uuid));
        variants
    }

    fn open_promotion_by_code(&self, code: &str, at: Timestamp) -> Option<PromotionUuid> {
        self.promotions
            .values()
            .find(|promotion| promotion.code == code && promotion.is_open_at(at))
            .map(|promotion| promotion.uuid)
    }
}

/// Volatile store for development and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    shops: Arc<StdMutex<FxHashMap<ShopUuid, Arc<Mutex<ShopPartition>>>>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn partition(&self, shop: ShopUuid) -> Arc<Mutex<ShopPartition>> {
        let mut shops = self.shops.lock().unwrap_or_else(PoisonError::into_inner);

        Arc::clone(shops.entry(shop).or_default())
    }
}

#[async_trait]
impl ShopsRepository for MemoryStore {
    async fn get_config(&self, shop: ShopUuid) -> Result<Option<ShopConfig>, RepositoryError> {
        Ok(self.partition(shop).lock().await.config.clone())
    }

    async fn upsert_config(
        &self,
        shop: ShopUuid,
        config: &ShopConfig,
    ) -> Result<(), RepositoryError> {
        self.partition(shop).lock().await.config = Some(config.clone());

        Ok(())
    }
}

#[async_trait]
impl VariantsRepository for MemoryStore {
    async fn create(&self, variant: &Variant) -> Result<(), RepositoryError> {
        let partition = self.partition(variant.shop);
        let mut partition = partition.lock().await;

        partition.require_shop()?;
        partition.insert_variant(variant.clone())
    }

    async fn get(&self, shop: ShopUuid, variant: VariantUuid) -> Result<Variant, RepositoryError> {
        self.partition(shop).lock().await.variant(variant).cloned()
    }

    async fn list_population(
        &self,
        shop: ShopUuid,
        key: &PopulationKey,
        include_killed: bool,
    ) -> Result<Vec<Variant>, RepositoryError> {
        let partition = self.partition(shop);
        let partition = partition.lock().await;

        Ok(ShopPartition::sorted(partition.variants.values().filter(
            |variant| {
                variant.key == *key && (include_killed || variant.status != VariantStatus::Killed)
            },
        )))
    }

    async fn list_servable(&self, shop: ShopUuid) -> Result<Vec<Variant>, RepositoryError> {
        let partition = self.partition(shop);
        let partition = partition.lock().await;

        Ok(ShopPartition::sorted(
            partition.variants.values().filter(|variant| variant.is_servable()),
        ))
    }

    async fn list_populations(&self, shop: ShopUuid) -> Result<Vec<PopulationKey>, RepositoryError> {
        let partition = self.partition(shop);
        let partition = partition.lock().await;

        let mut keys: Vec<PopulationKey> = partition
            .variants
            .values()
            .map(|variant| variant.key.clone())
            .collect::<FxHashSet<_>>()
            .into_iter()
            .collect();
        keys.sort();

        Ok(keys)
    }

    async fn update_status(
        &self,
        shop: ShopUuid,
        variant: VariantUuid,
        from: VariantStatus,
        to: VariantStatus,
    ) -> Result<Variant, RepositoryError> {
        let partition = self.partition(shop);
        let mut partition = partition.lock().await;

        let current = partition.variant_mut(variant)?;

        if current.status != from {
            return Err(RepositoryError::Conflict);
        }

        current.set_status(to);

        let updated = current.clone();

        if from == VariantStatus::Champion {
            partition.champions.remove(&updated.key);
        }

        Ok(updated)
    }

    async fn promote_champion(
        &self,
        shop: ShopUuid,
        variant: VariantUuid,
        from: VariantStatus,
    ) -> Result<Variant, RepositoryError> {
        let partition = self.partition(shop);
        let mut partition = partition.lock().await;

        let key = *partition
            .variant_index
            .get(&variant)
            .ok_or(RepositoryError::NotFound)?;

        let population = {
            let current = partition.variants.get(key).ok_or(RepositoryError::NotFound)?;

            if current.status != from {
                return Err(RepositoryError::Conflict);
            }

            current.key.clone()
        };

        if let Some(previous) = partition.champions.insert(population, key)
            && previous != key
            && let Some(previous) = partition.variants.get_mut(previous)
        {
            previous.set_status(VariantStatus::Alive);
        }

        let promoted = partition.variants.get_mut(key).ok_or(RepositoryError::NotFound)?;
        promoted.set_status(VariantStatus::Champion);

        Ok(promoted.clone())
    }

    async fn apply_plan(&self, shop: ShopUuid, plan: &EvolutionPlan) -> Result<(), RepositoryError> {
        let partition = self.partition(shop);
        let mut partition = partition.lock().await;

        partition.require_shop()?;

        for uuid in &plan.kills {
            if partition.variant(*uuid)?.status != VariantStatus::Alive {
                return Err(RepositoryError::Conflict);
            }
        }

        if plan
            .offspring
            .iter()
            .any(|child| partition.variant_index.contains_key(&child.uuid))
        {
            return Err(RepositoryError::AlreadyExists);
        }

        for uuid in &plan.kills {
            partition.variant_mut(*uuid)?.set_status(VariantStatus::Killed);
        }

        for child in &plan.offspring {
            partition.insert_variant(child.clone())?;
        }

        Ok(())
    }

    async fn refresh_stats(
        &self,
        shop: ShopUuid,
        variants: &[VariantUuid],
    ) -> Result<(), RepositoryError> {
        let partition = self.partition(shop);
        let mut partition = partition.lock().await;

        let totals = evaluate(
            partition.impressions.values().filter(|impression| {
                impression
                    .variant
                    .is_some_and(|variant| variants.contains(&variant))
            }),
            &ImpressionFilter::default(),
        );

        for uuid in variants {
            partition.variant_mut(*uuid)?.stats = totals
                .get(uuid)
                .map(FitnessMetrics::as_stats)
                .unwrap_or_default();
        }

        Ok(())
    }

    async fn last_cycle_at(&self, shop: ShopUuid) -> Result<Option<Timestamp>, RepositoryError> {
        Ok(self.partition(shop).lock().await.last_cycle_at)
    }

    async fn record_cycle(&self, shop: ShopUuid, at: Timestamp) -> Result<(), RepositoryError> {
        let partition = self.partition(shop);
        let mut partition = partition.lock().await;

        partition.require_shop()?;
        partition.last_cycle_at = Some(partition.last_cycle_at.map_or(at, |last| last.max(at)));

        Ok(())
    }
}

#[async_trait]
impl ImpressionsRepository for MemoryStore {
    async fn record(&self, impression: &Impression) -> Result<(), RepositoryError> {
        let partition = self.partition(impression.shop);
        let mut partition = partition.lock().await;

        partition.require_shop()?;

        if partition.impressions.contains_key(&impression.uuid) {
            return Err(RepositoryError::AlreadyExists);
        }

        if let Some(variant) = impression.variant {
            let variant = partition
                .variant_mut(variant)
                .map_err(|_not_found| RepositoryError::InvalidReference)?;

            variant.stats.impressions = variant.stats.impressions.saturating_add(1);
        }

        partition
            .impressions
            .insert(impression.uuid, impression.clone());

        Ok(())
    }

    async fn get(
        &self,
        shop: ShopUuid,
        impression: ImpressionUuid,
    ) -> Result<Impression, RepositoryError> {
        self.partition(shop)
            .lock()
            .await
            .impressions
            .get(&impression)
            .cloned()
            .ok_or(RepositoryError::NotFound)
    }

    async fn apply_outcome(
        &self,
        shop: ShopUuid,
        impression: ImpressionUuid,
        event: OutcomeEvent,
        revenue: u64,
    ) -> Result<bool, RepositoryError> {
        let partition = self.partition(shop);
        let mut partition = partition.lock().await;

        let stored = partition
            .impressions
            .get_mut(&impression)
            .ok_or(RepositoryError::NotFound)?;

        let before = stored.clone();

        if !stored.apply_outcome(event, revenue) {
            return Ok(false);
        }

        let delta = StatsDelta::between(&before, stored);
        let variant = stored.variant;

        if let Some(variant) = variant
            && let Ok(variant) = partition.variant_mut(variant)
        {
            let stats = &mut variant.stats;
            stats.clicks = stats.clicks.saturating_add(delta.clicks);
            stats.conversions = stats.conversions.saturating_add(delta.conversions);
            stats.revenue = stats.revenue.saturating_add(delta.revenue);
        }

        Ok(true)
    }

    async fn list_for_variants(
        &self,
        shop: ShopUuid,
        variants: &[VariantUuid],
    ) -> Result<Vec<Impression>, RepositoryError> {
        let partition = self.partition(shop);
        let partition = partition.lock().await;

        let mut impressions: Vec<Impression> = partition
            .impressions
            .values()
            .filter(|impression| {
                impression
                    .variant
                    .is_some_and(|variant| variants.contains(&variant))
            })
            .cloned()
            .collect();
        impressions.sort_by_key(|impression| (impression.served_at, impression.uuid));

        Ok(impressions)
    }

    async fn count_since(
        &self,
        shop: ShopUuid,
        since: Option<Timestamp>,
    ) -> Result<u64, RepositoryError> {
        let partition = self.partition(shop);
        let partition = partition.lock().await;

        let count = partition
            .impressions
            .values()
            .filter(|impression| impression.variant.is_some())
            .filter(|impression| since.is_none_or(|since| impression.served_at > since))
            .count();

        Ok(u64::try_from(count).unwrap_or(u64::MAX))
    }
}

#[async_trait]
impl PromotionsRepository for MemoryStore {
    async fn create(&self, promotion: &Promotion) -> Result<(), RepositoryError> {
        let partition = self.partition(promotion.shop);
        let mut partition = partition.lock().await;

        partition.require_shop()?;

        let duplicate = partition.promotions.contains_key(&promotion.uuid)
            || partition.promotions.values().any(|open| {
                open.code == promotion.code && open.status != PromotionStatus::Ended
            });

        if duplicate {
            return Err(RepositoryError::AlreadyExists);
        }

        partition
            .promotions
            .insert(promotion.uuid, promotion.clone());

        Ok(())
    }

    async fn get(
        &self,
        shop: ShopUuid,
        promotion: PromotionUuid,
    ) -> Result<Promotion, RepositoryError> {
        self.partition(shop)
            .lock()
            .await
            .promotions
            .get(&promotion)
            .cloned()
            .ok_or(RepositoryError::NotFound)
    }

    async fn list(&self, shop: ShopUuid) -> Result<Vec<Promotion>, RepositoryError> {
        let partition = self.partition(shop);
        let partition = partition.lock().await;

        let mut promotions: Vec<Promotion> = partition.promotions.values().cloned().collect();
        promotions.sort_by(|a, b| {
            b.detected_at
                .cmp(&a.detected_at)
                .then_with(|| a.uuid.cmp(&b.uuid))
        });

        Ok(promotions)
    }

    async fn list_open(
        &self,
        shop: ShopUuid,
        now: Timestamp,
    ) -> Result<Vec<Promotion>, RepositoryError> {
        let partition = self.partition(shop);
        let partition = partition.lock().await;

        let mut promotions: Vec<Promotion> = partition
            .promotions
            .values()
            .filter(|promotion| promotion.is_open_at(now))
            .cloned()
            .collect();
        promotions.sort_by_key(|promotion| (promotion.detected_at, promotion.uuid));

        Ok(promotions)
    }

    async fn record_usage(
        &self,
        shop: ShopUuid,
        code: &str,
        order_id: &str,
        at: Timestamp,
    ) -> Result<Option<Promotion>, RepositoryError> {
        let partition = self.partition(shop);
        let mut partition = partition.lock().await;

        let Some(uuid) = partition.open_promotion_by_code(code, at) else {
            return Ok(None);
        };

        let usages = partition.usages.entry(uuid).or_default();

        if usages.contains_key(order_id) {
            return Ok(partition.promotions.get(&uuid).cloned());
        }

        usages.insert(order_id.to_string(), at);

        let window_start = at.checked_sub(USAGE_WINDOW)?;
        let last_24h = usages
            .values()
            .filter(|used_at| **used_at > window_start && **used_at <= at)
            .count();

        let promotion = partition
            .promotions
            .get_mut(&uuid)
            .ok_or(RepositoryError::NotFound)?;

        promotion.record_usage(at);
        promotion.usage_last_24h = u64::try_from(last_24h).unwrap_or(u64::MAX);

        Ok(Some(promotion.clone()))
    }

    async fn save_classification(&self, promotion: &Promotion) -> Result<(), RepositoryError> {
        let partition = self.partition(promotion.shop);
        let mut partition = partition.lock().await;

        let stored = partition
            .promotions
            .get_mut(&promotion.uuid)
            .ok_or(RepositoryError::NotFound)?;

        if stored.status == PromotionStatus::Ended {
            return Err(RepositoryError::Conflict);
        }

        stored.classification = promotion.classification;
        stored.strategy = promotion.strategy;
        stored.classified_at = promotion.classified_at;
        stored.status = promotion.status;

        Ok(())
    }

    async fn set_override(
        &self,
        shop: ShopUuid,
        promotion: PromotionUuid,
        merchant_override: Option<MerchantOverride>,
    ) -> Result<Promotion, RepositoryError> {
        let partition = self.partition(shop);
        let mut partition = partition.lock().await;

        let stored = partition
            .promotions
            .get_mut(&promotion)
            .ok_or(RepositoryError::NotFound)?;

        stored.merchant_override = merchant_override;

        Ok(stored.clone())
    }

    async fn end(
        &self,
        shop: ShopUuid,
        promotion: PromotionUuid,
        at: Timestamp,
    ) -> Result<Promotion, RepositoryError> {
        let partition = self.partition(shop);
        let mut partition = partition.lock().await;

        let stored = partition
            .promotions
            .get_mut(&promotion)
            .ok_or(RepositoryError::NotFound)?;

        stored.end(at).or(Err(RepositoryError::Conflict))?;

        Ok(stored.clone())
    }
}

#[async_trait]
impl BudgetsRepository for MemoryStore {
    async fn reserve(
        &self,
        shop: ShopUuid,
        settings: &BudgetSettings,
        cost: u64,
        now: Timestamp,
    ) -> Result<Reservation, RepositoryError> {
        let partition = self.partition(shop);
        let mut partition = partition.lock().await;

        partition.require_shop()?;

        let mut ledger = match partition.ledger {
            Some(ledger) => ledger,
            None => BudgetLedger::open(settings.period, now)?,
        };

        let reservation = Reservation::against(&mut ledger, settings, cost, now)?;
        partition.ledger = Some(ledger);

        Ok(reservation)
    }

    async fn release(
        &self,
        shop: ShopUuid,
        cost: u64,
        reserved_at: Timestamp,
    ) -> Result<(), RepositoryError> {
        let partition = self.partition(shop);
        let mut partition = partition.lock().await;

        if let Some(ledger) = partition.ledger.as_mut() {
            ledger.release(cost, reserved_at);
        }

        Ok(())
    }

    async fn ledger(&self, shop: ShopUuid) -> Result<Option<BudgetLedger>, RepositoryError> {
        Ok(self.partition(shop).lock().await.ledger)
    }
}

#[cfg(test)]
mod tests {
    use jiff::ToSpan;
    use recoup::{
        budget::BudgetPeriod,
        decisions::OfferKind,
        genes::Genes,
        promotions::DiscountType,
        signals::VisitorSignals,
        variants::{Baseline, Segment, VariantStats},
    };
    use testresult::TestResult;

    use super::*;

    async fn store_with_shop() -> Result<(MemoryStore, ShopUuid), RepositoryError> {
        let store = MemoryStore::new();
        let shop = ShopUuid::new();

        store.upsert_config(shop, &ShopConfig::default()).await?;

        Ok((store, shop))
    }

    fn variant(shop: ShopUuid, key: &PopulationKey) -> Variant {
        Variant::new(
            VariantUuid::new(),
            shop,
            key.clone(),
            Genes {
                headline: "Wait!".to_string(),
                subhead: "Your cart misses you".to_string(),
                cta: "Take me back".to_string(),
                offer_amount: 10,
                ..Genes::default()
            },
            1,
            Timestamp::now(),
        )
    }

    fn impression(shop: ShopUuid, variant: VariantUuid) -> Impression {
        Impression {
            uuid: ImpressionUuid::new(),
            shop,
            variant: Some(variant),
            baseline: Baseline::RevenueWithDiscount,
            segment: Segment::new("desktop-direct-low"),
            signals: VisitorSignals::default(),
            served_at: Timestamp::now(),
            during_promotion: false,
            offer: OfferKind::Percentage,
            discount_cost: 0,
            clicked: false,
            converted: false,
            revenue: 0,
        }
    }

    #[tokio::test]
    async fn promoting_a_champion_demotes_the_previous_one() -> TestResult {
        let (store, shop) = store_with_shop().await?;
        let key = PopulationKey::shop_wide(Baseline::RevenueWithDiscount);
        let first = variant(shop, &key);
        let second = variant(shop, &key);

        VariantsRepository::create(&store, &first).await?;
        VariantsRepository::create(&store, &second).await?;

        store
            .promote_champion(shop, first.uuid, VariantStatus::Alive)
            .await?;
        store
            .promote_champion(shop, second.uuid, VariantStatus::Alive)
            .await?;

        let population = store.list_population(shop, &key, false).await?;
        let champions: Vec<VariantUuid> = population
            .iter()
            .filter(|variant| variant.is_champion)
            .map(|variant| variant.uuid)
            .collect();

        assert_eq!(champions, vec![second.uuid]);
        assert_eq!(
            VariantsRepository::get(&store, shop, first.uuid).await?.status,
            VariantStatus::Alive
        );

        Ok(())
    }

    #[tokio::test]
    async fn stale_status_writes_conflict() -> TestResult {
        let (store, shop) = store_with_shop().await?;
        let key = PopulationKey::shop_wide(Baseline::RevenueWithDiscount);
        let variant = variant(shop, &key);

        VariantsRepository::create(&store, &variant).await?;

        store
            .update_status(shop, variant.uuid, VariantStatus::Alive, VariantStatus::Protected)
            .await?;

        let result = store
            .update_status(shop, variant.uuid, VariantStatus::Alive, VariantStatus::Killed)
            .await;

        assert!(
            matches!(result, Err(RepositoryError::Conflict)),
            "expected Conflict, got {result:?}"
        );

        Ok(())
    }

    #[tokio::test]
    async fn plans_killing_protected_variants_are_rejected_whole() -> TestResult {
        let (store, shop) = store_with_shop().await?;
        let key = PopulationKey::shop_wide(Baseline::RevenueWithDiscount);
        let doomed = variant(shop, &key);
        let child = variant(shop, &key);

        VariantsRepository::create(&store, &doomed).await?;
        store
            .update_status(shop, doomed.uuid, VariantStatus::Alive, VariantStatus::Protected)
            .await?;

        let plan = EvolutionPlan {
            key: key.clone(),
            kills: vec![doomed.uuid],
            offspring: vec![child],
            crossover_births: 0,
            fresh_births: 1,
            mutated_genes: 0,
            skipped_slots: 0,
        };

        let result = store.apply_plan(shop, &plan).await;

        assert!(
            matches!(result, Err(RepositoryError::Conflict)),
            "expected Conflict, got {result:?}"
        );
        assert_eq!(store.list_population(shop, &key, true).await?.len(), 1);

        Ok(())
    }

    #[tokio::test]
    async fn outcomes_apply_once_and_update_stats() -> TestResult {
        let (store, shop) = store_with_shop().await?;
        let key = PopulationKey::shop_wide(Baseline::RevenueWithDiscount);
        let variant = variant(shop, &key);
        let impression = impression(shop, variant.uuid);

        VariantsRepository::create(&store, &variant).await?;
        store.record(&impression).await?;

        assert!(
            store
                .apply_outcome(shop, impression.uuid, OutcomeEvent::Conversion, 5_000)
                .await?,
            "first delivery applies"
        );
        assert!(
            !store
                .apply_outcome(shop, impression.uuid, OutcomeEvent::Conversion, 5_000)
                .await?,
            "redelivery is ignored"
        );
        assert!(
            !store
                .apply_outcome(shop, impression.uuid, OutcomeEvent::Click, 0)
                .await?,
            "conversion already implied the click"
        );

        let stats = VariantsRepository::get(&store, shop, variant.uuid).await?.stats;

        assert_eq!(
            stats,
            VariantStats {
                impressions: 1,
                clicks: 1,
                conversions: 1,
                revenue: 5_000,
            }
        );

        Ok(())
    }

    #[tokio::test]
    async fn unknown_impressions_are_not_found() -> TestResult {
        let (store, shop) = store_with_shop().await?;

        let result = store
            .apply_outcome(shop, ImpressionUuid::new(), OutcomeEvent::Click, 0)
            .await;

        assert!(
            matches!(result, Err(RepositoryError::NotFound)),
            "expected NotFound, got {result:?}"
        );

        Ok(())
    }

    #[tokio::test]
    async fn refreshed_stats_match_the_log() -> TestResult {
        let (store, shop) = store_with_shop().await?;
        let key = PopulationKey::shop_wide(Baseline::RevenueWithDiscount);
        let variant = variant(shop, &key);
        let clicked = impression(shop, variant.uuid);

        VariantsRepository::create(&store, &variant).await?;
        store.record(&clicked).await?;
        store.record(&impression(shop, variant.uuid)).await?;
        store
            .apply_outcome(shop, clicked.uuid, OutcomeEvent::Click, 0)
            .await?;

        {
            let partition = store.partition(shop);
            let mut partition = partition.lock().await;
            partition.variant_mut(variant.uuid)?.stats = VariantStats::default();
        }

        store.refresh_stats(shop, &[variant.uuid]).await?;

        let stats = VariantsRepository::get(&store, shop, variant.uuid).await?.stats;

        assert_eq!(
            stats,
            VariantStats {
                impressions: 2,
                clicks: 1,
                conversions: 0,
                revenue: 0,
            }
        );

        Ok(())
    }

    #[tokio::test]
    async fn fresh_impressions_are_counted_across_populations() -> TestResult {
        let (store, shop) = store_with_shop().await?;
        let desktop = variant(
            shop,
            &PopulationKey::new(
                Baseline::RevenueWithDiscount,
                Some(Segment::new("desktop-direct-low")),
            ),
        );
        let mobile = variant(
            shop,
            &PopulationKey::new(
                Baseline::RevenueWithDiscount,
                Some(Segment::new("mobile-paid-high")),
            ),
        );

        VariantsRepository::create(&store, &desktop).await?;
        VariantsRepository::create(&store, &mobile).await?;
        store.record(&impression(shop, desktop.uuid)).await?;
        store.record(&impression(shop, mobile.uuid)).await?;

        assert_eq!(store.count_since(shop, None).await?, 2);

        let cycled_at = Timestamp::now();
        store.record_cycle(shop, cycled_at).await?;
        store
            .record(&Impression {
                served_at: cycled_at.checked_add(1.second())?,
                ..impression(shop, mobile.uuid)
            })
            .await?;

        let last = store.last_cycle_at(shop).await?;

        assert_eq!(last, Some(cycled_at));
        assert_eq!(store.count_since(shop, last).await?, 1);

        Ok(())
    }

    #[tokio::test]
    async fn order_redelivery_counts_once() -> TestResult {
        let (store, shop) = store_with_shop().await?;
        let now = Timestamp::now();
        let promotion = Promotion::detect(
            PromotionUuid::new(),
            shop,
            "SPRING",
            DiscountType::Percentage,
            10,
            now.checked_sub(1.hour())?,
        );

        PromotionsRepository::create(&store, &promotion).await?;

        store.record_usage(shop, "SPRING", "order-1", now).await?;
        store.record_usage(shop, "SPRING", "order-1", now).await?;
        let updated = store.record_usage(shop, "SPRING", "order-2", now).await?;

        assert_eq!(updated.map(|p| (p.usage_total, p.usage_last_24h)), Some((2, 2)));
        assert_eq!(
            store.record_usage(shop, "UNKNOWN", "order-3", now).await?,
            None
        );

        Ok(())
    }

    #[tokio::test]
    async fn duplicate_open_codes_are_rejected() -> TestResult {
        let (store, shop) = store_with_shop().await?;
        let now = Timestamp::now();
        let first = Promotion::detect(
            PromotionUuid::new(),
            shop,
            "VIP",
            DiscountType::Fixed,
            500,
            now,
        );
        let second = Promotion::detect(
            PromotionUuid::new(),
            shop,
            "VIP",
            DiscountType::Fixed,
            500,
            now,
        );

        PromotionsRepository::create(&store, &first).await?;

        let result = PromotionsRepository::create(&store, &second).await;

        assert!(
            matches!(result, Err(RepositoryError::AlreadyExists)),
            "expected AlreadyExists, got {result:?}"
        );

        // Once the first ends the code is free again.
        PromotionsRepository::end(&store, shop, first.uuid, now).await?;
        PromotionsRepository::create(&store, &second).await?;

        Ok(())
    }

    #[tokio::test]
    async fn budget_reservations_stop_at_the_cap() -> TestResult {
        let (store, shop) = store_with_shop().await?;
        let now = Timestamp::now();
        let settings = BudgetSettings {
            enabled: true,
            amount: 100,
            period: BudgetPeriod::Week,
        };

        assert!(matches!(
            store.reserve(shop, &settings, 90, now).await?,
            Reservation::Granted(_)
        ));
        assert!(matches!(
            store.reserve(shop, &settings, 20, now).await?,
            Reservation::Denied(_)
        ));
        assert!(matches!(
            store.reserve(shop, &settings, 10, now).await?,
            Reservation::Granted(_)
        ));
        assert_eq!(store.ledger(shop).await?.map(|ledger| ledger.spent), Some(100));

        Ok(())
    }

    #[tokio::test]
    async fn writes_for_unknown_shops_are_invalid_references() {
        let store = MemoryStore::new();
        let shop = ShopUuid::new();
        let key = PopulationKey::shop_wide(Baseline::RevenueWithDiscount);

        let result = VariantsRepository::create(&store, &variant(shop, &key)).await;

        assert!(
            matches!(result, Err(RepositoryError::InvalidReference)),
            "expected InvalidReference, got {result:?}"
        );
    }
}
