//! Evolution service.

use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use async_trait::async_trait;
use jiff::Timestamp;
use mockall::automock;
use recoup::{
    evolution::{
        CYCLE_IMPRESSION_THRESHOLD, CycleInputs, SurvivorPolicy, cycle_due, default_survivors,
        plan_cycle,
    },
    config::ShopConfig,
    fitness::evaluate,
    genes::GenePool,
    ids::{ShopUuid, VariantUuid},
    impressions::ImpressionFilter,
    variants::PopulationKey,
};
use rustc_hash::FxHashMap;
use serde::Serialize;
use tracing::{Instrument, debug, info, warn};

use crate::{
    domain::{
        evolution::{errors::EvolutionServiceError, locks::PopulationLocks},
        impressions::ImpressionsRepository,
        shops::ShopsRepository,
        variants::VariantsRepository,
    },
    rng::SharedRng,
};

/// Why a cycle was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleTrigger {
    /// Run regardless of impression volume.
    Manual,

    /// Run only once enough impressions arrived since the last cycle.
    Threshold,

    /// Fill an empty population; a populated one is left alone.
    Seed,
}

impl CycleTrigger {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Threshold => "threshold",
            Self::Seed => "seed",
        }
    }
}

/// What a completed cycle changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub key: PopulationKey,
    pub killed: Vec<VariantUuid>,
    pub born: Vec<VariantUuid>,
    pub crossover_births: usize,
    pub fresh_births: usize,
    pub mutated_genes: usize,
    pub skipped_slots: usize,
    pub completed_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CycleOutcome {
    Completed(CycleReport),

    /// Another cycle holds the population.
    AlreadyRunning,

    /// The trigger's precondition did not hold.
    Skipped,
}

#[derive(Clone)]
pub struct StoreEvolutionService {
    shops: Arc<dyn ShopsRepository>,
    variants: Arc<dyn VariantsRepository>,
    impressions: Arc<dyn ImpressionsRepository>,
    pool: Arc<GenePool>,
    survivors: SurvivorPolicy,
    locks: PopulationLocks,
    counters: Arc<StdMutex<FxHashMap<ShopUuid, u64>>>,
    rng: SharedRng,
}

impl StoreEvolutionService {
    #[must_use]
    pub fn new(
        shops: Arc<dyn ShopsRepository>,
        variants: Arc<dyn VariantsRepository>,
        impressions: Arc<dyn ImpressionsRepository>,
        pool: Arc<GenePool>,
        rng: SharedRng,
    ) -> Self {
        Self {
            shops,
            variants,
            impressions,
            pool,
            survivors: default_survivors,
            locks: PopulationLocks::new(),
            counters: Arc::default(),
            rng,
        }
    }

    /// Replace the survivor policy.
    #[must_use]
    pub fn with_survivor_policy(mut self, survivors: SurvivorPolicy) -> Self {
        self.survivors = survivors;
        self
    }

    async fn config(&self, shop: ShopUuid) -> Result<ShopConfig, EvolutionServiceError> {
        self.shops
            .get_config(shop)
            .await?
            .ok_or(EvolutionServiceError::UnknownShop)
    }

    /// Whether enough impressions arrived across the whole shop since its last round.
    async fn shop_is_due(&self, shop: ShopUuid) -> Result<bool, EvolutionServiceError> {
        let last = self.variants.last_cycle_at(shop).await?;
        let fresh = self.impressions.count_since(shop, last).await?;

        debug!(fresh, "impressions since last cycle");

        Ok(cycle_due(fresh))
    }

    #[tracing::instrument(
        name = "evolution.service.cycle_population",
        skip(self, key, config),
        fields(population = %key),
        err
    )]
    async fn cycle_population(
        &self,
        shop: ShopUuid,
        key: PopulationKey,
        config: &ShopConfig,
        trigger: CycleTrigger,
    ) -> Result<CycleOutcome, EvolutionServiceError> {
        let Some(_guard) = self.locks.try_acquire(shop, &key) else {
            debug!("cycle already running");

            return Ok(CycleOutcome::AlreadyRunning);
        };

        let population = self.variants.list_population(shop, &key, false).await?;

        if trigger == CycleTrigger::Seed && !population.is_empty() {
            return Ok(CycleOutcome::Skipped);
        }

        let uuids: Vec<VariantUuid> = population.iter().map(|variant| variant.uuid).collect();

        if !uuids.is_empty() {
            self.variants.refresh_stats(shop, &uuids).await?;
        }

        let impressions = self.impressions.list_for_variants(shop, &uuids).await?;
        let fitness = evaluate(&impressions, &ImpressionFilter::outside_promotions());
        let now = Timestamp::now();

        let plan = {
            let mut rng = self.rng.fork();

            plan_cycle(
                &CycleInputs {
                    shop,
                    key: &key,
                    population: &population,
                    fitness: &fitness,
                    config,
                    pool: &self.pool,
                    now,
                },
                self.survivors,
                &mut rng,
            )
        };

        if plan.skipped_slots > 0 {
            warn!(
                skipped_slots = plan.skipped_slots,
                "gene pool could not fill every slot; population left short"
            );
        }

        self.variants.apply_plan(shop, &plan).await?;

        let report = CycleReport {
            key,
            killed: plan.kills,
            born: plan.offspring.iter().map(|child| child.uuid).collect(),
            crossover_births: plan.crossover_births,
            fresh_births: plan.fresh_births,
            mutated_genes: plan.mutated_genes,
            skipped_slots: plan.skipped_slots,
            completed_at: now,
        };

        info!(
            killed = report.killed.len(),
            born = report.born.len(),
            crossover = report.crossover_births,
            "completed evolution cycle"
        );

        Ok(CycleOutcome::Completed(report))
    }

    fn schedule_due_cycles(&self, shop: ShopUuid) {
        let service = self.clone();
        let span = tracing::info_span!("evolution.scheduled", shop_uuid = %shop);

        tokio::spawn(
            async move {
                if let Err(error) = service.run_due_cycles(shop).await {
                    warn!(error = %error, "scheduled evolution round failed");
                }
            }
            .instrument(span),
        );
    }
}

impl std::fmt::Debug for StoreEvolutionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreEvolutionService")
            .field("locks", &self.locks)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl EvolutionService for StoreEvolutionService {
    #[tracing::instrument(
        name = "evolution.service.run_cycle",
        skip(self),
        fields(shop_uuid = %shop, population = %key, trigger = trigger.as_str()),
        err
    )]
    async fn run_cycle(
        &self,
        shop: ShopUuid,
        key: PopulationKey,
        trigger: CycleTrigger,
    ) -> Result<CycleOutcome, EvolutionServiceError> {
        let config = self.config(shop).await?;

        if trigger == CycleTrigger::Threshold && !self.shop_is_due(shop).await? {
            return Ok(CycleOutcome::Skipped);
        }

        self.cycle_population(shop, key, &config, trigger).await
    }

    #[tracing::instrument(
        name = "evolution.service.run_due_cycles",
        skip(self),
        fields(shop_uuid = %shop),
        err
    )]
    async fn run_due_cycles(
        &self,
        shop: ShopUuid,
    ) -> Result<Vec<(PopulationKey, CycleOutcome)>, EvolutionServiceError> {
        let started = Timestamp::now();
        let config = self.config(shop).await?;

        let mut keys = self.variants.list_populations(shop).await?;
        let shop_wide = PopulationKey::shop_wide(config.baseline());

        if !keys.contains(&shop_wide) {
            keys.push(shop_wide);
        }

        if !self.shop_is_due(shop).await? {
            return Ok(keys
                .into_iter()
                .map(|key| (key, CycleOutcome::Skipped))
                .collect());
        }

        let mut outcomes = Vec::with_capacity(keys.len());

        for key in keys {
            let outcome = self
                .cycle_population(shop, key.clone(), &config, CycleTrigger::Threshold)
                .await?;

            outcomes.push((key, outcome));
        }

        // Impressions served while the round ran count towards the next one.
        self.variants.record_cycle(shop, started).await?;

        Ok(outcomes)
    }

    fn notify_impressions(&self, shop: ShopUuid, count: u64) {
        let due = {
            let mut counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
            let counter = counters.entry(shop).or_default();

            *counter = counter.saturating_add(count);

            if *counter >= CYCLE_IMPRESSION_THRESHOLD {
                *counter = 0;
                true
            } else {
                false
            }
        };

        if due {
            self.schedule_due_cycles(shop);
        }
    }

    fn schedule_cycle(&self, shop: ShopUuid, key: PopulationKey, trigger: CycleTrigger) {
        let service = self.clone();
        let span = tracing::info_span!("evolution.scheduled", shop_uuid = %shop, population = %key);

        tokio::spawn(
            async move {
                if let Err(error) = service.run_cycle(shop, key, trigger).await {
                    warn!(error = %error, "scheduled evolution cycle failed");
                }
            }
            .instrument(span),
        );
    }
}

#[automock]
#[async_trait]
pub trait EvolutionService: Send + Sync {
    /// Run one cycle for a population if the trigger's precondition holds.
    ///
    /// [`CycleTrigger::Threshold`] checks the shop-wide gate but leaves the shop's
    /// cycle clock alone; only [`EvolutionService::run_due_cycles`] advances it.
    async fn run_cycle(
        &self,
        shop: ShopUuid,
        key: PopulationKey,
        trigger: CycleTrigger,
    ) -> Result<CycleOutcome, EvolutionServiceError>;

    /// Once the shop has enough fresh impressions, cycle every one of its populations,
    /// each under its own lock, and restart the shop's count.
    async fn run_due_cycles(
        &self,
        shop: ShopUuid,
    ) -> Result<Vec<(PopulationKey, CycleOutcome)>, EvolutionServiceError>;

    /// Count served impressions and schedule a round once the shop reaches the threshold.
    fn notify_impressions(&self, shop: ShopUuid, count: u64);

    /// Run a cycle in the background.
    fn schedule_cycle(&self, shop: ShopUuid, key: PopulationKey, trigger: CycleTrigger);
}
