//! App Context

use std::{sync::Arc, time::Duration};

use recoup::{
    decisions::{DecisionEngine, ServingPolicy},
    genes::GenePool,
};
use sqlx::migrate::MigrateError;
use thiserror::Error;

use crate::{
    database::{self, Db},
    domain::{
        decisions::{DecisionsService, StoreDecisionsService},
        evolution::{EvolutionService, StoreEvolutionService},
        outcomes::{OutcomesService, StoreOutcomesService},
        promotions::{PromotionsService, StorePromotionsService},
        shops::{ShopsService, StoreShopsService},
        variants::{StoreVariantsService, VariantsService},
    },
    rng::SharedRng,
    store::{MemoryStore, Repositories},
};

/// Default bound on each serving-path store call.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_millis(150);

/// Engine tuning shared by every service.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Bound on each serving-path store call.
    pub store_timeout: Duration,

    /// Probability of serving an available champion.
    pub exploit_rate: f64,

    /// Seed for reproducible runs; OS entropy when absent.
    pub rng_seed: Option<u64>,

    /// Candidate genes for fresh variants.
    pub gene_pool: GenePool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            store_timeout: DEFAULT_STORE_TIMEOUT,
            exploit_rate: ServingPolicy::default().exploit_rate(),
            rng_seed: None,
            gene_pool: GenePool::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum AppInitError {
    #[error("failed to connect to database")]
    Database(#[source] sqlx::Error),

    #[error("failed to apply database migrations")]
    Migrate(#[source] MigrateError),
}

#[derive(Clone)]
pub struct AppContext {
    pub shops: Arc<dyn ShopsService>,
    pub variants: Arc<dyn VariantsService>,
    pub decisions: Arc<dyn DecisionsService>,
    pub outcomes: Arc<dyn OutcomesService>,
    pub evolution: Arc<dyn EvolutionService>,
    pub promotions: Arc<dyn PromotionsService>,
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext").finish_non_exhaustive()
    }
}

impl AppContext {
    /// Build application context from a database URL, applying pending migrations.
    ///
    /// # Errors
    ///
    /// Returns an error when establishing a database connection or migrating fails.
    pub async fn from_database_url(
        url: &str,
        settings: EngineSettings,
    ) -> Result<Self, AppInitError> {
        let pool = database::connect(url)
            .await
            .map_err(AppInitError::Database)?;

        database::migrate(&pool)
            .await
            .map_err(AppInitError::Migrate)?;

        Ok(Self::from_repositories(
            Repositories::postgres(&Db::new(pool)),
            settings,
        ))
    }

    /// Build application context over a fresh in-memory store.
    #[must_use]
    pub fn in_memory(settings: EngineSettings) -> Self {
        Self::from_repositories(Repositories::memory(&MemoryStore::new()), settings)
    }

    /// Wire every service over `repositories`.
    #[must_use]
    pub fn from_repositories(repositories: Repositories, settings: EngineSettings) -> Self {
        let rng = SharedRng::new(settings.rng_seed);

        let evolution: Arc<dyn EvolutionService> = Arc::new(StoreEvolutionService::new(
            Arc::clone(&repositories.shops),
            Arc::clone(&repositories.variants),
            Arc::clone(&repositories.impressions),
            Arc::new(settings.gene_pool),
            rng.clone(),
        ));

        let decisions = StoreDecisionsService::new(
            repositories.clone(),
            Arc::clone(&evolution),
            DecisionEngine::new(ServingPolicy::new(settings.exploit_rate)),
            settings.store_timeout,
            rng,
        );

        Self {
            shops: Arc::new(StoreShopsService::new(Arc::clone(&repositories.shops))),
            variants: Arc::new(StoreVariantsService::new(
                Arc::clone(&repositories.variants),
                Arc::clone(&repositories.impressions),
            )),
            decisions: Arc::new(decisions),
            outcomes: Arc::new(StoreOutcomesService::new(Arc::clone(
                &repositories.impressions,
            ))),
            evolution,
            promotions: Arc::new(StorePromotionsService::new(Arc::clone(
                &repositories.promotions,
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use recoup::{
        config::ShopConfig,
        decisions::DecisionSource,
        ids::ShopUuid,
        impressions::OutcomeEvent,
        signals::VisitorSignals,
        variants::PopulationKey,
    };
    use testresult::TestResult;

    use crate::domain::{
        evolution::{CycleOutcome, CycleTrigger},
        outcomes::OutcomeReport,
    };

    use super::*;

    #[tokio::test]
    async fn in_memory_context_serves_end_to_end() -> TestResult {
        let context = AppContext::in_memory(EngineSettings {
            rng_seed: Some(99),
            ..EngineSettings::default()
        });
        let shop = ShopUuid::new();
        let config = context.shops.put_config(shop, ShopConfig::default()).await?;

        let outcome = context
            .evolution
            .run_cycle(
                shop,
                PopulationKey::shop_wide(config.baseline()),
                CycleTrigger::Seed,
            )
            .await?;

        assert!(
            matches!(outcome, CycleOutcome::Completed(_)),
            "seeding an empty population completes, got {outcome:?}"
        );

        let decision = context
            .decisions
            .decide(shop, VisitorSignals::default())
            .await;

        assert_eq!(decision.source, DecisionSource::Explore);

        let receipt = context
            .outcomes
            .record(
                shop,
                OutcomeReport {
                    impression: decision.impression,
                    event: OutcomeEvent::Click,
                    revenue: None,
                },
            )
            .await?;

        assert!(receipt.applied, "the served impression accepts outcomes");

        Ok(())
    }
}
