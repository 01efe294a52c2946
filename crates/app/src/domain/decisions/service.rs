//! Decisions service.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use jiff::Timestamp;
use mockall::automock;
use recoup::{
    config::ShopConfig,
    decisions::{Decision, DecisionEngine, DecisionInputs, DecisionSource},
    ids::{ImpressionUuid, ShopUuid},
    impressions::Impression,
    promotions::{Promotion, PromotionPolicy},
    signals::VisitorSignals,
    variants::PopulationKey,
};
use tracing::{Span, debug, warn};

use crate::{
    domain::{
        budgets::BudgetGovernor,
        evolution::{CycleTrigger, EvolutionService},
    },
    rng::SharedRng,
    store::{Repositories, bounded},
};

#[derive(Clone)]
pub struct StoreDecisionsService {
    repositories: Repositories,
    governor: BudgetGovernor,
    evolution: Arc<dyn EvolutionService>,
    engine: DecisionEngine,
    timeout: Duration,
    rng: SharedRng,
}

impl StoreDecisionsService {
    #[must_use]
    pub fn new(
        repositories: Repositories,
        evolution: Arc<dyn EvolutionService>,
        engine: DecisionEngine,
        timeout: Duration,
        rng: SharedRng,
    ) -> Self {
        Self {
            governor: BudgetGovernor::new(Arc::clone(&repositories.budgets), timeout),
            repositories,
            evolution,
            engine,
            timeout,
            rng,
        }
    }

    /// Population the visitor should be served from under `config`.
    fn target_population(config: &ShopConfig, signals: &VisitorSignals) -> PopulationKey {
        PopulationKey::new(
            config.baseline(),
            config.segmentation_enabled.then(|| signals.segment()),
        )
    }

    async fn log_impression(
        &self,
        shop: ShopUuid,
        config: &ShopConfig,
        signals: VisitorSignals,
        decision: &Decision,
        during_promotion: bool,
        served_at: Timestamp,
    ) -> bool {
        let impression = Impression {
            uuid: decision.impression,
            shop,
            variant: decision.variant.as_ref().map(|variant| variant.uuid),
            baseline: config.baseline(),
            segment: signals.segment(),
            discount_cost: decision.estimated_cost(signals.cart_value),
            signals,
            served_at,
            during_promotion,
            offer: decision.offer.kind(),
            clicked: false,
            converted: false,
            revenue: 0,
        };

        let recorded = bounded(
            self.timeout,
            self.repositories.impressions.record(&impression),
        )
        .await;

        if let Err(error) = recorded {
            warn!(error = %error, "failed to log impression");

            return false;
        }

        true
    }

    /// Keep the populations the visitor could have been served from growing.
    fn feed_evolution(
        &self,
        shop: ShopUuid,
        config: &ShopConfig,
        signals: &VisitorSignals,
        decision: &Decision,
    ) {
        let target = Self::target_population(config, signals);

        match &decision.variant {
            Some(served) => {
                let served_key = PopulationKey::new(config.baseline(), served.segment.clone());

                self.evolution.notify_impressions(shop, 1);

                if served_key != target {
                    self.evolution.schedule_cycle(shop, target, CycleTrigger::Seed);
                }
            }
            None if decision.source == DecisionSource::Default => {
                self.evolution.schedule_cycle(shop, target, CycleTrigger::Seed);
            }
            None => {}
        }
    }
}

impl std::fmt::Debug for StoreDecisionsService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreDecisionsService")
            .field("engine", &self.engine)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl DecisionsService for StoreDecisionsService {
    #[tracing::instrument(
        name = "decisions.service.decide",
        skip(self, signals),
        fields(
            shop_uuid = %shop,
            impression_uuid = tracing::field::Empty,
            offer = tracing::field::Empty,
            source = tracing::field::Empty,
        )
    )]
    async fn decide(&self, shop: ShopUuid, signals: VisitorSignals) -> Decision {
        let impression = ImpressionUuid::new();
        let now = Timestamp::now();

        Span::current().record("impression_uuid", tracing::field::display(impression));

        let (config, variants, promotions) = tokio::join!(
            bounded(self.timeout, self.repositories.shops.get_config(shop)),
            bounded(self.timeout, self.repositories.variants.list_servable(shop)),
            bounded(self.timeout, self.repositories.promotions.list_open(shop, now)),
        );

        let config = match config {
            Ok(Some(config)) => config,
            Ok(None) => {
                debug!("unknown shop, serving default copy");

                return Decision::default_copy(impression);
            }
            Err(error) => {
                warn!(error = %error, "shop config unavailable, skipping");

                return Decision::skipped(impression);
            }
        };

        let variants = match variants {
            Ok(variants) => variants,
            Err(error) => {
                warn!(error = %error, "variants unavailable, skipping");

                return Decision::skipped(impression);
            }
        };

        let (policy, promotion_open) = match promotions {
            Ok(open) => (
                PromotionPolicy::most_restrictive(open.iter().map(Promotion::effective_policy)),
                !open.is_empty(),
            ),
            Err(error) => {
                warn!(error = %error, "promotions unavailable, withholding discounts");

                (PromotionPolicy::ForceZero, false)
            }
        };

        let mut decision = {
            let mut rng = self.rng.fork();

            self.engine.decide(
                &DecisionInputs {
                    impression,
                    config: &config,
                    signals: &signals,
                    variants: &variants,
                    promotion: policy,
                },
                &mut rng,
            )
        };

        let mut reserved = None;

        if decision.offer.is_discount() {
            let cost = decision.estimated_cost(signals.cart_value);

            if self
                .governor
                .try_spend(shop, &config.budget, cost, now)
                .await
            {
                reserved = Some(cost);
            } else {
                decision.downgrade_to_no_discount();
            }
        }

        self.feed_evolution(shop, &config, &signals, &decision);

        let during_promotion = promotion_open || signals.promotion_active;

        // Unlogged discounts can never be attributed: hand the budget back, serve copy only.
        if !self
            .log_impression(shop, &config, signals, &decision, during_promotion, now)
            .await
            && let Some(cost) = reserved
        {
            self.governor.refund(shop, &config.budget, cost, now).await;
            decision.downgrade_to_no_discount();
        }

        Span::current().record("offer", decision.offer.kind().as_str());
        Span::current().record("source", decision.source.as_str());

        decision
    }
}

#[automock]
#[async_trait]
pub trait DecisionsService: Send + Sync {
    /// Decide what to show an exiting visitor. Never fails: store trouble degrades
    /// to a skipped or copy-only decision.
    async fn decide(&self, shop: ShopUuid, signals: VisitorSignals) -> Decision;
}

#[cfg(test)]
mod tests {
    use recoup::{
        budget::{BudgetPeriod, BudgetSettings},
        config::Aggression,
        decisions::{Offer, ServingPolicy},
        genes::{Genes, OfferType, Redirect},
        ids::{PromotionUuid, VariantUuid},
        promotions::{Classification, DiscountType, MerchantOverride},
        variants::{Variant, VariantStatus},
    };
    use testresult::TestResult;

    use crate::{
        domain::{
            budgets::BudgetsRepository,
            evolution::MockEvolutionService,
            impressions::{ImpressionsRepository, MockImpressionsRepository},
            promotions::PromotionsRepository,
            shops::{MockShopsRepository, ShopsRepository},
            variants::VariantsRepository,
        },
        store::{MemoryStore, RepositoryError},
    };

    use super::*;

    const TIMEOUT: Duration = Duration::from_millis(100);

    fn quiet_evolution() -> MockEvolutionService {
        let mut evolution = MockEvolutionService::new();
        evolution.expect_notify_impressions().return_const(());
        evolution.expect_schedule_cycle().return_const(());
        evolution
    }

    fn service(repositories: Repositories, evolution: MockEvolutionService) -> StoreDecisionsService {
        StoreDecisionsService::new(
            repositories,
            Arc::new(evolution),
            DecisionEngine::new(ServingPolicy::new(1.0)),
            TIMEOUT,
            SharedRng::new(Some(7)),
        )
    }

    async fn shop_with_champion(
        store: &MemoryStore,
        config: &ShopConfig,
    ) -> Result<(ShopUuid, Variant), RepositoryError> {
        let shop = ShopUuid::new();

        store.upsert_config(shop, config).await?;

        let variant = Variant::new(
            VariantUuid::new(),
            shop,
            PopulationKey::shop_wide(config.baseline()),
            Genes {
                headline: "Still deciding?".to_string(),
                subhead: "Here's a little help".to_string(),
                cta: "Use my discount".to_string(),
                offer_type: OfferType::Fixed,
                offer_amount: 20,
                redirect: Redirect::Checkout,
                urgency: false,
            },
            1,
            Timestamp::now(),
        );

        VariantsRepository::create(store, &variant).await?;
        store
            .promote_champion(shop, variant.uuid, VariantStatus::Alive)
            .await?;

        Ok((shop, variant))
    }

    fn discounting(budget: BudgetSettings) -> ShopConfig {
        ShopConfig {
            aggression: Aggression::new(10),
            budget,
            ..ShopConfig::default()
        }
    }

    fn cart(cart_value: u64) -> VisitorSignals {
        VisitorSignals {
            cart_value,
            ..VisitorSignals::default()
        }
    }

    #[tokio::test]
    async fn champions_are_served_and_logged() -> TestResult {
        let store = MemoryStore::new();
        let config = discounting(BudgetSettings::default());
        let (shop, champion) = shop_with_champion(&store, &config).await?;

        let mut evolution = MockEvolutionService::new();
        evolution
            .expect_notify_impressions()
            .once()
            .withf(move |s, count| *s == shop && *count == 1)
            .return_const(());
        evolution.expect_schedule_cycle().never();

        let decision = service(Repositories::memory(&store), evolution)
            .decide(shop, cart(10_000))
            .await;

        assert_eq!(decision.source, DecisionSource::Exploit);
        assert_eq!(decision.offer, Offer::Fixed { amount: 20 });
        assert_eq!(decision.variant.map(|variant| variant.uuid), Some(champion.uuid));
        assert!(decision.code.is_some(), "discounts carry a code");

        let logged = ImpressionsRepository::get(&store, shop, decision.impression).await?;

        assert_eq!(logged.variant, Some(champion.uuid));
        assert_eq!(logged.discount_cost, 20);

        Ok(())
    }

    #[tokio::test]
    async fn exhausted_budget_downgrades_to_copy_only() -> TestResult {
        let store = MemoryStore::new();
        let budget = BudgetSettings {
            enabled: true,
            amount: 100,
            period: BudgetPeriod::Month,
        };
        let config = discounting(budget);
        let (shop, _) = shop_with_champion(&store, &config).await?;

        store.reserve(shop, &budget, 90, Timestamp::now()).await?;

        let decision = service(Repositories::memory(&store), quiet_evolution())
            .decide(shop, cart(10_000))
            .await;

        assert_eq!(decision.offer, Offer::NoDiscount);
        assert_eq!(decision.code, None);
        assert!(decision.variant.is_some(), "copy is still served");
        assert_eq!(store.ledger(shop).await?.map(|ledger| ledger.spent), Some(90));

        Ok(())
    }

    #[tokio::test]
    async fn unlogged_discounts_release_their_budget() -> TestResult {
        let store = MemoryStore::new();
        let budget = BudgetSettings {
            enabled: true,
            amount: 100,
            period: BudgetPeriod::Month,
        };
        let config = discounting(budget);
        let (shop, _) = shop_with_champion(&store, &config).await?;

        let mut impressions = MockImpressionsRepository::new();
        impressions
            .expect_record()
            .once()
            .return_once(|_| Err(RepositoryError::Timeout));

        let repositories = Repositories {
            impressions: Arc::new(impressions),
            ..Repositories::memory(&store)
        };

        let decision = service(repositories, quiet_evolution())
            .decide(shop, cart(10_000))
            .await;

        assert_eq!(decision.offer, Offer::NoDiscount);
        assert_eq!(decision.code, None);
        assert_eq!(
            store.ledger(shop).await?.map(|ledger| ledger.spent),
            Some(0),
            "the reservation was handed back"
        );

        Ok(())
    }

    #[tokio::test]
    async fn merchant_pause_suppresses_the_popup() -> TestResult {
        let store = MemoryStore::new();
        let config = discounting(BudgetSettings::default());
        let (shop, _) = shop_with_champion(&store, &config).await?;
        let now = Timestamp::now();

        let mut promotion = Promotion::detect(
            PromotionUuid::new(),
            shop,
            "VIP",
            DiscountType::Percentage,
            15,
            now,
        );
        PromotionsRepository::create(&store, &promotion).await?;

        promotion.apply_classification(Classification::Targeted, now)?;
        store.save_classification(&promotion).await?;
        store
            .set_override(shop, promotion.uuid, Some(MerchantOverride::Pause))
            .await?;

        let decision = service(Repositories::memory(&store), quiet_evolution())
            .decide(shop, cart(10_000))
            .await;

        assert_eq!(decision.offer, Offer::None);
        assert_eq!(decision.source, DecisionSource::Skipped);

        let logged = ImpressionsRepository::get(&store, shop, decision.impression).await?;

        assert!(logged.during_promotion, "open promotions mark the impression");

        Ok(())
    }

    #[tokio::test]
    async fn unknown_shops_get_default_copy_and_nothing_is_logged() -> TestResult {
        let store = MemoryStore::new();
        let shop = ShopUuid::new();

        let mut evolution = MockEvolutionService::new();
        evolution.expect_schedule_cycle().never();
        evolution.expect_notify_impressions().never();

        let decision = service(Repositories::memory(&store), evolution)
            .decide(shop, cart(5_000))
            .await;

        assert_eq!(decision, Decision::default_copy(decision.impression));

        let logged = ImpressionsRepository::get(&store, shop, decision.impression).await;

        assert!(
            matches!(logged, Err(RepositoryError::NotFound)),
            "expected NotFound, got {logged:?}"
        );

        Ok(())
    }

    #[tokio::test]
    async fn empty_populations_schedule_seeding() -> TestResult {
        let store = MemoryStore::new();
        let shop = ShopUuid::new();

        store.upsert_config(shop, &ShopConfig::default()).await?;

        let mut evolution = MockEvolutionService::new();
        evolution
            .expect_schedule_cycle()
            .once()
            .withf(|_, key, trigger| {
                key.baseline == ShopConfig::default().baseline() && *trigger == CycleTrigger::Seed
            })
            .return_const(());
        evolution.expect_notify_impressions().never();

        let decision = service(Repositories::memory(&store), evolution)
            .decide(shop, cart(5_000))
            .await;

        assert_eq!(decision.source, DecisionSource::Default);
        assert_eq!(decision.offer, Offer::NoDiscount);

        Ok(())
    }

    #[tokio::test]
    async fn config_store_failures_skip() {
        let store = MemoryStore::new();
        let mut shops = MockShopsRepository::new();
        shops
            .expect_get_config()
            .return_once(|_| Err(RepositoryError::Timeout));

        let repositories = Repositories {
            shops: Arc::new(shops),
            ..Repositories::memory(&store)
        };

        let decision = service(repositories, quiet_evolution())
            .decide(ShopUuid::new(), cart(5_000))
            .await;

        assert_eq!(decision.source, DecisionSource::Skipped);
        assert_eq!(decision.offer, Offer::None);
    }

    #[tokio::test]
    async fn baseline_without_discounts_never_spends() -> TestResult {
        let store = MemoryStore::new();
        let config = ShopConfig {
            discounts_enabled: false,
            budget: BudgetSettings {
                enabled: true,
                amount: 1,
                period: BudgetPeriod::Week,
            },
            ..ShopConfig::default()
        };
        let (shop, _) = shop_with_champion(&store, &config).await?;

        let decision = service(Repositories::memory(&store), quiet_evolution())
            .decide(shop, cart(10_000))
            .await;

        assert!(!config.baseline().offers_discount(), "copy-only baseline");
        assert_eq!(decision.offer, Offer::NoDiscount);
        assert_eq!(store.ledger(shop).await?, None);

        Ok(())
    }

    #[test]
    fn target_population_follows_segmentation() {
        let signals = cart(18_000);
        let shop_wide = ShopConfig::default();
        let segmented = ShopConfig {
            segmentation_enabled: true,
            ..ShopConfig::default()
        };

        assert_eq!(
            StoreDecisionsService::target_population(&shop_wide, &signals),
            PopulationKey::shop_wide(shop_wide.baseline())
        );
        assert_eq!(
            StoreDecisionsService::target_population(&segmented, &signals).segment,
            Some(signals.segment())
        );
    }
}
