//! Variants service.

use std::sync::Arc;

use async_trait::async_trait;
use jiff::Timestamp;
use mockall::automock;
use recoup::{
    fitness::{FitnessMetrics, evaluate_variant},
    genes::Genes,
    ids::{ShopUuid, VariantUuid},
    impressions::ImpressionFilter,
    variants::{PopulationKey, Variant, VariantStatus},
};
use serde::Deserialize;
use tracing::{Span, info};

use crate::domain::{
    impressions::ImpressionsRepository,
    variants::{errors::VariantsServiceError, repository::VariantsRepository},
};

/// A merchant-authored variant.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewVariant {
    /// Population to join.
    pub key: PopulationKey,

    /// Genes; normalised to the population's baseline on create.
    pub genes: Genes,
}

#[derive(Clone)]
pub struct StoreVariantsService {
    variants: Arc<dyn VariantsRepository>,
    impressions: Arc<dyn ImpressionsRepository>,
}

impl StoreVariantsService {
    #[must_use]
    pub fn new(
        variants: Arc<dyn VariantsRepository>,
        impressions: Arc<dyn ImpressionsRepository>,
    ) -> Self {
        Self {
            variants,
            impressions,
        }
    }
}

impl std::fmt::Debug for StoreVariantsService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreVariantsService").finish_non_exhaustive()
    }
}

#[async_trait]
impl VariantsService for StoreVariantsService {
    #[tracing::instrument(
        name = "variants.service.create",
        skip(self, new),
        fields(shop_uuid = %shop, population = %new.key, variant_uuid = tracing::field::Empty),
        err
    )]
    async fn create(&self, shop: ShopUuid, new: NewVariant) -> Result<Variant, VariantsServiceError> {
        let genes = new.genes.normalized(new.key.baseline);
        let variant = Variant::new(VariantUuid::new(), shop, new.key, genes, 1, Timestamp::now());

        Span::current().record("variant_uuid", tracing::field::display(variant.uuid));

        self.variants.create(&variant).await?;

        info!("created variant");

        Ok(variant)
    }

    #[tracing::instrument(
        name = "variants.service.get",
        skip(self),
        fields(shop_uuid = %shop, variant_uuid = %variant),
        err
    )]
    async fn get(&self, shop: ShopUuid, variant: VariantUuid) -> Result<Variant, VariantsServiceError> {
        Ok(self.variants.get(shop, variant).await?)
    }

    #[tracing::instrument(
        name = "variants.service.list",
        skip(self),
        fields(shop_uuid = %shop, population = %key),
        err
    )]
    async fn list(
        &self,
        shop: ShopUuid,
        key: PopulationKey,
        include_killed: bool,
    ) -> Result<Vec<Variant>, VariantsServiceError> {
        Ok(self
            .variants
            .list_population(shop, &key, include_killed)
            .await?)
    }

    #[tracing::instrument(
        name = "variants.service.set_status",
        skip(self),
        fields(shop_uuid = %shop, variant_uuid = %variant, status = %status),
        err
    )]
    async fn set_status(
        &self,
        shop: ShopUuid,
        variant: VariantUuid,
        status: VariantStatus,
    ) -> Result<Variant, VariantsServiceError> {
        let current = self.variants.get(shop, variant).await?;

        current.status.transition_to(status)?;

        let updated = if status == VariantStatus::Champion {
            self.variants
                .promote_champion(shop, variant, current.status)
                .await?
        } else {
            self.variants
                .update_status(shop, variant, current.status, status)
                .await?
        };

        info!(from = %current.status, "changed variant status");

        Ok(updated)
    }

    async fn kill(&self, shop: ShopUuid, variant: VariantUuid) -> Result<Variant, VariantsServiceError> {
        self.set_status(shop, variant, VariantStatus::Killed).await
    }

    #[tracing::instrument(
        name = "variants.service.fitness",
        skip(self, filter),
        fields(shop_uuid = %shop, variant_uuid = %variant),
        err
    )]
    async fn fitness(
        &self,
        shop: ShopUuid,
        variant: VariantUuid,
        filter: ImpressionFilter,
    ) -> Result<FitnessMetrics, VariantsServiceError> {
        // Surface NotFound for unknown variants rather than empty metrics.
        self.variants.get(shop, variant).await?;

        let impressions = self.impressions.list_for_variants(shop, &[variant]).await?;

        Ok(evaluate_variant(variant, &impressions, &filter))
    }
}

#[automock]
#[async_trait]
pub trait VariantsService: Send + Sync {
    /// Add a merchant-authored variant to a population.
    async fn create(&self, shop: ShopUuid, new: NewVariant) -> Result<Variant, VariantsServiceError>;

    /// Retrieve a single variant.
    async fn get(&self, shop: ShopUuid, variant: VariantUuid) -> Result<Variant, VariantsServiceError>;

    /// Variants of one population.
    async fn list(
        &self,
        shop: ShopUuid,
        key: PopulationKey,
        include_killed: bool,
    ) -> Result<Vec<Variant>, VariantsServiceError>;

    /// Apply a lifecycle transition. Promoting to champion demotes the previous
    /// champion atomically.
    async fn set_status(
        &self,
        shop: ShopUuid,
        variant: VariantUuid,
        status: VariantStatus,
    ) -> Result<Variant, VariantsServiceError>;

    /// Kill a variant.
    async fn kill(&self, shop: ShopUuid, variant: VariantUuid) -> Result<Variant, VariantsServiceError>;

    /// Metrics for one variant over a slice of its impressions.
    async fn fitness(
        &self,
        shop: ShopUuid,
        variant: VariantUuid,
        filter: ImpressionFilter,
    ) -> Result<FitnessMetrics, VariantsServiceError>;
}

#[cfg(test)]
mod tests {
    use recoup::{
        config::ShopConfig,
        genes::OfferType,
        impressions::PromotionSlice,
        variants::{Baseline, LifecycleError},
    };
    use testresult::TestResult;

    use crate::{
        domain::shops::ShopsRepository,
        store::{MemoryStore, RepositoryError},
    };

    use super::*;

    async fn service() -> Result<(StoreVariantsService, ShopUuid), RepositoryError> {
        let store = MemoryStore::new();
        let shop = ShopUuid::new();

        store.upsert_config(shop, &ShopConfig::default()).await?;

        Ok((
            StoreVariantsService::new(Arc::new(store.clone()), Arc::new(store)),
            shop,
        ))
    }

    fn new_variant(baseline: Baseline) -> NewVariant {
        NewVariant {
            key: PopulationKey::shop_wide(baseline),
            genes: Genes {
                headline: "Before you go".to_string(),
                subhead: "We kept your cart".to_string(),
                cta: "Finish checkout".to_string(),
                offer_type: OfferType::Percentage,
                offer_amount: 15,
                ..Genes::default()
            },
        }
    }

    #[tokio::test]
    async fn copy_only_baselines_strip_the_offer() -> TestResult {
        let (variants, shop) = service().await?;

        let created = variants
            .create(shop, new_variant(Baseline::RevenueNoDiscount))
            .await?;

        assert_eq!(created.genes.offer_amount, 0);
        assert_eq!(created.generation, 1);
        assert_eq!(created.status, VariantStatus::Alive);

        Ok(())
    }

    #[tokio::test]
    async fn promotion_moves_the_crown() -> TestResult {
        let (variants, shop) = service().await?;
        let first = variants
            .create(shop, new_variant(Baseline::RevenueWithDiscount))
            .await?;
        let second = variants
            .create(shop, new_variant(Baseline::RevenueWithDiscount))
            .await?;

        variants
            .set_status(shop, first.uuid, VariantStatus::Champion)
            .await?;
        variants
            .set_status(shop, second.uuid, VariantStatus::Champion)
            .await?;

        assert_eq!(
            variants.get(shop, first.uuid).await?.status,
            VariantStatus::Alive
        );
        assert!(variants.get(shop, second.uuid).await?.is_champion);

        Ok(())
    }

    #[tokio::test]
    async fn champions_must_be_demoted_before_killing() -> TestResult {
        let (variants, shop) = service().await?;
        let champion = variants
            .create(shop, new_variant(Baseline::RevenueWithDiscount))
            .await?;

        variants
            .set_status(shop, champion.uuid, VariantStatus::Champion)
            .await?;

        let result = variants.kill(shop, champion.uuid).await;

        assert!(
            matches!(
                result,
                Err(VariantsServiceError::Lifecycle(
                    LifecycleError::InvalidTransition { .. }
                ))
            ),
            "expected a lifecycle error, got {result:?}"
        );

        Ok(())
    }

    #[tokio::test]
    async fn fitness_of_unknown_variants_is_not_found() -> TestResult {
        let (variants, shop) = service().await?;

        let result = variants
            .fitness(
                shop,
                VariantUuid::new(),
                ImpressionFilter {
                    promotion: PromotionSlice::During,
                    segment: None,
                },
            )
            .await;

        assert!(
            matches!(result, Err(VariantsServiceError::NotFound)),
            "expected NotFound, got {result:?}"
        );

        Ok(())
    }

    #[tokio::test]
    async fn unknown_shops_cannot_own_variants() -> TestResult {
        let (variants, _) = service().await?;

        let result = variants
            .create(ShopUuid::new(), new_variant(Baseline::RevenueWithDiscount))
            .await;

        assert!(
            matches!(result, Err(VariantsServiceError::UnknownShop)),
            "expected UnknownShop, got {result:?}"
        );

        Ok(())
    }
}
