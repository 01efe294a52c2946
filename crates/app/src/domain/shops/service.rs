//! Shops service.

use std::sync::Arc;

use async_trait::async_trait;
use mockall::automock;
use recoup::{config::ShopConfig, ids::ShopUuid};
use tracing::info;

use crate::domain::shops::{errors::ShopsServiceError, repository::ShopsRepository};

#[derive(Clone)]
pub struct StoreShopsService {
    repository: Arc<dyn ShopsRepository>,
}

impl StoreShopsService {
    #[must_use]
    pub fn new(repository: Arc<dyn ShopsRepository>) -> Self {
        Self { repository }
    }
}

impl std::fmt::Debug for StoreShopsService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreShopsService").finish_non_exhaustive()
    }
}

#[async_trait]
impl ShopsService for StoreShopsService {
    #[tracing::instrument(
        name = "shops.service.get_config",
        skip(self),
        fields(shop_uuid = %shop),
        err
    )]
    async fn get_config(&self, shop: ShopUuid) -> Result<ShopConfig, ShopsServiceError> {
        self.repository
            .get_config(shop)
            .await?
            .ok_or(ShopsServiceError::NotFound)
    }

    #[tracing::instrument(
        name = "shops.service.put_config",
        skip(self, config),
        fields(shop_uuid = %shop),
        err
    )]
    async fn put_config(
        &self,
        shop: ShopUuid,
        config: ShopConfig,
    ) -> Result<ShopConfig, ShopsServiceError> {
        config.validate()?;

        self.repository.upsert_config(shop, &config).await?;

        info!(
            goal = %config.goal,
            population_size = config.population_size,
            segmentation = config.segmentation_enabled,
            "stored shop settings"
        );

        Ok(config)
    }
}

#[automock]
#[async_trait]
pub trait ShopsService: Send + Sync {
    /// Retrieve a shop's settings.
    async fn get_config(&self, shop: ShopUuid) -> Result<ShopConfig, ShopsServiceError>;

    /// Validate and store a shop's settings, creating the shop on first write.
    async fn put_config(
        &self,
        shop: ShopUuid,
        config: ShopConfig,
    ) -> Result<ShopConfig, ShopsServiceError>;
}
