//! Promotions service.

use std::sync::Arc;

use async_trait::async_trait;
use jiff::Timestamp;
use mockall::automock;
use recoup::{
    ids::{PromotionUuid, ShopUuid},
    promotions::{DiscountType, MerchantOverride, Promotion, classify},
};
use serde::Deserialize;
use smallvec::SmallVec;
use tracing::{Span, debug, info, warn};

use crate::domain::promotions::{errors::PromotionsServiceError, repository::PromotionsRepository};

/// A discount code the merchant just created.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewPromotion {
    /// Code as entered at checkout.
    pub code: String,

    /// Discount shape.
    pub discount_type: DiscountType,

    /// Percent points or minor units, depending on `discount_type`.
    pub amount: u64,

    /// Scheduled end, if any.
    #[serde(default)]
    pub ends_at: Option<Timestamp>,
}

/// A completed order and the discount codes it used.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OrderCompleted {
    /// Platform order identifier; redelivery of the same order is ignored.
    pub order_id: String,

    /// Codes applied at checkout.
    pub codes: SmallVec<[String; 2]>,
}

#[derive(Clone)]
pub struct StorePromotionsService {
    repository: Arc<dyn PromotionsRepository>,
}

impl StorePromotionsService {
    #[must_use]
    pub fn new(repository: Arc<dyn PromotionsRepository>) -> Self {
        Self { repository }
    }

    async fn reclassify(
        &self,
        mut promotion: Promotion,
        now: Timestamp,
    ) -> Result<Promotion, PromotionsServiceError> {
        let Some(classification) = classify(&promotion, now) else {
            debug!(promotion_uuid = %promotion.uuid, "promotion still in cooldown");

            return Ok(promotion);
        };

        let previous = promotion.classification;

        if promotion.apply_classification(classification, now).is_err() {
            return Ok(promotion);
        }

        self.repository.save_classification(&promotion).await?;

        if previous != Some(classification) {
            info!(
                promotion_uuid = %promotion.uuid,
                code = %promotion.code,
                classification = %classification,
                usage_total = promotion.usage_total,
                "classified promotion"
            );
        }

        Ok(promotion)
    }
}

impl std::fmt::Debug for StorePromotionsService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorePromotionsService").finish_non_exhaustive()
    }
}

#[async_trait]
impl PromotionsService for StorePromotionsService {
    #[tracing::instrument(
        name = "promotions.service.detect",
        skip(self, new),
        fields(shop_uuid = %shop, code = %new.code, promotion_uuid = tracing::field::Empty),
        err
    )]
    async fn detect(
        &self,
        shop: ShopUuid,
        new: NewPromotion,
    ) -> Result<Promotion, PromotionsServiceError> {
        let mut promotion = Promotion::detect(
            PromotionUuid::new(),
            shop,
            new.code,
            new.discount_type,
            new.amount,
            Timestamp::now(),
        );
        promotion.ends_at = new.ends_at;

        Span::current().record("promotion_uuid", tracing::field::display(promotion.uuid));

        self.repository.create(&promotion).await?;

        info!("started monitoring promotion");

        Ok(promotion)
    }

    #[tracing::instrument(
        name = "promotions.service.record_order",
        skip(self, order),
        fields(shop_uuid = %shop, order_id = %order.order_id),
        err
    )]
    async fn record_order(
        &self,
        shop: ShopUuid,
        order: OrderCompleted,
    ) -> Result<Vec<Promotion>, PromotionsServiceError> {
        let now = Timestamp::now();
        let mut touched = Vec::with_capacity(order.codes.len());

        for code in &order.codes {
            let Some(promotion) = self
                .repository
                .record_usage(shop, code, &order.order_id, now)
                .await?
            else {
                debug!(%code, "order used an unmonitored code");

                continue;
            };

            match self.reclassify(promotion.clone(), now).await {
                Ok(promotion) => touched.push(promotion),
                // Ended between the usage write and classification.
                Err(PromotionsServiceError::Ended) => {
                    warn!(promotion_uuid = %promotion.uuid, "promotion ended mid-classification");
                    touched.push(promotion);
                }
                Err(error) => return Err(error),
            }
        }

        Ok(touched)
    }

    #[tracing::instrument(
        name = "promotions.service.set_override",
        skip(self),
        fields(shop_uuid = %shop, promotion_uuid = %promotion),
        err
    )]
    async fn set_override(
        &self,
        shop: ShopUuid,
        promotion: PromotionUuid,
        merchant_override: Option<MerchantOverride>,
    ) -> Result<Promotion, PromotionsServiceError> {
        let updated = self
            .repository
            .set_override(shop, promotion, merchant_override)
            .await?;

        info!(
            merchant_override = merchant_override.map_or("none", MerchantOverride::as_str),
            "set promotion override"
        );

        Ok(updated)
    }

    #[tracing::instrument(
        name = "promotions.service.end",
        skip(self),
        fields(shop_uuid = %shop, promotion_uuid = %promotion),
        err
    )]
    async fn end(
        &self,
        shop: ShopUuid,
        promotion: PromotionUuid,
    ) -> Result<Promotion, PromotionsServiceError> {
        let ended = self
            .repository
            .end(shop, promotion, Timestamp::now())
            .await?;

        info!("ended promotion");

        Ok(ended)
    }

    #[tracing::instrument(
        name = "promotions.service.list",
        skip(self),
        fields(shop_uuid = %shop),
        err
    )]
    async fn list(&self, shop: ShopUuid) -> Result<Vec<Promotion>, PromotionsServiceError> {
        Ok(self.repository.list(shop).await?)
    }
}

#[automock]
#[async_trait]
pub trait PromotionsService: Send + Sync {
    /// Start monitoring a newly created discount code.
    async fn detect(
        &self,
        shop: ShopUuid,
        new: NewPromotion,
    ) -> Result<Promotion, PromotionsServiceError>;

    /// Count a completed order against the promotions whose codes it used, then
    /// attempt classification. Returns the promotions the order touched.
    async fn record_order(
        &self,
        shop: ShopUuid,
        order: OrderCompleted,
    ) -> Result<Vec<Promotion>, PromotionsServiceError>;

    /// Set or clear the merchant override.
    async fn set_override(
        &self,
        shop: ShopUuid,
        promotion: PromotionUuid,
        merchant_override: Option<MerchantOverride>,
    ) -> Result<Promotion, PromotionsServiceError>;

    /// End a promotion.
    async fn end(
        &self,
        shop: ShopUuid,
        promotion: PromotionUuid,
    ) -> Result<Promotion, PromotionsServiceError>;

    /// Every promotion of the shop.
    async fn list(&self, shop: ShopUuid) -> Result<Vec<Promotion>, PromotionsServiceError>;
}
