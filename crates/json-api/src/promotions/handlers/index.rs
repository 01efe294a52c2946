//! Promotion Index Handler

use std::string::ToString;

use salvo::{
    oapi::{ToSchema, extract::PathParam},
    prelude::*,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use recoup::{
    ids::ShopUuid,
    promotions::{AiStrategy, Classification, MerchantOverride, Promotion, PromotionPolicy},
};

use crate::{extensions::*, promotions::errors::into_status_error};

/// Promotion Response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub(crate) struct PromotionResponse {
    /// The unique identifier of the promotion
    pub uuid: Uuid,

    /// Discount code as entered at checkout
    pub code: String,

    /// percentage, fixed or free_shipping
    pub discount_type: String,

    /// Percent points or minor units, depending on the discount type
    pub amount: u64,

    /// monitoring, active or ended
    pub status: String,

    /// site_wide, targeted or customer_service once classified
    pub classification: Option<String>,

    /// Strategy derived from the classification
    pub strategy: Option<String>,

    /// pause, force_zero, custom or ignore when the merchant set one
    pub merchant_override: Option<String>,

    /// Aggression of a custom override
    pub override_aggression: Option<u8>,

    /// What the promotion currently does to serving
    pub policy: String,

    pub usage_total: u64,

    pub usage_last_24h: u64,

    pub detected_at: String,

    pub ends_at: Option<String>,

    pub last_used_at: Option<String>,

    pub classified_at: Option<String>,

    pub ended_at: Option<String>,
}

fn policy_label(policy: PromotionPolicy) -> &'static str {
    match policy {
        PromotionPolicy::Continue => "continue",
        PromotionPolicy::Increase => "increase",
        PromotionPolicy::Custom { .. } => "custom",
        PromotionPolicy::ForceZero => "force_zero",
        PromotionPolicy::Pause => "pause",
    }
}

impl From<Promotion> for PromotionResponse {
    fn from(promotion: Promotion) -> Self {
        let policy = policy_label(promotion.effective_policy()).to_owned();

        Self {
            uuid: promotion.uuid.into_uuid(),
            code: promotion.code,
            discount_type: promotion.discount_type.as_str().to_owned(),
            amount: promotion.amount,
            status: promotion.status.as_str().to_owned(),
            classification: promotion
                .classification
                .map(Classification::as_str)
                .map(str::to_owned),
            strategy: promotion.strategy.map(AiStrategy::as_str).map(str::to_owned),
            merchant_override: promotion
                .merchant_override
                .map(MerchantOverride::as_str)
                .map(str::to_owned),
            override_aggression: promotion
                .merchant_override
                .and_then(MerchantOverride::aggression)
                .map(|aggression| aggression.level()),
            policy,
            usage_total: promotion.usage_total,
            usage_last_24h: promotion.usage_last_24h,
            detected_at: promotion.detected_at.to_string(),
            ends_at: promotion.ends_at.as_ref().map(ToString::to_string),
            last_used_at: promotion.last_used_at.as_ref().map(ToString::to_string),
            classified_at: promotion.classified_at.as_ref().map(ToString::to_string),
            ended_at: promotion.ended_at.as_ref().map(ToString::to_string),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub(crate) struct PromotionsResponse {
    /// The list of promotions
    pub promotions: Vec<PromotionResponse>,
}

impl From<Vec<Promotion>> for PromotionsResponse {
    fn from(promotions: Vec<Promotion>) -> Self {
        Self {
            promotions: promotions.into_iter().map(Into::into).collect(),
        }
    }
}

/// Promotion Index Handler
///
/// Returns every promotion of the shop.
#[endpoint(
    tags("promotions"),
    summary = "List Promotions",
    responses(
        (status_code = StatusCode::OK, description = "Promotions"),
        (status_code = StatusCode::INTERNAL_SERVER_ERROR, description = "Internal Server Error"),
    ),
)]
pub(crate) async fn handler(
    shop: PathParam<Uuid>,
    depot: &mut Depot,
) -> Result<Json<PromotionsResponse>, StatusError> {
    let state = depot.state()?;

    let promotions = state
        .app
        .promotions
        .list(ShopUuid::from(shop.into_inner()))
        .await
        .map_err(into_status_error)?;

    Ok(Json(promotions.into()))
}

#[cfg(test)]
mod tests {
    use recoup::{config::Aggression, ids::PromotionUuid};
    use salvo::test::{ResponseExt, TestClient};
    use testresult::TestResult;

    use crate::{
        promotions::handlers::tests::make_promotion,
        test_helpers::{Mocks, TEST_SHOP_UUID, mocked_service, shop_url},
    };

    use super::*;

    fn make_service(mocks: Mocks) -> Service {
        mocked_service(mocks, Router::with_path("shops/{shop}/promotions").get(handler))
    }

    #[tokio::test]
    async fn test_index_returns_promotions_with_policy() -> TestResult {
        let mut custom = make_promotion(PromotionUuid::new(), "SPRING20");

        custom.merchant_override = Some(MerchantOverride::Custom {
            aggression: Aggression::new(2),
        });

        let plain = make_promotion(PromotionUuid::new(), "VIP10");

        let mut mocks = Mocks::default();

        mocks
            .promotions
            .expect_list()
            .once()
            .withf(|shop| *shop == TEST_SHOP_UUID)
            .return_once(move |_| Ok(vec![custom, plain]));

        let mut res = TestClient::get(shop_url("/promotions"))
            .send(&make_service(mocks))
            .await;

        let body: PromotionsResponse = res.take_json().await?;

        assert_eq!(res.status_code, Some(StatusCode::OK));
        assert_eq!(body.promotions.len(), 2);

        let [custom, plain] = body.promotions.as_slice() else {
            panic!("expected two promotions");
        };

        assert_eq!(custom.merchant_override.as_deref(), Some("custom"));
        assert_eq!(custom.override_aggression, Some(2));
        assert_eq!(custom.policy, "custom");
        assert_eq!(plain.status, "monitoring");
        assert_eq!(plain.policy, "continue");
        assert!(plain.classification.is_none(), "not yet classified");

        Ok(())
    }
}
