//! Create Decision Handler

use salvo::{
    oapi::{
        ToSchema,
        extract::{JsonBody, PathParam},
    },
    prelude::*,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use recoup::{
    decisions::{Decision, Offer, OfferKind, ServedVariant},
    ids::ShopUuid,
    signals::{AccountStatus, Device, TrafficSource, VisitFrequency, VisitorSignals},
    variants::Segment,
};

use crate::{extensions::*, observability::observe_decision};

/// Decision Request
///
/// Signals describing the visitor showing exit intent.
#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub(crate) struct DecisionRequest {
    /// Device class: desktop, mobile or tablet
    #[salvo(schema(value_type = String))]
    pub device: Device,

    /// Traffic source: direct, organic, paid, social, email or referral
    #[salvo(schema(value_type = String))]
    pub traffic: TrafficSource,

    /// Cart value in minor units
    pub cart_value: u64,

    /// Visit frequency: first_visit or returning
    #[salvo(schema(value_type = String))]
    pub visit: VisitFrequency,

    /// Account status: guest or customer
    #[salvo(schema(value_type = String))]
    pub account: AccountStatus,

    /// Whether the storefront knows of a running merchant promotion
    pub promotion_active: bool,
}

impl From<DecisionRequest> for VisitorSignals {
    fn from(request: DecisionRequest) -> Self {
        VisitorSignals {
            device: request.device,
            traffic: request.traffic,
            cart_value: request.cart_value,
            visit: request.visit,
            account: request.account,
            promotion_active: request.promotion_active,
        }
    }
}

/// Served Variant Response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub(crate) struct ServedVariantResponse {
    /// The variant identifier
    pub id: Uuid,

    /// Audience segment of the variant's population, absent when shop-wide
    pub segment: Option<String>,

    pub headline: String,

    pub subhead: String,

    pub cta: String,

    /// Call-to-action target: cart or checkout
    pub redirect: String,

    /// Whether to show urgency cues
    pub urgency: bool,
}

impl From<ServedVariant> for ServedVariantResponse {
    fn from(variant: ServedVariant) -> Self {
        Self {
            id: variant.uuid.into_uuid(),
            segment: variant.segment.as_ref().map(Segment::as_str).map(str::to_owned),
            headline: variant.headline,
            subhead: variant.subhead,
            cta: variant.cta,
            redirect: variant.redirect.as_str().to_owned(),
            urgency: variant.urgency,
        }
    }
}

/// Decision Response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub(crate) struct DecisionResponse {
    /// Identifier to report clicks and conversions against
    pub impression_id: Uuid,

    /// Offer shape: none, no-discount, percentage, fixed or threshold
    #[serde(rename = "type")]
    pub offer_type: String,

    /// Percent points for percentage offers, minor units otherwise
    pub amount: u64,

    /// Cart value the visitor must reach, threshold offers only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<u64>,

    /// Discount code to apply at checkout
    pub code: Option<String>,

    /// Copy to render, absent when nothing or built-in copy is shown
    pub variant: Option<ServedVariantResponse>,

    /// How the decision was reached
    pub source: String,
}

/// Widget-facing offer label. Storage keeps the snake-case spelling.
fn offer_type(kind: OfferKind) -> &'static str {
    match kind {
        OfferKind::NoDiscount => "no-discount",
        kind => kind.as_str(),
    }
}

impl From<Decision> for DecisionResponse {
    fn from(decision: Decision) -> Self {
        let (amount, threshold) = match decision.offer {
            Offer::None | Offer::NoDiscount => (0, None),
            Offer::Percentage { amount } | Offer::Fixed { amount } => (amount, None),
            Offer::Threshold { amount, threshold } => (amount, Some(threshold)),
        };

        Self {
            impression_id: decision.impression.into_uuid(),
            offer_type: offer_type(decision.offer.kind()).to_owned(),
            amount,
            threshold,
            code: decision.code,
            variant: decision.variant.map(Into::into),
            source: decision.source.as_str().to_owned(),
        }
    }
}

/// Create Decision Handler
///
/// Decides what an exiting visitor sees. Store trouble degrades the decision
/// rather than failing the request.
#[endpoint(
    tags("decisions"),
    summary = "Decide Offer",
    responses(
        (status_code = StatusCode::OK, description = "Decision for the visitor"),
        (status_code = StatusCode::BAD_REQUEST, description = "Bad Request"),
    ),
)]
pub(crate) async fn handler(
    shop: PathParam<Uuid>,
    json: JsonBody<DecisionRequest>,
    depot: &mut Depot,
) -> Result<Json<DecisionResponse>, StatusError> {
    let state = depot.state()?;
    let shop = ShopUuid::from(shop.into_inner());

    let decision = state
        .app
        .decisions
        .decide(shop, json.into_inner().into())
        .await;

    observe_decision(decision.offer.kind().as_str());

    Ok(Json(decision.into()))
}

#[cfg(test)]
mod tests {
    use recoup::{
        decisions::DecisionSource,
        genes::Redirect,
        ids::{ImpressionUuid, VariantUuid},
    };
    use salvo::test::{ResponseExt, TestClient};
    use serde_json::json;
    use testresult::TestResult;

    use crate::test_helpers::{Mocks, TEST_SHOP_UUID, mocked_service, shop_url};

    use super::*;

    fn make_service(mocks: Mocks) -> Service {
        mocked_service(mocks, Router::with_path("shops/{shop}/decisions").post(handler))
    }

    fn served_variant() -> ServedVariant {
        ServedVariant {
            uuid: VariantUuid::new(),
            segment: None,
            headline: "Wait!".to_owned(),
            subhead: "Your cart misses you".to_owned(),
            cta: "Back to cart".to_owned(),
            redirect: Redirect::Checkout,
            urgency: true,
        }
    }

    #[tokio::test]
    async fn test_decision_returns_offer_and_code() -> TestResult {
        let impression = ImpressionUuid::new();
        let variant = served_variant();
        let variant_uuid = variant.uuid;

        let mut mocks = Mocks::default();

        mocks
            .decisions
            .expect_decide()
            .once()
            .withf(|shop, signals| {
                *shop == TEST_SHOP_UUID
                    && signals.device == Device::Mobile
                    && signals.traffic == TrafficSource::Paid
                    && signals.cart_value == 20_000
            })
            .return_once(move |_, _| Decision {
                impression,
                offer: Offer::Percentage { amount: 10 },
                code: Some("RECOUP-ABCDEF12".to_owned()),
                variant: Some(variant),
                source: DecisionSource::Exploit,
            });

        let mut res = TestClient::post(shop_url("/decisions"))
            .json(&json!({ "device": "mobile", "traffic": "paid", "cart_value": 20_000 }))
            .send(&make_service(mocks))
            .await;

        let body: DecisionResponse = res.take_json().await?;

        assert_eq!(res.status_code, Some(StatusCode::OK));
        assert_eq!(body.impression_id, impression.into_uuid());
        assert_eq!(body.offer_type, "percentage");
        assert_eq!(body.amount, 10);
        assert_eq!(body.threshold, None);
        assert_eq!(body.code.as_deref(), Some("RECOUP-ABCDEF12"));
        assert_eq!(body.source, "exploit");
        assert_eq!(
            body.variant.map(|variant| (variant.id, variant.redirect)),
            Some((variant_uuid.into_uuid(), "checkout".to_owned()))
        );

        Ok(())
    }

    #[tokio::test]
    async fn test_threshold_offer_carries_threshold() -> TestResult {
        let mut mocks = Mocks::default();

        mocks.decisions.expect_decide().once().return_once(|_, _| Decision {
            impression: ImpressionUuid::new(),
            offer: Offer::Threshold {
                amount: 500,
                threshold: 13_000,
            },
            code: Some("RECOUP-00000001".to_owned()),
            variant: Some(served_variant()),
            source: DecisionSource::Explore,
        });

        let mut res = TestClient::post(shop_url("/decisions"))
            .json(&json!({ "cart_value": 10_000 }))
            .send(&make_service(mocks))
            .await;

        let body: DecisionResponse = res.take_json().await?;

        assert_eq!(body.offer_type, "threshold");
        assert_eq!(body.amount, 500);
        assert_eq!(body.threshold, Some(13_000));

        Ok(())
    }

    #[tokio::test]
    async fn test_skipped_decision_is_still_200() -> TestResult {
        let impression = ImpressionUuid::new();

        let mut mocks = Mocks::default();

        mocks
            .decisions
            .expect_decide()
            .once()
            .withf(|_, signals| signals.promotion_active)
            .return_once(move |_, _| Decision::skipped(impression));

        let mut res = TestClient::post(shop_url("/decisions"))
            .json(&json!({ "promotion_active": true }))
            .send(&make_service(mocks))
            .await;

        let body: DecisionResponse = res.take_json().await?;

        assert_eq!(res.status_code, Some(StatusCode::OK));
        assert_eq!(body.offer_type, "none");
        assert_eq!(body.source, "skipped");
        assert!(body.variant.is_none(), "skipped decisions carry no copy");
        assert!(body.code.is_none(), "skipped decisions carry no code");

        Ok(())
    }

    #[tokio::test]
    async fn test_copy_only_decision_is_hyphenated() -> TestResult {
        let mut mocks = Mocks::default();

        mocks.decisions.expect_decide().once().return_once(|_, _| Decision {
            impression: ImpressionUuid::new(),
            offer: Offer::NoDiscount,
            code: None,
            variant: Some(served_variant()),
            source: DecisionSource::Exploit,
        });

        let mut res = TestClient::post(shop_url("/decisions"))
            .json(&json!({ "cart_value": 10_000 }))
            .send(&make_service(mocks))
            .await;

        let body: serde_json::Value = res.take_json().await?;

        assert_eq!(body["type"], "no-discount");
        assert_eq!(body["amount"], 0);

        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_shop_uuid_returns_400() {
        let mut mocks = Mocks::default();

        mocks.decisions.expect_decide().never();

        let res = TestClient::post("http://example.com/shops/not-a-uuid/decisions")
            .json(&json!({}))
            .send(&make_service(mocks))
            .await;

        assert_eq!(res.status_code, Some(StatusCode::BAD_REQUEST));
    }
}
