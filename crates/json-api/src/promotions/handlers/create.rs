//! Create Promotion Handler

use jiff::Timestamp;
use salvo::{
    http::header::LOCATION,
    oapi::{
        ToSchema,
        extract::{JsonBody, PathParam},
    },
    prelude::*,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use recoup::{ids::ShopUuid, promotions::DiscountType};
use recoup_app::domain::promotions::NewPromotion;

use crate::{
    extensions::*,
    promotions::{errors::into_status_error, index::PromotionResponse},
};

/// Create Promotion Request
///
/// Sent when the merchant creates a discount code on the commerce platform.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub(crate) struct CreatePromotionRequest {
    /// Code as entered at checkout
    pub code: String,

    /// percentage, fixed or free_shipping
    #[salvo(schema(value_type = String))]
    pub discount_type: DiscountType,

    /// Percent points or minor units, depending on the discount type
    #[serde(default)]
    pub amount: u64,

    /// Scheduled end as an RFC 3339 timestamp
    #[serde(default)]
    pub ends_at: Option<String>,
}

/// Create Promotion Handler
#[endpoint(
    tags("promotions"),
    summary = "Detect Promotion",
    responses(
        (status_code = StatusCode::CREATED, description = "Promotion monitored"),
        (status_code = StatusCode::CONFLICT, description = "An open promotion with this code already exists"),
        (status_code = StatusCode::NOT_FOUND, description = "Shop not found"),
        (status_code = StatusCode::BAD_REQUEST, description = "Bad Request"),
        (status_code = StatusCode::INTERNAL_SERVER_ERROR, description = "Internal Server Error"),
    ),
)]
#[tracing::instrument(
    name = "promotions.create",
    skip(shop, json, depot, res),
    fields(shop_uuid = tracing::field::Empty, code = tracing::field::Empty),
    err
)]
pub(crate) async fn handler(
    shop: PathParam<Uuid>,
    json: JsonBody<CreatePromotionRequest>,
    depot: &mut Depot,
    res: &mut Response,
) -> Result<Json<PromotionResponse>, StatusError> {
    let state = depot.state()?;
    let shop = ShopUuid::from(shop.into_inner());
    let request = json.into_inner();

    let span = tracing::Span::current();

    span.record("shop_uuid", tracing::field::display(shop));
    span.record("code", request.code.as_str());

    let ends_at = request
        .ends_at
        .map(|value| value.parse::<Timestamp>())
        .transpose()
        .or_400("could not parse \"ends_at\"")?;

    let promotion = state
        .app
        .promotions
        .detect(
            shop,
            NewPromotion {
                code: request.code,
                discount_type: request.discount_type,
                amount: request.amount,
                ends_at,
            },
        )
        .await
        .map_err(into_status_error)?;

    res.add_header(
        LOCATION,
        format!("/shops/{shop}/promotions/{}", promotion.uuid),
        true,
    )
    .or_500("failed to set location header")?
    .status_code(StatusCode::CREATED);

    Ok(Json(promotion.into()))
}

#[cfg(test)]
mod tests {
    use recoup::ids::PromotionUuid;
    use recoup_app::domain::promotions::PromotionsServiceError;
    use salvo::test::{ResponseExt, TestClient};
    use serde_json::json;
    use testresult::TestResult;

    use crate::{
        promotions::handlers::tests::make_promotion,
        test_helpers::{Mocks, TEST_SHOP_UUID, mocked_service, shop_url},
    };

    use super::*;

    fn make_service(mocks: Mocks) -> Service {
        mocked_service(mocks, Router::with_path("shops/{shop}/promotions").post(handler))
    }

    #[tokio::test]
    async fn test_create_promotion_success() -> TestResult {
        let uuid = PromotionUuid::new();
        let promotion = make_promotion(uuid, "SUMMER25");
        let ends_at: Timestamp = "2026-08-31T23:59:59Z".parse()?;

        let mut mocks = Mocks::default();

        mocks
            .promotions
            .expect_detect()
            .once()
            .withf(move |shop, new| {
                *shop == TEST_SHOP_UUID
                    && *new
                        == NewPromotion {
                            code: "SUMMER25".to_owned(),
                            discount_type: DiscountType::Percentage,
                            amount: 25,
                            ends_at: Some(ends_at),
                        }
            })
            .return_once(move |_, _| Ok(promotion));

        let mut res = TestClient::post(shop_url("/promotions"))
            .json(&json!({
                "code": "SUMMER25",
                "discount_type": "percentage",
                "amount": 25,
                "ends_at": "2026-08-31T23:59:59Z",
            }))
            .send(&make_service(mocks))
            .await;

        let body: PromotionResponse = res.take_json().await?;
        let location = res.headers().get("location").and_then(|v| v.to_str().ok());

        assert_eq!(res.status_code, Some(StatusCode::CREATED));
        assert_eq!(
            location,
            Some(format!("/shops/{TEST_SHOP_UUID}/promotions/{uuid}").as_str())
        );
        assert_eq!(body.status, "monitoring");

        Ok(())
    }

    #[tokio::test]
    async fn test_duplicate_open_code_returns_409() {
        let mut mocks = Mocks::default();

        mocks
            .promotions
            .expect_detect()
            .once()
            .return_once(|_, _| Err(PromotionsServiceError::AlreadyExists));

        let res = TestClient::post(shop_url("/promotions"))
            .json(&json!({ "code": "SUMMER25", "discount_type": "fixed", "amount": 500 }))
            .send(&make_service(mocks))
            .await;

        assert_eq!(res.status_code, Some(StatusCode::CONFLICT));
    }

    #[tokio::test]
    async fn test_unparseable_end_returns_400() {
        let mut mocks = Mocks::default();

        mocks.promotions.expect_detect().never();

        let res = TestClient::post(shop_url("/promotions"))
            .json(&json!({
                "code": "SUMMER25",
                "discount_type": "free_shipping",
                "ends_at": "next tuesday",
            }))
            .send(&make_service(mocks))
            .await;

        assert_eq!(res.status_code, Some(StatusCode::BAD_REQUEST));
    }
}
