//! Create Outcome Handler

use salvo::{
    oapi::{
        ToSchema,
        extract::{JsonBody, PathParam},
    },
    prelude::*,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use recoup::{ids::ShopUuid, impressions::OutcomeEvent};
use recoup_app::domain::outcomes::{OutcomeReceipt, OutcomeReport};

use crate::{extensions::*, outcomes::errors::into_status_error};

/// Outcome Request
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub(crate) struct OutcomeRequest {
    /// Impression returned with the decision
    pub impression_id: Uuid,

    /// Event: click or conversion
    #[salvo(schema(value_type = String))]
    pub event: OutcomeEvent,

    /// Order revenue in minor units, conversions only
    #[serde(default)]
    pub revenue: Option<u64>,
}

impl From<OutcomeRequest> for OutcomeReport {
    fn from(request: OutcomeRequest) -> Self {
        OutcomeReport {
            impression: request.impression_id.into(),
            event: request.event,
            revenue: request.revenue,
        }
    }
}

/// Outcome Response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub(crate) struct OutcomeResponse {
    pub impression_id: Uuid,

    /// False when the event had already been recorded
    pub applied: bool,
}

impl From<OutcomeReceipt> for OutcomeResponse {
    fn from(receipt: OutcomeReceipt) -> Self {
        Self {
            impression_id: receipt.impression.into_uuid(),
            applied: receipt.applied,
        }
    }
}

/// Create Outcome Handler
///
/// Records a click or conversion. Redelivery of an event is acknowledged without
/// being counted again.
#[endpoint(
    tags("outcomes"),
    summary = "Report Outcome",
    responses(
        (status_code = StatusCode::OK, description = "Outcome recorded"),
        (status_code = StatusCode::NOT_FOUND, description = "Impression not found"),
        (status_code = StatusCode::BAD_REQUEST, description = "Bad Request"),
        (status_code = StatusCode::SERVICE_UNAVAILABLE, description = "Store timed out"),
        (status_code = StatusCode::INTERNAL_SERVER_ERROR, description = "Internal Server Error"),
    ),
)]
#[tracing::instrument(
    name = "outcomes.create",
    skip(shop, json, depot),
    fields(shop_uuid = tracing::field::Empty, impression_uuid = tracing::field::Empty),
    err
)]
pub(crate) async fn handler(
    shop: PathParam<Uuid>,
    json: JsonBody<OutcomeRequest>,
    depot: &mut Depot,
) -> Result<Json<OutcomeResponse>, StatusError> {
    let state = depot.state()?;
    let shop = ShopUuid::from(shop.into_inner());
    let request = json.into_inner();

    let span = tracing::Span::current();

    span.record("shop_uuid", tracing::field::display(shop));
    span.record(
        "impression_uuid",
        tracing::field::display(request.impression_id),
    );

    let receipt = state
        .app
        .outcomes
        .record(shop, request.into())
        .await
        .map_err(into_status_error)?;

    Ok(Json(receipt.into()))
}

#[cfg(test)]
mod tests {
    use recoup::ids::ImpressionUuid;
    use recoup_app::{domain::outcomes::OutcomesServiceError, store::RepositoryError};
    use salvo::test::{ResponseExt, TestClient};
    use serde_json::json;
    use testresult::TestResult;

    use crate::test_helpers::{Mocks, TEST_SHOP_UUID, mocked_service, shop_url};

    use super::*;

    fn make_service(mocks: Mocks) -> Service {
        mocked_service(mocks, Router::with_path("shops/{shop}/outcomes").post(handler))
    }

    #[tokio::test]
    async fn test_conversion_is_recorded() -> TestResult {
        let impression = ImpressionUuid::new();

        let mut mocks = Mocks::default();

        mocks
            .outcomes
            .expect_record()
            .once()
            .withf(move |shop, report| {
                *shop == TEST_SHOP_UUID
                    && *report
                        == OutcomeReport {
                            impression,
                            event: OutcomeEvent::Conversion,
                            revenue: Some(4_500),
                        }
            })
            .return_once(move |_, _| {
                Ok(OutcomeReceipt {
                    impression,
                    applied: true,
                })
            });

        let mut res = TestClient::post(shop_url("/outcomes"))
            .json(&json!({
                "impression_id": impression,
                "event": "conversion",
                "revenue": 4_500,
            }))
            .send(&make_service(mocks))
            .await;

        let body: OutcomeResponse = res.take_json().await?;

        assert_eq!(res.status_code, Some(StatusCode::OK));
        assert_eq!(body.impression_id, impression.into_uuid());
        assert!(body.applied, "first delivery is applied");

        Ok(())
    }

    #[tokio::test]
    async fn test_redelivery_is_acknowledged() -> TestResult {
        let impression = ImpressionUuid::new();

        let mut mocks = Mocks::default();

        mocks.outcomes.expect_record().once().return_once(move |_, _| {
            Ok(OutcomeReceipt {
                impression,
                applied: false,
            })
        });

        let mut res = TestClient::post(shop_url("/outcomes"))
            .json(&json!({ "impression_id": impression, "event": "click" }))
            .send(&make_service(mocks))
            .await;

        let body: OutcomeResponse = res.take_json().await?;

        assert_eq!(res.status_code, Some(StatusCode::OK));
        assert!(!body.applied, "redelivery is not applied twice");

        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_impression_returns_404() {
        let mut mocks = Mocks::default();

        mocks
            .outcomes
            .expect_record()
            .once()
            .return_once(|_, _| Err(OutcomesServiceError::NotFound));

        let res = TestClient::post(shop_url("/outcomes"))
            .json(&json!({ "impression_id": ImpressionUuid::new(), "event": "click" }))
            .send(&make_service(mocks))
            .await;

        assert_eq!(res.status_code, Some(StatusCode::NOT_FOUND));
    }

    #[tokio::test]
    async fn test_store_timeout_returns_503() {
        let mut mocks = Mocks::default();

        mocks
            .outcomes
            .expect_record()
            .once()
            .return_once(|_, _| Err(OutcomesServiceError::Repository(RepositoryError::Timeout)));

        let res = TestClient::post(shop_url("/outcomes"))
            .json(&json!({ "impression_id": ImpressionUuid::new(), "event": "click" }))
            .send(&make_service(mocks))
            .await;

        assert_eq!(res.status_code, Some(StatusCode::SERVICE_UNAVAILABLE));
    }

    #[tokio::test]
    async fn test_unknown_event_returns_400() {
        let mut mocks = Mocks::default();

        mocks.outcomes.expect_record().never();

        let res = TestClient::post(shop_url("/outcomes"))
            .json(&json!({ "impression_id": ImpressionUuid::new(), "event": "hover" }))
            .send(&make_service(mocks))
            .await;

        assert_eq!(res.status_code, Some(StatusCode::BAD_REQUEST));
    }
}
