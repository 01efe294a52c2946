//! Create Order Handler

use salvo::{
    oapi::{
        ToSchema,
        extract::{JsonBody, PathParam},
    },
    prelude::*,
};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use uuid::Uuid;

use recoup::ids::ShopUuid;
use recoup_app::domain::promotions::OrderCompleted;

use crate::{
    extensions::*,
    promotions::{errors::into_status_error, index::PromotionsResponse},
};

/// Order Completed Request
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub(crate) struct OrderCompletedRequest {
    /// Platform order identifier; redelivered orders are counted once
    pub order_id: String,

    /// Discount codes applied at checkout
    #[serde(default)]
    pub codes: SmallVec<[String; 2]>,
}

impl From<OrderCompletedRequest> for OrderCompleted {
    fn from(request: OrderCompletedRequest) -> Self {
        OrderCompleted {
            order_id: request.order_id,
            codes: request.codes,
        }
    }
}

/// Create Order Handler
///
/// Counts a completed order against the promotions whose codes it used, then
/// attempts their classification. Returns the promotions the order touched.
#[endpoint(
    tags("orders"),
    summary = "Order Completed",
    responses(
        (status_code = StatusCode::OK, description = "Promotions touched by the order"),
        (status_code = StatusCode::BAD_REQUEST, description = "Bad Request"),
        (status_code = StatusCode::INTERNAL_SERVER_ERROR, description = "Internal Server Error"),
    ),
)]
#[tracing::instrument(
    name = "orders.create",
    skip(shop, json, depot),
    fields(
        shop_uuid = tracing::field::Empty,
        order_id = tracing::field::Empty,
        codes_count = tracing::field::Empty
    ),
    err
)]
pub(crate) async fn handler(
    shop: PathParam<Uuid>,
    json: JsonBody<OrderCompletedRequest>,
    depot: &mut Depot,
) -> Result<Json<PromotionsResponse>, StatusError> {
    let state = depot.state()?;
    let shop = ShopUuid::from(shop.into_inner());
    let request = json.into_inner();

    let span = tracing::Span::current();

    span.record("shop_uuid", tracing::field::display(shop));
    span.record("order_id", request.order_id.as_str());
    span.record("codes_count", request.codes.len());

    let touched = state
        .app
        .promotions
        .record_order(shop, request.into())
        .await
        .map_err(into_status_error)?;

    Ok(Json(touched.into()))
}
