//! Promotion Override Handler

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
    ids::{PromotionUuid, ShopUuid},
    promotions::MerchantOverride,
};

use crate::{
    extensions::*,
    promotions::{errors::into_status_error, index::PromotionResponse},
};

/// Override Request
///
/// A null `type` clears the override and hands control back to the classifier.
#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
pub(crate) struct OverrideRequest {
    /// pause, force_zero, custom or ignore
    #[serde(rename = "type", default)]
    pub kind: Option<String>,

    /// Aggression, 0 to 10, required for custom overrides
    #[serde(default)]
    pub aggression: Option<u8>,
}

impl OverrideRequest {
    fn into_override(self) -> Result<Option<MerchantOverride>, StatusError> {
        self.kind
            .map(|kind| MerchantOverride::from_parts(&kind, self.aggression))
            .transpose()
            .or_400("unknown override, or custom override without aggression")
    }
}

/// Promotion Override Handler
#[endpoint(
    tags("promotions"),
    summary = "Set Promotion Override",
    responses(
        (status_code = StatusCode::OK, description = "Override stored"),
        (status_code = StatusCode::NOT_FOUND, description = "Promotion not found"),
        (status_code = StatusCode::CONFLICT, description = "Promotion has ended"),
        (status_code = StatusCode::BAD_REQUEST, description = "Bad Request"),
        (status_code = StatusCode::INTERNAL_SERVER_ERROR, description = "Internal Server Error"),
    ),
)]
#[tracing::instrument(
    name = "promotions.override",
    skip(shop, promotion, json, depot),
    fields(
        shop_uuid = tracing::field::Empty,
        promotion_uuid = tracing::field::Empty,
        merchant_override = tracing::field::Empty
    ),
    err
)]
pub(crate) async fn handler(
    shop: PathParam<Uuid>,
    promotion: PathParam<Uuid>,
    json: JsonBody<OverrideRequest>,
    depot: &mut Depot,
) -> Result<Json<PromotionResponse>, StatusError> {
    let state = depot.state()?;
    let shop = ShopUuid::from(shop.into_inner());
    let promotion = PromotionUuid::from(promotion.into_inner());
    let merchant_override = json.into_inner().into_override()?;

    let span = tracing::Span::current();

    span.record("shop_uuid", tracing::field::display(shop));
    span.record("promotion_uuid", tracing::field::display(promotion));
    span.record(
        "merchant_override",
        merchant_override.map_or("none", MerchantOverride::as_str),
    );

    let promotion = state
        .app
        .promotions
        .set_override(shop, promotion, merchant_override)
        .await
        .map_err(into_status_error)?;

    Ok(Json(promotion.into()))
}
