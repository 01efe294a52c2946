//! Update Variant Status Handler

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
    ids::{ShopUuid, VariantUuid},
    variants::VariantStatus,
};

use crate::{
    extensions::*,
    variants::{errors::into_status_error, get::VariantResponse},
};

/// Update Variant Status Request
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub(crate) struct UpdateStatusRequest {
    /// Target status: alive, protected, champion or killed
    #[salvo(schema(value_type = String))]
    pub status: VariantStatus,
}

/// Update Variant Status Handler
///
/// Applies a manual lifecycle transition. Promoting a champion demotes the
/// population's previous champion.
#[endpoint(
    tags("variants"),
    summary = "Update Variant Status",
    responses(
        (status_code = StatusCode::OK, description = "Status changed"),
        (status_code = StatusCode::NOT_FOUND, description = "Variant not found"),
        (status_code = StatusCode::CONFLICT, description = "Variant was modified concurrently"),
        (status_code = StatusCode::UNPROCESSABLE_ENTITY, description = "Transition not allowed"),
        (status_code = StatusCode::INTERNAL_SERVER_ERROR, description = "Internal Server Error"),
    ),
)]
#[tracing::instrument(
    name = "variants.status",
    skip(shop, variant, json, depot),
    fields(
        shop_uuid = tracing::field::Empty,
        variant_uuid = tracing::field::Empty,
        status = tracing::field::Empty
    ),
    err
)]
pub(crate) async fn handler(
    shop: PathParam<Uuid>,
    variant: PathParam<Uuid>,
    json: JsonBody<UpdateStatusRequest>,
    depot: &mut Depot,
) -> Result<Json<VariantResponse>, StatusError> {
    let state = depot.state()?;
    let shop = ShopUuid::from(shop.into_inner());
    let variant = VariantUuid::from(variant.into_inner());
    let status = json.into_inner().status;

    let span = tracing::Span::current();

    span.record("shop_uuid", tracing::field::display(shop));
    span.record("variant_uuid", tracing::field::display(variant));
    span.record("status", status.as_str());

    let updated = match status {
        VariantStatus::Killed => state.app.variants.kill(shop, variant).await,
        status => state.app.variants.set_status(shop, variant, status).await,
    }
    .map_err(into_status_error)?;

    Ok(Json(updated.into()))
}
