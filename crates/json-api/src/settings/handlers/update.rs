//! Update Shop Settings Handler

use salvo::{
    oapi::extract::{JsonBody, PathParam},
    prelude::*,
};
use uuid::Uuid;

use recoup::ids::ShopUuid;

use crate::{
    extensions::*,
    settings::{errors::into_status_error, get::SettingsPayload},
};

/// Update Shop Settings Handler
///
/// Validates and stores the settings, creating the shop on first write.
#[endpoint(
    tags("settings"),
    summary = "Update Shop Settings",
    responses(
        (status_code = StatusCode::OK, description = "Shop settings stored"),
        (status_code = StatusCode::BAD_REQUEST, description = "Invalid settings"),
        (status_code = StatusCode::INTERNAL_SERVER_ERROR, description = "Internal Server Error"),
    ),
)]
#[tracing::instrument(
    name = "settings.update",
    skip(shop, json, depot),
    fields(shop_uuid = tracing::field::Empty),
    err
)]
pub(crate) async fn handler(
    shop: PathParam<Uuid>,
    json: JsonBody<SettingsPayload>,
    depot: &mut Depot,
) -> Result<Json<SettingsPayload>, StatusError> {
    let state = depot.state()?;
    let shop = ShopUuid::from(shop.into_inner());

    tracing::Span::current().record("shop_uuid", tracing::field::display(shop));

    let config = state
        .app
        .shops
        .put_config(shop, json.into_inner().into())
        .await
        .map_err(into_status_error)?;

    tracing::info!(shop_uuid = %shop, baseline = %config.baseline(), "stored shop settings");

    Ok(Json(config.into()))
}
