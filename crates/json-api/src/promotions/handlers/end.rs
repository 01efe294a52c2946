//! End Promotion Handler

use salvo::{oapi::extract::PathParam, prelude::*};
use uuid::Uuid;

use recoup::ids::{PromotionUuid, ShopUuid};

use crate::{
    extensions::*,
    promotions::{errors::into_status_error, index::PromotionResponse},
};

/// End Promotion Handler
///
/// Ends a promotion; it stops influencing serving immediately.
#[endpoint(
    tags("promotions"),
    summary = "End Promotion",
    responses(
        (status_code = StatusCode::OK, description = "Promotion ended"),
        (status_code = StatusCode::NOT_FOUND, description = "Promotion not found"),
        (status_code = StatusCode::CONFLICT, description = "Promotion has already ended"),
        (status_code = StatusCode::INTERNAL_SERVER_ERROR, description = "Internal Server Error"),
    ),
)]
pub(crate) async fn handler(
    shop: PathParam<Uuid>,
    promotion: PathParam<Uuid>,
    depot: &mut Depot,
) -> Result<Json<PromotionResponse>, StatusError> {
    let state = depot.state()?;

    let promotion = state
        .app
        .promotions
        .end(
            ShopUuid::from(shop.into_inner()),
            PromotionUuid::from(promotion.into_inner()),
        )
        .await
        .map_err(into_status_error)?;

    Ok(Json(promotion.into()))
}
