//! Variant Index Handler

use salvo::{
    oapi::{
        ToSchema,
        extract::{PathParam, QueryParam},
    },
    prelude::*,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use recoup::{
    ids::ShopUuid,
    variants::{Baseline, PopulationKey, Segment},
};

use crate::{
    extensions::*,
    variants::{errors::into_status_error, get::VariantResponse},
};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub(crate) struct VariantsResponse {
    /// The variants of the population
    pub variants: Vec<VariantResponse>,
}

/// Variant Index Handler
///
/// Lists one population: the `baseline` and optional `segment` select it.
#[endpoint(
    tags("variants"),
    summary = "List Variants",
    responses(
        (status_code = StatusCode::OK, description = "Population members"),
        (status_code = StatusCode::BAD_REQUEST, description = "Bad Request"),
        (status_code = StatusCode::INTERNAL_SERVER_ERROR, description = "Internal Server Error"),
    ),
)]
pub(crate) async fn handler(
    shop: PathParam<Uuid>,
    baseline: QueryParam<String, true>,
    segment: QueryParam<String, false>,
    include_killed: QueryParam<bool, false>,
    depot: &mut Depot,
) -> Result<Json<VariantsResponse>, StatusError> {
    let state = depot.state()?;

    let baseline = baseline
        .into_inner()
        .parse::<Baseline>()
        .or_400("could not parse \"baseline\" query parameter")?;

    let key = PopulationKey::new(baseline, segment.into_inner().map(Segment::new));

    let variants = state
        .app
        .variants
        .list(
            ShopUuid::from(shop.into_inner()),
            key,
            include_killed.into_inner().unwrap_or_default(),
        )
        .await
        .map_err(into_status_error)?;

    Ok(Json(VariantsResponse {
        variants: variants.into_iter().map(Into::into).collect(),
    }))
}
