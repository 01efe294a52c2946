//! Variant Fitness Handler

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
    fitness::FitnessMetrics,
    ids::{ShopUuid, VariantUuid},
    impressions::{ImpressionFilter, PromotionSlice},
    variants::Segment,
};

use crate::{extensions::*, variants::errors::into_status_error};

/// Fitness Response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub(crate) struct FitnessResponse {
    pub impressions: u64,

    pub clicks: u64,

    pub conversions: u64,

    /// Revenue in minor units
    pub revenue: u64,

    /// Revenue net of discount cost per impression, as a decimal string
    pub profit_per_impression: String,
}

impl From<FitnessMetrics> for FitnessResponse {
    fn from(metrics: FitnessMetrics) -> Self {
        Self {
            impressions: metrics.impressions,
            clicks: metrics.clicks,
            conversions: metrics.conversions,
            revenue: metrics.revenue,
            profit_per_impression: metrics.profit_per_impression.to_string(),
        }
    }
}

/// Variant Fitness Handler
///
/// Metrics over a slice of the variant's impressions. `promotion` is one of
/// `any` (default), `outside` or `during`.
#[endpoint(
    tags("variants"),
    summary = "Variant Fitness",
    responses(
        (status_code = StatusCode::OK, description = "Fitness over the slice"),
        (status_code = StatusCode::NOT_FOUND, description = "Variant not found"),
        (status_code = StatusCode::BAD_REQUEST, description = "Bad Request"),
        (status_code = StatusCode::INTERNAL_SERVER_ERROR, description = "Internal Server Error"),
    ),
)]
pub(crate) async fn handler(
    shop: PathParam<Uuid>,
    variant: PathParam<Uuid>,
    promotion: QueryParam<String, false>,
    segment: QueryParam<String, false>,
    depot: &mut Depot,
) -> Result<Json<FitnessResponse>, StatusError> {
    let state = depot.state()?;

    let promotion = promotion
        .into_inner()
        .map(|value| value.parse::<PromotionSlice>())
        .transpose()
        .or_400("could not parse \"promotion\" query parameter")?
        .unwrap_or_default();

    let filter = ImpressionFilter {
        promotion,
        segment: segment.into_inner().map(Segment::new),
    };

    let metrics = state
        .app
        .variants
        .fitness(
            ShopUuid::from(shop.into_inner()),
            VariantUuid::from(variant.into_inner()),
            filter,
        )
        .await
        .map_err(into_status_error)?;

    Ok(Json(metrics.into()))
}
