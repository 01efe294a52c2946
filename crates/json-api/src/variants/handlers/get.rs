//! Get Variant Handler

use salvo::{
    oapi::{ToSchema, extract::PathParam},
    prelude::*,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use recoup::{
    ids::{ShopUuid, VariantUuid},
    variants::{Segment, Variant, VariantStats},
};

use crate::{extensions::*, variants::errors::into_status_error};

/// Variant Stats Response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub(crate) struct VariantStatsResponse {
    pub impressions: u64,
    pub clicks: u64,
    pub conversions: u64,

    /// Attributed revenue in minor units
    pub revenue: u64,
}

impl From<VariantStats> for VariantStatsResponse {
    fn from(stats: VariantStats) -> Self {
        Self {
            impressions: stats.impressions,
            clicks: stats.clicks,
            conversions: stats.conversions,
            revenue: stats.revenue,
        }
    }
}

/// Variant Response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub(crate) struct VariantResponse {
    /// The unique identifier of the variant
    pub uuid: Uuid,

    /// Baseline of the variant's population
    pub baseline: String,

    /// Audience segment, absent for the shop-wide population
    pub segment: Option<String>,

    pub headline: String,

    pub subhead: String,

    pub cta: String,

    /// Offer shape: percentage, fixed or threshold
    pub offer_type: String,

    /// Percent points for percentage offers, minor units otherwise
    pub offer_amount: u64,

    /// Call-to-action target: cart or checkout
    pub redirect: String,

    pub urgency: bool,

    /// Cycles since the population was seeded
    pub generation: u32,

    /// Lifecycle status: alive, protected, champion or killed
    pub status: String,

    pub is_champion: bool,

    /// Cached counters over the impression log
    pub stats: VariantStatsResponse,

    /// The date and time the variant was created
    pub created_at: String,
}

impl From<Variant> for VariantResponse {
    fn from(variant: Variant) -> Self {
        Self {
            uuid: variant.uuid.into_uuid(),
            baseline: variant.key.baseline.as_str().to_owned(),
            segment: variant.key.segment.as_ref().map(Segment::as_str).map(str::to_owned),
            headline: variant.genes.headline,
            subhead: variant.genes.subhead,
            cta: variant.genes.cta,
            offer_type: variant.genes.offer_type.as_str().to_owned(),
            offer_amount: variant.genes.offer_amount,
            redirect: variant.genes.redirect.as_str().to_owned(),
            urgency: variant.genes.urgency,
            generation: variant.generation,
            status: variant.status.as_str().to_owned(),
            is_champion: variant.is_champion,
            stats: variant.stats.into(),
            created_at: variant.created_at.to_string(),
        }
    }
}

/// Get Variant Handler
#[endpoint(
    tags("variants"),
    summary = "Get Variant",
    responses(
        (status_code = StatusCode::OK, description = "Variant"),
        (status_code = StatusCode::NOT_FOUND, description = "Variant not found"),
        (status_code = StatusCode::INTERNAL_SERVER_ERROR, description = "Internal Server Error"),
    ),
)]
pub(crate) async fn handler(
    shop: PathParam<Uuid>,
    variant: PathParam<Uuid>,
    depot: &mut Depot,
) -> Result<Json<VariantResponse>, StatusError> {
    let state = depot.state()?;

    let variant = state
        .app
        .variants
        .get(
            ShopUuid::from(shop.into_inner()),
            VariantUuid::from(variant.into_inner()),
        )
        .await
        .map_err(into_status_error)?;

    Ok(Json(variant.into()))
}
