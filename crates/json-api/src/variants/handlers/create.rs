//! Create Variant Handler

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

use recoup::{
    genes::{Genes, OfferType, Redirect},
    ids::ShopUuid,
    variants::{Baseline, PopulationKey, Segment},
};
use recoup_app::domain::variants::NewVariant;

use crate::{
    extensions::*,
    variants::{errors::into_status_error, get::VariantResponse},
};

/// Create Variant Request
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub(crate) struct CreateVariantRequest {
    /// Baseline of the population to join
    #[salvo(schema(value_type = String))]
    pub baseline: Baseline,

    /// Audience segment, omitted for the shop-wide population
    #[serde(default)]
    pub segment: Option<String>,

    pub headline: String,

    pub subhead: String,

    pub cta: String,

    /// Offer shape: percentage, fixed or threshold
    #[salvo(schema(value_type = String))]
    pub offer_type: OfferType,

    /// Percent points for percentage offers, minor units otherwise
    #[serde(default)]
    pub offer_amount: u64,

    /// Call-to-action target: cart or checkout
    #[serde(default)]
    #[salvo(schema(value_type = String))]
    pub redirect: Redirect,

    #[serde(default)]
    pub urgency: bool,
}

impl From<CreateVariantRequest> for NewVariant {
    fn from(request: CreateVariantRequest) -> Self {
        NewVariant {
            key: PopulationKey::new(request.baseline, request.segment.map(Segment::new)),
            genes: Genes {
                headline: request.headline,
                subhead: request.subhead,
                cta: request.cta,
                offer_type: request.offer_type,
                offer_amount: request.offer_amount,
                redirect: request.redirect,
                urgency: request.urgency,
            },
        }
    }
}

/// Create Variant Handler
///
/// Adds a merchant-authored variant to a population.
#[endpoint(
    tags("variants"),
    summary = "Create Variant",
    responses(
        (status_code = StatusCode::CREATED, description = "Variant created"),
        (status_code = StatusCode::NOT_FOUND, description = "Shop not found"),
        (status_code = StatusCode::CONFLICT, description = "Variant already exists"),
        (status_code = StatusCode::BAD_REQUEST, description = "Bad Request"),
        (status_code = StatusCode::INTERNAL_SERVER_ERROR, description = "Internal Server Error"),
    ),
)]
#[tracing::instrument(
    name = "variants.create",
    skip(shop, json, depot, res),
    fields(shop_uuid = tracing::field::Empty, population = tracing::field::Empty),
    err
)]
pub(crate) async fn handler(
    shop: PathParam<Uuid>,
    json: JsonBody<CreateVariantRequest>,
    depot: &mut Depot,
    res: &mut Response,
) -> Result<Json<VariantResponse>, StatusError> {
    let state = depot.state()?;
    let shop = ShopUuid::from(shop.into_inner());
    let new: NewVariant = json.into_inner().into();

    let span = tracing::Span::current();

    span.record("shop_uuid", tracing::field::display(shop));
    span.record("population", tracing::field::display(&new.key));

    let variant = state
        .app
        .variants
        .create(shop, new)
        .await
        .map_err(into_status_error)?;

    res.add_header(
        LOCATION,
        format!("/shops/{shop}/variants/{}", variant.uuid),
        true,
    )
    .or_500("failed to set location header")?
    .status_code(StatusCode::CREATED);

    Ok(Json(variant.into()))
}
