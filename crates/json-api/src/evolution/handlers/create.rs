//! Run Evolution Cycle Handler

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
    ids::ShopUuid,
    variants::{Baseline, PopulationKey, Segment},
};
use recoup_app::domain::evolution::{CycleOutcome, CycleTrigger};

use crate::{evolution::errors::into_status_error, extensions::*};

/// Run Cycle Request
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub(crate) struct RunCycleRequest {
    /// Baseline of the population to evolve
    #[salvo(schema(value_type = String))]
    pub baseline: Baseline,

    /// Audience segment, omitted for the shop-wide population
    #[serde(default)]
    pub segment: Option<String>,
}

/// Cycle Response
#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
pub(crate) struct CycleResponse {
    /// completed, already_running or skipped
    pub outcome: String,

    /// Variants culled by the cycle
    pub killed: Vec<Uuid>,

    /// Offspring added by the cycle
    pub born: Vec<Uuid>,

    pub crossover_births: usize,

    pub fresh_births: usize,

    pub mutated_genes: usize,

    /// Refill slots left empty for lack of genes
    pub skipped_slots: usize,

    /// When the cycle was applied
    pub completed_at: Option<String>,
}

impl From<CycleOutcome> for CycleResponse {
    fn from(outcome: CycleOutcome) -> Self {
        match outcome {
            CycleOutcome::Completed(report) => Self {
                outcome: "completed".to_owned(),
                killed: report.killed.into_iter().map(Into::into).collect(),
                born: report.born.into_iter().map(Into::into).collect(),
                crossover_births: report.crossover_births,
                fresh_births: report.fresh_births,
                mutated_genes: report.mutated_genes,
                skipped_slots: report.skipped_slots,
                completed_at: Some(report.completed_at.to_string()),
            },
            CycleOutcome::AlreadyRunning => Self {
                outcome: "already_running".to_owned(),
                ..Self::default()
            },
            CycleOutcome::Skipped => Self {
                outcome: "skipped".to_owned(),
                ..Self::default()
            },
        }
    }
}

/// Run Evolution Cycle Handler
///
/// Runs a cycle now for one population, regardless of impression volume. A
/// cycle already running for the population is reported, not waited on.
#[endpoint(
    tags("evolution"),
    summary = "Run Evolution Cycle",
    responses(
        (status_code = StatusCode::OK, description = "Cycle outcome"),
        (status_code = StatusCode::NOT_FOUND, description = "Shop not found"),
        (status_code = StatusCode::CONFLICT, description = "Population was modified during the cycle"),
        (status_code = StatusCode::BAD_REQUEST, description = "Bad Request"),
        (status_code = StatusCode::INTERNAL_SERVER_ERROR, description = "Internal Server Error"),
    ),
)]
#[tracing::instrument(
    name = "evolution.create",
    skip(shop, json, depot),
    fields(shop_uuid = tracing::field::Empty, population = tracing::field::Empty),
    err
)]
pub(crate) async fn handler(
    shop: PathParam<Uuid>,
    json: JsonBody<RunCycleRequest>,
    depot: &mut Depot,
) -> Result<Json<CycleResponse>, StatusError> {
    let state = depot.state()?;
    let shop = ShopUuid::from(shop.into_inner());
    let request = json.into_inner();
    let key = PopulationKey::new(request.baseline, request.segment.map(Segment::new));

    let span = tracing::Span::current();

    span.record("shop_uuid", tracing::field::display(shop));
    span.record("population", tracing::field::display(&key));

    let outcome = state
        .app
        .evolution
        .run_cycle(shop, key, CycleTrigger::Manual)
        .await
        .map_err(into_status_error)?;

    Ok(Json(outcome.into()))
}
