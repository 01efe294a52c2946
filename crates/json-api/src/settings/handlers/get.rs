//! Get Shop Settings Handler

use salvo::{
    oapi::{ToSchema, extract::PathParam},
    prelude::*,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use recoup::{
    budget::{BudgetPeriod, BudgetSettings},
    config::{Aggression, OptimizationGoal, ShopConfig},
    ids::ShopUuid,
};

use crate::{extensions::*, settings::errors::into_status_error};

/// Budget Settings
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema)]
pub(crate) struct BudgetPayload {
    /// Whether AI discount spend is capped
    pub enabled: bool,

    /// Cap per period in minor units
    pub amount: u64,

    /// Period: week or month
    #[salvo(schema(value_type = String))]
    pub period: BudgetPeriod,
}

/// Shop Settings
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub(crate) struct SettingsPayload {
    /// Per-gene mutation probability, in percent
    pub mutation_rate: u8,

    /// Share of refill slots bred by crossover, in percent
    pub crossover_rate: u8,

    /// Culling aggressiveness, 1 to 10
    pub selection_pressure: u8,

    /// Target variants per population, 2 to 50
    pub population_size: u16,

    /// Fitness goal: revenue or conversions
    #[salvo(schema(value_type = String))]
    pub goal: OptimizationGoal,

    /// Discount cap level, 0 to 10
    pub aggression: u8,

    pub discounts_enabled: bool,

    pub segmentation_enabled: bool,

    pub budget: BudgetPayload,
}

impl From<ShopConfig> for SettingsPayload {
    fn from(config: ShopConfig) -> Self {
        Self {
            mutation_rate: config.mutation_rate,
            crossover_rate: config.crossover_rate,
            selection_pressure: config.selection_pressure,
            population_size: config.population_size,
            goal: config.goal,
            aggression: config.aggression.level(),
            discounts_enabled: config.discounts_enabled,
            segmentation_enabled: config.segmentation_enabled,
            budget: BudgetPayload {
                enabled: config.budget.enabled,
                amount: config.budget.amount,
                period: config.budget.period,
            },
        }
    }
}

impl From<SettingsPayload> for ShopConfig {
    fn from(payload: SettingsPayload) -> Self {
        ShopConfig {
            mutation_rate: payload.mutation_rate,
            crossover_rate: payload.crossover_rate,
            selection_pressure: payload.selection_pressure,
            population_size: payload.population_size,
            goal: payload.goal,
            aggression: Aggression::new(payload.aggression),
            discounts_enabled: payload.discounts_enabled,
            segmentation_enabled: payload.segmentation_enabled,
            budget: BudgetSettings {
                enabled: payload.budget.enabled,
                amount: payload.budget.amount,
                period: payload.budget.period,
            },
        }
    }
}

/// Get Shop Settings Handler
#[endpoint(
    tags("settings"),
    summary = "Get Shop Settings",
    responses(
        (status_code = StatusCode::OK, description = "Shop settings"),
        (status_code = StatusCode::NOT_FOUND, description = "Shop not found"),
        (status_code = StatusCode::INTERNAL_SERVER_ERROR, description = "Internal Server Error"),
    ),
)]
pub(crate) async fn handler(
    shop: PathParam<Uuid>,
    depot: &mut Depot,
) -> Result<Json<SettingsPayload>, StatusError> {
    let state = depot.state()?;

    let config = state
        .app
        .shops
        .get_config(ShopUuid::from(shop.into_inner()))
        .await
        .map_err(into_status_error)?;

    Ok(Json(config.into()))
}
