//! Shop Configuration
//!
//! Tunables owned by the merchant settings UI and consumed read-only by the
//! evolution cycle, the decision engine and the budget governor.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    budget::BudgetSettings,
    variants::{Baseline, UnknownValue},
};

/// Percentage points of discount cap granted per aggression level.
pub const AGGRESSION_STEP_PERCENT: u64 = 5;

/// Highest aggression level.
pub const MAX_AGGRESSION: u8 = 10;

/// What the optimiser maximises.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationGoal {
    /// Profit density (revenue per impression).
    #[default]
    Revenue,

    /// Conversion rate.
    Conversions,
}

impl OptimizationGoal {
    /// Storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Revenue => "revenue",
            Self::Conversions => "conversions",
        }
    }
}

impl fmt::Display for OptimizationGoal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OptimizationGoal {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "revenue" => Ok(Self::Revenue),
            "conversions" => Ok(Self::Conversions),
            _ => Err(UnknownValue::new("optimization goal", s)),
        }
    }
}

/// How hard the optimiser may discount, from 0 (never) to 10.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Aggression(u8);

impl Aggression {
    /// Clamp a raw level into `0..=10`.
    #[must_use]
    pub fn new(level: u8) -> Self {
        Self(level.min(MAX_AGGRESSION))
    }

    /// The raw level.
    #[must_use]
    pub const fn level(self) -> u8 {
        self.0
    }

    /// Largest discount, as percent of cart value, this level permits.
    #[must_use]
    pub fn cap_percent(self) -> u64 {
        u64::from(self.0) * AGGRESSION_STEP_PERCENT
    }
}

impl Default for Aggression {
    fn default() -> Self {
        Self(5)
    }
}

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A percentage field is above 100.
    #[error("{field} must be between 0 and 100, got {value}")]
    RateOutOfRange {
        /// Field name.
        field: &'static str,

        /// Rejected value.
        value: u8,
    },

    /// Selection pressure outside `1..=10`.
    #[error("selection_pressure must be between 1 and 10, got {0}")]
    SelectionPressure(u8),

    /// Population size outside `2..=50`.
    #[error("population_size must be between 2 and 50, got {0}")]
    PopulationSize(u16),

    /// Aggression above 10.
    #[error("aggression must be between 0 and 10, got {0}")]
    Aggression(u8),

    /// Budget enabled without a positive amount.
    #[error("budget amount must be positive when budgeting is enabled")]
    BudgetAmount,
}

/// Per-shop optimiser settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShopConfig {
    /// Per-gene mutation probability, in percent.
    pub mutation_rate: u8,

    /// Share of refill slots produced by crossover, in percent.
    pub crossover_rate: u8,

    /// Culling aggressiveness, `1..=10`.
    pub selection_pressure: u8,

    /// Target variants per population.
    pub population_size: u16,

    /// Fitness goal.
    pub goal: OptimizationGoal,

    /// Discount cap level.
    pub aggression: Aggression,

    /// Whether discount-bearing baselines are used at all.
    pub discounts_enabled: bool,

    /// Whether populations are split by visitor segment.
    pub segmentation_enabled: bool,

    /// AI discount spend cap.
    pub budget: BudgetSettings,
}

impl Default for ShopConfig {
    fn default() -> Self {
        Self {
            mutation_rate: 15,
            crossover_rate: 70,
            selection_pressure: 5,
            population_size: 10,
            goal: OptimizationGoal::Revenue,
            aggression: Aggression::default(),
            discounts_enabled: true,
            segmentation_enabled: false,
            budget: BudgetSettings::default(),
        }
    }
}

impl ShopConfig {
    /// The baseline the decision engine serves from.
    #[must_use]
    pub const fn baseline(&self) -> Baseline {
        Baseline::select(self.goal, self.discounts_enabled)
    }

    /// Check every field against its documented range.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("mutation_rate", self.mutation_rate),
            ("crossover_rate", self.crossover_rate),
        ] {
            if value > 100 {
                return Err(ConfigError::RateOutOfRange { field, value });
            }
        }

        if !(1..=10).contains(&self.selection_pressure) {
            return Err(ConfigError::SelectionPressure(self.selection_pressure));
        }

        if !(2..=50).contains(&self.population_size) {
            return Err(ConfigError::PopulationSize(self.population_size));
        }

        if self.aggression.level() > MAX_AGGRESSION {
            return Err(ConfigError::Aggression(self.aggression.level()));
        }

        if self.budget.enabled && self.budget.amount == 0 {
            return Err(ConfigError::BudgetAmount);
        }

        Ok(())
    }
}
