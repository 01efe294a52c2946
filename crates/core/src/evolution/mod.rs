//! Evolution
//!
//! Periodic culling and breeding of a variant population.

pub mod planner;
pub mod selection;

pub use planner::{CycleInputs, EvolutionPlan, plan_cycle};
pub use selection::{Ranked, SurvivorPolicy, default_survivors, rank};

/// Impressions a shop must accumulate since its last cycle before the next one runs.
pub const CYCLE_IMPRESSION_THRESHOLD: u64 = 100;

/// Whether enough fresh impressions have arrived to run a cycle.
#[must_use]
pub const fn cycle_due(impressions_since_last_cycle: u64) -> bool {
    impressions_since_last_cycle >= CYCLE_IMPRESSION_THRESHOLD
}
