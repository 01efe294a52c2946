//! Evolution
//!
//! Runs evolution cycles against the stored populations, one at a time per population.

mod errors;
mod locks;
mod service;

pub use errors::EvolutionServiceError;
pub use locks::PopulationLocks;
pub use service::{
    CycleOutcome, CycleReport, CycleTrigger, EvolutionService, MockEvolutionService,
    StoreEvolutionService,
};
