//! Variants

mod errors;
mod repository;
mod service;

pub use errors::VariantsServiceError;
pub use repository::{MockVariantsRepository, PgVariantsRepository, VariantsRepository};
pub use service::{MockVariantsService, NewVariant, StoreVariantsService, VariantsService};
