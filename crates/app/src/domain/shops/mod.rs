//! Shops

mod errors;
mod repository;
mod service;

pub use errors::ShopsServiceError;
pub use repository::{MockShopsRepository, PgShopsRepository, ShopsRepository};
pub use service::{MockShopsService, ShopsService, StoreShopsService};
