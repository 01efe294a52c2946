//! Decisions
//!
//! The visitor-facing serving path.

mod service;

pub use service::{DecisionsService, MockDecisionsService, StoreDecisionsService};
