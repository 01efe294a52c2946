//! Outcomes
//!
//! Clicks and conversions reported against served impressions.

mod errors;
mod service;

pub use errors::OutcomesServiceError;
pub use service::{
    MockOutcomesService, OutcomeReceipt, OutcomeReport, OutcomesService, StoreOutcomesService,
};
