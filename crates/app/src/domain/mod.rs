//! Recoup Domain Concerns

pub mod budgets;
pub mod decisions;
pub mod evolution;
pub mod impressions;
pub mod outcomes;
pub mod promotions;
pub mod shops;
pub mod variants;
