//! Budgets

mod governor;
mod repository;

pub use governor::BudgetGovernor;
pub use repository::{BudgetsRepository, MockBudgetsRepository, PgBudgetsRepository, Reservation};
