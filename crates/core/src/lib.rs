//! Recoup
//!
//! Recoup is a cart-abandonment offer optimisation engine: it evolves populations of
//! popup offers per shop, decides which offer each exiting visitor sees, and keeps
//! discount spend inside merchant budgets and promotion rules.
//!
//! This crate is the synchronous core. It performs no I/O; stores and services live
//! in `recoup-app`.

pub mod budget;
pub mod config;
pub mod decisions;
pub mod evolution;
pub mod fitness;
pub mod genes;
pub mod ids;
pub mod impressions;
pub mod prelude;
pub mod promotions;
pub mod signals;
pub mod variants;
