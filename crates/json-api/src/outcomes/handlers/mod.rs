//! Outcome Handlers

pub(crate) mod create;
