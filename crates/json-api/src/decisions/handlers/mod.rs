//! Decision Handlers

pub(crate) mod create;
