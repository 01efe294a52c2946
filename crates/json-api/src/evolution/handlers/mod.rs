//! Evolution Handlers

pub(crate) mod create;
