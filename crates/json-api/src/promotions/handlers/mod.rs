//! Promotion Handlers

pub(crate) mod create;
pub(crate) mod end;
pub(crate) mod index;
pub(crate) mod overrides;
