//! Decisions

mod handlers;

pub(crate) use handlers::*;
