//! Shop Settings

mod errors;
mod handlers;

pub(crate) use handlers::*;
