//! Promotions
//!
//! Detected merchant discount codes, their usage and classification.

mod errors;
mod repository;
mod service;

pub use errors::PromotionsServiceError;
pub use repository::{MockPromotionsRepository, PgPromotionsRepository, PromotionsRepository};
pub use service::{
    MockPromotionsService, NewPromotion, OrderCompleted, PromotionsService,
    StorePromotionsService,
};
