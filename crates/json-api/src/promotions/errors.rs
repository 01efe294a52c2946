//! Promotion Errors

use salvo::http::StatusError;
use tracing::error;

use recoup_app::domain::promotions::PromotionsServiceError;

pub(crate) fn into_status_error(error: PromotionsServiceError) -> StatusError {
    match error {
        PromotionsServiceError::AlreadyExists => {
            StatusError::conflict().brief("An open promotion with this code already exists")
        }
        PromotionsServiceError::NotFound => StatusError::not_found().brief("Promotion not found"),
        PromotionsServiceError::UnknownShop => StatusError::not_found().brief("Shop not found"),
        PromotionsServiceError::Ended => StatusError::conflict().brief("Promotion has ended"),
        PromotionsServiceError::Repository(source) => {
            error!("failed to access promotions: {source}");

            StatusError::internal_server_error()
        }
    }
}
