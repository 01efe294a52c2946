//! Variant Errors

use salvo::http::StatusError;
use tracing::error;

use recoup_app::domain::variants::VariantsServiceError;

pub(crate) fn into_status_error(error: VariantsServiceError) -> StatusError {
    match error {
        VariantsServiceError::AlreadyExists => {
            StatusError::conflict().brief("Variant already exists")
        }
        VariantsServiceError::NotFound => StatusError::not_found().brief("Variant not found"),
        VariantsServiceError::UnknownShop => StatusError::not_found().brief("Shop not found"),
        VariantsServiceError::Lifecycle(source) => {
            StatusError::unprocessable_entity().brief(source.to_string())
        }
        VariantsServiceError::Conflict => {
            StatusError::conflict().brief("Variant was modified concurrently")
        }
        VariantsServiceError::Repository(source) => {
            error!("failed to access variants: {source}");

            StatusError::internal_server_error()
        }
    }
}
