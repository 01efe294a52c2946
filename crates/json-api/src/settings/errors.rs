//! Shop Settings Errors

use salvo::http::StatusError;
use tracing::error;

use recoup_app::domain::shops::ShopsServiceError;

pub(crate) fn into_status_error(error: ShopsServiceError) -> StatusError {
    match error {
        ShopsServiceError::NotFound => StatusError::not_found().brief("Shop not found"),
        ShopsServiceError::Invalid(source) => StatusError::bad_request().brief(source.to_string()),
        ShopsServiceError::Repository(source) => {
            error!("failed to access shop settings: {source}");

            StatusError::internal_server_error()
        }
    }
}
