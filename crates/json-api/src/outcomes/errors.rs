//! Outcome Errors

use salvo::http::StatusError;
use tracing::error;

use recoup_app::{domain::outcomes::OutcomesServiceError, store::RepositoryError};

pub(crate) fn into_status_error(error: OutcomesServiceError) -> StatusError {
    match error {
        OutcomesServiceError::NotFound => StatusError::not_found().brief("Impression not found"),
        OutcomesServiceError::Repository(RepositoryError::Timeout) => {
            error!("timed out recording outcome");

            StatusError::service_unavailable()
        }
        OutcomesServiceError::Repository(source) => {
            error!("failed to record outcome: {source}");

            StatusError::internal_server_error()
        }
    }
}
