//! Evolution Errors

use salvo::http::StatusError;
use tracing::error;

use recoup_app::domain::evolution::EvolutionServiceError;

pub(crate) fn into_status_error(error: EvolutionServiceError) -> StatusError {
    match error {
        EvolutionServiceError::UnknownShop => StatusError::not_found().brief("Shop not found"),
        EvolutionServiceError::Conflict => {
            StatusError::conflict().brief("Population was modified during the cycle")
        }
        EvolutionServiceError::Repository(source) => {
            error!("failed to run evolution cycle: {source}");

            StatusError::internal_server_error()
        }
    }
}
