//! Shared state access for handlers.

use std::sync::Arc;

use salvo::prelude::{Depot, StatusError};
use tracing::error;

use crate::state::State;

/// Handler access to the [`State`] injected by the root router.
pub(crate) trait DepotExt {
    /// The injected [`State`], or a logged 500 when a router was assembled without it.
    fn state(&self) -> Result<&Arc<State>, StatusError>;
}

impl DepotExt for Depot {
    fn state(&self) -> Result<&Arc<State>, StatusError> {
        self.obtain::<Arc<State>>().map_err(|_missing| {
            error!("recoup state was not injected into the depot");

            StatusError::internal_server_error()
        })
    }
}

#[cfg(test)]
mod tests {
    use salvo::{prelude::*, test::TestClient};

    use super::*;

    #[handler]
    async fn needs_state(depot: &mut Depot) -> Result<&'static str, StatusError> {
        let _state = depot.state()?;

        Ok("ok")
    }

    #[tokio::test]
    async fn missing_state_is_an_internal_error() {
        let service = Service::new(Router::with_path("needs-state").get(needs_state));

        let res = TestClient::get("http://localhost/needs-state")
            .send(&service)
            .await;

        assert_eq!(res.status_code, Some(StatusCode::INTERNAL_SERVER_ERROR));
    }
}
