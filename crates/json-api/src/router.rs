//! App Router

use salvo::Router;

use crate::{decisions, evolution, orders, outcomes, promotions, settings, variants};

pub fn app_router() -> Router {
    Router::with_path("shops/{shop}")
        .push(Router::with_path("decisions").post(decisions::create::handler))
        .push(Router::with_path("outcomes").post(outcomes::create::handler))
        .push(
            Router::with_path("config")
                .get(settings::get::handler)
                .put(settings::update::handler),
        )
        .push(
            Router::with_path("variants")
                .get(variants::index::handler)
                .post(variants::create::handler)
                .push(
                    Router::with_path("{variant}")
                        .get(variants::get::handler)
                        .push(Router::with_path("fitness").get(variants::fitness::handler))
                        .push(Router::with_path("status").put(variants::status::handler)),
                ),
        )
        .push(Router::with_path("evolution").post(evolution::create::handler))
        .push(
            Router::with_path("promotions")
                .get(promotions::index::handler)
                .post(promotions::create::handler)
                .push(
                    Router::with_path("{promotion}")
                        .push(Router::with_path("override").put(promotions::overrides::handler))
                        .push(Router::with_path("end").post(promotions::end::handler)),
                ),
        )
        .push(Router::with_path("orders").post(orders::create::handler))
}
