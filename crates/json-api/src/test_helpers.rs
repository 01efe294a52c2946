//! Test helpers.

use std::sync::Arc;

use salvo::{affix_state::inject, prelude::*};
use uuid::Uuid;

use recoup::ids::ShopUuid;
use recoup_app::{
    context::AppContext,
    domain::{
        decisions::MockDecisionsService, evolution::MockEvolutionService,
        outcomes::MockOutcomesService, promotions::MockPromotionsService,
        shops::MockShopsService, variants::MockVariantsService,
    },
};

use crate::state::State;

pub(crate) const TEST_SHOP_UUID: ShopUuid = ShopUuid::from_uuid(Uuid::nil());

/// Service mocks wired into a test router. A mock without expectations rejects
/// every call.
#[derive(Default)]
pub(crate) struct Mocks {
    pub(crate) shops: MockShopsService,
    pub(crate) variants: MockVariantsService,
    pub(crate) decisions: MockDecisionsService,
    pub(crate) outcomes: MockOutcomesService,
    pub(crate) evolution: MockEvolutionService,
    pub(crate) promotions: MockPromotionsService,
}

impl Mocks {
    fn into_context(self) -> AppContext {
        AppContext {
            shops: Arc::new(self.shops),
            variants: Arc::new(self.variants),
            decisions: Arc::new(self.decisions),
            outcomes: Arc::new(self.outcomes),
            evolution: Arc::new(self.evolution),
            promotions: Arc::new(self.promotions),
        }
    }
}

pub(crate) fn mocked_service(mocks: Mocks, route: Router) -> Service {
    Service::new(
        Router::new()
            .hoop(inject(State::from_app_context(mocks.into_context())))
            .push(route),
    )
}

/// Absolute URL for a path under the test shop.
pub(crate) fn shop_url(path: &str) -> String {
    format!("http://example.com/shops/{TEST_SHOP_UUID}{path}")
}
