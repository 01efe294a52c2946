//! Budget Governor
//!
//! Fail-safe gate in front of the budget ledger: a discount is only issued when
//! the reservation is confirmed in time.

use std::{sync::Arc, time::Duration};

use jiff::Timestamp;
use recoup::{budget::BudgetSettings, ids::ShopUuid};
use tracing::{debug, info, warn};

use crate::{
    domain::budgets::repository::{BudgetsRepository, Reservation},
    store::bounded,
};

#[derive(Clone)]
pub struct BudgetGovernor {
    repository: Arc<dyn BudgetsRepository>,
    timeout: Duration,
}

impl std::fmt::Debug for BudgetGovernor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BudgetGovernor")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl BudgetGovernor {
    #[must_use]
    pub fn new(repository: Arc<dyn BudgetsRepository>, timeout: Duration) -> Self {
        Self {
            repository,
            timeout,
        }
    }

    /// Whether a discount costing `cost` may be issued, reserving it if so.
    ///
    /// Always true when budgeting is disabled. Store errors and timeouts deny.
    pub async fn try_spend(
        &self,
        shop: ShopUuid,
        settings: &BudgetSettings,
        cost: u64,
        now: Timestamp,
    ) -> bool {
        if !settings.enabled || cost == 0 {
            return true;
        }

        match bounded(self.timeout, self.repository.reserve(shop, settings, cost, now)).await {
            Ok(Reservation::Granted(ledger)) => {
                debug!(%shop, cost, spent = ledger.spent, "reserved discount budget");

                true
            }
            Ok(Reservation::Denied(ledger)) => {
                info!(
                    %shop,
                    cost,
                    spent = ledger.spent,
                    cap = settings.amount,
                    "discount budget exhausted"
                );

                false
            }
            Err(error) => {
                warn!(%shop, error = %error, "budget unavailable, withholding discount");

                false
            }
        }
    }

    /// Hand back a reservation made by [`BudgetGovernor::try_spend`] for a discount
    /// that was never issued.
    pub async fn refund(
        &self,
        shop: ShopUuid,
        settings: &BudgetSettings,
        cost: u64,
        reserved_at: Timestamp,
    ) {
        if !settings.enabled || cost == 0 {
            return;
        }

        match bounded(self.timeout, self.repository.release(shop, cost, reserved_at)).await {
            Ok(()) => debug!(%shop, cost, "released discount budget"),
            Err(error) => warn!(%shop, cost, error = %error, "failed to release discount budget"),
        }
    }
}

#[cfg(test)]
mod tests {
    use recoup::budget::{BudgetLedger, BudgetPeriod};

    use crate::{domain::budgets::MockBudgetsRepository, store::RepositoryError};

    use super::*;

    fn enabled(amount: u64) -> BudgetSettings {
        BudgetSettings {
            enabled: true,
            amount,
            period: BudgetPeriod::Month,
        }
    }

    #[tokio::test]
    async fn disabled_budget_never_touches_the_store() {
        let mut repository = MockBudgetsRepository::new();
        repository.expect_reserve().never();

        let governor = BudgetGovernor::new(Arc::new(repository), Duration::from_millis(50));

        assert!(
            governor
                .try_spend(ShopUuid::new(), &BudgetSettings::default(), 5_000, Timestamp::now())
                .await,
            "disabled budgets always allow"
        );
    }

    #[tokio::test]
    async fn store_errors_deny() {
        let mut repository = MockBudgetsRepository::new();
        repository
            .expect_reserve()
            .once()
            .return_once(|_, _, _, _| Err(RepositoryError::Conflict));

        let governor = BudgetGovernor::new(Arc::new(repository), Duration::from_millis(50));

        assert!(
            !governor
                .try_spend(ShopUuid::new(), &enabled(100), 20, Timestamp::now())
                .await,
            "errors must fail safe"
        );
    }

    #[tokio::test]
    async fn refunds_release_what_was_reserved() {
        let now = Timestamp::now();
        let shop = ShopUuid::new();

        let mut repository = MockBudgetsRepository::new();
        repository
            .expect_release()
            .once()
            .withf(move |s, cost, at| *s == shop && *cost == 20 && *at == now)
            .return_once(|_, _, _| Ok(()));

        let governor = BudgetGovernor::new(Arc::new(repository), Duration::from_millis(50));

        governor.refund(shop, &enabled(100), 20, now).await;
        governor.refund(shop, &BudgetSettings::default(), 20, now).await;
    }

    #[tokio::test]
    async fn denied_reservations_deny() -> Result<(), jiff::Error> {
        let now = Timestamp::now();
        let ledger = BudgetLedger::open(BudgetPeriod::Month, now)?;

        let mut repository = MockBudgetsRepository::new();
        repository
            .expect_reserve()
            .once()
            .withf(|_, settings, cost, _| settings.amount == 100 && *cost == 20)
            .return_once(move |_, _, _, _| Ok(Reservation::Denied(ledger)));

        let governor = BudgetGovernor::new(Arc::new(repository), Duration::from_millis(50));

        assert!(
            !governor.try_spend(ShopUuid::new(), &enabled(100), 20, now).await,
            "an exhausted budget withholds the discount"
        );

        Ok(())
    }
}
