//! Outcomes service.

use std::sync::Arc;

use async_trait::async_trait;
use mockall::automock;
use recoup::{
    ids::{ImpressionUuid, ShopUuid},
    impressions::OutcomeEvent,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::domain::{impressions::ImpressionsRepository, outcomes::errors::OutcomesServiceError};

/// A click or conversion reported by the storefront.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct OutcomeReport {
    /// Impression the outcome belongs to.
    #[serde(rename = "impression_id")]
    pub impression: ImpressionUuid,

    pub event: OutcomeEvent,

    /// Order revenue in minor units; only read for conversions.
    #[serde(default)]
    pub revenue: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OutcomeReceipt {
    #[serde(rename = "impression_id")]
    pub impression: ImpressionUuid,

    /// False when the event had already been recorded.
    pub applied: bool,
}

#[derive(Clone)]
pub struct StoreOutcomesService {
    impressions: Arc<dyn ImpressionsRepository>,
}

impl StoreOutcomesService {
    #[must_use]
    pub fn new(impressions: Arc<dyn ImpressionsRepository>) -> Self {
        Self { impressions }
    }
}

impl std::fmt::Debug for StoreOutcomesService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreOutcomesService").finish_non_exhaustive()
    }
}

#[async_trait]
impl OutcomesService for StoreOutcomesService {
    #[tracing::instrument(
        name = "outcomes.service.record",
        skip(self, report),
        fields(
            shop_uuid = %shop,
            impression_uuid = %report.impression,
            event = report.event.as_str(),
        ),
        err
    )]
    async fn record(
        &self,
        shop: ShopUuid,
        report: OutcomeReport,
    ) -> Result<OutcomeReceipt, OutcomesServiceError> {
        let revenue = match report.event {
            OutcomeEvent::Click => 0,
            OutcomeEvent::Conversion => report.revenue.unwrap_or_default(),
        };

        let applied = self
            .impressions
            .apply_outcome(shop, report.impression, report.event, revenue)
            .await?;

        if applied {
            info!(revenue, "recorded outcome");
        } else {
            debug!("duplicate outcome ignored");
        }

        Ok(OutcomeReceipt {
            impression: report.impression,
            applied,
        })
    }
}

#[automock]
#[async_trait]
pub trait OutcomesService: Send + Sync {
    /// Record an outcome once; redelivery of the same event is a no-op.
    async fn record(
        &self,
        shop: ShopUuid,
        report: OutcomeReport,
    ) -> Result<OutcomeReceipt, OutcomesServiceError>;
}
