//! Impressions
//!
//! The append-only serving log. Variant stats are a cache over it.

use recoup::impressions::Impression;

mod repository;

pub use repository::{ImpressionsRepository, MockImpressionsRepository, PgImpressionsRepository};

/// Counter changes an outcome makes to the serving variant's cached stats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct StatsDelta {
    pub(crate) clicks: u64,
    pub(crate) conversions: u64,
    pub(crate) revenue: u64,
}

impl StatsDelta {
    pub(crate) fn between(before: &Impression, after: &Impression) -> Self {
        Self {
            clicks: u64::from(after.clicked && !before.clicked),
            conversions: u64::from(after.converted && !before.converted),
            revenue: after.revenue.saturating_sub(before.revenue),
        }
    }
}
