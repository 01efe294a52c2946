//! Variants
//!
//! A variant is one offer "genome" living in a population keyed by
//! `(shop, baseline, segment)`.

use std::{fmt, str::FromStr};

use jiff::Timestamp;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    config::OptimizationGoal,
    genes::Genes,
    ids::{ShopUuid, VariantUuid},
};

/// Optimisation context a population belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Baseline {
    /// Maximise revenue, offers may carry a discount.
    RevenueWithDiscount,

    /// Maximise revenue with copy-only offers.
    RevenueNoDiscount,

    /// Maximise conversions, offers may carry a discount.
    ConversionWithDiscount,

    /// Maximise conversions with copy-only offers.
    ConversionNoDiscount,
}

impl Baseline {
    /// Every baseline, in a stable order.
    pub const ALL: [Self; 4] = [
        Self::RevenueWithDiscount,
        Self::RevenueNoDiscount,
        Self::ConversionWithDiscount,
        Self::ConversionNoDiscount,
    ];

    /// Pick the baseline for a shop's goal and discount setting.
    #[must_use]
    pub const fn select(goal: OptimizationGoal, discounts_enabled: bool) -> Self {
        match (goal, discounts_enabled) {
            (OptimizationGoal::Revenue, true) => Self::RevenueWithDiscount,
            (OptimizationGoal::Revenue, false) => Self::RevenueNoDiscount,
            (OptimizationGoal::Conversions, true) => Self::ConversionWithDiscount,
            (OptimizationGoal::Conversions, false) => Self::ConversionNoDiscount,
        }
    }

    /// Whether variants in this baseline carry a discount.
    #[must_use]
    pub const fn offers_discount(self) -> bool {
        matches!(self, Self::RevenueWithDiscount | Self::ConversionWithDiscount)
    }

    /// The fitness goal implied by this baseline.
    #[must_use]
    pub const fn goal(self) -> OptimizationGoal {
        match self {
            Self::RevenueWithDiscount | Self::RevenueNoDiscount => OptimizationGoal::Revenue,
            Self::ConversionWithDiscount | Self::ConversionNoDiscount => {
                OptimizationGoal::Conversions
            }
        }
    }

    /// Storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RevenueWithDiscount => "revenue_with_discount",
            Self::RevenueNoDiscount => "revenue_no_discount",
            Self::ConversionWithDiscount => "conversion_with_discount",
            Self::ConversionNoDiscount => "conversion_no_discount",
        }
    }
}

impl fmt::Display for Baseline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raised when parsing an unknown enum representation.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown {kind} value {value:?}")]
pub struct UnknownValue {
    /// The enum being parsed.
    pub kind: &'static str,

    /// The rejected input.
    pub value: String,
}

impl UnknownValue {
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

impl FromStr for Baseline {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|baseline| baseline.as_str() == s)
            .ok_or_else(|| UnknownValue::new("baseline", s))
    }
}

/// Audience bucket key, e.g. `mobile-paid-high`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Segment(String);

impl Segment {
    /// Wrap a segment key.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The raw key.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifies one independently evolved population within a shop.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PopulationKey {
    /// Optimisation context.
    pub baseline: Baseline,

    /// Audience bucket; `None` for the shop-wide population.
    pub segment: Option<Segment>,
}

impl PopulationKey {
    /// Create a population key.
    #[must_use]
    pub const fn new(baseline: Baseline, segment: Option<Segment>) -> Self {
        Self { baseline, segment }
    }

    /// The shop-wide population for a baseline.
    #[must_use]
    pub const fn shop_wide(baseline: Baseline) -> Self {
        Self {
            baseline,
            segment: None,
        }
    }

    /// The segment key used by stores that cannot index nulls.
    #[must_use]
    pub fn segment_key(&self) -> &str {
        self.segment.as_ref().map_or("", Segment::as_str)
    }
}

impl fmt::Display for PopulationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.segment {
            Some(segment) => write!(f, "{}/{segment}", self.baseline),
            None => write!(f, "{}/*", self.baseline),
        }
    }
}

/// Lifecycle status of a variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariantStatus {
    /// Competing normally; subject to ranking and culling.
    Alive,

    /// Exempt from culling by merchant choice.
    Protected,

    /// Favoured for serving within its population.
    Champion,

    /// Terminal; never served or bred again.
    Killed,
}

/// Errors raised by variant lifecycle transitions.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LifecycleError {
    /// The requested transition is not part of the lifecycle.
    #[error("cannot move a variant from {from} to {to}")]
    InvalidTransition {
        /// Current status.
        from: VariantStatus,

        /// Requested status.
        to: VariantStatus,
    },
}

impl VariantStatus {
    const ALL: [Self; 4] = [Self::Alive, Self::Protected, Self::Champion, Self::Killed];

    /// Validate a transition and return the new status.
    ///
    /// Champions must be demoted before they can be killed, and `Killed` is terminal.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::InvalidTransition`] for any move not in the lifecycle,
    /// including moving to the current status.
    pub const fn transition_to(self, to: Self) -> Result<Self, LifecycleError> {
        let allowed = matches!(
            (self, to),
            (Self::Alive, Self::Protected | Self::Champion | Self::Killed)
                | (Self::Protected, Self::Alive | Self::Champion | Self::Killed)
                | (Self::Champion, Self::Alive | Self::Protected)
        );

        if allowed {
            Ok(to)
        } else {
            Err(LifecycleError::InvalidTransition { from: self, to })
        }
    }

    /// Whether a variant with this status may be served.
    #[must_use]
    pub const fn is_servable(self) -> bool {
        !matches!(self, Self::Killed)
    }

    /// Storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Alive => "alive",
            Self::Protected => "protected",
            Self::Champion => "champion",
            Self::Killed => "killed",
        }
    }
}

impl fmt::Display for VariantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VariantStatus {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownValue::new("variant status", s))
    }
}

/// Denormalised performance counters, always re-derivable from the impression log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantStats {
    /// Times served.
    pub impressions: u64,

    /// Times clicked.
    pub clicks: u64,

    /// Times converted.
    pub conversions: u64,

    /// Realised revenue in minor units.
    pub revenue: u64,
}

impl VariantStats {
    /// Revenue divided by impressions; zero when never served.
    #[must_use]
    pub fn profit_per_impression(&self) -> Decimal {
        if self.impressions == 0 {
            return Decimal::ZERO;
        }

        Decimal::from(self.revenue) / Decimal::from(self.impressions)
    }

    /// Conversions divided by impressions; zero when never served.
    #[must_use]
    #[expect(
        clippy::cast_precision_loss,
        reason = "counters stay far below 2^52 and the rate is only used for ranking"
    )]
    pub fn conversion_rate(&self) -> f64 {
        if self.impressions == 0 {
            return 0.0;
        }

        self.conversions as f64 / self.impressions as f64
    }
}

/// An offer variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    /// Identifier.
    pub uuid: VariantUuid,

    /// Owning shop.
    pub shop: ShopUuid,

    /// Population membership.
    pub key: PopulationKey,

    /// Offer configuration.
    pub genes: Genes,

    /// Breeding depth.
    pub generation: u32,

    /// Lifecycle status.
    pub status: VariantStatus,

    /// Mirrors `status == Champion`.
    pub is_champion: bool,

    /// Cached counters.
    pub stats: VariantStats,

    /// Creation time.
    pub created_at: Timestamp,
}

impl Variant {
    /// Build a new `alive` variant with zeroed stats.
    #[must_use]
    pub fn new(
        uuid: VariantUuid,
        shop: ShopUuid,
        key: PopulationKey,
        genes: Genes,
        generation: u32,
        created_at: Timestamp,
    ) -> Self {
        Self {
            uuid,
            shop,
            key,
            genes,
            generation,
            status: VariantStatus::Alive,
            is_champion: false,
            stats: VariantStats::default(),
            created_at,
        }
    }

    /// Whether this variant may be served to visitors.
    #[must_use]
    pub const fn is_servable(&self) -> bool {
        self.status.is_servable()
    }

    /// Whether this variant may contribute genes to offspring.
    #[must_use]
    pub const fn is_breedable(&self) -> bool {
        self.status.is_servable()
    }

    /// Set the status and keep the champion flag in sync.
    pub fn set_status(&mut self, status: VariantStatus) {
        self.status = status;
        self.is_champion = matches!(status, VariantStatus::Champion);
    }
}
