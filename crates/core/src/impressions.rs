//! Impressions
//!
//! The append-only serving log. Every decision produces one impression; clicks and
//! conversions are folded in later by outcome events.

use std::{fmt, str::FromStr};

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use crate::{
    decisions::OfferKind,
    ids::{ImpressionUuid, ShopUuid, VariantUuid},
    signals::VisitorSignals,
    variants::{Baseline, Segment, UnknownValue},
};

/// A single serving event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Impression {
    /// Identifier handed to the storefront for outcome reporting.
    pub uuid: ImpressionUuid,

    /// Shop served.
    pub shop: ShopUuid,

    /// Variant shown; `None` for default and skipped decisions.
    pub variant: Option<VariantUuid>,

    /// Baseline the decision was made under.
    pub baseline: Baseline,

    /// Visitor segment, recorded regardless of whether the shop segments populations.
    pub segment: Segment,

    /// Raw visitor signals.
    pub signals: VisitorSignals,

    /// Serving time.
    pub served_at: Timestamp,

    /// Whether a promotion was open when served.
    pub during_promotion: bool,

    /// Shape of the offer shown.
    pub offer: OfferKind,

    /// Discount cost reserved against the budget, in minor units.
    pub discount_cost: u64,

    /// Whether the visitor clicked the call to action.
    pub clicked: bool,

    /// Whether the visitor completed an order.
    pub converted: bool,

    /// Order revenue attributed to this impression, in minor units.
    pub revenue: u64,
}

/// Outcome event kinds reported by the storefront.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeEvent {
    /// Call to action clicked.
    Click,

    /// Order completed.
    Conversion,
}

impl OutcomeEvent {
    /// Storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Click => "click",
            Self::Conversion => "conversion",
        }
    }
}

impl fmt::Display for OutcomeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutcomeEvent {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "click" => Ok(Self::Click),
            "conversion" => Ok(Self::Conversion),
            _ => Err(UnknownValue::new("outcome event", s)),
        }
    }
}

impl Impression {
    /// Fold an outcome into the impression.
    ///
    /// Returns `false` when the event was already applied, leaving the impression
    /// unchanged. A conversion implies a click.
    pub fn apply_outcome(&mut self, event: OutcomeEvent, revenue: u64) -> bool {
        match event {
            OutcomeEvent::Click => {
                if self.clicked {
                    return false;
                }

                self.clicked = true;
            }
            OutcomeEvent::Conversion => {
                if self.converted {
                    return false;
                }

                self.clicked = true;
                self.converted = true;
                self.revenue = revenue;
            }
        }

        true
    }
}

/// Which promotion context to include.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromotionSlice {
    /// Every impression.
    #[default]
    Any,

    /// Only impressions served while no promotion was open.
    Outside,

    /// Only impressions served during a promotion.
    During,
}

impl FromStr for PromotionSlice {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "any" => Ok(Self::Any),
            "outside" => Ok(Self::Outside),
            "during" => Ok(Self::During),
            _ => Err(UnknownValue::new("promotion slice", s)),
        }
    }
}

/// Selects a subset of the impression log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImpressionFilter {
    /// Promotion context.
    pub promotion: PromotionSlice,

    /// Restrict to one audience segment.
    pub segment: Option<Segment>,
}

impl ImpressionFilter {
    /// Impressions served outside promotions, any segment.
    #[must_use]
    pub const fn outside_promotions() -> Self {
        Self {
            promotion: PromotionSlice::Outside,
            segment: None,
        }
    }

    /// Impressions served during promotions, any segment.
    #[must_use]
    pub const fn during_promotions() -> Self {
        Self {
            promotion: PromotionSlice::During,
            segment: None,
        }
    }

    /// Narrow the filter to one segment.
    #[must_use]
    pub fn in_segment(mut self, segment: Segment) -> Self {
        self.segment = Some(segment);
        self
    }

    /// Whether `impression` falls in this slice.
    #[must_use]
    pub fn matches(&self, impression: &Impression) -> bool {
        let promotion = match self.promotion {
            PromotionSlice::Any => true,
            PromotionSlice::Outside => !impression.during_promotion,
            PromotionSlice::During => impression.during_promotion,
        };

        promotion
            && self
                .segment
                .as_ref()
                .is_none_or(|segment| *segment == impression.segment)
    }
}
