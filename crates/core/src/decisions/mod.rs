//! Decisions
//!
//! What the storefront is told to show a visitor at exit intent.

use std::fmt;

use rust_decimal::{Decimal, RoundingStrategy, prelude::ToPrimitive};
use serde::{Deserialize, Serialize};

use crate::{
    genes::Redirect,
    ids::{ImpressionUuid, VariantUuid},
    variants::{Segment, Variant},
};

pub mod engine;

pub use engine::{DecisionEngine, DecisionInputs, ServingPolicy};

/// Prefix of generated discount codes.
pub const DISCOUNT_CODE_PREFIX: &str = "RECOUP-";

/// Threshold offers ask for this much more than the current cart, in percent.
pub const THRESHOLD_UPLIFT_PERCENT: u64 = 125;

/// Threshold offers round up to a multiple of this many minor units.
pub const THRESHOLD_STEP: u64 = 1_000;

/// The offer shown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Offer {
    /// Show nothing.
    #[default]
    None,

    /// Copy only.
    NoDiscount,

    /// Percent off the cart.
    Percentage {
        /// Percent points.
        amount: u64,
    },

    /// Fixed amount off the cart.
    Fixed {
        /// Minor units.
        amount: u64,
    },

    /// Amount off once the cart reaches `threshold`.
    Threshold {
        /// Minor units.
        amount: u64,

        /// Cart value to reach, in minor units.
        threshold: u64,
    },
}

/// Offer shape without amounts, as recorded in the impression log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferKind {
    /// Nothing shown.
    None,

    /// Copy only.
    NoDiscount,

    /// Percent off.
    Percentage,

    /// Fixed amount off.
    Fixed,

    /// Amount off above a threshold.
    Threshold,
}

impl OfferKind {
    /// Storage and metrics label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::NoDiscount => "no_discount",
            Self::Percentage => "percentage",
            Self::Fixed => "fixed",
            Self::Threshold => "threshold",
        }
    }
}

impl fmt::Display for OfferKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OfferKind {
    type Err = crate::variants::UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            Self::None,
            Self::NoDiscount,
            Self::Percentage,
            Self::Fixed,
            Self::Threshold,
        ]
        .into_iter()
        .find(|kind| kind.as_str() == s)
        .ok_or_else(|| crate::variants::UnknownValue::new("offer kind", s))
    }
}

impl Offer {
    /// The offer's shape.
    #[must_use]
    pub const fn kind(&self) -> OfferKind {
        match self {
            Self::None => OfferKind::None,
            Self::NoDiscount => OfferKind::NoDiscount,
            Self::Percentage { .. } => OfferKind::Percentage,
            Self::Fixed { .. } => OfferKind::Fixed,
            Self::Threshold { .. } => OfferKind::Threshold,
        }
    }

    /// Whether the offer carries a discount.
    #[must_use]
    pub const fn is_discount(&self) -> bool {
        matches!(
            self,
            Self::Percentage { .. } | Self::Fixed { .. } | Self::Threshold { .. }
        )
    }

    /// Worst-case cost of honouring the offer on a cart of `cart_value`, in minor units.
    ///
    /// Percentage costs round up so the budget never under-reserves.
    #[must_use]
    pub fn estimated_cost(&self, cart_value: u64) -> u64 {
        match *self {
            Self::None | Self::NoDiscount => 0,
            Self::Percentage { amount } => {
                percent_of(cart_value, amount, RoundingStrategy::AwayFromZero)
            }
            Self::Fixed { amount } | Self::Threshold { amount, .. } => amount,
        }
    }
}

/// `percent`% of `value`, rounded with `strategy`.
pub(crate) fn percent_of(value: u64, percent: u64, strategy: RoundingStrategy) -> u64 {
    (Decimal::from(value) * Decimal::from(percent) / Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, strategy)
        .to_u64()
        .unwrap_or(u64::MAX)
}

/// Cart value a threshold offer asks the visitor to reach: 125% of the cart, rounded
/// up to the next [`THRESHOLD_STEP`].
#[must_use]
pub fn threshold_for(cart_value: u64) -> u64 {
    let uplifted = percent_of(cart_value, THRESHOLD_UPLIFT_PERCENT, RoundingStrategy::AwayFromZero);

    uplifted
        .div_ceil(THRESHOLD_STEP)
        .max(1)
        .saturating_mul(THRESHOLD_STEP)
}

/// Discount code handed to the visitor for an impression.
///
/// Uses the trailing, random, hex digits of the impression id.
#[must_use]
pub fn discount_code(impression: ImpressionUuid) -> String {
    let hex = impression.into_uuid().simple().to_string().to_uppercase();
    let suffix: String = hex.chars().skip(hex.len().saturating_sub(8)).collect();

    format!("{DISCOUNT_CODE_PREFIX}{suffix}")
}

/// How the serving variant was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    /// Champion of the exact population.
    Exploit,

    /// Champion of the shop-wide population for the baseline.
    FallbackChampion,

    /// Fitness-weighted exploration.
    Explore,

    /// No population to serve from; built-in copy.
    Default,

    /// Serving suppressed.
    Skipped,
}

impl DecisionSource {
    /// Metrics label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Exploit => "exploit",
            Self::FallbackChampion => "fallback_champion",
            Self::Explore => "explore",
            Self::Default => "default",
            Self::Skipped => "skipped",
        }
    }
}

/// The copy of the variant being served.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServedVariant {
    /// Variant identifier.
    pub uuid: VariantUuid,

    /// Segment of the variant's population, `None` when shop-wide.
    pub segment: Option<Segment>,

    /// Popup headline.
    pub headline: String,

    /// Popup subhead.
    pub subhead: String,

    /// Call-to-action text.
    pub cta: String,

    /// Call-to-action target.
    pub redirect: Redirect,

    /// Whether to show urgency cues.
    pub urgency: bool,
}

impl From<&Variant> for ServedVariant {
    fn from(variant: &Variant) -> Self {
        Self {
            uuid: variant.uuid,
            segment: variant.key.segment.clone(),
            headline: variant.genes.headline.clone(),
            subhead: variant.genes.subhead.clone(),
            cta: variant.genes.cta.clone(),
            redirect: variant.genes.redirect,
            urgency: variant.genes.urgency,
        }
    }
}

/// A serving decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    /// Identifier for outcome reporting.
    pub impression: ImpressionUuid,

    /// What to show.
    pub offer: Offer,

    /// Discount code, present only for discount offers.
    pub code: Option<String>,

    /// Variant copy, absent for skipped and default decisions.
    pub variant: Option<ServedVariant>,

    /// How the decision was reached.
    pub source: DecisionSource,
}

impl Decision {
    /// Show nothing.
    #[must_use]
    pub const fn skipped(impression: ImpressionUuid) -> Self {
        Self {
            impression,
            offer: Offer::None,
            code: None,
            variant: None,
            source: DecisionSource::Skipped,
        }
    }

    /// Built-in copy without a discount.
    #[must_use]
    pub const fn default_copy(impression: ImpressionUuid) -> Self {
        Self {
            impression,
            offer: Offer::NoDiscount,
            code: None,
            variant: None,
            source: DecisionSource::Default,
        }
    }

    /// Serve `variant` with `offer`, issuing a code when the offer discounts.
    #[must_use]
    pub fn serve(
        impression: ImpressionUuid,
        variant: &Variant,
        offer: Offer,
        source: DecisionSource,
    ) -> Self {
        Self {
            impression,
            offer,
            code: offer.is_discount().then(|| discount_code(impression)),
            variant: Some(ServedVariant::from(variant)),
            source,
        }
    }

    /// Worst-case discount cost for a cart of `cart_value`.
    #[must_use]
    pub fn estimated_cost(&self, cart_value: u64) -> u64 {
        self.offer.estimated_cost(cart_value)
    }

    /// Drop the discount but keep the copy. Returns whether anything changed.
    pub fn downgrade_to_no_discount(&mut self) -> bool {
        if !self.offer.is_discount() {
            return false;
        }

        self.offer = Offer::NoDiscount;
        self.code = None;

        true
    }
}
