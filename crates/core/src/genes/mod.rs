//! Genes
//!
//! The individually inheritable fields of an offer variant.

use std::{fmt, ops::RangeInclusive, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::variants::{Baseline, UnknownValue};

pub mod operators;
pub mod pool;

pub use operators::{crossover, mutate};
pub use pool::{GenePool, GenePoolError};

/// Number of genes in a genome.
pub const GENE_COUNT: usize = 7;

/// Allowed percentage-off amounts, in percent points.
pub const PERCENTAGE_AMOUNTS: RangeInclusive<u64> = 1..=50;

/// Allowed fixed and threshold amounts, in minor units.
pub const MINOR_UNIT_AMOUNTS: RangeInclusive<u64> = 100..=50_000;

/// Shape of the discount an offer carries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferType {
    /// Percent off the cart.
    #[default]
    Percentage,

    /// Fixed amount off the cart.
    Fixed,

    /// Amount off once the cart reaches a threshold.
    Threshold,
}

impl OfferType {
    const ALL: [Self; 3] = [Self::Percentage, Self::Fixed, Self::Threshold];

    /// Storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Percentage => "percentage",
            Self::Fixed => "fixed",
            Self::Threshold => "threshold",
        }
    }

    /// Clamp an amount into the valid range for this offer type.
    #[must_use]
    pub fn clamp_amount(self, amount: u64) -> u64 {
        let range = match self {
            Self::Percentage => PERCENTAGE_AMOUNTS,
            Self::Fixed | Self::Threshold => MINOR_UNIT_AMOUNTS,
        };

        amount.clamp(*range.start(), *range.end())
    }
}

impl fmt::Display for OfferType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OfferType {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|offer_type| offer_type.as_str() == s)
            .ok_or_else(|| UnknownValue::new("offer type", s))
    }
}

/// Where the popup's call to action sends the visitor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Redirect {
    /// Back to the cart page.
    #[default]
    Cart,

    /// Straight to checkout.
    Checkout,
}

impl Redirect {
    /// Storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cart => "cart",
            Self::Checkout => "checkout",
        }
    }

    /// The other redirect target.
    #[must_use]
    pub const fn flipped(self) -> Self {
        match self {
            Self::Cart => Self::Checkout,
            Self::Checkout => Self::Cart,
        }
    }
}

impl FromStr for Redirect {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cart" => Ok(Self::Cart),
            "checkout" => Ok(Self::Checkout),
            _ => Err(UnknownValue::new("redirect", s)),
        }
    }
}

/// An offer genome.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Genes {
    /// Popup headline.
    pub headline: String,

    /// Supporting line under the headline.
    pub subhead: String,

    /// Call-to-action button text.
    pub cta: String,

    /// Discount shape.
    pub offer_type: OfferType,

    /// Percent points for percentage offers, minor units otherwise; zero for copy-only.
    pub offer_amount: u64,

    /// Call-to-action target.
    pub redirect: Redirect,

    /// Whether the popup shows urgency cues.
    pub urgency: bool,
}

impl Genes {
    /// Bring the offer genes in line with what the baseline allows.
    #[must_use]
    pub fn normalized(mut self, baseline: Baseline) -> Self {
        self.offer_amount = if baseline.offers_discount() {
            self.offer_type.clamp_amount(self.offer_amount)
        } else {
            0
        };

        self
    }
}
