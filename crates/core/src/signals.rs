//! Visitor Signals
//!
//! What the storefront widget tells us about a visitor at exit-intent time.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::variants::Segment;

/// Carts below this value (minor units) fall in the `low` bucket.
pub const MEDIUM_CART_FLOOR: u64 = 5_000;

/// Carts at or above this value (minor units) fall in the `high` bucket.
pub const HIGH_CART_FLOOR: u64 = 15_000;

/// Visitor device class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Device {
    /// Desktop browser.
    #[default]
    Desktop,

    /// Phone.
    Mobile,

    /// Tablet.
    Tablet,
}

/// How the visitor arrived.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrafficSource {
    /// Typed URL or bookmark.
    #[default]
    Direct,

    /// Unpaid search.
    Organic,

    /// Paid ads.
    Paid,

    /// Social networks.
    Social,

    /// Email campaigns.
    Email,

    /// Other referring sites.
    Referral,
}

/// First or repeat visit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisitFrequency {
    /// No prior visit on record.
    #[default]
    FirstVisit,

    /// Seen before.
    Returning,
}

/// Whether the visitor is signed in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    /// Anonymous.
    #[default]
    Guest,

    /// Signed-in customer.
    Customer,
}

/// Cart value band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CartValueBucket {
    /// Below [`MEDIUM_CART_FLOOR`].
    Low,

    /// Between the floors.
    Medium,

    /// At or above [`HIGH_CART_FLOOR`].
    High,
}

impl CartValueBucket {
    /// Bucket a cart value in minor units.
    #[must_use]
    pub const fn of(cart_value: u64) -> Self {
        if cart_value >= HIGH_CART_FLOOR {
            Self::High
        } else if cart_value >= MEDIUM_CART_FLOOR {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

macro_rules! display_snake {
    ($ty:ty { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(match self {
                    $(Self::$variant => $name),+
                })
            }
        }
    };
}

display_snake!(Device { Desktop => "desktop", Mobile => "mobile", Tablet => "tablet" });
display_snake!(TrafficSource {
    Direct => "direct",
    Organic => "organic",
    Paid => "paid",
    Social => "social",
    Email => "email",
    Referral => "referral",
});
display_snake!(CartValueBucket { Low => "low", Medium => "medium", High => "high" });

/// Signals attached to a serving request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitorSignals {
    /// Device class.
    pub device: Device,

    /// Traffic source.
    pub traffic: TrafficSource,

    /// Cart value in minor units.
    pub cart_value: u64,

    /// First or repeat visit.
    pub visit: VisitFrequency,

    /// Signed-in state.
    pub account: AccountStatus,

    /// Whether the storefront reports a promotion running right now.
    pub promotion_active: bool,
}

impl VisitorSignals {
    /// The audience segment these signals fall into.
    #[must_use]
    pub fn segment(&self) -> Segment {
        Segment::new(format!(
            "{}-{}-{}",
            self.device,
            self.traffic,
            CartValueBucket::of(self.cart_value)
        ))
    }
}
