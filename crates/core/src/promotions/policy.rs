//! Promotion policy
//!
//! The effect an open promotion has on serving.

use serde::{Deserialize, Serialize};

use crate::{
    config::{Aggression, MAX_AGGRESSION},
    promotions::{AiStrategy, MerchantOverride},
};

/// Percentage points added to the optimiser's offer under [`PromotionPolicy::Increase`].
pub const INCREASE_POINTS: u64 = 5;

/// How serving must adapt to open promotions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PromotionPolicy {
    /// Serve normally.
    #[default]
    Continue,

    /// Raise the offer by [`INCREASE_POINTS`].
    Increase,

    /// Discount at a merchant-chosen aggression.
    Custom {
        /// Aggression replacing the optimiser's amount.
        aggression: Aggression,
    },

    /// Copy only, no discount.
    ForceZero,

    /// No offer at all.
    Pause,
}

impl From<AiStrategy> for PromotionPolicy {
    fn from(strategy: AiStrategy) -> Self {
        match strategy {
            AiStrategy::Pause => Self::Pause,
            AiStrategy::Increase => Self::Increase,
            AiStrategy::Continue | AiStrategy::Ignore => Self::Continue,
        }
    }
}

impl From<MerchantOverride> for PromotionPolicy {
    fn from(merchant: MerchantOverride) -> Self {
        match merchant {
            MerchantOverride::Pause => Self::Pause,
            MerchantOverride::ForceZero => Self::ForceZero,
            MerchantOverride::Custom { aggression } => Self::Custom { aggression },
            MerchantOverride::Ignore => Self::Continue,
        }
    }
}

impl PromotionPolicy {
    fn restrictiveness(self) -> (u8, u8) {
        match self {
            Self::Continue => (0, 0),
            Self::Increase => (1, 0),
            Self::Custom { aggression } => (2, MAX_AGGRESSION.saturating_sub(aggression.level())),
            Self::ForceZero => (3, 0),
            Self::Pause => (4, 0),
        }
    }

    /// Combine the policies of several open promotions, keeping the most restrictive.
    ///
    /// Pause beats force-zero, which beats custom (lower aggression first), which beats
    /// increase, which beats continue.
    pub fn most_restrictive<I>(policies: I) -> Self
    where
        I: IntoIterator<Item = Self>,
    {
        policies
            .into_iter()
            .max_by_key(|policy| policy.restrictiveness())
            .unwrap_or_default()
    }
}
