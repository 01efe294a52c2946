//! Promotions
//!
//! Merchant discount codes detected from store events. Each promotion is watched
//! for a cooldown period, classified by how fast it is being used, and then drives
//! how aggressively the optimiser may discount while it runs.

use std::{fmt, str::FromStr};

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    config::Aggression,
    ids::{PromotionUuid, ShopUuid},
    variants::UnknownValue,
};

pub mod classifier;
pub mod policy;

pub use classifier::{CLASSIFICATION_COOLDOWN, classify};
pub use policy::{INCREASE_POINTS, PromotionPolicy};

macro_rules! storage_enum {
    ($ty:ident, $kind:literal { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl $ty {
            /// Storage representation.
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $name),+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = UnknownValue;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($name => Ok(Self::$variant),)+
                    _ => Err(UnknownValue::new($kind, s)),
                }
            }
        }
    };
}

/// Lifecycle status of a promotion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromotionStatus {
    /// Detected, waiting out the cooldown.
    #[default]
    Monitoring,

    /// Classified and influencing serving.
    Active,

    /// Terminal.
    Ended,
}

storage_enum!(PromotionStatus, "promotion status" {
    Monitoring => "monitoring",
    Active => "active",
    Ended => "ended",
});

/// Discount shape of the merchant's code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    /// Percent off; `amount` is in percent points.
    Percentage,

    /// Fixed amount off; `amount` is in minor units.
    Fixed,

    /// Free shipping; `amount` is unused.
    FreeShipping,
}

storage_enum!(DiscountType, "discount type" {
    Percentage => "percentage",
    Fixed => "fixed",
    FreeShipping => "free_shipping",
});

/// What kind of promotion the usage pattern suggests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// Broadly advertised sale.
    SiteWide,

    /// Campaign aimed at a subset of customers.
    Targeted,

    /// One-off codes handed out by support.
    CustomerService,
}

storage_enum!(Classification, "classification" {
    SiteWide => "site_wide",
    Targeted => "targeted",
    CustomerService => "customer_service",
});

/// The optimiser's own response to a classified promotion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AiStrategy {
    /// Stop showing offers.
    Pause,

    /// Raise the offer by [`INCREASE_POINTS`].
    Increase,

    /// Carry on unchanged.
    Continue,

    /// Treat the promotion as if it did not exist.
    Ignore,
}

storage_enum!(AiStrategy, "strategy" {
    Pause => "pause",
    Increase => "increase",
    Continue => "continue",
    Ignore => "ignore",
});

/// Percentage discounts at or above this many points pause a site-wide sale.
pub const DEEP_DISCOUNT_PERCENT: u64 = 25;

impl AiStrategy {
    /// Derive the strategy for a promotion of the given classification.
    #[must_use]
    pub const fn derive(
        classification: Classification,
        discount_type: DiscountType,
        amount: u64,
    ) -> Self {
        match classification {
            Classification::SiteWide => {
                if matches!(discount_type, DiscountType::Percentage)
                    && amount >= DEEP_DISCOUNT_PERCENT
                {
                    Self::Pause
                } else {
                    Self::Increase
                }
            }
            Classification::Targeted => Self::Continue,
            Classification::CustomerService => Self::Ignore,
        }
    }
}

/// Merchant instruction that overrides the optimiser's strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MerchantOverride {
    /// Show no offers while the promotion runs.
    Pause,

    /// Show copy only, never a discount.
    ForceZero,

    /// Discount at the merchant's chosen aggression.
    Custom {
        /// Aggression to use in place of the optimiser's amount.
        aggression: Aggression,
    },

    /// Serve as if there were no promotion.
    Ignore,
}

impl MerchantOverride {
    /// Storage representation of the override kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pause => "pause",
            Self::ForceZero => "force_zero",
            Self::Custom { .. } => "custom",
            Self::Ignore => "ignore",
        }
    }

    /// Rebuild an override from its stored kind and optional aggression.
    ///
    /// # Errors
    ///
    /// Returns [`UnknownValue`] for unknown kinds, or `custom` without an aggression.
    pub fn from_parts(kind: &str, aggression: Option<u8>) -> Result<Self, UnknownValue> {
        match (kind, aggression) {
            ("pause", _) => Ok(Self::Pause),
            ("force_zero", _) => Ok(Self::ForceZero),
            ("custom", Some(level)) => Ok(Self::Custom {
                aggression: Aggression::new(level),
            }),
            ("ignore", _) => Ok(Self::Ignore),
            _ => Err(UnknownValue::new("merchant override", kind)),
        }
    }

    /// The aggression carried by a custom override.
    #[must_use]
    pub const fn aggression(self) -> Option<Aggression> {
        match self {
            Self::Custom { aggression } => Some(aggression),
            _ => None,
        }
    }
}

/// Promotion errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PromotionError {
    /// The promotion has already ended.
    #[error("promotion has ended")]
    Ended,
}

/// A detected merchant promotion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Promotion {
    /// Identifier.
    pub uuid: PromotionUuid,

    /// Owning shop.
    pub shop: ShopUuid,

    /// Discount code as entered at checkout.
    pub code: String,

    /// Discount amount; unit depends on `discount_type`.
    pub amount: u64,

    /// Discount shape.
    pub discount_type: DiscountType,

    /// When the code was created.
    pub detected_at: Timestamp,

    /// Scheduled end, if the merchant set one.
    pub ends_at: Option<Timestamp>,

    /// Lifecycle status.
    pub status: PromotionStatus,

    /// Latest classification.
    pub classification: Option<Classification>,

    /// Strategy derived from the latest classification.
    pub strategy: Option<AiStrategy>,

    /// Merchant override; survives re-classification.
    pub merchant_override: Option<MerchantOverride>,

    /// Orders that used the code.
    pub usage_total: u64,

    /// Orders that used the code within the last 24 hours.
    pub usage_last_24h: u64,

    /// Most recent use.
    pub last_used_at: Option<Timestamp>,

    /// When the latest classification ran.
    pub classified_at: Option<Timestamp>,

    /// When the promotion ended.
    pub ended_at: Option<Timestamp>,
}

impl Promotion {
    /// Start monitoring a newly created discount code.
    #[must_use]
    pub fn detect(
        uuid: PromotionUuid,
        shop: ShopUuid,
        code: impl Into<String>,
        discount_type: DiscountType,
        amount: u64,
        detected_at: Timestamp,
    ) -> Self {
        Self {
            uuid,
            shop,
            code: code.into(),
            amount,
            discount_type,
            detected_at,
            ends_at: None,
            status: PromotionStatus::Monitoring,
            classification: None,
            strategy: None,
            merchant_override: None,
            usage_total: 0,
            usage_last_24h: 0,
            last_used_at: None,
            classified_at: None,
            ended_at: None,
        }
    }

    /// Whether the promotion influences serving at `now`.
    #[must_use]
    pub fn is_open_at(&self, now: Timestamp) -> bool {
        self.status != PromotionStatus::Ended && self.ends_at.is_none_or(|ends_at| now < ends_at)
    }

    /// Count one use of the code at `at`.
    pub fn record_usage(&mut self, at: Timestamp) {
        self.usage_total = self.usage_total.saturating_add(1);
        self.usage_last_24h = self.usage_last_24h.saturating_add(1);
        self.last_used_at = Some(self.last_used_at.map_or(at, |last| last.max(at)));
    }

    /// Store a classification and its derived strategy, activating the promotion.
    ///
    /// The merchant override is left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`PromotionError::Ended`] if the promotion has ended.
    pub fn apply_classification(
        &mut self,
        classification: Classification,
        now: Timestamp,
    ) -> Result<(), PromotionError> {
        if self.status == PromotionStatus::Ended {
            return Err(PromotionError::Ended);
        }

        self.classification = Some(classification);
        self.strategy = Some(AiStrategy::derive(
            classification,
            self.discount_type,
            self.amount,
        ));
        self.classified_at = Some(now);
        self.status = PromotionStatus::Active;

        Ok(())
    }

    /// End the promotion.
    ///
    /// # Errors
    ///
    /// Returns [`PromotionError::Ended`] if it has already ended.
    pub fn end(&mut self, now: Timestamp) -> Result<(), PromotionError> {
        if self.status == PromotionStatus::Ended {
            return Err(PromotionError::Ended);
        }

        self.status = PromotionStatus::Ended;
        self.ended_at = Some(now);

        Ok(())
    }

    /// The policy this promotion imposes on serving; the merchant override wins.
    #[must_use]
    pub fn effective_policy(&self) -> PromotionPolicy {
        match (self.merchant_override, self.strategy) {
            (Some(merchant), _) => PromotionPolicy::from(merchant),
            (None, Some(strategy)) => PromotionPolicy::from(strategy),
            (None, None) => PromotionPolicy::Continue,
        }
    }
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;

    fn promotion(discount_type: DiscountType, amount: u64) -> Promotion {
        Promotion::detect(
            PromotionUuid::new(),
            ShopUuid::new(),
            "SUMMER25",
            discount_type,
            amount,
            Timestamp::UNIX_EPOCH,
        )
    }

    #[test]
    fn strategy_follows_classification() {
        assert_eq!(
            AiStrategy::derive(Classification::SiteWide, DiscountType::Percentage, 25),
            AiStrategy::Pause
        );
        assert_eq!(
            AiStrategy::derive(Classification::SiteWide, DiscountType::Percentage, 24),
            AiStrategy::Increase
        );
        assert_eq!(
            AiStrategy::derive(Classification::SiteWide, DiscountType::Fixed, 5_000),
            AiStrategy::Increase
        );
        assert_eq!(
            AiStrategy::derive(Classification::Targeted, DiscountType::Percentage, 40),
            AiStrategy::Continue
        );
        assert_eq!(
            AiStrategy::derive(Classification::CustomerService, DiscountType::Percentage, 40),
            AiStrategy::Ignore
        );
    }

    #[test]
    fn reclassification_keeps_the_override() -> TestResult {
        let mut promotion = promotion(DiscountType::Percentage, 30);
        promotion.merchant_override = Some(MerchantOverride::Pause);

        promotion.apply_classification(Classification::Targeted, Timestamp::UNIX_EPOCH)?;

        assert_eq!(promotion.status, PromotionStatus::Active);
        assert_eq!(promotion.strategy, Some(AiStrategy::Continue));
        assert_eq!(promotion.merchant_override, Some(MerchantOverride::Pause));
        assert_eq!(promotion.effective_policy(), PromotionPolicy::Pause);

        Ok(())
    }

    #[test]
    fn ended_is_terminal() -> TestResult {
        let mut promotion = promotion(DiscountType::Fixed, 1_000);

        promotion.end(Timestamp::UNIX_EPOCH)?;

        assert_eq!(promotion.end(Timestamp::UNIX_EPOCH), Err(PromotionError::Ended));
        assert_eq!(
            promotion.apply_classification(Classification::SiteWide, Timestamp::UNIX_EPOCH),
            Err(PromotionError::Ended)
        );
        assert!(!promotion.is_open_at(Timestamp::UNIX_EPOCH));

        Ok(())
    }

    #[test]
    fn scheduled_end_closes_the_promotion() -> TestResult {
        let mut promotion = promotion(DiscountType::Percentage, 10);
        promotion.ends_at = Some("2026-10-20T00:00:00Z".parse()?);

        assert!(promotion.is_open_at("2026-10-19T23:59:59Z".parse()?));
        assert!(!promotion.is_open_at("2026-10-20T00:00:00Z".parse()?));

        Ok(())
    }

    #[test]
    fn overrides_round_trip_through_storage_parts() -> TestResult {
        let custom = MerchantOverride::Custom {
            aggression: Aggression::new(3),
        };

        assert_eq!(
            MerchantOverride::from_parts(custom.as_str(), custom.aggression().map(Aggression::level))?,
            custom
        );
        assert!(MerchantOverride::from_parts("custom", None).is_err());

        Ok(())
    }
}
