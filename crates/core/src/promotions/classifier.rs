//! Promotion classifier

use jiff::{SignedDuration, Timestamp};

use crate::promotions::{Classification, Promotion, PromotionStatus};

/// Minimum time between detection and the first classification.
pub const CLASSIFICATION_COOLDOWN: SignedDuration = SignedDuration::from_hours(4);

/// Uses per hour above which a promotion is site-wide.
pub const SITE_WIDE_RATE: i64 = 10;

/// Uses per hour above which a promotion is targeted.
pub const TARGETED_RATE: i64 = 2;

/// Classify `promotion` by its usage rate since detection.
///
/// Returns `None` while the cooldown has not elapsed or once the promotion has ended.
/// Boundaries are exclusive: exactly 10 uses per hour is targeted, exactly 2 is
/// customer service. Counters that contradict each other classify as customer
/// service.
#[must_use]
pub fn classify(promotion: &Promotion, now: Timestamp) -> Option<Classification> {
    if promotion.status == PromotionStatus::Ended {
        return None;
    }

    let elapsed = now.duration_since(promotion.detected_at);

    if elapsed < CLASSIFICATION_COOLDOWN {
        return None;
    }

    let corrupt = promotion.usage_last_24h > promotion.usage_total
        || promotion
            .last_used_at
            .is_some_and(|last| last < promotion.detected_at);

    if corrupt {
        return Some(Classification::CustomerService);
    }

    // Compare uses × 3600 against rate × seconds to keep the boundaries exact.
    let seconds = i128::from(elapsed.as_secs());
    let uses = i128::from(promotion.usage_total) * 3_600;

    let classification = if uses > i128::from(SITE_WIDE_RATE) * seconds {
        Classification::SiteWide
    } else if uses > i128::from(TARGETED_RATE) * seconds {
        Classification::Targeted
    } else {
        Classification::CustomerService
    };

    Some(classification)
}
