//! Fitness Evaluator
//!
//! Turns a slice of the impression log into per-variant metrics. Evaluation is a
//! pure fold: the same impressions always produce the same metrics, and results are
//! keyed in a `BTreeMap` so iteration order is stable too.

use std::collections::BTreeMap;

use rust_decimal::{Decimal, prelude::ToPrimitive};
use serde::{Deserialize, Serialize};

use crate::{
    config::OptimizationGoal,
    ids::VariantUuid,
    impressions::{Impression, ImpressionFilter},
    variants::VariantStats,
};

/// Share of the best score every candidate receives as a sampling weight floor.
pub const WEIGHT_FLOOR_SHARE: f64 = 0.05;

/// Absolute weight floor, used when every score is zero.
pub const MIN_WEIGHT: f64 = 1e-6;

/// Performance of one variant over an impression slice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FitnessMetrics {
    /// Impressions served.
    pub impressions: u64,

    /// Clicks recorded.
    pub clicks: u64,

    /// Conversions recorded.
    pub conversions: u64,

    /// Attributed revenue in minor units.
    pub revenue: u64,

    /// Revenue per impression, zero when never served.
    pub profit_per_impression: Decimal,
}

impl From<VariantStats> for FitnessMetrics {
    fn from(stats: VariantStats) -> Self {
        Self {
            impressions: stats.impressions,
            clicks: stats.clicks,
            conversions: stats.conversions,
            revenue: stats.revenue,
            profit_per_impression: stats.profit_per_impression(),
        }
    }
}

impl FitnessMetrics {
    /// The counters as a cache entry for the variant store.
    #[must_use]
    pub const fn as_stats(&self) -> VariantStats {
        VariantStats {
            impressions: self.impressions,
            clicks: self.clicks,
            conversions: self.conversions,
            revenue: self.revenue,
        }
    }

    /// Ranking score for `goal`; higher is fitter.
    #[must_use]
    pub fn score(&self, goal: OptimizationGoal) -> f64 {
        match goal {
            OptimizationGoal::Revenue => self.profit_per_impression.to_f64().unwrap_or_default(),
            OptimizationGoal::Conversions => self.as_stats().conversion_rate(),
        }
    }

    fn record(&mut self, impression: &Impression) {
        self.impressions += 1;
        self.clicks += u64::from(impression.clicked);
        self.conversions += u64::from(impression.converted);
        self.revenue = self.revenue.saturating_add(impression.revenue);
    }
}

/// Evaluate every variant present in the slice selected by `filter`.
///
/// Impressions without a variant (default and skipped decisions) are ignored.
pub fn evaluate<'a, I>(impressions: I, filter: &ImpressionFilter) -> BTreeMap<VariantUuid, FitnessMetrics>
where
    I: IntoIterator<Item = &'a Impression>,
{
    let mut metrics: BTreeMap<VariantUuid, FitnessMetrics> = BTreeMap::new();

    for impression in impressions {
        let Some(variant) = impression.variant else {
            continue;
        };

        if filter.matches(impression) {
            metrics.entry(variant).or_default().record(impression);
        }
    }

    for entry in metrics.values_mut() {
        entry.profit_per_impression = entry.as_stats().profit_per_impression();
    }

    metrics
}

/// Evaluate a single variant; zeroed metrics when it has no matching impressions.
pub fn evaluate_variant<'a, I>(
    variant: VariantUuid,
    impressions: I,
    filter: &ImpressionFilter,
) -> FitnessMetrics
where
    I: IntoIterator<Item = &'a Impression>,
{
    evaluate(
        impressions
            .into_iter()
            .filter(|impression| impression.variant == Some(variant)),
        filter,
    )
    .remove(&variant)
    .unwrap_or_default()
}

/// Turn scores into strictly positive sampling weights.
///
/// Every candidate keeps a floor proportional to the best score so unproven
/// variants still get drawn occasionally.
#[must_use]
pub fn sampling_weights(scores: &[f64]) -> Vec<f64> {
    let best = scores
        .iter()
        .copied()
        .filter(|score| score.is_finite())
        .fold(0.0_f64, f64::max);
    let floor = (best * WEIGHT_FLOOR_SHARE).max(MIN_WEIGHT);

    scores
        .iter()
        .map(|score| {
            if score.is_finite() && *score > 0.0 {
                score + floor
            } else {
                floor
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use jiff::Timestamp;

    use crate::{
        decisions::OfferKind,
        ids::{ImpressionUuid, ShopUuid},
        signals::VisitorSignals,
        variants::{Baseline, Segment},
    };

    use super::*;

    fn served(variant: VariantUuid, converted: bool, revenue: u64, during_promotion: bool) -> Impression {
        Impression {
            uuid: ImpressionUuid::new(),
            shop: ShopUuid::new(),
            variant: Some(variant),
            baseline: Baseline::RevenueWithDiscount,
            segment: Segment::new("desktop-direct-low"),
            signals: VisitorSignals::default(),
            served_at: Timestamp::UNIX_EPOCH,
            during_promotion,
            offer: OfferKind::Percentage,
            discount_cost: 0,
            clicked: converted,
            converted,
            revenue,
        }
    }

    #[test]
    fn profit_per_impression_is_revenue_over_impressions() {
        let variant = VariantUuid::new();
        let log = vec![
            served(variant, true, 3_000, false),
            served(variant, false, 0, false),
            served(variant, false, 0, false),
            served(variant, true, 1_500, false),
        ];

        let metrics = evaluate_variant(variant, &log, &ImpressionFilter::default());

        assert_eq!(metrics.impressions, 4);
        assert_eq!(metrics.conversions, 2);
        assert_eq!(metrics.revenue, 4_500);
        assert_eq!(metrics.profit_per_impression, Decimal::from(1_125));
    }

    #[test]
    fn unseen_variants_score_zero() {
        let metrics = evaluate_variant(VariantUuid::new(), &[], &ImpressionFilter::default());

        assert_eq!(metrics, FitnessMetrics::default());
        assert!(metrics.score(OptimizationGoal::Revenue).abs() < f64::EPSILON);
    }

    #[test]
    fn promotion_slices_are_disjoint() {
        let variant = VariantUuid::new();
        let log = vec![
            served(variant, true, 2_000, false),
            served(variant, true, 8_000, true),
        ];

        let outside = evaluate_variant(variant, &log, &ImpressionFilter::outside_promotions());
        let during = evaluate_variant(variant, &log, &ImpressionFilter::during_promotions());

        assert_eq!(outside.revenue, 2_000);
        assert_eq!(during.revenue, 8_000);
    }

    #[test]
    fn evaluation_is_reproducible() {
        let a = VariantUuid::new();
        let b = VariantUuid::new();
        let log = vec![
            served(a, true, 1_000, false),
            served(b, false, 0, false),
            served(a, false, 0, true),
            served(b, true, 700, false),
        ];

        let first = evaluate(&log, &ImpressionFilter::default());
        let second = evaluate(log.iter().rev(), &ImpressionFilter::default());

        assert_eq!(first, second);
    }

    #[test]
    fn conversions_goal_ranks_by_rate() {
        let metrics = FitnessMetrics {
            impressions: 4,
            clicks: 2,
            conversions: 1,
            revenue: 100,
            profit_per_impression: Decimal::from(25),
        };

        assert!((metrics.score(OptimizationGoal::Conversions) - 0.25).abs() < f64::EPSILON);
        assert!((metrics.score(OptimizationGoal::Revenue) - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn sampling_weights_are_positive() {
        let weights = sampling_weights(&[0.0, 10.0, f64::NAN]);

        assert!(weights.iter().all(|weight| *weight > 0.0));
        assert!((weights.get(1).copied().unwrap_or_default() - 10.5).abs() < 1e-9);
    }
}
