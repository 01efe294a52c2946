//! Decision Engine
//!
//! Picks the variant to serve and shapes its offer. The engine is pure: every input
//! is passed in, including the random source, so the serving path holds no state.

use rand::{Rng, distributions::WeightedIndex, prelude::Distribution};
use rust_decimal::RoundingStrategy;

use crate::{
    config::{Aggression, ShopConfig},
    decisions::{Decision, DecisionSource, Offer, percent_of, threshold_for},
    fitness::{FitnessMetrics, sampling_weights},
    genes::{Genes, OfferType, PERCENTAGE_AMOUNTS},
    ids::ImpressionUuid,
    promotions::{INCREASE_POINTS, PromotionPolicy},
    signals::VisitorSignals,
    variants::{Baseline, Segment, Variant, VariantStatus},
};

/// Default probability of serving the champion when one exists.
pub const DEFAULT_EXPLOIT_RATE: f64 = 0.9;

/// Explore/exploit split.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ServingPolicy {
    exploit_rate: f64,
}

impl Default for ServingPolicy {
    fn default() -> Self {
        Self {
            exploit_rate: DEFAULT_EXPLOIT_RATE,
        }
    }
}

impl ServingPolicy {
    /// Build a policy; the rate is clamped to `0.0..=1.0` and non-finite rates fall
    /// back to the default.
    #[must_use]
    pub fn new(exploit_rate: f64) -> Self {
        if exploit_rate.is_finite() {
            Self {
                exploit_rate: exploit_rate.clamp(0.0, 1.0),
            }
        } else {
            Self::default()
        }
    }

    /// Probability of serving an available champion.
    #[must_use]
    pub const fn exploit_rate(&self) -> f64 {
        self.exploit_rate
    }
}

/// Everything a single decision reads.
#[derive(Debug, Clone, Copy)]
pub struct DecisionInputs<'a> {
    /// Identifier the decision will be logged under.
    pub impression: ImpressionUuid,

    /// Shop settings.
    pub config: &'a ShopConfig,

    /// Visitor signals.
    pub signals: &'a VisitorSignals,

    /// The shop's variants; unservable and other-baseline variants are ignored.
    pub variants: &'a [Variant],

    /// Combined policy of the shop's open promotions.
    pub promotion: PromotionPolicy,
}

/// Serving decision maker.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecisionEngine {
    policy: ServingPolicy,
}

impl DecisionEngine {
    /// Create an engine with the given explore/exploit split.
    #[must_use]
    pub const fn new(policy: ServingPolicy) -> Self {
        Self { policy }
    }

    /// Decide what to show.
    ///
    /// A paused promotion suppresses serving entirely. Otherwise the exact
    /// population's champion is exploited, then the shop-wide champion, then a
    /// fitness-weighted explore draw; with nothing to serve the built-in copy is
    /// returned. Budget is not consulted here.
    pub fn decide<R: Rng + ?Sized>(&self, inputs: &DecisionInputs<'_>, rng: &mut R) -> Decision {
        if inputs.promotion == PromotionPolicy::Pause {
            return Decision::skipped(inputs.impression);
        }

        let Some((variant, source)) = self.select(inputs, rng) else {
            return Decision::default_copy(inputs.impression);
        };

        let offer = build_offer(
            &variant.genes,
            variant.key.baseline,
            inputs.config.aggression,
            inputs.signals.cart_value,
            inputs.promotion,
        );

        Decision::serve(inputs.impression, variant, offer, source)
    }

    /// Choose the variant to serve and how it was chosen.
    pub fn select<'v, R: Rng + ?Sized>(
        &self,
        inputs: &DecisionInputs<'v>,
        rng: &mut R,
    ) -> Option<(&'v Variant, DecisionSource)> {
        let baseline = inputs.config.baseline();
        let segment = inputs
            .config
            .segmentation_enabled
            .then(|| inputs.signals.segment());

        let servable: Vec<&'v Variant> = inputs
            .variants
            .iter()
            .filter(|variant| variant.is_servable() && variant.key.baseline == baseline)
            .collect();

        let exact = members(&servable, segment.as_ref());

        if let Some(champion) = champion_of(&exact) {
            if rng.gen_bool(self.policy.exploit_rate) {
                return Some((champion, DecisionSource::Exploit));
            }
        } else if segment.is_some() {
            let shop_wide = members(&servable, None);

            if let Some(champion) = champion_of(&shop_wide) {
                if rng.gen_bool(self.policy.exploit_rate) {
                    return Some((champion, DecisionSource::FallbackChampion));
                }
            }
        }

        let challengers: Vec<&'v Variant> = exact
            .iter()
            .copied()
            .filter(|variant| variant.status != VariantStatus::Champion)
            .collect();

        let candidates = match (challengers.is_empty(), exact.is_empty()) {
            (false, _) => challengers,
            (true, false) => exact,
            (true, true) => members(&servable, None),
        };

        explore(&candidates, baseline, rng).map(|variant| (variant, DecisionSource::Explore))
    }
}

fn members<'v>(servable: &[&'v Variant], segment: Option<&Segment>) -> Vec<&'v Variant> {
    servable
        .iter()
        .copied()
        .filter(|variant| variant.key.segment.as_ref() == segment)
        .collect()
}

fn champion_of<'v>(population: &[&'v Variant]) -> Option<&'v Variant> {
    population
        .iter()
        .copied()
        .find(|variant| variant.status == VariantStatus::Champion)
}

fn explore<'v, R: Rng + ?Sized>(
    candidates: &[&'v Variant],
    baseline: Baseline,
    rng: &mut R,
) -> Option<&'v Variant> {
    let scores: Vec<f64> = candidates
        .iter()
        .map(|variant| FitnessMetrics::from(variant.stats).score(baseline.goal()))
        .collect();

    let index = WeightedIndex::new(sampling_weights(&scores)).ok()?.sample(rng);

    candidates.get(index).copied()
}

/// Shape the offer for `genes` under the shop's aggression and the promotion policy.
///
/// Aggression caps the discount at `level × 5` percent of the cart (of the threshold
/// for threshold offers). A custom promotion policy replaces the variant's amount with
/// the full cap of the merchant's aggression.
#[must_use]
pub fn build_offer(
    genes: &Genes,
    baseline: Baseline,
    aggression: Aggression,
    cart_value: u64,
    policy: PromotionPolicy,
) -> Offer {
    if !baseline.offers_discount() || genes.offer_amount == 0 {
        return Offer::NoDiscount;
    }

    let (aggression, custom) = match policy {
        PromotionPolicy::Pause => return Offer::None,
        PromotionPolicy::ForceZero => return Offer::NoDiscount,
        PromotionPolicy::Custom { aggression } => (aggression, true),
        PromotionPolicy::Continue | PromotionPolicy::Increase => (aggression, false),
    };
    let increase = policy == PromotionPolicy::Increase;
    let cap_percent = aggression.cap_percent();

    let offer = match genes.offer_type {
        OfferType::Percentage => {
            let cap = cap_percent.min(*PERCENTAGE_AMOUNTS.end());
            let amount = if custom {
                cap
            } else if increase {
                genes.offer_amount.saturating_add(INCREASE_POINTS)
            } else {
                genes.offer_amount
            };

            Offer::Percentage {
                amount: amount.min(cap),
            }
        }
        OfferType::Fixed => Offer::Fixed {
            amount: minor_unit_amount(genes.offer_amount, cart_value, cap_percent, custom, increase),
        },
        OfferType::Threshold => {
            let threshold = threshold_for(cart_value);

            Offer::Threshold {
                amount: minor_unit_amount(
                    genes.offer_amount,
                    threshold,
                    cap_percent,
                    custom,
                    increase,
                ),
                threshold,
            }
        }
    };

    match offer {
        Offer::Percentage { amount: 0 }
        | Offer::Fixed { amount: 0 }
        | Offer::Threshold { amount: 0, .. } => Offer::NoDiscount,
        offer => offer,
    }
}

fn minor_unit_amount(
    gene_amount: u64,
    reference: u64,
    cap_percent: u64,
    custom: bool,
    increase: bool,
) -> u64 {
    let cap = percent_of(reference, cap_percent, RoundingStrategy::ToZero);

    let amount = if custom {
        cap
    } else if increase {
        gene_amount.saturating_add(percent_of(reference, INCREASE_POINTS, RoundingStrategy::ToZero))
    } else {
        gene_amount
    };

    amount.min(cap)
}

#[cfg(test)]
mod tests {
    use jiff::Timestamp;
    use rand::{SeedableRng, rngs::StdRng};

    use crate::{
        genes::Redirect,
        ids::{ShopUuid, VariantUuid},
        signals::{Device, TrafficSource},
        variants::PopulationKey,
    };

    use super::*;

    fn genes(offer_type: OfferType, offer_amount: u64) -> Genes {
        Genes {
            headline: "Before you go".to_string(),
            subhead: "Finish your order".to_string(),
            cta: "Take me back".to_string(),
            offer_type,
            offer_amount,
            redirect: Redirect::Checkout,
            urgency: true,
        }
    }

    fn variant(key: PopulationKey, status: VariantStatus) -> Variant {
        let mut variant = Variant::new(
            VariantUuid::new(),
            ShopUuid::new(),
            key,
            genes(OfferType::Percentage, 10),
            1,
            Timestamp::UNIX_EPOCH,
        );
        variant.set_status(status);
        variant
    }

    fn shop_wide(status: VariantStatus) -> Variant {
        variant(
            PopulationKey::shop_wide(Baseline::RevenueWithDiscount),
            status,
        )
    }

    fn inputs<'a>(
        config: &'a ShopConfig,
        signals: &'a VisitorSignals,
        variants: &'a [Variant],
        promotion: PromotionPolicy,
    ) -> DecisionInputs<'a> {
        DecisionInputs {
            impression: ImpressionUuid::new(),
            config,
            signals,
            variants,
            promotion,
        }
    }

    fn cart(cart_value: u64) -> VisitorSignals {
        VisitorSignals {
            cart_value,
            ..VisitorSignals::default()
        }
    }

    #[test]
    fn champion_is_exploited() {
        let variants = vec![
            shop_wide(VariantStatus::Alive),
            shop_wide(VariantStatus::Champion),
        ];
        let champion = variants.get(1).map(|v| v.uuid);
        let config = ShopConfig::default();
        let signals = cart(10_000);
        let engine = DecisionEngine::new(ServingPolicy::new(1.0));
        let mut rng = StdRng::seed_from_u64(1);

        let decision = engine.decide(
            &inputs(&config, &signals, &variants, PromotionPolicy::Continue),
            &mut rng,
        );

        assert_eq!(decision.source, DecisionSource::Exploit);
        assert_eq!(decision.variant.map(|v| v.uuid), champion);
        assert_eq!(decision.offer, Offer::Percentage { amount: 10 });
        assert!(decision.code.is_some_and(|code| code.starts_with("RECOUP-")));
    }

    #[test]
    fn exploration_skips_the_champion() {
        let variants = vec![
            shop_wide(VariantStatus::Champion),
            shop_wide(VariantStatus::Protected),
        ];
        let challenger = variants.get(1).map(|v| v.uuid);
        let config = ShopConfig::default();
        let signals = cart(10_000);
        let engine = DecisionEngine::new(ServingPolicy::new(0.0));
        let mut rng = StdRng::seed_from_u64(2);

        for _ in 0..20 {
            let decision = engine.decide(
                &inputs(&config, &signals, &variants, PromotionPolicy::Continue),
                &mut rng,
            );

            assert_eq!(decision.source, DecisionSource::Explore);
            assert_eq!(decision.variant.map(|v| v.uuid), challenger);
        }
    }

    #[test]
    fn killed_variants_are_never_served() {
        let variants = vec![
            shop_wide(VariantStatus::Killed),
            shop_wide(VariantStatus::Killed),
        ];
        let config = ShopConfig::default();
        let signals = cart(10_000);
        let engine = DecisionEngine::default();
        let mut rng = StdRng::seed_from_u64(3);

        let decision = engine.decide(
            &inputs(&config, &signals, &variants, PromotionPolicy::Continue),
            &mut rng,
        );

        assert_eq!(decision.source, DecisionSource::Default);
        assert_eq!(decision.offer, Offer::NoDiscount);
    }

    #[test]
    fn segment_without_champion_falls_back_to_shop_wide_champion() {
        let signals = VisitorSignals {
            device: Device::Mobile,
            traffic: TrafficSource::Paid,
            cart_value: 20_000,
            ..VisitorSignals::default()
        };
        let segmented = PopulationKey::new(Baseline::RevenueWithDiscount, Some(signals.segment()));
        let variants = vec![
            variant(segmented, VariantStatus::Alive),
            shop_wide(VariantStatus::Champion),
        ];
        let champion = variants.get(1).map(|v| v.uuid);
        let config = ShopConfig {
            segmentation_enabled: true,
            ..ShopConfig::default()
        };
        let engine = DecisionEngine::new(ServingPolicy::new(1.0));
        let mut rng = StdRng::seed_from_u64(4);

        let decision = engine.decide(
            &inputs(&config, &signals, &variants, PromotionPolicy::Continue),
            &mut rng,
        );

        assert_eq!(decision.source, DecisionSource::FallbackChampion);
        assert_eq!(decision.variant.map(|v| v.uuid), champion);
    }

    #[test]
    fn pause_returns_no_offer() {
        let variants = vec![shop_wide(VariantStatus::Champion)];
        let config = ShopConfig::default();
        let signals = cart(10_000);
        let mut rng = StdRng::seed_from_u64(5);

        let decision = DecisionEngine::default().decide(
            &inputs(&config, &signals, &variants, PromotionPolicy::Pause),
            &mut rng,
        );

        assert_eq!(decision.offer, Offer::None);
        assert_eq!(decision.source, DecisionSource::Skipped);
        assert!(decision.variant.is_none());
    }

    #[test]
    fn force_zero_keeps_copy_without_discount() {
        let variants = vec![shop_wide(VariantStatus::Champion)];
        let config = ShopConfig::default();
        let signals = cart(10_000);
        let mut rng = StdRng::seed_from_u64(6);

        let decision = DecisionEngine::new(ServingPolicy::new(1.0)).decide(
            &inputs(&config, &signals, &variants, PromotionPolicy::ForceZero),
            &mut rng,
        );

        assert_eq!(decision.offer, Offer::NoDiscount);
        assert!(decision.variant.is_some());
        assert!(decision.code.is_none());
    }

    #[test]
    fn aggression_caps_the_discount() {
        let offer = build_offer(
            &genes(OfferType::Percentage, 40),
            Baseline::RevenueWithDiscount,
            Aggression::new(4),
            10_000,
            PromotionPolicy::Continue,
        );

        assert_eq!(offer, Offer::Percentage { amount: 20 });

        let fixed = build_offer(
            &genes(OfferType::Fixed, 5_000),
            Baseline::RevenueWithDiscount,
            Aggression::new(2),
            10_000,
            PromotionPolicy::Continue,
        );

        assert_eq!(fixed, Offer::Fixed { amount: 1_000 });
    }

    #[test]
    fn zero_aggression_never_discounts() {
        let offer = build_offer(
            &genes(OfferType::Percentage, 10),
            Baseline::RevenueWithDiscount,
            Aggression::new(0),
            10_000,
            PromotionPolicy::Continue,
        );

        assert_eq!(offer, Offer::NoDiscount);
    }

    #[test]
    fn increase_adds_points_within_the_cap() {
        let offer = build_offer(
            &genes(OfferType::Percentage, 10),
            Baseline::RevenueWithDiscount,
            Aggression::new(5),
            10_000,
            PromotionPolicy::Increase,
        );

        assert_eq!(offer, Offer::Percentage { amount: 15 });
    }

    #[test]
    fn custom_aggression_replaces_the_amount() {
        let offer = build_offer(
            &genes(OfferType::Percentage, 10),
            Baseline::RevenueWithDiscount,
            Aggression::new(5),
            10_000,
            PromotionPolicy::Custom {
                aggression: Aggression::new(1),
            },
        );

        assert_eq!(offer, Offer::Percentage { amount: 5 });
    }

    #[test]
    fn threshold_offers_carry_their_threshold() {
        let offer = build_offer(
            &genes(OfferType::Threshold, 1_000),
            Baseline::RevenueWithDiscount,
            Aggression::new(5),
            8_000,
            PromotionPolicy::Continue,
        );

        assert_eq!(
            offer,
            Offer::Threshold {
                amount: 1_000,
                threshold: 10_000
            }
        );
    }

    #[test]
    fn copy_only_baseline_never_discounts() {
        let offer = build_offer(
            &genes(OfferType::Percentage, 10),
            Baseline::RevenueNoDiscount,
            Aggression::new(10),
            10_000,
            PromotionPolicy::Continue,
        );

        assert_eq!(offer, Offer::NoDiscount);
    }
}
