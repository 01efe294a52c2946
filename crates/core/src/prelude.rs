//! Recoup prelude.
//!
//! Convenience exports for common library consumers.

pub use crate::{
    budget::{BudgetError, BudgetLedger, BudgetPeriod, BudgetSettings},
    config::{Aggression, ConfigError, OptimizationGoal, ShopConfig},
    decisions::{
        Decision, DecisionEngine, DecisionInputs, DecisionSource, Offer, OfferKind, ServedVariant,
        ServingPolicy,
    },
    evolution::{
        CYCLE_IMPRESSION_THRESHOLD, CycleInputs, EvolutionPlan, SurvivorPolicy, cycle_due,
        default_survivors, plan_cycle,
    },
    fitness::{FitnessMetrics, evaluate, evaluate_variant},
    genes::{GenePool, GenePoolError, Genes, OfferType, Redirect},
    ids::{ImpressionUuid, PromotionUuid, ShopUuid, TypedUuid, VariantUuid},
    impressions::{Impression, ImpressionFilter, OutcomeEvent, PromotionSlice},
    promotions::{
        AiStrategy, Classification, DiscountType, MerchantOverride, Promotion, PromotionError,
        PromotionPolicy, PromotionStatus, classify,
    },
    signals::VisitorSignals,
    variants::{
        Baseline, LifecycleError, PopulationKey, Segment, Variant, VariantStats, VariantStatus,
    },
};
