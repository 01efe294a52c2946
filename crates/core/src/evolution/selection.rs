//! Selection
//!
//! Ranking and survivor policy for an evolution cycle.

use std::{cmp::Ordering, collections::BTreeMap};

use crate::{
    config::OptimizationGoal,
    fitness::FitnessMetrics,
    ids::VariantUuid,
    variants::{Variant, VariantStatus},
};

/// Maps `(population_size, selection_pressure, ranked)` to how many ranked variants survive.
///
/// Swappable so the calibration can change without touching the planner.
pub type SurvivorPolicy = fn(u16, u8, usize) -> usize;

/// Default survivor policy.
///
/// Each pressure point culls 5% of the target population, rounded down, so pressure 5
/// on a population of 10 culls 2. At least two ranked variants always survive so
/// crossover has parents to work with.
#[must_use]
pub fn default_survivors(population_size: u16, selection_pressure: u8, ranked: usize) -> usize {
    let population_size = usize::from(population_size);
    let culled = population_size * usize::from(selection_pressure) / 20;
    let survivors = population_size.saturating_sub(culled).min(ranked);

    if ranked >= 2 {
        survivors.max(2)
    } else {
        survivors
    }
}

/// A variant paired with its ranking score.
#[derive(Debug, Clone, Copy)]
pub struct Ranked<'a> {
    /// The ranked variant.
    pub variant: &'a Variant,

    /// Score under the population's goal.
    pub score: f64,
}

/// Rank the `alive` variants of `population`, fittest first.
///
/// Protected, champion and killed variants are not ranked. Equal scores fall back
/// to uuid order so the ranking is total and reproducible.
#[must_use]
pub fn rank<'a>(
    population: &'a [Variant],
    fitness: &BTreeMap<VariantUuid, FitnessMetrics>,
    goal: OptimizationGoal,
) -> Vec<Ranked<'a>> {
    let mut ranked: Vec<Ranked<'a>> = population
        .iter()
        .filter(|variant| variant.status == VariantStatus::Alive)
        .map(|variant| Ranked {
            variant,
            score: fitness
                .get(&variant.uuid)
                .map(|metrics| metrics.score(goal))
                .unwrap_or_default(),
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.variant.uuid.cmp(&b.variant.uuid))
    });

    ranked
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pressure_five_on_ten_keeps_eight() {
        assert_eq!(default_survivors(10, 5, 10), 8);
    }

    #[test]
    fn higher_pressure_keeps_fewer() {
        let survivors: Vec<usize> = (1..=10)
            .map(|pressure| default_survivors(20, pressure, 20))
            .collect();

        assert!(
            survivors
                .windows(2)
                .all(|pair| matches!(pair, [a, b] if a >= b)),
            "{survivors:?}"
        );
        assert_eq!(survivors.last().copied(), Some(10));
    }

    #[test]
    fn never_below_two_when_two_are_ranked() {
        assert_eq!(default_survivors(2, 10, 2), 2);
        assert_eq!(default_survivors(10, 10, 3), 3);
        assert_eq!(default_survivors(10, 10, 1), 1);
    }

    #[test]
    fn survivors_are_capped_by_ranked_count() {
        assert_eq!(default_survivors(10, 1, 4), 4);
    }
}
