//! Cycle planner
//!
//! Computes the full outcome of one evolution cycle without touching any store. The
//! caller applies the plan atomically.

use std::collections::BTreeMap;

use jiff::Timestamp;
use rand::{Rng, distributions::WeightedIndex, prelude::Distribution};
use tracing::{debug, warn};

use crate::{
    config::ShopConfig,
    evolution::selection::{SurvivorPolicy, rank},
    fitness::{FitnessMetrics, sampling_weights},
    genes::{GenePool, Genes, crossover, mutate},
    ids::{ShopUuid, VariantUuid},
    variants::{PopulationKey, Variant, VariantStatus},
};

/// Everything a cycle reads.
#[derive(Debug, Clone, Copy)]
pub struct CycleInputs<'a> {
    /// Owning shop.
    pub shop: ShopUuid,

    /// Population being evolved.
    pub key: &'a PopulationKey,

    /// Current members; killed and foreign variants are ignored.
    pub population: &'a [Variant],

    /// Fitness per variant, computed outside promotions.
    pub fitness: &'a BTreeMap<VariantUuid, FitnessMetrics>,

    /// Shop tunables.
    pub config: &'a ShopConfig,

    /// Template material for fresh variants and copy mutations.
    pub pool: &'a GenePool,

    /// Creation time for offspring.
    pub now: Timestamp,
}

/// The outcome of one cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct EvolutionPlan {
    /// Population the plan applies to.
    pub key: PopulationKey,

    /// Ranked variants culled this cycle, weakest last.
    pub kills: Vec<VariantUuid>,

    /// New variants to insert.
    pub offspring: Vec<Variant>,

    /// Offspring produced by crossover.
    pub crossover_births: usize,

    /// Offspring sampled from the gene pool.
    pub fresh_births: usize,

    /// Genes perturbed across all offspring.
    pub mutated_genes: usize,

    /// Refill slots left empty because the gene pool could not fill them.
    pub skipped_slots: usize,
}

impl EvolutionPlan {
    /// Whether applying the plan would change nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.kills.is_empty() && self.offspring.is_empty()
    }
}

/// Plan one cycle.
///
/// Ranks `alive` members by the fitness goal of the population's baseline, culls those
/// below the survivor cutoff, then refills to `population_size`. When at least two
/// parents exist each slot is bred by crossover with probability
/// `crossover_rate / 100`; fresh samples fill the others. Every child is then mutated.
/// The random source is only ever drawn from in a fixed order, so a seeded run is
/// reproducible.
pub fn plan_cycle<R: Rng + ?Sized>(
    inputs: &CycleInputs<'_>,
    survivors: SurvivorPolicy,
    rng: &mut R,
) -> EvolutionPlan {
    let CycleInputs {
        shop,
        key,
        population,
        fitness,
        config,
        pool,
        now,
    } = *inputs;

    let members: Vec<Variant> = population
        .iter()
        .filter(|variant| variant.shop == shop && variant.key == *key && variant.is_breedable())
        .cloned()
        .collect();

    let goal = key.baseline.goal();
    let ranked = rank(&members, fitness, goal);
    let keep = survivors(config.population_size, config.selection_pressure, ranked.len())
        .min(ranked.len());

    let kills: Vec<VariantUuid> = ranked
        .iter()
        .skip(keep)
        .map(|entry| entry.variant.uuid)
        .collect();

    let exempt: Vec<&Variant> = members
        .iter()
        .filter(|variant| {
            matches!(
                variant.status,
                VariantStatus::Protected | VariantStatus::Champion
            )
        })
        .collect();

    let parents: Vec<&Variant> = exempt
        .iter()
        .copied()
        .chain(ranked.iter().take(keep).map(|entry| entry.variant))
        .collect();

    let scores: Vec<f64> = parents
        .iter()
        .map(|parent| {
            fitness
                .get(&parent.uuid)
                .map(|metrics| metrics.score(goal))
                .unwrap_or_default()
        })
        .collect();
    let weights = sampling_weights(&scores);

    let slots = usize::from(config.population_size).saturating_sub(exempt.len() + keep);
    let crossover_probability = if parents.len() >= 2 {
        f64::from(config.crossover_rate.min(100)) / 100.0
    } else {
        0.0
    };

    let mut plan = EvolutionPlan {
        key: key.clone(),
        kills,
        offspring: Vec::with_capacity(slots),
        crossover_births: 0,
        fresh_births: 0,
        mutated_genes: 0,
        skipped_slots: 0,
    };

    for slot in 0..slots {
        let bred = if rng.gen_bool(crossover_probability) {
            pick_parents(&parents, &weights, rng).map(|(a, b)| breed(a, b, rng))
        } else {
            None
        };

        let (mut genes, generation) = if let Some(bred) = bred {
            plan.crossover_births += 1;
            bred
        } else if let Some(genes) = pool.sample_genes(key.baseline, rng) {
            plan.fresh_births += 1;
            (genes, 1)
        } else {
            warn!(population = %key, slot, "gene pool cannot fill refill slot, skipping");
            plan.skipped_slots += 1;
            continue;
        };

        plan.mutated_genes += mutate(&mut genes, key.baseline, pool, config.mutation_rate, rng);

        plan.offspring.push(Variant::new(
            VariantUuid::from_rng(rng),
            shop,
            key.clone(),
            genes,
            generation,
            now,
        ));
    }

    debug!(
        population = %key,
        ranked = ranked.len(),
        survivors = keep,
        killed = plan.kills.len(),
        crossover = plan.crossover_births,
        fresh = plan.fresh_births,
        skipped = plan.skipped_slots,
        "planned evolution cycle"
    );

    plan
}

/// Draw two distinct parents, fitter ones more likely.
fn pick_parents<'a, R: Rng + ?Sized>(
    parents: &[&'a Variant],
    weights: &[f64],
    rng: &mut R,
) -> Option<(&'a Variant, &'a Variant)> {
    let first = WeightedIndex::new(weights).ok()?.sample(rng);

    let remaining: Vec<f64> = weights
        .iter()
        .enumerate()
        .map(|(index, weight)| if index == first { 0.0 } else { *weight })
        .collect();
    let second = WeightedIndex::new(&remaining).ok()?.sample(rng);

    Some((*parents.get(first)?, *parents.get(second)?))
}

fn breed<R: Rng + ?Sized>(a: &Variant, b: &Variant, rng: &mut R) -> (Genes, u32) {
    let generation = a.generation.max(b.generation).saturating_add(1);
    let child = crossover(&a.genes, &b.genes, rng).normalized(a.key.baseline);

    (child, generation)
}
