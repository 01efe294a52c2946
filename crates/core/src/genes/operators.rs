//! Breeding operators.

use rand::{Rng, seq::SliceRandom};

use crate::{
    genes::{Genes, GenePool, OfferType},
    variants::Baseline,
};

/// Form a child by drawing every gene independently from one parent or the other.
pub fn crossover<R: Rng + ?Sized>(a: &Genes, b: &Genes, rng: &mut R) -> Genes {
    fn pick<'g, R: Rng + ?Sized>(a: &'g Genes, b: &'g Genes, rng: &mut R) -> &'g Genes {
        if rng.gen_bool(0.5) { a } else { b }
    }

    Genes {
        headline: pick(a, b, rng).headline.clone(),
        subhead: pick(a, b, rng).subhead.clone(),
        cta: pick(a, b, rng).cta.clone(),
        offer_type: pick(a, b, rng).offer_type,
        offer_amount: pick(a, b, rng).offer_amount,
        redirect: pick(a, b, rng).redirect,
        urgency: pick(a, b, rng).urgency,
    }
}

/// Perturb each gene independently with probability `rate` percent.
///
/// A coin is drawn for every gene regardless of baseline so the random stream does not
/// depend on which genes are meaningful. Returns the number of genes perturbed.
pub fn mutate<R: Rng + ?Sized>(
    genes: &mut Genes,
    baseline: Baseline,
    pool: &GenePool,
    rate: u8,
    rng: &mut R,
) -> usize {
    let probability = f64::from(rate.min(100)) / 100.0;
    let discounted = baseline.offers_discount();
    let mut mutated = 0;

    if rng.gen_bool(probability) && resample(&mut genes.headline, &pool.headlines, rng) {
        mutated += 1;
    }

    if rng.gen_bool(probability) && resample(&mut genes.subhead, &pool.subheads, rng) {
        mutated += 1;
    }

    if rng.gen_bool(probability) && resample(&mut genes.cta, &pool.ctas, rng) {
        mutated += 1;
    }

    if rng.gen_bool(probability) && discounted {
        if let Some(offer_type) = pool.offer_types.choose(rng).copied() {
            if offer_type != genes.offer_type {
                genes.offer_type = offer_type;
                genes.offer_amount = pool
                    .sample_amount(offer_type, rng)
                    .unwrap_or(genes.offer_amount);
            }

            mutated += 1;
        }
    }

    if rng.gen_bool(probability) && discounted {
        genes.offer_amount = step_amount(genes.offer_type, genes.offer_amount, rng);
        mutated += 1;
    }

    if rng.gen_bool(probability) {
        genes.redirect = genes.redirect.flipped();
        mutated += 1;
    }

    if rng.gen_bool(probability) {
        genes.urgency = !genes.urgency;
        mutated += 1;
    }

    *genes = std::mem::take(genes).normalized(baseline);

    mutated
}

fn resample<R: Rng + ?Sized>(gene: &mut String, candidates: &[String], rng: &mut R) -> bool {
    let Some(value) = candidates.choose(rng) else {
        return false;
    };

    gene.clone_from(value);

    true
}

fn step_amount<R: Rng + ?Sized>(offer_type: OfferType, amount: u64, rng: &mut R) -> u64 {
    let step = match offer_type {
        OfferType::Percentage => rng.gen_range(1..=5),
        OfferType::Fixed | OfferType::Threshold => rng.gen_range(1..=5) * 100,
    };

    let stepped = if rng.gen_bool(0.5) {
        amount.saturating_add(step)
    } else {
        amount.saturating_sub(step)
    };

    offer_type.clamp_amount(stepped)
}
