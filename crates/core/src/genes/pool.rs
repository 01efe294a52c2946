//! Gene Pool
//!
//! Template material fresh variants and copy mutations are sampled from.

use rand::{Rng, seq::SliceRandom};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    genes::{Genes, OfferType, Redirect},
    variants::Baseline,
};

/// Errors raised while loading a gene pool.
#[derive(Debug, Error)]
pub enum GenePoolError {
    /// The YAML document could not be parsed.
    #[error("could not parse gene pool: {0}")]
    Parse(#[from] serde_norway::Error),
}

/// Candidate values for every gene.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenePool {
    /// Headline candidates.
    pub headlines: Vec<String>,

    /// Subhead candidates.
    pub subheads: Vec<String>,

    /// Call-to-action candidates.
    pub ctas: Vec<String>,

    /// Offer shapes to draw from.
    #[serde(default = "default_offer_types")]
    pub offer_types: Vec<OfferType>,

    /// Percentage-off amounts, in percent points.
    #[serde(default = "default_percentage_amounts")]
    pub percentage_amounts: Vec<u64>,

    /// Fixed and threshold amounts, in minor units.
    #[serde(default = "default_fixed_amounts")]
    pub fixed_amounts: Vec<u64>,
}

fn default_offer_types() -> Vec<OfferType> {
    vec![OfferType::Percentage, OfferType::Fixed, OfferType::Threshold]
}

fn default_percentage_amounts() -> Vec<u64> {
    vec![5, 10, 15, 20]
}

fn default_fixed_amounts() -> Vec<u64> {
    vec![500, 1_000, 1_500, 2_000]
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(ToString::to_string).collect()
}

impl Default for GenePool {
    fn default() -> Self {
        Self {
            headlines: strings(&[
                "Wait! Don't leave empty-handed",
                "Before you go...",
                "Your cart is waiting",
                "Still thinking it over?",
                "Good taste deserves a reward",
            ]),
            subheads: strings(&[
                "Complete your order today",
                "Your items are selling fast",
                "We saved everything for you",
                "Checkout takes less than a minute",
            ]),
            ctas: strings(&[
                "Complete my order",
                "Back to my cart",
                "Claim my offer",
                "Finish checking out",
            ]),
            offer_types: default_offer_types(),
            percentage_amounts: default_percentage_amounts(),
            fixed_amounts: default_fixed_amounts(),
        }
    }
}

impl GenePool {
    /// Parse a pool from YAML.
    ///
    /// # Errors
    ///
    /// Returns [`GenePoolError::Parse`] for malformed documents.
    pub fn from_yaml(document: &str) -> Result<Self, GenePoolError> {
        Ok(serde_norway::from_str(document)?)
    }

    /// Sample an entirely new genome for `baseline`.
    ///
    /// Returns `None` when the pool lacks the material to build one.
    pub fn sample_genes<R: Rng + ?Sized>(&self, baseline: Baseline, rng: &mut R) -> Option<Genes> {
        let headline = self.headlines.choose(rng)?.clone();
        let subhead = self.subheads.choose(rng)?.clone();
        let cta = self.ctas.choose(rng)?.clone();

        let (offer_type, offer_amount) = if baseline.offers_discount() {
            let offer_type = *self.offer_types.choose(rng)?;

            (offer_type, self.sample_amount(offer_type, rng)?)
        } else {
            (OfferType::default(), 0)
        };

        let redirect = if rng.gen_bool(0.5) {
            Redirect::Cart
        } else {
            Redirect::Checkout
        };

        Some(
            Genes {
                headline,
                subhead,
                cta,
                offer_type,
                offer_amount,
                redirect,
                urgency: rng.gen_bool(0.5),
            }
            .normalized(baseline),
        )
    }

    /// Sample an amount suitable for `offer_type`.
    pub fn sample_amount<R: Rng + ?Sized>(&self, offer_type: OfferType, rng: &mut R) -> Option<u64> {
        let amounts = match offer_type {
            OfferType::Percentage => &self.percentage_amounts,
            OfferType::Fixed | OfferType::Threshold => &self.fixed_amounts,
        };

        amounts.choose(rng).copied()
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};
    use testresult::TestResult;

    use super::*;

    #[test]
    fn yaml_pool_fills_offer_defaults() -> TestResult {
        let pool = GenePool::from_yaml(
            r"
headlines: [Hold on]
subheads: [Free returns on every order]
ctas: [Take me back]
",
        )?;

        assert_eq!(pool.headlines, vec!["Hold on".to_string()]);
        assert_eq!(pool.offer_types, default_offer_types());
        assert_eq!(pool.percentage_amounts, default_percentage_amounts());

        Ok(())
    }

    #[test]
    fn empty_copy_lists_yield_nothing() {
        let pool = GenePool {
            ctas: Vec::new(),
            ..GenePool::default()
        };
        let mut rng = StdRng::seed_from_u64(1);

        assert!(
            pool.sample_genes(Baseline::RevenueWithDiscount, &mut rng)
                .is_none()
        );
    }

    #[test]
    fn copy_only_samples_carry_no_amount() {
        let mut rng = StdRng::seed_from_u64(3);

        let genes = GenePool::default().sample_genes(Baseline::ConversionNoDiscount, &mut rng);

        assert_eq!(genes.map(|g| g.offer_amount), Some(0));
    }

    #[test]
    fn discount_samples_use_the_amount_list_for_their_type() {
        let pool = GenePool::default();
        let mut rng = StdRng::seed_from_u64(11);

        for _ in 0..50 {
            let Some(genes) = pool.sample_genes(Baseline::RevenueWithDiscount, &mut rng) else {
                continue;
            };

            let expected = match genes.offer_type {
                OfferType::Percentage => &pool.percentage_amounts,
                OfferType::Fixed | OfferType::Threshold => &pool.fixed_amounts,
            };

            assert!(expected.contains(&genes.offer_amount), "{genes:?}");
        }
    }
}
