//! Variant Handlers

pub(crate) mod create;
pub(crate) mod fitness;
pub(crate) mod get;
pub(crate) mod index;
pub(crate) mod status;

#[cfg(test)]
mod tests {
    use jiff::Timestamp;

    use recoup::{
        genes::{Genes, OfferType, Redirect},
        ids::VariantUuid,
        variants::{Baseline, PopulationKey, Variant},
    };

    use crate::test_helpers::TEST_SHOP_UUID;

    pub(super) fn make_variant(uuid: VariantUuid) -> Variant {
        Variant::new(
            uuid,
            TEST_SHOP_UUID,
            PopulationKey::shop_wide(Baseline::RevenueWithDiscount),
            Genes {
                headline: "Wait!".to_owned(),
                subhead: "Your cart misses you".to_owned(),
                cta: "Back to cart".to_owned(),
                offer_type: OfferType::Percentage,
                offer_amount: 10,
                redirect: Redirect::Cart,
                urgency: false,
            },
            0,
            Timestamp::UNIX_EPOCH,
        )
    }
}
