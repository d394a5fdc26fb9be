//! Channel fee schedule.
//!
//! Referral + closing fees apply to both channels. Fulfilment-by-Amazon adds
//! a fulfilment fee picked from weight tiers; fulfilment-by-merchant adds our
//! own postage, offset by the marketplace's shipping credit.

use serde::Deserialize;

/// A fulfilment-fee band: items up to `max_oz` pay `fee`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WeightTier {
    pub max_oz: f64,
    pub fee: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FeeSchedule {
    /// Referral fee as a fraction of the sale price (e.g. 0.15).
    pub referral_rate: f64,
    /// Flat per-unit closing fee (media categories).
    pub closing_fee: f64,
    /// FBA fulfilment fee tiers, ascending by `max_oz`.
    pub fba_tiers: Vec<WeightTier>,
    /// Added per started pound above the heaviest tier.
    pub fba_overweight_per_lb: f64,
    /// FBM postage for the first pound.
    pub fbm_base_postage: f64,
    /// FBM postage per additional started pound.
    pub fbm_postage_per_lb: f64,
    /// Shipping credit paid to merchant-fulfilled sellers.
    pub fbm_shipping_credit: f64,
}

impl FeeSchedule {
    /// Referral plus closing fee on a given sale amount.
    pub fn channel_fee(&self, sale_amount: f64) -> f64 {
        sale_amount * self.referral_rate + self.closing_fee
    }

    /// FBA fulfilment fee for an item weight.
    pub fn fba_fulfilment_fee(&self, weight_oz: f64) -> f64 {
        if let Some(tier) = self.fba_tiers.iter().find(|t| weight_oz <= t.max_oz) {
            return tier.fee;
        }
        match self.fba_tiers.last() {
            Some(heaviest) => {
                let extra_lbs = ((weight_oz - heaviest.max_oz) / 16.0).ceil().max(0.0);
                heaviest.fee + extra_lbs * self.fba_overweight_per_lb
            }
            None => (weight_oz / 16.0).ceil().max(1.0) * self.fba_overweight_per_lb,
        }
    }

    /// FBM postage for an item weight.
    pub fn fbm_postage(&self, weight_oz: f64) -> f64 {
        let lbs = (weight_oz / 16.0).ceil().max(1.0);
        self.fbm_base_postage + (lbs - 1.0) * self.fbm_postage_per_lb
    }

    /// Profit when fulfilled by Amazon.
    pub fn fba_profit(&self, resale: f64, buy_price: f64, weight_oz: f64) -> f64 {
        resale - self.channel_fee(resale) - self.fba_fulfilment_fee(weight_oz) - buy_price
    }

    /// Profit when fulfilled by the merchant. The shipping credit is revenue
    /// and is subject to the referral fee.
    pub fn fbm_profit(&self, resale: f64, buy_price: f64, weight_oz: f64) -> f64 {
        let revenue = resale + self.fbm_shipping_credit;
        revenue - self.channel_fee(revenue) - self.fbm_postage(weight_oz) - buy_price
    }
}

#[cfg(test)]
pub(crate) fn sample_schedule() -> FeeSchedule {
    FeeSchedule {
        referral_rate: 0.15,
        closing_fee: 1.80,
        fba_tiers: vec![
            WeightTier { max_oz: 4.0, fee: 3.22 },
            WeightTier { max_oz: 8.0, fee: 3.40 },
            WeightTier { max_oz: 12.0, fee: 3.58 },
            WeightTier { max_oz: 16.0, fee: 3.77 },
            WeightTier { max_oz: 32.0, fee: 4.75 },
            WeightTier { max_oz: 48.0, fee: 5.40 },
        ],
        fba_overweight_per_lb: 0.38,
        fbm_base_postage: 3.65,
        fbm_postage_per_lb: 0.70,
        fbm_shipping_credit: 3.99,
    }
}
