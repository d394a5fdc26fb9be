//! Evaluation engine: turns a valuation payload and a buy price into a
//! BUY / REVIEW / REJECT decision with a financial breakdown.
//!
//! `evaluate` is pure. It reads no clock and no environment; the trailing
//! rank window is anchored at the payload's own `observed_at`. Arithmetic
//! is done in dollars and converted to cents only when the result is built.

pub mod fees;

use chrono::Duration;
use serde::Deserialize;
use tracing::debug;

use crate::types::{
    guard_float, guard_int, to_minor_units, Decision, EvaluationResult, RankPoint,
    ValuationFields, ValuationPayload,
};
use fees::FeeSchedule;

const GRAMS_PER_OUNCE: f64 = 28.349_523_125;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Decision thresholds and fee model. Loaded from the `[evaluation]` table;
/// the cutoffs are business parameters and have no built-in defaults.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EvaluationConfig {
    /// Minimum profit (dollars) both channels must clear for BUY.
    pub min_profit: f64,
    /// Minimum resale / buy-price ratio for BUY.
    pub min_multiplier: f64,
    /// Ranks above this are rejected as too slow to sell.
    #[serde(default)]
    pub max_sales_rank: Option<i64>,
    /// Trailing window for counting rank drops.
    #[serde(default = "default_rank_window_days")]
    pub rank_window_days: i64,
    /// Drop count over the window at which Amazon is assumed to be out of
    /// stock whenever we'd sell.
    pub stockout_drop_count: f64,
    /// Weight assumed when the payload has none.
    pub default_weight_oz: f64,
    pub fees: FeeSchedule,
}

fn default_rank_window_days() -> i64 {
    90
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// Evaluate one catalog entry.
///
/// `payload` is `None` when the valuation service had no data for the key.
/// `buy_price` is the full acquisition cost (price + shipping) in dollars.
pub fn evaluate(
    payload: Option<&ValuationPayload>,
    buy_price: f64,
    config: &EvaluationConfig,
) -> EvaluationResult {
    let Some(payload) = payload else {
        return EvaluationResult::no_data("no Keepa data");
    };

    let mut flags = Vec::new();

    let weight_oz = match payload.weight_grams.filter(|g| g.is_finite() && *g > 0.0) {
        Some(grams) => grams / GRAMS_PER_OUNCE,
        None => {
            flags.push("weight_estimated".to_string());
            config.default_weight_oz
        }
    };
    let weight_oz = round_to(weight_oz, 1);

    let rank_drops = count_rank_drops(
        &payload.rank_history,
        payload,
        Duration::days(config.rank_window_days),
    )
    .or(payload.rank_drops);
    if rank_drops.is_none() {
        flags.push("no_rank_history".to_string());
    }

    let mut fields = ValuationFields {
        external_id: Some(payload.external_id.clone()),
        sales_rank: payload.sales_rank.and_then(guard_int),
        rank_drops: rank_drops.and_then(|d| guard_int(i64::from(d))),
        weight_oz: guard_float(weight_oz),
        ..ValuationFields::default()
    };

    let Some(market_price) = market_price(payload) else {
        fields.flags = flags;
        return EvaluationResult {
            decision: Decision::Reject,
            reason: "no current price".to_string(),
            fields,
        };
    };
    fields.external_price_cents = to_minor_units(market_price);

    // Amazon competes on its own listing while in stock; the resale estimate
    // blends toward the market price by how likely Amazon is to be out.
    let drops = f64::from(rank_drops.unwrap_or(0));
    let oos_likelihood = payload
        .amazon_oos_ratio
        .filter(|r| r.is_finite())
        .unwrap_or_else(|| {
            if config.stockout_drop_count > 0.0 {
                drops / config.stockout_drop_count
            } else {
                0.0
            }
        })
        .clamp(0.0, 1.0);

    let resale = match payload.amazon_price {
        Some(amazon) if amazon < market_price => {
            flags.push("amazon_undercuts".to_string());
            amazon + (market_price - amazon) * oos_likelihood
        }
        _ => market_price,
    };
    fields.estimated_resale_cents = to_minor_units(resale);

    let multiplier = resale / buy_price;
    let fba_profit = config.fees.fba_profit(resale, buy_price, weight_oz);
    let fbm_profit = config.fees.fbm_profit(resale, buy_price, weight_oz);

    fields.multiplier = guard_float(multiplier).map(|m| round_to(m, 2));
    fields.fba_profit_cents = to_minor_units(fba_profit);
    fields.fbm_profit_cents = to_minor_units(fbm_profit);
    fields.flags = flags;

    let (decision, reason) = decide(payload, buy_price, multiplier, fba_profit, fbm_profit, config);

    debug!(
        external_id = %payload.external_id,
        buy_price = format!("${buy_price:.2}"),
        resale = format!("${resale:.2}"),
        multiplier = format!("{multiplier:.2}"),
        fba = format!("${fba_profit:.2}"),
        fbm = format!("${fbm_profit:.2}"),
        decision = %decision,
        "Evaluated"
    );

    EvaluationResult {
        decision,
        reason,
        fields,
    }
}

/// Apply the decision policy to already-computed figures.
fn decide(
    payload: &ValuationPayload,
    buy_price: f64,
    multiplier: f64,
    fba_profit: f64,
    fbm_profit: f64,
    config: &EvaluationConfig,
) -> (Decision, String) {
    if !buy_price.is_finite() || buy_price <= 0.0 {
        return (Decision::Reject, "invalid buy price".to_string());
    }

    let rank = match payload.sales_rank {
        Some(r) if r > 0 => r,
        _ => return (Decision::Reject, "no sales rank".to_string()),
    };
    if let Some(ceiling) = config.max_sales_rank {
        if rank > ceiling {
            return (
                Decision::Reject,
                format!("sales rank {rank} above ceiling {ceiling}"),
            );
        }
    }

    if !fba_profit.is_finite() || !fbm_profit.is_finite() || fba_profit <= 0.0 || fbm_profit <= 0.0 {
        return (
            Decision::Reject,
            format!("non-positive profit (FBA ${fba_profit:.2}, FBM ${fbm_profit:.2})"),
        );
    }

    let profit_ok = fba_profit >= config.min_profit && fbm_profit >= config.min_profit;
    let multiplier_ok = multiplier.is_finite() && multiplier >= config.min_multiplier;

    match (profit_ok, multiplier_ok) {
        (true, true) => (
            Decision::Buy,
            format!("multiplier {multiplier:.2}, FBA profit ${fba_profit:.2}"),
        ),
        (true, false) => (
            Decision::Review,
            format!("multiplier below threshold ({multiplier:.2} < {:.2})", config.min_multiplier),
        ),
        (false, true) => (
            Decision::Review,
            format!(
                "profit below margin floor (FBA ${fba_profit:.2}, FBM ${fbm_profit:.2})"
            ),
        ),
        (false, false) => (
            Decision::Review,
            "profit and multiplier below threshold".to_string(),
        ),
    }
}

/// Pick the price we expect to sell at: buy box, else lowest new, else used.
fn market_price(payload: &ValuationPayload) -> Option<f64> {
    [payload.buy_box_price, payload.new_price, payload.used_price]
        .into_iter()
        .flatten()
        .find(|p| p.is_finite() && *p > 0.0)
}

/// Count rank decreases (sales) within `window` ending at `observed_at`.
/// `None` when the history is empty.
fn count_rank_drops(history: &[RankPoint], payload: &ValuationPayload, window: Duration) -> Option<u32> {
    if history.is_empty() {
        return None;
    }
    let start = payload.observed_at - window;
    let drops = history
        .windows(2)
        .filter(|pair| pair[1].at >= start && pair[1].at <= payload.observed_at)
        .filter(|pair| pair[1].rank > 0 && pair[0].rank > 0 && pair[1].rank < pair[0].rank)
        .count();
    Some(u32::try_from(drops).unwrap_or(u32::MAX))
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
