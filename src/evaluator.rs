//! Operand resolution and condition evaluation
//!
//! Everything here is evaluated at a single candle index against the
//! pre-computed indicator cache and the (optional) open position. Cross
//! operators additionally consult index `i - 1`. A missing operand value
//! always makes the condition false.

use chrono::NaiveDate;

use crate::cache::IndicatorCache;
use crate::rules::{
    CompareOp, Condition, ConditionGroup, ConditionScope, GroupOp, IndicatorKind, Operand,
};
use crate::types::Candle;

/// An open long position during the simulation loop.
#[derive(Debug, Clone)]
pub struct Position {
    /// Post-slippage fill price.
    pub entry_price: f64,
    /// Candle index of the fill (signal index + 1).
    pub entry_index: usize,
    pub entry_date: NaiveDate,
    pub units: f64,
    /// Dollar notional committed at entry, pre-fee.
    pub position_size: f64,
}

/// Resolve an operand at candle index `i`. Returns `None` during indicator
/// warm-up and for position-scope indicators while the position does not
/// cover index `i`.
pub fn resolve_operand(
    operand: &Operand,
    i: usize,
    candles: &[Candle],
    cache: &IndicatorCache,
    position: Option<&Position>,
) -> Option<f64> {
    let spec = match operand {
        Operand::Number { value } => return Some(*value),
        Operand::Indicator { spec } => spec,
    };

    match spec.kind {
        IndicatorKind::PriceClose => Some(candles[i].close),
        IndicatorKind::PriceOpen => Some(candles[i].open),
        IndicatorKind::PriceHigh => Some(candles[i].high),
        IndicatorKind::PriceLow => Some(candles[i].low),
        IndicatorKind::Volume => Some(candles[i].volume),
        IndicatorKind::PnlPct => position.and_then(|p| {
            if i < p.entry_index {
                return None;
            }
            Some((candles[i].close - p.entry_price) / p.entry_price * 100.0)
        }),
        IndicatorKind::BarsInTrade => position.and_then(|p| {
            if i < p.entry_index {
                return None;
            }
            Some((i - p.entry_index) as f64)
        }),
        _ => cache.value_at(spec, i),
    }
}

/// Evaluate a single condition at candle index `i`.
pub fn evaluate_condition(
    condition: &Condition,
    i: usize,
    candles: &[Candle],
    cache: &IndicatorCache,
    position: Option<&Position>,
) -> bool {
    if condition.scope == ConditionScope::Position && position.is_none() {
        return false;
    }

    match condition.op {
        CompareOp::CrossesAbove | CompareOp::CrossesBelow => {
            if i == 0 {
                return false;
            }
            let resolve = |operand: &Operand, at: usize| {
                resolve_operand(operand, at, candles, cache, position)
            };
            let (Some(left_prev), Some(right_prev), Some(left_now), Some(right_now)) = (
                resolve(&condition.left, i - 1),
                resolve(&condition.right, i - 1),
                resolve(&condition.left, i),
                resolve(&condition.right, i),
            ) else {
                return false;
            };

            // Equality at the prior index counts as "not yet crossed", so a
            // touch followed by a break fires.
            match condition.op {
                CompareOp::CrossesAbove => left_prev <= right_prev && left_now > right_now,
                _ => left_prev >= right_prev && left_now < right_now,
            }
        }
        _ => {
            let (Some(left), Some(right)) = (
                resolve_operand(&condition.left, i, candles, cache, position),
                resolve_operand(&condition.right, i, candles, cache, position),
            ) else {
                return false;
            };

            match condition.op {
                CompareOp::Lt => left < right,
                CompareOp::Lte => left <= right,
                CompareOp::Gt => left > right,
                CompareOp::Gte => left >= right,
                // Exact comparison; callers use this for discretized values.
                CompareOp::Eq => left == right,
                _ => unreachable!("cross ops handled above"),
            }
        }
    }
}

/// Evaluate a condition group at candle index `i`.
/// Empty `AND` is true, empty `OR` is false.
pub fn evaluate_group(
    group: &ConditionGroup,
    i: usize,
    candles: &[Candle],
    cache: &IndicatorCache,
    position: Option<&Position>,
) -> bool {
    match group.op {
        GroupOp::And => group
            .conditions
            .iter()
            .all(|c| evaluate_condition(c, i, candles, cache, position)),
        GroupOp::Or => group
            .conditions
            .iter()
            .any(|c| evaluate_condition(c, i, candles, cache, position)),
    }
}
