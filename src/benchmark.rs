//! Buy-and-hold benchmark
//!
//! One notional entered at the first tradable candle's open under the same
//! fee and slippage assumptions as the strategy, held to the end, with exit
//! costs applied at the final close. The engine merges this series into the
//! strategy's equity points.

use crate::types::Candle;

/// Parallel benchmark series over the tradable candle range.
#[derive(Debug, Clone, Default)]
pub struct BenchmarkSeries {
    pub equity: Vec<f64>,
    pub drawdown_pct: Vec<f64>,
    pub total_return: f64,
    pub final_equity: f64,
}

/// Simulate buying and holding over `candles` with `initial_capital`.
/// Fees and slippage are fractions (not bps).
pub fn buy_and_hold(
    candles: &[Candle],
    initial_capital: f64,
    fee_frac: f64,
    slippage_frac: f64,
) -> BenchmarkSeries {
    if candles.is_empty() {
        return BenchmarkSeries::default();
    }

    let entry_price = candles[0].open * (1.0 + slippage_frac);
    let entry_fee = initial_capital * fee_frac;
    let units = (initial_capital - entry_fee) / entry_price;

    let last = candles.len() - 1;
    let mut equity = Vec::with_capacity(candles.len());
    let mut drawdown_pct = Vec::with_capacity(candles.len());
    let mut peak = initial_capital;

    for (i, candle) in candles.iter().enumerate() {
        let value = if i == last {
            let gross = candle.close * (1.0 - slippage_frac) * units;
            gross - gross * fee_frac
        } else {
            units * candle.close
        };
        peak = peak.max(value);
        equity.push(value);
        drawdown_pct.push((value - peak) / peak * 100.0);
    }

    let final_equity = *equity.last().expect("non-empty");
    BenchmarkSeries {
        equity,
        drawdown_pct,
        total_return: (final_equity / initial_capital - 1.0) * 100.0,
        final_equity,
    }
}
