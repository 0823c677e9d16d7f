//! Performance metrics
//!
//! The full battery is computed from the trade list, the equity curve, the
//! initial capital and the tradable-candle count. Annualization uses 365
//! (crypto trades every day) with a zero risk-free rate. Sharpe uses the
//! population standard deviation; Sortino divides the downside sum of
//! squares by the total observation count.

use statrs::statistics::Statistics;

use crate::types::{EquityPoint, PerformanceMetrics, Trade};

const ANNUALIZATION: f64 = 365.0;
const SIGMA_RELATIVE_EPS: f64 = 1e-10;

/// Per-candle returns from consecutive equity points. A zero previous
/// equity yields a zero return rather than a division.
pub fn daily_returns(equity_curve: &[EquityPoint]) -> Vec<f64> {
    equity_curve
        .windows(2)
        .map(|w| {
            if w[0].equity != 0.0 {
                (w[1].equity - w[0].equity) / w[0].equity
            } else {
                0.0
            }
        })
        .collect()
}

/// Annualized Sharpe ratio with risk-free rate 0. Returns 0 with fewer
/// than two returns or when the population deviation is zero or
/// negligible relative to the mean.
pub fn sharpe_ratio(returns: &[f64]) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let mean = Statistics::mean(returns);
    let sigma = Statistics::population_variance(returns).sqrt();
    if sigma == 0.0 || sigma <= mean.abs() * SIGMA_RELATIVE_EPS {
        return 0.0;
    }
    mean / sigma * ANNUALIZATION.sqrt()
}

/// Annualized Sortino ratio. Downside variance is the sum of squared
/// negative returns divided by the total observation count. With no
/// negative returns and a non-negative mean the ratio is +infinity.
pub fn sortino_ratio(returns: &[f64]) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let mean = Statistics::mean(returns);
    let downside_sq_sum: f64 = returns.iter().filter(|&&r| r < 0.0).map(|r| r * r).sum();
    if downside_sq_sum == 0.0 {
        return if mean >= 0.0 { f64::INFINITY } else { 0.0 };
    }
    let downside_sigma = (downside_sq_sum / returns.len() as f64).sqrt();
    mean / downside_sigma * ANNUALIZATION.sqrt()
}

/// Longest calendar-day span during which equity stays strictly below a
/// prior peak. The span runs from the peak candle to the recovery candle,
/// or to the last date when the curve never recovers.
pub fn max_drawdown_duration_days(equity_curve: &[EquityPoint]) -> i64 {
    if equity_curve.is_empty() {
        return 0;
    }

    let mut peak = equity_curve[0].equity;
    let mut peak_date = equity_curve[0].date;
    let mut max_days = 0i64;
    let mut in_drawdown = false;

    for point in &equity_curve[1..] {
        if point.equity < peak {
            in_drawdown = true;
            max_days = max_days.max((point.date - peak_date).num_days());
        } else {
            if in_drawdown {
                max_days = max_days.max((point.date - peak_date).num_days());
                in_drawdown = false;
            }
            peak = point.equity;
            peak_date = point.date;
        }
    }

    max_days
}

/// Compute the full metric battery.
pub fn calculate(
    trades: &[Trade],
    equity_curve: &[EquityPoint],
    initial_capital: f64,
    total_candles: usize,
) -> PerformanceMetrics {
    let final_equity = equity_curve
        .last()
        .map(|p| p.equity)
        .unwrap_or(initial_capital);

    let total_return = if equity_curve.is_empty() {
        0.0
    } else {
        (final_equity / initial_capital - 1.0) * 100.0
    };

    let span_days = match (equity_curve.first(), equity_curve.last()) {
        (Some(first), Some(last)) => (last.date - first.date).num_days(),
        _ => 0,
    };
    let annualized_return = if span_days > 0 && final_equity > 0.0 {
        ((final_equity / initial_capital).powf(ANNUALIZATION / span_days as f64) - 1.0) * 100.0
    } else {
        0.0
    };

    let returns = daily_returns(equity_curve);
    let sharpe = sharpe_ratio(&returns);
    let sortino = sortino_ratio(&returns);

    let max_drawdown = equity_curve
        .iter()
        .map(|p| p.drawdown_pct)
        .fold(0.0, f64::min);

    // Zero-PnL trades count as wins.
    let winners: Vec<&Trade> = trades.iter().filter(|t| t.pnl_pct >= 0.0).collect();
    let losers: Vec<&Trade> = trades.iter().filter(|t| t.pnl_pct < 0.0).collect();

    let win_rate = if trades.is_empty() {
        0.0
    } else {
        winners.len() as f64 / trades.len() as f64 * 100.0
    };

    let gross_profit: f64 = trades.iter().map(|t| t.pnl_abs).filter(|&p| p > 0.0).sum();
    let gross_loss: f64 = trades
        .iter()
        .map(|t| t.pnl_abs)
        .filter(|&p| p < 0.0)
        .map(f64::abs)
        .sum();
    let profit_factor = if gross_loss > 0.0 {
        gross_profit / gross_loss
    } else if gross_profit > 0.0 {
        f64::INFINITY
    } else {
        0.0
    };

    let avg_win_pct = if winners.is_empty() {
        0.0
    } else {
        winners.iter().map(|t| t.pnl_pct).sum::<f64>() / winners.len() as f64
    };
    let avg_loss_pct = if losers.is_empty() {
        0.0
    } else {
        losers.iter().map(|t| t.pnl_pct).sum::<f64>() / losers.len() as f64
    };

    // Unlike drawdown_pct these carry no sign invariant, so a 0.0 seed
    // would clamp an all-losing (or all-winning) trade set.
    let best_trade_pct = if trades.is_empty() {
        0.0
    } else {
        trades
            .iter()
            .map(|t| t.pnl_pct)
            .fold(f64::NEG_INFINITY, f64::max)
    };
    let worst_trade_pct = if trades.is_empty() {
        0.0
    } else {
        trades
            .iter()
            .map(|t| t.pnl_pct)
            .fold(f64::INFINITY, f64::min)
    };

    let total_holding: i64 = trades.iter().map(|t| t.holding_days).sum();
    let avg_holding_days = if trades.is_empty() {
        0.0
    } else {
        total_holding as f64 / trades.len() as f64
    };
    let exposure_time_pct = if total_candles == 0 {
        0.0
    } else {
        total_holding as f64 / total_candles as f64 * 100.0
    };

    PerformanceMetrics {
        total_return,
        annualized_return,
        sharpe_ratio: sharpe,
        sortino_ratio: sortino,
        max_drawdown,
        max_drawdown_duration_days: max_drawdown_duration_days(equity_curve),
        win_rate,
        profit_factor,
        avg_win_pct,
        avg_loss_pct,
        best_trade_pct,
        worst_trade_pct,
        avg_holding_days,
        exposure_time_pct,
        total_trades: trades.len(),
    }
}
