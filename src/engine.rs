//! Backtest engine
//!
//! Deterministic simulation over a filtered daily candle series. Signals
//! are read off candle closes and fill at the next candle's open with
//! adverse slippage and symmetric fees; DCA mode buys at the interval
//! candle's close instead. One `run` call is pure: identical inputs
//! produce identical results.

use thiserror::Error;
use tracing::{debug, info};

use crate::benchmark::{self, BenchmarkSeries};
use crate::cache::{self, IndicatorCache};
use crate::evaluator::{evaluate_group, Position};
use crate::metrics;
use crate::rules::{
    validate_config, BacktestConfig, PositionSizing, RuleSetError, StrategyMode,
};
use crate::types::{AuditInfo, BacktestResult, BenchmarkSummary, Candle, EquityPoint, Trade};

/// Exit reason labels. External consumers match on these strings.
pub const EXIT_SIGNAL: &str = "Exit signal";
pub const EXIT_FORCE_CLOSE: &str = "Force-close at end of data";
pub const EXIT_DCA_HOLD: &str = "DCA hold";

/// Configuration failures caught before the simulation loop runs.
#[derive(Debug, Error)]
pub enum BacktestError {
    #[error("rule set failed validation with {} error(s)", .0.len())]
    InvalidConfig(Vec<RuleSetError>),
}

/// Run one backtest. Candles outside `[start_date, end_date]` are filtered
/// out; the series is assumed sorted by date.
pub fn run(config: &BacktestConfig, candles: &[Candle]) -> Result<BacktestResult, BacktestError> {
    let report = validate_config(config);
    report.log();
    if !report.is_valid() {
        return Err(BacktestError::InvalidConfig(report.errors));
    }

    let filtered: Vec<Candle> = candles
        .iter()
        .filter(|c| c.date >= config.start_date && c.date <= config.end_date)
        .cloned()
        .collect();

    info!(
        asset = %config.asset,
        candles = filtered.len(),
        "starting backtest {} .. {}",
        config.start_date,
        config.end_date
    );

    if filtered.is_empty() {
        return Ok(empty_result(
            config,
            &filtered,
            0,
            "No candles in selected date range",
        ));
    }

    let result = match config.rules.mode {
        StrategyMode::Standard => run_standard(config, &filtered),
        StrategyMode::Dca {
            interval_days,
            amount_usd,
        } => run_dca(config, &filtered, interval_days as usize, amount_usd),
    };

    info!(
        trades = result.trades.len(),
        total_return = result.metrics.total_return,
        "backtest finished"
    );
    Ok(result)
}

fn position_model(config: &BacktestConfig) -> &'static str {
    match config.rules.mode {
        StrategyMode::Standard => AuditInfo::POSITION_MODEL_STANDARD,
        StrategyMode::Dca { .. } => AuditInfo::POSITION_MODEL_DCA,
    }
}

fn base_audit(config: &BacktestConfig, candles: &[Candle], warmup: usize) -> AuditInfo {
    AuditInfo {
        execution_model: AuditInfo::EXECUTION_MODEL.to_string(),
        annualization_factor: AuditInfo::ANNUALIZATION_FACTOR,
        risk_free_rate: AuditInfo::RISK_FREE_RATE,
        benchmark_model: AuditInfo::BENCHMARK_MODEL.to_string(),
        position_model: position_model(config).to_string(),
        warmup_candles: warmup,
        data_start: candles.first().map(|c| c.date),
        data_end: candles.last().map(|c| c.date),
        total_candles: candles.len(),
        tradable_candles: candles.len().saturating_sub(warmup),
        dca_budget_exhausted_date: None,
    }
}

/// Placeholder result for degenerate runs: zero-filled metrics, no trades.
fn empty_result(
    config: &BacktestConfig,
    candles: &[Candle],
    warmup: usize,
    description: &str,
) -> BacktestResult {
    let mut audit = base_audit(config, candles, warmup);
    audit.tradable_candles = 0;
    BacktestResult {
        config: config.clone(),
        trades: Vec::new(),
        equity_curve: Vec::new(),
        metrics: Default::default(),
        benchmark: BenchmarkSummary::default(),
        indicator_data: Default::default(),
        audit,
        description: Some(description.to_string()),
    }
}

/// Merge the benchmark series into per-candle equity points.
fn merge_equity(
    raw: Vec<(chrono::NaiveDate, f64, f64)>,
    bench: &BenchmarkSeries,
) -> Vec<EquityPoint> {
    debug_assert_eq!(raw.len(), bench.equity.len());
    raw.into_iter()
        .enumerate()
        .map(|(i, (date, equity, drawdown_pct))| EquityPoint {
            date,
            equity,
            benchmark_equity: bench.equity[i],
            drawdown_pct,
            benchmark_drawdown_pct: bench.drawdown_pct[i],
        })
        .collect()
}

// =============================================================================
// Standard signal-driven branch
// =============================================================================

fn run_standard(config: &BacktestConfig, candles: &[Candle]) -> BacktestResult {
    let rules = &config.rules;
    let specs = cache::collect_specs(rules);
    let warmup = cache::max_warmup(&specs);

    if warmup >= candles.len() {
        debug!(warmup, candles = candles.len(), "warm-up exceeds data");
        return empty_result(config, candles, warmup, "Warmup exceeds data range");
    }

    let indicator_cache: IndicatorCache = cache::precompute(&specs, candles);
    debug!(specs = specs.len(), warmup, "indicators pre-computed");

    let fee_frac = config.fee_bps / 10_000.0;
    let slippage_frac = config.slippage_bps / 10_000.0;

    let mut capital = config.initial_capital;
    let mut position: Option<Position> = None;
    let mut trades: Vec<Trade> = Vec::new();
    let mut raw_equity: Vec<(chrono::NaiveDate, f64, f64)> = Vec::new();
    let mut peak = config.initial_capital;
    let mut next_trade_id: u32 = 1;

    for i in warmup..candles.len() {
        if position.is_none() {
            // Entry signals on the last candle have no next open to fill at.
            if evaluate_group(&rules.entry, i, candles, &indicator_cache, None)
                && i + 1 < candles.len()
            {
                let size = match rules.sizing {
                    PositionSizing::PercentEquity { pct } => capital * pct / 100.0,
                    PositionSizing::FixedAmount { usd } => usd.min(capital),
                };
                let fill = candles[i + 1].open * (1.0 + slippage_frac);
                let entry_fee = size * fee_frac;
                let units = (size - entry_fee) / fill;

                capital -= size;
                position = Some(Position {
                    entry_price: fill,
                    entry_index: i + 1,
                    entry_date: candles[i + 1].date,
                    units,
                    position_size: size,
                });
                debug!(index = i + 1, fill, size, "entry filled");
            }
        } else if evaluate_group(&rules.exit, i, candles, &indicator_cache, position.as_ref())
            && i + 1 < candles.len()
        {
            let pos = position.take().expect("position checked above");
            let fill = candles[i + 1].open * (1.0 - slippage_frac);
            let gross = fill * pos.units;
            let exit_fee = gross * fee_frac;
            let net = gross - exit_fee;
            let pnl_abs = net - pos.position_size;
            let exit_date = candles[i + 1].date;

            trades.push(Trade {
                id: next_trade_id,
                entry_date: pos.entry_date,
                entry_price: pos.entry_price,
                exit_date,
                exit_price: fill,
                pnl_abs,
                pnl_pct: pnl_abs / pos.position_size * 100.0,
                holding_days: (exit_date - pos.entry_date).num_days().abs(),
                exit_reason: EXIT_SIGNAL.to_string(),
                position_size: pos.position_size,
            });
            next_trade_id += 1;
            capital += net;
            debug!(index = i + 1, fill, net, "exit filled");
        }

        let held = position
            .as_ref()
            .map_or(0.0, |p| p.units * candles[i].close);
        let equity = capital + held;
        peak = peak.max(equity);
        raw_equity.push((candles[i].date, equity, (equity - peak) / peak * 100.0));
    }

    // A position left open at the end of data liquidates at the final close.
    if let Some(pos) = position.take() {
        let last = candles.len() - 1;
        let fill = candles[last].close * (1.0 - slippage_frac);
        let gross = fill * pos.units;
        let exit_fee = gross * fee_frac;
        let net = gross - exit_fee;
        let pnl_abs = net - pos.position_size;
        let exit_date = candles[last].date;

        trades.push(Trade {
            id: next_trade_id,
            entry_date: pos.entry_date,
            entry_price: pos.entry_price,
            exit_date,
            exit_price: fill,
            pnl_abs,
            pnl_pct: pnl_abs / pos.position_size * 100.0,
            holding_days: (exit_date - pos.entry_date).num_days().abs(),
            exit_reason: EXIT_FORCE_CLOSE.to_string(),
            position_size: pos.position_size,
        });
        capital += net;
        peak = peak.max(capital);

        if let Some(last_point) = raw_equity.last_mut() {
            last_point.1 = capital;
            last_point.2 = (capital - peak) / peak * 100.0;
        }
        debug!(fill, net, "force-closed open position at end of data");
    }

    let tradable = &candles[warmup..];
    let bench = benchmark::buy_and_hold(
        tradable,
        config.initial_capital,
        fee_frac,
        slippage_frac,
    );
    let equity_curve = merge_equity(raw_equity, &bench);
    let perf = metrics::calculate(
        &trades,
        &equity_curve,
        config.initial_capital,
        tradable.len(),
    );

    BacktestResult {
        config: config.clone(),
        trades,
        equity_curve,
        metrics: perf,
        benchmark: BenchmarkSummary {
            total_return: bench.total_return,
            final_equity: bench.final_equity,
        },
        indicator_data: indicator_cache.into_series(),
        audit: base_audit(config, candles, warmup),
        description: None,
    }
}

// =============================================================================
// DCA branch
// =============================================================================

struct DcaEntry {
    date: chrono::NaiveDate,
    fill: f64,
    units: f64,
    /// Total cash outflow for this buy, fee included.
    invested: f64,
}

fn run_dca(
    config: &BacktestConfig,
    candles: &[Candle],
    interval_days: usize,
    amount_usd: f64,
) -> BacktestResult {
    let fee_frac = config.fee_bps / 10_000.0;
    let slippage_frac = config.slippage_bps / 10_000.0;

    let mut remaining_cash = config.initial_capital;
    let mut total_units = 0.0;
    let mut entries: Vec<DcaEntry> = Vec::new();
    let mut raw_equity: Vec<(chrono::NaiveDate, f64, f64)> = Vec::new();
    let mut peak = config.initial_capital;

    for (i, candle) in candles.iter().enumerate() {
        if i % interval_days == 0 {
            let fill = candle.close * (1.0 + slippage_frac);
            let fee = amount_usd * fee_frac;
            let total_cost = amount_usd + fee;

            if remaining_cash >= total_cost {
                let units = amount_usd / fill;
                entries.push(DcaEntry {
                    date: candle.date,
                    fill,
                    units,
                    invested: total_cost,
                });
                total_units += units;
                remaining_cash -= total_cost;
            } else if remaining_cash > fee {
                // Final partial buy drains the cash pool.
                let investable = remaining_cash - fee;
                let units = investable / fill;
                entries.push(DcaEntry {
                    date: candle.date,
                    fill,
                    units,
                    invested: remaining_cash,
                });
                total_units += units;
                remaining_cash = 0.0;
                debug!(index = i, investable, "partial DCA buy exhausted budget");
            }
        }

        let equity = total_units * candle.close + remaining_cash;
        peak = peak.max(equity);
        raw_equity.push((candle.date, equity, (equity - peak) / peak * 100.0));
    }

    // Each periodic buy becomes one trade held to the final close. The
    // notional close applies no exit costs; the benchmark applies both and
    // stays the stricter comparison.
    let last_candle = candles.last().expect("non-empty series");
    let trades: Vec<Trade> = entries
        .iter()
        .enumerate()
        .map(|(idx, entry)| {
            let exit_value = entry.units * last_candle.close;
            let pnl_abs = exit_value - entry.invested;
            Trade {
                id: idx as u32 + 1,
                entry_date: entry.date,
                entry_price: entry.fill,
                exit_date: last_candle.date,
                exit_price: last_candle.close,
                pnl_abs,
                pnl_pct: pnl_abs / entry.invested * 100.0,
                holding_days: (last_candle.date - entry.date).num_days(),
                exit_reason: EXIT_DCA_HOLD.to_string(),
                position_size: entry.invested,
            }
        })
        .collect();

    let bench = benchmark::buy_and_hold(
        candles,
        config.initial_capital,
        fee_frac,
        slippage_frac,
    );
    let equity_curve = merge_equity(raw_equity, &bench);
    let perf = metrics::calculate(&trades, &equity_curve, config.initial_capital, candles.len());

    let mut audit = base_audit(config, candles, 0);
    if remaining_cash <= amount_usd * fee_frac && !entries.is_empty() {
        audit.dca_budget_exhausted_date = entries.last().map(|e| e.date);
    }

    BacktestResult {
        config: config.clone(),
        trades,
        equity_curve,
        metrics: perf,
        benchmark: BenchmarkSummary {
            total_return: bench.total_return,
            final_equity: bench.final_equity,
        },
        indicator_data: Default::default(),
        audit,
        description: None,
    }
}
