//! Core data types shared across the backtesting engine

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::rules::BacktestConfig;

/// Validation errors for candle data
#[derive(Debug, Error)]
pub enum CandleValidationError {
    #[error("high ({high}) must be >= low ({low})")]
    HighLessThanLow { high: f64, low: f64 },

    #[error("volume ({0}) must be >= 0")]
    NegativeVolume(f64),

    #[error("open ({open}) must be between low ({low}) and high ({high})")]
    OpenOutOfRange { open: f64, low: f64, high: f64 },

    #[error("close ({close}) must be between low ({low}) and high ({high})")]
    CloseOutOfRange { close: f64, low: f64, high: f64 },

    #[error("prices must be positive: open={open}, high={high}, low={low}, close={close}")]
    NonPositivePrice {
        open: f64,
        high: f64,
        low: f64,
        close: f64,
    },

    #[error("prices and volume must be finite")]
    NonFiniteField,
}

/// One daily OHLCV bar. The engine assumes the series is ordered by `date`
/// with one candle per calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// Create a new candle with validation
    pub fn new(
        date: NaiveDate,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Result<Self, CandleValidationError> {
        let candle = Self {
            date,
            open,
            high,
            low,
            close,
            volume,
        };
        candle.validate()?;
        Ok(candle)
    }

    /// Validate the candle data
    pub fn validate(&self) -> Result<(), CandleValidationError> {
        if !(self.open.is_finite()
            && self.high.is_finite()
            && self.low.is_finite()
            && self.close.is_finite()
            && self.volume.is_finite())
        {
            return Err(CandleValidationError::NonFiniteField);
        }

        if self.open <= 0.0 || self.high <= 0.0 || self.low <= 0.0 || self.close <= 0.0 {
            return Err(CandleValidationError::NonPositivePrice {
                open: self.open,
                high: self.high,
                low: self.low,
                close: self.close,
            });
        }

        if self.high < self.low {
            return Err(CandleValidationError::HighLessThanLow {
                high: self.high,
                low: self.low,
            });
        }

        if self.volume < 0.0 {
            return Err(CandleValidationError::NegativeVolume(self.volume));
        }

        if self.open < self.low || self.open > self.high {
            return Err(CandleValidationError::OpenOutOfRange {
                open: self.open,
                low: self.low,
                high: self.high,
            });
        }

        if self.close < self.low || self.close > self.high {
            return Err(CandleValidationError::CloseOutOfRange {
                close: self.close,
                low: self.low,
                high: self.high,
            });
        }

        Ok(())
    }

    /// Check if the candle is valid without returning detailed error
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }
}

/// A completed round trip. Prices are post-slippage fills; `position_size`
/// is the dollar notional committed at entry (total outflow for DCA buys).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: u32,
    pub entry_date: NaiveDate,
    pub entry_price: f64,
    pub exit_date: NaiveDate,
    pub exit_price: f64,
    pub pnl_abs: f64,
    pub pnl_pct: f64,
    pub holding_days: i64,
    pub exit_reason: String,
    pub position_size: f64,
}

/// One point on the merged strategy/benchmark equity curve.
/// Drawdowns are percentages and never positive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub date: NaiveDate,
    pub equity: f64,
    pub benchmark_equity: f64,
    pub drawdown_pct: f64,
    pub benchmark_drawdown_pct: f64,
}

/// Performance statistics computed from the trade list and equity curve.
///
/// `profit_factor` and `sortino_ratio` may legitimately be `f64::INFINITY`;
/// no field is ever NaN.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub total_return: f64,
    pub annualized_return: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub max_drawdown: f64,
    pub max_drawdown_duration_days: i64,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub avg_win_pct: f64,
    pub avg_loss_pct: f64,
    pub best_trade_pct: f64,
    pub worst_trade_pct: f64,
    pub avg_holding_days: f64,
    pub exposure_time_pct: f64,
    pub total_trades: usize,
}

/// Human-readable execution-model record. External dashboards parse the
/// label strings, so their exact wording is part of the contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditInfo {
    pub execution_model: String,
    pub annualization_factor: u32,
    pub risk_free_rate: f64,
    pub benchmark_model: String,
    pub position_model: String,
    pub warmup_candles: usize,
    pub data_start: Option<NaiveDate>,
    pub data_end: Option<NaiveDate>,
    pub total_candles: usize,
    pub tradable_candles: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dca_budget_exhausted_date: Option<NaiveDate>,
}

impl AuditInfo {
    pub const EXECUTION_MODEL: &'static str = "Signal on close[i], execute at open[i+1]";
    pub const BENCHMARK_MODEL: &'static str =
        "Buy & Hold: entered at first tradable candle open, same fees";
    pub const POSITION_MODEL_STANDARD: &'static str =
        "Long-only, single position, no pyramiding";
    pub const POSITION_MODEL_DCA: &'static str = "DCA additive";
    pub const ANNUALIZATION_FACTOR: u32 = 365;
    pub const RISK_FREE_RATE: f64 = 0.0;
}

/// Buy-and-hold benchmark summary. The per-candle benchmark equity lives on
/// the equity points.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkSummary {
    pub total_return: f64,
    pub final_equity: f64,
}

/// Complete output of one backtest run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub config: BacktestConfig,
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<EquityPoint>,
    pub metrics: PerformanceMetrics,
    pub benchmark: BenchmarkSummary,
    /// Every pre-computed indicator series, keyed by canonical spec key.
    pub indicator_data: std::collections::BTreeMap<String, Vec<Option<f64>>>,
    pub audit: AuditInfo,
    /// Set on degenerate runs (empty date range, warm-up exceeds data).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}
