//! Crypto Backtest
//!
//! A deterministic, client-side backtesting engine for long-only
//! cryptocurrency strategies over daily OHLCV bars: rule-set schema and
//! validation, an indicator library with explicit warm-up contracts, a
//! signal-at-close / fill-at-next-open simulation loop with adverse
//! slippage and symmetric fees, a DCA branch, a buy-and-hold benchmark
//! under the same cost model, and a fixed battery of performance metrics.

pub mod benchmark;
pub mod cache;
pub mod data;
pub mod engine;
pub mod evaluator;
pub mod export;
pub mod indicators;
pub mod metrics;
pub mod rules;
pub mod types;

pub use engine::run;
pub use rules::{BacktestConfig, StrategyRuleSet};
pub use types::*;
