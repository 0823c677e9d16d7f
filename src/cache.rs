//! Indicator planner and cache
//!
//! Before the simulation loop runs, every distinct cacheable indicator
//! spec referenced by the rule set is computed once over the full candle
//! series and stored under its canonical key. Position-scope indicators
//! and direct candle-field reads never enter the cache.

use std::collections::BTreeMap;

use itertools::Itertools;

use crate::indicators;
use crate::rules::{ConditionGroup, IndicatorKind, IndicatorSpec, PriceSource, StrategyRuleSet};
use crate::types::Candle;

/// Pre-computed indicator series keyed by `IndicatorSpec::cache_key`.
#[derive(Debug, Clone, Default)]
pub struct IndicatorCache {
    series: BTreeMap<String, Vec<Option<f64>>>,
}

impl IndicatorCache {
    pub fn get(&self, key: &str) -> Option<&[Option<f64>]> {
        self.series.get(key).map(Vec::as_slice)
    }

    /// Cached value for `spec` at candle index `i`, if defined.
    pub fn value_at(&self, spec: &IndicatorSpec, i: usize) -> Option<f64> {
        self.series
            .get(&spec.cache_key())
            .and_then(|series| series.get(i).copied().flatten())
    }

    pub fn series(&self) -> &BTreeMap<String, Vec<Option<f64>>> {
        &self.series
    }

    pub fn into_series(self) -> BTreeMap<String, Vec<Option<f64>>> {
        self.series
    }
}

/// Extract the source series a spec reads from.
fn source_values(candles: &[Candle], source: PriceSource) -> Vec<f64> {
    match source {
        PriceSource::Open => candles.iter().map(|c| c.open).collect(),
        PriceSource::High => candles.iter().map(|c| c.high).collect(),
        PriceSource::Low => candles.iter().map(|c| c.low).collect(),
        PriceSource::Close => candles.iter().map(|c| c.close).collect(),
        PriceSource::Volume => candles.iter().map(|c| c.volume).collect(),
    }
}

/// Number of leading `None` entries the spec produces over any input.
pub fn warmup(spec: &IndicatorSpec) -> usize {
    match spec.kind {
        IndicatorKind::Sma
        | IndicatorKind::Ema
        | IndicatorKind::BbUpper
        | IndicatorKind::BbMiddle
        | IndicatorKind::BbLower => spec.effective_period() - 1,
        IndicatorKind::Rsi | IndicatorKind::Atr | IndicatorKind::PctChange => {
            spec.effective_period()
        }
        IndicatorKind::MacdLine => spec.effective_slow() - 1,
        IndicatorKind::MacdSignal | IndicatorKind::MacdHist => {
            (spec.effective_slow() - 1) + (spec.effective_signal() - 1)
        }
        _ => 0,
    }
}

/// Collect every distinct cacheable spec referenced by the rule set's
/// entry and exit groups, in first-appearance order.
pub fn collect_specs(rules: &StrategyRuleSet) -> Vec<IndicatorSpec> {
    fn group_specs(group: &ConditionGroup) -> impl Iterator<Item = &IndicatorSpec> {
        group.conditions.iter().flat_map(|condition| {
            [&condition.left, &condition.right]
                .into_iter()
                .filter_map(|operand| operand.spec())
        })
    }

    group_specs(&rules.entry)
        .chain(group_specs(&rules.exit))
        .filter(|spec| spec.is_cacheable())
        .cloned()
        .unique_by(IndicatorSpec::cache_key)
        .collect()
}

/// Longest warm-up across the collected specs.
pub fn max_warmup(specs: &[IndicatorSpec]) -> usize {
    specs.iter().map(warmup).max().unwrap_or(0)
}

/// Compute one spec's full aligned series.
pub fn compute_spec(spec: &IndicatorSpec, candles: &[Candle]) -> Vec<Option<f64>> {
    let period = spec.effective_period();
    match spec.kind {
        IndicatorKind::Sma => {
            indicators::sma(&source_values(candles, spec.effective_source()), period)
        }
        IndicatorKind::Ema => {
            indicators::ema(&source_values(candles, spec.effective_source()), period)
        }
        IndicatorKind::Rsi => {
            indicators::rsi(&source_values(candles, spec.effective_source()), period)
        }
        IndicatorKind::MacdLine | IndicatorKind::MacdSignal | IndicatorKind::MacdHist => {
            let (line, signal, histogram) = indicators::macd(
                &source_values(candles, spec.effective_source()),
                spec.effective_fast(),
                spec.effective_slow(),
                spec.effective_signal(),
            );
            match spec.kind {
                IndicatorKind::MacdLine => line,
                IndicatorKind::MacdSignal => signal,
                _ => histogram,
            }
        }
        IndicatorKind::BbUpper | IndicatorKind::BbMiddle | IndicatorKind::BbLower => {
            let (upper, middle, lower) = indicators::bollinger_bands(
                &source_values(candles, spec.effective_source()),
                period,
                spec.effective_std_dev(),
            );
            match spec.kind {
                IndicatorKind::BbUpper => upper,
                IndicatorKind::BbMiddle => middle,
                _ => lower,
            }
        }
        IndicatorKind::Atr => {
            let high: Vec<f64> = candles.iter().map(|c| c.high).collect();
            let low: Vec<f64> = candles.iter().map(|c| c.low).collect();
            let close: Vec<f64> = candles.iter().map(|c| c.close).collect();
            indicators::atr(&high, &low, &close, period)
        }
        IndicatorKind::PctChange => indicators::pct_change(
            &source_values(candles, spec.effective_source()),
            period,
        ),
        // Candle fields and position-scope types are resolved directly by
        // the evaluator and never reach the cache.
        _ => vec![None; candles.len()],
    }
}

/// Compute every collected spec once over the candle series.
pub fn precompute(specs: &[IndicatorSpec], candles: &[Candle]) -> IndicatorCache {
    let mut cache = IndicatorCache::default();
    for spec in specs {
        let key = spec.cache_key();
        if cache.series.contains_key(&key) {
            continue;
        }
        let series = compute_spec(spec, candles);
        debug_assert_eq!(series.len(), candles.len());
        cache.series.insert(key, series);
    }
    cache
}
