//! Technical indicators
//!
//! Pure series functions. Every function returns a vector with the same
//! length as its input; leading entries that cannot be defined for the
//! given parameters are `None` (the warm-up region).

/// Simple Moving Average. Warm-up: `period - 1`.
pub fn sma(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut result = vec![None; values.len()];
    if period == 0 {
        return result;
    }

    for i in 0..values.len() {
        if i + 1 >= period {
            let sum: f64 = values[i + 1 - period..=i].iter().sum();
            result[i] = Some(sum / period as f64);
        }
    }

    result
}

/// Exponential Moving Average seeded with the SMA of the first `period`
/// values. Warm-up: `period - 1`.
pub fn ema(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut result = vec![None; values.len()];
    if period == 0 || values.len() < period {
        return result;
    }

    let multiplier = 2.0 / (period as f64 + 1.0);
    let seed: f64 = values[0..period].iter().sum::<f64>() / period as f64;
    let mut ema_value = seed;
    result[period - 1] = Some(seed);

    for i in period..values.len() {
        ema_value = values[i] * multiplier + ema_value * (1.0 - multiplier);
        result[i] = Some(ema_value);
    }

    result
}

/// Relative Strength Index with Wilder smoothing. Warm-up: `period`
/// (needs `period + 1` values for the first reading).
pub fn rsi(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let n = values.len();
    let mut result = vec![None; n];
    if period == 0 || n < period + 1 {
        return result;
    }

    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    for i in 1..=period {
        let change = values[i] - values[i - 1];
        if change > 0.0 {
            avg_gain += change;
        } else {
            avg_loss += -change;
        }
    }
    avg_gain /= period as f64;
    avg_loss /= period as f64;
    result[period] = Some(rsi_from_averages(avg_gain, avg_loss));

    for i in period + 1..n {
        let change = values[i] - values[i - 1];
        let gain = if change > 0.0 { change } else { 0.0 };
        let loss = if change < 0.0 { -change } else { 0.0 };
        avg_gain = (avg_gain * (period as f64 - 1.0) + gain) / period as f64;
        avg_loss = (avg_loss * (period as f64 - 1.0) + loss) / period as f64;
        result[i] = Some(rsi_from_averages(avg_gain, avg_loss));
    }

    result
}

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        100.0
    } else {
        let rs = avg_gain / avg_loss;
        100.0 - 100.0 / (1.0 + rs)
    }
}

/// MACD line, signal and histogram.
///
/// The signal line is an EMA over the compacted sequence of defined line
/// values, re-expanded to the original indices, so its warm-up is
/// `(slow - 1) + (signal - 1)`.
pub fn macd(
    values: &[f64],
    fast: usize,
    slow: usize,
    signal: usize,
) -> (Vec<Option<f64>>, Vec<Option<f64>>, Vec<Option<f64>>) {
    let n = values.len();
    let ema_fast = ema(values, fast);
    let ema_slow = ema(values, slow);

    let mut line = vec![None; n];
    for i in 0..n {
        if let (Some(f), Some(s)) = (ema_fast[i], ema_slow[i]) {
            line[i] = Some(f - s);
        }
    }

    let compact: Vec<f64> = line.iter().filter_map(|&v| v).collect();
    let signal_compact = ema(&compact, signal);

    let mut signal_series = vec![None; n];
    let mut j = 0;
    for i in 0..n {
        if line[i].is_some() {
            signal_series[i] = signal_compact[j];
            j += 1;
        }
    }

    let mut histogram = vec![None; n];
    for i in 0..n {
        if let (Some(l), Some(s)) = (line[i], signal_series[i]) {
            histogram[i] = Some(l - s);
        }
    }

    (line, signal_series, histogram)
}

/// Bollinger Bands around an SMA middle, using the population standard
/// deviation of the window. Warm-up: `period - 1`.
pub fn bollinger_bands(
    values: &[f64],
    period: usize,
    num_std: f64,
) -> (Vec<Option<f64>>, Vec<Option<f64>>, Vec<Option<f64>>) {
    let middle = sma(values, period);
    let mut upper = vec![None; values.len()];
    let mut lower = vec![None; values.len()];

    for i in 0..values.len() {
        if let Some(mid) = middle[i] {
            let window = &values[i + 1 - period..=i];
            let variance: f64 = window
                .iter()
                .map(|&x| {
                    let diff = x - mid;
                    diff * diff
                })
                .sum::<f64>()
                / period as f64;
            let std_dev = variance.sqrt();

            upper[i] = Some(mid + num_std * std_dev);
            lower[i] = Some(mid - num_std * std_dev);
        }
    }

    (upper, middle, lower)
}

/// True Range series. Index 0 falls back to `high - low` (there is no
/// previous close); the ATR warm-up only ever consumes indices `1..`.
pub fn true_range(high: &[f64], low: &[f64], close: &[f64]) -> Vec<f64> {
    let n = high.len();
    let mut result = vec![0.0; n];
    if n == 0 {
        return result;
    }

    result[0] = high[0] - low[0];
    for i in 1..n {
        let prev_close = close[i - 1];
        result[i] = (high[i] - low[i])
            .max((high[i] - prev_close).abs())
            .max((low[i] - prev_close).abs());
    }

    result
}

/// Average True Range with Wilder smoothing: first value at index `period`
/// is the arithmetic mean of `TR[1..=period]`. Warm-up: `period`.
pub fn atr(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<Option<f64>> {
    let n = high.len();
    let mut result = vec![None; n];
    if period == 0 || n < period + 1 {
        return result;
    }

    let tr = true_range(high, low, close);
    let mut value = tr[1..=period].iter().sum::<f64>() / period as f64;
    result[period] = Some(value);

    for i in period + 1..n {
        value = (value * (period as f64 - 1.0) + tr[i]) / period as f64;
        result[i] = Some(value);
    }

    result
}

/// Percentage change over `period` candles. Missing when the base value is
/// zero. Warm-up: `period`.
pub fn pct_change(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let n = values.len();
    let mut result = vec![None; n];
    if period == 0 {
        return result;
    }

    for i in period..n {
        let base = values[i - period];
        if base != 0.0 {
            result[i] = Some((values[i] - base) / base * 100.0);
        }
    }

    result
}
