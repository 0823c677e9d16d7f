//! Data loading and validation
//!
//! Loads daily OHLCV series from CSV files with a
//! `date,open,high,low,close,volume` layout and checks them for the
//! consistency the engine assumes.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::path::Path;
use tracing::info;

use crate::types::Candle;

/// Load an OHLCV series from a CSV file. Expects a header row followed by
/// `date,open,high,low,close,volume` records with ISO dates.
pub fn load_csv(path: impl AsRef<Path>) -> Result<Vec<Candle>> {
    let mut reader = csv::Reader::from_path(path.as_ref()).context("Failed to open CSV file")?;

    let mut candles = Vec::new();

    for (row_idx, result) in reader.records().enumerate() {
        let record = result.context(format!("Failed to read row {}", row_idx + 1))?;

        let date_str = record.get(0).context("Missing date column")?;
        let date: NaiveDate = date_str
            .parse()
            .context(format!("Failed to parse date: {}", date_str))?;

        let open: f64 = record
            .get(1)
            .context("Missing open column")?
            .parse()
            .context("Failed to parse open")?;
        let high: f64 = record
            .get(2)
            .context("Missing high column")?
            .parse()
            .context("Failed to parse high")?;
        let low: f64 = record
            .get(3)
            .context("Missing low column")?
            .parse()
            .context("Failed to parse low")?;
        let close: f64 = record
            .get(4)
            .context("Missing close column")?
            .parse()
            .context("Failed to parse close")?;
        let volume: f64 = record
            .get(5)
            .context("Missing volume column")?
            .parse()
            .context("Failed to parse volume")?;

        candles.push(Candle {
            date,
            open,
            high,
            low,
            close,
            volume,
        });
    }

    info!(
        "Loaded {} candles from {}",
        candles.len(),
        path.as_ref().display()
    );
    Ok(candles)
}

/// Validate candle data for consistency
pub fn validate_candles(candles: &[Candle]) -> ValidationResult {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if candles.is_empty() {
        errors.push("No candles provided".to_string());
        return ValidationResult { errors, warnings };
    }

    for (i, candle) in candles.iter().enumerate() {
        if let Err(e) = candle.validate() {
            errors.push(format!("Candle {} ({}): {}", i, candle.date, e));
        }

        if i > 0 {
            let prev = &candles[i - 1];
            if candle.date <= prev.date {
                errors.push(format!(
                    "Candle {}: not chronological ({} <= {})",
                    i, candle.date, prev.date
                ));
            } else if (candle.date - prev.date).num_days() > 1 {
                warnings.push(format!(
                    "Gap of {} days before candle {} ({})",
                    (candle.date - prev.date).num_days(),
                    i,
                    candle.date
                ));
            }
        }
    }

    ValidationResult { errors, warnings }
}

/// Result of data validation
#[derive(Debug)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn log(&self) {
        for error in &self.errors {
            tracing::error!("Data validation error: {}", error);
        }
        for warning in &self.warnings {
            tracing::warn!("Data validation warning: {}", warning);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(date: &str, close: f64) -> Candle {
        Candle {
            date: date.parse().unwrap(),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 1000.0,
        }
    }

    #[test]
    fn test_validate_candles_ok() {
        let candles = vec![candle("2024-01-01", 100.0), candle("2024-01-02", 101.0)];
        let result = validate_candles(&candles);
        assert!(result.is_valid());
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_validate_candles_empty() {
        let result = validate_candles(&[]);
        assert!(!result.is_valid());
    }

    #[test]
    fn test_validate_candles_out_of_order() {
        let candles = vec![candle("2024-01-02", 100.0), candle("2024-01-01", 101.0)];
        assert!(!validate_candles(&candles).is_valid());
    }

    #[test]
    fn test_validate_candles_gap_warns() {
        let candles = vec![candle("2024-01-01", 100.0), candle("2024-01-05", 101.0)];
        let result = validate_candles(&candles);
        assert!(result.is_valid());
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_validate_candles_bad_ohlc() {
        let mut bad = candle("2024-01-01", 100.0);
        bad.high = bad.low - 1.0;
        assert!(!validate_candles(&[bad]).is_valid());
    }
}
