//! Validate command implementation

use anyhow::{Context, Result};
use crypto_backtest::rules::{decode_share_code, validate_rule_set, StrategyRuleSet};

pub fn run(rules_path: Option<String>, share_code: Option<String>) -> Result<()> {
    let rules: StrategyRuleSet = match (rules_path, share_code) {
        (Some(path), None) => {
            let contents =
                std::fs::read_to_string(&path).context("Failed to read rule-set file")?;
            serde_json::from_str(&contents).context("Failed to parse rule-set JSON")?
        }
        (None, Some(code)) => match decode_share_code(&code) {
            Ok(rules) => rules,
            Err(e) => {
                println!("INVALID: {}", e);
                std::process::exit(1);
            }
        },
        _ => anyhow::bail!("Provide exactly one of --rules or --share-code"),
    };

    let report = validate_rule_set(&rules);
    for error in &report.errors {
        println!("error: {}", error);
    }
    for warning in &report.warnings {
        println!("warning: {}", warning);
    }

    if report.is_valid() {
        println!("OK: rule set '{}' is valid", rules.name);
        Ok(())
    } else {
        anyhow::bail!("rule set failed validation with {} error(s)", report.errors.len())
    }
}
