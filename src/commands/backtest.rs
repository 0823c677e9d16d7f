//! Backtest command implementation

use anyhow::{Context, Result};
use crypto_backtest::rules::{attach_warnings, validate_rule_set};
use crypto_backtest::{data, engine, export, BacktestConfig, BacktestResult};
use tracing::info;

fn fmt_ratio(value: f64) -> String {
    if value.is_infinite() {
        "∞".to_string()
    } else {
        format!("{:.2}", value)
    }
}

#[allow(clippy::too_many_arguments)]
pub fn run(
    config_path: String,
    data_path: String,
    capital_override: Option<f64>,
    start_override: Option<String>,
    end_override: Option<String>,
    export_trades: Option<String>,
    output: Option<String>,
) -> Result<()> {
    info!("Starting backtest");

    let contents =
        std::fs::read_to_string(&config_path).context("Failed to read config file")?;
    let mut config: BacktestConfig =
        serde_json::from_str(&contents).context("Failed to parse config JSON")?;
    info!("Loaded configuration from: {}", config_path);

    if let Some(capital) = capital_override {
        info!("Overriding initial capital to: ${:.2}", capital);
        config.initial_capital = capital;
    }
    if let Some(start) = start_override {
        config.start_date = start.parse().context("Invalid --start date")?;
    }
    if let Some(end) = end_override {
        config.end_date = end.parse().context("Invalid --end date")?;
    }

    let candles = data::load_csv(&data_path)
        .context(format!("Failed to load candle data from {}", data_path))?;
    let data_report = data::validate_candles(&candles);
    data_report.log();
    if !data_report.is_valid() {
        anyhow::bail!(
            "Candle data failed validation with {} error(s)",
            data_report.errors.len()
        );
    }

    // Non-blocking warnings travel with the rule set into the result.
    let rules_report = validate_rule_set(&config.rules);
    attach_warnings(&mut config.rules, &rules_report);

    info!("Running backtest...");
    let result = engine::run(&config, &candles)?;

    print_summary(&config, &result);

    if let Some(path) = export_trades {
        std::fs::write(&path, export::trades_to_csv(&result.trades))
            .context(format!("Failed to write trade log to {}", path))?;
        info!("Trade log written to {}", path);
    }

    if let Some(path) = output {
        let json = serde_json::to_string_pretty(&result)?;
        std::fs::write(&path, json).context(format!("Failed to write result to {}", path))?;
        info!("Result written to {}", path);
    }

    info!("Backtest completed successfully");
    Ok(())
}

fn print_summary(config: &BacktestConfig, result: &BacktestResult) {
    let m = &result.metrics;

    println!("\n{}", "=".repeat(60));
    println!("BACKTEST RESULTS — {} ({})", config.asset, config.timeframe);
    println!("{}", "=".repeat(60));
    if let Some(description) = &result.description {
        println!("Note:               {}", description);
    }
    println!("Initial Capital:    ${:.2}", config.initial_capital);
    println!("Total Return:       {:.2}%", m.total_return);
    println!("Annualized Return:  {:.2}%", m.annualized_return);
    println!("Sharpe Ratio:       {:.2}", m.sharpe_ratio);
    println!("Sortino Ratio:      {}", fmt_ratio(m.sortino_ratio));
    println!("Max Drawdown:       {:.2}%", m.max_drawdown);
    println!("Max DD Duration:    {} days", m.max_drawdown_duration_days);
    println!("Win Rate:           {:.2}%", m.win_rate);
    println!("Profit Factor:      {}", fmt_ratio(m.profit_factor));
    println!("Total Trades:       {}", m.total_trades);
    println!("Average Win:        {:.2}%", m.avg_win_pct);
    println!("Average Loss:       {:.2}%", m.avg_loss_pct);
    println!("Best Trade:         {:.2}%", m.best_trade_pct);
    println!("Worst Trade:        {:.2}%", m.worst_trade_pct);
    println!("Avg Holding:        {:.2} days", m.avg_holding_days);
    println!("Exposure:           {:.2}%", m.exposure_time_pct);
    println!("Buy & Hold Return:  {:.2}%", result.benchmark.total_return);
    println!("{}", "-".repeat(60));
    println!("Execution:          {}", result.audit.execution_model);
    println!("Position Model:     {}", result.audit.position_model);
    println!("Benchmark:          {}", result.audit.benchmark_model);
    println!(
        "Warm-up / Tradable: {} / {} candles",
        result.audit.warmup_candles, result.audit.tradable_candles
    );
    if let Some(date) = result.audit.dca_budget_exhausted_date {
        println!("DCA budget spent:   {}", date);
    }
    println!("{}", "=".repeat(60));
}
