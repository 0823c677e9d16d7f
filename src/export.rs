//! Trade-log export
//!
//! The CSV column order and formatting are a stable contract consumed by
//! external dashboards: numeric fields carry two decimals and the exit
//! reason is always quoted with embedded double-quotes doubled, so the
//! rows are written by hand rather than through a generic writer.

use std::fmt::Write as _;

use crate::types::Trade;

pub const TRADE_CSV_HEADER: &str =
    "ID,Entry Date,Entry Price,Exit Date,Exit Price,P&L ($),P&L (%),Holding Days,Exit Reason,Position Size";

/// Render one trade as a CSV row.
fn write_row(out: &mut String, trade: &Trade) {
    let reason = trade.exit_reason.replace('"', "\"\"");
    let _ = writeln!(
        out,
        "{},{},{:.2},{},{:.2},{:.2},{:.2},{},\"{}\",{:.2}",
        trade.id,
        trade.entry_date,
        trade.entry_price,
        trade.exit_date,
        trade.exit_price,
        trade.pnl_abs,
        trade.pnl_pct,
        trade.holding_days,
        reason,
        trade.position_size,
    );
}

/// Render the full trade log, header included.
pub fn trades_to_csv(trades: &[Trade]) -> String {
    let mut out = String::with_capacity(64 * (trades.len() + 1));
    out.push_str(TRADE_CSV_HEADER);
    out.push('\n');
    for trade in trades {
        write_row(&mut out, trade);
    }
    out
}
