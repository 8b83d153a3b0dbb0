//! Console summary of a sweep

use std::cmp::Ordering;

use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, CellAlignment, Table};

use crate::sweep::CombinationOutcome;
use crate::types::{pattern_label, BacktestResult};

/// Sharpe ratio used for ranking; non-finite values rank as 0.
pub fn ranking_sharpe(result: &BacktestResult) -> f64 {
    if result.sharpe_ratio.is_finite() {
        result.sharpe_ratio
    } else {
        0.0
    }
}

/// Successful combination with the highest Sharpe ratio. Ties go to the
/// earliest combination in sweep order.
pub fn best_by_sharpe(outcomes: &[CombinationOutcome]) -> Option<(&CombinationOutcome, &BacktestResult)> {
    let mut best: Option<(&CombinationOutcome, &BacktestResult)> = None;
    for outcome in outcomes {
        let Some(result) = outcome.result.as_ref() else {
            continue;
        };
        match best {
            Some((_, current)) if ranking_sharpe(result) <= ranking_sharpe(current) => {}
            _ => best = Some((outcome, result)),
        }
    }
    best
}

fn fmt_pf(value: f64) -> String {
    if value.is_infinite() {
        "inf".to_string()
    } else {
        format!("{value:.2}")
    }
}

/// All combinations, best return first; failures are listed last.
pub fn results_table(outcomes: &[CombinationOutcome]) -> Table {
    let mut rows: Vec<&CombinationOutcome> = outcomes.iter().collect();
    rows.sort_by(|a, b| match (&a.result, &b.result) {
        (Some(ra), Some(rb)) => rb.return_pct.partial_cmp(&ra.return_pct).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec![
            "EMA", "Mode", "Pattern", "Trades", "Win %", "PF", "Return %", "Max DD %", "Sharpe", "Status",
        ]);

    for outcome in rows {
        let c = &outcome.combination;
        let mut row = vec![
            Cell::new(format!("{}/{}", c.ema_short, c.ema_long)),
            Cell::new(c.trading_mode),
            Cell::new(pattern_label(c.pattern_length)),
        ];
        match &outcome.result {
            Some(r) => row.extend([
                Cell::new(r.total_trades).set_alignment(CellAlignment::Right),
                Cell::new(format!("{:.2}", r.win_rate * 100.0)).set_alignment(CellAlignment::Right),
                Cell::new(fmt_pf(r.profit_factor)).set_alignment(CellAlignment::Right),
                Cell::new(format!("{:.2}", r.return_pct)).set_alignment(CellAlignment::Right),
                Cell::new(format!("{:.2}", r.max_drawdown_pct)).set_alignment(CellAlignment::Right),
                Cell::new(format!("{:.2}", r.sharpe_ratio)).set_alignment(CellAlignment::Right),
                Cell::new("ok"),
            ]),
            None => {
                row.extend((0..6).map(|_| Cell::new("-")));
                row.push(Cell::new(outcome.error.as_deref().unwrap_or("failed")));
            }
        }
        table.add_row(row);
    }
    table
}

/// Exit-reason counts with their share of all trades
pub fn exit_reason_table(result: &BacktestResult) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec!["Exit reason", "Trades", "%"]);
    for (reason, count) in &result.exit_reasons {
        let pct = if result.total_trades > 0 {
            *count as f64 / result.total_trades as f64 * 100.0
        } else {
            0.0
        };
        table.add_row(vec![
            Cell::new(reason),
            Cell::new(count).set_alignment(CellAlignment::Right),
            Cell::new(format!("{pct:.1}")).set_alignment(CellAlignment::Right),
        ]);
    }
    table
}

/// Full console report: the results table, then the best combination and
/// its exit reasons.
pub fn render_report(outcomes: &[CombinationOutcome]) -> String {
    let mut out = results_table(outcomes).to_string();
    match best_by_sharpe(outcomes) {
        Some((outcome, result)) => {
            out.push_str(&format!(
                "\n\nBest by Sharpe: {}\n  return {:.2}%  drawdown {:.2}%  win rate {:.2}%  profit factor {}  trades {}\n",
                outcome.combination,
                result.return_pct,
                result.max_drawdown_pct,
                result.win_rate * 100.0,
                fmt_pf(result.profit_factor),
                result.total_trades,
            ));
            if result.total_trades > 0 {
                out.push_str(&exit_reason_table(result).to_string());
                out.push('\n');
            }
        }
        None => out.push_str("\n\nNo combination completed successfully.\n"),
    }
    out
}
