//! Export: trade tape as CSV, metric records as JSON, and a Markdown summary.
//!
//! Exported JSON embeds the snapshot id and parameter hash so a file can be
//! traced back to the exact inputs that produced it.

use anyhow::{bail, Context, Result};
use edgelab_core::domain::Trade;
use edgelab_core::metrics::{ExpectancyMetrics, MetricsRecord};

use crate::service::MetricsResponse;

// ─── CSV export ─────────────────────────────────────────────────────

/// Export a trade list as CSV, one row per trade in the given order.
///
/// Columns: symbol, entry_index, entry_date, entry_price, entry_percentile,
/// entry_regime, exit_index, exit_date, exit_price, exit_percentile,
/// exit_reason, bars_held, holding_days, return_pct, stop_distance, truncated
pub fn export_trades_csv(trades: &[Trade]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    wtr.write_record([
        "symbol",
        "entry_index",
        "entry_date",
        "entry_price",
        "entry_percentile",
        "entry_regime",
        "exit_index",
        "exit_date",
        "exit_price",
        "exit_percentile",
        "exit_reason",
        "bars_held",
        "holding_days",
        "return_pct",
        "stop_distance",
        "truncated",
    ])?;

    for t in trades {
        wtr.write_record([
            t.symbol.as_str(),
            &t.entry_index.to_string(),
            &t.entry_date.to_string(),
            &format!("{:.6}", t.entry_price),
            &format!("{:.4}", t.entry_percentile),
            t.entry_regime.map(|r| r.as_str()).unwrap_or(""),
            &t.exit_index.to_string(),
            &t.exit_date.to_string(),
            &format!("{:.6}", t.exit_price),
            &t.exit_percentile
                .map(|p| format!("{p:.4}"))
                .unwrap_or_default(),
            t.exit_reason.as_str(),
            &t.bars_held.to_string(),
            &t.holding_days.to_string(),
            &format!("{:.6}", t.return_pct),
            &format!("{:.6}", t.stop_distance),
            &t.truncated.to_string(),
        ])?;
    }

    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

// ─── JSON export ────────────────────────────────────────────────────

/// Serialize a metrics response (record plus provenance) to pretty JSON.
pub fn export_metrics_json(response: &MetricsResponse) -> Result<String> {
    serde_json::to_string_pretty(response).context("failed to serialize metrics to JSON")
}

/// Parse a previously exported metrics response.
pub fn import_metrics_json(json: &str) -> Result<MetricsResponse> {
    let response: MetricsResponse =
        serde_json::from_str(json).context("failed to deserialize metrics JSON")?;
    if response.params_hash.as_str().is_empty() {
        bail!("metrics JSON has an empty params_hash");
    }
    Ok(response)
}

// ─── Markdown summary ───────────────────────────────────────────────

/// Human-readable summary of a metrics response.
pub fn metrics_summary(response: &MetricsResponse) -> String {
    let mut md = String::with_capacity(1024);
    md.push_str(&format!("# {} metrics\n\n", response.record.kind()));
    md.push_str("| Field | Value |\n");
    md.push_str("| --- | --- |\n");
    md.push_str(&format!("| Snapshot | {} |\n", response.snapshot_id));
    md.push_str(&format!("| Parameters | {} |\n", response.params_hash.short()));
    md.push_str(&format!(
        "| Cache | {} |\n",
        if response.cache_hit { "hit" } else { "miss" }
    ));
    md.push('\n');

    match &response.record {
        MetricsRecord::Expectancy(m) => push_expectancy(&mut md, m),
        MetricsRecord::Regime(b) => {
            md.push_str("| Regime | Trades | Win Rate | Expectancy | CI |\n");
            md.push_str("| --- | --- | --- | --- | --- |\n");
            for g in &b.groups {
                let m = &g.metrics;
                md.push_str(&format!(
                    "| {} | {} | {:.1}% | {:.4}% | [{:.4}, {:.4}] |\n",
                    g.regime,
                    m.trade_count,
                    m.win_rate * 100.0,
                    m.expectancy,
                    m.confidence_interval.lower,
                    m.confidence_interval.upper,
                ));
            }
        }
        MetricsRecord::Composite(c) => {
            md.push_str(&format!("**Score: {:.4}**\n\n", c.score));
            md.push_str("| Component | Value | Weight |\n");
            md.push_str("| --- | --- | --- |\n");
            let parts = [
                ("expectancy", c.components.expectancy, c.weights.expectancy),
                ("win_rate_pct", c.components.win_rate_pct, c.weights.win_rate),
                (
                    "time_normalized",
                    c.components.time_normalized,
                    c.weights.time_efficiency,
                ),
                (
                    "risk_normalized",
                    c.components.risk_normalized,
                    c.weights.risk_efficiency,
                ),
                ("ci_lower", c.components.ci_lower, c.weights.ci_lower),
            ];
            for (name, value, weight) in parts {
                md.push_str(&format!("| {name} | {value:.4} | {weight:.2} |\n"));
            }
        }
    }
    md
}

fn push_expectancy(md: &mut String, m: &ExpectancyMetrics) {
    let ci = &m.confidence_interval;
    md.push_str("| Metric | Value |\n");
    md.push_str("| --- | --- |\n");
    md.push_str(&format!(
        "| Trades | {} ({} W / {} L) |\n",
        m.trade_count, m.win_count, m.loss_count
    ));
    md.push_str(&format!("| Win Rate | {:.1}% |\n", m.win_rate * 100.0));
    md.push_str(&format!("| Avg Win | {:.4}% |\n", m.avg_win));
    md.push_str(&format!("| Avg Loss | {:.4}% |\n", m.avg_loss));
    md.push_str(&format!("| Expectancy | {:.4}% |\n", m.expectancy));
    md.push_str(&format!(
        "| {:.0}% CI | [{:.4}, {:.4}] |\n",
        ci.level * 100.0,
        ci.lower,
        ci.upper
    ));
    md.push_str(&format!("| Avg Holding | {:.1} days |\n", m.avg_holding_days));
    md.push_str(&format!("| Per Day | {:.4}% |\n", m.time_normalized));
    match m.risk_normalized {
        Some(r) => md.push_str(&format!("| Per Unit Risk | {r:.4} |\n")),
        None => md.push_str("| Per Unit Risk | n/a |\n"),
    }
}
