//! EdgeLab CLI: snapshot, trades, metrics and cache commands.
//!
//! Commands:
//! - `snapshot create|list|show|delete`: manage immutable data snapshots
//! - `trades`: construct trades from a snapshot, optionally as CSV
//! - `metrics`: expectancy / regime / composite metrics through the cache
//! - `cache clear`: drop cached metrics
//! - `params`: print the effective default parameters and their hash

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use edgelab_core::construction::TradeFilter;
use edgelab_core::domain::{DateRange, Regime, SnapshotId, SnapshotMeta};
use edgelab_core::metrics::MetricKind;
use edgelab_core::params::ParameterOverrides;
use edgelab_runner::{
    export_metrics_json, export_trades_csv, metrics_summary, AnalyticsService, AppConfig,
    PartialPolicy,
};
use std::path::{Path, PathBuf};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "edgelab",
    about = "EdgeLab CLI: reproducible entry/exit statistics from historical prices"
)]
struct Cli {
    /// Path to the TOML config. Defaults to ./edgelab.toml when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Snapshot management commands.
    Snapshot {
        #[command(subcommand)]
        action: SnapshotAction,
    },
    /// Construct trades from a snapshot.
    Trades {
        /// Snapshot id. Defaults to the latest snapshot.
        #[arg(long)]
        snapshot: Option<String>,

        /// Only trades for this symbol.
        #[arg(long)]
        symbol: Option<String>,

        /// Only trades entered in this regime (uptrend|downtrend).
        #[arg(long)]
        regime: Option<Regime>,

        /// Parameter overrides file (TOML or JSON).
        #[arg(long)]
        params: Option<PathBuf>,

        /// Write the trade tape as CSV to this path instead of stdout.
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Compute metrics for a snapshot.
    Metrics {
        /// Snapshot id. Defaults to the latest snapshot.
        #[arg(long)]
        snapshot: Option<String>,

        /// expectancy, regime or composite.
        #[arg(long, default_value = "expectancy")]
        kind: MetricKind,

        /// Bypass the metrics cache.
        #[arg(long, default_value_t = false)]
        no_cache: bool,

        /// Parameter overrides file (TOML or JSON).
        #[arg(long)]
        params: Option<PathBuf>,

        /// Print JSON instead of the Markdown summary.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Metrics cache commands.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Print the effective default parameters and their content hash.
    Params {
        /// Parameter overrides file (TOML or JSON) applied on top.
        #[arg(long)]
        params: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum SnapshotAction {
    /// Fetch data, compute indicator tables and persist a new snapshot.
    Create {
        /// Symbols to include (e.g., SPY QQQ IWM).
        #[arg(required = true)]
        symbols: Vec<String>,

        /// Start date (YYYY-MM-DD).
        #[arg(long)]
        start: String,

        /// End date (YYYY-MM-DD).
        #[arg(long)]
        end: String,

        /// Build a new snapshot even if an identical one exists.
        #[arg(long, default_value_t = false)]
        force: bool,

        /// Keep going when some symbols have no data, recording them as missing.
        #[arg(long, default_value_t = false)]
        allow_partial: bool,

        /// Parameter overrides file (TOML or JSON).
        #[arg(long)]
        params: Option<PathBuf>,
    },
    /// List snapshots, newest first.
    List,
    /// Show snapshot metadata. Defaults to the latest snapshot.
    Show { id: Option<String> },
    /// Delete a snapshot and its cached metrics.
    Delete { id: String },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Drop cached metrics for one snapshot, or for all with --all.
    Clear {
        #[arg(long, conflicts_with = "all")]
        snapshot: Option<String>,

        #[arg(long, default_value_t = false)]
        all: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load_or_default(cli.config.as_deref())?;
    debug!(?config, "configuration loaded");

    if let Commands::Params { params } = &cli.command {
        return run_params(&config, params.as_deref());
    }

    let svc = AnalyticsService::from_config(&config)?;

    match cli.command {
        Commands::Snapshot { action } => match action {
            SnapshotAction::Create {
                symbols,
                start,
                end,
                force,
                allow_partial,
                params,
            } => {
                let partial = allow_partial.then_some(PartialPolicy::AllowPartial);
                let range = (start.as_str(), end.as_str());
                run_snapshot_create(&svc, &symbols, range, force, partial, params.as_deref())
            }
            SnapshotAction::List => run_snapshot_list(&svc),
            SnapshotAction::Show { id } => run_snapshot_show(&svc, id),
            SnapshotAction::Delete { id } => {
                svc.delete_snapshot(&SnapshotId::new(id.clone()))?;
                println!("Deleted snapshot {id}");
                Ok(())
            }
        },
        Commands::Trades {
            snapshot,
            symbol,
            regime,
            params,
            csv,
        } => run_trades(&svc, snapshot, symbol, regime, params.as_deref(), csv.as_deref()),
        Commands::Metrics {
            snapshot,
            kind,
            no_cache,
            params,
            json,
        } => run_metrics(&svc, snapshot, kind, !no_cache, params.as_deref(), json),
        Commands::Cache { action } => match action {
            CacheAction::Clear { snapshot, all } => run_cache_clear(&svc, snapshot, all),
        },
        Commands::Params { .. } => Ok(()),
    }
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").with_context(|| format!("invalid date '{s}'"))
}

/// Read overrides from a `.json` file, or TOML for any other extension.
fn load_overrides(path: Option<&Path>) -> Result<ParameterOverrides> {
    let Some(path) = path else {
        return Ok(ParameterOverrides::default());
    };
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let overrides = if path.extension().is_some_and(|e| e == "json") {
        serde_json::from_str(&content)
            .with_context(|| format!("invalid JSON overrides in {}", path.display()))?
    } else {
        toml::from_str(&content)
            .with_context(|| format!("invalid TOML overrides in {}", path.display()))?
    };
    Ok(overrides)
}

fn resolve_snapshot(svc: &AnalyticsService, id: Option<String>) -> Result<SnapshotId> {
    match id {
        Some(id) => Ok(SnapshotId::new(id)),
        None => Ok(svc.latest_snapshot()?.meta.id.clone()),
    }
}

fn run_snapshot_create(
    svc: &AnalyticsService,
    symbols: &[String],
    (start, end): (&str, &str),
    force: bool,
    partial: Option<PartialPolicy>,
    params: Option<&Path>,
) -> Result<()> {
    let start = parse_date(start)?;
    let end = parse_date(end)?;
    let Some(range) = DateRange::new(start, end) else {
        bail!("start {start} is after end {end}");
    };
    let overrides = load_overrides(params)?;

    let created = match partial {
        Some(policy) => {
            svc.create_snapshot_with_policy(symbols, range, force, &overrides, policy, None)?
        }
        None => svc.create_snapshot(symbols, range, force, &overrides, None)?,
    };
    if created.reused {
        println!("Reused snapshot {}", created.id);
    } else {
        println!("Created snapshot {}", created.id);
    }
    println!("Parameters: {}", created.params_hash);
    Ok(())
}

fn run_snapshot_list(svc: &AnalyticsService) -> Result<()> {
    let snapshots = svc.list_snapshots()?;
    if snapshots.is_empty() {
        println!("No snapshots.");
        return Ok(());
    }
    println!(
        "{:<30} {:<23} {:<12} {}",
        "ID", "Range", "Params", "Symbols"
    );
    for meta in &snapshots {
        print_meta_row(meta);
    }
    Ok(())
}

fn print_meta_row(meta: &SnapshotMeta) {
    let mut symbols = meta.symbols.join(",");
    if meta.is_partial() {
        symbols.push_str(&format!(" (missing: {})", meta.missing_symbols.join(",")));
    }
    println!(
        "{:<30} {:<23} {:<12} {}",
        meta.id.as_str(),
        format!("{}..{}", meta.range.start, meta.range.end),
        meta.params_hash.short(),
        symbols
    );
}

fn run_snapshot_show(svc: &AnalyticsService, id: Option<String>) -> Result<()> {
    let id = resolve_snapshot(svc, id)?;
    let snapshot = svc.get_snapshot(&id)?;
    let out = serde_json::json!({
        "meta": snapshot.meta,
        "parameters": snapshot.parameters,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn run_trades(
    svc: &AnalyticsService,
    snapshot: Option<String>,
    symbol: Option<String>,
    regime: Option<Regime>,
    params: Option<&Path>,
    csv_path: Option<&Path>,
) -> Result<()> {
    let id = resolve_snapshot(svc, snapshot)?;
    let overrides = load_overrides(params)?;
    let filter = TradeFilter {
        symbol: symbol.map(|s| s.trim().to_uppercase()),
        regime,
    };
    let constructed = svc.construct_trades(&id, &filter, &overrides)?;
    let trades = constructed.all_trades();
    let csv = export_trades_csv(&trades)?;

    match csv_path {
        Some(path) => {
            std::fs::write(path, csv)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("Wrote {} trades to {}", trades.len(), path.display());
        }
        None => print!("{csv}"),
    }

    let truncated = constructed.truncated_trades().len();
    if truncated > 0 {
        eprintln!("{truncated} position(s) still open at the end of the series");
    }
    Ok(())
}

fn run_metrics(
    svc: &AnalyticsService,
    snapshot: Option<String>,
    kind: MetricKind,
    use_cache: bool,
    params: Option<&Path>,
    json: bool,
) -> Result<()> {
    let id = resolve_snapshot(svc, snapshot)?;
    let overrides = load_overrides(params)?;
    let response = svc.compute_metrics(&id, kind, use_cache, &overrides)?;
    if json {
        println!("{}", export_metrics_json(&response)?);
    } else {
        print!("{}", metrics_summary(&response));
    }
    Ok(())
}

fn run_cache_clear(svc: &AnalyticsService, snapshot: Option<String>, all: bool) -> Result<()> {
    let removed = if all {
        svc.cache().clear()
    } else {
        let id = resolve_snapshot(svc, snapshot)?;
        svc.clear_cache(&id)
    };
    println!("Removed {removed} cached metric record(s)");
    Ok(())
}

fn run_params(config: &AppConfig, params: Option<&Path>) -> Result<()> {
    let overrides = load_overrides(params)?;
    let effective = config.default_parameters()?.with_overrides(&overrides)?;
    let out = serde_json::json!({
        "params_hash": effective.compute_hash(),
        "parameters": effective,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}
