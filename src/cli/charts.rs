//! Chart CLI subcommands for inspecting and tidying exported charts.
//!
//! Provides commands to:
//! - `list`: Show every recorded chart with its timestamps
//! - `cleanup`: Evict expired charts and delete orphaned files
//! - `reset`: Wipe the charts directory and metadata
//! - `touch`: Record an access and print the public path

use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use clap::Subcommand;

use crate::config;
use crate::core::{open_table, ChartStore};

/// Chart-related subcommands
#[derive(Subcommand, Debug)]
pub enum ChartsCommands {
    /// List recorded charts
    List,

    /// Evict expired charts and remove orphaned files
    Cleanup {
        /// Override the configured TTL (seconds)
        #[arg(long)]
        ttl: Option<u64>,
    },

    /// Delete every chart and all metadata
    Reset {
        /// Skip the confirmation notice
        #[arg(short, long)]
        yes: bool,
    },

    /// Record an access to a chart
    Touch {
        /// Chart filename (e.g. 3f2a...html)
        filename: String,
    },
}

/// Open the chart store described by the global configuration
fn open_store() -> Result<ChartStore> {
    let cfg = config::config()?;
    let table = open_table(cfg.charts.metadata_backend, &cfg.metadata_path)?;
    Ok(ChartStore::new(
        &cfg.charts_dir,
        table,
        cfg.charts.policy.clone(),
    ))
}

pub async fn execute_list() -> Result<()> {
    let store = open_store()?;
    let table = store.list()?;

    if table.is_empty() {
        println!("No charts found in {}", store.dir().display());
        return Ok(());
    }

    let now = Utc::now();
    println!(
        "{:<42} {:<28} {:<28} {:>8}",
        "FILENAME", "CREATED", "LAST ACCESSED", "IDLE"
    );
    println!("{}", "-".repeat(109));

    for (filename, record) in &table {
        let idle = record
            .last_accessed_at()
            .map(|at| format!("{}s", now.signed_duration_since(at).num_seconds()))
            .unwrap_or_else(|| "?".to_string());
        let exists = if store.dir().join(filename).is_file() { "" } else { " (missing)" };
        println!(
            "{:<42} {:<28} {:<28} {:>8}",
            format!("{}{}", filename, exists),
            record.created_at,
            record.last_accessed,
            idle
        );
    }

    println!();
    println!("{} chart(s), TTL {}s", table.len(), store.policy().ttl_seconds);
    Ok(())
}

pub async fn execute_cleanup(ttl: Option<u64>) -> Result<()> {
    let store = open_store()?;
    store.ensure_dir();

    let ttl = ttl
        .map(Duration::from_secs)
        .unwrap_or_else(|| store.policy().ttl());
    let evicted = store.evict_expired_at(Utc::now(), ttl);
    let orphans = store.reconcile_orphans();

    println!("Evicted {} expired chart(s)", evicted);
    println!("Removed {} orphaned file(s)", orphans);
    Ok(())
}

pub async fn execute_reset(yes: bool) -> Result<()> {
    let store = open_store()?;
    if !yes {
        eprintln!(
            "This deletes every file in {} and all chart metadata. Re-run with --yes to confirm.",
            store.dir().display()
        );
        std::process::exit(1);
    }

    store.reset()?;
    println!("Charts reset: {}", store.dir().display());
    Ok(())
}

pub async fn execute_touch(filename: &str) -> Result<()> {
    let store = open_store()?;
    if !store.record_access(filename)? {
        eprintln!("Chart not found: {}", filename);
        std::process::exit(1);
    }
    println!("{}", store.public_path(filename));
    Ok(())
}
