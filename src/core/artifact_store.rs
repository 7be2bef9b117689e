//! Chart artifact store.
//!
//! Charts are exported as standalone HTML files into a single directory and
//! tracked in a [`MetadataTable`]. Housekeeping is best-effort: failures to
//! list or delete files are logged and skipped, never returned, because a
//! stale file is preferable to failing the request that triggered cleanup.

use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::metadata::MetadataTable;
use crate::config::paths;
use crate::domain::chart::format_timestamp;
use crate::domain::{ChartRecord, ChartSpec, ChartTable};

/// Eviction and publishing policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartPolicy {
    /// Idle time after which a chart is evicted (default: 360s)
    #[serde(default = "default_ttl")]
    pub ttl_seconds: u64,

    /// Public path prefix prepended to chart filenames
    #[serde(default = "default_static_base")]
    pub static_base: String,
}

fn default_ttl() -> u64 {
    360
} // 0.1 hour
fn default_static_base() -> String {
    paths::DEFAULT_STATIC_BASE.to_string()
}

impl Default for ChartPolicy {
    fn default() -> Self {
        Self {
            ttl_seconds: default_ttl(),
            static_base: default_static_base(),
        }
    }
}

impl ChartPolicy {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

/// Absolute form of `path` with its parent resolved; the file itself need not exist
fn resolve(path: &Path) -> Option<PathBuf> {
    let name = path.file_name()?;
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    Some(fs::canonicalize(parent).ok()?.join(name))
}

/// Chart files plus their metadata
pub struct ChartStore {
    dir: PathBuf,
    table: Box<dyn MetadataTable>,
    policy: ChartPolicy,
}

impl ChartStore {
    pub fn new(dir: impl Into<PathBuf>, table: Box<dyn MetadataTable>, policy: ChartPolicy) -> Self {
        Self {
            dir: dir.into(),
            table,
            policy,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn policy(&self) -> &ChartPolicy {
        &self.policy
    }

    /// Create the charts directory if needed (best-effort)
    pub fn ensure_dir(&self) {
        if let Err(e) = fs::create_dir_all(&self.dir) {
            warn!(dir = %self.dir.display(), error = %e, "Failed to create charts directory");
        }
    }

    /// Record a new chart with `created_at = last_accessed = now`
    pub fn record_creation(&self, filename: &str) -> Result<()> {
        self.record_creation_at(filename, Utc::now())
    }

    pub fn record_creation_at(&self, filename: &str, now: DateTime<Utc>) -> Result<()> {
        self.table
            .upsert(filename, &ChartRecord::created(now))
            .with_context(|| format!("Failed to record chart creation: {}", filename))
    }

    /// Bump `last_accessed`; unknown filenames are a no-op returning `false`
    pub fn record_access(&self, filename: &str) -> Result<bool> {
        self.record_access_at(filename, Utc::now())
    }

    pub fn record_access_at(&self, filename: &str, now: DateTime<Utc>) -> Result<bool> {
        let found = self
            .table
            .touch(filename, &format_timestamp(now))
            .with_context(|| format!("Failed to record chart access: {}", filename))?;
        if !found {
            debug!(filename, "Access recorded for unknown chart");
        }
        Ok(found)
    }

    /// Evict charts idle for longer than the policy TTL
    pub fn evict_expired(&self) -> usize {
        self.evict_expired_at(Utc::now(), self.policy.ttl())
    }

    /// Drop every record idle for longer than `ttl` at `now`, or whose
    /// timestamp does not parse, and delete its file. Returns files deleted.
    #[instrument(skip(self), fields(dir = %self.dir.display()))]
    pub fn evict_expired_at(&self, now: DateTime<Utc>, ttl: Duration) -> usize {
        // a TTL too large for chrono never expires anything
        let ttl = chrono::Duration::from_std(ttl).ok();
        let expired = match self.table.remove_where(&|_, record| match record.last_accessed_at() {
            Some(accessed) => ttl.is_some_and(|ttl| now.signed_duration_since(accessed) > ttl),
            None => true,
        }) {
            Ok(expired) => expired,
            Err(e) => {
                warn!(error = %e, "Failed to evict expired charts");
                return 0;
            }
        };

        let removed = expired
            .iter()
            .filter(|filename| self.delete_file(filename))
            .count();
        if !expired.is_empty() {
            info!(records = expired.len(), files = removed, "Evicted expired charts");
        }
        removed
    }

    /// Delete files in the charts directory that have no metadata record.
    /// Records without a file are left alone.
    #[instrument(skip(self), fields(dir = %self.dir.display()))]
    pub fn reconcile_orphans(&self) -> usize {
        let known = match self.table.load() {
            Ok(table) => table,
            Err(e) => {
                warn!(error = %e, "Failed to load chart metadata, skipping orphan cleanup");
                return 0;
            }
        };
        let protected: HashSet<PathBuf> = self
            .table
            .backing_files()
            .iter()
            .filter_map(|path| resolve(path))
            .collect();
        let dir = match fs::canonicalize(&self.dir) {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return 0,
            Err(e) => {
                warn!(error = %e, "Failed to resolve charts directory");
                return 0;
            }
        };

        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return 0,
            Err(e) => {
                warn!(error = %e, "Failed to list charts directory");
                return 0;
            }
        };

        let mut removed = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() || protected.contains(&path) {
                continue;
            }
            let Some(filename) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if known.contains_key(filename) {
                continue;
            }
            if self.delete_file(filename) {
                removed += 1;
            }
        }
        if removed > 0 {
            info!(removed, "Removed orphaned chart files");
        }
        removed
    }

    /// Wipe every chart file and all metadata
    #[instrument(skip(self), fields(dir = %self.dir.display()))]
    pub fn reset(&self) -> Result<()> {
        match fs::remove_dir_all(&self.dir) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                warn!(error = %e, "Failed to remove charts directory");
            }
        }
        self.ensure_dir();
        self.table.clear().context("Failed to clear chart metadata")?;
        info!("Charts reset");
        Ok(())
    }

    /// Write `chart` to a new uniquely named file and record its creation
    pub fn export(&self, chart: &ChartSpec) -> Result<String> {
        self.export_at(chart, Utc::now())
    }

    pub fn export_at(&self, chart: &ChartSpec, now: DateTime<Utc>) -> Result<String> {
        let filename = format!("{}.html", Uuid::new_v4());
        let path = self.dir.join(&filename);
        fs::write(&path, chart.to_html())
            .with_context(|| format!("Failed to write chart: {}", path.display()))?;
        if let Err(e) = self.record_creation_at(&filename, now) {
            self.delete_file(&filename);
            return Err(e);
        }
        debug!(%filename, kind = chart.kind.as_str(), "Chart exported");
        Ok(filename)
    }

    /// Public path under which `filename` is served
    pub fn public_path(&self, filename: &str) -> String {
        let base = &self.policy.static_base;
        if base.is_empty() || base.ends_with('/') {
            format!("{}{}", base, filename)
        } else {
            format!("{}/{}", base, filename)
        }
    }

    /// Record an access and return the public path; access failures are logged
    pub fn serve(&self, filename: &str) -> String {
        if let Err(e) = self.record_access(filename) {
            warn!(filename, error = %e, "Failed to record chart access");
        }
        self.public_path(filename)
    }

    /// Snapshot of the metadata table
    pub fn list(&self) -> Result<ChartTable> {
        self.table.load()
    }

    /// Delete a chart file; returns whether a file was removed
    fn delete_file(&self, filename: &str) -> bool {
        let path = self.dir.join(filename);
        match fs::remove_file(&path) {
            Ok(()) => true,
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to delete chart file");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::metadata::{JsonMetadataTable, SqliteMetadataTable};
    use crate::domain::ChartKind;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn json_store(temp: &TempDir) -> ChartStore {
        let table = JsonMetadataTable::new(temp.path().join("chart_metadata.json"));
        ChartStore::new(temp.path().join("charts"), Box::new(table), ChartPolicy::default())
    }

    #[test]
    fn test_default_policy() {
        let policy = ChartPolicy::default();
        assert_eq!(policy.ttl(), Duration::from_secs(360));
        assert_eq!(policy.static_base, "images/plotly_figures/html/");
    }

    #[test]
    fn test_access_keeps_creation_time() {
        let temp = TempDir::new().unwrap();
        let store = json_store(&temp);
        let created = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let accessed = Utc.with_ymd_and_hms(2024, 3, 1, 9, 3, 0).unwrap();

        store.record_creation_at("f.html", created).unwrap();
        assert!(store.record_access_at("f.html", accessed).unwrap());
        assert!(!store.record_access_at("unknown.html", accessed).unwrap());

        let table = store.list().unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table["f.html"].created_at(), Some(created));
        assert_eq!(table["f.html"].last_accessed_at(), Some(accessed));
    }

    #[test]
    fn test_export_writes_file_and_record() {
        let temp = TempDir::new().unwrap();
        let store = json_store(&temp);
        store.ensure_dir();

        let chart = ChartSpec::new(ChartKind::Bar).with_title("Sales");
        let filename = store.export(&chart).unwrap();

        assert!(filename.ends_with(".html"));
        let html = fs::read_to_string(store.dir().join(&filename)).unwrap();
        assert!(html.contains("Plotly.newPlot"));
        assert!(store.list().unwrap().contains_key(&filename));
    }

    #[test]
    fn test_public_path_joins_base() {
        let temp = TempDir::new().unwrap();
        let mut store = json_store(&temp);
        assert_eq!(store.public_path("a.html"), "images/plotly_figures/html/a.html");

        store.policy.static_base = "/static/charts".to_string();
        assert_eq!(store.public_path("a.html"), "/static/charts/a.html");
    }

    #[test]
    fn test_serve_bumps_access() {
        let temp = TempDir::new().unwrap();
        let store = json_store(&temp);
        let old = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        store.record_creation_at("s.html", old).unwrap();

        let path = store.serve("s.html");
        assert_eq!(path, "images/plotly_figures/html/s.html");
        let record = &store.list().unwrap()["s.html"];
        assert!(record.last_accessed_at().unwrap() > old);
        assert_eq!(record.created_at(), Some(old));
    }

    #[test]
    fn test_reset_wipes_everything() {
        let temp = TempDir::new().unwrap();
        let store = ChartStore::new(
            temp.path().join("charts"),
            Box::new(SqliteMetadataTable::open_in_memory().unwrap()),
            ChartPolicy::default(),
        );
        store.ensure_dir();
        store.export(&ChartSpec::new(ChartKind::Pie)).unwrap();
        fs::write(store.dir().join("stray.html"), "x").unwrap();

        store.reset().unwrap();
        assert!(store.dir().exists());
        assert_eq!(fs::read_dir(store.dir()).unwrap().count(), 0);
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_metadata_inside_charts_dir_is_not_an_orphan() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("charts");
        let table = JsonMetadataTable::new(dir.join("chart_metadata.json"));
        let store = ChartStore::new(&dir, Box::new(table), ChartPolicy::default());
        store.ensure_dir();
        store.record_creation("known.html").unwrap();
        fs::write(dir.join("known.html"), "x").unwrap();
        fs::write(dir.join("orphan.html"), "x").unwrap();

        assert_eq!(store.reconcile_orphans(), 1);
        assert!(dir.join("chart_metadata.json").exists());
        assert!(dir.join("known.html").exists());
        assert!(!dir.join("orphan.html").exists());
    }
}
