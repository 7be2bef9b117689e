//! Chart metadata tables.
//!
//! The logical schema is a flat map `filename -> {created_at, last_accessed}`.
//! Two backends implement it:
//! - [`JsonMetadataTable`]: a single JSON object file. Every
//!   read-modify-write holds an exclusive lock on a sidecar `.lock` file and
//!   replaces the table atomically (temp file + rename). A table that does
//!   not parse is reported as [`MetadataError::Corrupt`] and only
//!   [`MetadataTable::clear`] replaces it, keeping the bad file as `.corrupt`.
//! - [`SqliteMetadataTable`]: one row per chart with upserts.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use fs2::FileExt;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::warn;

use crate::domain::{ChartRecord, ChartTable};

/// Typed failures of a metadata table
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("Chart metadata at {} is corrupt: {message}", .path.display())]
    Corrupt { path: PathBuf, message: String },
}

impl MetadataError {
    /// Whether `err` (anywhere in its chain) is a corrupt-table error
    pub fn is_corrupt(err: &anyhow::Error) -> bool {
        err.chain()
            .any(|cause| matches!(cause.downcast_ref::<Self>(), Some(Self::Corrupt { .. })))
    }
}

/// Storage backend for chart metadata
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetadataBackend {
    #[default]
    Json,
    Sqlite,
}

impl MetadataBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Sqlite => "sqlite",
        }
    }
}

/// Persistent chart metadata; every method is atomic with respect to the others
pub trait MetadataTable: Send + Sync {
    /// Snapshot of the whole table
    fn load(&self) -> Result<ChartTable>;

    /// Insert or replace the record for `filename`
    fn upsert(&self, filename: &str, record: &ChartRecord) -> Result<()>;

    /// Set `last_accessed` if the record exists; returns whether it did
    fn touch(&self, filename: &str, last_accessed: &str) -> Result<bool>;

    /// Drop every record matching `predicate`; returns the dropped filenames
    fn remove_where(&self, predicate: &dyn Fn(&str, &ChartRecord) -> bool) -> Result<Vec<String>>;

    /// Drop all records; the one write allowed on a corrupt table
    fn clear(&self) -> Result<()>;

    /// Files backing this table, which must never be treated as charts
    fn backing_files(&self) -> Vec<PathBuf>;
}

/// Open the table for `backend` at `path`
pub fn open_table(backend: MetadataBackend, path: &Path) -> Result<Box<dyn MetadataTable>> {
    Ok(match backend {
        MetadataBackend::Json => Box::new(JsonMetadataTable::new(path)),
        MetadataBackend::Sqlite => Box::new(SqliteMetadataTable::open(path)?),
    })
}

// ============================================================================
// JSON file
// ============================================================================

/// Metadata table stored as one JSON object
pub struct JsonMetadataTable {
    path: PathBuf,
    lock_path: PathBuf,
    corrupt_path: PathBuf,
}

impl JsonMetadataTable {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let sidecar = |suffix: &str| {
            let mut name = path.file_name().unwrap_or_default().to_os_string();
            name.push(suffix);
            path.with_file_name(name)
        };
        let lock_path = sidecar(".lock");
        let corrupt_path = sidecar(".corrupt");
        Self {
            path,
            lock_path,
            corrupt_path,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn parent(&self) -> &Path {
        self.path.parent().unwrap_or(Path::new("."))
    }

    /// Acquire the sidecar lock; released when the returned file is dropped
    fn lock(&self, exclusive: bool) -> Result<File> {
        fs::create_dir_all(self.parent()).with_context(|| {
            format!("Failed to create metadata directory: {}", self.parent().display())
        })?;
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_path)
            .with_context(|| format!("Failed to open lock file: {}", self.lock_path.display()))?;
        let locked = if exclusive {
            file.lock_exclusive()
        } else {
            FileExt::lock_shared(&file)
        };
        locked.context("Failed to acquire metadata lock")?;
        Ok(file)
    }

    /// Read the table; a missing or blank file is empty
    fn read_unlocked(&self) -> Result<ChartTable> {
        if !self.path.exists() {
            return Ok(ChartTable::new());
        }
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read metadata: {}", self.path.display()))?;
        if content.trim().is_empty() {
            return Ok(ChartTable::new());
        }
        serde_json::from_str(&content).map_err(|e| {
            warn!(path = %self.path.display(), error = %e, "Malformed chart metadata");
            anyhow::Error::from(MetadataError::Corrupt {
                path: self.path.clone(),
                message: e.to_string(),
            })
        })
    }

    fn write_unlocked(&self, table: &ChartTable) -> Result<()> {
        let temp = NamedTempFile::new_in(self.parent())
            .context("Failed to create temporary metadata file")?;
        {
            let mut writer = BufWriter::new(temp.as_file());
            serde_json::to_writer_pretty(&mut writer, table)
                .context("Failed to serialize chart metadata")?;
            writer.flush().context("Failed to flush chart metadata")?;
        }
        temp.persist(&self.path)
            .with_context(|| format!("Failed to replace metadata: {}", self.path.display()))?;
        Ok(())
    }

    /// Read-modify-write under the exclusive lock
    fn update<T>(&self, apply: impl FnOnce(&mut ChartTable) -> T) -> Result<T> {
        let _lock = self.lock(true)?;
        let mut table = self.read_unlocked()?;
        let outcome = apply(&mut table);
        self.write_unlocked(&table)?;
        Ok(outcome)
    }
}

impl MetadataTable for JsonMetadataTable {
    fn load(&self) -> Result<ChartTable> {
        let _lock = self.lock(false)?;
        self.read_unlocked()
    }

    fn upsert(&self, filename: &str, record: &ChartRecord) -> Result<()> {
        self.update(|table| {
            table.insert(filename.to_string(), record.clone());
        })
    }

    fn touch(&self, filename: &str, last_accessed: &str) -> Result<bool> {
        self.update(|table| match table.get_mut(filename) {
            Some(record) => {
                record.last_accessed = last_accessed.to_string();
                true
            }
            None => false,
        })
    }

    fn remove_where(&self, predicate: &dyn Fn(&str, &ChartRecord) -> bool) -> Result<Vec<String>> {
        self.update(|table| {
            let doomed: Vec<String> = table
                .iter()
                .filter(|(name, record)| predicate(name, record))
                .map(|(name, _)| name.clone())
                .collect();
            for name in &doomed {
                table.remove(name);
            }
            doomed
        })
    }

    fn clear(&self) -> Result<()> {
        let _lock = self.lock(true)?;
        if let Err(e) = self.read_unlocked() {
            if !MetadataError::is_corrupt(&e) {
                return Err(e);
            }
            fs::rename(&self.path, &self.corrupt_path).with_context(|| {
                format!("Failed to move aside corrupt metadata: {}", self.path.display())
            })?;
            warn!(path = %self.corrupt_path.display(), "Corrupt chart metadata moved aside");
        }
        self.write_unlocked(&ChartTable::new())
    }

    fn backing_files(&self) -> Vec<PathBuf> {
        vec![
            self.path.clone(),
            self.lock_path.clone(),
            self.corrupt_path.clone(),
        ]
    }
}

// ============================================================================
// SQLite
// ============================================================================

const SCHEMA_SQL: &str = "CREATE TABLE IF NOT EXISTS charts (
    filename TEXT PRIMARY KEY,
    created_at TEXT NOT NULL,
    last_accessed TEXT NOT NULL
)";

/// Metadata table stored in SQLite
pub struct SqliteMetadataTable {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl SqliteMetadataTable {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create metadata directory: {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open metadata database: {}", path.display()))?;
        Self::init(conn, Some(path.to_path_buf()))
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::init(conn, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> Result<Self> {
        conn.execute_batch(SCHEMA_SQL)
            .context("Failed to create metadata schema")?;
        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    fn with_conn<T>(&self, apply: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|_| anyhow!("metadata connection mutex poisoned"))?;
        apply(&mut conn)
    }
}

fn read_rows(conn: &Connection) -> Result<ChartTable> {
    let mut statement = conn.prepare("SELECT filename, created_at, last_accessed FROM charts")?;
    let rows = statement.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            ChartRecord {
                created_at: row.get(1)?,
                last_accessed: row.get(2)?,
            },
        ))
    })?;
    let mut table = ChartTable::new();
    for row in rows {
        let (filename, record) = row?;
        table.insert(filename, record);
    }
    Ok(table)
}

impl MetadataTable for SqliteMetadataTable {
    fn load(&self) -> Result<ChartTable> {
        self.with_conn(|conn| read_rows(conn))
    }

    fn upsert(&self, filename: &str, record: &ChartRecord) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO charts (filename, created_at, last_accessed) VALUES (?1, ?2, ?3)
                 ON CONFLICT(filename) DO UPDATE SET
                   created_at = excluded.created_at,
                   last_accessed = excluded.last_accessed",
                params![filename, record.created_at, record.last_accessed],
            )
            .context("Failed to upsert chart metadata")?;
            Ok(())
        })
    }

    fn touch(&self, filename: &str, last_accessed: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn
                .execute(
                    "UPDATE charts SET last_accessed = ?2 WHERE filename = ?1",
                    params![filename, last_accessed],
                )
                .context("Failed to update chart access time")?;
            Ok(changed > 0)
        })
    }

    fn remove_where(&self, predicate: &dyn Fn(&str, &ChartRecord) -> bool) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let doomed: Vec<String> = read_rows(&tx)?
                .iter()
                .filter(|(name, record)| predicate(name, record))
                .map(|(name, _)| name.clone())
                .collect();
            for name in &doomed {
                tx.execute("DELETE FROM charts WHERE filename = ?1", params![name])?;
            }
            tx.commit().context("Failed to commit metadata removal")?;
            Ok(doomed)
        })
    }

    fn clear(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM charts", [])
                .context("Failed to clear chart metadata")?;
            Ok(())
        })
    }

    fn backing_files(&self) -> Vec<PathBuf> {
        let Some(path) = &self.path else {
            return Vec::new();
        };
        let mut files = vec![path.clone()];
        for suffix in ["-journal", "-wal", "-shm"] {
            let mut name = path.file_name().unwrap_or_default().to_os_string();
            name.push(suffix);
            files.push(path.with_file_name(name));
        }
        files
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(created: &str, accessed: &str) -> ChartRecord {
        ChartRecord {
            created_at: created.to_string(),
            last_accessed: accessed.to_string(),
        }
    }

    fn exercise(table: &dyn MetadataTable) {
        assert!(table.load().unwrap().is_empty());

        table.upsert("a.html", &record("t0", "t0")).unwrap();
        table.upsert("b.html", &record("t0", "t0")).unwrap();
        assert!(table.touch("a.html", "t1").unwrap());
        assert!(!table.touch("missing.html", "t1").unwrap());

        let loaded = table.load().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded["a.html"], record("t0", "t1"));

        let removed = table
            .remove_where(&|_, record| record.last_accessed == "t0")
            .unwrap();
        assert_eq!(removed, vec!["b.html".to_string()]);
        assert_eq!(table.load().unwrap().len(), 1);

        table.clear().unwrap();
        assert!(table.load().unwrap().is_empty());
    }

    #[test]
    fn test_json_table_operations() {
        let temp = TempDir::new().unwrap();
        let table = JsonMetadataTable::new(temp.path().join("chart_metadata.json"));
        exercise(&table);
        assert!(table.path().exists());
    }

    #[test]
    fn test_sqlite_table_operations() {
        let table = SqliteMetadataTable::open_in_memory().unwrap();
        exercise(&table);

        let temp = TempDir::new().unwrap();
        let table = SqliteMetadataTable::open(&temp.path().join("charts.db")).unwrap();
        exercise(&table);
    }

    #[test]
    fn test_json_table_file_shape() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("chart_metadata.json");
        let table = JsonMetadataTable::new(&path);
        table
            .upsert("c.html", &record("2024-01-01T00:00:00", "2024-01-01T00:00:00"))
            .unwrap();

        let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["c.html"]["created_at"], "2024-01-01T00:00:00");
        assert_eq!(json["c.html"]["last_accessed"], "2024-01-01T00:00:00");
    }

    #[test]
    fn test_malformed_json_table_is_corrupt_until_cleared() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("chart_metadata.json");
        fs::write(&path, "{not json").unwrap();
        let table = JsonMetadataTable::new(&path);

        let err = table.load().unwrap_err();
        assert!(MetadataError::is_corrupt(&err));

        // writes refuse to replace the corrupt table
        let err = table.upsert("d.html", &record("t", "t")).unwrap_err();
        assert!(MetadataError::is_corrupt(&err));
        assert_eq!(fs::read_to_string(&path).unwrap(), "{not json");

        table.clear().unwrap();
        assert!(table.load().unwrap().is_empty());
        let kept = temp.path().join("chart_metadata.json.corrupt");
        assert_eq!(fs::read_to_string(kept).unwrap(), "{not json");

        table.upsert("d.html", &record("t", "t")).unwrap();
        assert_eq!(table.load().unwrap().len(), 1);
    }

    #[test]
    fn test_io_errors_are_not_corruption() {
        let err = anyhow!("disk on fire");
        assert!(!MetadataError::is_corrupt(&err));
    }

    #[test]
    fn test_lock_file_is_a_sidecar() {
        let table = JsonMetadataTable::new("/data/chart_metadata.json");
        assert_eq!(
            table.backing_files(),
            vec![
                PathBuf::from("/data/chart_metadata.json"),
                PathBuf::from("/data/chart_metadata.json.lock"),
                PathBuf::from("/data/chart_metadata.json.corrupt")
            ]
        );
    }

    #[test]
    fn test_backend_names() {
        let backend: MetadataBackend = serde_yaml::from_str("sqlite").unwrap();
        assert_eq!(backend, MetadataBackend::Sqlite);
        assert_eq!(MetadataBackend::default().as_str(), "json");
    }
}
