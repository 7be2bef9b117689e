//! Canonical paths for insights.
//!
//! Single source of truth - import this instead of hardcoding paths.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use insights::config::paths;
//!
//! let charts = paths::charts_dir()?;
//! let metadata = paths::metadata_path()?;
//! ```
//!
//! ## Path Ownership
//!
//! | Location | Owner | Purpose |
//! |----------|-------|---------|
//! | `insights_home()` | engine | Metadata table, default charts directory |
//! | `charts_dir()` | chart store | Exported chart files, wiped by reset |
//! | `DEFAULT_STATIC_BASE` | request layer | Public prefix for chart links |

use std::path::PathBuf;

use anyhow::Result;

// ============================================================================
// Layout (relative names)
// ============================================================================

/// Config file location, relative to a project directory
pub const CONFIG_FILE: &str = ".insights/config.yaml";

/// Charts directory name under the home directory
pub const CHARTS_SUBDIR: &str = "charts";

/// Metadata table file for the JSON backend
pub const JSON_METADATA_FILE: &str = "chart_metadata.json";

/// Metadata database file for the SQLite backend
pub const SQLITE_METADATA_FILE: &str = "chart_metadata.db";

/// Public path prefix under which chart files are served
pub const DEFAULT_STATIC_BASE: &str = "images/plotly_figures/html/";

// ============================================================================
// Resolved paths (functions - resolved at runtime)
// ============================================================================

/// Get the insights home directory (~/.insights or $INSIGHTS_HOME)
pub fn insights_home() -> Result<PathBuf> {
    Ok(crate::config::config()?.home.clone())
}

/// Get the charts directory ($INSIGHTS_CHARTS_DIR or <home>/charts)
pub fn charts_dir() -> Result<PathBuf> {
    Ok(crate::config::config()?.charts_dir.clone())
}

/// Get the chart metadata table path
pub fn metadata_path() -> Result<PathBuf> {
    Ok(crate::config::config()?.metadata_path.clone())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_config_file_is_relative() {
        let path = Path::new(CONFIG_FILE);
        assert!(path.is_relative());
        assert_eq!(path.file_name().unwrap(), "config.yaml");
    }

    #[test]
    fn test_static_base_ends_with_separator() {
        assert!(DEFAULT_STATIC_BASE.ends_with('/'));
        assert!(!DEFAULT_STATIC_BASE.starts_with('/'));
    }

    #[test]
    fn test_metadata_files_differ_by_backend() {
        assert_ne!(JSON_METADATA_FILE, SQLITE_METADATA_FILE);
        assert!(JSON_METADATA_FILE.ends_with(".json"));
    }
}
