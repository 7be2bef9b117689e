//! Configuration for insights.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (INSIGHTS_HOME, INSIGHTS_CHARTS_DIR)
//! 2. Config file (.insights/config.yaml)
//! 3. Defaults (~/.insights)
//!
//! Config file discovery:
//! - Searches current directory and parents for .insights/config.yaml
//! - Paths in config file are relative to the .insights/ directory

pub mod paths;

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::artifact_store::ChartPolicy;
use crate::core::metadata::MetadataBackend;
use crate::core::safety::ExecutionLimits;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub charts: Option<ChartsConfig>,
    #[serde(default)]
    pub execution: Option<ExecutionConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// Engine state directory
    pub home: Option<String>,
    /// Directory holding exported chart files
    pub charts: Option<String>,
    /// Chart metadata table (JSON file or SQLite database)
    pub metadata: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChartsConfig {
    pub ttl_seconds: Option<u64>,
    pub static_base: Option<String>,
    pub metadata_backend: Option<MetadataBackend>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExecutionConfig {
    pub executor: Option<ExecutorKind>,
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    pub timeout_seconds: Option<u64>,
    pub max_code_bytes: Option<u64>,
    pub max_output_bytes: Option<u64>,
    pub max_steps: Option<u64>,
    pub denylist_patterns: Option<Vec<String>>,
}

/// Which executor runs generated code
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutorKind {
    #[default]
    Embedded,
    Process,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedConfig {
    /// Absolute path to insights home (engine state)
    pub home: PathBuf,
    /// Directory holding exported chart files
    pub charts_dir: PathBuf,
    /// Chart metadata table
    pub metadata_path: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    pub charts: ChartSettings,
    pub execution: ExecutionSettings,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ChartSettings {
    pub policy: ChartPolicy,
    pub metadata_backend: MetadataBackend,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionSettings {
    pub executor: ExecutorKind,
    /// Interpreter command for the process executor
    pub command: String,
    pub args: Vec<String>,
    pub limits: ExecutionLimits,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            executor: ExecutorKind::Embedded,
            command: "python3".to_string(),
            args: Vec::new(),
            limits: ExecutionLimits::default(),
        }
    }
}

impl ChartSettings {
    fn from_file(config: Option<&ChartsConfig>) -> Self {
        let mut settings = Self::default();
        if let Some(charts) = config {
            if let Some(ttl) = charts.ttl_seconds {
                settings.policy.ttl_seconds = ttl;
            }
            if let Some(ref base) = charts.static_base {
                settings.policy.static_base = base.clone();
            }
            if let Some(backend) = charts.metadata_backend {
                settings.metadata_backend = backend;
            }
        }
        settings
    }
}

impl ExecutionSettings {
    fn from_file(config: Option<&ExecutionConfig>) -> Self {
        let mut settings = Self::default();
        let Some(execution) = config else {
            return settings;
        };
        if let Some(executor) = execution.executor {
            settings.executor = executor;
        }
        if let Some(ref command) = execution.command {
            settings.command = command.clone();
        }
        settings.args = execution.args.clone();

        let limits = &mut settings.limits;
        if let Some(timeout) = execution.timeout_seconds {
            limits.timeout_seconds = timeout;
        }
        if let Some(max) = execution.max_code_bytes {
            limits.max_code_bytes = max;
        }
        if let Some(max) = execution.max_output_bytes {
            limits.max_output_bytes = max;
        }
        if let Some(max) = execution.max_steps {
            limits.max_steps = max;
        }
        if let Some(ref patterns) = execution.denylist_patterns {
            limits.denylist_patterns = patterns.clone();
        }
        settings
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(paths::CONFIG_FILE);
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config file's directory
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

fn default_metadata_file(backend: MetadataBackend) -> &'static str {
    match backend {
        MetadataBackend::Json => paths::JSON_METADATA_FILE,
        MetadataBackend::Sqlite => paths::SQLITE_METADATA_FILE,
    }
}

/// Resolve paths and settings from an optional parsed config file
fn resolve(config_file: Option<(PathBuf, ConfigFile)>, default_home: PathBuf) -> ResolvedConfig {
    let env_home = std::env::var("INSIGHTS_HOME").ok().map(PathBuf::from);
    let env_charts = std::env::var("INSIGHTS_CHARTS_DIR").ok().map(PathBuf::from);

    let Some((config_path, config)) = config_file else {
        // No config file - use env vars or defaults
        let home = env_home.unwrap_or(default_home);
        let charts = ChartSettings::default();
        return ResolvedConfig {
            charts_dir: env_charts.unwrap_or_else(|| home.join(paths::CHARTS_SUBDIR)),
            metadata_path: home.join(default_metadata_file(charts.metadata_backend)),
            home,
            config_file: None,
            charts,
            execution: ExecutionSettings::default(),
        };
    };

    // Relative paths are resolved against .insights/
    let insights_dir = config_path.parent().unwrap_or(Path::new(".")).to_path_buf();

    let home = env_home
        .or_else(|| {
            config
                .paths
                .home
                .as_ref()
                .map(|home| resolve_path(&insights_dir, home))
        })
        .unwrap_or(default_home);

    let charts_dir = env_charts
        .or_else(|| {
            config
                .paths
                .charts
                .as_ref()
                .map(|charts| resolve_path(&insights_dir, charts))
        })
        .unwrap_or_else(|| home.join(paths::CHARTS_SUBDIR));

    let charts = ChartSettings::from_file(config.charts.as_ref());
    let metadata_path = config
        .paths
        .metadata
        .as_ref()
        .map(|metadata| resolve_path(&insights_dir, metadata))
        .unwrap_or_else(|| home.join(default_metadata_file(charts.metadata_backend)));

    ResolvedConfig {
        home,
        charts_dir,
        metadata_path,
        config_file: Some(config_path),
        charts,
        execution: ExecutionSettings::from_file(config.execution.as_ref()),
    }
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    // Default home directory
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".insights");

    let config_file = match find_config_file() {
        Some(path) => {
            let config = load_config_file(&path)?;
            Some((path, config))
        }
        None => None,
    };

    Ok(resolve(config_file, default_home))
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| e.to_string()));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

/// Force reload configuration (useful for testing)
pub fn reload_config() -> Result<ResolvedConfig> {
    load_config()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_without_file() {
        let home = PathBuf::from("/tmp/insights-test-home");
        let config = resolve(None, home.clone());

        if std::env::var("INSIGHTS_HOME").is_err() && std::env::var("INSIGHTS_CHARTS_DIR").is_err() {
            assert_eq!(config.home, home);
            assert_eq!(config.charts_dir, home.join(paths::CHARTS_SUBDIR));
            assert_eq!(config.metadata_path, home.join("chart_metadata.json"));
        }
        assert!(config.config_file.is_none());
        assert_eq!(config.charts.policy.ttl_seconds, 360);
        assert_eq!(config.execution.executor, ExecutorKind::Embedded);
    }

    #[test]
    fn test_config_file_parsing() {
        let temp = TempDir::new().unwrap();
        let insights_dir = temp.path().join(".insights");
        std::fs::create_dir_all(&insights_dir).unwrap();

        let config_path = insights_dir.join("config.yaml");
        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(
            file,
            r#"
version: "1.0"
paths:
  home: ./
  charts: ../static/charts
charts:
  ttl_seconds: 900
  static_base: /static/charts/
  metadata_backend: sqlite
execution:
  executor: process
  command: python3
  args: ["runner.py"]
  timeout_seconds: 5
"#
        )
        .unwrap();

        let config = load_config_file(&config_path).unwrap();
        assert_eq!(config.version, "1.0");
        assert_eq!(config.paths.home, Some("./".to_string()));
        assert_eq!(config.paths.charts, Some("../static/charts".to_string()));

        let charts = ChartSettings::from_file(config.charts.as_ref());
        assert_eq!(charts.policy.ttl_seconds, 900);
        assert_eq!(charts.policy.static_base, "/static/charts/");
        assert_eq!(charts.metadata_backend, MetadataBackend::Sqlite);

        let execution = ExecutionSettings::from_file(config.execution.as_ref());
        assert_eq!(execution.executor, ExecutorKind::Process);
        assert_eq!(execution.args, vec!["runner.py"]);
        assert_eq!(execution.limits.timeout_seconds, 5);
        assert_eq!(execution.limits.max_steps, 1_000_000);
    }

    #[test]
    fn test_metadata_defaults_follow_backend() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join(".insights").join("config.yaml");
        let config: ConfigFile = serde_yaml::from_str(
            "version: \"1.0\"\npaths:\n  home: /srv/insights\ncharts:\n  metadata_backend: sqlite\n",
        )
        .unwrap();

        let resolved = resolve(Some((config_path, config)), PathBuf::from("/unused"));
        if std::env::var("INSIGHTS_HOME").is_err() {
            assert_eq!(resolved.home, PathBuf::from("/srv/insights"));
            assert_eq!(
                resolved.metadata_path,
                PathBuf::from("/srv/insights/chart_metadata.db")
            );
        }
        assert!(resolved.config_file.is_some());
    }

    #[test]
    fn test_resolve_relative_path() {
        let base = PathBuf::from("/home/user/project/.insights");

        assert_eq!(
            resolve_path(&base, "./charts"),
            PathBuf::from("/home/user/project/.insights/charts")
        );
        assert_eq!(
            resolve_path(&base, "/absolute/path"),
            PathBuf::from("/absolute/path")
        );
    }
}
