//! Task orchestrator.
//!
//! The single entry point of the request layer. One call to
//! [`TaskOrchestrator::run`] is one analysis turn:
//! 1. load datasets the session does not hold yet
//! 2. tidy the charts directory (evict expired charts, remove orphans)
//! 3. execute the code against the session namespace
//! 4. export captured charts and record their creation

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use super::artifact_store::ChartStore;
use super::environment::{ExecutionEnvironment, ExecutionOutcome};
use super::metadata::open_table;
use super::session::Session;
use crate::adapters::{
    CodeExecutor, CsvDatasetLoader, DatasetLoader, EmbeddedExecutor, ProcessExecutor,
};
use crate::config::{ExecutorKind, ResolvedConfig};
use crate::domain::{IntermediateOutput, TaskRequest, TaskResult, TaskStatus};

/// User-input errors raised before any code runs
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    #[error("Failed to load dataset '{variable}': {message}")]
    Dataset { variable: String, message: String },
}

/// Runs analysis turns for sessions
pub struct TaskOrchestrator {
    environment: ExecutionEnvironment,
    loader: Arc<dyn DatasetLoader>,
    charts: ChartStore,
}

impl TaskOrchestrator {
    pub fn new(
        environment: ExecutionEnvironment,
        loader: Arc<dyn DatasetLoader>,
        charts: ChartStore,
    ) -> Self {
        Self {
            environment,
            loader,
            charts,
        }
    }

    /// Build the orchestrator described by `config`
    pub fn from_config(config: &ResolvedConfig) -> Result<Self> {
        let settings = &config.execution;
        let limits = settings.limits.clone();
        let executor: Arc<dyn CodeExecutor> = match settings.executor {
            ExecutorKind::Embedded => Arc::new(EmbeddedExecutor::new(limits.clone())),
            ExecutorKind::Process => Arc::new(ProcessExecutor::new(
                settings.command.clone(),
                settings.args.clone(),
                limits.clone(),
            )),
        };

        let table = open_table(config.charts.metadata_backend, &config.metadata_path)?;
        let charts = ChartStore::new(&config.charts_dir, table, config.charts.policy.clone());

        Ok(Self::new(
            ExecutionEnvironment::new(executor),
            Arc::new(CsvDatasetLoader::new(limits)),
            charts,
        ))
    }

    pub fn charts(&self) -> &ChartStore {
        &self.charts
    }

    pub fn environment(&self) -> &ExecutionEnvironment {
        &self.environment
    }

    /// Run one analysis turn for `session`.
    ///
    /// Only dataset loading can fail; a failing execution is reported through
    /// the result with the error message as its output.
    #[instrument(skip_all, fields(session = %session.id))]
    pub async fn run(
        &self,
        session: &mut Session,
        request: &TaskRequest,
    ) -> std::result::Result<TaskResult, TaskError> {
        session.begin_turn();

        let mut overlay = BTreeMap::new();
        for dataset in &request.datasets {
            let name = &dataset.variable_name;
            if session.namespace.contains(name) || overlay.contains_key(name) {
                continue;
            }
            let value = self.loader.load(dataset).await.map_err(|e| TaskError::Dataset {
                variable: name.clone(),
                message: format!("{:#}", e),
            })?;
            debug!(variable = %name, "Dataset loaded into overlay");
            overlay.insert(name.clone(), value);
        }

        self.charts.ensure_dir();
        let evicted = self.charts.evict_expired();
        let orphans = self.charts.reconcile_orphans();
        debug!(evicted, orphans, "Chart housekeeping done");

        let outcome = self
            .environment
            .execute(&mut session.namespace, &request.code, overlay)
            .await;

        let result = match outcome {
            ExecutionOutcome::Completed {
                output,
                variables,
                charts,
            } => {
                let mut filenames = Vec::with_capacity(charts.len());
                for chart in &charts {
                    match self.charts.export(chart) {
                        Ok(filename) => filenames.push(filename),
                        Err(e) => warn!(error = %e, "Failed to export chart"),
                    }
                }

                TaskResult {
                    status: TaskStatus::Completed,
                    intermediate_outputs: vec![IntermediateOutput {
                        thought: request.thought.clone(),
                        code: request.code.clone(),
                        output: output.clone(),
                    }],
                    output,
                    current_variables: variables,
                    chart_filenames: (!filenames.is_empty()).then_some(filenames),
                }
            }
            ExecutionOutcome::Failed { message } => TaskResult {
                status: TaskStatus::Failed,
                intermediate_outputs: vec![IntermediateOutput {
                    thought: request.thought.clone(),
                    code: request.code.clone(),
                    output: message.clone(),
                }],
                output: message,
                current_variables: BTreeMap::new(),
                chart_filenames: None,
            },
        };

        info!(
            status = ?result.status,
            charts = result.chart_count(),
            turn = session.turns,
            "Task finished"
        );
        Ok(result)
    }

    /// Record an access for each chart and return their public paths
    pub fn publish(&self, filenames: &[String]) -> Vec<String> {
        filenames
            .iter()
            .map(|filename| self.charts.serve(filename))
            .collect()
    }

    /// Wipe all charts and their metadata
    pub fn reset_charts(&self) -> Result<()> {
        self.charts.reset()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::artifact_store::ChartPolicy;
    use crate::core::metadata::SqliteMetadataTable;
    use crate::core::safety::ExecutionLimits;
    use crate::domain::DatasetRef;
    use tempfile::TempDir;

    fn orchestrator(temp: &TempDir) -> TaskOrchestrator {
        let charts = ChartStore::new(
            temp.path().join("charts"),
            Box::new(SqliteMetadataTable::open_in_memory().unwrap()),
            ChartPolicy::default(),
        );
        TaskOrchestrator::new(
            ExecutionEnvironment::embedded(ExecutionLimits::default()),
            Arc::new(CsvDatasetLoader::default()),
            charts,
        )
    }

    #[tokio::test]
    async fn test_dataset_is_loaded_once() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("data.csv");
        std::fs::write(&path, "x\n1\n2\n").unwrap();
        let orchestrator = orchestrator(&temp);
        let mut session = Session::new("t");

        let request = TaskRequest::new("print(len(df))").with_dataset(DatasetRef::new("df", &path));
        let first = orchestrator.run(&mut session, &request).await.unwrap();
        assert_eq!(first.output, "2\n");

        // the namespace copy is used even after the file disappears
        std::fs::remove_file(&path).unwrap();
        let second = orchestrator.run(&mut session, &request).await.unwrap();
        assert!(second.is_success());
        assert_eq!(session.turns, 2);
    }

    #[tokio::test]
    async fn test_unloadable_dataset_is_task_error() {
        let temp = TempDir::new().unwrap();
        let orchestrator = orchestrator(&temp);
        let mut session = Session::new("t");

        let request = TaskRequest::new("print(1)")
            .with_dataset(DatasetRef::new("df", temp.path().join("missing.csv")));
        let err = orchestrator.run(&mut session, &request).await.unwrap_err();
        assert!(matches!(err, TaskError::Dataset { ref variable, .. } if variable == "df"));
    }

    #[tokio::test]
    async fn test_publish_returns_public_paths() {
        let temp = TempDir::new().unwrap();
        let orchestrator = orchestrator(&temp);
        orchestrator.charts().ensure_dir();
        orchestrator.charts().record_creation("c.html").unwrap();

        let paths = orchestrator.publish(&["c.html".to_string()]);
        assert_eq!(paths, vec!["images/plotly_figures/html/c.html"]);
    }
}
