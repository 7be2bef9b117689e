//! Execution environment.
//!
//! Merges a session namespace with the dataset overlay of one call, runs the
//! code through a [`CodeExecutor`], and folds the new bindings back into the
//! namespace. Failures come back as [`ExecutionOutcome::Failed`] and leave the
//! namespace untouched.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{info, instrument, warn};

use super::namespace::{self, Namespace};
use super::safety::ExecutionLimits;
use crate::adapters::{CodeExecutor, EmbeddedExecutor};
use crate::domain::ChartSpec;
use crate::script::Value;

/// Result of one execution call
#[derive(Debug, Clone)]
pub enum ExecutionOutcome {
    Completed {
        /// Captured standard output
        output: String,
        /// Bindings beyond the executor baseline, after sanitizing
        variables: BTreeMap<String, Value>,
        /// Charts captured during the run
        charts: Vec<ChartSpec>,
    },
    Failed {
        message: String,
    },
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    /// Standard output on success, the error message otherwise
    pub fn output(&self) -> &str {
        match self {
            Self::Completed { output, .. } => output,
            Self::Failed { message } => message,
        }
    }
}

/// Runs code against session namespaces
#[derive(Clone)]
pub struct ExecutionEnvironment {
    executor: Arc<dyn CodeExecutor>,
}

impl ExecutionEnvironment {
    pub fn new(executor: Arc<dyn CodeExecutor>) -> Self {
        Self { executor }
    }

    /// Environment backed by the embedded interpreter
    pub fn embedded(limits: ExecutionLimits) -> Self {
        Self::new(Arc::new(EmbeddedExecutor::new(limits)))
    }

    pub fn executor(&self) -> &dyn CodeExecutor {
        self.executor.as_ref()
    }

    /// Run `code` with `namespace` plus `overlay` in scope.
    ///
    /// On success the namespace becomes the sanitized bindings that differ
    /// from the executor baseline, and those bindings are returned.
    #[instrument(skip_all, fields(executor = self.executor.name()))]
    pub async fn execute(
        &self,
        namespace: &mut Namespace,
        code: &str,
        overlay: BTreeMap<String, Value>,
    ) -> ExecutionOutcome {
        let baseline = self.executor.baseline();
        let mut bindings = baseline.clone();
        bindings.extend(
            namespace
                .bindings()
                .iter()
                .map(|(name, value)| (name.clone(), value.clone())),
        );
        bindings.extend(overlay);

        match self.executor.execute(code, bindings).await {
            Ok(raw) => {
                namespace.clear();
                namespace.absorb(namespace::diff(&raw.bindings, &baseline));
                info!(
                    variables = namespace.len(),
                    charts = raw.charts.len(),
                    "Execution completed"
                );
                ExecutionOutcome::Completed {
                    output: raw.stdout,
                    variables: namespace.bindings().clone(),
                    charts: raw.charts,
                }
            }
            Err(e) => {
                warn!(error = %e, "Execution failed");
                ExecutionOutcome::Failed {
                    message: e.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::DataFrame;

    fn environment() -> ExecutionEnvironment {
        ExecutionEnvironment::embedded(ExecutionLimits::default())
    }

    fn sales() -> Value {
        Value::Frame(
            DataFrame::from_records(
                vec!["x".into()],
                &[vec!["1".into()], vec!["2".into()], vec!["6".into()]],
            )
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_variables_persist_across_calls() {
        let env = environment();
        let mut namespace = Namespace::new();

        let first = env.execute(&mut namespace, "total = 40", BTreeMap::new()).await;
        assert!(first.is_success());

        let second = env
            .execute(&mut namespace, "print(total + 2)", BTreeMap::new())
            .await;
        assert_eq!(second.output(), "42\n");
        assert_eq!(namespace.get("total"), Some(&Value::Int(40)));
    }

    #[tokio::test]
    async fn test_builtins_are_not_reported() {
        let env = environment();
        let mut namespace = Namespace::new();
        let overlay = BTreeMap::from([("df".to_string(), sales())]);

        let outcome = env
            .execute(&mut namespace, "m = df['x'].mean()\nprint(m)", overlay)
            .await;
        let ExecutionOutcome::Completed { output, variables, charts } = outcome else {
            panic!("execution should succeed");
        };
        assert_eq!(output, "3.0\n");
        assert_eq!(variables.keys().collect::<Vec<_>>(), vec!["df", "m"]);
        assert!(charts.is_empty());
        assert!(!namespace.contains("print"));
    }

    #[tokio::test]
    async fn test_failure_leaves_namespace_untouched() {
        let env = environment();
        let mut namespace = Namespace::new();
        namespace.insert("keep", Value::Int(1));

        let outcome = env
            .execute(&mut namespace, "keep = 2\nboom = 1 / 0", BTreeMap::new())
            .await;
        assert!(!outcome.is_success());
        assert_eq!(outcome.output(), "division by zero");
        assert_eq!(namespace.get("keep"), Some(&Value::Int(1)));
        assert!(!namespace.contains("boom"));
    }

    #[tokio::test]
    async fn test_charts_are_returned_and_sanitized_out_of_namespace() {
        let env = environment();
        let mut namespace = Namespace::new();

        let outcome = env
            .execute(
                &mut namespace,
                "fig = px.bar(x=['a', 'b'], y=[1, 2])\nplotly_figures.append(fig)",
                BTreeMap::new(),
            )
            .await;
        let ExecutionOutcome::Completed { charts, .. } = outcome else {
            panic!("execution should succeed");
        };
        assert_eq!(charts.len(), 1);
        assert!(matches!(namespace.get("fig"), Some(Value::Str(_))));
    }
}
