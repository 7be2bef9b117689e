//! Orchestrator Integration Tests
//!
//! End-to-end analysis turns: dataset loading, namespace persistence,
//! chart export and failure reporting.

use insights::adapters::CsvDatasetLoader;
use insights::core::{
    ChartPolicy, ChartStore, ExecutionEnvironment, ExecutionLimits, JsonMetadataTable,
    SessionRegistry, TaskOrchestrator,
};
use insights::domain::{DatasetRef, TaskRequest, TaskStatus};
use insights::{Session, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

struct Fixture {
    _temp: TempDir,
    data: PathBuf,
    charts_dir: PathBuf,
    orchestrator: TaskOrchestrator,
}

fn fixture() -> Fixture {
    let temp = TempDir::new().unwrap();
    let data = temp.path().join("sales.csv");
    std::fs::write(
        &data,
        "region,price\nnorth,1\nsouth,2\nnorth,3\neast,4\nsouth,5\n",
    )
    .unwrap();

    let charts_dir = temp.path().join("charts");
    let charts = ChartStore::new(
        &charts_dir,
        Box::new(JsonMetadataTable::new(temp.path().join("chart_metadata.json"))),
        ChartPolicy::default(),
    );
    let orchestrator = TaskOrchestrator::new(
        ExecutionEnvironment::embedded(ExecutionLimits::default()),
        Arc::new(CsvDatasetLoader::default()),
        charts,
    );

    Fixture {
        _temp: temp,
        data,
        charts_dir,
        orchestrator,
    }
}

fn chart_files(dir: &PathBuf) -> Vec<String> {
    std::fs::read_dir(dir)
        .unwrap()
        .flatten()
        .map(|e| e.file_name().to_string_lossy().to_string())
        .filter(|name| name.ends_with(".html"))
        .collect()
}

#[tokio::test]
async fn test_mean_without_charts() {
    let fx = fixture();
    let mut session = Session::new("s1");

    let request = TaskRequest::new("print(df['price'].mean())")
        .with_thought("Average price")
        .with_dataset(DatasetRef::new("df", &fx.data));
    let result = fx.orchestrator.run(&mut session, &request).await.unwrap();

    assert_eq!(result.status, TaskStatus::Completed);
    assert_eq!(result.output, "3.0\n");
    assert!(result.chart_filenames.is_none());
    assert_eq!(result.intermediate_outputs.len(), 1);
    assert_eq!(result.intermediate_outputs[0].thought, "Average price");
    assert!(result.current_variables.contains_key("df"));
    assert!(chart_files(&fx.charts_dir).is_empty());
}

#[tokio::test]
async fn test_one_chart_is_exported_and_recorded() {
    let fx = fixture();
    let mut session = Session::new("s1");

    let code = "totals = df.groupby('region')['price'].sum()\n\
                fig = px.bar(x=list(totals.index), y=list(totals.values), title='Totals')\n\
                plotly_figures.append(fig)\n";
    let request = TaskRequest::new(code).with_dataset(DatasetRef::new("df", &fx.data));
    let result = fx.orchestrator.run(&mut session, &request).await.unwrap();

    assert!(result.is_success(), "{}", result.output);
    let filenames = result.chart_filenames.clone().unwrap();
    assert_eq!(filenames.len(), 1);
    assert_eq!(chart_files(&fx.charts_dir), filenames);

    let records = fx.orchestrator.charts().list().unwrap();
    assert_eq!(records.len(), 1);
    assert!(records.contains_key(&filenames[0]));

    // the figure itself cannot persist and is stored as its text form
    assert!(matches!(result.current_variables.get("fig"), Some(Value::Str(_))));
}

#[tokio::test]
async fn test_zero_division_reports_failure() {
    let fx = fixture();
    let mut session = Session::new("s1");

    let request = TaskRequest::new("ratio = 1 / 0").with_dataset(DatasetRef::new("df", &fx.data));
    let result = fx.orchestrator.run(&mut session, &request).await.unwrap();

    assert_eq!(result.status, TaskStatus::Failed);
    assert_eq!(result.output, "division by zero");
    assert!(result.chart_filenames.is_none());
    assert!(result.current_variables.is_empty());
    assert!(chart_files(&fx.charts_dir).is_empty());
}

#[tokio::test]
async fn test_variables_persist_across_turns() {
    let fx = fixture();
    let mut session = Session::new("s1");
    let dataset = DatasetRef::new("df", &fx.data);

    let first = TaskRequest::new("top = df['price'].max()").with_dataset(dataset.clone());
    fx.orchestrator.run(&mut session, &first).await.unwrap();

    let second = TaskRequest::new("print(top * 2)").with_dataset(dataset);
    let result = fx.orchestrator.run(&mut session, &second).await.unwrap();

    assert_eq!(result.output, "10\n");
    assert_eq!(result.current_variables.get("top"), Some(&Value::Int(5)));
    assert_eq!(session.turns, 2);
}

#[tokio::test]
async fn test_failed_turn_keeps_previous_namespace() {
    let fx = fixture();
    let mut session = Session::new("s1");

    fx.orchestrator
        .run(&mut session, &TaskRequest::new("kept = 7"))
        .await
        .unwrap();
    let failed = fx
        .orchestrator
        .run(&mut session, &TaskRequest::new("kept = 8\nprint(missing)"))
        .await
        .unwrap();

    assert_eq!(failed.output, "name 'missing' is not defined");
    assert_eq!(session.namespace.get("kept"), Some(&Value::Int(7)));
}

#[tokio::test]
async fn test_sessions_are_isolated() {
    let fx = fixture();
    let registry = SessionRegistry::new();

    {
        let handle = registry.session("alice").await;
        let mut session = handle.lock().await;
        fx.orchestrator
            .run(&mut session, &TaskRequest::new("secret = 42"))
            .await
            .unwrap();
    }

    let handle = registry.session("bob").await;
    let mut session = handle.lock().await;
    let result = fx
        .orchestrator
        .run(&mut session, &TaskRequest::new("print(secret)"))
        .await
        .unwrap();

    assert_eq!(result.status, TaskStatus::Failed);
    assert_eq!(registry.ids().await, vec!["alice", "bob"]);
}
