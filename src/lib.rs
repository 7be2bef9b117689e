//! insights - Ask questions of CSV data with generated analysis code
//!
//! Runs model-written analysis code against tabular datasets, keeps the
//! resulting variables per session, and turns captured figures into
//! self-contained HTML chart files with a time-based lifecycle.
//!
//! # Architecture
//!
//! One analysis turn flows through the orchestrator:
//! - Datasets not yet held by the session are loaded from CSV
//! - The charts directory is tidied (expired and orphaned charts removed)
//! - Code runs against the session namespace via a pluggable executor
//! - Captured charts are exported and recorded in a metadata table
//!
//! # Modules
//!
//! - `script`: Embedded interpreter for the analysis language (data frames, charts)
//! - `adapters`: Code executors (embedded, external process) and the CSV loader
//! - `core`: Orchestration logic (Namespace, Session, ChartStore, Orchestrator, Safety)
//! - `domain`: Data structures (TaskRequest, TaskResult, ChartSpec, ChartRecord)
//! - `config`: Configuration loading and canonical paths
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Run code against a CSV file
//! echo "print(df['price'].mean())" | insights analyze sales.csv
//!
//! # Interactive session
//! insights repl sales.csv
//!
//! # Chart housekeeping
//! insights charts list
//! insights charts cleanup
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod script;

// Re-export main types at crate root for convenience
pub use core::{
    ChartPolicy, ChartStore, ExecutionEnvironment, ExecutionLimits, Namespace, Session,
    SessionRegistry, TaskError, TaskOrchestrator,
};
pub use domain::{ChartRecord, ChartSpec, DatasetRef, TaskRequest, TaskResult, TaskStatus};
pub use script::Value;
