//! Core analysis engine.
//!
//! This module contains:
//! - Namespace / Session: Per-conversation variable state
//! - Environment: Code execution against a namespace
//! - Metadata / ArtifactStore: Chart files and their lifecycle
//! - Orchestrator: Main entry point for analysis turns
//! - Safety: Execution limits
//! - Reply: Code extraction and request-level errors

pub mod artifact_store;
pub mod environment;
pub mod metadata;
pub mod namespace;
pub mod orchestrator;
pub mod reply;
pub mod safety;
pub mod session;

// Re-export commonly used types
pub use artifact_store::{ChartPolicy, ChartStore};
pub use environment::{ExecutionEnvironment, ExecutionOutcome};
pub use metadata::{
    open_table, JsonMetadataTable, MetadataBackend, MetadataError, MetadataTable,
    SqliteMetadataTable,
};
pub use namespace::{sanitize, Namespace};
pub use orchestrator::{TaskError, TaskOrchestrator};
pub use reply::{extract_code, CodeExtraction, RequestError};
pub use safety::{ExecutionLimits, SafetyViolation};
pub use session::{Session, SessionHandle, SessionRegistry};
