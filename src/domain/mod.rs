//! Domain types for the insights engine.
//!
//! This module contains the core data structures:
//! - Chart: Chart objects, their export form and persisted metadata
//! - Dataset: Named tabular inputs of a request
//! - Result: Task requests and results

pub mod chart;
pub mod dataset;
pub mod result;

// Re-export commonly used types
pub use chart::{ChartKind, ChartRecord, ChartSpec, ChartTable, Trace};
pub use dataset::DatasetRef;
pub use result::{IntermediateOutput, TaskRequest, TaskResult, TaskStatus};
