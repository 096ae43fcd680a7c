//! # tooleval
//!
//! Tool-call fidelity evaluation for language models.
//!
//! Given an expected tool call and the call a model actually made, this crate
//! decides whether the right tool was selected and grades how closely the
//! arguments match, walking both argument trees under the tool's declared
//! schema.
//!
//! ## Features
//!
//! - **Schema Model**: primitives, optionals, lists, nested objects and
//!   discriminated unions, with per-field weights, tolerances and defaults
//! - **Invocation Session**: retries empty or invalid calls with exponential
//!   backoff under a per-case time budget
//! - **Comparator**: graded, schema-aware argument scoring with a per-leaf
//!   mismatch list
//! - **Metrics**: per-tier and per-model summaries that do not depend on
//!   record order
//! - **Tier Runner**: bounded-concurrency execution, one record per case
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tooleval::prelude::*;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let registry = Arc::new(ToolRegistry::load("tools.json")?);
//!     let cases = CaseFile::load("cases.json")?;
//!     let client: Arc<dyn ModelClient> = Arc::new(my_model_client()?);
//!
//!     let runner = TierRunner::new(registry, client, EvalConfig::load("eval.toml")?);
//!     let mut sink = JsonlSink::new("results/run.jsonl")?;
//!     let report = runner.run_into_sink(&cases.cases, &mut sink).await?;
//!
//!     println!("{}", report.format_summary());
//!     Ok(())
//! }
//! ```

pub mod case;
pub mod comparator;
pub mod config;
pub mod error;
pub mod metrics;
pub mod mock;
pub mod model;
pub mod registry;
pub mod report;
pub mod retry;
pub mod runner;
pub mod schema;
pub mod session;
pub mod telemetry;
mod temporal;

// Re-exports
pub use case::{ArgumentValue, CaseFile, ExpectedCase, group_by_tier};
pub use comparator::{ArgumentScore, Comparator, ComparatorConfig, Mismatch, MismatchKind};
pub use config::EvalConfig;
pub use error::{EvalError, Result, SchemaError};
pub use metrics::{
    AggregatorConfig, MetricsAggregator, ModelSummary, SummaryStats, TierSummary, TierThreshold,
    WorstOffender,
};
pub use mock::ScriptedModel;
pub use model::{ModelClient, ModelRequest, ModelResponse};
pub use registry::ToolRegistry;
pub use report::{
    FailureReason, JsonlSink, MemorySink, ResultSink, RunReport, ScoreRecord, TierReport,
};
pub use retry::RetryPolicy;
pub use runner::{TierRunner, ToolPresentation};
pub use schema::{
    Field, FieldPath, PathSegment, PrimitiveKind, ShapeDescriptor, ToolSchema, UnionShape, Variant,
};
pub use session::{CounterSnapshot, InvocationSession, ObservedResult, SessionCounters};
pub use telemetry::init_telemetry;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::case::{ArgumentValue, CaseFile, ExpectedCase};
    pub use crate::comparator::{Comparator, ComparatorConfig, Mismatch, MismatchKind};
    pub use crate::config::EvalConfig;
    pub use crate::error::{EvalError, Result, SchemaError};
    pub use crate::metrics::{AggregatorConfig, MetricsAggregator, ModelSummary, TierSummary};
    pub use crate::model::{ModelClient, ModelRequest, ModelResponse};
    pub use crate::registry::ToolRegistry;
    pub use crate::report::{
        FailureReason, JsonlSink, MemorySink, ResultSink, RunReport, ScoreRecord, TierReport,
    };
    pub use crate::retry::RetryPolicy;
    pub use crate::runner::{TierRunner, ToolPresentation};
    pub use crate::schema::{Field, FieldPath, PrimitiveKind, ShapeDescriptor, ToolSchema, Variant};
    pub use crate::session::{InvocationSession, ObservedResult};
}
