//! The model collaborator seam
//!
//! Everything that talks to a served model sits behind [`ModelClient`]:
//! send a prompt with a set of tool schemas, get back at most one structured
//! tool call plus usage figures. Transport, schema coercion and any
//! provider-side retries are the implementor's business.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::case::ArgumentValue;
use crate::error::Result;
use crate::schema::ToolSchema;

/// One request to the model
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub prompt: String,
    /// Every tool offered to the model, distractors included
    pub tools: Arc<[ToolSchema]>,
    /// Time left in the case's budget
    pub timeout: Duration,
}

impl ModelRequest {
    pub fn tool_names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name.clone()).collect()
    }

    /// Offered tools rendered as function-tool definitions
    pub fn function_tools(&self) -> Vec<Value> {
        self.tools.iter().map(ToolSchema::to_function_tool).collect()
    }
}

/// What the model sent back
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelResponse {
    /// Name of the tool invoked, if any
    pub tool_name: Option<String>,
    /// Arguments of the call, if any
    pub arguments: Option<ArgumentValue>,
    pub latency_ms: u64,
    /// Tokens spent reasoning before the call
    pub reasoning_tokens: u64,
    pub total_tokens: u64,
    /// Provider payload, kept for diagnostics
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<Value>,
}

impl ModelResponse {
    /// A response carrying a tool call
    pub fn tool_call(name: &str, arguments: Value) -> Self {
        Self { tool_name: Some(name.to_string()), arguments: Some(arguments), ..Default::default() }
    }

    /// A response without any tool call
    pub fn no_call() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    #[must_use]
    pub fn with_tokens(mut self, reasoning_tokens: u64, total_tokens: u64) -> Self {
        self.reasoning_tokens = reasoning_tokens;
        self.total_tokens = total_tokens;
        self
    }

    #[must_use]
    pub fn with_raw(mut self, raw: Value) -> Self {
        self.raw = Some(raw);
        self
    }

    pub fn has_call(&self) -> bool {
        self.tool_name.as_deref().is_some_and(|n| !n.is_empty())
    }
}

/// A served model that can be asked for a tool call
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Model identifier used in reports
    fn name(&self) -> &str;

    /// Send the prompt and tool set; return the model's call (or lack of one)
    async fn invoke(&self, request: ModelRequest) -> Result<ModelResponse>;
}
