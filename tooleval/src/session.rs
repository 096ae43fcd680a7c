//! Invocation session: one test case against the model collaborator
//!
//! The session sends the prompt with the full presented tool set, rejects
//! empty or structurally invalid calls, retries with exponential backoff and
//! gives up with an "absent call" outcome rather than an error. Whatever
//! happens, `execute` returns an [`ObservedResult`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::time::Instant;

use crate::case::{ArgumentValue, ExpectedCase};
use crate::error::{EvalError, Result};
use crate::model::{ModelClient, ModelRequest, ModelResponse};
use crate::report::FailureReason;
use crate::retry::RetryPolicy;
use crate::schema::ToolSchema;

/// What the model did for one case
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObservedResult {
    /// Tool actually invoked; `None` when no acceptable call was made
    pub tool_name: Option<String>,
    pub arguments: Option<ArgumentValue>,
    /// Total latency across attempts, backoff excluded. A timed-out case
    /// reports at least the time spent until the cut-off.
    pub latency_ms: u64,
    pub reasoning_tokens: u64,
    pub total_tokens: u64,
    /// Collaborator calls made
    pub attempts: u32,
    #[serde(default)]
    pub metadata: ResponseMetadata,
    /// Why no call was obtained, when that is the case
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureReason>,
}

/// Raw-response details kept for diagnostics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseMetadata {
    pub model: String,
    /// Provider payload of the accepted (or last) response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<Value>,
    /// Reason each rejected attempt was rejected, in order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rejections: Vec<String>,
}

impl ObservedResult {
    /// An outcome with no call at all
    pub fn absent(failure: FailureReason) -> Self {
        Self { failure: Some(failure), ..Default::default() }
    }

    pub fn made_call(&self) -> bool {
        self.tool_name.is_some()
    }

    /// Share of tokens spent reasoning
    pub fn thinking_ratio(&self) -> f64 {
        if self.total_tokens == 0 {
            0.0
        } else {
            self.reasoning_tokens as f64 / self.total_tokens as f64
        }
    }
}

/// Totals accumulated by every session sharing these counters
#[derive(Debug, Default)]
pub struct SessionCounters {
    cases: AtomicU64,
    attempts: AtomicU64,
    latency_ms: AtomicU64,
    reasoning_tokens: AtomicU64,
    total_tokens: AtomicU64,
}

/// A point-in-time copy of [`SessionCounters`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterSnapshot {
    pub cases: u64,
    pub attempts: u64,
    pub latency_ms: u64,
    pub reasoning_tokens: u64,
    pub total_tokens: u64,
}

impl SessionCounters {
    fn record(&self, observed: &ObservedResult) {
        self.cases.fetch_add(1, Ordering::Relaxed);
        self.attempts.fetch_add(u64::from(observed.attempts), Ordering::Relaxed);
        self.latency_ms.fetch_add(observed.latency_ms, Ordering::Relaxed);
        self.reasoning_tokens.fetch_add(observed.reasoning_tokens, Ordering::Relaxed);
        self.total_tokens.fetch_add(observed.total_tokens, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            cases: self.cases.load(Ordering::Relaxed),
            attempts: self.attempts.load(Ordering::Relaxed),
            latency_ms: self.latency_ms.load(Ordering::Relaxed),
            reasoning_tokens: self.reasoning_tokens.load(Ordering::Relaxed),
            total_tokens: self.total_tokens.load(Ordering::Relaxed),
        }
    }
}

/// Running totals for one `execute` call
#[derive(Default)]
struct Progress {
    attempts: u32,
    latency_ms: u64,
    reasoning_tokens: u64,
    total_tokens: u64,
    last_raw: Option<Value>,
    rejections: Vec<String>,
}

impl Progress {
    fn absorb(&mut self, response: &ModelResponse, elapsed_ms: u64) {
        self.latency_ms += if response.latency_ms > 0 { response.latency_ms } else { elapsed_ms };
        self.reasoning_tokens += response.reasoning_tokens;
        self.total_tokens += response.total_tokens;
        self.last_raw = response.raw.clone();
    }
}

/// Runs cases against one model with one retry policy
pub struct InvocationSession {
    client: Arc<dyn ModelClient>,
    policy: RetryPolicy,
    counters: Arc<SessionCounters>,
}

impl InvocationSession {
    pub fn new(client: Arc<dyn ModelClient>, policy: RetryPolicy) -> Self {
        Self { client, policy, counters: Arc::new(SessionCounters::default()) }
    }

    /// Share counters with other sessions
    #[must_use]
    pub fn with_counters(mut self, counters: Arc<SessionCounters>) -> Self {
        self.counters = counters;
        self
    }

    pub fn counters(&self) -> &Arc<SessionCounters> {
        &self.counters
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn model_name(&self) -> &str {
        self.client.name()
    }

    /// Ask the model for a call for this case.
    ///
    /// Never fails: exhaustion and timeout come back as an absent call with
    /// the reason attached.
    #[tracing::instrument(skip_all, fields(case = %case.id, model = %self.client.name()))]
    pub async fn execute(
        &self,
        case: &ExpectedCase,
        available_tools: &[ToolSchema],
    ) -> ObservedResult {
        let tools: Arc<[ToolSchema]> = Arc::from(available_tools.to_vec());
        let started = Instant::now();
        let deadline = started + self.policy.timeout;
        let mut progress = Progress::default();

        let attempts = self.attempt(case, tools, deadline, &mut progress);
        let result = tokio::time::timeout(self.policy.timeout, attempts).await;
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(_) => {
                // The cut-off attempt never reported its latency
                let elapsed_ms = started.elapsed().as_millis() as u64;
                progress.latency_ms = progress.latency_ms.max(elapsed_ms);
                Err(EvalError::CollaboratorTimeout { timeout: self.policy.timeout })
            }
        };

        let mut observed = match outcome {
            Ok(response) => ObservedResult {
                tool_name: response.tool_name,
                arguments: response.arguments,
                ..Default::default()
            },
            Err(err) => {
                tracing::warn!(error = %err, attempts = progress.attempts, "no usable tool call");
                ObservedResult::absent(FailureReason::from(&err))
            }
        };

        observed.latency_ms = progress.latency_ms;
        observed.reasoning_tokens = progress.reasoning_tokens;
        observed.total_tokens = progress.total_tokens;
        observed.attempts = progress.attempts;
        observed.metadata = ResponseMetadata {
            model: self.client.name().to_string(),
            raw: progress.last_raw,
            rejections: progress.rejections,
        };

        self.counters.record(&observed);
        observed
    }

    async fn attempt(
        &self,
        case: &ExpectedCase,
        tools: Arc<[ToolSchema]>,
        deadline: Instant,
        progress: &mut Progress,
    ) -> Result<ModelResponse> {
        loop {
            progress.attempts += 1;
            let request = ModelRequest {
                prompt: case.prompt.clone(),
                tools: Arc::clone(&tools),
                timeout: deadline.saturating_duration_since(Instant::now()),
            };

            let started = Instant::now();
            let result = self.client.invoke(request).await;
            let elapsed_ms = started.elapsed().as_millis() as u64;

            let rejection = match result {
                Ok(response) => {
                    progress.absorb(&response, elapsed_ms);
                    match self.check(&response, &tools) {
                        Ok(()) => {
                            tracing::debug!(attempt = progress.attempts, "tool call accepted");
                            return Ok(response);
                        }
                        Err(reason) => reason,
                    }
                }
                Err(err) => {
                    progress.latency_ms += elapsed_ms;
                    err.to_string()
                }
            };
            progress.rejections.push(rejection.clone());

            if progress.attempts >= self.policy.max_attempts {
                return Err(EvalError::CollaboratorExhausted {
                    attempts: progress.attempts,
                    last_error: rejection,
                });
            }

            let delay = self.policy.backoff_for(progress.attempts);
            tracing::warn!(
                attempt = progress.attempts,
                max_attempts = self.policy.max_attempts,
                delay_ms = delay.as_millis() as u64,
                reason = %rejection,
                "tool call rejected; retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Accept a response only if it carries a call that fits its own schema
    fn check(
        &self,
        response: &ModelResponse,
        tools: &[ToolSchema],
    ) -> std::result::Result<(), String> {
        let Some(name) = response.tool_name.as_deref().filter(|n| !n.is_empty()) else {
            return Err("no tool call in response".to_string());
        };
        if !self.policy.validate_arguments {
            return Ok(());
        }

        let schema = tools
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| format!("called unknown tool '{name}'"))?;
        let empty = Value::Object(Default::default());
        let arguments = response.arguments.as_ref().unwrap_or(&empty);
        schema.check_arguments(arguments).map_err(|e| format!("invalid call to '{name}': {e}"))
    }
}
