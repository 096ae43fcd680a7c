//! A scripted [`ModelClient`] for tests and dry runs

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use crate::error::{EvalError, Result};
use crate::model::{ModelClient, ModelRequest, ModelResponse};

#[derive(Debug, Clone)]
struct Step {
    delay: Duration,
    outcome: std::result::Result<ModelResponse, String>,
}

/// A request as the model saw it
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub prompt: String,
    pub tool_names: Vec<String>,
}

/// Replays queued responses.
///
/// Steps queued for a specific prompt are consumed first, then the shared
/// queue, then the fallback. Without a fallback an exhausted script answers
/// with no tool call.
pub struct ScriptedModel {
    name: String,
    shared: Mutex<VecDeque<Step>>,
    by_prompt: Mutex<HashMap<String, VecDeque<Step>>>,
    fallback: Option<ModelResponse>,
    calls: AtomicU32,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedModel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            shared: Mutex::new(VecDeque::new()),
            by_prompt: Mutex::new(HashMap::new()),
            fallback: None,
            calls: AtomicU32::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn push(self, prompt: Option<&str>, step: Step) -> Self {
        match prompt {
            Some(prompt) => {
                locked(&self.by_prompt).entry(prompt.to_string()).or_default().push_back(step)
            }
            None => locked(&self.shared).push_back(step),
        }
        self
    }

    pub fn with_response(self, response: ModelResponse) -> Self {
        self.push(None, Step { delay: Duration::ZERO, outcome: Ok(response) })
    }

    pub fn with_error(self, message: &str) -> Self {
        self.push(None, Step { delay: Duration::ZERO, outcome: Err(message.to_string()) })
    }

    pub fn with_delayed_response(self, delay: Duration, response: ModelResponse) -> Self {
        self.push(None, Step { delay, outcome: Ok(response) })
    }

    pub fn with_response_for(self, prompt: &str, response: ModelResponse) -> Self {
        self.push(Some(prompt), Step { delay: Duration::ZERO, outcome: Ok(response) })
    }

    pub fn with_error_for(self, prompt: &str, message: &str) -> Self {
        self.push(Some(prompt), Step { delay: Duration::ZERO, outcome: Err(message.to_string()) })
    }

    pub fn with_delayed_response_for(
        self,
        prompt: &str,
        delay: Duration,
        response: ModelResponse,
    ) -> Self {
        self.push(Some(prompt), Step { delay, outcome: Ok(response) })
    }

    /// Answer with this response once the script runs dry
    pub fn with_fallback(mut self, response: ModelResponse) -> Self {
        self.fallback = Some(response);
        self
    }

    /// Number of invocations so far
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        locked(&self.requests).clone()
    }

    fn next_step(&self, prompt: &str) -> Option<Step> {
        let from_prompt = locked(&self.by_prompt).get_mut(prompt).and_then(VecDeque::pop_front);
        from_prompt.or_else(|| locked(&self.shared).pop_front())
    }
}

/// Lock a script queue. A panic elsewhere never loses queued steps or
/// recorded requests: each mutation is a single push or pop.
fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl ModelClient for ScriptedModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, request: ModelRequest) -> Result<ModelResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        locked(&self.requests).push(RecordedRequest {
            prompt: request.prompt.clone(),
            tool_names: request.tool_names(),
        });

        let Some(step) = self.next_step(&request.prompt) else {
            return Ok(self.fallback.clone().unwrap_or_default());
        };

        if !step.delay.is_zero() {
            tokio::time::sleep(step.delay).await;
        }
        step.outcome.map_err(EvalError::Collaborator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn request(prompt: &str) -> ModelRequest {
        ModelRequest {
            prompt: prompt.to_string(),
            tools: Arc::from(Vec::new()),
            timeout: Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn test_scripted_order() {
        let model = ScriptedModel::new("scripted")
            .with_error("HTTP 503")
            .with_response(ModelResponse::tool_call("get_weather", json!({"city": "Oslo"})))
            .with_response_for("special", ModelResponse::no_call());

        assert!(model.invoke(request("a")).await.is_err());
        assert!(!model.invoke(request("special")).await.unwrap().has_call());
        let third = model.invoke(request("b")).await.unwrap();
        assert_eq!(third.tool_name.as_deref(), Some("get_weather"));
        assert!(!model.invoke(request("c")).await.unwrap().has_call());

        assert_eq!(model.calls(), 4);
        assert_eq!(model.requests()[1].prompt, "special");
    }

    #[tokio::test]
    async fn test_fallback() {
        let model = ScriptedModel::new("m")
            .with_fallback(ModelResponse::tool_call("add_numbers", json!({"a": 1, "b": 2})));
        let response = model.invoke(request("anything")).await.unwrap();
        assert_eq!(response.tool_name.as_deref(), Some("add_numbers"));
        assert_eq!(model.name(), "m");
    }

    #[tokio::test]
    async fn test_poisoned_script_keeps_steps() {
        let model = ScriptedModel::new("m");
        let poisoned = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = model.shared.lock().unwrap();
            panic!("poison the queue");
        }));
        assert!(poisoned.is_err());
        assert!(model.shared.is_poisoned());

        let model = model.with_response(ModelResponse::tool_call("get_weather", json!({})));
        let response = model.invoke(request("p")).await.unwrap();
        assert_eq!(response.tool_name.as_deref(), Some("get_weather"));
        assert_eq!(model.requests().len(), 1);
    }
}
