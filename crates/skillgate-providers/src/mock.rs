//! Mock provider for testing.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use skillgate_core::model::Level;
use skillgate_core::traits::{
    GenerateRequest, GenerateResponse, LlmProvider, ModelInfo, TokenUsage,
};

/// A mock LLM provider for exercising the assessment engine without real
/// API calls.
///
/// Replies are chosen by prompt content: the longest configured key found in
/// the prompt wins. A key maps to a queue of replies; the last one repeats
/// once the queue drains. Prompts that match no key get a well-formed
/// question batch for whatever level and count the prompt asks for.
pub struct MockProvider {
    /// Map of prompt substring → queued responses.
    responses: Mutex<HashMap<String, VecDeque<String>>>,
    /// Response for unmatched prompts; `None` synthesizes a valid batch.
    default_response: Option<String>,
    /// Artificial latency per call.
    delay: Option<Duration>,
    /// Number of calls made.
    call_count: AtomicU32,
    /// Last request received.
    last_request: Mutex<Option<GenerateRequest>>,
}

impl MockProvider {
    /// Create a mock with the given prompt → response mappings.
    pub fn new(responses: HashMap<String, String>) -> Self {
        Self {
            responses: Mutex::new(
                responses
                    .into_iter()
                    .map(|(k, v)| (k, VecDeque::from([v])))
                    .collect(),
            ),
            default_response: None,
            delay: None,
            call_count: AtomicU32::new(0),
            last_request: Mutex::new(None),
        }
    }

    /// Create a mock that always returns the same response.
    pub fn with_fixed_response(response: &str) -> Self {
        Self {
            default_response: Some(response.to_string()),
            ..Self::new(HashMap::new())
        }
    }

    /// Reply to prompts containing `key` with `replies`, in order.
    pub fn with_sequence(self, key: impl Into<String>, replies: Vec<String>) -> Self {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), replies.into());
        self
    }

    /// Sleep for `delay` before every reply.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Get the number of calls made to this provider.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    /// Get the last request made to this provider.
    pub fn last_request(&self) -> Option<GenerateRequest> {
        self.last_request
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn reply_for(&self, prompt: &str) -> String {
        let mut responses = self
            .responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let key = responses
            .keys()
            .filter(|key| prompt.contains(key.as_str()))
            .max_by_key(|key| key.len())
            .cloned();

        if let Some(queue) = key.and_then(|k| responses.get_mut(&k)) {
            let reply = if queue.len() > 1 {
                queue.pop_front()
            } else {
                queue.front().cloned()
            };
            if let Some(reply) = reply {
                return reply;
            }
        }

        match &self.default_response {
            Some(response) => response.clone(),
            None => sample_batch(prompt_level(prompt), prompt_count(prompt)),
        }
    }
}

fn prompt_level(prompt: &str) -> Level {
    if prompt.contains("intermediate level") {
        Level::Intermediate
    } else if prompt.contains("scenario-based") {
        Level::Scenario
    } else {
        Level::Beginner
    }
}

fn prompt_count(prompt: &str) -> usize {
    prompt
        .split("Generate ")
        .nth(1)
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|n| n.parse().ok())
        .unwrap_or(1)
}

/// A well-formed question batch for `level`.
///
/// Beginner questions answer "A", intermediate ones ["A", "C"]; scenario
/// questions alternate between "B" and ["B", "D"].
pub fn sample_batch(level: Level, count: usize) -> String {
    let items: Vec<serde_json::Value> = (0..count)
        .map(|i| {
            let mut item = serde_json::json!({
                "question": format!("Question {} at {}", i + 1, level.label()),
                "options": ["A", "B", "C", "D"],
                "max_time_required": 45,
            });
            match level {
                Level::Beginner => item["answer"] = "A".into(),
                Level::Intermediate => item["answers"] = serde_json::json!(["A", "C"]),
                Level::Scenario => {
                    item["scenario"] = format!("Production incident #{}", i + 1).into();
                    if i % 2 == 0 {
                        item["answer"] = "B".into();
                    } else {
                        item["answers"] = serde_json::json!(["B", "D"]);
                    }
                }
            }
            item
        })
        .collect();
    serde_json::Value::Array(items).to_string()
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(&self, request: &GenerateRequest) -> anyhow::Result<GenerateResponse> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        *self
            .last_request
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(request.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let content = self.reply_for(&request.prompt);
        let prompt_tokens = (request.prompt.len() / 4) as u32; // Rough estimate
        let completion_tokens = (content.len() / 4) as u32;

        Ok(GenerateResponse {
            content,
            model: request.model.clone(),
            token_usage: TokenUsage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
                estimated_cost_usd: 0.0,
            },
            latency_ms: self.delay.map_or(1, |d| d.as_millis() as u64),
        })
    }

    fn available_models(&self) -> Vec<ModelInfo> {
        vec![ModelInfo {
            id: "mock-model".into(),
            name: "Mock Model".into(),
            provider: "mock".into(),
            max_context: 100_000,
            cost_per_1k_input: 0.0,
            cost_per_1k_output: 0.0,
        }]
    }
}
