//! Test doubles shared by the unit tests in this crate.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::ProviderError;
use crate::model::{Answer, CorrectAnswer, Level, Question};
use crate::traits::{GenerateRequest, GenerateResponse, LlmProvider, ModelInfo, TokenUsage};

#[derive(Clone)]
enum Scripted {
    Text(String),
    Fail(fn() -> ProviderError),
}

/// Provider whose replies are scripted per prompt substring.
///
/// Each key holds a queue of replies; the last reply repeats once the queue
/// is drained. Prompts matching no key get a valid batch for the level the
/// prompt asks for.
#[derive(Default)]
pub(crate) struct ScriptedProvider {
    scripts: Mutex<HashMap<String, VecDeque<Scripted>>>,
    delays: HashMap<String, Duration>,
    calls: AtomicU32,
    completed: AtomicU32,
    in_flight: AtomicU32,
    max_in_flight: AtomicU32,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(self, key: &str, replies: Vec<String>) -> Self {
        replies
            .into_iter()
            .fold(self, |provider, reply| provider.then(key, reply))
    }

    pub fn then(self, key: &str, reply: String) -> Self {
        self.push(key, Scripted::Text(reply))
    }

    pub fn fail_with(self, key: &str, error: fn() -> ProviderError) -> Self {
        self.push(key, Scripted::Fail(error))
    }

    pub fn with_delay(mut self, key: &str, delay: Duration) -> Self {
        self.delays.insert(key.to_string(), delay);
        self
    }

    fn push(self, key: &str, reply: Scripted) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn completed_count(&self) -> u32 {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> u32 {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn next_reply(&self, prompt: &str) -> Scripted {
        let mut scripts = self.scripts.lock().unwrap();
        let key = scripts
            .keys()
            .filter(|key| prompt.contains(key.as_str()))
            .max_by_key(|key| key.len())
            .cloned();
        match key.and_then(|key| scripts.get_mut(&key)) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) if !queue.is_empty() => queue[0].clone(),
            _ => Scripted::Text(sample_batch(level_of(prompt), requested_count(prompt))),
        }
    }

    fn delay_for(&self, prompt: &str) -> Option<Duration> {
        self.delays
            .iter()
            .filter(|(key, _)| prompt.contains(key.as_str()))
            .max_by_key(|(key, _)| key.len())
            .map(|(_, delay)| *delay)
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, request: &GenerateRequest) -> anyhow::Result<GenerateResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delay_for(&request.prompt) {
            tokio::time::sleep(delay).await;
        }
        let reply = self.next_reply(&request.prompt);

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.completed.fetch_add(1, Ordering::SeqCst);

        match reply {
            Scripted::Text(content) => Ok(GenerateResponse {
                content,
                model: request.model.clone(),
                token_usage: TokenUsage::default(),
                latency_ms: 0,
            }),
            Scripted::Fail(error) => Err(error().into()),
        }
    }

    fn available_models(&self) -> Vec<ModelInfo> {
        vec![]
    }
}

fn level_of(prompt: &str) -> Level {
    if prompt.contains("beginner level") {
        Level::Beginner
    } else if prompt.contains("intermediate level") {
        Level::Intermediate
    } else {
        Level::Scenario
    }
}

fn requested_count(prompt: &str) -> usize {
    prompt
        .split("Generate ")
        .nth(1)
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|n| n.parse().ok())
        .unwrap_or(5)
}

/// A well-formed batch of `count` questions for `level`.
///
/// Options are always `A`..`D`. Beginner questions expect `A`, intermediate
/// ones `A` and `C`; scenario questions alternate between `B` and `B`+`D`.
pub(crate) fn sample_batch(level: Level, count: usize) -> String {
    let items: Vec<serde_json::Value> = (0..count)
        .map(|i| {
            let mut item = serde_json::json!({
                "question": format!("Sample question {i}"),
                "options": ["A", "B", "C", "D"],
                "max_time_required": 60,
            });
            match level {
                Level::Beginner => item["answer"] = "A".into(),
                Level::Intermediate => item["answers"] = serde_json::json!(["A", "C"]),
                Level::Scenario => {
                    item["scenario"] = format!("Incident {i}").into();
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

/// The answer that scores `question` as correct.
pub(crate) fn correct_answer(question: &Question) -> Answer {
    match &question.correct {
        CorrectAnswer::Single(option) => Answer::Single(option.clone()),
        CorrectAnswer::Multiple(options) => Answer::Multiple(options.iter().cloned().collect()),
    }
}

/// An answer that scores `question` as incorrect.
pub(crate) fn wrong_answer(question: &Question) -> Answer {
    let wrong = question
        .options
        .iter()
        .find(|option| !question.correct.is_satisfied_by(&Answer::Single((*option).clone())))
        .cloned()
        .unwrap_or_default();
    Answer::Single(wrong)
}
