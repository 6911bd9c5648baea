//! Generation-validation unit.
//!
//! Turns one `(level, skill)` task into a batch of validated questions:
//! prompt -> provider call -> JSON parse -> per-item validation. Malformed
//! output is retried with exponential backoff up to a fixed attempt budget,
//! then escalated as `GenerationFailure` or `ValidationFailure`.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

use crate::error::{AssessmentError, ProviderError};
use crate::model::{CorrectAnswer, Level, Question, QuestionMetadata};
use crate::prompts::{build_prompt, GenerationContext};
use crate::traits::{extract_json_payload, GenerateRequest, LlmProvider, DEFAULT_SYSTEM_PROMPT};

const DEFAULT_TIME_BUDGET_SECS: u32 = 60;

/// Knobs for question generation.
#[derive(Debug, Clone)]
pub struct GenerationSettings {
    /// Model identifier passed to the provider.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f64,
    /// Max tokens per generation call.
    pub max_tokens: u32,
    /// Total attempts per skill task, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on each further retry.
    pub retry_delay: Duration,
    /// Upper bound for the backoff delay.
    pub max_retry_delay: Duration,
    /// Optional system prompt override.
    pub system_prompt: Option<String>,
    /// Questions per skill; `None` uses the level's default.
    pub batch_size: Option<u32>,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            model: "claude-sonnet-4-20250514".to_string(),
            temperature: 0.7,
            max_tokens: 4096,
            max_attempts: 4,
            retry_delay: Duration::from_secs(1),
            max_retry_delay: Duration::from_secs(60),
            system_prompt: None,
            batch_size: None,
        }
    }
}

/// Validated questions produced by one skill task.
#[derive(Debug, Clone)]
pub struct SkillBatch {
    pub skill: String,
    pub questions: Vec<Question>,
    /// Attempts it took to get a valid batch.
    pub attempts: u32,
}

/// Why a single generation attempt was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchError {
    /// The provider call itself failed.
    #[error("provider error: {0}")]
    Provider(String),
    /// The output was not a JSON list of question objects.
    #[error("unparsable output: {0}")]
    Parse(String),
    /// The output parsed but broke the question schema.
    #[error("invalid question: {0}")]
    Validation(String),
}

/// Shape of one question as emitted by the model.
#[derive(Debug, Deserialize)]
struct RawQuestion {
    question: Option<String>,
    #[serde(default)]
    options: Vec<String>,
    answer: Option<String>,
    answers: Option<Vec<String>>,
    #[serde(alias = "Scenario")]
    scenario: Option<String>,
    max_time_required: Option<serde_json::Value>,
}

/// Generates validated question batches through an `LlmProvider`.
pub struct QuestionGenerator {
    provider: Arc<dyn LlmProvider>,
    settings: GenerationSettings,
}

impl QuestionGenerator {
    pub fn new(provider: Arc<dyn LlmProvider>, settings: GenerationSettings) -> Self {
        Self { provider, settings }
    }

    pub fn settings(&self) -> &GenerationSettings {
        &self.settings
    }

    /// Number of questions requested per skill at `level`.
    pub fn batch_size(&self, level: Level) -> u32 {
        self.settings
            .batch_size
            .unwrap_or_else(|| level.default_batch_size())
            .max(1)
    }

    /// Produce a validated batch for `skill` at `level`, retrying malformed
    /// output until the attempt budget is spent.
    pub async fn generate_batch(
        &self,
        level: Level,
        skill: &str,
        ctx: GenerationContext<'_>,
    ) -> Result<SkillBatch, AssessmentError> {
        let count = self.batch_size(level);
        let request = GenerateRequest {
            model: self.settings.model.clone(),
            prompt: build_prompt(level, skill, ctx, count),
            system_prompt: Some(
                self.settings
                    .system_prompt
                    .clone()
                    .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            ),
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
            stop_sequences: vec![],
        };

        let max_attempts = self.settings.max_attempts.max(1);
        let mut retry_delay = self.settings.retry_delay;
        let mut last_failure = None;

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                tokio::time::sleep(retry_delay).await;
                retry_delay = (retry_delay * 2).min(self.settings.max_retry_delay);
            }

            let failure = match self.provider.generate(&request).await {
                Ok(response) => match parse_batch(level, skill, &response.content, count) {
                    Ok(questions) => {
                        tracing::debug!(
                            skill,
                            %level,
                            attempt,
                            count = questions.len(),
                            "generated question batch"
                        );
                        return Ok(SkillBatch {
                            skill: skill.to_string(),
                            questions,
                            attempts: attempt,
                        });
                    }
                    Err(e) => e,
                },
                Err(e) => {
                    if let Some(provider_err) = e.downcast_ref::<ProviderError>() {
                        if provider_err.is_permanent() {
                            return Err(AssessmentError::GenerationFailure {
                                skill: skill.to_string(),
                                level,
                                attempts: attempt,
                                reason: provider_err.to_string(),
                            });
                        }
                        // Use provider's retry-after hint if available, within the cap
                        if let Some(ms) = provider_err.retry_after_ms() {
                            retry_delay =
                                Duration::from_millis(ms).min(self.settings.max_retry_delay);
                        }
                    }
                    BatchError::Provider(format!("{e:#}"))
                }
            };

            tracing::warn!(
                skill,
                %level,
                attempt,
                max_attempts,
                "generation attempt rejected: {failure}"
            );
            last_failure = Some(failure);
        }

        Err(match last_failure {
            Some(BatchError::Validation(reason)) => AssessmentError::ValidationFailure {
                skill: skill.to_string(),
                level,
                attempts: max_attempts,
                reason,
            },
            other => AssessmentError::GenerationFailure {
                skill: skill.to_string(),
                level,
                attempts: max_attempts,
                reason: other.map(|f| f.to_string()).unwrap_or_default(),
            },
        })
    }
}

/// Parse and validate raw model output into at most `limit` questions tagged
/// with `skill` and `level`.
pub fn parse_batch(
    level: Level,
    skill: &str,
    raw: &str,
    limit: u32,
) -> Result<Vec<Question>, BatchError> {
    let payload = extract_json_payload(raw);
    let mut items: Vec<RawQuestion> =
        serde_json::from_str(&payload).map_err(|e| BatchError::Parse(e.to_string()))?;

    if items.is_empty() {
        return Err(BatchError::Validation("empty question list".into()));
    }
    let limit = limit.max(1) as usize;
    if items.len() > limit {
        tracing::debug!(skill, %level, got = items.len(), limit, "truncating oversized batch");
        items.truncate(limit);
    }

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| validate_item(level, skill, item).map_err(|e| prefix(index, e)))
        .collect()
}

fn prefix(index: usize, err: BatchError) -> BatchError {
    match err {
        BatchError::Validation(msg) => BatchError::Validation(format!("item {index}: {msg}")),
        other => other,
    }
}

fn validate_item(level: Level, skill: &str, item: RawQuestion) -> Result<Question, BatchError> {
    let invalid = |msg: &str| BatchError::Validation(msg.to_string());

    let prompt = item
        .question
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty())
        .ok_or_else(|| invalid("missing question text"))?;

    let options: Vec<String> = item.options.iter().map(|o| o.trim().to_string()).collect();
    if options.iter().any(String::is_empty) {
        return Err(invalid("empty option"));
    }
    if options.len() < 2 {
        return Err(invalid("fewer than 2 options"));
    }
    let distinct: HashSet<&str> = options.iter().map(String::as_str).collect();
    if distinct.len() != options.len() {
        return Err(invalid("duplicate options"));
    }

    let correct = match (item.answers, item.answer) {
        (Some(answers), _) => {
            let set: BTreeSet<String> = answers.iter().map(|a| a.trim().to_string()).collect();
            if set.is_empty() {
                return Err(invalid("empty answer set"));
            }
            if let Some(unknown) = set.iter().find(|a| !distinct.contains(a.as_str())) {
                return Err(BatchError::Validation(format!(
                    "answer '{unknown}' is not one of the options"
                )));
            }
            CorrectAnswer::Multiple(set)
        }
        (None, Some(answer)) => {
            let answer = answer.trim().to_string();
            if !distinct.contains(answer.as_str()) {
                return Err(BatchError::Validation(format!(
                    "answer '{answer}' is not one of the options"
                )));
            }
            CorrectAnswer::Single(answer)
        }
        (None, None) => return Err(invalid("missing answer")),
    };

    if !level.accepts(correct.kind()) {
        return Err(BatchError::Validation(format!(
            "{} questions are not allowed at {level}",
            correct.kind()
        )));
    }

    let scenario = match level {
        Level::Scenario => Some(
            item.scenario
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .ok_or_else(|| invalid("missing scenario"))?,
        ),
        _ => None,
    };

    Ok(Question {
        id: Uuid::new_v4().to_string(),
        prompt,
        options,
        correct,
        level,
        metadata: QuestionMetadata {
            skill: skill.to_string(),
            time_budget_secs: parse_time_budget(item.max_time_required.as_ref()),
            scenario,
        },
    })
}

/// Accepts `90`, `"90"`, or `"90 seconds"`; anything else gets the default.
fn parse_time_budget(value: Option<&serde_json::Value>) -> u32 {
    let parsed = match value {
        Some(serde_json::Value::Number(n)) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Some(serde_json::Value::String(s)) => {
            let digits: String = s.trim().chars().take_while(char::is_ascii_digit).collect();
            digits.parse().ok()
        }
        _ => None,
    };
    parsed
        .filter(|secs| *secs > 0)
        .unwrap_or(DEFAULT_TIME_BUDGET_SECS)
}
