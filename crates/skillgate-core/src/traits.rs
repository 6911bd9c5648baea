//! Capability traits consumed by the assessment engine.
//!
//! Text generation and structured-field extraction are external
//! collaborators. `skillgate-providers` implements `LlmProvider` for real
//! backends; the engine only sees these traits.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// LLM Provider trait
// ---------------------------------------------------------------------------

/// Trait for LLM backends that turn a prompt into text.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Human-readable provider name (e.g. "anthropic").
    fn name(&self) -> &str;

    /// Generate text from a prompt.
    async fn generate(&self, request: &GenerateRequest) -> anyhow::Result<GenerateResponse>;

    /// List available models for this provider.
    fn available_models(&self) -> Vec<ModelInfo>;
}

/// Request to generate text from an LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    /// Model identifier (e.g. "claude-sonnet-4-20250514").
    pub model: String,
    /// The main prompt.
    pub prompt: String,
    /// Optional system prompt override.
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f64,
    /// Stop sequences.
    #[serde(default)]
    pub stop_sequences: Vec<String>,
}

/// Response from an LLM generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateResponse {
    /// The raw response content.
    pub content: String,
    /// Model that actually generated the response.
    pub model: String,
    /// Token usage.
    pub token_usage: TokenUsage,
    /// Latency in milliseconds.
    pub latency_ms: u64,
}

/// Token accounting for one generation call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    pub estimated_cost_usd: f64,
}

/// Information about an available model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Model identifier.
    pub id: String,
    /// Human-readable model name.
    pub name: String,
    /// Provider name.
    pub provider: String,
    /// Maximum context window size in tokens.
    pub max_context: u32,
    /// Cost per 1K input tokens in USD.
    pub cost_per_1k_input: f64,
    /// Cost per 1K output tokens in USD.
    pub cost_per_1k_output: f64,
}

// ---------------------------------------------------------------------------
// Structured field extraction
// ---------------------------------------------------------------------------

/// Shape of an extracted field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Text,
    List,
}

/// One field of an extraction schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub description: &'static str,
    pub required: bool,
}

/// Turns free text (a job posting, a resume) into a JSON object with the
/// fields named by `schema`.
#[async_trait]
pub trait FieldExtractor: Send + Sync {
    async fn extract(
        &self,
        free_text: &str,
        schema: &[FieldSpec],
    ) -> anyhow::Result<serde_json::Map<String, serde_json::Value>>;
}

// ---------------------------------------------------------------------------
// Default system prompt
// ---------------------------------------------------------------------------

/// Default system prompt for question generation.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an expert technical assessment author. Respond ONLY with valid JSON. Do not include explanations, commentary, or markdown formatting.";

// ---------------------------------------------------------------------------
// JSON payload extraction
// ---------------------------------------------------------------------------

/// Extract the JSON payload from an LLM response.
///
/// Handles:
/// - A ```json block (preferred) or a generic ``` block
/// - Truncated (unclosed) fenced blocks
/// - Prose before or after a bare JSON array/object
pub fn extract_json_payload(response: &str) -> String {
    let mut json_block: Option<String> = None;
    let mut generic_block: Option<String> = None;
    let mut in_block = false;
    let mut is_json_block = false;
    let mut is_generic_block = false;
    let mut current_block = String::new();

    for line in response.lines() {
        let trimmed = line.trim();

        if !in_block && trimmed.starts_with("```") {
            in_block = true;
            let lang = trimmed.trim_start_matches('`').trim().to_lowercase();
            is_json_block = lang == "json";
            is_generic_block = lang.is_empty();
            current_block.clear();
            continue;
        }

        if in_block && trimmed == "```" {
            in_block = false;
            if is_json_block && json_block.is_none() {
                json_block = Some(current_block.clone());
            } else if is_generic_block && generic_block.is_none() {
                generic_block = Some(current_block.clone());
            }
            current_block.clear();
            continue;
        }

        if in_block {
            if !current_block.is_empty() {
                current_block.push('\n');
            }
            current_block.push_str(line);
        }
    }

    if in_block && !current_block.is_empty() {
        if is_json_block && json_block.is_none() {
            json_block = Some(current_block);
        } else if is_generic_block && generic_block.is_none() {
            generic_block = Some(current_block);
        }
    }

    if let Some(block) = json_block.or(generic_block) {
        return block.trim().to_string();
    }

    let trimmed = response.trim();
    if trimmed.starts_with('[') || trimmed.starts_with('{') {
        return trimmed.to_string();
    }

    // Prose around a bare payload: take the outermost bracketed span.
    let start = trimmed.find(['[', '{']);
    let end = trimmed.rfind([']', '}']);
    match (start, end) {
        (Some(start), Some(end)) if end > start => trimmed[start..=end].to_string(),
        _ => trimmed.to_string(),
    }
}
