//! OpenAI-compatible chat completions provider.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use skillgate_core::traits::{
    GenerateRequest, GenerateResponse, LlmProvider, ModelInfo, TokenUsage, DEFAULT_SYSTEM_PROMPT,
};

use crate::ProviderError;

const DEFAULT_BASE_URL: &str = "https://api.openai.com";
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// OpenAI-compatible API provider.
pub struct OpenAiProvider {
    api_key: String,
    base_url: String,
    org_id: Option<String>,
    client: reqwest::Client,
}

impl OpenAiProvider {
    pub fn new(
        api_key: &str,
        base_url: Option<String>,
        org_id: Option<String>,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            api_key: api_key.to_string(),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            org_id,
            client,
        })
    }
}

#[derive(Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f64,
    messages: Vec<OpenAiMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<&'a [String]>,
}

#[derive(Serialize)]
struct OpenAiMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    usage: OpenAiUsage,
    model: String,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiChoiceMessage,
}

#[derive(Deserialize)]
struct OpenAiChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize, Default)]
struct OpenAiUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    #[instrument(skip(self, request), fields(model = %request.model))]
    async fn generate(&self, request: &GenerateRequest) -> anyhow::Result<GenerateResponse> {
        let start = Instant::now();

        let body = OpenAiRequest {
            model: &request.model,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            messages: vec![
                OpenAiMessage {
                    role: "system",
                    content: request
                        .system_prompt
                        .as_deref()
                        .unwrap_or(DEFAULT_SYSTEM_PROMPT),
                },
                OpenAiMessage {
                    role: "user",
                    content: &request.prompt,
                },
            ],
            stop: (!request.stop_sequences.is_empty())
                .then_some(request.stop_sequences.as_slice()),
        };

        let mut req = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("content-type", "application/json");

        if let Some(org) = &self.org_id {
            req = req.header("OpenAI-Organization", org);
        }

        let response = req.json(&body).send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout(DEFAULT_TIMEOUT_SECS)
            } else {
                ProviderError::NetworkError(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        if status == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(5)
                * 1000;
            return Err(ProviderError::RateLimited {
                retry_after_ms: retry_after,
            }
            .into());
        }
        if status == 401 {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::AuthenticationFailed(body).into());
        }
        if status == 404 {
            return Err(ProviderError::ModelNotFound(request.model.clone()).into());
        }
        if status >= 400 {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::ApiError {
                status,
                message: body,
            }
            .into());
        }

        let api_response: OpenAiResponse =
            response.json().await.map_err(|e| ProviderError::ApiError {
                status: 0,
                message: format!("failed to parse response: {e}"),
            })?;

        let latency_ms = start.elapsed().as_millis() as u64;
        let content = api_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        let usage = &api_response.usage;
        // GPT-4.1 pricing: $2/$8 per 1M tokens
        let estimated_cost =
            (usage.prompt_tokens as f64 * 2.0 + usage.completion_tokens as f64 * 8.0) / 1_000_000.0;

        Ok(GenerateResponse {
            content,
            model: api_response.model,
            token_usage: TokenUsage {
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: usage.completion_tokens,
                total_tokens: usage.total_tokens,
                estimated_cost_usd: estimated_cost,
            },
            latency_ms,
        })
    }

    fn available_models(&self) -> Vec<ModelInfo> {
        vec![
            ModelInfo {
                id: "gpt-4.1".into(),
                name: "GPT-4.1".into(),
                provider: "openai".into(),
                max_context: 1_000_000,
                cost_per_1k_input: 0.002,
                cost_per_1k_output: 0.008,
            },
            ModelInfo {
                id: "gpt-4.1-mini".into(),
                name: "GPT-4.1 Mini".into(),
                provider: "openai".into(),
                max_context: 1_000_000,
                cost_per_1k_input: 0.0004,
                cost_per_1k_output: 0.0016,
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request(model: &str) -> GenerateRequest {
        GenerateRequest {
            model: model.into(),
            prompt: "Generate 5 multiple select questions".into(),
            system_prompt: Some("JSON only".into()),
            max_tokens: 1024,
            temperature: 0.7,
            stop_sequences: vec![],
        }
    }

    #[tokio::test]
    async fn successful_generation() {
        let server = MockServer::start().await;

        let response_body = serde_json::json!({
            "choices": [{"message": {"content": "[{\"question\": \"q\"}]", "role": "assistant"}, "index": 0}],
            "model": "gpt-4.1",
            "usage": {"prompt_tokens": 40, "completion_tokens": 15, "total_tokens": 55}
        });

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("Authorization", "Bearer test-key"))
            .and(body_partial_json(serde_json::json!({
                "messages": [
                    {"role": "system", "content": "JSON only"},
                    {"role": "user", "content": "Generate 5 multiple select questions"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(&response_body))
            .mount(&server)
            .await;

        let provider = OpenAiProvider::new("test-key", Some(server.uri()), None).unwrap();
        let response = provider.generate(&request("gpt-4.1")).await.unwrap();
        assert_eq!(response.content, "[{\"question\": \"q\"}]");
        assert_eq!(response.token_usage.total_tokens, 55);
    }

    #[tokio::test]
    async fn custom_base_url_and_org_header() {
        let server = MockServer::start().await;

        let response_body = serde_json::json!({
            "choices": [{"message": {"content": "[]", "role": "assistant"}, "index": 0}],
            "model": "custom-model",
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        });

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("OpenAI-Organization", "org-123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&response_body))
            .mount(&server)
            .await;

        let provider =
            OpenAiProvider::new("key", Some(server.uri()), Some("org-123".into())).unwrap();
        let response = provider.generate(&request("custom-model")).await.unwrap();
        assert_eq!(response.model, "custom-model");
    }

    #[tokio::test]
    async fn server_error_is_transient() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("internal error"))
            .mount(&server)
            .await;

        let provider = OpenAiProvider::new("key", Some(server.uri()), None).unwrap();
        let err = provider.generate(&request("gpt-4.1")).await.unwrap_err();
        assert!(err.to_string().contains("HTTP 500"));
        assert!(!err.downcast_ref::<ProviderError>().unwrap().is_permanent());
    }

    #[tokio::test]
    async fn unknown_model_is_permanent() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let provider = OpenAiProvider::new("key", Some(server.uri()), None).unwrap();
        let err = provider.generate(&request("gpt-x")).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ProviderError>(),
            Some(ProviderError::ModelNotFound(model)) if model == "gpt-x"
        ));
    }
}
