//! OpenAI-compatible model service.
//!
//! Works with: OpenAI, OpenRouter, Ollama, vLLM, Together AI, and any
//! endpoint exposing `/chat/completions`. Only plain text completions are
//! used; decisions are parsed from the reply text.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use toolwright_config::ProviderConfig;
use toolwright_core::conversation::Role;
use toolwright_core::error::ModelError;
use toolwright_core::model::{ModelRequest, ModelService};
use tracing::{debug, warn};

/// An OpenAI-compatible chat completions backend.
pub struct OpenAiCompatModel {
    name: String,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    client: reqwest::Client,
}

impl OpenAiCompatModel {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, ModelError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| ModelError::NotConfigured(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            temperature: 0.2,
            client,
        })
    }

    /// Build from the `[provider]` config section. Requires an API key.
    pub fn from_config(config: &ProviderConfig) -> Result<Self, ModelError> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            ModelError::NotConfigured(
                "no API key; set TOOLWRIGHT_API_KEY or provider.api_key".into(),
            )
        })?;
        Ok(Self::new("openai", &config.base_url, api_key, &config.model)?
            .with_temperature(config.temperature))
    }

    /// A local Ollama server (no key needed).
    pub fn ollama(base_url: Option<&str>, model: impl Into<String>) -> Result<Self, ModelError> {
        Self::new(
            "ollama",
            base_url.unwrap_or("http://localhost:11434/v1"),
            "ollama",
            model,
        )
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Convert a request into the chat completions payload.
    fn to_api_messages(request: &ModelRequest) -> Vec<ApiMessage> {
        let system = request.system.iter().map(|s| ApiMessage {
            role: "system".into(),
            content: s.clone(),
        });
        let turns = request.turns.iter().map(|t| ApiMessage {
            role: match t.role {
                Role::User => "user".into(),
                Role::Assistant => "assistant".into(),
            },
            content: t.content.clone(),
        });
        system.chain(turns).collect()
    }

    fn request_body(&self, request: &ModelRequest) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "messages": Self::to_api_messages(request),
            "temperature": self.temperature,
            "stream": false,
        })
    }

    fn extract_text(response: ApiResponse) -> Result<String, ModelError> {
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ModelError::MalformedResponse("no choices in response".into()))?;
        Ok(choice.message.content.unwrap_or_default())
    }
}

#[async_trait]
impl ModelService for OpenAiCompatModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, request: ModelRequest) -> Result<String, ModelError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.request_body(&request);

        debug!(
            provider = %self.name,
            model = %self.model,
            turns = request.turns.len(),
            "Sending completion request"
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ModelError::Timeout(300)
                } else {
                    ModelError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();

        if status == 401 || status == 403 {
            return Err(ModelError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ));
        }

        if !response.status().is_success() {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Model service returned error");
            return Err(ModelError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| ModelError::MalformedResponse(format!("failed to parse response: {e}")))?;

        Self::extract_text(api_response)
    }
}

// ── OpenAI API types ──────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiReply,
}

#[derive(Debug, Deserialize)]
struct ApiReply {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use toolwright_core::conversation::Turn;
    use toolwright_core::cost::EstimationStrategy;

    fn model() -> OpenAiCompatModel {
        OpenAiCompatModel::new("openai", "https://api.openai.com/v1/", "sk-test", "gpt-4o-mini")
            .unwrap()
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        assert_eq!(model().base_url, "https://api.openai.com/v1");
    }

    #[test]
    fn ollama_constructor() {
        let m = OpenAiCompatModel::ollama(None, "llama3").unwrap();
        assert_eq!(m.name(), "ollama");
        assert!(m.base_url.contains("localhost:11434"));
        assert_eq!(m.model(), "llama3");
    }

    #[test]
    fn from_config_requires_api_key() {
        let config = ProviderConfig {
            api_key: None,
            ..ProviderConfig::default()
        };
        assert!(matches!(
            OpenAiCompatModel::from_config(&config),
            Err(ModelError::NotConfigured(_))
        ));

        let config = ProviderConfig {
            api_key: Some("sk-x".into()),
            temperature: 0.7,
            ..ProviderConfig::default()
        };
        let m = OpenAiCompatModel::from_config(&config).unwrap();
        assert_eq!(m.temperature, 0.7);
    }

    #[test]
    fn system_prompt_comes_first() {
        let request = ModelRequest::new(vec![
            Turn::user("List files", EstimationStrategy::Standard),
            Turn::assistant("ACTION: list_files", EstimationStrategy::Standard),
        ])
        .with_system("You are an agent");

        let body = model().request_body(&request);
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[1]["role"], "user");
        assert_eq!(messages[2]["role"], "assistant");
        assert_eq!(messages[2]["content"], "ACTION: list_files");
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["stream"], false);
    }

    #[test]
    fn reply_text_is_extracted() {
        let response: ApiResponse = serde_json::from_str(
            r#"{"choices": [{"message": {"role": "assistant", "content": "STATUS: final"}}]}"#,
        )
        .unwrap();
        assert_eq!(OpenAiCompatModel::extract_text(response).unwrap(), "STATUS: final");
    }

    #[test]
    fn empty_choices_are_malformed() {
        let response: ApiResponse = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        assert!(matches!(
            OpenAiCompatModel::extract_text(response),
            Err(ModelError::MalformedResponse(_))
        ));
    }

    #[test]
    fn null_content_is_empty_text() {
        let response: ApiResponse =
            serde_json::from_str(r#"{"choices": [{"message": {"content": null}}]}"#).unwrap();
        assert_eq!(OpenAiCompatModel::extract_text(response).unwrap(), "");
    }
}
