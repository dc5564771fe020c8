//! Gemini API client
//!
//! Uses a long-lived reqwest::Client for connection pooling.

use crate::config::LlmConfig;
use crate::error::ChatError;
use crate::llm::{CompletionRequest, LanguageModel};
use crate::memory::TurnRole;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info};

/// Reusable Gemini client (connection-pooled)
pub struct GeminiClient {
    client: Client,
    api_key: String,
    endpoint: String,
}

impl GeminiClient {
    pub fn new(config: &LlmConfig) -> crate::Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(config.timeout)
            .build()
            .map_err(|e| ChatError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            endpoint: format!(
                "{}/models/{}:generateContent",
                config.base_url.trim_end_matches('/'),
                config.model
            ),
        })
    }
}

#[async_trait]
impl LanguageModel for GeminiClient {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn complete(&self, request: &CompletionRequest) -> crate::Result<String> {
        if self.api_key.is_empty() {
            return Err(ChatError::LlmError("GEMINI_API_KEY not configured".to_string()));
        }

        let body = build_request(request);

        info!(purpose = ?request.purpose, messages = request.messages.len(), "Calling Gemini API");

        let response = self
            .client
            .post(&self.endpoint)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!("Gemini API request failed: {}", e);
                if e.is_timeout() {
                    ChatError::ProviderTimeout("Gemini API timed out".to_string())
                } else {
                    ChatError::LlmError(format!("Gemini API error: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!(%status, "Gemini API error response: {}", error_text);
            return Err(ChatError::LlmError(format!(
                "Gemini API returned {}: {}",
                status, error_text
            )));
        }

        let gemini_response: GeminiResponse = response.json().await.map_err(|e| {
            error!("Failed to parse Gemini response: {}", e);
            ChatError::LlmError(format!("Gemini parse error: {}", e))
        })?;

        let answer = extract_text(&gemini_response)?;

        debug!(
            finish_reason = ?gemini_response.candidates.first().and_then(|c| c.finish_reason.as_deref()),
            "Gemini response received"
        );

        Ok(answer)
    }
}

fn build_request(request: &CompletionRequest) -> GeminiRequest {
    let contents = request
        .messages
        .iter()
        .map(|message| Content {
            role: Some(
                match message.role {
                    TurnRole::User => "user",
                    TurnRole::Assistant => "model",
                }
                .to_string(),
            ),
            parts: vec![Part {
                text: message.text.clone(),
            }],
        })
        .collect();

    GeminiRequest {
        contents,
        generation_config: GenerationConfig {
            temperature: 0.7,
            top_p: 0.9,
            top_k: 40,
            max_output_tokens: 1024,
        },
        system_instruction: SystemInstruction {
            parts: vec![Part {
                text: request.system.clone(),
            }],
        },
    }
}

/// Concatenate the text parts of the first candidate
fn extract_text(response: &GeminiResponse) -> crate::Result<String> {
    let candidate = response
        .candidates
        .first()
        .ok_or_else(|| ChatError::LlmError("No response from Gemini API".to_string()))?;

    let text: String = candidate
        .content
        .as_ref()
        .map(|content| content.parts.iter().map(|p| p.text.as_str()).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(ChatError::LlmError(format!(
            "Empty response from Gemini (finish reason: {})",
            candidate.finish_reason.as_deref().unwrap_or("unknown")
        )));
    }

    Ok(text)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
    system_instruction: SystemInstruction,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: i32,
    max_output_tokens: i32,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}
