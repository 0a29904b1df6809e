//! Google Gemini API integration.
//!
//! Implements the GenerationGateway trait for the `generateContent` endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{ensure_credential, Credential, GatewayError, GenerationGateway, GenerationRequest};
use crate::core::AiConfig;

/// Gemini API gateway.
pub struct GeminiGateway {
    client: Client,
    base_url: String,
    model: String,
}

impl Default for GeminiGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl GeminiGateway {
    /// Create a gateway with default settings and no transport timeout.
    pub fn new() -> Self {
        let defaults = AiConfig::default();
        Self { client: Client::new(), base_url: defaults.base_url, model: defaults.model }
    }

    /// Create a gateway from configuration.
    pub fn from_config(config: &AiConfig) -> anyhow::Result<Self> {
        let mut builder = Client::builder();
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        Ok(Self { client: builder.build()?, base_url: config.base_url.clone(), model: config.model.clone() })
    }

    /// Create with a specific base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Create with a specific model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Full `generateContent` URL for the configured model.
    pub fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url.trim_end_matches('/'), self.model)
    }

    /// Make a request to the Gemini API.
    async fn request(&self, prompt: String, credential: &Credential) -> Result<String, GatewayError> {
        let payload = GeminiRequest { contents: vec![Content { parts: vec![Part { text: prompt }] }] };

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", credential.expose())
            .header("content-type", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| GatewayError::GenerationFailed(transport_reason(&e)))?;

        let status = response.status();
        tracing::debug!(status = status.as_u16(), "Gemini API response");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::GenerationFailed(error_reason(status.as_u16(), &body)));
        }

        let body: GeminiResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::GenerationFailed(format!("Invalid response from Gemini API: {e}")))?;

        extract_text(body)
    }
}

#[async_trait]
impl GenerationGateway for GeminiGateway {
    async fn generate(
        &self,
        request: &GenerationRequest,
        credential: &Credential,
    ) -> Result<String, GatewayError> {
        ensure_credential(credential)?;

        let prompt = request.framed_prompt();
        tracing::debug!(
            phase = %request.phase_label,
            model = %self.model,
            prompt_chars = prompt.len(),
            key_len = credential.len(),
            "Calling Gemini API"
        );

        self.request(prompt, credential).await
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

fn transport_reason(error: &reqwest::Error) -> String {
    if error.is_timeout() {
        "timeout".to_string()
    } else if error.is_connect() {
        format!("connection failed: {error}")
    } else {
        error.to_string()
    }
}

fn error_reason(status: u16, body: &str) -> String {
    let message = serde_json::from_str::<GeminiErrorBody>(body)
        .ok()
        .and_then(|b| b.error)
        .and_then(|e| e.message)
        .unwrap_or_else(|| "Unknown error".to_string());
    format!("API Error: {status} - {message}")
}

fn extract_text(response: GeminiResponse) -> Result<String, GatewayError> {
    response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .and_then(|c| c.parts.into_iter().next())
        .map(|p| p.text)
        .ok_or_else(|| GatewayError::GenerationFailed("Invalid response structure from Gemini API".to_string()))
}

/// Gemini request body.
#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

/// Gemini response body.
#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorBody {
    error: Option<GeminiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    message: Option<String>,
}
