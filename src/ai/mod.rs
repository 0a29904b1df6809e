//! Content generation integration.
//!
//! Wraps the external text-generation call behind [`GenerationGateway`].
//! A gateway makes exactly one outbound call per invocation: no retries and
//! no caching, both of which belong to the workflow engine.
//!
//! ## Providers
//!
//! - [`GeminiGateway`] - Google Gemini `generateContent` API
//! - [`DemoGateway`] - deterministic offline output

mod credential;
mod demo;
#[cfg(feature = "gemini")]
mod gemini;

pub use credential::Credential;
pub use demo::DemoGateway;
#[cfg(feature = "gemini")]
pub use gemini::GeminiGateway;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::workflow::ContentFormat;

/// A single generation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    /// Fully rendered prompt
    pub prompt: String,
    /// Display label of the phase being generated
    pub phase_label: String,
    /// Expected shape of the response
    pub format: ContentFormat,
}

impl GenerationRequest {
    /// Create a request.
    pub fn new(prompt: impl Into<String>, phase_label: impl Into<String>, format: ContentFormat) -> Self {
        Self { prompt: prompt.into(), phase_label: phase_label.into(), format }
    }

    /// Prompt framed with the assistant instruction for this phase.
    pub fn framed_prompt(&self) -> String {
        format!("{}\n\n{}", system_prompt(&self.phase_label, self.format), self.prompt)
    }
}

/// Generation failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("API key is required but not provided")]
    MissingCredential,

    #[error("{0}")]
    GenerationFailed(String),
}

impl GatewayError {
    /// Human-readable reason shown to the user.
    pub fn reason(&self) -> String {
        self.to_string()
    }
}

/// The external content-generation call.
#[async_trait]
pub trait GenerationGateway: Send + Sync {
    /// Generate text for a phase.
    ///
    /// Implementations reject an empty credential with
    /// [`GatewayError::MissingCredential`] without calling out.
    async fn generate(
        &self,
        request: &GenerationRequest,
        credential: &Credential,
    ) -> Result<String, GatewayError>;

    /// Get the provider name.
    fn name(&self) -> &str;
}

/// Reject an empty credential.
pub fn ensure_credential(credential: &Credential) -> Result<(), GatewayError> {
    if credential.is_empty() {
        return Err(GatewayError::MissingCredential);
    }
    Ok(())
}

/// Assistant instruction placed ahead of every prompt.
pub fn system_prompt(phase_label: &str, format: ContentFormat) -> String {
    format!(
        "You are an expert assistant specialized in the Software Development Life Cycle. \
         Your task is to provide a detailed, professional, and well-structured output for the '{}' phase. {}",
        phase_label,
        format.instruction()
    )
}

static LEADING_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*```[A-Za-z0-9_+-]*[ \t]*(?:\r?\n)?").expect("valid leading fence pattern")
});

static TRAILING_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:\r?\n)?[ \t]*```\s*$").expect("valid trailing fence pattern"));

/// Strip a leading and trailing code fence, optionally language-tagged.
///
/// Text without fences is only trimmed.
pub fn strip_code_fences(text: &str) -> String {
    let without_leading = LEADING_FENCE.replace(text, "");
    let without_trailing = TRAILING_FENCE.replace(&without_leading, "");
    without_trailing.trim().to_string()
}
