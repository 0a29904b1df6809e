//! Offline demo provider.
//!
//! Produces deterministic placeholder content so the workflow can be
//! walked end to end without network access or a real credential.

use async_trait::async_trait;

use super::{ensure_credential, Credential, GatewayError, GenerationGateway, GenerationRequest};
use crate::workflow::ContentFormat;

const FEEDBACK_MARKER: &str = "Please incorporate this feedback:";

/// Deterministic offline gateway.
#[derive(Debug, Clone, Default)]
pub struct DemoGateway {
    failure: Option<String>,
}

impl DemoGateway {
    /// Create a demo gateway that always succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a demo gateway that always fails with `reason`.
    pub fn failing(reason: impl Into<String>) -> Self {
        Self { failure: Some(reason.into()) }
    }

    fn render(request: &GenerationRequest) -> String {
        let feedback = request
            .prompt
            .split_once(FEEDBACK_MARKER)
            .map(|(_, fb)| fb.trim().to_string());

        match request.format {
            ContentFormat::Html => {
                let note = feedback.map(|fb| format!("<p>Revised: {fb}</p>\n")).unwrap_or_default();
                format!(
                    "```html\n<!DOCTYPE html>\n<html>\n<head><title>{label}</title></head>\n<body>\n<h1>{label} (demo)</h1>\n{note}</body>\n</html>\n```",
                    label = request.phase_label
                )
            }
            ContentFormat::Markdown => {
                let summary: String = request.prompt.chars().take(120).collect();
                let mut text = format!(
                    "# {} (demo)\n\nGenerated offline for:\n\n> {}\n",
                    request.phase_label,
                    summary.replace('\n', " ")
                );
                if let Some(fb) = feedback {
                    text.push_str(&format!("\n## Revision\n\nIncorporated feedback: {fb}\n"));
                }
                text
            }
        }
    }
}

#[async_trait]
impl GenerationGateway for DemoGateway {
    async fn generate(
        &self,
        request: &GenerationRequest,
        credential: &Credential,
    ) -> Result<String, GatewayError> {
        ensure_credential(credential)?;
        if let Some(reason) = &self.failure {
            return Err(GatewayError::GenerationFailed(reason.clone()));
        }
        Ok(Self::render(request))
    }

    fn name(&self) -> &str {
        "demo"
    }
}
