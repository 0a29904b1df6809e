//! Read-only export of workflow content.
//!
//! Builds documents only; writing them anywhere is the caller's job.

use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::catalog::StepCatalog;
use super::state::WorkflowState;

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace pattern"));
static UNSAFE_FILE_CHAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9_-]").expect("valid file name pattern"));

/// Exported content of one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepExport {
    pub label: String,
    pub content: String,
    pub is_approved: bool,
}

/// Whole-workflow export document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowSnapshot {
    /// Project description
    pub project: String,

    /// Export timestamp, RFC 3339 UTC
    pub download_date: String,

    /// Steps with content, in catalog order
    pub steps: IndexMap<String, StepExport>,
}

impl WorkflowSnapshot {
    /// Capture every real step that has content.
    pub fn capture(catalog: &StepCatalog, state: &WorkflowState, now: DateTime<Utc>) -> Self {
        let steps = catalog
            .steps()
            .iter()
            .filter_map(|step| {
                let content = state.content(&step.id)?;
                Some((
                    step.id.clone(),
                    StepExport {
                        label: step.label.clone(),
                        content: content.to_string(),
                        is_approved: state.is_approved(&step.id),
                    },
                ))
            })
            .collect();

        Self {
            project: state.project_prompt.clone(),
            download_date: now.to_rfc3339_opts(SecondsFormat::Millis, true),
            steps,
        }
    }

    /// Pretty-printed JSON document.
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// A single step rendered as a downloadable file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepDocument {
    pub file_name: String,
    pub mime_type: &'static str,
    pub content: String,
}

/// Export one step's content, or `None` when it has none.
pub fn step_document(
    catalog: &StepCatalog,
    state: &WorkflowState,
    step_id: &str,
    now: DateTime<Utc>,
) -> Option<StepDocument> {
    let step = catalog.real_step(step_id)?;
    let content = state.content(step_id)?;

    Some(StepDocument {
        file_name: format!(
            "{}.{}",
            download_filename(&step.id, &state.project_prompt, now),
            step.format.extension()
        ),
        mime_type: step.format.mime_type(),
        content: content.to_string(),
    })
}

/// `<prefix>_<start of prompt>_<timestamp>` without an extension.
pub fn download_filename(prefix: &str, project_prompt: &str, now: DateTime<Utc>) -> String {
    let head: String = project_prompt.chars().take(20).collect();
    let head = if head.is_empty() {
        "project".to_string()
    } else {
        let spaced = WHITESPACE.replace_all(&head, "_");
        UNSAFE_FILE_CHAR.replace_all(&spaced, "_").into_owned()
    };
    let stamp = now.to_rfc3339_opts(SecondsFormat::Millis, true).replace([':', '.'], "-");
    format!("{prefix}_{head}_{stamp}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 5, 14, 7, 9).unwrap()
    }

    fn sample_state() -> WorkflowState {
        let mut state = WorkflowState {
            project_prompt: "Build a todo app with tags".into(),
            current_step_id: "design_docs".into(),
            ..WorkflowState::default()
        };
        state.content.insert("design_docs".into(), "DD".into());
        state.content.insert("user_stories".into(), "US".into());
        state.content.insert("test_cases".into(), "   ".into());
        state.approved.insert("user_stories".into(), true);
        state
    }

    #[test]
    fn test_snapshot_orders_by_catalog_and_skips_empty() {
        let snapshot = WorkflowSnapshot::capture(&StepCatalog::sdlc(), &sample_state(), fixed_now());

        let ids: Vec<_> = snapshot.steps.keys().cloned().collect();
        assert_eq!(ids, vec!["user_stories", "design_docs"]);
        assert!(snapshot.steps["user_stories"].is_approved);
        assert!(!snapshot.steps["design_docs"].is_approved);
        assert_eq!(snapshot.steps["design_docs"].label, "Design Docs");
        assert_eq!(snapshot.download_date, "2024-03-05T14:07:09.000Z");
    }

    #[test]
    fn test_snapshot_json_shape() {
        let snapshot = WorkflowSnapshot::capture(&StepCatalog::sdlc(), &sample_state(), fixed_now());
        let json: serde_json::Value = serde_json::from_str(&snapshot.to_json_pretty().unwrap()).unwrap();
        assert_eq!(json["project"], "Build a todo app with tags");
        assert_eq!(json["steps"]["user_stories"]["content"], "US");
        assert_eq!(json["steps"]["user_stories"]["is_approved"], true);
    }

    #[test]
    fn test_download_filename() {
        assert_eq!(
            download_filename("sdlc_workflow", "Build a todo app with tags", fixed_now()),
            "sdlc_workflow_Build_a_todo_app_wit_2024-03-05T14-07-09-000Z"
        );
        assert_eq!(
            download_filename("user_stories", "", fixed_now()),
            "user_stories_project_2024-03-05T14-07-09-000Z"
        );
    }

    #[test]
    fn test_download_filename_stays_in_one_path_segment() {
        assert_eq!(
            download_filename("sdlc_workflow", "Todo app w/ tags and reminders", fixed_now()),
            "sdlc_workflow_Todo_app_w__tags_and_2024-03-05T14-07-09-000Z"
        );

        let name = download_filename("sdlc_workflow", "../../etc/passwd", fixed_now());
        assert!(!name.contains('/'));
        assert!(!name.contains(".."));
        assert!(name.starts_with("sdlc_workflow_______etc_passwd_"));
    }

    #[test]
    fn test_step_document_formats() {
        let catalog = StepCatalog::sdlc();
        let mut state = sample_state();
        state.content.insert("code_generation".into(), "<html></html>".into());

        let doc = step_document(&catalog, &state, "code_generation", fixed_now()).unwrap();
        assert!(doc.file_name.starts_with("code_generation_"));
        assert!(doc.file_name.ends_with(".html"));
        assert_eq!(doc.mime_type, "text/html");

        let doc = step_document(&catalog, &state, "user_stories", fixed_now()).unwrap();
        assert!(doc.file_name.ends_with(".md"));
        assert_eq!(doc.mime_type, "text/markdown");

        assert!(step_document(&catalog, &state, "test_cases", fixed_now()).is_none());
        assert!(step_document(&catalog, &state, "api_input", fixed_now()).is_none());
    }
}
