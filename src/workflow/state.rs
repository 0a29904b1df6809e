//! The mutable workflow aggregate.

use std::collections::HashMap;

use crate::ai::Credential;
use crate::core::SessionStore;

use super::catalog::{StepCatalog, ENTRY_STEP};

/// Snapshot of a workflow session.
///
/// Only [`WorkflowEngine`](super::WorkflowEngine) mutates the live copy;
/// everyone else reads clones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowState {
    /// Generation API credential; empty until the workflow is started
    pub credential: Credential,

    /// Project description supplied at entry
    pub project_prompt: String,

    /// Current step or sentinel id
    pub current_step_id: String,

    /// Generated (or user-edited) text by step id
    pub content: HashMap<String, String>,

    /// Approval flags by step id
    pub approved: HashMap<String, bool>,

    /// Feedback by step id; `Some` means a regeneration is pending
    pub feedback: HashMap<String, Option<String>>,

    /// Step whose generation call is outstanding
    pub in_flight: Option<String>,
}

impl Default for WorkflowState {
    fn default() -> Self {
        Self {
            credential: Credential::default(),
            project_prompt: String::new(),
            current_step_id: ENTRY_STEP.to_string(),
            content: HashMap::new(),
            approved: HashMap::new(),
            feedback: HashMap::new(),
            in_flight: None,
        }
    }
}

impl WorkflowState {
    /// Rebuild state from the session store.
    ///
    /// A stored current step that the catalog does not know is replaced by
    /// the entry sentinel.
    pub fn restore(store: &SessionStore, catalog: &StepCatalog) -> Self {
        let mut current_step_id = store.current_step();
        if !catalog.contains(&current_step_id) {
            tracing::warn!(step = %current_step_id, "Stored step is unknown, returning to entry");
            current_step_id = ENTRY_STEP.to_string();
        }

        let state = Self {
            credential: Credential::new(store.api_key()),
            project_prompt: store.project_prompt(),
            current_step_id,
            content: store.generated_content(),
            approved: store.approved_states(),
            feedback: store.feedback_states(),
            in_flight: None,
        };
        tracing::debug!(
            step = %state.current_step_id,
            generated = state.content.len(),
            approved = state.approved_count(),
            "Restored workflow state"
        );
        state
    }

    /// Non-blank content for a step.
    pub fn content(&self, step_id: &str) -> Option<&str> {
        self.content.get(step_id).map(String::as_str).filter(|c| !c.trim().is_empty())
    }

    /// Whether a step has non-blank content.
    pub fn has_content(&self, step_id: &str) -> bool {
        self.content(step_id).is_some()
    }

    /// Whether a step is approved.
    pub fn is_approved(&self, step_id: &str) -> bool {
        self.approved.get(step_id).copied().unwrap_or(false)
    }

    /// Pending feedback for a step.
    pub fn pending_feedback(&self, step_id: &str) -> Option<&str> {
        self.feedback.get(step_id).and_then(|f| f.as_deref())
    }

    /// Consume pending feedback, leaving a null entry behind.
    pub fn take_feedback(&mut self, step_id: &str) -> Option<String> {
        self.feedback.get_mut(step_id).and_then(Option::take)
    }

    /// Number of approved steps.
    pub fn approved_count(&self) -> usize {
        self.approved.values().filter(|v| **v).count()
    }

    /// Whether a generation call is outstanding.
    pub fn is_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Whether credential and project description are both set.
    pub fn is_configured(&self) -> bool {
        !self.credential.is_empty() && !self.project_prompt.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StoreField;

    #[test]
    fn test_default_is_entry() {
        let state = WorkflowState::default();
        assert_eq!(state.current_step_id, ENTRY_STEP);
        assert!(!state.is_configured());
        assert!(!state.is_in_flight());
    }

    #[test]
    fn test_take_feedback_is_one_shot() {
        let mut state = WorkflowState::default();
        state.feedback.insert("design_docs".into(), Some("more".into()));

        assert_eq!(state.pending_feedback("design_docs"), Some("more"));
        assert_eq!(state.take_feedback("design_docs"), Some("more".to_string()));
        assert_eq!(state.take_feedback("design_docs"), None);
        assert_eq!(state.feedback.get("design_docs"), Some(&None));
    }

    #[test]
    fn test_blank_content_is_absent() {
        let mut state = WorkflowState::default();
        state.content.insert("user_stories".into(), "  ".into());
        assert!(!state.has_content("user_stories"));
        assert!(state.content("user_stories").is_none());
    }

    #[test]
    fn test_restore_replaces_unknown_step() {
        let store = SessionStore::in_memory();
        store.set(StoreField::CurrentStep, "no_such_step");
        store.save_project_prompt("Build a todo app");

        let state = WorkflowState::restore(&store, &StepCatalog::sdlc());
        assert_eq!(state.current_step_id, ENTRY_STEP);
        assert_eq!(state.project_prompt, "Build a todo app");
    }
}
