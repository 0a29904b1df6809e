//! Which steps a user may jump to directly.
//!
//! Backward movement and steps that already have material are always
//! allowed; forward jumps into unvisited, ungenerated steps are not.

use super::catalog::{StepCatalog, ENTRY_STEP};
use super::state::WorkflowState;

/// Sidebar status of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepStatus {
    /// Approved by the user
    Approved,
    /// Current step with a generation call outstanding
    Generating,
    /// Has content awaiting review
    ContentAvailable,
    /// Not reachable yet
    Locked,
    /// Reachable but without content
    Open,
}

impl StepStatus {
    /// Icon shown next to the step label.
    pub fn icon(self) -> &'static str {
        match self {
            Self::Approved => "✅",
            Self::Generating => "⏳",
            Self::ContentAvailable => "🔵",
            Self::Locked => "🔒",
            Self::Open => " ",
        }
    }

    /// Short description for tooltips and listings.
    pub fn description(self) -> &'static str {
        match self {
            Self::Approved => "Approved",
            Self::Generating => "Generating...",
            Self::ContentAvailable => "Content available",
            Self::Locked => "Locked",
            Self::Open => "No content generated yet",
        }
    }
}

/// One row of the sidebar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepView {
    pub id: String,
    pub label: String,
    pub status: StepStatus,
    pub accessible: bool,
    pub current: bool,
}

/// Approval progress over the real steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub approved: usize,
    pub total: usize,
}

impl Progress {
    /// Whole-number percentage, 0 when there are no steps.
    pub fn percent(&self) -> usize {
        if self.total == 0 {
            0
        } else {
            (self.approved.min(self.total) * 100) / self.total
        }
    }
}

/// Navigation rules evaluated against a state snapshot.
#[derive(Debug, Clone, Copy)]
pub struct NavigationPolicy<'a> {
    catalog: &'a StepCatalog,
    state: &'a WorkflowState,
}

impl<'a> NavigationPolicy<'a> {
    pub fn new(catalog: &'a StepCatalog, state: &'a WorkflowState) -> Self {
        Self { catalog, state }
    }

    /// Whether `step_id` may be navigated to directly.
    pub fn is_accessible(&self, step_id: &str) -> bool {
        if step_id == ENTRY_STEP {
            return true;
        }
        let Some(ordinal) = self.catalog.ordinal(step_id) else {
            return false;
        };
        let current = self.catalog.ordinal(&self.state.current_step_id).unwrap_or(0);

        step_id == self.state.current_step_id
            || ordinal < current
            || self.state.has_content(step_id)
            || self.state.is_approved(step_id)
    }

    /// Sidebar status of a step.
    pub fn status(&self, step_id: &str) -> StepStatus {
        let is_entry = step_id == ENTRY_STEP;
        let is_current = step_id == self.state.current_step_id;

        if self.state.is_approved(step_id) {
            StepStatus::Approved
        } else if is_current && self.state.is_in_flight() {
            StepStatus::Generating
        } else if !is_entry && self.state.has_content(step_id) {
            StepStatus::ContentAvailable
        } else if !is_entry && !self.is_accessible(step_id) {
            StepStatus::Locked
        } else {
            StepStatus::Open
        }
    }

    /// Rows for the entry sentinel and every real step.
    pub fn views(&self) -> Vec<StepView> {
        std::iter::once(self.catalog.entry())
            .chain(self.catalog.steps())
            .map(|step| StepView {
                id: step.id.clone(),
                label: step.label.clone(),
                status: self.status(&step.id),
                accessible: self.is_accessible(&step.id),
                current: step.id == self.state.current_step_id,
            })
            .collect()
    }

    /// Approved real steps over all real steps.
    pub fn progress(&self) -> Progress {
        let approved =
            self.catalog.steps().iter().filter(|s| self.state.is_approved(&s.id)).count();
        Progress { approved, total: self.catalog.len() }
    }

    /// Whether a workflow export makes sense yet.
    pub fn can_export(&self) -> bool {
        self.state.current_step_id != ENTRY_STEP
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::TERMINAL_STEP;

    fn state_at(step: &str) -> WorkflowState {
        WorkflowState { current_step_id: step.to_string(), ..WorkflowState::default() }
    }

    #[test]
    fn test_forward_steps_locked() {
        let catalog = StepCatalog::sdlc();
        let state = state_at("user_stories");
        let policy = NavigationPolicy::new(&catalog, &state);

        assert!(policy.is_accessible(ENTRY_STEP));
        assert!(policy.is_accessible("user_stories"));
        for step in ["design_docs", "code_generation", "code_review", "test_cases", "deployment"] {
            assert!(!policy.is_accessible(step), "{step} should be locked");
        }
        assert!(!policy.is_accessible(TERMINAL_STEP));
        assert!(!policy.is_accessible("unknown"));
    }

    #[test]
    fn test_earlier_steps_always_reachable() {
        let catalog = StepCatalog::sdlc();
        let state = state_at("code_review");
        let policy = NavigationPolicy::new(&catalog, &state);

        assert!(policy.is_accessible("user_stories"));
        assert!(policy.is_accessible("code_generation"));
        assert!(!policy.is_accessible("test_cases"));
    }

    #[test]
    fn test_content_or_approval_unlocks_forward_step() {
        let catalog = StepCatalog::sdlc();
        let mut state = state_at("user_stories");
        state.content.insert("design_docs".into(), "DD".into());
        state.approved.insert("code_generation".into(), true);
        let policy = NavigationPolicy::new(&catalog, &state);

        assert!(policy.is_accessible("design_docs"));
        assert!(policy.is_accessible("code_generation"));
        assert!(!policy.is_accessible("code_review"));
    }

    #[test]
    fn test_terminal_unlocks_everything() {
        let catalog = StepCatalog::sdlc();
        let state = state_at(TERMINAL_STEP);
        let policy = NavigationPolicy::new(&catalog, &state);
        assert!(catalog.steps().iter().all(|s| policy.is_accessible(&s.id)));
    }

    #[test]
    fn test_status_precedence() {
        let catalog = StepCatalog::sdlc();
        let mut state = state_at("design_docs");
        state.approved.insert("user_stories".into(), true);
        state.content.insert("user_stories".into(), "US".into());
        state.in_flight = Some("design_docs".into());
        let policy = NavigationPolicy::new(&catalog, &state);

        assert_eq!(policy.status("user_stories"), StepStatus::Approved);
        assert_eq!(policy.status("design_docs"), StepStatus::Generating);
        assert_eq!(policy.status("code_generation"), StepStatus::Locked);
        assert_eq!(policy.status(ENTRY_STEP), StepStatus::Open);
    }

    #[test]
    fn test_views_and_progress() {
        let catalog = StepCatalog::sdlc();
        let mut state = state_at("design_docs");
        state.approved.insert("user_stories".into(), true);
        state.approved.insert("not_a_step".into(), true);
        state.content.insert("design_docs".into(), "DD".into());
        let policy = NavigationPolicy::new(&catalog, &state);

        let views = policy.views();
        assert_eq!(views.len(), 7);
        assert_eq!(views[0].id, ENTRY_STEP);
        assert!(views[2].current);
        assert_eq!(views[2].status, StepStatus::ContentAvailable);

        let progress = policy.progress();
        assert_eq!(progress, Progress { approved: 1, total: 6 });
        assert_eq!(progress.percent(), 16);
        assert!(policy.can_export());
    }
}
