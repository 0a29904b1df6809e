//! The workflow state machine.
//!
//! [`WorkflowEngine`] owns the live [`WorkflowState`], mirrors every
//! mutation to the [`SessionStore`] and runs at most one generation call
//! at a time. [`WorkflowEngine::maybe_generate`] is the reconciliation
//! pass; the caller invokes it after every mutating operation.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::ai::{Credential, GatewayError, GenerationGateway, GenerationRequest};
use crate::core::{Notification, NotificationCenter, SessionStore, ValidationConfig};

use super::catalog::{ContentFormat, RenderedPrompt, Step, StepCatalog, ENTRY_STEP, TERMINAL_STEP};
use super::error::WorkflowError;
use super::export::{step_document, StepDocument, WorkflowSnapshot};
use super::navigation::{NavigationPolicy, Progress, StepView};
use super::state::WorkflowState;

/// Appended to a prompt when feedback is pending.
pub const FEEDBACK_INSTRUCTION: &str = "\n\nPlease incorporate this feedback: ";

/// Why a reconciliation pass did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Current step is the entry or terminal sentinel
    Sentinel,
    /// Another generation call is outstanding
    InFlight,
    /// Credential or project description is missing
    NotConfigured,
    /// Content exists and no feedback is pending
    UpToDate,
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    Idle(SkipReason),
    Generated { step_id: String },
    /// The step's source was empty; a notice was stored instead of generating
    Placeholder { step_id: String },
    /// The call succeeded with blank text; nothing was stored
    EmptyResponse { step_id: String },
    Failed { step_id: String, reason: String },
    /// The response arrived after a reset or invalidation and was dropped
    Discarded { step_id: String },
}

impl Reconciliation {
    /// Step the pass acted on, if any.
    pub fn step_id(&self) -> Option<&str> {
        match self {
            Self::Idle(_) => None,
            Self::Generated { step_id }
            | Self::Placeholder { step_id }
            | Self::EmptyResponse { step_id }
            | Self::Failed { step_id, .. }
            | Self::Discarded { step_id } => Some(step_id),
        }
    }

    /// Whether the pass stored new content.
    pub fn stored_content(&self) -> bool {
        matches!(self, Self::Generated { .. } | Self::Placeholder { .. })
    }
}

/// Identity of an outstanding generation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationTicket {
    pub id: u64,
    pub session: Uuid,
    pub step_id: String,
    pub revision: u64,
    /// Feedback consumed by this call, restored if it does not succeed
    feedback: Option<String>,
}

struct Inner {
    state: WorkflowState,
    session: Uuid,
    revisions: HashMap<String, u64>,
    in_flight: Option<GenerationTicket>,
    next_ticket: u64,
}

impl Inner {
    fn revision(&self, step_id: &str) -> u64 {
        self.revisions.get(step_id).copied().unwrap_or(0)
    }

    fn bump_revision(&mut self, step_id: &str) {
        *self.revisions.entry(step_id.to_string()).or_insert(0) += 1;
    }

    fn is_current(&self, ticket: &GenerationTicket) -> bool {
        ticket.session == self.session && ticket.revision == self.revision(&ticket.step_id)
    }

    fn release(&mut self, ticket: &GenerationTicket) {
        if self.in_flight.as_ref().is_some_and(|t| t.id == ticket.id) {
            self.in_flight = None;
            self.state.in_flight = None;
        }
    }
}

enum Plan {
    Skip(SkipReason),
    Done(Reconciliation),
    Call { ticket: GenerationTicket, request: GenerationRequest, credential: Credential },
}

/// Releases the in-flight slot if a generation future is dropped mid-call.
struct InFlightGuard<'a> {
    engine: &'a WorkflowEngine,
    ticket: Option<GenerationTicket>,
}

impl<'a> InFlightGuard<'a> {
    fn new(engine: &'a WorkflowEngine, ticket: GenerationTicket) -> Self {
        Self { engine, ticket: Some(ticket) }
    }

    fn disarm(mut self) -> Option<GenerationTicket> {
        self.ticket.take()
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if let Some(ticket) = self.ticket.take() {
            tracing::warn!(step = %ticket.step_id, ticket = ticket.id, "Generation call cancelled");
            let mut inner = self.engine.inner.lock();
            inner.release(&ticket);
            if inner.is_current(&ticket) {
                self.engine.restore_feedback(&mut inner, &ticket);
            }
        }
    }
}

/// Orchestrates generation, review and navigation of a workflow.
pub struct WorkflowEngine {
    catalog: StepCatalog,
    store: SessionStore,
    gateway: Arc<dyn GenerationGateway>,
    validation: ValidationConfig,
    notifications: NotificationCenter,
    inner: Mutex<Inner>,
}

impl std::fmt::Debug for WorkflowEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowEngine")
            .field("gateway", &self.gateway.name())
            .field("store", &self.store)
            .field("steps", &self.catalog.len())
            .finish_non_exhaustive()
    }
}

impl WorkflowEngine {
    /// Create an engine, restoring any session held by `store`.
    pub fn new(catalog: StepCatalog, store: SessionStore, gateway: Arc<dyn GenerationGateway>) -> Self {
        let state = WorkflowState::restore(&store, &catalog);
        tracing::debug!(gateway = gateway.name(), store = store.backend_name(), "Workflow engine ready");

        Self {
            catalog,
            store,
            gateway,
            validation: ValidationConfig::default(),
            notifications: NotificationCenter::new(),
            inner: Mutex::new(Inner {
                state,
                session: Uuid::new_v4(),
                revisions: HashMap::new(),
                in_flight: None,
                next_ticket: 1,
            }),
        }
    }

    /// Use different input thresholds for [`start`](Self::start).
    pub fn with_validation(mut self, validation: ValidationConfig) -> Self {
        self.validation = validation;
        self
    }

    pub fn catalog(&self) -> &StepCatalog {
        &self.catalog
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Name of the generation provider.
    pub fn gateway_name(&self) -> &str {
        self.gateway.name()
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> WorkflowState {
        self.inner.lock().state.clone()
    }

    pub fn current_step_id(&self) -> String {
        self.inner.lock().state.current_step_id.clone()
    }

    pub fn is_in_flight(&self) -> bool {
        self.inner.lock().in_flight.is_some()
    }

    /// Identifier of the current session; changes on [`reset`](Self::reset).
    pub fn session_id(&self) -> Uuid {
        self.inner.lock().session
    }

    /// Take every queued notification.
    pub fn drain_notifications(&self) -> Vec<Notification> {
        self.notifications.drain()
    }

    pub fn is_accessible(&self, step_id: &str) -> bool {
        let inner = self.inner.lock();
        NavigationPolicy::new(&self.catalog, &inner.state).is_accessible(step_id)
    }

    /// Sidebar rows.
    pub fn views(&self) -> Vec<StepView> {
        let inner = self.inner.lock();
        NavigationPolicy::new(&self.catalog, &inner.state).views()
    }

    pub fn progress(&self) -> Progress {
        let inner = self.inner.lock();
        NavigationPolicy::new(&self.catalog, &inner.state).progress()
    }

    /// Export document of every step with content.
    pub fn snapshot(&self, now: DateTime<Utc>) -> WorkflowSnapshot {
        let inner = self.inner.lock();
        WorkflowSnapshot::capture(&self.catalog, &inner.state, now)
    }

    /// Export one step's content.
    pub fn step_document(&self, step_id: &str, now: DateTime<Utc>) -> Option<StepDocument> {
        let inner = self.inner.lock();
        step_document(&self.catalog, &inner.state, step_id, now)
    }

    /// Begin a project from the entry sentinel.
    pub fn start(&self, credential: &str, project_prompt: &str) -> Result<(), WorkflowError> {
        let credential = credential.trim();
        let project_prompt = project_prompt.trim();
        let mut inner = self.inner.lock();

        if inner.state.current_step_id != ENTRY_STEP {
            return Err(WorkflowError::Validation(
                "A project is already in progress. Start a new project first.".to_string(),
            ));
        }
        if credential.is_empty() {
            return Err(WorkflowError::Validation("Please enter your API key".to_string()));
        }
        if credential.chars().count() < self.validation.min_credential_len {
            return Err(WorkflowError::Validation(format!(
                "API key looks too short (expected at least {} characters)",
                self.validation.min_credential_len
            )));
        }
        if project_prompt.is_empty() {
            return Err(WorkflowError::Validation("Please describe your project".to_string()));
        }
        if project_prompt.chars().count() < self.validation.min_prompt_len {
            return Err(WorkflowError::Validation(format!(
                "Please provide a more detailed project description (at least {} characters)",
                self.validation.min_prompt_len
            )));
        }

        let first = self.catalog.first().id.clone();
        inner.state.credential = Credential::new(credential);
        inner.state.project_prompt = project_prompt.to_string();
        inner.state.current_step_id = first.clone();

        self.store.save_api_key(credential);
        self.store.save_project_prompt(project_prompt);
        self.store.save_current_step(&first);

        tracing::info!(step = %first, prompt_chars = project_prompt.len(), "Workflow started");
        Ok(())
    }

    /// Generate content for the current step if it needs it.
    ///
    /// Calling this with nothing to do is a no-op. A response that arrives
    /// after a reset or an invalidation of its step is dropped, and the
    /// decision is re-run for the state as it is then.
    ///
    /// Pending feedback is consumed by a call and cleared only when the call
    /// stores content; a failed, blank or cancelled call puts it back.
    pub async fn maybe_generate(&self) -> Reconciliation {
        let mut discarded = None;

        loop {
            let (ticket, request, credential) = match self.plan() {
                Plan::Skip(reason) => {
                    return match discarded.take() {
                        Some(step_id) => Reconciliation::Discarded { step_id },
                        None => Reconciliation::Idle(reason),
                    };
                }
                Plan::Done(outcome) => return outcome,
                Plan::Call { ticket, request, credential } => (ticket, request, credential),
            };

            tracing::debug!(
                step = %ticket.step_id,
                ticket = ticket.id,
                gateway = self.gateway.name(),
                "Requesting generation"
            );

            let guard = InFlightGuard::new(self, ticket);
            let result = self.gateway.generate(&request, &credential).await;
            let Some(ticket) = guard.disarm() else {
                return Reconciliation::Idle(SkipReason::InFlight);
            };

            match self.settle(ticket, result) {
                Reconciliation::Discarded { step_id } => discarded = Some(step_id),
                outcome => return outcome,
            }
        }
    }

    fn plan(&self) -> Plan {
        let mut inner = self.inner.lock();
        let step_id = inner.state.current_step_id.clone();

        let Some((step, source)) =
            self.catalog.real_step(&step_id).and_then(|s| s.source.as_ref().map(|src| (s, src)))
        else {
            return Plan::Skip(SkipReason::Sentinel);
        };
        if inner.in_flight.is_some() {
            return Plan::Skip(SkipReason::InFlight);
        }
        if !inner.state.is_configured() {
            return Plan::Skip(SkipReason::NotConfigured);
        }

        if inner.state.pending_feedback(&step_id).is_none() {
            if inner.state.has_content(&step_id) {
                return Plan::Skip(SkipReason::UpToDate);
            }
            let persisted =
                self.store.generated_content().remove(&step_id).filter(|c| !c.trim().is_empty());
            if let Some(content) = persisted {
                tracing::debug!(step = %step_id, "Adopting persisted content");
                inner.state.content.insert(step_id, content);
                return Plan::Skip(SkipReason::UpToDate);
            }
        }

        let feedback = inner.state.take_feedback(&step_id);
        if feedback.is_some() {
            self.store.save_feedback_states(&inner.state.feedback);
        }

        match source.render(&inner.state.project_prompt, &inner.state.content) {
            RenderedPrompt::Placeholder(notice) => {
                tracing::debug!(step = %step_id, "Source content missing, storing placeholder");
                self.store.save_generated_content(&step_id, &notice);
                inner.state.content.insert(step_id.clone(), notice);
                Plan::Done(Reconciliation::Placeholder { step_id })
            }
            RenderedPrompt::Generate(mut prompt) => {
                if let Some(text) = &feedback {
                    prompt.push_str(FEEDBACK_INSTRUCTION);
                    prompt.push_str(text);
                }

                let ticket = GenerationTicket {
                    id: inner.next_ticket,
                    session: inner.session,
                    step_id: step_id.clone(),
                    revision: inner.revision(&step_id),
                    feedback,
                };
                inner.next_ticket += 1;
                inner.in_flight = Some(ticket.clone());
                inner.state.in_flight = Some(step_id);

                Plan::Call {
                    request: GenerationRequest::new(prompt, step.label.clone(), step.format),
                    credential: inner.state.credential.clone(),
                    ticket,
                }
            }
        }
    }

    fn settle(&self, ticket: GenerationTicket, result: Result<String, GatewayError>) -> Reconciliation {
        let mut inner = self.inner.lock();
        inner.release(&ticket);

        let step_id = ticket.step_id.clone();
        if !inner.is_current(&ticket) {
            tracing::debug!(step = %step_id, ticket = ticket.id, "Dropping stale generation response");
            return Reconciliation::Discarded { step_id };
        }

        let label = self.catalog.label(&step_id).to_string();
        match result {
            Ok(text) => {
                let format = self.catalog.real_step(&step_id).map_or(ContentFormat::Markdown, |s| s.format);
                let text = format.normalize(&text);
                if text.trim().is_empty() {
                    tracing::warn!(step = %step_id, "Generation returned empty content");
                    self.restore_feedback(&mut inner, &ticket);
                    return Reconciliation::EmptyResponse { step_id };
                }

                self.store.save_generated_content(&step_id, &text);
                inner.state.content.insert(step_id.clone(), text);
                tracing::info!(step = %step_id, "Content generated");
                Reconciliation::Generated { step_id }
            }
            Err(e) => {
                let reason = e.reason();
                tracing::warn!(step = %step_id, error = %reason, "Generation failed");
                self.restore_feedback(&mut inner, &ticket);
                self.notifications.push(Notification::error(format!(
                    "Failed to generate content for {label}. Please check your API key and try again. Error: {reason}"
                )));
                Reconciliation::Failed { step_id, reason }
            }
        }
    }

    fn restore_feedback(&self, inner: &mut Inner, ticket: &GenerationTicket) {
        let Some(text) = &ticket.feedback else { return };
        if inner.state.pending_feedback(&ticket.step_id).is_none() {
            inner.state.feedback.insert(ticket.step_id.clone(), Some(text.clone()));
            self.store.save_feedback_states(&inner.state.feedback);
        }
    }

    /// Approve the current step and advance to the next one.
    pub fn approve(&self, step_id: &str) -> Result<Notification, WorkflowError> {
        let mut inner = self.inner.lock();
        let step = self.real_step(step_id)?;
        if inner.state.current_step_id != step_id {
            return Err(WorkflowError::NotCurrentStep {
                step_id: step_id.to_string(),
                current: inner.state.current_step_id.clone(),
            });
        }

        inner.state.approved.insert(step_id.to_string(), true);
        self.store.save_approved_states(&inner.state.approved);

        let next = self.catalog.next_after(step_id).map_or(TERMINAL_STEP, |s| s.id.as_str()).to_string();
        inner.state.current_step_id = next.clone();
        self.store.save_current_step(&next);

        tracing::info!(step = %step_id, next = %next, "Step approved");
        let notification = Notification::success(format!("{} approved!", step.label));
        self.notifications.push(notification.clone());
        Ok(notification)
    }

    /// Invalidate a step's content and queue a regeneration with feedback.
    pub fn submit_feedback(&self, step_id: &str, text: &str) -> Result<Notification, WorkflowError> {
        if text.trim().is_empty() {
            return Err(WorkflowError::EmptyFeedback);
        }
        let mut inner = self.inner.lock();
        self.real_step(step_id)?;

        inner.state.feedback.insert(step_id.to_string(), Some(text.to_string()));
        inner.state.approved.insert(step_id.to_string(), false);
        inner.state.content.remove(step_id);
        inner.bump_revision(step_id);

        self.store.remove_generated_content(step_id);
        self.store.save_approved_states(&inner.state.approved);
        self.store.save_feedback_states(&inner.state.feedback);

        tracing::info!(step = %step_id, feedback_chars = text.len(), "Feedback submitted");
        let notification = Notification::info("Feedback received! Regenerating content...");
        self.notifications.push(notification.clone());
        Ok(notification)
    }

    /// Move to a step allowed by the navigation policy.
    ///
    /// Returns a notification when the target already has content.
    pub fn navigate(&self, step_id: &str) -> Result<Option<Notification>, WorkflowError> {
        let mut inner = self.inner.lock();
        let step = self.catalog.get(step_id).ok_or_else(|| WorkflowError::UnknownStep(step_id.to_string()))?;

        if !NavigationPolicy::new(&self.catalog, &inner.state).is_accessible(step_id) {
            let err = WorkflowError::StepLocked { step_id: step_id.to_string(), label: step.label.clone() };
            tracing::debug!(step = %step_id, current = %inner.state.current_step_id, "Navigation blocked");
            self.notifications.push(Notification::warning(err.to_string()));
            return Err(err);
        }

        inner.state.current_step_id = step_id.to_string();
        self.store.save_current_step(step_id);
        tracing::debug!(step = %step_id, "Navigated");

        if step_id != ENTRY_STEP && inner.state.has_content(step_id) {
            let notification = Notification::success(format!("Navigated to {}", step.label));
            self.notifications.push(notification.clone());
            return Ok(Some(notification));
        }
        Ok(None)
    }

    /// Discard the whole session and return to the entry sentinel.
    ///
    /// An outstanding call keeps its slot until it completes; its response
    /// is then dropped.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.state = WorkflowState::default();
        inner.state.in_flight = inner.in_flight.as_ref().map(|t| t.step_id.clone());
        inner.session = Uuid::new_v4();
        inner.revisions.clear();

        if !self.store.clear() {
            tracing::warn!("Session storage could not be fully cleared");
        }
        tracing::info!(session = %inner.session, "Workflow reset");
    }

    /// Overwrite the content of a user-editable step.
    ///
    /// Blank text removes the content. Approval and feedback are untouched.
    pub fn update_step_content(&self, step_id: &str, text: &str) -> Result<(), WorkflowError> {
        let mut inner = self.inner.lock();
        let step = self.real_step(step_id)?;
        if !step.editable {
            return Err(WorkflowError::NotEditable(step_id.to_string()));
        }

        if text.trim().is_empty() {
            inner.state.content.remove(step_id);
            self.store.remove_generated_content(step_id);
        } else {
            inner.state.content.insert(step_id.to_string(), text.to_string());
            self.store.save_generated_content(step_id, text);
        }
        inner.bump_revision(step_id);

        tracing::debug!(step = %step_id, chars = text.len(), "Step content updated");
        Ok(())
    }

    fn real_step(&self, step_id: &str) -> Result<&Step, WorkflowError> {
        if StepCatalog::is_sentinel(step_id) {
            return Err(WorkflowError::SentinelStep(step_id.to_string()));
        }
        self.catalog.real_step(step_id).ok_or_else(|| WorkflowError::UnknownStep(step_id.to_string()))
    }
}
