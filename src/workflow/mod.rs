//! Workflow orchestration.
//!
//! A fixed, ordered sequence of phases, each producing generated content
//! that the user reviews, approves, or sends back with feedback.
//!
//! ## Components
//!
//! - [`StepCatalog`] - step definitions and prompt sources
//! - [`WorkflowState`] - the mutable session aggregate
//! - [`NavigationPolicy`] - which steps may be opened directly
//! - [`WorkflowEngine`] - transitions and the reconciliation pass
//! - [`WorkflowSnapshot`] - export documents

mod catalog;
mod engine;
mod error;
mod export;
mod navigation;
mod state;

pub use catalog::{
    CatalogError, ContentFormat, PromptSource, RenderedPrompt, Step, StepCatalog, ENTRY_STEP,
    PROMPT_PLACEHOLDER, SOURCE_PLACEHOLDER, TERMINAL_STEP,
};
pub use engine::{GenerationTicket, Reconciliation, SkipReason, WorkflowEngine, FEEDBACK_INSTRUCTION};
pub use error::WorkflowError;
pub use export::{download_filename, step_document, StepDocument, StepExport, WorkflowSnapshot};
pub use navigation::{NavigationPolicy, Progress, StepStatus, StepView};
pub use state::WorkflowState;
