//! Workflow operation errors.
//!
//! Every variant is local and recoverable: the operation is rejected and
//! state is left unchanged.

/// Rejected workflow operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkflowError {
    #[error("{0}")]
    Validation(String),

    #[error("Feedback cannot be empty")]
    EmptyFeedback,

    #[error("\"{label}\" isn't available yet. Please complete the previous steps first.")]
    StepLocked { step_id: String, label: String },

    #[error("Unknown step: {0}")]
    UnknownStep(String),

    #[error("Step '{step_id}' is not the current step ('{current}')")]
    NotCurrentStep { step_id: String, current: String },

    #[error("Step '{0}' is a workflow marker and holds no content")]
    SentinelStep(String),

    #[error("Step '{0}' cannot be edited directly")]
    NotEditable(String),
}
