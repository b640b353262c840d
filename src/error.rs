// src/error.rs
// Error taxonomy for the execution pipeline

use serde_json::Value;

/// Errors surfaced by the execution pipeline.
///
/// Validation variants are returned synchronously, before an execution row
/// exists. Everything else is raised inside the execution task and reconciled
/// into a `failed` row; nothing is retried.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("provider {0} not found")]
    UnknownProvider(String),

    #[error("template {0} not found")]
    TemplateNotFound(String),

    #[error("execution params {name}/{environment} not found")]
    ParamsNotFound { name: String, environment: String },

    #[error("thread {0} not found")]
    ThreadNotFound(String),

    #[error("execution {0} not found")]
    ExecutionNotFound(String),

    #[error("message {0} not found")]
    MessageNotFound(String),

    #[error("execution {0} does not belong to the authenticated user")]
    ExecutionAccessDenied(String),

    #[error("user {0} not found")]
    UserNotFound(i64),

    #[error("thread {thread_id} does not belong to project {project_id}")]
    ProjectMismatch {
        thread_id: String,
        project_id: String,
    },

    #[error("message content is empty")]
    EmptyContent,

    #[error("message role {role:?} is invalid, only {allowed:?} are allowed")]
    InvalidRole {
        role: String,
        allowed: &'static [&'static str],
    },

    #[error("system message content is not a string")]
    SystemPromptNotText,

    #[error("malformed provider response: {0}")]
    MalformedResponse(String),

    #[error("execution input messages are empty")]
    EmptyInputSnapshot,

    #[error("template {0} is still referenced by execution params")]
    TemplateInUse(String),

    #[error("executor request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("executor returned status {status}: {body}")]
    ExecutorStatus { status: u16, body: Value },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("storage error: {0}")]
    Storage(anyhow::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<anyhow::Error> for ExecError {
    fn from(err: anyhow::Error) -> Self {
        ExecError::Storage(err)
    }
}

impl ExecError {
    /// True for errors the caller should see as a bad request rather than a
    /// server fault.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ExecError::UnknownProvider(_)
                | ExecError::TemplateNotFound(_)
                | ExecError::ParamsNotFound { .. }
                | ExecError::ThreadNotFound(_)
                | ExecError::MessageNotFound(_)
                | ExecError::ExecutionNotFound(_)
                | ExecError::ProjectMismatch { .. }
                | ExecError::EmptyContent
                | ExecError::InvalidRole { .. }
                | ExecError::EmptyInputSnapshot
                | ExecError::TemplateInUse(_)
        )
    }
}
