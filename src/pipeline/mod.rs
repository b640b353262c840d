// src/pipeline/mod.rs
// Execution pipeline: synchronous intake, detached async reconciliation

pub mod executor;

use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::error::ExecError;
use crate::provider::{ChatProvider, ExecutionContext, ExecutionTool, ProviderRegistry};
use crate::store::{
    ExecutionStatus, ExecutionTemplate, ExecutionUpdate, Message, NewExecution, NewMessage, Store,
    ThreadExecution, NULL_THREAD_ID,
};

use executor::ExecutorClient;

/// Role of the timeline marker rows appended at execution start. Markers are
/// bookkeeping, not conversation: they are filtered out when a thread's
/// messages are gathered for a later execution.
const EXECUTION_MARKER_ROLE: &str = "execution";

/// Inputs for one pipeline invocation, already authenticated upstream.
#[derive(Debug, Clone)]
pub struct ExecuteRequest {
    pub user_id: i64,
    pub thread_id: String,
    pub project_id: String,
    pub template_id: String,
    pub system_prompt_override: String,
    pub append_assistant_response: bool,
    pub fetch_messages_from_thread: bool,
    pub messages: Vec<Message>,
    pub tools: Vec<ExecutionTool>,
    pub metadata: Value,
}

#[derive(Debug, Clone)]
pub struct RerunRequest {
    pub execution_id: String,
    pub template_id: String,
    pub system_prompt_override: String,
    pub append_assistant_response: bool,
}

/// Owns the execution lifecycle: creates the row, runs the remote call on a
/// detached task, reconciles the outcome. The caller gets the row plus the
/// task handle; the HTTP layer drops the handle, tests await it.
#[derive(Clone)]
pub struct Pipeline {
    store: Store,
    registry: Arc<ProviderRegistry>,
    executor: Arc<ExecutorClient>,
}

impl Pipeline {
    pub fn new(store: Store, registry: Arc<ProviderRegistry>, executor: Arc<ExecutorClient>) -> Self {
        Self {
            store,
            registry,
            executor,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Synchronous phase: resolve everything that can fail as a request
    /// validation error, create the `in_progress` row, then hand the rest
    /// to a detached task. Returns immediately; the caller never waits on
    /// provider latency.
    pub async fn execute(
        &self,
        req: ExecuteRequest,
    ) -> Result<(ThreadExecution, JoinHandle<()>), ExecError> {
        let mut template = self
            .store
            .templates
            .get(&req.template_id)
            .await?
            .ok_or_else(|| ExecError::TemplateNotFound(req.template_id.clone()))?;

        if !req.system_prompt_override.is_empty() {
            info!(execution_template = %template.identifier, "applying system prompt override");
            template.system_prompt = req.system_prompt_override.clone();
        }

        let provider = self.registry.lookup(&template.model)?;

        let messages: Vec<Message> =
            if req.thread_id != NULL_THREAD_ID && req.fetch_messages_from_thread {
                self.store
                    .messages
                    .list_for_thread(&req.thread_id)
                    .await?
                    .into_iter()
                    .filter(|m| m.role != EXECUTION_MARKER_ROLE)
                    .collect()
            } else {
                req.messages.clone()
            };

        for message in &messages {
            provider.validate_message(message)?;
        }

        if req.thread_id != NULL_THREAD_ID {
            let thread = self
                .store
                .threads
                .get(&req.thread_id)
                .await?
                .ok_or_else(|| ExecError::ThreadNotFound(req.thread_id.clone()))?;
            if thread.project_id != req.project_id {
                return Err(ExecError::ProjectMismatch {
                    thread_id: req.thread_id.clone(),
                    project_id: req.project_id.clone(),
                });
            }
        }

        let execution = self
            .store
            .executions
            .create(&NewExecution {
                user_id: req.user_id,
                project_id: req.project_id.clone(),
                thread_id: req.thread_id.clone(),
                template_id: template.identifier.clone(),
                metadata: req.metadata.clone(),
            })
            .await?;

        // Marker message so the execution shows up in the thread timeline.
        // The row already exists, so a marker failure is not worth failing
        // the caller over.
        if req.thread_id != NULL_THREAD_ID {
            let marker = NewMessage {
                thread_id: req.thread_id.clone(),
                role: EXECUTION_MARKER_ROLE.to_string(),
                content: json!({"content": execution.identifier}),
                tool_call_id: None,
                tool_calls: None,
                function_call: None,
                metadata: json!({}),
            };
            if let Err(err) = self.store.messages.create(&marker).await {
                warn!(execution = %execution.identifier, %err, "failed to create execution marker message");
            }
        }

        let handle = self.spawn_reconciler(
            provider,
            messages,
            execution.clone(),
            template,
            req.tools,
            req.append_assistant_response,
        );

        Ok((execution, handle))
    }

    /// Re-enters the pipeline with the exact input snapshot of a prior
    /// execution. Produces a brand-new row; never mutates the original.
    pub async fn rerun(
        &self,
        req: RerunRequest,
    ) -> Result<(ThreadExecution, JoinHandle<()>), ExecError> {
        let execution = self
            .store
            .executions
            .get(&req.execution_id)
            .await?
            .ok_or_else(|| ExecError::ExecutionNotFound(req.execution_id.clone()))?;

        let snapshot = execution
            .input_messages
            .ok_or(ExecError::EmptyInputSnapshot)?;
        let messages: Vec<Message> = serde_json::from_value(snapshot)?;
        if messages.is_empty() {
            return Err(ExecError::EmptyInputSnapshot);
        }

        self.execute(ExecuteRequest {
            user_id: execution.user_id,
            thread_id: execution.thread_id,
            project_id: execution.project_id,
            template_id: req.template_id,
            system_prompt_override: req.system_prompt_override,
            append_assistant_response: req.append_assistant_response,
            fetch_messages_from_thread: false,
            messages,
            tools: Vec::new(),
            metadata: json!({}),
        })
        .await
    }

    /// Resolves the named (name, environment) binding to a template id.
    pub async fn template_id_by_name(
        &self,
        user_id: i64,
        project_id: &str,
        name: &str,
        environment: &str,
    ) -> Result<String, ExecError> {
        let params = self
            .store
            .templates
            .get_params_by_name(user_id, project_id, name, environment)
            .await?
            .ok_or_else(|| ExecError::ParamsNotFound {
                name: name.to_string(),
                environment: environment.to_string(),
            })?;
        Ok(params.template_id)
    }

    fn spawn_reconciler(
        &self,
        provider: Arc<dyn ChatProvider>,
        messages: Vec<Message>,
        execution: ThreadExecution,
        template: ExecutionTemplate,
        tools: Vec<ExecutionTool>,
        append_assistant_response: bool,
    ) -> JoinHandle<()> {
        let store = self.store.clone();
        let executor = self.executor.clone();
        tokio::spawn(async move {
            let outcome = run_execution(
                &store,
                &executor,
                provider.as_ref(),
                &messages,
                &execution,
                &template,
                &tools,
                append_assistant_response,
            )
            .await;

            if let Err(err) = outcome {
                error!(execution = %execution.identifier, %err, "execution failed");
                fail_execution(&store, &execution, &err.to_string()).await;
            }
        })
    }
}

/// Async phase. Every error raised here lands in `fail_execution`, so a row
/// can never stay `in_progress` after the task ends.
#[allow(clippy::too_many_arguments)]
async fn run_execution(
    store: &Store,
    executor: &ExecutorClient,
    provider: &dyn ChatProvider,
    messages: &[Message],
    execution: &ThreadExecution,
    template: &ExecutionTemplate,
    tools: &[ExecutionTool],
    append_assistant_response: bool,
) -> Result<(), ExecError> {
    let user = store
        .users
        .get_by_id(execution.user_id)
        .await?
        .ok_or(ExecError::UserNotFound(execution.user_id))?;

    // Input snapshot before dispatch, for auditing and rerun.
    store
        .executions
        .update(
            &execution.identifier,
            &ExecutionUpdate {
                input_messages: Some(serde_json::to_value(messages)?),
                ..Default::default()
            },
        )
        .await?;

    let ctx = ExecutionContext {
        store,
        executor,
        user: &user,
        execution_id: &execution.identifier,
        tools,
    };

    let (status, body) = provider.execute(ctx, messages, template).await?;
    if status != 200 {
        return Err(ExecError::ExecutorStatus { status, body });
    }

    finalize_success(store, provider, execution, body, append_assistant_response).await
}

async fn finalize_success(
    store: &Store,
    provider: &dyn ChatProvider,
    execution: &ThreadExecution,
    body: Value,
    append_assistant_response: bool,
) -> Result<(), ExecError> {
    let reply = provider.from_provider_response(&body)?;

    // Appending the reply is part of the contract when requested: if the
    // thread never receives it, the execution is failed, not completed.
    if append_assistant_response && execution.thread_id != NULL_THREAD_ID {
        store
            .messages
            .create(&NewMessage {
                thread_id: execution.thread_id.clone(),
                role: reply.role.clone(),
                content: reply.content.clone(),
                tool_call_id: None,
                tool_calls: None,
                function_call: None,
                metadata: reply.metadata.clone(),
            })
            .await?;
    }

    let content = match &reply.content {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };

    store
        .executions
        .update(
            &execution.identifier,
            &ExecutionUpdate {
                status: Some(ExecutionStatus::Completed),
                output: Some(body),
                content: Some(content),
                role: Some(reply.role),
                response_metadata: Some(reply.metadata),
                execution_time_secs: Some(elapsed_secs(execution)),
                ..Default::default()
            },
        )
        .await?;

    info!(execution = %execution.identifier, "execution completed");
    Ok(())
}

async fn fail_execution(store: &Store, execution: &ThreadExecution, message: &str) {
    let update = ExecutionUpdate {
        status: Some(ExecutionStatus::Failed),
        output: Some(json!({"error": message})),
        execution_time_secs: Some(elapsed_secs(execution)),
        ..Default::default()
    };
    if let Err(err) = store.executions.update(&execution.identifier, &update).await {
        error!(execution = %execution.identifier, %err, "failed to record execution failure");
    }
}

fn elapsed_secs(execution: &ThreadExecution) -> f64 {
    let elapsed = Utc::now() - execution.created_at;
    (elapsed.num_milliseconds() as f64 / 1000.0).max(0.0)
}
