// src/api/executions.rs
// Execute, rerun, and execution polling endpoints

use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ExecError;
use crate::pipeline::{ExecuteRequest, RerunRequest};
use crate::provider::ExecutionTool;
use crate::store::{ExecutionFilter, ExecutionStatus, Message, ThreadExecution, User, NULL_THREAD_ID};

use super::{ApiError, AppState};

fn default_metadata() -> Value {
    json!({})
}

#[derive(Debug, Deserialize)]
pub struct ExecuteBody {
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub project_id: String,
    /// Template addressed directly by id, or by (name, environment).
    #[serde(default)]
    pub template_id: Option<String>,
    #[serde(default)]
    pub params_name: Option<String>,
    #[serde(default)]
    pub environment: Option<String>,
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default)]
    pub append_assistant_response: bool,
    #[serde(default)]
    pub fetch_messages_from_thread: bool,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub tools: Vec<ExecutionTool>,
    #[serde(default = "default_metadata")]
    pub metadata: Value,
}

pub async fn execute(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Json(body): Json<ExecuteBody>,
) -> Result<Json<ThreadExecution>, ApiError> {
    let template_id = match (&body.template_id, &body.params_name) {
        (Some(id), _) => id.clone(),
        (None, Some(name)) => {
            let environment = body.environment.as_deref().unwrap_or("production");
            state
                .pipeline
                .template_id_by_name(user.id, &body.project_id, name, environment)
                .await?
        }
        (None, None) => {
            return Err(ExecError::TemplateNotFound("<unspecified>".to_string()).into())
        }
    };

    let (execution, _task) = state
        .pipeline
        .execute(ExecuteRequest {
            user_id: user.id,
            thread_id: body
                .thread_id
                .unwrap_or_else(|| NULL_THREAD_ID.to_string()),
            project_id: body.project_id,
            template_id,
            system_prompt_override: body.system_prompt,
            append_assistant_response: body.append_assistant_response,
            fetch_messages_from_thread: body.fetch_messages_from_thread,
            messages: body.messages,
            tools: body.tools,
            metadata: body.metadata,
        })
        .await?;

    Ok(Json(execution))
}

#[derive(Debug, Deserialize)]
pub struct RerunBody {
    pub template_id: String,
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default)]
    pub append_assistant_response: bool,
}

/// Loads an execution and verifies it belongs to the authenticated user.
async fn load_owned_execution(
    state: &AppState,
    user: &User,
    id: String,
) -> Result<ThreadExecution, ApiError> {
    let execution = state
        .pipeline
        .store()
        .executions
        .get(&id)
        .await?
        .ok_or_else(|| ExecError::ExecutionNotFound(id.clone()))?;
    if execution.user_id != user.id {
        return Err(ExecError::ExecutionAccessDenied(id).into());
    }
    Ok(execution)
}

pub async fn rerun(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
    Json(body): Json<RerunBody>,
) -> Result<Json<ThreadExecution>, ApiError> {
    load_owned_execution(&state, &user, id.clone()).await?;
    let (execution, _task) = state
        .pipeline
        .rerun(RerunRequest {
            execution_id: id,
            template_id: body.template_id,
            system_prompt_override: body.system_prompt,
            append_assistant_response: body.append_assistant_response,
        })
        .await?;
    Ok(Json(execution))
}

pub async fn get_execution(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
) -> Result<Json<ThreadExecution>, ApiError> {
    let execution = load_owned_execution(&state, &user, id).await?;
    Ok(Json(execution))
}

pub async fn get_status(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let execution = load_owned_execution(&state, &user, id).await?;
    Ok(Json(json!({"status": execution.status})))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_page() -> i64 {
    1
}

fn default_limit() -> i64 {
    20
}

pub async fn list_for_project(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(project_id): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Value>, ApiError> {
    let filter = ExecutionFilter {
        status: query.status.as_deref().and_then(ExecutionStatus::parse),
        thread_id: query.thread_id,
        user_id: Some(user.id),
    };
    let (executions, total) = state
        .pipeline
        .store()
        .executions
        .list_for_project(&project_id, &filter, query.page, query.limit)
        .await?;
    Ok(Json(json!({"executions": executions, "total": total})))
}
