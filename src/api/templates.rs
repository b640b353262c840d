// src/api/templates.rs
// Execution template and named-params endpoints

use axum::extract::{Path, State};
use axum::{Extension, Json};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ExecError;
use crate::store::{ExecutionTemplate, TemplateUpdate, User};
use crate::store::templates::ExecutionParams;

use super::{ApiError, AppState};

#[derive(Debug, Deserialize)]
pub struct CreateTemplateBody {
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub name: String,
    pub model: String,
    #[serde(default)]
    pub temperature: f64,
    #[serde(default)]
    pub timeout_secs: i64,
    #[serde(default)]
    pub max_tokens: i64,
    #[serde(default)]
    pub max_completion_tokens: i64,
    #[serde(default)]
    pub max_output_tokens: i64,
    #[serde(default)]
    pub top_p: f64,
    #[serde(default = "empty_object")]
    pub response_format: Value,
    #[serde(default)]
    pub system_prompt: String,
}

fn empty_object() -> Value {
    json!({})
}

pub async fn create_template(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Json(body): Json<CreateTemplateBody>,
) -> Result<Json<ExecutionTemplate>, ApiError> {
    let now = Utc::now();
    let template = state
        .pipeline
        .store()
        .templates
        .create(&ExecutionTemplate {
            identifier: String::new(),
            user_id: user.id,
            project_id: body.project_id,
            name: body.name,
            model: body.model,
            temperature: body.temperature,
            timeout_secs: body.timeout_secs,
            max_tokens: body.max_tokens,
            max_completion_tokens: body.max_completion_tokens,
            max_output_tokens: body.max_output_tokens,
            top_p: body.top_p,
            response_format: body.response_format,
            system_prompt: body.system_prompt,
            created_at: now,
            updated_at: now,
        })
        .await?;
    Ok(Json(template))
}

pub async fn list_templates(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(project_id): Path<String>,
) -> Result<Json<Vec<ExecutionTemplate>>, ApiError> {
    let templates = state
        .pipeline
        .store()
        .templates
        .list_for_project(user.id, &project_id)
        .await?;
    Ok(Json(templates))
}

pub async fn get_template(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ExecutionTemplate>, ApiError> {
    let template = state
        .pipeline
        .store()
        .templates
        .get(&id)
        .await?
        .ok_or(ExecError::TemplateNotFound(id))?;
    Ok(Json(template))
}

pub async fn update_template(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(update): Json<TemplateUpdate>,
) -> Result<Json<ExecutionTemplate>, ApiError> {
    let store = state.pipeline.store();
    if store.templates.get(&id).await?.is_none() {
        return Err(ExecError::TemplateNotFound(id).into());
    }
    store.templates.update(&id, &update).await?;
    let template = store
        .templates
        .get(&id)
        .await?
        .ok_or(ExecError::TemplateNotFound(id))?;
    Ok(Json(template))
}

pub async fn delete_template(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state.pipeline.store().templates.delete(&id).await?;
    Ok(Json(json!({"deleted": true})))
}

#[derive(Debug, Deserialize)]
pub struct CreateParamsBody {
    #[serde(default)]
    pub project_id: String,
    pub name: String,
    pub environment: String,
    pub template_id: String,
}

pub async fn create_params(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Json(body): Json<CreateParamsBody>,
) -> Result<Json<ExecutionParams>, ApiError> {
    let store = state.pipeline.store();
    if store.templates.get(&body.template_id).await?.is_none() {
        return Err(ExecError::TemplateNotFound(body.template_id).into());
    }
    let params = store
        .templates
        .create_params(&ExecutionParams {
            identifier: String::new(),
            user_id: user.id,
            project_id: body.project_id,
            name: body.name,
            environment: body.environment,
            template_id: body.template_id,
            created_at: Utc::now(),
        })
        .await?;
    Ok(Json(params))
}
