// src/api/threads.rs
// Thread and message endpoints, just enough surface to drive the pipeline

use axum::extract::{Path, State};
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ExecError;
use crate::store::{Message, MessageUpdate, NewMessage, Thread, User};

use super::{ApiError, AppState};

#[derive(Debug, Deserialize)]
pub struct CreateThreadBody {
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default = "empty_object")]
    pub metadata: Value,
}

fn empty_object() -> Value {
    json!({})
}

pub async fn create_thread(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Json(body): Json<CreateThreadBody>,
) -> Result<Json<Thread>, ApiError> {
    let thread = state
        .pipeline
        .store()
        .threads
        .create(user.id, &body.project_id, &body.title, &body.metadata)
        .await?;
    Ok(Json(thread))
}

pub async fn list_messages(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let store = state.pipeline.store();
    if store.threads.get(&id).await?.is_none() {
        return Err(ExecError::ThreadNotFound(id).into());
    }
    let messages = store.messages.list_for_thread(&id).await?;
    Ok(Json(messages))
}

#[derive(Debug, Deserialize)]
pub struct AppendMessageBody {
    pub role: String,
    pub content: Value,
    #[serde(default)]
    pub tool_call_id: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Value>,
    #[serde(default)]
    pub function_call: Option<Value>,
    #[serde(default = "empty_object")]
    pub metadata: Value,
}

pub async fn append_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<AppendMessageBody>,
) -> Result<Json<Message>, ApiError> {
    let store = state.pipeline.store();
    if store.threads.get(&id).await?.is_none() {
        return Err(ExecError::ThreadNotFound(id).into());
    }
    let message = store
        .messages
        .create(&NewMessage {
            thread_id: id,
            role: body.role,
            content: body.content,
            tool_call_id: body.tool_call_id,
            tool_calls: body.tool_calls,
            function_call: body.function_call,
            metadata: body.metadata,
        })
        .await?;
    Ok(Json(message))
}

#[derive(Debug, Deserialize)]
pub struct UpdateMessageBody {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<Value>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

pub async fn update_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<UpdateMessageBody>,
) -> Result<Json<Message>, ApiError> {
    let store = state.pipeline.store();
    if store.messages.get(&id).await?.is_none() {
        return Err(ExecError::MessageNotFound(id).into());
    }
    store
        .messages
        .update(
            &id,
            &MessageUpdate {
                role: body.role,
                content: body.content,
                metadata: body.metadata,
            },
        )
        .await?;
    let message = store
        .messages
        .get(&id)
        .await?
        .ok_or(ExecError::MessageNotFound(id))?;
    Ok(Json(message))
}

pub async fn delete_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let store = state.pipeline.store();
    if store.messages.get(&id).await?.is_none() {
        return Err(ExecError::MessageNotFound(id).into());
    }
    store.messages.delete(&id).await?;
    Ok(Json(json!({"deleted": true})))
}
