// src/api/mod.rs
// HTTP surface: a thin shell over the pipeline and stores

pub mod auth;
pub mod executions;
pub mod templates;
pub mod threads;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{middleware, Json, Router};
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::error::ExecError;
use crate::pipeline::Pipeline;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
}

pub fn create_router(state: AppState) -> Router {
    let authed = Router::new()
        .route("/v1/execute", post(executions::execute))
        .route("/v1/executions/{id}/rerun", post(executions::rerun))
        .route("/v1/executions/{id}", get(executions::get_execution))
        .route("/v1/executions/{id}/status", get(executions::get_status))
        .route(
            "/v1/projects/{project_id}/executions",
            get(executions::list_for_project),
        )
        .route("/v1/threads", post(threads::create_thread))
        .route(
            "/v1/threads/{id}/messages",
            get(threads::list_messages).post(threads::append_message),
        )
        .route(
            "/v1/messages/{id}",
            axum::routing::patch(threads::update_message).delete(threads::delete_message),
        )
        .route("/v1/templates", post(templates::create_template))
        .route(
            "/v1/projects/{project_id}/templates",
            get(templates::list_templates),
        )
        .route(
            "/v1/templates/{id}",
            get(templates::get_template)
                .patch(templates::update_template)
                .delete(templates::delete_template),
        )
        .route("/v1/params", post(templates::create_params))
        .layer(middleware::from_fn_with_state(state.clone(), auth::require_user));

    Router::new()
        .route("/ping", get(|| async { "pong" }))
        .merge(authed)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Maps pipeline errors onto HTTP statuses; everything unexpected is a 500.
pub struct ApiError(pub ExecError);

impl From<ExecError> for ApiError {
    fn from(err: ExecError) -> Self {
        ApiError(err)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError(ExecError::from(err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ExecError::TemplateNotFound(_)
            | ExecError::ParamsNotFound { .. }
            | ExecError::ThreadNotFound(_)
            | ExecError::MessageNotFound(_)
            | ExecError::ExecutionNotFound(_) => StatusCode::NOT_FOUND,
            ExecError::ExecutionAccessDenied(_) => StatusCode::FORBIDDEN,
            ExecError::TemplateInUse(_) => StatusCode::CONFLICT,
            err if err.is_validation() => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self.0, "request failed");
        }
        (status, Json(json!({"error": self.0.to_string()}))).into_response()
    }
}
