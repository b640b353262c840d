// tests/api_http.rs
// Router-level tests driven through tower::ServiceExt, no live listener.

mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use weft::api::{create_router, AppState};

use common::{
    openai_completion, pipeline, seed_template, seed_user, seed_user_named, stub_executor,
    test_store,
};

const TOKEN: &str = "token-123";

fn app(store: weft::store::Store, executor_base_url: &str) -> Router {
    create_router(AppState {
        pipeline: Arc::new(pipeline(store, executor_base_url)),
    })
}

fn json_with_token(method: &str, uri: &str, token: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get_with_token(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

fn authed_json(method: &str, uri: &str, body: Value) -> Request<Body> {
    json_with_token(method, uri, TOKEN, body)
}

fn authed_get(uri: &str) -> Request<Body> {
    get_with_token(uri, TOKEN)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn ping_needs_no_auth() {
    let store = test_store().await;
    let app = app(store, "http://127.0.0.1:1");

    let response = app
        .oneshot(Request::get("/ping").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn authed_routes_reject_missing_or_bad_tokens() {
    let store = test_store().await;
    seed_user(&store).await;
    let app = app(store, "http://127.0.0.1:1");

    let response = app
        .clone()
        .oneshot(Request::post("/v1/threads").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .oneshot(
            Request::post("/v1/threads")
                .header(header::AUTHORIZATION, "Bearer wrong")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn execute_endpoint_returns_in_progress_then_completes() {
    let store = test_store().await;
    let user = seed_user(&store).await;
    let template = seed_template(&store, user.id, "gpt-4o").await;
    let stub = stub_executor(StatusCode::OK, openai_completion("hello")).await;
    let app = app(store.clone(), &stub.base_url);

    let response = app
        .clone()
        .oneshot(authed_json(
            "POST",
            "/v1/execute",
            json!({
                "project_id": "proj-1",
                "template_id": template.identifier,
                "messages": [{"role": "user", "content": "hi"}],
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let execution = body_json(response).await;
    assert_eq!(execution["status"], json!("in_progress"));
    let id = execution["identifier"].as_str().unwrap().to_string();

    // the handler drops the task handle, so poll until the row settles
    let mut status = String::new();
    for _ in 0..100 {
        let response = app
            .clone()
            .oneshot(authed_get(&format!("/v1/executions/{id}/status")))
            .await
            .unwrap();
        status = body_json(response).await["status"].as_str().unwrap().to_string();
        if status != "in_progress" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(status, "completed");

    let response = app
        .oneshot(authed_get(&format!("/v1/executions/{id}")))
        .await
        .unwrap();
    let row = body_json(response).await;
    assert_eq!(row["content"], json!("hello"));
    assert_eq!(row["role"], json!("assistant"));
}

#[tokio::test]
async fn execute_by_params_name_resolves_the_binding() {
    let store = test_store().await;
    let user = seed_user(&store).await;
    let template = seed_template(&store, user.id, "gpt-4o").await;
    let stub = stub_executor(StatusCode::OK, openai_completion("hello")).await;
    let app = app(store.clone(), &stub.base_url);

    let response = app
        .clone()
        .oneshot(authed_json(
            "POST",
            "/v1/params",
            json!({
                "project_id": "proj-1",
                "name": "chat",
                "environment": "production",
                "template_id": template.identifier,
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(authed_json(
            "POST",
            "/v1/execute",
            json!({
                "project_id": "proj-1",
                "params_name": "chat",
                "messages": [{"role": "user", "content": "hi"}],
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let execution = body_json(response).await;
    assert_eq!(execution["template_id"], json!(template.identifier));

    // unknown binding is a 404
    let response = app
        .oneshot(authed_json(
            "POST",
            "/v1/execute",
            json!({
                "project_id": "proj-1",
                "params_name": "nope",
                "messages": [{"role": "user", "content": "hi"}],
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn template_crud_over_http() {
    let store = test_store().await;
    seed_user(&store).await;
    let app = app(store, "http://127.0.0.1:1");

    let response = app
        .clone()
        .oneshot(authed_json(
            "POST",
            "/v1/templates",
            json!({
                "project_id": "proj-1",
                "name": "default",
                "model": "gpt-4o",
                "temperature": 0.7,
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let template = body_json(response).await;
    let id = template["identifier"].as_str().unwrap().to_string();
    assert_eq!(template["temperature"], json!(0.7));

    let response = app
        .clone()
        .oneshot(authed_get("/v1/projects/proj-1/templates"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let listed = body_json(response).await;
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let response = app
        .clone()
        .oneshot(authed_json(
            "PATCH",
            &format!("/v1/templates/{id}"),
            json!({"system_prompt": "be terse"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let template = body_json(response).await;
    assert_eq!(template["system_prompt"], json!("be terse"));
    assert_eq!(template["temperature"], json!(0.7));

    let response = app
        .clone()
        .oneshot(
            Request::delete(format!("/v1/templates/{id}"))
                .header(header::AUTHORIZATION, format!("Bearer {TOKEN}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(authed_get(&format!("/v1/templates/{id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn referenced_template_deletion_conflicts() {
    let store = test_store().await;
    let user = seed_user(&store).await;
    let template = seed_template(&store, user.id, "gpt-4o").await;
    let app = app(store, "http://127.0.0.1:1");

    let response = app
        .clone()
        .oneshot(authed_json(
            "POST",
            "/v1/params",
            json!({
                "project_id": "proj-1",
                "name": "chat",
                "environment": "production",
                "template_id": template.identifier,
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(
            Request::delete(format!("/v1/templates/{}", template.identifier))
                .header(header::AUTHORIZATION, format!("Bearer {TOKEN}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn thread_messages_round_trip_over_http() {
    let store = test_store().await;
    seed_user(&store).await;
    let app = app(store, "http://127.0.0.1:1");

    let response = app
        .clone()
        .oneshot(authed_json(
            "POST",
            "/v1/threads",
            json!({"project_id": "proj-1", "title": "chat"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let thread = body_json(response).await;
    let id = thread["identifier"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(authed_json(
            "POST",
            &format!("/v1/threads/{id}/messages"),
            json!({"role": "user", "content": "hi"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(authed_get(&format!("/v1/threads/{id}/messages")))
        .await
        .unwrap();
    let messages = body_json(response).await;
    assert_eq!(messages.as_array().unwrap().len(), 1);
    assert_eq!(messages[0]["role"], json!("user"));
    let message_id = messages[0]["identifier"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(authed_json(
            "PATCH",
            &format!("/v1/messages/{message_id}"),
            json!({"content": "hi (edited)"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let message = body_json(response).await;
    assert_eq!(message["content"], json!("hi (edited)"));

    let response = app
        .clone()
        .oneshot(
            Request::delete(format!("/v1/messages/{message_id}"))
                .header(header::AUTHORIZATION, format!("Bearer {TOKEN}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(authed_get(&format!("/v1/threads/{id}/messages")))
        .await
        .unwrap();
    let messages = body_json(response).await;
    assert!(messages.as_array().unwrap().is_empty());

    // unknown thread is a 404
    let response = app
        .oneshot(authed_get("/v1/threads/thread_missing/messages"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn executions_are_scoped_to_their_owner() {
    let store = test_store().await;
    let owner = seed_user(&store).await;
    seed_user_named(&store, "other", "token-456").await;
    let template = seed_template(&store, owner.id, "gpt-4o").await;
    let app = app(store.clone(), "http://127.0.0.1:1");

    let execution = store
        .executions
        .create(&weft::store::NewExecution {
            user_id: owner.id,
            project_id: "proj-1".to_string(),
            thread_id: weft::store::NULL_THREAD_ID.to_string(),
            template_id: template.identifier.clone(),
            metadata: json!({}),
        })
        .await
        .unwrap();
    let id = execution.identifier;

    // another token cannot read, poll, or rerun the row
    let response = app
        .clone()
        .oneshot(get_with_token(&format!("/v1/executions/{id}"), "token-456"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .clone()
        .oneshot(get_with_token(
            &format!("/v1/executions/{id}/status"),
            "token-456",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .clone()
        .oneshot(json_with_token(
            "POST",
            &format!("/v1/executions/{id}/rerun"),
            "token-456",
            json!({"template_id": template.identifier}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // listings only surface the caller's own rows
    let response = app
        .clone()
        .oneshot(get_with_token("/v1/projects/proj-1/executions", "token-456"))
        .await
        .unwrap();
    let listing = body_json(response).await;
    assert_eq!(listing["total"], json!(0));
    assert!(listing["executions"].as_array().unwrap().is_empty());

    // the owner still sees everything
    let response = app
        .clone()
        .oneshot(authed_get(&format!("/v1/executions/{id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(authed_get("/v1/projects/proj-1/executions"))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["total"], json!(1));
}

#[tokio::test]
async fn unknown_execution_is_a_404() {
    let store = test_store().await;
    seed_user(&store).await;
    let app = app(store, "http://127.0.0.1:1");

    let response = app
        .oneshot(authed_get("/v1/executions/exec_missing"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
