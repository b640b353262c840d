// tests/common/mod.rs
// Shared fixtures: in-memory store, seeded rows, and a stub executor server.
// Not every test binary uses every helper.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use axum::extract::Json;
use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;
use chrono::Utc;
use serde_json::{json, Value};
use sqlx::sqlite::SqlitePoolOptions;

use weft::pipeline::executor::ExecutorClient;
use weft::pipeline::Pipeline;
use weft::provider::ProviderRegistry;
use weft::store::{ExecutionTemplate, Store, User};

pub async fn test_store() -> Store {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(":memory:")
        .await
        .expect("create in-memory sqlite");
    let store = Store::new(pool);
    store.run_migrations().await.expect("run migrations");
    store
}

pub async fn seed_user(store: &Store) -> User {
    seed_user_named(store, "tester", "token-123").await
}

pub async fn seed_user_named(store: &Store, username: &str, api_token: &str) -> User {
    let mut user = User {
        id: 0,
        username: username.to_string(),
        password: "secret".to_string(),
        api_token: api_token.to_string(),
        openai_key: "sk-openai".to_string(),
        anthropic_key: "sk-anthropic".to_string(),
        azure_key: String::new(),
        azure_endpoint: String::new(),
        google_service_account_creds: String::new(),
    };
    user.id = store.users.create(&user).await.expect("create user");
    user
}

pub async fn seed_template(store: &Store, user_id: i64, model: &str) -> ExecutionTemplate {
    let now = Utc::now();
    store
        .templates
        .create(&ExecutionTemplate {
            identifier: String::new(),
            user_id,
            project_id: "proj-1".to_string(),
            name: "default".to_string(),
            model: model.to_string(),
            temperature: 0.0,
            timeout_secs: 0,
            max_tokens: 0,
            max_completion_tokens: 0,
            max_output_tokens: 0,
            top_p: 0.0,
            response_format: json!({}),
            system_prompt: String::new(),
            created_at: now,
            updated_at: now,
        })
        .await
        .expect("create template")
}

/// Canned OpenAI-style completion used by most tests.
pub fn openai_completion(content: &str) -> Value {
    json!({
        "id": "chatcmpl-x",
        "choices": [{"message": {"role": "assistant", "content": content}}],
        "usage": {"prompt_tokens": 3, "completion_tokens": 1},
    })
}

pub struct StubExecutor {
    pub base_url: String,
    pub requests: Arc<Mutex<Vec<Value>>>,
}

impl StubExecutor {
    pub fn last_request(&self) -> Value {
        self.requests
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("executor received no request")
    }
}

/// Serves the given status/body for every POST and records request bodies.
pub async fn stub_executor(status: StatusCode, body: Value) -> StubExecutor {
    let requests: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));
    let captured = requests.clone();

    let app = Router::new().route(
        "/{*route}",
        post(move |Json(payload): Json<Value>| {
            let captured = captured.clone();
            let body = body.clone();
            async move {
                captured.lock().unwrap().push(payload);
                (status, Json(body))
            }
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind stub executor");
    let addr = listener.local_addr().expect("stub executor addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve stub executor");
    });

    StubExecutor {
        base_url: format!("http://{}", addr),
        requests,
    }
}

pub fn pipeline(store: Store, executor_base_url: &str) -> Pipeline {
    Pipeline::new(
        store,
        Arc::new(ProviderRegistry::builtin()),
        Arc::new(ExecutorClient::new(executor_base_url)),
    )
}
