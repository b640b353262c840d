// src/store/migrations.rs
//! Idempotent schema setup for the SQLite backend.
//! Run at every startup; every statement is safe to re-run.

use anyhow::Result;
use sqlx::{Executor, SqlitePool};

use super::NULL_THREAD_ID;

const CREATE_USERS: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL UNIQUE,
    password TEXT NOT NULL,
    api_token TEXT NOT NULL UNIQUE,
    openai_key TEXT NOT NULL DEFAULT '',
    anthropic_key TEXT NOT NULL DEFAULT '',
    azure_key TEXT NOT NULL DEFAULT '',
    azure_endpoint TEXT NOT NULL DEFAULT '',
    google_service_account_creds TEXT NOT NULL DEFAULT '',
    created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#;

const CREATE_THREADS: &str = r#"
CREATE TABLE IF NOT EXISTS threads (
    identifier TEXT PRIMARY KEY,
    user_id INTEGER NOT NULL DEFAULT 0,
    project_id TEXT NOT NULL DEFAULT '',
    title TEXT NOT NULL DEFAULT '',
    metadata TEXT NOT NULL DEFAULT '{}',
    created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#;

const CREATE_MESSAGES: &str = r#"
CREATE TABLE IF NOT EXISTS messages (
    identifier TEXT PRIMARY KEY,
    thread_id TEXT NOT NULL,
    role TEXT NOT NULL,
    content TEXT NOT NULL,
    tool_call_id TEXT,
    tool_calls TEXT,
    function_call TEXT,
    metadata TEXT NOT NULL DEFAULT '{}',
    created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (thread_id) REFERENCES threads(identifier)
);
"#;

const CREATE_EXECUTION_TEMPLATES: &str = r#"
CREATE TABLE IF NOT EXISTS execution_templates (
    identifier TEXT PRIMARY KEY,
    user_id INTEGER NOT NULL,
    project_id TEXT NOT NULL DEFAULT '',
    name TEXT NOT NULL DEFAULT '',
    model TEXT NOT NULL,
    temperature REAL NOT NULL DEFAULT 0,
    timeout_secs INTEGER NOT NULL DEFAULT 0,
    max_tokens INTEGER NOT NULL DEFAULT 0,
    max_completion_tokens INTEGER NOT NULL DEFAULT 0,
    max_output_tokens INTEGER NOT NULL DEFAULT 0,
    top_p REAL NOT NULL DEFAULT 0,
    response_format TEXT NOT NULL DEFAULT '{}',
    system_prompt TEXT NOT NULL DEFAULT '',
    created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#;

const CREATE_EXECUTION_PARAMS: &str = r#"
CREATE TABLE IF NOT EXISTS execution_params (
    identifier TEXT PRIMARY KEY,
    user_id INTEGER NOT NULL,
    project_id TEXT NOT NULL DEFAULT '',
    name TEXT NOT NULL,
    environment TEXT NOT NULL,
    template_id TEXT NOT NULL,
    created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
    UNIQUE (user_id, project_id, name, environment)
);
"#;

const CREATE_THREAD_EXECUTIONS: &str = r#"
CREATE TABLE IF NOT EXISTS thread_executions (
    identifier TEXT PRIMARY KEY,
    user_id INTEGER NOT NULL,
    project_id TEXT NOT NULL DEFAULT '',
    thread_id TEXT NOT NULL,
    template_id TEXT NOT NULL,
    status TEXT NOT NULL,
    input_messages TEXT,
    output TEXT,
    content TEXT,
    role TEXT,
    request_metadata TEXT,
    response_metadata TEXT,
    metadata TEXT NOT NULL DEFAULT '{}',
    execution_time_secs REAL,
    created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#;

const CREATE_INDICES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_messages_thread_id ON messages(thread_id);
CREATE INDEX IF NOT EXISTS idx_threads_project_id ON threads(project_id);
CREATE INDEX IF NOT EXISTS idx_executions_project_id ON thread_executions(project_id);
CREATE INDEX IF NOT EXISTS idx_executions_thread_id ON thread_executions(thread_id);
CREATE INDEX IF NOT EXISTS idx_executions_status ON thread_executions(status);
CREATE INDEX IF NOT EXISTS idx_templates_project_id ON execution_templates(project_id);
"#;

/// Runs all required migrations, then ensures the sentinel null thread exists.
/// Executions that run without a persisted conversation reference it.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    pool.execute(CREATE_USERS).await?;
    pool.execute(CREATE_THREADS).await?;
    pool.execute(CREATE_MESSAGES).await?;
    pool.execute(CREATE_EXECUTION_TEMPLATES).await?;
    pool.execute(CREATE_EXECUTION_PARAMS).await?;
    pool.execute(CREATE_THREAD_EXECUTIONS).await?;
    pool.execute(CREATE_INDICES).await?;

    sqlx::query("INSERT OR IGNORE INTO threads (identifier, title) VALUES (?, 'null thread')")
        .bind(NULL_THREAD_ID)
        .execute(pool)
        .await?;

    Ok(())
}
