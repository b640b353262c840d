// src/store/executions.rs
//! Thread execution rows and their state machine.
//!
//! Status is monotonic: `in_progress` is set once at creation, and the one
//! async task that owns the execution moves it to `completed` or `failed`
//! exactly once. The status guard in `update` refuses to move a terminal
//! row, so a late writer can never resurrect a finished execution.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{Row, SqlitePool};

use super::{new_identifier, EXECUTION_ID_PREFIX};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    InProgress,
    Completed,
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::InProgress => "in_progress",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "in_progress" => Some(ExecutionStatus::InProgress),
            "completed" => Some(ExecutionStatus::Completed),
            "failed" => Some(ExecutionStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExecutionStatus::InProgress)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ThreadExecution {
    pub identifier: String,
    pub user_id: i64,
    pub project_id: String,
    pub thread_id: String,
    pub template_id: String,
    pub status: ExecutionStatus,
    pub input_messages: Option<Value>,
    pub output: Option<Value>,
    pub content: Option<String>,
    pub role: Option<String>,
    pub request_metadata: Option<Value>,
    pub response_metadata: Option<Value>,
    pub metadata: Value,
    pub execution_time_secs: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for execution creation; always starts `in_progress`.
#[derive(Debug, Clone)]
pub struct NewExecution {
    pub user_id: i64,
    pub project_id: String,
    pub thread_id: String,
    pub template_id: String,
    pub metadata: Value,
}

/// Command object naming exactly the fields to write. `None` means "leave
/// the column alone"; `Some` always writes, including empty values.
#[derive(Debug, Default)]
pub struct ExecutionUpdate {
    pub status: Option<ExecutionStatus>,
    pub input_messages: Option<Value>,
    pub output: Option<Value>,
    pub content: Option<String>,
    pub role: Option<String>,
    pub request_metadata: Option<Value>,
    pub response_metadata: Option<Value>,
    pub execution_time_secs: Option<f64>,
}

/// Optional filters for project-scoped execution listings.
#[derive(Debug, Default)]
pub struct ExecutionFilter {
    pub status: Option<ExecutionStatus>,
    pub thread_id: Option<String>,
    pub user_id: Option<i64>,
}

#[derive(Clone)]
pub struct ExecutionStore {
    pool: SqlitePool,
}

impl ExecutionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, execution: &NewExecution) -> Result<ThreadExecution> {
        let identifier = new_identifier(EXECUTION_ID_PREFIX);
        let created_at = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO thread_executions
                (identifier, user_id, project_id, thread_id, template_id,
                 status, metadata, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&identifier)
        .bind(execution.user_id)
        .bind(&execution.project_id)
        .bind(&execution.thread_id)
        .bind(&execution.template_id)
        .bind(ExecutionStatus::InProgress.as_str())
        .bind(execution.metadata.to_string())
        .bind(created_at)
        .bind(created_at)
        .execute(&self.pool)
        .await?;

        Ok(ThreadExecution {
            identifier,
            user_id: execution.user_id,
            project_id: execution.project_id.clone(),
            thread_id: execution.thread_id.clone(),
            template_id: execution.template_id.clone(),
            status: ExecutionStatus::InProgress,
            input_messages: None,
            output: None,
            content: None,
            role: None,
            request_metadata: None,
            response_metadata: None,
            metadata: execution.metadata.clone(),
            execution_time_secs: None,
            created_at,
            updated_at: created_at,
        })
    }

    pub async fn get(&self, identifier: &str) -> Result<Option<ThreadExecution>> {
        let row = sqlx::query("SELECT * FROM thread_executions WHERE identifier = ?")
            .bind(identifier)
            .fetch_optional(&self.pool)
            .await?;
        row.map(row_to_execution).transpose()
    }

    /// Applies the given update. When a status transition is requested, the
    /// write only lands if the row is still `in_progress`.
    pub async fn update(&self, identifier: &str, update: &ExecutionUpdate) -> Result<()> {
        let mut builder =
            sqlx::QueryBuilder::new("UPDATE thread_executions SET updated_at = CURRENT_TIMESTAMP");
        if let Some(status) = update.status {
            builder.push(", status = ").push_bind(status.as_str());
        }
        if let Some(input_messages) = &update.input_messages {
            builder
                .push(", input_messages = ")
                .push_bind(input_messages.to_string());
        }
        if let Some(output) = &update.output {
            builder.push(", output = ").push_bind(output.to_string());
        }
        if let Some(content) = &update.content {
            builder.push(", content = ").push_bind(content);
        }
        if let Some(role) = &update.role {
            builder.push(", role = ").push_bind(role);
        }
        if let Some(request_metadata) = &update.request_metadata {
            builder
                .push(", request_metadata = ")
                .push_bind(request_metadata.to_string());
        }
        if let Some(response_metadata) = &update.response_metadata {
            builder
                .push(", response_metadata = ")
                .push_bind(response_metadata.to_string());
        }
        if let Some(execution_time_secs) = update.execution_time_secs {
            builder
                .push(", execution_time_secs = ")
                .push_bind(execution_time_secs);
        }
        builder.push(" WHERE identifier = ").push_bind(identifier);
        if update.status.is_some() {
            builder.push(" AND status = 'in_progress'");
        }
        let result = builder.build().execute(&self.pool).await?;
        if update.status.is_some() && result.rows_affected() == 0 {
            tracing::warn!(
                execution = identifier,
                "status transition skipped, execution already terminal"
            );
        }
        Ok(())
    }

    pub async fn list_for_project(
        &self,
        project_id: &str,
        filter: &ExecutionFilter,
        page: i64,
        limit: i64,
    ) -> Result<(Vec<ThreadExecution>, i64)> {
        let mut count_builder = sqlx::QueryBuilder::new(
            "SELECT COUNT(*) FROM thread_executions WHERE project_id = ",
        );
        count_builder.push_bind(project_id);
        push_filters(&mut count_builder, filter);
        let total: i64 = count_builder
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;

        let mut builder =
            sqlx::QueryBuilder::new("SELECT * FROM thread_executions WHERE project_id = ");
        builder.push_bind(project_id);
        push_filters(&mut builder, filter);
        builder.push(" ORDER BY created_at DESC LIMIT ");
        builder.push_bind(limit);
        builder.push(" OFFSET ");
        builder.push_bind((page.max(1) - 1) * limit);

        let rows = builder.build().fetch_all(&self.pool).await?;
        let executions = rows
            .into_iter()
            .map(row_to_execution)
            .collect::<Result<Vec<_>>>()?;
        Ok((executions, total))
    }
}

fn push_filters(builder: &mut sqlx::QueryBuilder<'_, sqlx::Sqlite>, filter: &ExecutionFilter) {
    if let Some(status) = filter.status {
        builder.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(thread_id) = &filter.thread_id {
        builder
            .push(" AND thread_id = ")
            .push_bind(thread_id.clone());
    }
    if let Some(user_id) = filter.user_id {
        builder.push(" AND user_id = ").push_bind(user_id);
    }
}

fn row_to_execution(row: sqlx::sqlite::SqliteRow) -> Result<ThreadExecution> {
    let status: String = row.get("status");
    let status = ExecutionStatus::parse(&status)
        .ok_or_else(|| anyhow::anyhow!("unknown execution status {:?}", status))?;
    let metadata: String = row.get("metadata");
    Ok(ThreadExecution {
        identifier: row.get("identifier"),
        user_id: row.get("user_id"),
        project_id: row.get("project_id"),
        thread_id: row.get("thread_id"),
        template_id: row.get("template_id"),
        status,
        input_messages: read_json(&row, "input_messages")?,
        output: read_json(&row, "output")?,
        content: row.get("content"),
        role: row.get("role"),
        request_metadata: read_json(&row, "request_metadata")?,
        response_metadata: read_json(&row, "response_metadata")?,
        metadata: serde_json::from_str(&metadata)?,
        execution_time_secs: row.get("execution_time_secs"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn read_json(row: &sqlx::sqlite::SqliteRow, column: &str) -> Result<Option<Value>> {
    let raw: Option<String> = row.get(column);
    Ok(raw.map(|v| serde_json::from_str(&v)).transpose()?)
}
