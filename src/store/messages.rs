// src/store/messages.rs
//! Message rows. Content is a JSON value: a bare string for classic
//! providers, or an arbitrary structured value for newer generations.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{Row, SqlitePool};

use super::{new_identifier, MESSAGE_ID_PREFIX};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    #[serde(default)]
    pub identifier: String,
    #[serde(default)]
    pub thread_id: String,
    pub role: String,
    pub content: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<Value>,
    #[serde(default = "default_metadata")]
    pub metadata: Value,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

fn default_metadata() -> Value {
    Value::Object(Default::default())
}

impl Message {
    /// A message that exists only in an execution's working set, never in
    /// storage. Used for inline request messages and injected prompts.
    pub fn inline(role: impl Into<String>, content: Value) -> Self {
        Self {
            identifier: String::new(),
            thread_id: String::new(),
            role: role.into(),
            content,
            tool_call_id: None,
            tool_calls: None,
            function_call: None,
            metadata: default_metadata(),
            created_at: Utc::now(),
        }
    }
}

/// Input for message creation; the store assigns identifier and timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMessage {
    pub thread_id: String,
    pub role: String,
    pub content: Value,
    #[serde(default)]
    pub tool_call_id: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Value>,
    #[serde(default)]
    pub function_call: Option<Value>,
    #[serde(default = "default_metadata")]
    pub metadata: Value,
}

/// Explicit edits to an existing message. `None` leaves the column alone.
#[derive(Debug, Default)]
pub struct MessageUpdate {
    pub role: Option<String>,
    pub content: Option<Value>,
    pub metadata: Option<Value>,
}

#[derive(Clone)]
pub struct MessageStore {
    pool: SqlitePool,
}

impl MessageStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, message: &NewMessage) -> Result<Message> {
        let identifier = new_identifier(MESSAGE_ID_PREFIX);
        let created_at = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO messages
                (identifier, thread_id, role, content, tool_call_id,
                 tool_calls, function_call, metadata, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&identifier)
        .bind(&message.thread_id)
        .bind(&message.role)
        .bind(message.content.to_string())
        .bind(&message.tool_call_id)
        .bind(message.tool_calls.as_ref().map(|v| v.to_string()))
        .bind(message.function_call.as_ref().map(|v| v.to_string()))
        .bind(message.metadata.to_string())
        .bind(created_at)
        .execute(&self.pool)
        .await?;

        Ok(Message {
            identifier,
            thread_id: message.thread_id.clone(),
            role: message.role.clone(),
            content: message.content.clone(),
            tool_call_id: message.tool_call_id.clone(),
            tool_calls: message.tool_calls.clone(),
            function_call: message.function_call.clone(),
            metadata: message.metadata.clone(),
            created_at,
        })
    }

    pub async fn get(&self, identifier: &str) -> Result<Option<Message>> {
        let row = sqlx::query("SELECT * FROM messages WHERE identifier = ?")
            .bind(identifier)
            .fetch_optional(&self.pool)
            .await?;
        row.map(row_to_message).transpose()
    }

    /// All messages of a thread in insertion order.
    pub async fn list_for_thread(&self, thread_id: &str) -> Result<Vec<Message>> {
        let rows = sqlx::query(
            "SELECT * FROM messages WHERE thread_id = ? ORDER BY created_at ASC, identifier ASC",
        )
        .bind(thread_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_message).collect()
    }

    pub async fn update(&self, identifier: &str, update: &MessageUpdate) -> Result<()> {
        let mut builder = sqlx::QueryBuilder::new("UPDATE messages SET identifier = identifier");
        if let Some(role) = &update.role {
            builder.push(", role = ").push_bind(role);
        }
        if let Some(content) = &update.content {
            builder.push(", content = ").push_bind(content.to_string());
        }
        if let Some(metadata) = &update.metadata {
            builder.push(", metadata = ").push_bind(metadata.to_string());
        }
        builder.push(" WHERE identifier = ").push_bind(identifier);
        builder.build().execute(&self.pool).await?;
        Ok(())
    }

    pub async fn delete(&self, identifier: &str) -> Result<()> {
        sqlx::query("DELETE FROM messages WHERE identifier = ?")
            .bind(identifier)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn row_to_message(row: sqlx::sqlite::SqliteRow) -> Result<Message> {
    let content: String = row.get("content");
    let tool_calls: Option<String> = row.get("tool_calls");
    let function_call: Option<String> = row.get("function_call");
    let metadata: String = row.get("metadata");
    Ok(Message {
        identifier: row.get("identifier"),
        thread_id: row.get("thread_id"),
        role: row.get("role"),
        content: serde_json::from_str(&content)?,
        tool_call_id: row.get("tool_call_id"),
        tool_calls: tool_calls.map(|v| serde_json::from_str(&v)).transpose()?,
        function_call: function_call.map(|v| serde_json::from_str(&v)).transpose()?,
        metadata: serde_json::from_str(&metadata)?,
        created_at: row.get("created_at"),
    })
}
