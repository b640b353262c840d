// src/store/threads.rs

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::{Row, SqlitePool};

use super::{new_identifier, THREAD_ID_PREFIX};

#[derive(Debug, Clone, Serialize)]
pub struct Thread {
    pub identifier: String,
    pub user_id: i64,
    pub project_id: String,
    pub title: String,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct ThreadStore {
    pool: SqlitePool,
}

impl ThreadStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        user_id: i64,
        project_id: &str,
        title: &str,
        metadata: &Value,
    ) -> Result<Thread> {
        let identifier = new_identifier(THREAD_ID_PREFIX);
        sqlx::query(
            r#"
            INSERT INTO threads (identifier, user_id, project_id, title, metadata)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&identifier)
        .bind(user_id)
        .bind(project_id)
        .bind(title)
        .bind(metadata.to_string())
        .execute(&self.pool)
        .await?;

        self.get(&identifier)
            .await?
            .ok_or_else(|| anyhow::anyhow!("thread {} vanished after insert", identifier))
    }

    pub async fn get(&self, identifier: &str) -> Result<Option<Thread>> {
        let row = sqlx::query("SELECT * FROM threads WHERE identifier = ?")
            .bind(identifier)
            .fetch_optional(&self.pool)
            .await?;
        row.map(row_to_thread).transpose()
    }
}

fn row_to_thread(row: sqlx::sqlite::SqliteRow) -> Result<Thread> {
    let metadata: String = row.get("metadata");
    Ok(Thread {
        identifier: row.get("identifier"),
        user_id: row.get("user_id"),
        project_id: row.get("project_id"),
        title: row.get("title"),
        metadata: serde_json::from_str(&metadata)?,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}
