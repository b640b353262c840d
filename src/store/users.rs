// src/store/users.rs
//! User rows. The pipeline only reads these: provider credentials are
//! looked up per execution, and the API layer resolves tokens to users.

use anyhow::Result;
use sqlx::{Row, SqlitePool};

#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub password: String,
    pub api_token: String,
    pub openai_key: String,
    pub anthropic_key: String,
    pub azure_key: String,
    pub azure_endpoint: String,
    pub google_service_account_creds: String,
}

#[derive(Clone)]
pub struct UserStore {
    pool: SqlitePool,
}

impl UserStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, user: &User) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO users
                (username, password, api_token, openai_key, anthropic_key,
                 azure_key, azure_endpoint, google_service_account_creds)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&user.username)
        .bind(&user.password)
        .bind(&user.api_token)
        .bind(&user.openai_key)
        .bind(&user.anthropic_key)
        .bind(&user.azure_key)
        .bind(&user.azure_endpoint)
        .bind(&user.google_service_account_creds)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(row_to_user))
    }

    pub async fn get_by_api_token(&self, token: &str) -> Result<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE api_token = ?")
            .bind(token)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(row_to_user))
    }
}

fn row_to_user(row: sqlx::sqlite::SqliteRow) -> User {
    User {
        id: row.get("id"),
        username: row.get("username"),
        password: row.get("password"),
        api_token: row.get("api_token"),
        openai_key: row.get("openai_key"),
        anthropic_key: row.get("anthropic_key"),
        azure_key: row.get("azure_key"),
        azure_endpoint: row.get("azure_endpoint"),
        google_service_account_creds: row.get("google_service_account_creds"),
    }
}
