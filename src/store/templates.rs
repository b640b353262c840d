// src/store/templates.rs
//! Execution parameter templates plus the named (name, environment)
//! bindings that point at them.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{Row, SqlitePool};

use crate::error::ExecError;

use super::{new_identifier, PARAMS_ID_PREFIX, TEMPLATE_ID_PREFIX};

/// Reusable bag of generation parameters. Zero or negative numeric fields
/// mean "unset" and get replaced by provider defaults at resolution time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionTemplate {
    pub identifier: String,
    pub user_id: i64,
    pub project_id: String,
    pub name: String,
    pub model: String,
    pub temperature: f64,
    pub timeout_secs: i64,
    pub max_tokens: i64,
    pub max_completion_tokens: i64,
    pub max_output_tokens: i64,
    pub top_p: f64,
    pub response_format: Value,
    pub system_prompt: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Explicit template edits. `None` leaves the column alone.
#[derive(Debug, Default, Deserialize)]
pub struct TemplateUpdate {
    pub name: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub timeout_secs: Option<i64>,
    pub max_tokens: Option<i64>,
    pub max_completion_tokens: Option<i64>,
    pub max_output_tokens: Option<i64>,
    pub top_p: Option<f64>,
    pub response_format: Option<Value>,
    pub system_prompt: Option<String>,
}

/// Environment-scoped binding from (user, project, name) to a template, so
/// callers can address execution configuration by stable name instead of id.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionParams {
    pub identifier: String,
    pub user_id: i64,
    pub project_id: String,
    pub name: String,
    pub environment: String,
    pub template_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct TemplateStore {
    pool: SqlitePool,
}

impl TemplateStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, template: &ExecutionTemplate) -> Result<ExecutionTemplate> {
        let identifier = new_identifier(TEMPLATE_ID_PREFIX);
        sqlx::query(
            r#"
            INSERT INTO execution_templates
                (identifier, user_id, project_id, name, model, temperature,
                 timeout_secs, max_tokens, max_completion_tokens,
                 max_output_tokens, top_p, response_format, system_prompt)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&identifier)
        .bind(template.user_id)
        .bind(&template.project_id)
        .bind(&template.name)
        .bind(&template.model)
        .bind(template.temperature)
        .bind(template.timeout_secs)
        .bind(template.max_tokens)
        .bind(template.max_completion_tokens)
        .bind(template.max_output_tokens)
        .bind(template.top_p)
        .bind(template.response_format.to_string())
        .bind(&template.system_prompt)
        .execute(&self.pool)
        .await?;

        self.get(&identifier)
            .await?
            .ok_or_else(|| anyhow::anyhow!("template {} vanished after insert", identifier))
    }

    pub async fn get(&self, identifier: &str) -> Result<Option<ExecutionTemplate>> {
        let row = sqlx::query("SELECT * FROM execution_templates WHERE identifier = ?")
            .bind(identifier)
            .fetch_optional(&self.pool)
            .await?;
        row.map(row_to_template).transpose()
    }

    pub async fn list_for_project(
        &self,
        user_id: i64,
        project_id: &str,
    ) -> Result<Vec<ExecutionTemplate>> {
        let rows = sqlx::query(
            "SELECT * FROM execution_templates WHERE user_id = ? AND project_id = ? ORDER BY created_at DESC",
        )
        .bind(user_id)
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_template).collect()
    }

    pub async fn update(&self, identifier: &str, update: &TemplateUpdate) -> Result<()> {
        let mut builder =
            sqlx::QueryBuilder::new("UPDATE execution_templates SET updated_at = CURRENT_TIMESTAMP");
        if let Some(name) = &update.name {
            builder.push(", name = ").push_bind(name);
        }
        if let Some(model) = &update.model {
            builder.push(", model = ").push_bind(model);
        }
        if let Some(temperature) = update.temperature {
            builder.push(", temperature = ").push_bind(temperature);
        }
        if let Some(timeout_secs) = update.timeout_secs {
            builder.push(", timeout_secs = ").push_bind(timeout_secs);
        }
        if let Some(max_tokens) = update.max_tokens {
            builder.push(", max_tokens = ").push_bind(max_tokens);
        }
        if let Some(max_completion_tokens) = update.max_completion_tokens {
            builder
                .push(", max_completion_tokens = ")
                .push_bind(max_completion_tokens);
        }
        if let Some(max_output_tokens) = update.max_output_tokens {
            builder
                .push(", max_output_tokens = ")
                .push_bind(max_output_tokens);
        }
        if let Some(top_p) = update.top_p {
            builder.push(", top_p = ").push_bind(top_p);
        }
        if let Some(response_format) = &update.response_format {
            builder
                .push(", response_format = ")
                .push_bind(response_format.to_string());
        }
        if let Some(system_prompt) = &update.system_prompt {
            builder.push(", system_prompt = ").push_bind(system_prompt);
        }
        builder.push(" WHERE identifier = ").push_bind(identifier);
        builder.build().execute(&self.pool).await?;
        Ok(())
    }

    /// Deletion is blocked while any execution_params row still references
    /// the template. Enforced here, not in the schema.
    pub async fn delete(&self, identifier: &str) -> Result<(), ExecError> {
        let references: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM execution_params WHERE template_id = ?")
                .bind(identifier)
                .fetch_one(&self.pool)
                .await?;
        if references > 0 {
            return Err(ExecError::TemplateInUse(identifier.to_string()));
        }
        sqlx::query("DELETE FROM execution_templates WHERE identifier = ?")
            .bind(identifier)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ── named params bindings

    pub async fn create_params(&self, params: &ExecutionParams) -> Result<ExecutionParams> {
        let identifier = new_identifier(PARAMS_ID_PREFIX);
        sqlx::query(
            r#"
            INSERT INTO execution_params
                (identifier, user_id, project_id, name, environment, template_id)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&identifier)
        .bind(params.user_id)
        .bind(&params.project_id)
        .bind(&params.name)
        .bind(&params.environment)
        .bind(&params.template_id)
        .execute(&self.pool)
        .await?;

        Ok(ExecutionParams {
            identifier,
            created_at: Utc::now(),
            ..params.clone()
        })
    }

    pub async fn get_params_by_name(
        &self,
        user_id: i64,
        project_id: &str,
        name: &str,
        environment: &str,
    ) -> Result<Option<ExecutionParams>> {
        let row = sqlx::query(
            r#"
            SELECT * FROM execution_params
            WHERE user_id = ? AND project_id = ? AND name = ? AND environment = ?
            "#,
        )
        .bind(user_id)
        .bind(project_id)
        .bind(name)
        .bind(environment)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(row_to_params))
    }

    pub async fn delete_params(&self, identifier: &str) -> Result<()> {
        sqlx::query("DELETE FROM execution_params WHERE identifier = ?")
            .bind(identifier)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn repoint_params(&self, identifier: &str, template_id: &str) -> Result<()> {
        sqlx::query("UPDATE execution_params SET template_id = ? WHERE identifier = ?")
            .bind(template_id)
            .bind(identifier)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn row_to_template(row: sqlx::sqlite::SqliteRow) -> Result<ExecutionTemplate> {
    let response_format: String = row.get("response_format");
    Ok(ExecutionTemplate {
        identifier: row.get("identifier"),
        user_id: row.get("user_id"),
        project_id: row.get("project_id"),
        name: row.get("name"),
        model: row.get("model"),
        temperature: row.get("temperature"),
        timeout_secs: row.get("timeout_secs"),
        max_tokens: row.get("max_tokens"),
        max_completion_tokens: row.get("max_completion_tokens"),
        max_output_tokens: row.get("max_output_tokens"),
        top_p: row.get("top_p"),
        response_format: serde_json::from_str(&response_format)?,
        system_prompt: row.get("system_prompt"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn row_to_params(row: sqlx::sqlite::SqliteRow) -> ExecutionParams {
    ExecutionParams {
        identifier: row.get("identifier"),
        user_id: row.get("user_id"),
        project_id: row.get("project_id"),
        name: row.get("name"),
        environment: row.get("environment"),
        template_id: row.get("template_id"),
        created_at: row.get("created_at"),
    }
}
