// src/pipeline/executor.rs
//! HTTP client for the remote completion executor. One POST per execution,
//! bounded by the resolved timeout; no retry, no circuit breaker.

use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use crate::error::ExecError;

#[derive(Clone)]
pub struct ExecutorClient {
    base_url: String,
    client: Client,
}

impl ExecutorClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: Client::new(),
        }
    }

    /// Issues the call and decodes the body as generic JSON. The status
    /// code is returned regardless of success; interpreting it is the
    /// reconciler's job. Connection failures and timeouts surface as
    /// transport errors.
    pub async fn execute(
        &self,
        route: &str,
        payload: &Value,
        timeout_secs: i64,
    ) -> Result<(u16, Value), ExecError> {
        let url = format!("{}{}", self.base_url, route);
        debug!(%url, timeout_secs, "dispatching executor request");

        let response = self
            .client
            .post(&url)
            .timeout(Duration::from_secs(timeout_secs.max(1) as u64))
            .json(payload)
            .send()
            .await?;

        let status = response.status().as_u16();
        let body: Value = response.json().await?;
        Ok((status, body))
    }
}
