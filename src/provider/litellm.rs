// src/provider/litellm.rs
// LiteLLM gateway adapter. Follows the OpenAI wire shape; the gateway
// decides the real backend, so every provider credential is forwarded and
// the model comes from the template instead of the adapter.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::ExecError;
use crate::store::{ExecutionTemplate, Message};

use super::openai::{self, ExecuteConfig, OPENAI_ALLOWED_ROLES};
use super::{ChatProvider, ExecutionContext, ProviderDefaults, ProviderReply};

const LITELLM_ROUTE: &str = "/chatcompletion/litellm";

pub struct LiteLlm {
    defaults: ProviderDefaults,
}

impl LiteLlm {
    pub fn new() -> Self {
        Self {
            defaults: ProviderDefaults {
                temperature: 0.5,
                max_tokens: 10_000,
                timeout_secs: 600,
            },
        }
    }
}

impl Default for LiteLlm {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatProvider for LiteLlm {
    fn identifier(&self) -> &'static str {
        "litellm"
    }

    fn allowed_roles(&self) -> &'static [&'static str] {
        OPENAI_ALLOWED_ROLES
    }

    fn defaults(&self) -> ProviderDefaults {
        self.defaults
    }

    fn from_provider_response(&self, response: &Value) -> Result<ProviderReply, ExecError> {
        openai::parse_response(response, "openai_chat_completion_id")
    }

    async fn execute(
        &self,
        ctx: ExecutionContext<'_>,
        messages: &[Message],
        template: &ExecutionTemplate,
    ) -> Result<(u16, Value), ExecError> {
        let api_keys = json!({
            "openai": ctx.user.openai_key,
            "anthropic": ctx.user.anthropic_key,
            "azure": ctx.user.azure_key,
            "azure_endpoint": ctx.user.azure_endpoint,
            "google_service_account_creds": ctx.user.google_service_account_creds,
        });
        openai::base_execute(
            &ctx,
            messages,
            template,
            ExecuteConfig {
                model: &template.model,
                route: LITELLM_ROUTE,
                defaults: self.defaults,
            },
            api_keys,
        )
        .await
    }
}
