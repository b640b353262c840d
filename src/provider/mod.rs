// src/provider/mod.rs
// Chat completion provider trait, registry, and shared adaptation helpers

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ExecError;
use crate::pipeline::executor::ExecutorClient;
use crate::store::{ExecutionTemplate, ExecutionUpdate, Message, Store, User};

pub mod anthropic;
pub mod litellm;
pub mod openai;

/// Function-calling descriptor passed through to providers that support
/// tool invocation. The pipeline never interprets the schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionTool {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Compiled-in fallbacks applied when a template leaves a field unset
/// (zero or negative). The token budget maps onto whichever limit field
/// the provider family uses.
#[derive(Debug, Clone, Copy)]
pub struct ProviderDefaults {
    pub temperature: f64,
    pub max_tokens: i64,
    pub timeout_secs: i64,
}

/// Neutral message extracted from a provider response. Completion id and
/// token usage end up in `metadata`.
#[derive(Debug, Clone)]
pub struct ProviderReply {
    pub role: String,
    pub content: Value,
    pub metadata: Value,
}

/// Everything an adapter needs besides the messages and template.
pub struct ExecutionContext<'a> {
    pub store: &'a Store,
    pub executor: &'a ExecutorClient,
    pub user: &'a User,
    pub execution_id: &'a str,
    pub tools: &'a [ExecutionTool],
}

/// One LLM vendor: message format, defaults, response shape.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Registry key; matched against the template's model field.
    fn identifier(&self) -> &'static str;

    fn allowed_roles(&self) -> &'static [&'static str];

    fn defaults(&self) -> ProviderDefaults;

    fn validate_message(&self, message: &Message) -> Result<(), ExecError> {
        validate_with_roles(message, self.allowed_roles())
    }

    /// Defensive decode of the loosely-typed executor response into a
    /// neutral message. Any missing or mistyped field is a hard error.
    fn from_provider_response(&self, response: &Value) -> Result<ProviderReply, ExecError>;

    /// Adapts the messages, resolves parameter defaults, persists the
    /// request snapshot, and issues the executor call. Returns the HTTP
    /// status and decoded body; status interpretation happens upstream.
    async fn execute(
        &self,
        ctx: ExecutionContext<'_>,
        messages: &[Message],
        template: &ExecutionTemplate,
    ) -> Result<(u16, Value), ExecError>;
}

/// Static map from model identifier to provider adapter. Populated once at
/// startup; an unknown identifier fails the request before any state exists.
pub struct ProviderRegistry {
    providers: HashMap<&'static str, Arc<dyn ChatProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }

    /// All compiled-in providers.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(openai::gpt_4o()));
        registry.register(Arc::new(openai::gpt_4()));
        registry.register(Arc::new(openai::o1()));
        registry.register(Arc::new(openai::o1_mini()));
        registry.register(Arc::new(openai::o1_preview()));
        registry.register(Arc::new(anthropic::claude_35_sonnet()));
        registry.register(Arc::new(litellm::LiteLlm::new()));
        registry
    }

    pub fn register(&mut self, provider: Arc<dyn ChatProvider>) {
        self.providers.insert(provider.identifier(), provider);
    }

    pub fn lookup(&self, identifier: &str) -> Result<Arc<dyn ChatProvider>, ExecError> {
        self.providers
            .get(identifier)
            .cloned()
            .ok_or_else(|| ExecError::UnknownProvider(identifier.to_string()))
    }

    pub fn identifiers(&self) -> Vec<&'static str> {
        let mut ids: Vec<_> = self.providers.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

pub(crate) fn validate_with_roles(
    message: &Message,
    allowed: &'static [&'static str],
) -> Result<(), ExecError> {
    let empty = match &message.content {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    };
    if empty {
        return Err(ExecError::EmptyContent);
    }
    if !allowed.contains(&message.role.as_str()) {
        return Err(ExecError::InvalidRole {
            role: message.role.clone(),
            allowed,
        });
    }
    Ok(())
}

/// System-prompt resolution: the per-execution override wins, otherwise the
/// last system-role message in the list, otherwise empty.
pub(crate) fn resolve_system_prompt(
    messages: &[Message],
    override_prompt: &str,
) -> Result<String, ExecError> {
    if !override_prompt.is_empty() {
        return Ok(override_prompt.to_string());
    }
    let mut prompt = String::new();
    for message in messages {
        if message.role == "system" {
            prompt = system_text(message)?;
        }
    }
    Ok(prompt)
}

pub(crate) fn system_text(message: &Message) -> Result<String, ExecError> {
    message
        .content
        .as_str()
        .map(str::to_string)
        .ok_or(ExecError::SystemPromptNotText)
}

pub(crate) fn strip_system_messages(messages: Vec<Message>) -> Vec<Message> {
    messages.into_iter().filter(|m| m.role != "system").collect()
}

/// Persists the fully-resolved payload as the request snapshot, then issues
/// the executor call with the resolved timeout.
pub(crate) async fn dispatch(
    ctx: &ExecutionContext<'_>,
    route: &str,
    timeout_secs: i64,
    payload: &Value,
) -> Result<(u16, Value), ExecError> {
    ctx.store
        .executions
        .update(
            ctx.execution_id,
            &ExecutionUpdate {
                request_metadata: Some(payload.clone()),
                ..Default::default()
            },
        )
        .await?;
    ctx.executor.execute(route, payload, timeout_secs).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn message(role: &str, content: Value) -> Message {
        Message {
            identifier: String::new(),
            thread_id: String::new(),
            role: role.to_string(),
            content,
            tool_call_id: None,
            tool_calls: None,
            function_call: None,
            metadata: json!({}),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn builtin_registry_knows_all_providers() {
        let registry = ProviderRegistry::builtin();
        for id in [
            "gpt-4o",
            "gpt-4",
            "o1",
            "o1-mini",
            "o1-preview",
            "claude-3-5-sonnet",
            "litellm",
        ] {
            assert!(registry.lookup(id).is_ok(), "missing provider {id}");
        }
    }

    #[test]
    fn lookup_unknown_provider_fails() {
        let registry = ProviderRegistry::builtin();
        assert!(matches!(
            registry.lookup("gpt-99"),
            Err(ExecError::UnknownProvider(_))
        ));
    }

    #[test]
    fn override_wins_over_system_messages() {
        let messages = vec![message("system", json!("from thread"))];
        let prompt = resolve_system_prompt(&messages, "explicit").unwrap();
        assert_eq!(prompt, "explicit");
    }

    #[test]
    fn last_system_message_wins() {
        let messages = vec![
            message("system", json!("first")),
            message("user", json!("hi")),
            message("system", json!("second")),
        ];
        let prompt = resolve_system_prompt(&messages, "").unwrap();
        assert_eq!(prompt, "second");
    }

    #[test]
    fn missing_system_prompt_resolves_empty() {
        let messages = vec![message("user", json!("hi"))];
        assert_eq!(resolve_system_prompt(&messages, "").unwrap(), "");
    }

    #[test]
    fn structured_system_content_is_rejected() {
        let messages = vec![message("system", json!({"blocks": []}))];
        assert!(matches!(
            resolve_system_prompt(&messages, ""),
            Err(ExecError::SystemPromptNotText)
        ));
    }

    #[test]
    fn validation_rejects_empty_content_and_foreign_roles() {
        const ROLES: &[&str] = &["user", "assistant"];
        assert!(matches!(
            validate_with_roles(&message("user", json!("")), ROLES),
            Err(ExecError::EmptyContent)
        ));
        assert!(matches!(
            validate_with_roles(&message("tool", json!("x")), ROLES),
            Err(ExecError::InvalidRole { .. })
        ));
        assert!(validate_with_roles(&message("user", json!("x")), ROLES).is_ok());
        // structured content counts as present
        assert!(validate_with_roles(&message("user", json!({"a": 1})), ROLES).is_ok());
    }
}
