// src/provider/anthropic.rs
// Anthropic Messages API adapter

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::ExecError;
use crate::store::{ExecutionTemplate, Message};

use super::{
    dispatch, system_text, ChatProvider, ExecutionContext, ProviderDefaults, ProviderReply,
};

const ANTHROPIC_ALLOWED_ROLES: &[&str] = &["user", "assistant", "system"];
const ANTHROPIC_ROUTE: &str = "/chatcompletion/anthropic";

pub fn claude_35_sonnet() -> AnthropicProvider {
    AnthropicProvider {
        identifier: "claude-3-5-sonnet",
        model: "claude-3-5-sonnet-20241022",
        defaults: ProviderDefaults {
            temperature: 0.5,
            max_tokens: 8192,
            timeout_secs: 600,
        },
    }
}

pub struct AnthropicProvider {
    identifier: &'static str,
    model: &'static str,
    defaults: ProviderDefaults,
}

/// Anthropic takes the system prompt as a dedicated payload field, and its
/// wire messages are plain role/content pairs with string content.
#[derive(Debug, Clone, Serialize)]
struct AnthropicMessage {
    role: String,
    content: Value,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    id: String,
    role: String,
    content: Vec<ContentBlock>,
    usage: Value,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    text: String,
}

#[async_trait]
impl ChatProvider for AnthropicProvider {
    fn identifier(&self) -> &'static str {
        self.identifier
    }

    fn allowed_roles(&self) -> &'static [&'static str] {
        ANTHROPIC_ALLOWED_ROLES
    }

    fn defaults(&self) -> ProviderDefaults {
        self.defaults
    }

    fn from_provider_response(&self, response: &Value) -> Result<ProviderReply, ExecError> {
        let decoded: AnthropicResponse = serde_json::from_value(response.clone())
            .map_err(|e| ExecError::MalformedResponse(e.to_string()))?;
        let block = decoded
            .content
            .into_iter()
            .next()
            .ok_or_else(|| ExecError::MalformedResponse("no content found".to_string()))?;

        Ok(ProviderReply {
            role: decoded.role,
            content: Value::String(block.text),
            metadata: json!({
                "anthropic_chat_completion_id": decoded.id,
                "usage": decoded.usage,
            }),
        })
    }

    async fn execute(
        &self,
        ctx: ExecutionContext<'_>,
        messages: &[Message],
        template: &ExecutionTemplate,
    ) -> Result<(u16, Value), ExecError> {
        let mut wire = Vec::with_capacity(messages.len());
        let mut system_prompt = String::new();
        for message in messages {
            if message.role == "system" {
                system_prompt = system_text(message)?;
                continue;
            }
            wire.push(AnthropicMessage {
                role: message.role.clone(),
                content: message.content.clone(),
            });
        }
        if !template.system_prompt.is_empty() {
            system_prompt = template.system_prompt.clone();
        }

        let temperature = if template.temperature <= 0.0 {
            self.defaults.temperature
        } else {
            template.temperature
        };
        let max_tokens = if template.max_tokens <= 0 {
            self.defaults.max_tokens
        } else {
            template.max_tokens
        };
        let timeout_secs = if template.timeout_secs <= 0 {
            self.defaults.timeout_secs
        } else {
            template.timeout_secs
        };

        let payload = json!({
            "api_key": ctx.user.anthropic_key,
            "model": self.model,
            "messages": wire,
            "temperature": temperature,
            "timeout": timeout_secs,
            "max_tokens": max_tokens,
            "system_prompt": system_prompt,
            "response_format": template.response_format,
        });

        dispatch(&ctx, ANTHROPIC_ROUTE, timeout_secs, &payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_response_extracts_first_content_block() {
        let raw = json!({
            "id": "msg_01",
            "role": "assistant",
            "content": [{"text": "hello there"}, {"text": "ignored"}],
            "usage": {"input_tokens": 10, "output_tokens": 4},
        });
        let reply = claude_35_sonnet().from_provider_response(&raw).unwrap();
        assert_eq!(reply.role, "assistant");
        assert_eq!(reply.content, json!("hello there"));
        assert_eq!(reply.metadata["anthropic_chat_completion_id"], json!("msg_01"));
        assert_eq!(reply.metadata["usage"]["output_tokens"], json!(4));
    }

    #[test]
    fn parse_response_rejects_empty_or_mistyped_content() {
        let raw = json!({"id": "m", "role": "assistant", "content": [], "usage": {}});
        assert!(matches!(
            claude_35_sonnet().from_provider_response(&raw),
            Err(ExecError::MalformedResponse(_))
        ));

        let raw = json!({"id": "m", "role": "assistant", "content": [{"text": 7}], "usage": {}});
        assert!(matches!(
            claude_35_sonnet().from_provider_response(&raw),
            Err(ExecError::MalformedResponse(_))
        ));
    }

    #[test]
    fn tool_role_is_not_allowed() {
        let provider = claude_35_sonnet();
        let message = Message::inline("tool", json!("result"));
        assert!(matches!(
            provider.validate_message(&message),
            Err(ExecError::InvalidRole { .. })
        ));
    }
}
