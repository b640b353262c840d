// src/provider/openai.rs
// OpenAI chat completion family, including the reasoning (o1) variants

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::ExecError;
use crate::store::{ExecutionTemplate, Message};

use super::{
    dispatch, resolve_system_prompt, strip_system_messages, system_text, ChatProvider,
    ExecutionContext, ProviderDefaults, ProviderReply,
};

pub(crate) const OPENAI_ALLOWED_ROLES: &[&str] = &["user", "assistant", "system", "tool"];

const OPENAI_ROUTE: &str = "/chatcompletion/openai";

pub fn gpt_4o() -> OpenAiProvider {
    OpenAiProvider {
        identifier: "gpt-4o",
        model: "gpt-4o",
        route: OPENAI_ROUTE,
        defaults: ProviderDefaults {
            temperature: 0.5,
            max_tokens: 10_000,
            timeout_secs: 600,
        },
        strip_system: false,
    }
}

pub fn gpt_4() -> OpenAiProvider {
    OpenAiProvider {
        identifier: "gpt-4",
        model: "gpt-4",
        route: OPENAI_ROUTE,
        defaults: ProviderDefaults {
            temperature: 0.5,
            max_tokens: 8192,
            timeout_secs: 600,
        },
        strip_system: false,
    }
}

pub fn o1() -> OpenAiProvider {
    OpenAiProvider {
        identifier: "o1",
        model: "o1",
        route: OPENAI_ROUTE,
        defaults: ProviderDefaults {
            temperature: 1.0,
            max_tokens: 32_768,
            timeout_secs: 600,
        },
        strip_system: true,
    }
}

pub fn o1_mini() -> OpenAiProvider {
    OpenAiProvider {
        identifier: "o1-mini",
        model: "o1-mini",
        route: OPENAI_ROUTE,
        defaults: ProviderDefaults {
            temperature: 1.0,
            max_tokens: 65_536,
            timeout_secs: 600,
        },
        strip_system: true,
    }
}

pub fn o1_preview() -> OpenAiProvider {
    OpenAiProvider {
        identifier: "o1-preview",
        model: "o1-preview",
        route: OPENAI_ROUTE,
        defaults: ProviderDefaults {
            temperature: 1.0,
            max_tokens: 32_768,
            timeout_secs: 600,
        },
        strip_system: true,
    }
}

/// One OpenAI-family model. The reasoning variants reject the system role
/// on the wire, so they fold the resolved prompt into the first user turn.
pub struct OpenAiProvider {
    identifier: &'static str,
    model: &'static str,
    route: &'static str,
    defaults: ProviderDefaults,
    strip_system: bool,
}

#[async_trait]
impl ChatProvider for OpenAiProvider {
    fn identifier(&self) -> &'static str {
        self.identifier
    }

    fn allowed_roles(&self) -> &'static [&'static str] {
        OPENAI_ALLOWED_ROLES
    }

    fn defaults(&self) -> ProviderDefaults {
        self.defaults
    }

    fn from_provider_response(&self, response: &Value) -> Result<ProviderReply, ExecError> {
        parse_response(response, "openai_chat_completion_id")
    }

    async fn execute(
        &self,
        ctx: ExecutionContext<'_>,
        messages: &[Message],
        template: &ExecutionTemplate,
    ) -> Result<(u16, Value), ExecError> {
        let mut template = template.clone();
        let messages = if self.strip_system {
            fold_system_into_user(messages.to_vec(), &mut template)?
        } else {
            messages.to_vec()
        };
        let api_keys = json!({ "openai": ctx.user.openai_key });
        base_execute(
            &ctx,
            &messages,
            &template,
            ExecuteConfig {
                model: self.model,
                route: self.route,
                defaults: self.defaults,
            },
            api_keys,
        )
        .await
    }
}

/// Wire shape shared by the whole family (and the litellm gateway).
#[derive(Debug, Clone, Serialize)]
pub(crate) struct OpenAiMessage {
    pub role: String,
    pub content: Value,
    pub tool_call_id: Option<String>,
    pub metadata: Value,
    pub tool_calls: Option<Value>,
    pub function_call: Option<Value>,
}

fn to_wire(message: &Message) -> OpenAiMessage {
    OpenAiMessage {
        role: message.role.clone(),
        content: message.content.clone(),
        tool_call_id: message.tool_call_id.clone(),
        metadata: message.metadata.clone(),
        tool_calls: message.tool_calls.clone(),
        function_call: message.function_call.clone(),
    }
}

#[derive(Debug, Deserialize)]
struct Completion {
    id: String,
    choices: Vec<Choice>,
    usage: Value,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    role: String,
    content: String,
}

/// Schema-checked decode of an OpenAI-style completion. The completion id
/// and usage breakdown are folded into the reply metadata.
pub(crate) fn parse_response(
    response: &Value,
    completion_id_key: &str,
) -> Result<ProviderReply, ExecError> {
    let completion: Completion = serde_json::from_value(response.clone())
        .map_err(|e| ExecError::MalformedResponse(e.to_string()))?;
    let choice = completion
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ExecError::MalformedResponse("no message choices found".to_string()))?;

    let mut metadata = serde_json::Map::new();
    metadata.insert(completion_id_key.to_string(), Value::String(completion.id));
    metadata.insert("usage".to_string(), completion.usage);

    Ok(ProviderReply {
        role: choice.message.role,
        content: Value::String(choice.message.content),
        metadata: Value::Object(metadata),
    })
}

pub(crate) struct ExecuteConfig<'a> {
    pub model: &'a str,
    pub route: &'static str,
    pub defaults: ProviderDefaults,
}

struct ResolvedParams {
    temperature: f64,
    max_completion_tokens: i64,
    timeout_secs: i64,
}

fn resolve_params(template: &ExecutionTemplate, defaults: &ProviderDefaults) -> ResolvedParams {
    ResolvedParams {
        temperature: if template.temperature <= 0.0 {
            defaults.temperature
        } else {
            template.temperature
        },
        max_completion_tokens: if template.max_completion_tokens <= 0 {
            defaults.max_tokens
        } else {
            template.max_completion_tokens
        },
        timeout_secs: if template.timeout_secs <= 0 {
            defaults.timeout_secs
        } else {
            template.timeout_secs
        },
    }
}

/// Shared execute path: adapt messages, resolve the system prompt and
/// parameter defaults, build the payload, dispatch.
pub(crate) async fn base_execute(
    ctx: &ExecutionContext<'_>,
    messages: &[Message],
    template: &ExecutionTemplate,
    config: ExecuteConfig<'_>,
    api_keys: Value,
) -> Result<(u16, Value), ExecError> {
    let mut wire = Vec::with_capacity(messages.len());
    let mut system_prompt = String::new();
    for message in messages {
        if message.role == "system" {
            system_prompt = system_text(message)?;
            continue;
        }
        wire.push(to_wire(message));
    }

    if !template.system_prompt.is_empty() {
        system_prompt = template.system_prompt.clone();
    }
    if !system_prompt.is_empty() {
        wire.insert(
            0,
            OpenAiMessage {
                role: "system".to_string(),
                content: Value::String(system_prompt),
                tool_call_id: None,
                metadata: json!({}),
                tool_calls: None,
                function_call: None,
            },
        );
    }

    let params = resolve_params(template, &config.defaults);
    let tools: Vec<Value> = ctx
        .tools
        .iter()
        .map(|tool| {
            json!({
                "type": "function",
                "function": {
                    "name": tool.name,
                    "description": tool.description,
                    "parameters": tool.input_schema,
                },
            })
        })
        .collect();

    let payload = json!({
        "api_keys": api_keys,
        "model": config.model,
        "messages": wire,
        "temperature": params.temperature,
        "max_completion_tokens": params.max_completion_tokens,
        "timeout": params.timeout_secs,
        "response_format": template.response_format,
        "tools": tools,
    });

    dispatch(ctx, config.route, params.timeout_secs, &payload).await
}

/// Reasoning models reject system-role messages outright: strip them, put
/// the resolved prompt at the front as an ordinary user turn, and clear the
/// template override so it cannot reapply downstream.
fn fold_system_into_user(
    messages: Vec<Message>,
    template: &mut ExecutionTemplate,
) -> Result<Vec<Message>, ExecError> {
    let system_prompt = resolve_system_prompt(&messages, &template.system_prompt)?;
    let mut messages = strip_system_messages(messages);
    if !system_prompt.is_empty() {
        messages.insert(0, Message::inline("user", Value::String(system_prompt)));
    }
    template.system_prompt.clear();
    Ok(messages)
}
