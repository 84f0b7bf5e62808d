//! Client for OpenAI-compatible `/chat/completions` endpoints (Groq, OpenAI,
//! Gemini's compatibility layer).

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::warn;

use crate::conversation::{AssistantMessage, Message, Role, ToolCall};
use crate::language_model::{LanguageModelClient, LanguageModelResponse, LanguageModelUsage};
use crate::options::ModelOptions;
use crate::tool::{ToolArguments, ToolDescription};

#[derive(Debug, Clone)]
pub struct ChatCompletionsClient {
    http: Client,
    endpoint: String,
    api_key: String,
    default_model: String,
}

impl ChatCompletionsClient {
    pub fn new(
        base_url: &str,
        api_key: impl Into<String>,
        default_model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("building HTTP client for inference endpoint")?;
        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key: api_key.into(),
            default_model: default_model.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }
}

#[async_trait]
impl LanguageModelClient for ChatCompletionsClient {
    async fn complete(
        &self,
        conversation: &[Message],
        tools: &[ToolDescription],
        options: &ModelOptions,
    ) -> Result<LanguageModelResponse> {
        let model = options.model.as_deref().unwrap_or(&self.default_model);
        let body = build_request_body(model, conversation, tools, options);
        tracing::debug!(
            target: "ai_agent::openai",
            model,
            messages = conversation.len(),
            tools = tools.len(),
            temperature = options.temperature,
        );

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("request to {} failed", self.endpoint))?;
        let status = response.status();
        let payload: Value = response
            .json()
            .await
            .with_context(|| format!("invalid completion payload from {}", self.endpoint))?;

        if !status.is_success() {
            return Err(anyhow!(
                "inference endpoint {} returned HTTP {}: {}",
                self.endpoint,
                status,
                payload
            ));
        }

        parse_completion(payload)
    }
}

pub fn build_request_body(
    model: &str,
    conversation: &[Message],
    tools: &[ToolDescription],
    options: &ModelOptions,
) -> Value {
    let messages: Vec<Value> = conversation.iter().map(wire_message).collect();
    let mut body = Map::new();
    body.insert("model".into(), json!(model));
    body.insert("temperature".into(), json!(options.temperature));
    body.insert("messages".into(), Value::Array(messages));
    if let Some(max_tokens) = options.max_tokens {
        body.insert("max_tokens".into(), json!(max_tokens));
    }
    // An absent `tools` field is what keeps the model from emitting calls.
    if !tools.is_empty() {
        let tools: Vec<Value> = tools.iter().map(wire_tool).collect();
        body.insert("tools".into(), Value::Array(tools));
    }
    Value::Object(body)
}

fn wire_message(message: &Message) -> Value {
    match message.role {
        Role::System => json!({ "role": "system", "content": message.content }),
        Role::User => json!({ "role": "user", "content": message.content }),
        Role::Assistant if message.tool_calls.is_empty() => {
            json!({ "role": "assistant", "content": message.content })
        }
        Role::Assistant => {
            let calls: Vec<Value> = message
                .tool_calls
                .iter()
                .map(|call| {
                    json!({
                        "id": call.id,
                        "type": "function",
                        "function": {
                            "name": call.name,
                            "arguments": Value::Object(call.arguments.clone()).to_string(),
                        }
                    })
                })
                .collect();
            let content = if message.content.is_empty() {
                Value::Null
            } else {
                Value::String(message.content.clone())
            };
            json!({ "role": "assistant", "content": content, "tool_calls": calls })
        }
        Role::ToolResult => json!({
            "role": "tool",
            "tool_call_id": message.tool_call_id.clone().unwrap_or_default(),
            "content": message.content,
        }),
    }
}

fn wire_tool(tool: &ToolDescription) -> Value {
    let parameters = if tool.input_schema.is_null() {
        json!({ "type": "object", "properties": {} })
    } else {
        tool.input_schema.clone()
    };
    json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": parameters,
        }
    })
}

#[derive(Debug, Deserialize)]
struct CompletionPayload {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
    #[serde(default)]
    usage: Option<LanguageModelUsage>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    id: String,
    function: WireFunction,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: Option<String>,
}

pub fn parse_completion(payload: Value) -> Result<LanguageModelResponse> {
    let payload: CompletionPayload =
        serde_json::from_value(payload).context("completion payload did not match schema")?;
    let choice = payload
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("completion payload contained no choices"))?;

    let tool_calls = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|call| {
            let raw = call.function.arguments.as_deref().unwrap_or_default();
            match parse_arguments(raw) {
                Ok(arguments) => ToolCall::new(call.id, call.function.name, arguments),
                Err(reason) => {
                    warn!(
                        target: "ai_agent::openai",
                        tool = %call.function.name,
                        %reason,
                        "model sent undecodable tool arguments"
                    );
                    ToolCall::malformed(call.id, call.function.name, reason)
                }
            }
        })
        .collect();

    let message = AssistantMessage {
        content: choice.message.content.unwrap_or_default(),
        tool_calls,
    };
    Ok(LanguageModelResponse {
        message,
        usage: payload.usage.unwrap_or_default(),
    })
}

fn parse_arguments(raw: &str) -> Result<ToolArguments, String> {
    if raw.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(Value::Null) => Ok(Map::new()),
        Ok(other) => Err(format!("expected a JSON object, got {other}")),
        Err(err) => Err(format!("not valid JSON ({err})")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::ConversationState;

    fn sample_conversation() -> ConversationState {
        let mut conversation = ConversationState::new("sys");
        conversation.append_user("remind me to buy milk").unwrap();
        let mut args = ToolArguments::new();
        args.insert("task".into(), json!("buy milk"));
        conversation
            .append_assistant(AssistantMessage::with_calls(
                "",
                vec![ToolCall::new("call_1", "add_todo", args)],
            ))
            .unwrap();
        conversation
            .append_tool_result("call_1", "Added todo: buy milk")
            .unwrap();
        conversation
    }

    #[test]
    fn request_body_maps_roles_and_calls() {
        let conversation = sample_conversation();
        let tools = vec![ToolDescription::new(
            "add_todo",
            "Add a task to the todo list.",
            json!({"type": "object", "properties": {"task": {"type": "string"}}}),
        )];
        let body = build_request_body(
            "llama-3.3-70b-versatile",
            conversation.snapshot(),
            &tools,
            &ModelOptions::default(),
        );

        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[1]["role"], "user");
        assert_eq!(messages[2]["content"], Value::Null);
        assert_eq!(messages[2]["tool_calls"][0]["function"]["name"], "add_todo");
        assert_eq!(
            messages[2]["tool_calls"][0]["function"]["arguments"],
            "{\"task\":\"buy milk\"}"
        );
        assert_eq!(messages[3]["role"], "tool");
        assert_eq!(messages[3]["tool_call_id"], "call_1");
        assert_eq!(body["tools"][0]["function"]["name"], "add_todo");
        assert_eq!(body["max_tokens"], 1024);
    }

    #[test]
    fn empty_schema_omits_tools_field() {
        let conversation = ConversationState::new("sys");
        let body = build_request_body(
            "m",
            conversation.snapshot(),
            &[],
            &ModelOptions::deterministic(None),
        );
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn parses_tool_calls_and_usage() {
        let payload = json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_9",
                        "type": "function",
                        "function": { "name": "open_app", "arguments": "{\"app_name\":\"notepad\"}" }
                    }]
                }
            }],
            "usage": { "prompt_tokens": 50, "completion_tokens": 9, "total_tokens": 59 }
        });
        let response = parse_completion(payload).unwrap();
        assert_eq!(response.message.content, "");
        assert_eq!(response.message.tool_calls[0].name, "open_app");
        assert_eq!(
            response.message.tool_calls[0].arguments["app_name"],
            json!("notepad")
        );
        assert_eq!(response.usage, LanguageModelUsage::new(50, 9, 59));
    }

    #[test]
    fn missing_usage_stays_empty() {
        let payload = json!({ "choices": [{ "message": { "content": "hi" } }] });
        let response = parse_completion(payload).unwrap();
        assert!(response.usage.is_empty());
        assert!(!response.message.has_tool_calls());
    }

    #[test]
    fn undecodable_arguments_keep_the_call() {
        let payload = json!({
            "choices": [{ "message": { "tool_calls": [
                { "id": "c1", "function": { "name": "add_todo", "arguments": "{\"task\": \"milk\"" } },
                { "id": "c2", "function": { "name": "add_todo", "arguments": "[1,2]" } }
            ]}}]
        });
        let response = parse_completion(payload).unwrap();
        let calls = &response.message.tool_calls;
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].id, "c1");
        assert!(calls[0].argument_error.as_deref().unwrap().starts_with("not valid JSON"));
        assert!(calls[0].arguments.is_empty());
        assert_eq!(
            calls[1].argument_error.as_deref(),
            Some("expected a JSON object, got [1,2]")
        );
    }

    #[test]
    fn rejects_payload_without_choices() {
        assert!(parse_completion(json!({ "choices": [] })).is_err());
    }
}
