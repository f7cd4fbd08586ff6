//! OpenAI-compatible Chat Completions provider
//!
//! Requests are non-streaming: the orchestrator only ever consumes whole
//! structured answers, so every call returns one finished [`Completion`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::LlmProvider;
use crate::{
    error::{Error, Result},
    types::{
        AssistantMetadata, Completion, CompletionOptions, Content, Context, Message, Model,
        StopReason, Usage,
    },
};

/// OpenAI API client
pub struct OpenAIProvider {
    client: reqwest::Client,
    api_key: String,
}

impl OpenAIProvider {
    /// Create a new OpenAI provider with an API key
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
        }
    }

    fn build_request(
        &self,
        model: &Model,
        context: &Context,
        options: &CompletionOptions,
    ) -> OpenAIRequest {
        let mut messages = Vec::new();

        if let Some(ref system_prompt) = context.system_prompt {
            messages.push(OpenAIMessage {
                role: "system".to_string(),
                content: Some(system_prompt.clone()),
                tool_calls: None,
                tool_call_id: None,
            });
        }

        for msg in &context.messages {
            messages.push(convert_message(msg));
        }

        let tools = if context.tools.is_empty() {
            None
        } else {
            Some(
                context
                    .tools
                    .iter()
                    .map(|t| OpenAITool {
                        tool_type: "function".to_string(),
                        function: OpenAIFunction {
                            name: t.name.clone(),
                            description: Some(t.description.clone()),
                            parameters: Some(t.parameters.clone()),
                        },
                    })
                    .collect(),
            )
        };

        let response_format = context.response_format.as_ref().map(|f| {
            serde_json::json!({
                "type": "json_schema",
                "json_schema": {
                    "name": f.name,
                    "schema": f.schema,
                    "strict": false,
                }
            })
        });

        let has_tools = tools.is_some();
        OpenAIRequest {
            model: model.id.clone(),
            messages,
            max_tokens: Some(options.max_tokens.unwrap_or(model.max_tokens)),
            temperature: options.temperature,
            tools,
            tool_choice: if has_tools {
                Some(serde_json::json!("auto"))
            } else {
                None
            },
            response_format,
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAIProvider {
    async fn complete(
        &self,
        model: &Model,
        context: &Context,
        options: &CompletionOptions,
    ) -> Result<Completion> {
        let request = self.build_request(model, context, options);
        let url = format!("{}/chat/completions", model.base_url);

        let mut builder = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request);
        for (key, value) in &model.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }

        tracing::debug!(model = %model.id, messages = request.messages.len(), "chat completion request");
        let response = builder.send().await?;
        let status = response.status();

        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            return Err(Error::RateLimited { retry_after });
        }
        if status.as_u16() == 401 {
            return Err(Error::InvalidApiKey);
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(parse_error_body(status.as_u16(), &text));
        }

        let body: ChatResponse = response.json().await?;
        parse_response(body, model)
    }
}

fn parse_error_body(status: u16, text: &str) -> Error {
    match serde_json::from_str::<ErrorEnvelope>(text) {
        Ok(envelope) => Error::api(
            envelope
                .error
                .error_type
                .unwrap_or_else(|| format!("http_{}", status)),
            envelope.error.message,
        ),
        Err(_) => {
            let error_type = if status >= 500 {
                "server_error".to_string()
            } else {
                format!("http_{}", status)
            };
            Error::api(error_type, text)
        }
    }
}

fn convert_message(msg: &Message) -> OpenAIMessage {
    match msg {
        Message::User { .. } => OpenAIMessage {
            role: "user".to_string(),
            content: Some(msg.text()),
            tool_calls: None,
            tool_call_id: None,
        },
        Message::Assistant { content, .. } => {
            let mut text_parts = Vec::new();
            let mut tool_calls = Vec::new();

            for c in content {
                match c {
                    Content::Text { text } => text_parts.push(text.clone()),
                    Content::ToolCall {
                        id,
                        name,
                        arguments,
                    } => {
                        tool_calls.push(OpenAIToolCall {
                            id: id.clone(),
                            call_type: "function".to_string(),
                            function: OpenAIFunctionCall {
                                name: name.clone(),
                                arguments: arguments.to_string(),
                            },
                        });
                    }
                }
            }

            OpenAIMessage {
                role: "assistant".to_string(),
                content: if text_parts.is_empty() {
                    None
                } else {
                    Some(text_parts.join(""))
                },
                tool_calls: if tool_calls.is_empty() {
                    None
                } else {
                    Some(tool_calls)
                },
                tool_call_id: None,
            }
        }
        Message::ToolResult { tool_call_id, .. } => OpenAIMessage {
            role: "tool".to_string(),
            content: Some(msg.text()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.clone()),
        },
    }
}

fn parse_response(body: ChatResponse, model: &Model) -> Result<Completion> {
    let choice = body
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| Error::UnexpectedResponse("response contained no choices".into()))?;

    let mut content = Vec::new();
    if let Some(text) = choice.message.content {
        if !text.is_empty() {
            content.push(Content::text(text));
        }
    }
    for call in choice.message.tool_calls.unwrap_or_default() {
        let arguments = if call.function.arguments.trim().is_empty() {
            serde_json::json!({})
        } else {
            serde_json::from_str(&call.function.arguments)?
        };
        content.push(Content::tool_call(call.id, call.function.name, arguments));
    }

    let has_tool_calls = content.iter().any(|c| matches!(c, Content::ToolCall { .. }));
    let stop_reason = match choice.finish_reason.as_deref() {
        Some("length") => StopReason::Length,
        Some("tool_calls") => StopReason::ToolUse,
        _ if has_tool_calls => StopReason::ToolUse,
        _ => StopReason::Stop,
    };

    let usage = body
        .usage
        .map(|u| Usage {
            input: u.prompt_tokens,
            output: u.completion_tokens,
        })
        .unwrap_or_default();

    let message = Message::Assistant {
        content,
        metadata: AssistantMetadata {
            model: Some(model.id.clone()),
            usage: usage.clone(),
            stop_reason: Some(stop_reason),
            timestamp: chrono::Utc::now().timestamp_millis(),
        },
    };

    Ok(Completion {
        message,
        stop_reason,
        usage,
    })
}

// Request types

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OpenAITool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct OpenAIMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OpenAIToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct OpenAITool {
    #[serde(rename = "type")]
    tool_type: String,
    function: OpenAIFunction,
}

#[derive(Debug, Serialize)]
struct OpenAIFunction {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parameters: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct OpenAIToolCall {
    id: String,
    #[serde(rename = "type")]
    call_type: String,
    function: OpenAIFunctionCall,
}

#[derive(Debug, Serialize)]
struct OpenAIFunctionCall {
    name: String,
    arguments: String,
}

// Response types

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
    tool_calls: Option<Vec<ChatToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ChatToolCall {
    id: String,
    function: ChatFunction,
}

#[derive(Debug, Deserialize)]
struct ChatFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
    #[serde(rename = "type")]
    error_type: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Provider, ResponseFormat, Tool};

    fn model() -> Model {
        Model::new(Provider::OpenAI, "gpt-4o-mini")
    }

    #[test]
    fn test_build_request_includes_system_tools_and_schema() {
        let provider = OpenAIProvider::new("sk-test");
        let mut context = Context::with_system("You are a supervisor");
        context.push(Message::user("Where is my reservation?"));
        context.add_tool(Tool::new(
            "get_reservations",
            "List reservations",
            serde_json::json!({"type": "object", "properties": {}}),
        ));
        context.response_format = Some(ResponseFormat {
            name: "supervisor_analysis".into(),
            schema: serde_json::json!({"type": "object"}),
        });

        let request = provider.build_request(&model(), &context, &CompletionOptions::default());
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["role"], "user");
        assert_eq!(json["tools"][0]["function"]["name"], "get_reservations");
        assert_eq!(json["tool_choice"], "auto");
        assert_eq!(json["response_format"]["type"], "json_schema");
        assert_eq!(json["response_format"]["json_schema"]["name"], "supervisor_analysis");
        assert_eq!(json["max_tokens"], 4096);
    }

    #[test]
    fn test_build_request_tool_round_trip_messages() {
        let provider = OpenAIProvider::new("sk-test");
        let mut context = Context::default();
        context.push(Message::Assistant {
            content: vec![Content::tool_call(
                "call_1",
                "get_udahub_account",
                serde_json::json!({"account_id": "cultpass"}),
            )],
            metadata: AssistantMetadata::default(),
        });
        context.push(Message::tool_result(
            "call_1",
            "get_udahub_account",
            vec![Content::text("{\"account_id\":\"cultpass\"}")],
            false,
        ));

        let request = provider.build_request(&model(), &context, &CompletionOptions::default());
        let json = serde_json::to_value(&request).unwrap();

        assert!(json.get("tools").is_none());
        assert!(json["messages"][0].get("content").is_none());
        assert_eq!(
            json["messages"][0]["tool_calls"][0]["function"]["arguments"],
            "{\"account_id\":\"cultpass\"}"
        );
        assert_eq!(json["messages"][1]["role"], "tool");
        assert_eq!(json["messages"][1]["tool_call_id"], "call_1");
    }

    #[test]
    fn test_parse_response_with_tool_calls() {
        let body: ChatResponse = serde_json::from_value(serde_json::json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_9",
                        "type": "function",
                        "function": {"name": "find_udahub_user", "arguments": "{\"external_user_id\":\"f556c0\"}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 120, "completion_tokens": 14}
        }))
        .unwrap();

        let completion = parse_response(body, &model()).unwrap();
        assert_eq!(completion.stop_reason, StopReason::ToolUse);
        assert_eq!(completion.usage, Usage { input: 120, output: 14 });
        let calls = completion.message.tool_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].2["external_user_id"], "f556c0");
    }

    #[test]
    fn test_parse_response_text_only() {
        let body: ChatResponse = serde_json::from_value(serde_json::json!({
            "choices": [{
                "message": {"content": "{\"worker\":\"faq\"}"},
                "finish_reason": "stop"
            }]
        }))
        .unwrap();

        let completion = parse_response(body, &model()).unwrap();
        assert_eq!(completion.stop_reason, StopReason::Stop);
        assert_eq!(completion.message.text(), "{\"worker\":\"faq\"}");
        assert_eq!(completion.usage, Usage::default());
    }

    #[test]
    fn test_parse_response_without_choices_is_error() {
        let body: ChatResponse = serde_json::from_value(serde_json::json!({"choices": []})).unwrap();
        assert!(matches!(
            parse_response(body, &model()),
            Err(Error::UnexpectedResponse(_))
        ));
    }

    #[test]
    fn test_parse_error_body() {
        let err = parse_error_body(
            400,
            r#"{"error": {"message": "Invalid schema", "type": "invalid_request_error"}}"#,
        );
        assert!(matches!(err, Error::Api { ref error_type, .. } if error_type == "invalid_request_error"));

        let err = parse_error_body(502, "bad gateway");
        assert!(err.is_retryable());
    }
}
