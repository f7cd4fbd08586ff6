//! Bounded structured sub-agents
//!
//! A sub-agent is one function-calling loop: the model may call the tools it
//! was given, and must finish with a JSON object matching the response
//! schema. Every model call consumes one step. Running out of steps is an
//! error the caller recovers from, never an endless loop.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use udahub_ai::{CompletionOptions, Context, Message};

use crate::{
    error::{Error, Result},
    schema::{ResponseSchema, validate_with_validator},
    tool::{BoxedTool, ToolResult, to_api_tool},
    transport::Transport,
};

/// Everything a sub-agent run needs
#[derive(Clone)]
pub struct SubAgentRequest {
    /// Short label used in logs (e.g. `supervisor`, `faq`)
    pub name: String,
    pub system_prompt: String,
    /// Tools the model may call during this run
    pub tools: Vec<BoxedTool>,
    /// Contract for the final answer
    pub response_schema: ResponseSchema,
    /// Conversation so far
    pub messages: Vec<Message>,
    /// Maximum number of model calls
    pub step_limit: usize,
}

impl SubAgentRequest {
    pub fn new(
        name: impl Into<String>,
        system_prompt: impl Into<String>,
        response_schema: ResponseSchema,
        step_limit: usize,
    ) -> Self {
        Self {
            name: name.into(),
            system_prompt: system_prompt.into(),
            tools: Vec::new(),
            response_schema,
            messages: Vec::new(),
            step_limit,
        }
    }

    pub fn with_tools(mut self, tools: Vec<BoxedTool>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_messages(mut self, messages: Vec<Message>) -> Self {
        self.messages = messages;
        self
    }
}

/// Runs a sub-agent to a structured answer
#[async_trait]
pub trait SubAgent: Send + Sync {
    /// Returns a JSON value that satisfies `request.response_schema`
    async fn run(&self, request: SubAgentRequest) -> Result<serde_json::Value>;
}

/// Run a sub-agent and deserialize its answer
pub async fn run_typed<T: DeserializeOwned>(
    agent: &dyn SubAgent,
    request: SubAgentRequest,
) -> Result<T> {
    let value = agent.run(request).await?;
    Ok(serde_json::from_value(value)?)
}

/// Sub-agent backed by a model [`Transport`]
pub struct LlmSubAgent {
    transport: Arc<dyn Transport>,
    options: CompletionOptions,
    cancel: CancellationToken,
}

impl LlmSubAgent {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            options: CompletionOptions::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_options(mut self, options: CompletionOptions) -> Self {
        self.options = options;
        self
    }

    /// Share a cancellation token with the caller
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    async fn execute_tool_calls(
        &self,
        tool_calls: Vec<(String, String, serde_json::Value)>,
        tools: &[BoxedTool],
        validators: &HashMap<String, Arc<jsonschema::Validator>>,
    ) -> Vec<Message> {
        let mut results = Vec::with_capacity(tool_calls.len());

        for (id, name, args) in tool_calls {
            let tool = tools.iter().find(|t| t.name() == name);

            let result = if let Some(tool) = tool {
                let validation_error = validators
                    .get(name.as_str())
                    .and_then(|validator| validate_with_validator(&args, validator));

                if let Some(err) = validation_error {
                    ToolResult::error(format!("Tool argument validation failed:\n{}", err))
                } else {
                    tracing::debug!(tool = %name, "executing tool");
                    tool.execute(&id, args, self.cancel.clone()).await
                }
            } else {
                ToolResult::error(format!("Tool not found: {}", name))
            };

            if result.is_error {
                tracing::debug!(tool = %name, error = %result.text_content(), "tool returned error");
            }
            results.push(Message::tool_result(id, name, result.content, result.is_error));
        }

        results
    }
}

#[async_trait]
impl SubAgent for LlmSubAgent {
    async fn run(&self, request: SubAgentRequest) -> Result<serde_json::Value> {
        let SubAgentRequest {
            name,
            system_prompt,
            tools,
            response_schema,
            messages,
            step_limit,
        } = request;

        let mut validators = HashMap::new();
        for tool in &tools {
            match jsonschema::validator_for(&tool.parameters_schema()) {
                Ok(v) => {
                    validators.insert(tool.name().to_string(), Arc::new(v));
                }
                Err(e) => {
                    tracing::warn!("Invalid parameter schema for tool '{}': {}", tool.name(), e);
                }
            }
        }

        let mut context = Context {
            system_prompt: Some(system_prompt),
            messages,
            tools: tools.iter().map(|t| to_api_tool(t.as_ref())).collect(),
            response_format: Some(response_schema.to_response_format()),
        };

        for step in 1..=step_limit {
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let completion = self
                .transport
                .complete(&context, &self.options, self.cancel.clone())
                .await?;
            let message = completion.message;

            let tool_calls: Vec<(String, String, serde_json::Value)> = message
                .tool_calls()
                .into_iter()
                .map(|(id, name, args)| (id.to_string(), name.to_string(), args.clone()))
                .collect();
            context.push(message.clone());

            if !tool_calls.is_empty() {
                tracing::debug!(agent = %name, step, calls = tool_calls.len(), "tool calls requested");
                let results = self
                    .execute_tool_calls(tool_calls, &tools, &validators)
                    .await;
                context.messages.extend(results);
                continue;
            }

            let text = message.text();
            let candidate = parse_json_answer(&text)
                .and_then(|value| response_schema.validate(&value).map(|_| value));

            match candidate {
                Ok(value) => {
                    tracing::debug!(agent = %name, step, "structured answer accepted");
                    return Ok(value);
                }
                Err(e) => {
                    tracing::debug!(agent = %name, step, error = %e, "answer rejected, asking for correction");
                    context.push(Message::user(format!(
                        "Your last answer was rejected: {}\nReply with a single JSON object that matches the \"{}\" schema.",
                        e,
                        response_schema.name()
                    )));
                }
            }
        }

        tracing::warn!(agent = %name, limit = step_limit, "sub-agent step limit exceeded");
        Err(Error::StepLimitExceeded { limit: step_limit })
    }
}

/// Parse a model answer as JSON, tolerating a surrounding markdown fence
pub fn parse_json_answer(text: &str) -> Result<serde_json::Value> {
    let trimmed = text.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();

    if body.is_empty() {
        return Err(Error::InvalidResponse("empty answer".into()));
    }
    Ok(serde_json::from_str(body)?)
}
