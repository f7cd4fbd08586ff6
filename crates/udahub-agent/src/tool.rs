//! Tool trait and capability metadata

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use udahub_ai::Content;

/// Result of a tool execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Content to return to the LLM
    pub content: Vec<Content>,
    /// Whether the execution resulted in an error
    pub is_error: bool,
}

impl ToolResult {
    /// Create a successful text result
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![Content::text(text)],
            is_error: false,
        }
    }

    /// Create a successful result carrying a JSON document
    pub fn json(value: &serde_json::Value) -> Self {
        Self::text(value.to_string())
    }

    /// Create an error result
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![Content::text(message)],
            is_error: true,
        }
    }

    /// Get the text content as a single string
    pub fn text_content(&self) -> String {
        self.content
            .iter()
            .filter_map(|c| c.as_text())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Behavioural hints a tool declares about itself
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolAnnotations {
    /// The tool never modifies state
    pub read_only: bool,
    /// The tool may destroy or irreversibly change data
    pub destructive: bool,
    /// Repeating the call with the same arguments has no further effect
    pub idempotent: bool,
}

impl ToolAnnotations {
    /// Hints for a lookup tool
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            destructive: false,
            idempotent: true,
        }
    }

    /// Hints for a tool that changes state
    pub fn mutating(destructive: bool, idempotent: bool) -> Self {
        Self {
            read_only: false,
            destructive,
            idempotent,
        }
    }

    /// Look up a hint by name.
    ///
    /// Accepts both the snake case field names and the camel case
    /// `*Hint` spelling used by tool catalogs. Unknown names are `None`.
    pub fn hint(&self, name: &str) -> Option<bool> {
        match name {
            "read_only" | "readOnlyHint" => Some(self.read_only),
            "destructive" | "destructiveHint" => Some(self.destructive),
            "idempotent" | "idempotentHint" => Some(self.idempotent),
            _ => None,
        }
    }
}

/// Catalog metadata used to scope which tools a sub-agent may see
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolMetadata {
    /// Domain tags (e.g. `validation`, `subscription`)
    pub tags: Vec<String>,
    /// Who provides the tool: the platform, an account, or the knowledge base
    pub author: String,
    /// Behavioural hints
    pub annotations: ToolAnnotations,
}

impl ToolMetadata {
    /// Create metadata for a tool
    pub fn new(author: impl Into<String>, tags: &[&str], annotations: ToolAnnotations) -> Self {
        Self {
            tags: tags.iter().map(|t| t.to_string()).collect(),
            author: author.into(),
            annotations,
        }
    }
}

/// Trait for executable tools
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (used in API calls)
    fn name(&self) -> &str;

    /// Tool description for the LLM
    fn description(&self) -> &str;

    /// JSON Schema for parameters
    fn parameters_schema(&self) -> serde_json::Value;

    /// Tags, author and hints
    fn metadata(&self) -> ToolMetadata;

    /// Execute the tool with the given arguments
    async fn execute(
        &self,
        tool_call_id: &str,
        arguments: serde_json::Value,
        cancel: CancellationToken,
    ) -> ToolResult;
}

/// Type alias for a boxed tool
pub type BoxedTool = Arc<dyn Tool>;

/// Convert a Tool to a udahub_ai::Tool for API calls
pub fn to_api_tool(tool: &dyn Tool) -> udahub_ai::Tool {
    udahub_ai::Tool {
        name: tool.name().to_string(),
        description: tool.description().to_string(),
        parameters: tool.parameters_schema(),
    }
}
