//! udahub-agent: capability-scoped tools and bounded sub-agents
//!
//! This crate provides the tool catalog abstractions and the structured
//! function-calling loop every node of the orchestrator delegates to.

pub mod error;
pub mod filter;
pub mod schema;
pub mod subagent;
pub mod tool;
pub mod transport;

pub use error::{Error, Result};
pub use filter::ToolFilter;
pub use schema::{ResponseSchema, validate_tool_args};
pub use subagent::{LlmSubAgent, SubAgent, SubAgentRequest, run_typed};
pub use tool::{BoxedTool, Tool, ToolAnnotations, ToolMetadata, ToolResult};
pub use transport::{ProviderTransport, RetryConfig, Transport};
