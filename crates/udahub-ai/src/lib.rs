//! udahub-ai: LLM provider abstraction layer
//!
//! This crate provides a common interface for requesting structured,
//! tool-calling completions from OpenAI-compatible Chat Completions APIs.

pub mod error;
pub mod providers;
pub mod types;

pub use error::{Error, Result};
pub use providers::{LlmProvider, openai::OpenAIProvider};
pub use types::*;
