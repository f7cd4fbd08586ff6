//! Knowledge base search

use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use udahub_agent::{Tool, ToolAnnotations, ToolMetadata, ToolResult};
use udahub_graph::{KNOWLEDGE_AUTHOR, KnowledgeStore};

use super::{refusal, required_str};

const DEFAULT_LIMIT: usize = 3;
const MAX_LIMIT: usize = 10;

/// Search an account's knowledge articles
pub struct QueryKnowledgeTool {
    store: Arc<dyn KnowledgeStore>,
}

impl QueryKnowledgeTool {
    pub fn new(store: Arc<dyn KnowledgeStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for QueryKnowledgeTool {
    fn name(&self) -> &str {
        "query_udahub_knowledgebase"
    }

    fn description(&self) -> &str {
        "Search the knowledge base of a customer account for articles answering a question. Returns the best matches first."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "account_id": { "type": "string" },
                "query": { "type": "string", "description": "The question or keywords to search for" },
                "limit": { "type": "integer", "minimum": 1, "maximum": MAX_LIMIT }
            },
            "required": ["account_id", "query"]
        })
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::new(
            KNOWLEDGE_AUTHOR,
            &["udahub", "query", "knowledge"],
            ToolAnnotations::read_only(),
        )
    }

    async fn execute(&self, _id: &str, arguments: Value, _cancel: CancellationToken) -> ToolResult {
        let (account_id, query) = match (
            required_str(&arguments, "account_id"),
            required_str(&arguments, "query"),
        ) {
            (Ok(a), Ok(q)) => (a, q),
            (Err(e), _) | (_, Err(e)) => return e,
        };
        let limit = arguments
            .get("limit")
            .and_then(|v| v.as_u64())
            .map(|l| (l as usize).clamp(1, MAX_LIMIT))
            .unwrap_or(DEFAULT_LIMIT);

        match self.store.search(account_id, query, limit).await {
            Ok(entries) if entries.is_empty() => {
                refusal(format!("No knowledge articles match '{}'", query))
            }
            Ok(entries) => {
                let articles: Vec<Value> = entries
                    .iter()
                    .map(|e| {
                        json!({
                            "article_id": e.article_id,
                            "title": e.title,
                            "content": e.content,
                            "tags": e.tags,
                        })
                    })
                    .collect();
                ToolResult::json(&json!({ "articles": articles }))
            }
            Err(e) => ToolResult::error(format!("Knowledge search failed: {}", e)),
        }
    }
}
