//! The tool catalog served to the orchestrator
//!
//! Platform tools manage UDA Hub's own users and accounts, the knowledge tool
//! searches articles, and the customer tools operate on the CultPass directory.

mod customer;
mod knowledge;
mod platform;

use std::sync::Arc;

use serde_json::{Value, json};
use udahub_agent::{BoxedTool, ToolResult};

use crate::store::FileStore;

use customer::{
    CancelReservationTool, CancelSubscriptionTool, GetExperienceTool, GetReservationsTool,
    GetUserTool, ListExperiencesTool, MakeReservationTool, ReactivateSubscriptionTool,
    UpgradeSubscriptionTool,
};
use knowledge::QueryKnowledgeTool;
use platform::{CreateUserTool, FindUserTool, GetAccountTool, GetPlatformUserTool};

/// Every tool, in catalog order
pub fn catalog(store: Arc<FileStore>) -> Vec<BoxedTool> {
    vec![
        Arc::new(GetAccountTool::new(store.clone())),
        Arc::new(CreateUserTool::new(store.clone())),
        Arc::new(GetPlatformUserTool::new(store.clone())),
        Arc::new(FindUserTool::new(store.clone())),
        Arc::new(QueryKnowledgeTool::new(store.clone())),
        Arc::new(GetUserTool::new(store.clone())),
        Arc::new(CancelSubscriptionTool::new(store.clone())),
        Arc::new(ReactivateSubscriptionTool::new(store.clone())),
        Arc::new(UpgradeSubscriptionTool::new(store.clone())),
        Arc::new(GetReservationsTool::new(store.clone())),
        Arc::new(CancelReservationTool::new(store.clone())),
        Arc::new(MakeReservationTool::new(store.clone())),
        Arc::new(GetExperienceTool::new(store.clone())),
        Arc::new(ListExperiencesTool::new(store)),
    ]
}

/// A required string argument
fn required_str<'a>(arguments: &'a Value, key: &str) -> Result<&'a str, ToolResult> {
    arguments
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| ToolResult::error(format!("Missing '{}' argument", key)))
}

/// The `{"error": ...}` document tools answer with when a business rule refuses
fn refusal(message: impl Into<String>) -> ToolResult {
    ToolResult::json(&json!({ "error": message.into() }))
}
