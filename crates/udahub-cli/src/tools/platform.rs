//! UDA Hub's own user and account tools

use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use udahub_agent::{Tool, ToolAnnotations, ToolMetadata, ToolResult};
use udahub_graph::{AccountStore, PLATFORM_AUTHOR, UdaHubUser};

use super::{refusal, required_str};

fn user_json(user: &UdaHubUser) -> Value {
    json!({
        "user_id": user.user_id,
        "account_id": user.account_id,
        "external_user_id": user.external_user_id,
        "user_name": user.user_name,
        "created_at": user.created_at.to_rfc3339(),
    })
}

/// Look up a customer account registered with UDA Hub
pub struct GetAccountTool {
    store: Arc<dyn AccountStore>,
}

impl GetAccountTool {
    pub fn new(store: Arc<dyn AccountStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for GetAccountTool {
    fn name(&self) -> &str {
        "get_udahub_account"
    }

    fn description(&self) -> &str {
        "Get the details of a UDA Hub customer account by its account_id."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "account_id": { "type": "string", "description": "The account to look up" }
            },
            "required": ["account_id"]
        })
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::new(
            PLATFORM_AUTHOR,
            &["udahub", "account", "details", "validation"],
            ToolAnnotations::read_only(),
        )
    }

    async fn execute(&self, _id: &str, arguments: Value, _cancel: CancellationToken) -> ToolResult {
        let account_id = match required_str(&arguments, "account_id") {
            Ok(v) => v,
            Err(e) => return e,
        };
        match self.store.get_account(account_id).await {
            Ok(Some(account)) => ToolResult::json(&json!({
                "account_id": account.account_id,
                "account_name": account.account_name,
                "account_description": account.account_description,
            })),
            Ok(None) => refusal(format!("No account found for account_id {}", account_id)),
            Err(e) => ToolResult::error(format!("Failed to load account: {}", e)),
        }
    }
}

/// Register a customer's user with UDA Hub
pub struct CreateUserTool {
    store: Arc<dyn AccountStore>,
}

impl CreateUserTool {
    pub fn new(store: Arc<dyn AccountStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for CreateUserTool {
    fn name(&self) -> &str {
        "create_udahub_user"
    }

    fn description(&self) -> &str {
        "Create a UDA Hub user for a user of a customer account. Fails if the user is already registered."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "account_id": { "type": "string" },
                "external_user_id": { "type": "string", "description": "The user's id in the customer's system" },
                "user_name": { "type": "string", "description": "Full name from the customer's system" }
            },
            "required": ["account_id", "external_user_id", "user_name"]
        })
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::new(
            PLATFORM_AUTHOR,
            &["udahub", "user", "create", "validation"],
            ToolAnnotations::mutating(false, false),
        )
    }

    async fn execute(&self, _id: &str, arguments: Value, _cancel: CancellationToken) -> ToolResult {
        let (account_id, external_user_id, user_name) = match (
            required_str(&arguments, "account_id"),
            required_str(&arguments, "external_user_id"),
            required_str(&arguments, "user_name"),
        ) {
            (Ok(a), Ok(e), Ok(n)) => (a, e, n),
            (Err(e), _, _) | (_, Err(e), _) | (_, _, Err(e)) => return e,
        };

        match self
            .store
            .create_user(account_id, external_user_id, user_name)
            .await
        {
            Ok(user) => {
                tracing::info!(user_id = %user.user_id, account_id, "created UDA Hub user");
                ToolResult::json(&user_json(&user))
            }
            Err(e) if e.is_conflict() => refusal(
                "User with the given external_user_id and account_id already exists.",
            ),
            Err(e) => ToolResult::error(format!("Failed to create user: {}", e)),
        }
    }
}

/// Fetch a UDA Hub user by its own id
pub struct GetPlatformUserTool {
    store: Arc<dyn AccountStore>,
}

impl GetPlatformUserTool {
    pub fn new(store: Arc<dyn AccountStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for GetPlatformUserTool {
    fn name(&self) -> &str {
        "get_udahub_user"
    }

    fn description(&self) -> &str {
        "Get a UDA Hub user by its UDA Hub user_id."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "user_id": { "type": "string", "description": "The UDA Hub user_id" }
            },
            "required": ["user_id"]
        })
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::new(
            PLATFORM_AUTHOR,
            &["udahub", "user", "details", "validation"],
            ToolAnnotations::read_only(),
        )
    }

    async fn execute(&self, _id: &str, arguments: Value, _cancel: CancellationToken) -> ToolResult {
        let user_id = match required_str(&arguments, "user_id") {
            Ok(v) => v,
            Err(e) => return e,
        };
        match self.store.get_user_by_id(user_id).await {
            Ok(Some(user)) => ToolResult::json(&user_json(&user)),
            Ok(None) => refusal(format!("No UDA Hub user found for user_id {}", user_id)),
            Err(e) => ToolResult::error(format!("Failed to load user: {}", e)),
        }
    }
}

/// Find the UDA Hub user registered for a customer's user
pub struct FindUserTool {
    store: Arc<dyn AccountStore>,
}

impl FindUserTool {
    pub fn new(store: Arc<dyn AccountStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for FindUserTool {
    fn name(&self) -> &str {
        "find_udahub_user"
    }

    fn description(&self) -> &str {
        "Find the UDA Hub user matching an account_id and the user's id in the customer's system."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "account_id": { "type": "string" },
                "external_user_id": { "type": "string" }
            },
            "required": ["account_id", "external_user_id"]
        })
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::new(
            PLATFORM_AUTHOR,
            &["udahub", "user", "details", "validation"],
            ToolAnnotations::read_only(),
        )
    }

    async fn execute(&self, _id: &str, arguments: Value, _cancel: CancellationToken) -> ToolResult {
        let (account_id, external_user_id) = match (
            required_str(&arguments, "account_id"),
            required_str(&arguments, "external_user_id"),
        ) {
            (Ok(a), Ok(e)) => (a, e),
            (Err(e), _) | (_, Err(e)) => return e,
        };
        match self.store.get_user(account_id, external_user_id).await {
            Ok(Some(user)) => ToolResult::json(&user_json(&user)),
            Ok(None) => refusal(format!(
                "No UDA Hub user found for external_user_id {} of account {}",
                external_user_id, account_id
            )),
            Err(e) => ToolResult::error(format!("Failed to load user: {}", e)),
        }
    }
}
