//! Account and identity validation

use async_trait::async_trait;
use serde::Deserialize;
use udahub_agent::{ResponseSchema, SubAgentRequest, run_typed};
use udahub_ai::Message;

use super::Node;
use crate::{
    context::{ExecutionContext, PLATFORM_AUTHOR},
    error::Result,
    prompts,
    state::{ChatMessage, ConversationState, StateUpdate, TaskContext, UserContext},
};

#[derive(Debug, Deserialize)]
struct ValidationOutcome {
    #[serde(default)]
    udahub_user_id: Option<String>,
    #[serde(default)]
    full_name: Option<String>,
    #[serde(default)]
    udahub_user_created: bool,
    #[serde(default)]
    validation_successful: bool,
    #[serde(default)]
    error_message: Option<String>,
}

fn failure(message: String, error: impl Into<String>) -> StateUpdate {
    StateUpdate::new()
        .message(ChatMessage::assistant(message))
        .task(TaskContext::failed(error))
        .terminate_chat(true)
        .has_pending_messages(true)
}

/// Checks the account, then lets an identity sub-agent find or create the user
pub struct ValidationNode;

#[async_trait]
impl Node for ValidationNode {
    fn name(&self) -> &str {
        "validation"
    }

    async fn run(&self, state: &ConversationState, ctx: &ExecutionContext) -> Result<StateUpdate> {
        if state.is_validated {
            return Ok(StateUpdate::new());
        }

        let account_id = state.user.account_id.as_str();
        let external_user_id = state.user.external_user_id.as_str();

        let account = match ctx.accounts.get_account(account_id).await {
            Ok(Some(account)) => account,
            Ok(None) => {
                tracing::debug!(account_id, "unknown account");
                return Ok(failure(prompts::INVALID_ACCOUNT.to_string(), "Invalid account ID"));
            }
            Err(e) => {
                tracing::warn!("Account lookup failed for '{}': {}", account_id, e);
                return Ok(failure(prompts::validation_failed(account_id), e.to_string()));
            }
        };

        let tools = ctx
            .tools
            .by_author(PLATFORM_AUTHOR)
            .by_tags(&["validation"])
            .merge(
                &ctx.tools
                    .by_author(account_id)
                    .by_read_only(true)
                    .by_tags(&["validation"]),
            );

        let request = SubAgentRequest::new(
            "validation",
            prompts::validation_system(account_id, external_user_id),
            ResponseSchema::new("user_validation", prompts::validation_schema())?,
            ctx.config.step_limits.validation,
        )
        .with_tools(tools.get_all())
        .with_messages(vec![Message::user(format!(
            "Validate the user '{}' of account '{}'.",
            external_user_id, account_id
        ))]);

        let contact = account.account_name.clone();
        let outcome: ValidationOutcome = match run_typed(ctx.sub_agent.as_ref(), request).await {
            Ok(outcome) => outcome,
            Err(e) if e.is_step_limit() => {
                tracing::warn!(account_id, external_user_id, "identity validation ran out of steps");
                return Ok(failure(prompts::validation_failed(&contact), prompts::INTERNAL_ERROR));
            }
            Err(e) => {
                tracing::warn!("Identity validation failed: {}", e);
                return Ok(failure(prompts::validation_failed(&contact), e.to_string()));
            }
        };

        if !outcome.validation_successful {
            let error = outcome
                .error_message
                .unwrap_or_else(|| "User could not be validated".to_string());
            tracing::debug!(account_id, external_user_id, error = %error, "user rejected");
            return Ok(failure(prompts::validation_failed(&contact), error));
        }

        // The platform record is the source of truth for the user ID
        let record = match ctx.accounts.get_user(account_id, external_user_id).await {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(account_id, external_user_id, "Platform user lookup failed: {}", e);
                return Ok(failure(prompts::validation_failed(&contact), e.to_string()));
            }
        };
        let udahub_user_id = outcome
            .udahub_user_id
            .filter(|id| !id.trim().is_empty())
            .or_else(|| record.as_ref().map(|u| u.user_id.clone()));
        let Some(udahub_user_id) = udahub_user_id else {
            tracing::warn!(account_id, external_user_id, "validation succeeded without a platform user");
            return Ok(failure(prompts::validation_failed(&contact), "No UDA Hub user available"));
        };
        let full_name = outcome
            .full_name
            .filter(|n| !n.trim().is_empty())
            .or_else(|| record.map(|u| u.user_name));

        tracing::debug!(account_id, external_user_id, udahub_user_id = %udahub_user_id, "user validated");
        Ok(StateUpdate::new()
            .validated()
            .task(TaskContext::default())
            .user(UserContext {
                account_id: account_id.to_string(),
                external_user_id: external_user_id.to_string(),
                udahub_user_id: Some(udahub_user_id),
                full_name,
                account_name: Some(account.account_name),
                account_description: account.account_description,
                udahub_user_created: outcome.udahub_user_created,
            }))
    }
}
