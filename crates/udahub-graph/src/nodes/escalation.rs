//! Handoff to a human agent

use async_trait::async_trait;

use super::Node;
use crate::{
    context::ExecutionContext,
    error::Result,
    prompts,
    state::{ChatMessage, ConversationState, StateUpdate},
};

/// Hands the conversation to a human and ends the turn loop
pub struct EscalationNode;

#[async_trait]
impl Node for EscalationNode {
    fn name(&self) -> &str {
        "escalate_to_human"
    }

    async fn run(&self, state: &ConversationState, _ctx: &ExecutionContext) -> Result<StateUpdate> {
        tracing::info!(
            account_id = %state.user.account_id,
            ticket_id = ?state.ticket_id,
            priority = ?state.priority,
            "escalating to a human agent"
        );
        Ok(StateUpdate::new()
            .message(ChatMessage::assistant(prompts::HANDOFF))
            .terminate_chat(true)
            .escalated(true)
            .has_pending_messages(true)
            .handoff_requested(false)
            .need_user_input(false)
            .pending_action(None))
    }
}
