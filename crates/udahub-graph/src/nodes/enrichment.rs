//! Greets the user and restores ticket history

use async_trait::async_trait;

use super::Node;
use crate::{
    context::ExecutionContext,
    error::{Result, StorageError},
    prompts,
    state::{ChatMessage, ConversationState, StateUpdate},
    storage::TicketMessage,
};

pub struct EnrichmentNode;

fn restore(message: TicketMessage) -> ChatMessage {
    ChatMessage {
        role: message.role,
        content: message.content,
        timestamp: message.created_at.timestamp_millis(),
    }
}

fn greeting(state: &ConversationState) -> Vec<ChatMessage> {
    let user = &state.user;
    let mut messages = Vec::new();
    if let Some(name) = user.full_name.as_deref() {
        let account = user.account_name.as_deref().unwrap_or(&user.account_id);
        messages.push(ChatMessage::assistant(prompts::welcome(name, account)));
    }
    if let (true, Some(id)) = (user.udahub_user_created, user.udahub_user_id.as_deref()) {
        messages.push(ChatMessage::assistant(prompts::first_contact(id)));
    }
    messages
}

#[async_trait]
impl Node for EnrichmentNode {
    fn name(&self) -> &str {
        "enrichment"
    }

    async fn run(&self, state: &ConversationState, ctx: &ExecutionContext) -> Result<StateUpdate> {
        if state.is_enriched {
            return Ok(StateUpdate::new());
        }

        let update = StateUpdate::new()
            .enriched()
            .need_user_input(true)
            .has_pending_messages(true);

        let Some(ticket_id) = state.ticket_id.as_deref() else {
            return Ok(update.messages(greeting(state)));
        };

        match ctx.tickets.get_messages(ticket_id).await {
            Ok(history) => {
                let restored: Vec<ChatMessage> = history
                    .into_iter()
                    .filter(|m| !m.content.is_empty())
                    .map(restore)
                    .collect();
                tracing::debug!(ticket_id, count = restored.len(), "restored ticket history");
                let loaded = state.messages.len() + restored.len();
                let welcome = prompts::welcome_back(state.user.full_name.as_deref(), ticket_id);
                Ok(update
                    .loaded_messages_count(loaded)
                    .messages(restored)
                    .message(ChatMessage::assistant(welcome)))
            }
            Err(StorageError::NotFound(_)) => {
                tracing::debug!(ticket_id, "ticket not found, starting a new conversation");
                Ok(update
                    .ticket_id(None)
                    .message(ChatMessage::assistant(prompts::ticket_not_found(ticket_id)))
                    .messages(greeting(state)))
            }
            Err(e) => {
                // The ticket is kept; this session's messages are appended to it later
                tracing::warn!(ticket_id, "Failed to load ticket history: {}", e);
                Ok(update
                    .loaded_messages_count(state.messages.len())
                    .message(ChatMessage::assistant(prompts::history_unavailable(ticket_id)))
                    .messages(greeting(state)))
            }
        }
    }
}
