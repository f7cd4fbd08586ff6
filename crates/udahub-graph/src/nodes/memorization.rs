//! Persists the conversation as a ticket

use async_trait::async_trait;
use serde::Deserialize;
use udahub_agent::{ResponseSchema, SubAgentRequest, run_typed};
use udahub_ai::Message;

use super::Node;
use crate::{
    context::ExecutionContext,
    error::{Result, StorageError},
    prompts,
    state::{ChatMessage, ConversationState, Role, StateUpdate, TaskContext, TaskStatus, transcript},
    storage::{NewTicket, TicketMessage, TicketStatus},
};

const MAX_SUMMARY_CHARS: usize = 150;
const MAX_TAGS: usize = 5;

#[derive(Debug, Deserialize)]
struct Summary {
    summary: String,
    #[serde(default)]
    tags: Vec<String>,
}

fn truncate(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

fn ticket_status(state: &ConversationState) -> TicketStatus {
    if state.escalated {
        TicketStatus::Escalated
    } else if state.task.status == TaskStatus::Completed {
        TicketStatus::Resolved
    } else {
        TicketStatus::Open
    }
}

pub struct MemorizationNode;

impl MemorizationNode {
    /// Summary and tags for a new ticket, falling back to the first user message
    async fn summarize(&self, messages: &[ChatMessage], ctx: &ExecutionContext) -> Result<Summary> {
        let request = SubAgentRequest::new(
            "summary",
            prompts::SUMMARY_SYSTEM,
            ResponseSchema::new("ticket_summary", prompts::summary_schema())?,
            ctx.config.step_limits.summary,
        )
        .with_messages(vec![Message::user(transcript(messages))]);

        let summary = match run_typed::<Summary>(ctx.sub_agent.as_ref(), request).await {
            Ok(summary) => summary,
            Err(e) => {
                tracing::warn!("Summarization failed, using the first user message: {}", e);
                let first = messages
                    .iter()
                    .find(|m| m.role == Role::User)
                    .map(|m| m.content.as_str())
                    .unwrap_or("Support conversation");
                Summary {
                    summary: first.to_string(),
                    tags: Vec::new(),
                }
            }
        };
        Ok(Summary {
            summary: truncate(summary.summary.trim(), MAX_SUMMARY_CHARS),
            tags: summary.tags.into_iter().take(MAX_TAGS).collect(),
        })
    }
}

/// Ends the thread with a notice; the unsaved messages stay past `loaded_messages_count`
fn not_stored(ticket_id: Option<String>, error: &StorageError) -> StateUpdate {
    tracing::warn!(ticket_id = ?ticket_id, "Failed to store conversation: {}", error);
    let mut update = StateUpdate::new()
        .memorized()
        .task(TaskContext::failed(format!("Conversation not stored: {}", error)))
        .message(ChatMessage::assistant(prompts::NOT_STORED))
        .has_pending_messages(true);
    if ticket_id.is_some() {
        update = update.ticket_id(ticket_id);
    }
    update
}

#[async_trait]
impl Node for MemorizationNode {
    fn name(&self) -> &str {
        "memorization"
    }

    async fn run(&self, state: &ConversationState, ctx: &ExecutionContext) -> Result<StateUpdate> {
        if state.is_memorized {
            return Ok(StateUpdate::new());
        }

        let loaded = state.loaded_messages_count.min(state.messages.len());
        let new = &state.messages[loaded..];
        if state.ticket_id.is_none() && new.is_empty() {
            return Ok(StateUpdate::new().memorized());
        }

        let records: Vec<TicketMessage> = new
            .iter()
            .map(|m| TicketMessage::new(m.role, m.content.clone()))
            .collect();
        let status = ticket_status(state);

        let (ticket_id, created) = match state.ticket_id.clone() {
            Some(ticket_id) => (ticket_id, false),
            None => {
                let summary = self.summarize(new, ctx).await?;
                let user_id = state
                    .user
                    .udahub_user_id
                    .clone()
                    .unwrap_or_else(|| state.user.external_user_id.clone());
                let ticket = NewTicket {
                    account_id: state.user.account_id.clone(),
                    user_id,
                    channel: "chat".to_string(),
                    summary: summary.summary,
                    status,
                    tags: summary.tags,
                };
                match ctx.tickets.create_ticket(ticket).await {
                    Ok(ticket_id) => (ticket_id, true),
                    Err(e) => return Ok(not_stored(None, &e)),
                }
            }
        };

        // Failures from here on still record the ticket, so a retry appends to it
        if !records.is_empty() {
            if let Err(e) = ctx.tickets.append_messages(&ticket_id, &records).await {
                return Ok(not_stored(Some(ticket_id), &e));
            }
        }
        if !created {
            if let Err(e) = ctx.tickets.set_status(&ticket_id, status).await {
                return Ok(not_stored(Some(ticket_id), &e));
            }
        }

        tracing::info!(ticket_id = %ticket_id, stored = records.len(), ?status, "conversation memorized");
        Ok(StateUpdate::new()
            .ticket_id(Some(ticket_id.clone()))
            .memorized()
            // The continuation notice itself is not persisted
            .loaded_messages_count(state.messages.len() + 1)
            .message(ChatMessage::assistant(prompts::continuation_notice(&ticket_id)))
            .has_pending_messages(true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::ListChat;
    use crate::state::TaskContext;
    use crate::storage::TicketStore;
    use crate::testing::{BrokenStore, Reply, ScriptedSubAgent, broken_context, context, store};
    use std::sync::Arc;

    fn five_messages() -> ConversationState {
        let mut state = ConversationState::new("cultpass", "f556c0");
        state.user.udahub_user_id = Some("u-1".into());
        state.messages = vec![
            ChatMessage::user("old question"),
            ChatMessage::assistant("old answer"),
            ChatMessage::assistant("Welcome back!"),
            ChatMessage::user("Is the museum open on Mondays?"),
            ChatMessage::assistant("No, it is closed on Mondays."),
        ];
        state.terminate_chat = true;
        state
    }

    #[tokio::test]
    async fn test_only_new_messages_are_summarized_and_stored() {
        let store = store();
        let agent = ScriptedSubAgent::new();
        agent.answer("summary", serde_json::json!({"summary": "Museum opening hours", "tags": ["museum", "hours"]}));
        let ctx = context(store.clone(), agent.clone(), Arc::new(ListChat::default()), vec![]);
        let mut state = five_messages();
        state.loaded_messages_count = 3;

        state.apply(MemorizationNode.run(&state, &ctx).await.unwrap());

        let transcript = agent.seen("summary")[0].messages[0].text();
        assert!(transcript.contains("Mondays"));
        assert!(!transcript.contains("old question"));

        let ticket_id = state.ticket_id.clone().unwrap();
        let tickets = store.tickets();
        assert_eq!(tickets.len(), 1);
        assert_eq!(tickets[0].summary, "Museum opening hours");
        assert_eq!(tickets[0].status, TicketStatus::Open);
        assert_eq!(store.get_messages(&ticket_id).await.unwrap().len(), 2);
        assert!(state.is_memorized);
        assert_eq!(state.loaded_messages_count, state.messages.len());
        assert!(state.messages.last().unwrap().content.contains(&ticket_id));
    }

    #[tokio::test]
    async fn test_summary_fallback_truncates_first_user_message() {
        let store = store();
        let agent = ScriptedSubAgent::new();
        agent.push("summary", Reply::Failure("offline".into()));
        let ctx = context(store.clone(), agent, Arc::new(ListChat::default()), vec![]);
        let mut state = ConversationState::new("cultpass", "f556c0");
        state.messages = vec![ChatMessage::user("x".repeat(400))];
        state.task = TaskContext::completed();

        state.apply(MemorizationNode.run(&state, &ctx).await.unwrap());

        let ticket = &store.tickets()[0];
        assert_eq!(ticket.summary.chars().count(), 150);
        assert!(ticket.tags.is_empty());
        assert_eq!(ticket.status, TicketStatus::Resolved);
        assert_eq!(ticket.user_id, "f556c0");
    }

    #[tokio::test]
    async fn test_existing_ticket_is_appended_and_status_updated() {
        let store = store();
        let ctx = context(store.clone(), ScriptedSubAgent::new(), Arc::new(ListChat::default()), vec![]);
        let ticket_id = store
            .create_ticket(NewTicket {
                account_id: "cultpass".into(),
                user_id: "u-1".into(),
                channel: "chat".into(),
                summary: "Old".into(),
                status: TicketStatus::Open,
                tags: vec![],
            })
            .await
            .unwrap();
        let mut state = five_messages().with_ticket(Some(ticket_id.clone()));
        state.loaded_messages_count = 4;
        state.escalated = true;

        state.apply(MemorizationNode.run(&state, &ctx).await.unwrap());

        assert_eq!(store.get_messages(&ticket_id).await.unwrap().len(), 1);
        assert_eq!(store.get_ticket(&ticket_id).await.unwrap().unwrap().status, TicketStatus::Escalated);
        assert_eq!(state.ticket_id, Some(ticket_id));
    }

    #[tokio::test]
    async fn test_failed_ticket_creation_is_reported_in_state() {
        let tickets = BrokenStore::new(store(), &["create_ticket"]);
        let agent = ScriptedSubAgent::new();
        agent.answer("summary", serde_json::json!({"summary": "Museum opening hours", "tags": []}));
        let ctx = broken_context(tickets.clone(), agent, vec![]);
        let mut state = five_messages();

        state.apply(MemorizationNode.run(&state, &ctx).await.unwrap());

        assert!(state.ticket_id.is_none());
        assert!(state.is_memorized);
        assert!(state.is_finished());
        assert_eq!(state.task.status, TaskStatus::Failed);
        assert!(state.task.error.as_deref().unwrap().contains("create_ticket unavailable"));
        assert_eq!(state.messages.last().unwrap().content, prompts::NOT_STORED);
        assert!(state.has_pending_messages);
        assert!(tickets.inner.tickets().is_empty());
    }

    #[tokio::test]
    async fn test_failed_append_keeps_the_created_ticket() {
        let tickets = BrokenStore::new(store(), &["append_messages"]);
        let agent = ScriptedSubAgent::new();
        agent.answer("summary", serde_json::json!({"summary": "Museum opening hours", "tags": []}));
        let ctx = broken_context(tickets.clone(), agent.clone(), vec![]);
        let mut state = five_messages();

        state.apply(MemorizationNode.run(&state, &ctx).await.unwrap());

        let ticket_id = state.ticket_id.clone().unwrap();
        assert_eq!(state.task.status, TaskStatus::Failed);
        assert_eq!(state.loaded_messages_count, 0);

        tickets.repair();
        state.prepare_restart();
        state.terminate_chat = true;
        state.apply(MemorizationNode.run(&state, &ctx).await.unwrap());

        assert_eq!(tickets.inner.tickets().len(), 1);
        assert_eq!(state.ticket_id, Some(ticket_id.clone()));
        assert_eq!(agent.seen("summary").len(), 1);
        // The notice of the failed attempt is stored with the rest
        assert_eq!(tickets.inner.get_messages(&ticket_id).await.unwrap().len(), 6);
        assert!(state.messages.last().unwrap().content.contains(&ticket_id));
    }

    #[tokio::test]
    async fn test_empty_conversation_is_not_stored() {
        let store = store();
        let ctx = context(store.clone(), ScriptedSubAgent::new(), Arc::new(ListChat::default()), vec![]);
        let mut state = ConversationState::new("cultpass", "f556c0");

        state.apply(MemorizationNode.run(&state, &ctx).await.unwrap());

        assert!(state.is_memorized);
        assert!(store.tickets().is_empty());
        assert!(state.messages.is_empty());
    }
}
