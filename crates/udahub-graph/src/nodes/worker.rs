//! Domain workers: FAQ, subscription, reservation and browsing
//!
//! A worker answers with read-only tools of its domain. Mutating tools are
//! never called by the model directly: the worker proposes them as a
//! [`PendingAction`], the user is asked to confirm, and the next turn of the
//! same worker executes the action only after the confirmation check passes.

use async_trait::async_trait;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use udahub_agent::{BoxedTool, ResponseSchema, SubAgentRequest, ToolFilter, run_typed, validate_tool_args};

use super::Node;
use crate::{
    context::{ExecutionContext, KNOWLEDGE_AUTHOR, PLATFORM_AUTHOR},
    error::Result,
    prompts,
    route::WorkerKind,
    state::{ChatMessage, ConversationState, PendingAction, StateUpdate, TaskContext},
};

#[derive(Debug, Deserialize)]
struct ProposedAction {
    tool: String,
    #[serde(default)]
    arguments: serde_json::Value,
    summary: String,
}

#[derive(Debug, Deserialize)]
struct WorkerReply {
    ai_response: String,
    user_follow_up_needed: bool,
    request_handoff: bool,
    task_complete: bool,
    #[serde(default)]
    proposed_action: Option<ProposedAction>,
}

#[derive(Debug, Deserialize)]
struct Confirmation {
    confirmed: bool,
}

/// A specialist scoped to one tool tag
pub struct DomainWorker {
    kind: WorkerKind,
    instructions: &'static str,
    tag: &'static str,
}

impl DomainWorker {
    pub fn new(kind: WorkerKind, instructions: &'static str, tag: &'static str) -> Self {
        Self {
            kind,
            instructions,
            tag,
        }
    }

    pub fn faq() -> Self {
        Self::new(WorkerKind::Faq, prompts::FAQ_INSTRUCTIONS, "knowledge")
    }

    pub fn subscription() -> Self {
        Self::new(WorkerKind::Subscription, prompts::SUBSCRIPTION_INSTRUCTIONS, "subscription")
    }

    pub fn reservation() -> Self {
        Self::new(WorkerKind::Reservation, prompts::RESERVATION_INSTRUCTIONS, "reservation")
    }

    pub fn browsing() -> Self {
        Self::new(WorkerKind::Browsing, prompts::BROWSING_INSTRUCTIONS, "browsing")
    }

    pub fn kind(&self) -> WorkerKind {
        self.kind
    }

    /// Read-only tools of this domain from the platform, the account and the knowledge base
    fn read_tools(&self, ctx: &ExecutionContext, account_id: &str) -> ToolFilter {
        [PLATFORM_AUTHOR, account_id, KNOWLEDGE_AUTHOR]
            .iter()
            .map(|author| {
                ctx.tools
                    .by_author(author)
                    .by_tags(&[self.tag])
                    .by_read_only(true)
            })
            .fold(ToolFilter::default(), |acc, f| acc.merge(&f))
    }

    /// Mutating tools the account offers for this domain
    fn action_tools(&self, ctx: &ExecutionContext, account_id: &str) -> ToolFilter {
        ctx.tools
            .by_author(account_id)
            .by_tags(&[self.tag])
            .by_read_only(false)
    }

    /// Settle a pending action. Returns the system notes describing the outcome.
    async fn settle(
        &self,
        action: &PendingAction,
        actions: &ToolFilter,
        state: &ConversationState,
        ctx: &ExecutionContext,
    ) -> Result<Vec<ChatMessage>> {
        let from = state.messages.len().saturating_sub(2);
        let request = SubAgentRequest::new(
            "confirmation",
            prompts::confirmation_system(&action.summary),
            ResponseSchema::new("confirmation", prompts::confirmation_schema())?,
            ctx.config.step_limits.confirmation,
        )
        .with_messages(state.llm_messages(from));

        let confirmed = match run_typed::<Confirmation>(ctx.sub_agent.as_ref(), request).await {
            Ok(answer) => answer.confirmed,
            Err(e) => {
                tracing::warn!("Confirmation check failed, treating as declined: {}", e);
                false
            }
        };
        if !confirmed {
            tracing::debug!(tool = %action.tool, "pending action declined");
            return Ok(vec![ChatMessage::system(prompts::action_declined(&action.summary))]);
        }

        let Some(tool) = actions.by_name(&action.tool).get_first() else {
            return Ok(vec![ChatMessage::system(prompts::action_failed(
                &action.tool,
                "the action is no longer available",
            ))]);
        };
        if let Some(error) = validate_tool_args(&action.arguments, &tool.parameters_schema()) {
            return Ok(vec![ChatMessage::system(prompts::action_failed(&action.tool, &error))]);
        }

        let call_id = uuid::Uuid::new_v4().to_string();
        tracing::info!(tool = %action.tool, call_id = %call_id, "executing confirmed action");
        let result = tool
            .execute(&call_id, action.arguments.clone(), CancellationToken::new())
            .await;
        let note = if result.is_error {
            prompts::action_failed(&action.tool, &result.text_content())
        } else {
            prompts::action_executed(&action.tool, &result.text_content())
        };
        Ok(vec![ChatMessage::system(note)])
    }

    /// Check a proposal against the offered actions and their schemas
    fn check_proposal(&self, proposal: &ProposedAction, actions: &[BoxedTool]) -> std::result::Result<(), String> {
        let tool = actions
            .iter()
            .find(|t| t.name() == proposal.tool)
            .ok_or_else(|| "the action is not available to this agent".to_string())?;
        match validate_tool_args(&proposal.arguments, &tool.parameters_schema()) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Node for DomainWorker {
    fn name(&self) -> &str {
        self.kind.name()
    }

    async fn run(&self, state: &ConversationState, ctx: &ExecutionContext) -> Result<StateUpdate> {
        let account_id = state.user.account_id.as_str();
        let reads = self.read_tools(ctx, account_id);
        let actions = self.action_tools(ctx, account_id);

        let mut update = StateUpdate::new();
        let mut notes = Vec::new();
        if let Some(action) = state.pending_action.as_ref().filter(|a| a.worker == self.kind) {
            notes = self.settle(action, &actions, state, ctx).await?;
            update = update.pending_action(None);
        }

        let offered = actions.get_all();
        let mut messages = state.llm_messages(0);
        messages.extend(notes.iter().map(ChatMessage::to_llm_message));
        let request = SubAgentRequest::new(
            self.kind.name(),
            prompts::worker_system(self.instructions, &state.user, &offered),
            ResponseSchema::new("worker_reply", prompts::worker_schema())?,
            ctx.config.step_limits.worker,
        )
        .with_tools(reads.get_all())
        .with_messages(messages);

        let reply: WorkerReply = match run_typed(ctx.sub_agent.as_ref(), request).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!("Worker '{}' failed: {}", self.kind, e);
                return Ok(update
                    .messages(notes)
                    .message(ChatMessage::assistant(prompts::WORKER_APOLOGY))
                    .handoff_requested(true)
                    .has_pending_messages(true)
                    .need_user_input(false));
            }
        };

        let mut update = update
            .messages(notes)
            .has_pending_messages(true)
            .handoff_requested(reply.request_handoff);
        if !reply.ai_response.trim().is_empty() {
            update = update.message(ChatMessage::assistant(reply.ai_response));
        }

        if let Some(proposal) = reply.proposed_action {
            return Ok(match self.check_proposal(&proposal, &offered) {
                Ok(()) => {
                    tracing::debug!(tool = %proposal.tool, "action proposed, awaiting confirmation");
                    update
                        .message(ChatMessage::assistant(prompts::confirm_action(&proposal.summary)))
                        .pending_action(Some(PendingAction {
                            worker: self.kind,
                            tool: proposal.tool,
                            arguments: proposal.arguments,
                            summary: proposal.summary,
                        }))
                        .need_user_input(true)
                }
                Err(reason) => {
                    tracing::debug!(tool = %proposal.tool, reason = %reason, "proposal rejected");
                    update
                        .message(ChatMessage::system(prompts::action_rejected(&proposal.tool, &reason)))
                        .need_user_input(true)
                }
            });
        }

        // An unfinished task always waits for the user, follow-up flag or not
        update = update.need_user_input(!reply.task_complete && !reply.request_handoff);
        if reply.task_complete && !reply.request_handoff {
            update = update.terminate_chat(true).task(TaskContext::completed());
        }
        Ok(update)
    }
}
