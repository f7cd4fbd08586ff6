//! Routing between the chat boundaries and the workers

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use udahub_agent::{ResponseSchema, SubAgentRequest, run_typed};

use super::Node;
use crate::{
    context::ExecutionContext,
    error::Result,
    prompts,
    route::{Route, WorkerKind},
    state::{ConversationState, Priority, Role, StateUpdate},
};

#[derive(Debug, Deserialize)]
struct Classification {
    worker: String,
    #[serde(default)]
    priority: Priority,
}

/// Decide the next route from the state alone, without the model.
///
/// Returns `None` when the latest user message has to be classified.
pub fn decide(state: &ConversationState) -> Option<Route> {
    if state.has_pending_messages {
        return Some(Route::ToOutputBoundary);
    }
    if state.terminate_chat || state.task.status.is_terminal() {
        return Some(Route::ToFinish);
    }
    if state.need_user_input {
        return Some(Route::ToInputBoundary);
    }
    if let Some(action) = &state.pending_action {
        return Some(Route::ToWorker(action.worker));
    }
    if state.handoff_requested {
        return Some(Route::ToWorker(WorkerKind::EscalateToHuman));
    }
    if !awaits_reply(state) {
        return Some(Route::ToInputBoundary);
    }
    None
}

/// Whether the newest non-system message is an unanswered user turn
fn awaits_reply(state: &ConversationState) -> bool {
    state
        .messages
        .iter()
        .rev()
        .find(|m| m.role != Role::System)
        .is_some_and(|m| m.role == Role::User)
}

/// Picks the next node; classifies new user requests with a sub-agent
pub struct SupervisorNode {
    /// "- name: description" lines of the registered workers
    workers: Arc<str>,
}

impl SupervisorNode {
    pub fn new(workers: impl Into<Arc<str>>) -> Self {
        Self {
            workers: workers.into(),
        }
    }

    async fn classify(
        &self,
        state: &ConversationState,
        ctx: &ExecutionContext,
    ) -> Result<(WorkerKind, Priority)> {
        let request = SubAgentRequest::new(
            "supervisor",
            prompts::supervisor_system(&self.workers),
            ResponseSchema::new("worker_selection", prompts::supervisor_schema())?,
            ctx.config.step_limits.classification,
        )
        .with_messages(state.llm_messages(0));

        let answer: Classification = match run_typed(ctx.sub_agent.as_ref(), request).await {
            Ok(answer) => answer,
            Err(e) => {
                tracing::warn!("Classification failed, escalating: {}", e);
                return Ok((WorkerKind::EscalateToHuman, state.priority));
            }
        };

        if answer.priority == Priority::Critical {
            return Ok((WorkerKind::EscalateToHuman, answer.priority));
        }
        match WorkerKind::parse(&answer.worker) {
            Some(kind) => Ok((kind, answer.priority)),
            None => {
                tracing::warn!(worker = %answer.worker, "unknown worker selected, escalating");
                Ok((WorkerKind::EscalateToHuman, answer.priority))
            }
        }
    }
}

#[async_trait]
impl Node for SupervisorNode {
    fn name(&self) -> &str {
        "supervisor"
    }

    async fn run(&self, state: &ConversationState, ctx: &ExecutionContext) -> Result<StateUpdate> {
        if let Some(route) = decide(state) {
            let mut update = StateUpdate::new().route(route);
            if let Route::ToWorker(kind) = route {
                update = update.worker(kind);
            }
            return Ok(update);
        }

        let (kind, priority) = self.classify(state, ctx).await?;
        tracing::debug!(worker = %kind, ?priority, "request classified");
        Ok(StateUpdate::new()
            .route(Route::ToWorker(kind))
            .worker(kind)
            .priority(priority))
    }
}
