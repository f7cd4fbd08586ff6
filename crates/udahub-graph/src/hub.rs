//! Entry point for starting and resuming chats

use std::sync::Arc;

use crate::{
    checkpoint::{Checkpoint, Checkpointer},
    context::ExecutionContext,
    error::Result,
    executor::GraphExecutor,
    registry::WorkerRegistry,
    route::NodeId,
    state::ConversationState,
};

/// Result of a finished chat run
#[derive(Debug, Clone)]
pub struct ChatOutcome {
    pub thread_id: String,
    /// Ticket the conversation was stored under, if any
    pub ticket_id: Option<String>,
    pub state: ConversationState,
}

pub struct UdaHub {
    context: ExecutionContext,
    executor: GraphExecutor,
}

impl UdaHub {
    pub fn new(context: ExecutionContext, checkpointer: Arc<dyn Checkpointer>) -> Self {
        Self::with_registry(context, checkpointer, WorkerRegistry::standard())
    }

    pub fn with_registry(
        context: ExecutionContext,
        checkpointer: Arc<dyn Checkpointer>,
        registry: WorkerRegistry,
    ) -> Self {
        Self {
            context,
            executor: GraphExecutor::new(registry, checkpointer),
        }
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    /// Run a chat on a thread until it ends.
    ///
    /// A new thread starts at validation, optionally continuing `ticket_id`.
    /// A thread whose last run ended is reopened with its history; one that
    /// was interrupted resumes at its saved cursor. A `ticket_id` passed for
    /// an existing thread is ignored.
    pub async fn start_chat(
        &self,
        account_id: &str,
        external_user_id: &str,
        ticket_id: Option<&str>,
        thread_id: Option<&str>,
    ) -> Result<ChatOutcome> {
        let thread_id = thread_id
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let checkpointer = self.executor.checkpointer();

        let checkpoint = match checkpointer.get(&thread_id).await? {
            None => {
                tracing::info!(thread_id = %thread_id, account_id, external_user_id, "starting new thread");
                let state = ConversationState::new(account_id, external_user_id)
                    .with_ticket(ticket_id.map(str::to_string));
                let checkpoint = Checkpoint::new(&thread_id, state, NodeId::Validation);
                checkpointer.put(checkpoint.clone()).await?;
                checkpoint
            }
            Some(mut checkpoint) if checkpoint.next == NodeId::End => {
                tracing::info!(thread_id = %thread_id, "reopening finished thread");
                checkpoint.state.prepare_restart();
                checkpoint.next = NodeId::Validation;
                checkpoint
            }
            Some(checkpoint) => {
                tracing::info!(thread_id = %thread_id, node = %checkpoint.next, "resuming thread");
                checkpoint
            }
        };

        let finished = self.executor.run(checkpoint, &self.context).await?;
        Ok(ChatOutcome {
            thread_id,
            ticket_id: finished.state.ticket_id.clone(),
            state: finished.state,
        })
    }
}
