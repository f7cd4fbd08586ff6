//! Graph executor
//!
//! Runs nodes one at a time for a thread, merging each update into the state
//! and writing a checkpoint after every transition. A run ends at
//! [`NodeId::End`]; the only suspension point is the read-message node,
//! which blocks on the chat interface.

use std::sync::Arc;

use chrono::Utc;

use crate::{
    checkpoint::{Checkpoint, Checkpointer},
    context::{ExecutionContext, GraphConfig},
    error::{Error, Result},
    events::GraphEvent,
    nodes::{
        ChatOutputNode, EnrichmentNode, EscalationNode, LearningNode, MemorizationNode, Node,
        ReadMessageNode, SupervisorNode, ValidationNode,
    },
    registry::WorkerRegistry,
    route::NodeId,
    state::{ConversationState, TaskStatus},
};

/// The edge taken after `current` has run and its update was merged
pub fn next_node(current: NodeId, state: &ConversationState, config: &GraphConfig) -> Result<NodeId> {
    let next = match current {
        NodeId::Validation if state.task.status == TaskStatus::Failed => NodeId::ChatOutput,
        NodeId::Validation => NodeId::Enrichment,
        NodeId::Enrichment => NodeId::Supervisor,
        NodeId::Supervisor => state
            .route
            .map(NodeId::from)
            .ok_or(Error::MissingRoute(current))?,
        NodeId::Worker(_) | NodeId::ReadMessage => NodeId::Supervisor,
        NodeId::Memorization if config.learn_from_conversations => NodeId::Learning,
        NodeId::Memorization | NodeId::Learning => NodeId::ChatOutput,
        NodeId::ChatOutput if state.is_finished() => NodeId::End,
        NodeId::ChatOutput => NodeId::Supervisor,
        NodeId::End => NodeId::End,
    };
    Ok(next)
}

pub struct GraphExecutor {
    registry: WorkerRegistry,
    supervisor: SupervisorNode,
    checkpointer: Arc<dyn Checkpointer>,
}

impl GraphExecutor {
    pub fn new(registry: WorkerRegistry, checkpointer: Arc<dyn Checkpointer>) -> Self {
        let supervisor = SupervisorNode::new(registry.describe());
        Self {
            registry,
            supervisor,
            checkpointer,
        }
    }

    pub fn checkpointer(&self) -> &Arc<dyn Checkpointer> {
        &self.checkpointer
    }

    fn node(&self, id: NodeId) -> Option<&dyn Node> {
        let node: &dyn Node = match id {
            NodeId::Validation => &ValidationNode,
            NodeId::Enrichment => &EnrichmentNode,
            NodeId::Supervisor => &self.supervisor,
            NodeId::Worker(kind) => match self.registry.get(kind) {
                Some(entry) => entry.handler.as_ref(),
                None => {
                    tracing::warn!(worker = %kind, "worker not registered, escalating");
                    &EscalationNode
                }
            },
            NodeId::ReadMessage => &ReadMessageNode,
            NodeId::ChatOutput => &ChatOutputNode,
            NodeId::Memorization => &MemorizationNode,
            NodeId::Learning => &LearningNode,
            NodeId::End => return None,
        };
        Some(node)
    }

    /// Run a thread from its checkpoint cursor until the graph ends.
    ///
    /// Returns the final checkpoint, which has also been persisted.
    pub async fn run(&self, mut checkpoint: Checkpoint, ctx: &ExecutionContext) -> Result<Checkpoint> {
        let thread_id = checkpoint.thread_id.clone();
        ctx.emit(GraphEvent::ThreadStarted {
            thread_id: thread_id.clone(),
            node: checkpoint.next,
        });

        let limit = ctx.config.max_graph_steps;
        let mut steps = 0;
        while let Some(node) = self.node(checkpoint.next) {
            if steps >= limit {
                tracing::warn!(thread_id = %thread_id, limit, "graph step ceiling reached");
                return Err(Error::StepLimitExceeded { limit });
            }
            steps += 1;

            let current = checkpoint.next;
            tracing::debug!(thread_id = %thread_id, node = %current, "running node");
            ctx.emit(GraphEvent::NodeStarted {
                thread_id: thread_id.clone(),
                node: current,
            });

            let update = node.run(&checkpoint.state, ctx).await?;
            let stored_ticket = match current {
                NodeId::Memorization => update.ticket_id.clone().flatten(),
                _ => None,
            };
            checkpoint.state.apply(update);
            let next = next_node(current, &checkpoint.state, &ctx.config)?;

            if let (NodeId::Supervisor, Some(route)) = (current, checkpoint.state.route) {
                ctx.emit(GraphEvent::Routed {
                    thread_id: thread_id.clone(),
                    route,
                });
            }
            if let Some(ticket_id) = stored_ticket {
                ctx.emit(GraphEvent::TicketStored {
                    thread_id: thread_id.clone(),
                    ticket_id,
                });
            }

            checkpoint.next = next;
            checkpoint.step += 1;
            checkpoint.updated_at = Utc::now();
            self.checkpointer.put(checkpoint.clone()).await?;

            ctx.emit(GraphEvent::NodeFinished {
                thread_id: thread_id.clone(),
                node: current,
                next,
            });
        }

        tracing::debug!(thread_id = %thread_id, steps = checkpoint.step, "thread finished");
        ctx.emit(GraphEvent::ThreadFinished { thread_id });
        Ok(checkpoint)
    }
}
