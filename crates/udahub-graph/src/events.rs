//! Graph events for observers

use serde::{Deserialize, Serialize};

use crate::route::{NodeId, Route};

/// Events emitted while a thread runs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GraphEvent {
    /// A run started or resumed at `node`
    ThreadStarted { thread_id: String, node: NodeId },
    NodeStarted { thread_id: String, node: NodeId },
    /// A node's update was merged and checkpointed
    NodeFinished {
        thread_id: String,
        node: NodeId,
        next: NodeId,
    },
    /// The supervisor made a routing decision
    Routed { thread_id: String, route: Route },
    /// A ticket was created or updated
    TicketStored { thread_id: String, ticket_id: String },
    ThreadFinished { thread_id: String },
}
