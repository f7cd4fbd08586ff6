//! Graph nodes and routing decisions

use std::fmt;

use serde::{Deserialize, Serialize};

/// The specialist a conversation can be handed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerKind {
    Faq,
    Subscription,
    Reservation,
    Browsing,
    EscalateToHuman,
}

impl WorkerKind {
    pub const ALL: [WorkerKind; 5] = [
        WorkerKind::Faq,
        WorkerKind::Subscription,
        WorkerKind::Reservation,
        WorkerKind::Browsing,
        WorkerKind::EscalateToHuman,
    ];

    /// Name used in prompts and structured answers
    pub fn name(&self) -> &'static str {
        match self {
            WorkerKind::Faq => "faq",
            WorkerKind::Subscription => "subscription",
            WorkerKind::Reservation => "reservation",
            WorkerKind::Browsing => "browsing",
            WorkerKind::EscalateToHuman => "escalate_to_human",
        }
    }

    /// Parse a worker name, ignoring case and surrounding whitespace
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim().to_lowercase();
        Self::ALL.into_iter().find(|k| k.name() == name)
    }
}

impl fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What the supervisor decided should happen next
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    /// Hand the conversation to a worker
    ToWorker(WorkerKind),
    /// Wait for the next user message
    ToInputBoundary,
    /// Deliver undelivered assistant messages
    ToOutputBoundary,
    /// Stop the turn loop and memorize the conversation
    ToFinish,
}

/// A position in the conversation graph, used as the checkpoint cursor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeId {
    Validation,
    Enrichment,
    Supervisor,
    Worker(WorkerKind),
    ReadMessage,
    ChatOutput,
    Memorization,
    Learning,
    End,
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeId::Validation => f.write_str("validation"),
            NodeId::Enrichment => f.write_str("enrichment"),
            NodeId::Supervisor => f.write_str("supervisor"),
            NodeId::Worker(kind) => write!(f, "worker:{}", kind),
            NodeId::ReadMessage => f.write_str("read_message"),
            NodeId::ChatOutput => f.write_str("chat_output"),
            NodeId::Memorization => f.write_str("memorization"),
            NodeId::Learning => f.write_str("learning"),
            NodeId::End => f.write_str("end"),
        }
    }
}

impl From<Route> for NodeId {
    fn from(route: Route) -> Self {
        match route {
            Route::ToWorker(kind) => NodeId::Worker(kind),
            Route::ToInputBoundary => NodeId::ReadMessage,
            Route::ToOutputBoundary => NodeId::ChatOutput,
            Route::ToFinish => NodeId::Memorization,
        }
    }
}
