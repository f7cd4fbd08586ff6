//! udahub-graph: the checkpointed conversation graph of the UDA-Hub orchestrator
//!
//! A chat thread moves through validation, enrichment and a supervisor that
//! routes between domain workers and the chat boundaries. Every transition is
//! checkpointed so a thread can be resumed or reopened later.

pub mod chat;
pub mod checkpoint;
pub mod context;
pub mod error;
pub mod events;
pub mod executor;
pub mod hub;
pub mod nodes;
pub mod prompts;
pub mod registry;
pub mod route;
pub mod state;
pub mod storage;

#[cfg(test)]
mod testing;

pub use chat::{ChatInterface, ConsoleChat, ListChat, LlmChat};
pub use checkpoint::{Checkpoint, Checkpointer, FileCheckpointer, MemoryCheckpointer};
pub use context::{
    ExecutionContext, ExecutionContextBuilder, GraphConfig, KNOWLEDGE_AUTHOR, PLATFORM_AUTHOR,
    StepLimits,
};
pub use error::{Error, Result, StorageError};
pub use events::GraphEvent;
pub use executor::{GraphExecutor, next_node};
pub use hub::{ChatOutcome, UdaHub};
pub use nodes::Node;
pub use registry::{WorkerEntry, WorkerRegistry};
pub use route::{NodeId, Route, WorkerKind};
pub use state::{
    ChatMessage, ConversationState, PendingAction, Priority, Role, StateUpdate, TaskContext,
    TaskStatus, UserContext,
};
pub use storage::{
    Account, AccountStore, InMemoryStore, KnowledgeEntry, KnowledgeStore, NewTicket, Ticket,
    TicketMessage, TicketStatus, TicketStore, UdaHubUser,
};
