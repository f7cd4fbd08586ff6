//! Node handlers
//!
//! A node reads the current state and the execution context and returns a
//! partial [`StateUpdate`]. Nodes never touch the checkpoint store or decide
//! edges; the executor does both.

use async_trait::async_trait;

use crate::{
    context::ExecutionContext,
    error::Result,
    state::{ConversationState, StateUpdate},
};

pub mod chat;
pub mod enrichment;
pub mod escalation;
pub mod learning;
pub mod memorization;
pub mod supervisor;
pub mod validation;
pub mod worker;

pub use chat::{ChatOutputNode, ReadMessageNode};
pub use enrichment::EnrichmentNode;
pub use escalation::EscalationNode;
pub use learning::LearningNode;
pub use memorization::MemorizationNode;
pub use supervisor::SupervisorNode;
pub use validation::ValidationNode;
pub use worker::DomainWorker;

#[async_trait]
pub trait Node: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, state: &ConversationState, ctx: &ExecutionContext) -> Result<StateUpdate>;
}
