//! Execution context passed to every node

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use udahub_agent::{SubAgent, ToolFilter};

use crate::{
    chat::ChatInterface,
    error::{Error, Result},
    events::GraphEvent,
    storage::{AccountStore, KnowledgeStore, TicketStore},
};

/// Author of the platform's own tools
pub const PLATFORM_AUTHOR: &str = "UDAHub";
/// Author of the knowledge base tools
pub const KNOWLEDGE_AUTHOR: &str = "UDAHub Knowledge Base";

/// Step ceilings of the sub-agents, one per kind of run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepLimits {
    pub validation: usize,
    pub classification: usize,
    pub worker: usize,
    pub confirmation: usize,
    pub summary: usize,
    pub learning: usize,
}

impl Default for StepLimits {
    fn default() -> Self {
        Self {
            validation: 15,
            classification: 5,
            worker: 10,
            confirmation: 3,
            summary: 5,
            learning: 10,
        }
    }
}

/// Tunables of a graph run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub step_limits: StepLimits,
    /// Ceiling on node transitions within one invocation
    pub max_graph_steps: usize,
    /// Run the knowledge learning node after memorization
    pub learn_from_conversations: bool,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            step_limits: StepLimits::default(),
            max_graph_steps: 200,
            learn_from_conversations: false,
        }
    }
}

/// Collaborators and settings shared by all nodes of a run
#[derive(Clone)]
pub struct ExecutionContext {
    pub accounts: Arc<dyn AccountStore>,
    pub tickets: Arc<dyn TicketStore>,
    pub knowledge: Arc<dyn KnowledgeStore>,
    /// The full tool catalog; nodes scope it with filters
    pub tools: ToolFilter,
    pub sub_agent: Arc<dyn SubAgent>,
    pub chat: Arc<dyn ChatInterface>,
    pub events: broadcast::Sender<GraphEvent>,
    pub config: GraphConfig,
}

impl ExecutionContext {
    pub fn builder() -> ExecutionContextBuilder {
        ExecutionContextBuilder::default()
    }

    /// Subscribe to graph events
    pub fn subscribe(&self) -> broadcast::Receiver<GraphEvent> {
        self.events.subscribe()
    }

    pub(crate) fn emit(&self, event: GraphEvent) {
        let _ = self.events.send(event);
    }
}

#[derive(Default)]
pub struct ExecutionContextBuilder {
    accounts: Option<Arc<dyn AccountStore>>,
    tickets: Option<Arc<dyn TicketStore>>,
    knowledge: Option<Arc<dyn KnowledgeStore>>,
    tools: ToolFilter,
    sub_agent: Option<Arc<dyn SubAgent>>,
    chat: Option<Arc<dyn ChatInterface>>,
    events: Option<broadcast::Sender<GraphEvent>>,
    config: GraphConfig,
}

impl ExecutionContextBuilder {
    pub fn accounts(mut self, store: Arc<dyn AccountStore>) -> Self {
        self.accounts = Some(store);
        self
    }

    pub fn tickets(mut self, store: Arc<dyn TicketStore>) -> Self {
        self.tickets = Some(store);
        self
    }

    pub fn knowledge(mut self, store: Arc<dyn KnowledgeStore>) -> Self {
        self.knowledge = Some(store);
        self
    }

    pub fn tools(mut self, tools: ToolFilter) -> Self {
        self.tools = tools;
        self
    }

    pub fn sub_agent(mut self, sub_agent: Arc<dyn SubAgent>) -> Self {
        self.sub_agent = Some(sub_agent);
        self
    }

    pub fn chat(mut self, chat: Arc<dyn ChatInterface>) -> Self {
        self.chat = Some(chat);
        self
    }

    pub fn events(mut self, events: broadcast::Sender<GraphEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn config(mut self, config: GraphConfig) -> Self {
        self.config = config;
        self
    }

    /// Fails if a required collaborator is missing
    pub fn build(self) -> Result<ExecutionContext> {
        let missing = |what: &str| Error::Configuration(format!("no {} configured", what));
        Ok(ExecutionContext {
            accounts: self.accounts.ok_or_else(|| missing("account store"))?,
            tickets: self.tickets.ok_or_else(|| missing("ticket store"))?,
            knowledge: self.knowledge.ok_or_else(|| missing("knowledge store"))?,
            tools: self.tools,
            sub_agent: self.sub_agent.ok_or_else(|| missing("sub-agent"))?,
            chat: self.chat.ok_or_else(|| missing("chat interface"))?,
            events: self.events.unwrap_or_else(|| broadcast::channel(256).0),
            config: self.config,
        })
    }
}
