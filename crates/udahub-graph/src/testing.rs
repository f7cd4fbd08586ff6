//! Scripted collaborators for unit tests

use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::Arc,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use udahub_agent::{
    BoxedTool, SubAgent, SubAgentRequest, Tool, ToolAnnotations, ToolFilter, ToolMetadata,
    ToolResult,
};

use crate::{
    chat::ListChat,
    context::{ExecutionContext, GraphConfig},
    error::StorageError,
    storage::{
        Account, AccountStore, InMemoryStore, NewTicket, StorageResult, Ticket, TicketMessage,
        TicketStatus, TicketStore, UdaHubUser,
    },
};

pub enum Reply {
    Answer(serde_json::Value),
    StepLimit,
    Failure(String),
}

/// A request as seen by the scripted sub-agent
#[derive(Clone)]
pub struct Seen {
    pub name: String,
    pub system_prompt: String,
    pub tools: Vec<String>,
    pub messages: Vec<udahub_ai::Message>,
}

/// Answers sub-agent runs from per-name queues and records every request
#[derive(Default)]
pub struct ScriptedSubAgent {
    replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    seen: Mutex<Vec<Seen>>,
}

impl ScriptedSubAgent {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, name: &str, reply: Reply) {
        self.replies
            .lock()
            .entry(name.to_string())
            .or_default()
            .push_back(reply);
    }

    pub fn answer(&self, name: &str, value: serde_json::Value) {
        self.push(name, Reply::Answer(value));
    }

    pub fn seen(&self, name: &str) -> Vec<Seen> {
        self.seen
            .lock()
            .iter()
            .filter(|s| s.name == name)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl SubAgent for ScriptedSubAgent {
    async fn run(&self, request: SubAgentRequest) -> udahub_agent::Result<serde_json::Value> {
        self.seen.lock().push(Seen {
            name: request.name.clone(),
            system_prompt: request.system_prompt.clone(),
            tools: request.tools.iter().map(|t| t.name().to_string()).collect(),
            messages: request.messages.clone(),
        });
        let reply = self
            .replies
            .lock()
            .get_mut(&request.name)
            .and_then(|q| q.pop_front());
        match reply {
            Some(Reply::Answer(value)) => {
                request.response_schema.validate(&value)?;
                Ok(value)
            }
            Some(Reply::StepLimit) => Err(udahub_agent::Error::StepLimitExceeded {
                limit: request.step_limit,
            }),
            Some(Reply::Failure(msg)) => Err(udahub_agent::Error::Other(msg)),
            None => Err(udahub_agent::Error::Other(format!(
                "no scripted reply for '{}'",
                request.name
            ))),
        }
    }
}

/// A tool with fixed metadata that records its calls
pub struct StubTool {
    pub name: &'static str,
    pub metadata: ToolMetadata,
    pub schema: serde_json::Value,
    pub calls: Mutex<Vec<serde_json::Value>>,
}

impl StubTool {
    pub fn new(
        name: &'static str,
        author: &str,
        tags: &[&str],
        annotations: ToolAnnotations,
        schema: serde_json::Value,
    ) -> Arc<Self> {
        Arc::new(Self {
            name,
            metadata: ToolMetadata::new(author, tags, annotations),
            schema,
            calls: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl Tool for StubTool {
    fn name(&self) -> &str {
        self.name
    }
    fn description(&self) -> &str {
        "stub tool"
    }
    fn parameters_schema(&self) -> serde_json::Value {
        self.schema.clone()
    }
    fn metadata(&self) -> ToolMetadata {
        self.metadata.clone()
    }
    async fn execute(
        &self,
        _tool_call_id: &str,
        arguments: serde_json::Value,
        _cancel: CancellationToken,
    ) -> ToolResult {
        self.calls.lock().push(arguments);
        ToolResult::text("{\"message\":\"ok\"}")
    }
}

pub fn store() -> Arc<InMemoryStore> {
    Arc::new(InMemoryStore::new().with_account(Account {
        account_id: "cultpass".into(),
        account_name: "CultPass".into(),
        account_description: Some("Cultural experiences subscription".into()),
    }))
}

pub fn context(
    store: Arc<InMemoryStore>,
    agent: Arc<ScriptedSubAgent>,
    chat: Arc<ListChat>,
    tools: Vec<BoxedTool>,
) -> ExecutionContext {
    ExecutionContext::builder()
        .accounts(store.clone())
        .tickets(store.clone())
        .knowledge(store)
        .sub_agent(agent)
        .chat(chat)
        .tools(ToolFilter::new(tools))
        .config(GraphConfig::default())
        .build()
        .expect("test context")
}

/// Storage that fails the named operations and delegates the rest
pub struct BrokenStore {
    pub inner: Arc<InMemoryStore>,
    failing: Mutex<HashSet<&'static str>>,
}

impl BrokenStore {
    pub fn new(inner: Arc<InMemoryStore>, failing: &[&'static str]) -> Arc<Self> {
        Arc::new(Self {
            inner,
            failing: Mutex::new(failing.iter().copied().collect()),
        })
    }

    pub fn repair(&self) {
        self.failing.lock().clear();
    }

    fn check(&self, operation: &str) -> StorageResult<()> {
        if self.failing.lock().contains(operation) {
            return Err(StorageError::Backend(format!("{} unavailable", operation)));
        }
        Ok(())
    }
}

#[async_trait]
impl TicketStore for BrokenStore {
    async fn create_ticket(&self, ticket: NewTicket) -> StorageResult<String> {
        self.check("create_ticket")?;
        self.inner.create_ticket(ticket).await
    }

    async fn get_ticket(&self, ticket_id: &str) -> StorageResult<Option<Ticket>> {
        self.check("get_ticket")?;
        self.inner.get_ticket(ticket_id).await
    }

    async fn append_messages(&self, ticket_id: &str, messages: &[TicketMessage]) -> StorageResult<()> {
        self.check("append_messages")?;
        self.inner.append_messages(ticket_id, messages).await
    }

    async fn get_messages(&self, ticket_id: &str) -> StorageResult<Vec<TicketMessage>> {
        self.check("get_messages")?;
        self.inner.get_messages(ticket_id).await
    }

    async fn set_status(&self, ticket_id: &str, status: TicketStatus) -> StorageResult<()> {
        self.check("set_status")?;
        self.inner.set_status(ticket_id, status).await
    }
}

#[async_trait]
impl AccountStore for BrokenStore {
    async fn get_account(&self, account_id: &str) -> StorageResult<Option<Account>> {
        self.check("get_account")?;
        self.inner.get_account(account_id).await
    }

    async fn get_user(&self, account_id: &str, external_user_id: &str) -> StorageResult<Option<UdaHubUser>> {
        self.check("get_user")?;
        self.inner.get_user(account_id, external_user_id).await
    }

    async fn get_user_by_id(&self, user_id: &str) -> StorageResult<Option<UdaHubUser>> {
        self.check("get_user_by_id")?;
        self.inner.get_user_by_id(user_id).await
    }

    async fn create_user(
        &self,
        account_id: &str,
        external_user_id: &str,
        user_name: &str,
    ) -> StorageResult<UdaHubUser> {
        self.check("create_user")?;
        self.inner.create_user(account_id, external_user_id, user_name).await
    }
}

/// A test context whose account and ticket storage is `broken`
pub fn broken_context(
    broken: Arc<BrokenStore>,
    agent: Arc<ScriptedSubAgent>,
    tools: Vec<BoxedTool>,
) -> ExecutionContext {
    ExecutionContext::builder()
        .accounts(broken.clone())
        .tickets(broken.clone())
        .knowledge(broken.inner.clone())
        .sub_agent(agent)
        .chat(Arc::new(ListChat::default()))
        .tools(ToolFilter::new(tools))
        .config(GraphConfig::default())
        .build()
        .expect("test context")
}
