//! Conversation state threaded through every node
//!
//! Nodes never mutate [`ConversationState`] directly. They return a
//! [`StateUpdate`] and the executor merges it with [`ConversationState::apply`]
//! before the next edge is evaluated.

use serde::{Deserialize, Serialize};

use crate::route::{Route, WorkerKind};

/// Who authored a chat turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    /// Internal notes for the agents, never delivered to the user
    System,
}

/// One chat turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub timestamp: i64,
}

impl ChatMessage {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Convert to a model message. System notes become bracketed user turns.
    pub fn to_llm_message(&self) -> udahub_ai::Message {
        match self.role {
            Role::User => udahub_ai::Message::user(&self.content),
            Role::Assistant => udahub_ai::Message::assistant(&self.content),
            Role::System => udahub_ai::Message::user(format!("[system note] {}", self.content)),
        }
    }
}

/// Identity of the person being served
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserContext {
    pub account_id: String,
    pub external_user_id: String,
    #[serde(default)]
    pub udahub_user_id: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub account_name: Option<String>,
    #[serde(default)]
    pub account_description: Option<String>,
    /// A platform user record had to be created during validation
    #[serde(default)]
    pub udahub_user_created: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    InProgress,
    Completed,
    Failed,
}

impl TaskStatus {
    /// Terminal states stop forward routing
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskContext {
    pub status: TaskStatus,
    #[serde(default)]
    pub error: Option<String>,
}

impl TaskContext {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: TaskStatus::Failed,
            error: Some(error.into()),
        }
    }

    pub fn completed() -> Self {
        Self {
            status: TaskStatus::Completed,
            error: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    #[default]
    Normal,
    High,
    Critical,
}

/// A mutating tool call waiting for the user's confirmation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingAction {
    /// Worker that proposed the action and will execute it
    pub worker: WorkerKind,
    pub tool: String,
    pub arguments: serde_json::Value,
    /// Human readable description shown to the user
    pub summary: String,
}

/// The record persisted between user turns
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    pub messages: Vec<ChatMessage>,
    pub user: UserContext,
    pub task: TaskContext,
    #[serde(default)]
    pub ticket_id: Option<String>,
    pub is_validated: bool,
    pub is_enriched: bool,
    pub terminate_chat: bool,
    pub need_user_input: bool,
    pub has_pending_messages: bool,
    /// Index of the last delivered assistant message
    #[serde(default)]
    pub last_printed_idx: Option<usize>,
    #[serde(default)]
    pub worker: Option<WorkerKind>,
    #[serde(default)]
    pub route: Option<Route>,
    pub priority: Priority,
    pub handoff_requested: bool,
    pub loaded_messages_count: usize,
    pub is_memorized: bool,
    /// The conversation was handed to a human
    pub escalated: bool,
    #[serde(default)]
    pub pending_action: Option<PendingAction>,
}

impl ConversationState {
    /// Fresh state for a new thread
    pub fn new(account_id: impl Into<String>, external_user_id: impl Into<String>) -> Self {
        Self {
            user: UserContext {
                account_id: account_id.into(),
                external_user_id: external_user_id.into(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn with_ticket(mut self, ticket_id: Option<String>) -> Self {
        self.ticket_id = ticket_id;
        self
    }

    /// Merge a node's output into this state.
    ///
    /// Messages are appended. `is_validated` and `is_enriched` only ever
    /// move from false to true.
    pub fn apply(&mut self, update: StateUpdate) {
        self.messages.extend(update.messages);

        if let Some(user) = update.user {
            self.user = user;
        }
        if let Some(task) = update.task {
            self.task = task;
        }
        if let Some(ticket_id) = update.ticket_id {
            self.ticket_id = ticket_id;
        }
        if update.is_validated == Some(true) {
            self.is_validated = true;
        }
        if update.is_enriched == Some(true) {
            self.is_enriched = true;
        }
        if let Some(v) = update.terminate_chat {
            self.terminate_chat = v;
        }
        if let Some(v) = update.need_user_input {
            self.need_user_input = v;
        }
        if let Some(v) = update.has_pending_messages {
            self.has_pending_messages = v;
        }
        if let Some(idx) = update.last_printed_idx {
            self.last_printed_idx = Some(idx);
        }
        if let Some(worker) = update.worker {
            self.worker = Some(worker);
        }
        if let Some(route) = update.route {
            self.route = Some(route);
        }
        if let Some(priority) = update.priority {
            self.priority = priority;
        }
        if let Some(v) = update.handoff_requested {
            self.handoff_requested = v;
        }
        if let Some(count) = update.loaded_messages_count {
            self.loaded_messages_count = count;
        }
        if let Some(v) = update.is_memorized {
            self.is_memorized = v;
        }
        if let Some(v) = update.escalated {
            self.escalated = v;
        }
        if let Some(action) = update.pending_action {
            self.pending_action = action;
        }
    }

    /// Reopen a thread whose previous run ended.
    ///
    /// History, identity and the ticket link survive; the termination flags
    /// are cleared and the user is asked for input again.
    pub fn prepare_restart(&mut self) {
        self.terminate_chat = false;
        self.is_memorized = false;
        self.escalated = false;
        self.handoff_requested = false;
        self.has_pending_messages = false;
        self.pending_action = None;
        self.route = None;
        self.need_user_input = true;
        self.priority = Priority::Normal;
        self.task = TaskContext::default();
    }

    /// Whether the graph has nothing left to do for this run
    pub fn is_finished(&self) -> bool {
        if self.task.status == TaskStatus::Failed && !self.is_validated {
            return true;
        }
        self.is_memorized && (self.terminate_chat || self.task.status.is_terminal())
    }

    pub fn assistant_messages(&self) -> impl Iterator<Item = &ChatMessage> {
        self.messages.iter().filter(|m| m.role == Role::Assistant)
    }

    /// Messages in model form, starting at `from`
    pub fn llm_messages(&self, from: usize) -> Vec<udahub_ai::Message> {
        self.messages
            .iter()
            .skip(from)
            .map(ChatMessage::to_llm_message)
            .collect()
    }
}

/// Render messages as a plain transcript for summarization and learning
pub fn transcript(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .map(|m| {
            let role = match m.role {
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::System => "system",
            };
            format!("{}: {}", role, m.content)
        })
        .collect::<Vec<_>>()
        .join("\n================================================\n")
}

/// Partial output of a node. Unset fields leave the state untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateUpdate {
    pub messages: Vec<ChatMessage>,
    pub user: Option<UserContext>,
    pub task: Option<TaskContext>,
    pub ticket_id: Option<Option<String>>,
    pub is_validated: Option<bool>,
    pub is_enriched: Option<bool>,
    pub terminate_chat: Option<bool>,
    pub need_user_input: Option<bool>,
    pub has_pending_messages: Option<bool>,
    pub last_printed_idx: Option<usize>,
    pub worker: Option<WorkerKind>,
    pub route: Option<Route>,
    pub priority: Option<Priority>,
    pub handoff_requested: Option<bool>,
    pub loaded_messages_count: Option<usize>,
    pub is_memorized: Option<bool>,
    pub escalated: Option<bool>,
    pub pending_action: Option<Option<PendingAction>>,
}

impl StateUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn message(mut self, message: ChatMessage) -> Self {
        self.messages.push(message);
        self
    }

    pub fn messages(mut self, messages: impl IntoIterator<Item = ChatMessage>) -> Self {
        self.messages.extend(messages);
        self
    }

    pub fn user(mut self, user: UserContext) -> Self {
        self.user = Some(user);
        self
    }

    pub fn task(mut self, task: TaskContext) -> Self {
        self.task = Some(task);
        self
    }

    pub fn ticket_id(mut self, ticket_id: Option<String>) -> Self {
        self.ticket_id = Some(ticket_id);
        self
    }

    pub fn validated(mut self) -> Self {
        self.is_validated = Some(true);
        self
    }

    pub fn enriched(mut self) -> Self {
        self.is_enriched = Some(true);
        self
    }

    pub fn terminate_chat(mut self, v: bool) -> Self {
        self.terminate_chat = Some(v);
        self
    }

    pub fn need_user_input(mut self, v: bool) -> Self {
        self.need_user_input = Some(v);
        self
    }

    pub fn has_pending_messages(mut self, v: bool) -> Self {
        self.has_pending_messages = Some(v);
        self
    }

    pub fn last_printed_idx(mut self, idx: usize) -> Self {
        self.last_printed_idx = Some(idx);
        self
    }

    pub fn worker(mut self, worker: WorkerKind) -> Self {
        self.worker = Some(worker);
        self
    }

    pub fn route(mut self, route: Route) -> Self {
        self.route = Some(route);
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn handoff_requested(mut self, v: bool) -> Self {
        self.handoff_requested = Some(v);
        self
    }

    pub fn loaded_messages_count(mut self, count: usize) -> Self {
        self.loaded_messages_count = Some(count);
        self
    }

    pub fn memorized(mut self) -> Self {
        self.is_memorized = Some(true);
        self
    }

    pub fn escalated(mut self, v: bool) -> Self {
        self.escalated = Some(v);
        self
    }

    pub fn pending_action(mut self, action: Option<PendingAction>) -> Self {
        self.pending_action = Some(action);
        self
    }
}
