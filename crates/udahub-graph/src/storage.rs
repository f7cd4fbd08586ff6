//! Narrow storage interfaces for accounts, users, tickets and knowledge

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::{error::StorageError, state::Role};

pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// A platform customer (a company whose users are served)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub account_id: String,
    pub account_name: String,
    #[serde(default)]
    pub account_description: Option<String>,
}

/// A platform user, unique on (account_id, external_user_id)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UdaHubUser {
    pub user_id: String,
    pub account_id: String,
    pub external_user_id: String,
    pub user_name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    #[default]
    Open,
    Resolved,
    Escalated,
}

/// Fields of a ticket about to be created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTicket {
    pub account_id: String,
    pub user_id: String,
    pub channel: String,
    pub summary: String,
    pub status: TicketStatus,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub ticket_id: String,
    pub account_id: String,
    pub user_id: String,
    pub channel: String,
    pub summary: String,
    pub status: TicketStatus,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Ticket {
    pub fn from_new(ticket_id: impl Into<String>, new: NewTicket) -> Self {
        let now = Utc::now();
        Self {
            ticket_id: ticket_id.into(),
            account_id: new.account_id,
            user_id: new.user_id,
            channel: new.channel,
            summary: new.summary,
            status: new.status,
            tags: new.tags,
            created_at: now,
            updated_at: now,
        }
    }
}

/// One message stored on a ticket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketMessage {
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl TicketMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

/// An article of the knowledge base
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub article_id: String,
    pub account_id: String,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl KnowledgeEntry {
    /// Number of query terms found in the title, content or tags
    pub fn score(&self, query: &str) -> usize {
        let haystack = format!(
            "{} {} {}",
            self.title.to_lowercase(),
            self.content.to_lowercase(),
            self.tags.join(" ").to_lowercase()
        );
        query
            .split_whitespace()
            .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
            .filter(|t| t.len() > 2 && haystack.contains(t.as_str()))
            .count()
    }
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn get_account(&self, account_id: &str) -> StorageResult<Option<Account>>;

    async fn get_user(
        &self,
        account_id: &str,
        external_user_id: &str,
    ) -> StorageResult<Option<UdaHubUser>>;

    async fn get_user_by_id(&self, user_id: &str) -> StorageResult<Option<UdaHubUser>>;

    /// Fails with [`StorageError::AlreadyExists`] if the pair is taken
    async fn create_user(
        &self,
        account_id: &str,
        external_user_id: &str,
        user_name: &str,
    ) -> StorageResult<UdaHubUser>;
}

#[async_trait]
pub trait TicketStore: Send + Sync {
    async fn create_ticket(&self, ticket: NewTicket) -> StorageResult<String>;

    async fn get_ticket(&self, ticket_id: &str) -> StorageResult<Option<Ticket>>;

    async fn append_messages(
        &self,
        ticket_id: &str,
        messages: &[TicketMessage],
    ) -> StorageResult<()>;

    async fn get_messages(&self, ticket_id: &str) -> StorageResult<Vec<TicketMessage>>;

    async fn set_status(&self, ticket_id: &str, status: TicketStatus) -> StorageResult<()>;
}

#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// Best matches first, at most `limit`
    async fn search(
        &self,
        account_id: &str,
        query: &str,
        limit: usize,
    ) -> StorageResult<Vec<KnowledgeEntry>>;

    async fn create_entry(
        &self,
        account_id: &str,
        title: &str,
        content: &str,
        tags: Vec<String>,
    ) -> StorageResult<KnowledgeEntry>;
}

/// Rank entries of one account against a query
pub fn rank_entries<'a>(
    entries: impl Iterator<Item = &'a KnowledgeEntry>,
    account_id: &str,
    query: &str,
    limit: usize,
) -> Vec<KnowledgeEntry> {
    let mut scored: Vec<(usize, &KnowledgeEntry)> = entries
        .filter(|e| e.account_id == account_id)
        .map(|e| (e.score(query), e))
        .filter(|(score, _)| *score > 0)
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0));
    scored
        .into_iter()
        .take(limit)
        .map(|(_, e)| e.clone())
        .collect()
}

#[derive(Default)]
struct MemoryData {
    accounts: HashMap<String, Account>,
    users: Vec<UdaHubUser>,
    tickets: HashMap<String, (Ticket, Vec<TicketMessage>)>,
    knowledge: Vec<KnowledgeEntry>,
}

/// In-memory implementation of every store
#[derive(Default)]
pub struct InMemoryStore {
    data: RwLock<MemoryData>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_account(self, account: Account) -> Self {
        self.data
            .write()
            .accounts
            .insert(account.account_id.clone(), account);
        self
    }

    pub fn with_user(self, user: UdaHubUser) -> Self {
        self.data.write().users.push(user);
        self
    }

    pub fn with_knowledge(self, entry: KnowledgeEntry) -> Self {
        self.data.write().knowledge.push(entry);
        self
    }

    pub fn tickets(&self) -> Vec<Ticket> {
        self.data
            .read()
            .tickets
            .values()
            .map(|(t, _)| t.clone())
            .collect()
    }

    pub fn knowledge(&self) -> Vec<KnowledgeEntry> {
        self.data.read().knowledge.clone()
    }
}

#[async_trait]
impl AccountStore for InMemoryStore {
    async fn get_account(&self, account_id: &str) -> StorageResult<Option<Account>> {
        Ok(self.data.read().accounts.get(account_id).cloned())
    }

    async fn get_user(
        &self,
        account_id: &str,
        external_user_id: &str,
    ) -> StorageResult<Option<UdaHubUser>> {
        Ok(self
            .data
            .read()
            .users
            .iter()
            .find(|u| u.account_id == account_id && u.external_user_id == external_user_id)
            .cloned())
    }

    async fn get_user_by_id(&self, user_id: &str) -> StorageResult<Option<UdaHubUser>> {
        Ok(self
            .data
            .read()
            .users
            .iter()
            .find(|u| u.user_id == user_id)
            .cloned())
    }

    async fn create_user(
        &self,
        account_id: &str,
        external_user_id: &str,
        user_name: &str,
    ) -> StorageResult<UdaHubUser> {
        let mut data = self.data.write();
        if data
            .users
            .iter()
            .any(|u| u.account_id == account_id && u.external_user_id == external_user_id)
        {
            return Err(StorageError::AlreadyExists(format!(
                "User with external_user_id '{}' for account '{}'",
                external_user_id, account_id
            )));
        }
        let user = UdaHubUser {
            user_id: uuid::Uuid::new_v4().to_string(),
            account_id: account_id.to_string(),
            external_user_id: external_user_id.to_string(),
            user_name: user_name.to_string(),
            created_at: Utc::now(),
        };
        data.users.push(user.clone());
        Ok(user)
    }
}

#[async_trait]
impl TicketStore for InMemoryStore {
    async fn create_ticket(&self, ticket: NewTicket) -> StorageResult<String> {
        let ticket_id = uuid::Uuid::new_v4().to_string();
        self.data.write().tickets.insert(
            ticket_id.clone(),
            (Ticket::from_new(ticket_id.clone(), ticket), Vec::new()),
        );
        Ok(ticket_id)
    }

    async fn get_ticket(&self, ticket_id: &str) -> StorageResult<Option<Ticket>> {
        Ok(self
            .data
            .read()
            .tickets
            .get(ticket_id)
            .map(|(t, _)| t.clone()))
    }

    async fn append_messages(
        &self,
        ticket_id: &str,
        messages: &[TicketMessage],
    ) -> StorageResult<()> {
        let mut data = self.data.write();
        let (ticket, stored) = data
            .tickets
            .get_mut(ticket_id)
            .ok_or_else(|| StorageError::NotFound(format!("Ticket '{}'", ticket_id)))?;
        stored.extend_from_slice(messages);
        ticket.updated_at = Utc::now();
        Ok(())
    }

    async fn get_messages(&self, ticket_id: &str) -> StorageResult<Vec<TicketMessage>> {
        self.data
            .read()
            .tickets
            .get(ticket_id)
            .map(|(_, messages)| messages.clone())
            .ok_or_else(|| StorageError::NotFound(format!("Ticket '{}'", ticket_id)))
    }

    async fn set_status(&self, ticket_id: &str, status: TicketStatus) -> StorageResult<()> {
        let mut data = self.data.write();
        let (ticket, _) = data
            .tickets
            .get_mut(ticket_id)
            .ok_or_else(|| StorageError::NotFound(format!("Ticket '{}'", ticket_id)))?;
        ticket.status = status;
        ticket.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl KnowledgeStore for InMemoryStore {
    async fn search(
        &self,
        account_id: &str,
        query: &str,
        limit: usize,
    ) -> StorageResult<Vec<KnowledgeEntry>> {
        let data = self.data.read();
        Ok(rank_entries(data.knowledge.iter(), account_id, query, limit))
    }

    async fn create_entry(
        &self,
        account_id: &str,
        title: &str,
        content: &str,
        tags: Vec<String>,
    ) -> StorageResult<KnowledgeEntry> {
        let entry = KnowledgeEntry {
            article_id: uuid::Uuid::new_v4().to_string(),
            account_id: account_id.to_string(),
            title: title.to_string(),
            content: content.to_string(),
            tags,
        };
        self.data.write().knowledge.push(entry.clone());
        Ok(entry)
    }
}
