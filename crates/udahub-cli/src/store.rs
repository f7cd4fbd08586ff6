//! File-backed storage
//!
//! Layout under the data directory:
//!
//! - `data.json`: accounts, platform users, knowledge and the customer directory
//! - `tickets/<ticket_id>.jsonl`: one ticket per file, an append-only log of entries
//! - `threads/<thread_id>.json`: conversation checkpoints

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use udahub_graph::{
    Account, AccountStore, KnowledgeEntry, KnowledgeStore, NewTicket, StorageError, Ticket,
    TicketMessage, TicketStatus, TicketStore, UdaHubUser, storage::StorageResult,
    storage::rank_entries,
};

/// A subscription of a customer's user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    /// `active` or `cancelled`
    pub status: String,
    /// `basic` or `premium`
    pub tier: String,
    pub monthly_quota: u32,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
}

/// A user in the customer's own system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerUser {
    pub user_id: String,
    pub full_name: String,
    pub email: String,
    #[serde(default)]
    pub is_blocked: bool,
    pub subscription: Subscription,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experience {
    pub experience_id: String,
    pub title: String,
    pub description: String,
    pub location: String,
    pub when: DateTime<Utc>,
    pub slots_available: u32,
    #[serde(default)]
    pub is_premium: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    pub reservation_id: String,
    pub user_id: String,
    pub experience_id: String,
    pub date: String,
    pub time: String,
    pub party_size: u32,
    /// `reserved` or `cancelled`
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// The customer's system of record, exposed to the agents through tools
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CustomerDirectory {
    pub users: Vec<CustomerUser>,
    pub experiences: Vec<Experience>,
    pub reservations: Vec<Reservation>,
}

/// Contents of `data.json`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DataFile {
    pub accounts: Vec<Account>,
    pub users: Vec<UdaHubUser>,
    pub knowledge: Vec<KnowledgeEntry>,
    pub cultpass: CustomerDirectory,
}

/// Ticket log entry types for the JSONL format
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum TicketEntry {
    Created { ticket: Ticket },
    Message { message: TicketMessage },
    Status { status: TicketStatus, timestamp: DateTime<Utc> },
}

/// Storage rooted at a data directory
pub struct FileStore {
    root: PathBuf,
    data: RwLock<DataFile>,
}

impl FileStore {
    /// Open the store, seeding a demo data file if none exists
    pub fn open(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root = root.into();
        fs::create_dir_all(root.join("tickets"))?;
        fs::create_dir_all(root.join("threads"))?;

        let data_path = root.join("data.json");
        let data = if data_path.exists() {
            serde_json::from_str(&fs::read_to_string(&data_path)?)?
        } else {
            let data = seed();
            write_atomic(&data_path, &serde_json::to_string_pretty(&data)?)?;
            tracing::info!("Seeded data file at {}", data_path.display());
            data
        };

        Ok(Self {
            root,
            data: RwLock::new(data),
        })
    }

    pub fn threads_dir(&self) -> PathBuf {
        self.root.join("threads")
    }

    fn ticket_path(&self, ticket_id: &str) -> PathBuf {
        let name: String = ticket_id
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
            .collect();
        self.root.join("tickets").join(format!("{}.jsonl", name))
    }

    /// Read from the data file
    pub fn read<R>(&self, f: impl FnOnce(&DataFile) -> R) -> R {
        f(&*self.data.read())
    }

    /// Change the data file and write it back
    pub fn update<R>(&self, f: impl FnOnce(&mut DataFile) -> R) -> StorageResult<R> {
        let mut data = self.data.write();
        let result = f(&mut *data);
        let content = serde_json::to_string_pretty(&*data)?;
        write_atomic(&self.root.join("data.json"), &content)?;
        Ok(result)
    }

    fn append_entries(&self, ticket_id: &str, entries: &[TicketEntry]) -> StorageResult<()> {
        let path = self.ticket_path(ticket_id);
        if !path.exists() {
            return Err(StorageError::NotFound(format!("Ticket '{}'", ticket_id)));
        }
        let file = File::options().append(true).open(&path)?;
        let mut writer = BufWriter::new(file);
        for entry in entries {
            writeln!(writer, "{}", serde_json::to_string(entry)?)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Replay a ticket log
    fn load_ticket(&self, ticket_id: &str) -> StorageResult<Option<(Ticket, Vec<TicketMessage>)>> {
        let path = self.ticket_path(ticket_id);
        if !path.exists() {
            return Ok(None);
        }
        let reader = BufReader::new(File::open(&path)?);

        let mut ticket: Option<Ticket> = None;
        let mut messages = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<TicketEntry>(&line) {
                Ok(TicketEntry::Created { ticket: created }) => ticket = Some(created),
                Ok(TicketEntry::Message { message }) => {
                    if let Some(t) = ticket.as_mut() {
                        t.updated_at = message.created_at;
                    }
                    messages.push(message);
                }
                Ok(TicketEntry::Status { status, timestamp }) => {
                    if let Some(t) = ticket.as_mut() {
                        t.status = status;
                        t.updated_at = timestamp;
                    }
                }
                Err(e) => tracing::warn!("Skipping malformed entry in {}: {}", path.display(), e),
            }
        }
        Ok(ticket.map(|t| (t, messages)))
    }
}

fn write_atomic(path: &Path, content: &str) -> std::io::Result<()> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, content)?;
    fs::rename(&tmp, path)
}

#[async_trait]
impl AccountStore for FileStore {
    async fn get_account(&self, account_id: &str) -> StorageResult<Option<Account>> {
        Ok(self.read(|d| {
            d.accounts
                .iter()
                .find(|a| a.account_id == account_id)
                .cloned()
        }))
    }

    async fn get_user(
        &self,
        account_id: &str,
        external_user_id: &str,
    ) -> StorageResult<Option<UdaHubUser>> {
        Ok(self.read(|d| {
            d.users
                .iter()
                .find(|u| u.account_id == account_id && u.external_user_id == external_user_id)
                .cloned()
        }))
    }

    async fn get_user_by_id(&self, user_id: &str) -> StorageResult<Option<UdaHubUser>> {
        Ok(self.read(|d| d.users.iter().find(|u| u.user_id == user_id).cloned()))
    }

    async fn create_user(
        &self,
        account_id: &str,
        external_user_id: &str,
        user_name: &str,
    ) -> StorageResult<UdaHubUser> {
        let created = self.update(|d| {
            if d.users
                .iter()
                .any(|u| u.account_id == account_id && u.external_user_id == external_user_id)
            {
                return None;
            }
            let user = UdaHubUser {
                user_id: uuid::Uuid::new_v4().to_string(),
                account_id: account_id.to_string(),
                external_user_id: external_user_id.to_string(),
                user_name: user_name.to_string(),
                created_at: Utc::now(),
            };
            d.users.push(user.clone());
            Some(user)
        })?;
        created.ok_or_else(|| {
            StorageError::AlreadyExists(format!(
                "User '{}' of account '{}'",
                external_user_id, account_id
            ))
        })
    }
}

#[async_trait]
impl TicketStore for FileStore {
    async fn create_ticket(&self, ticket: NewTicket) -> StorageResult<String> {
        let ticket_id = uuid::Uuid::new_v4().to_string();
        let ticket = Ticket::from_new(&ticket_id, ticket);
        let file = File::options()
            .write(true)
            .create_new(true)
            .open(self.ticket_path(&ticket_id))?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "{}", serde_json::to_string(&TicketEntry::Created { ticket })?)?;
        writer.flush()?;
        tracing::debug!(ticket_id = %ticket_id, "ticket file created");
        Ok(ticket_id)
    }

    async fn get_ticket(&self, ticket_id: &str) -> StorageResult<Option<Ticket>> {
        Ok(self.load_ticket(ticket_id)?.map(|(t, _)| t))
    }

    async fn append_messages(
        &self,
        ticket_id: &str,
        messages: &[TicketMessage],
    ) -> StorageResult<()> {
        let entries: Vec<TicketEntry> = messages
            .iter()
            .cloned()
            .map(|message| TicketEntry::Message { message })
            .collect();
        self.append_entries(ticket_id, &entries)
    }

    async fn get_messages(&self, ticket_id: &str) -> StorageResult<Vec<TicketMessage>> {
        self.load_ticket(ticket_id)?
            .map(|(_, messages)| messages)
            .ok_or_else(|| StorageError::NotFound(format!("Ticket '{}'", ticket_id)))
    }

    async fn set_status(&self, ticket_id: &str, status: TicketStatus) -> StorageResult<()> {
        self.append_entries(
            ticket_id,
            &[TicketEntry::Status {
                status,
                timestamp: Utc::now(),
            }],
        )
    }
}

#[async_trait]
impl KnowledgeStore for FileStore {
    async fn search(
        &self,
        account_id: &str,
        query: &str,
        limit: usize,
    ) -> StorageResult<Vec<KnowledgeEntry>> {
        Ok(self.read(|d| rank_entries(d.knowledge.iter(), account_id, query, limit)))
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
        self.update(|d| d.knowledge.push(entry.clone()))?;
        Ok(entry)
    }
}

fn article(id: &str, title: &str, content: &str, tags: &[&str]) -> KnowledgeEntry {
    KnowledgeEntry {
        article_id: id.to_string(),
        account_id: "cultpass".to_string(),
        title: title.to_string(),
        content: content.to_string(),
        tags: tags.iter().map(|t| t.to_string()).collect(),
    }
}

fn experience(id: &str, title: &str, description: &str, location: &str, when: &str, slots: u32, premium: bool) -> Experience {
    Experience {
        experience_id: id.to_string(),
        title: title.to_string(),
        description: description.to_string(),
        location: location.to_string(),
        when: DateTime::parse_from_rfc3339(when)
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        slots_available: slots,
        is_premium: premium,
    }
}

/// Demo data: the CultPass account, a few of its users, experiences and articles
pub fn seed() -> DataFile {
    let started = Utc::now();
    let subscription = |status: &str, tier: &str, quota: u32| Subscription {
        status: status.to_string(),
        tier: tier.to_string(),
        monthly_quota: quota,
        started_at: started,
        ended_at: None,
    };

    DataFile {
        accounts: vec![Account {
            account_id: "cultpass".to_string(),
            account_name: "CultPass".to_string(),
            account_description: Some(
                "CultPass is a subscription that gives access to cultural experiences such as museums, concerts and workshops.".to_string(),
            ),
        }],
        users: Vec::new(),
        knowledge: vec![
            article(
                "kb-1",
                "How to reserve an experience?",
                "Open the experience in the CultPass app and tap 'Reserve'. Reservations use one credit of your monthly quota.",
                &["reservation", "booking"],
            ),
            article(
                "kb-2",
                "How to cancel a reservation?",
                "Reservations can be cancelled up to 24 hours before the experience starts. The credit is returned to your quota.",
                &["reservation", "cancel"],
            ),
            article(
                "kb-3",
                "What does the premium tier include?",
                "Premium subscribers can reserve premium experiences and get a higher monthly quota.",
                &["subscription", "premium"],
            ),
            article(
                "kb-4",
                "How to reset password?",
                "Use the 'forgot password' link on the login page; a reset email is sent within minutes.",
                &["account", "password", "login"],
            ),
        ],
        cultpass: CustomerDirectory {
            users: vec![
                CustomerUser {
                    user_id: "a4ab87".to_string(),
                    full_name: "Alice Kingsley".to_string(),
                    email: "alice.kingsley@example.com".to_string(),
                    is_blocked: false,
                    subscription: subscription("active", "premium", 8),
                },
                CustomerUser {
                    user_id: "f556c0".to_string(),
                    full_name: "Bruno Oliveira".to_string(),
                    email: "bruno.oliveira@example.com".to_string(),
                    is_blocked: false,
                    subscription: subscription("active", "basic", 4),
                },
                CustomerUser {
                    user_id: "88382b".to_string(),
                    full_name: "Chen Wei".to_string(),
                    email: "chen.wei@example.com".to_string(),
                    is_blocked: false,
                    subscription: subscription("cancelled", "basic", 4),
                },
            ],
            experiences: vec![
                experience("exp-jazz", "Jazz Night at the Blue Room", "An evening of live jazz with a local quartet.", "Blue Room, Lisbon", "2025-09-06T20:00:00Z", 12, false),
                experience("exp-museum", "Guided Tour: Modern Art Museum", "A two hour guided tour through the permanent collection.", "Modern Art Museum, Porto", "2025-09-10T10:00:00Z", 20, false),
                experience("exp-pottery", "Pottery Workshop", "Learn to throw your first bowl with a master potter.", "Clay Studio, Lisbon", "2025-09-14T15:00:00Z", 6, true),
            ],
            reservations: Vec::new(),
        },
    }
}
