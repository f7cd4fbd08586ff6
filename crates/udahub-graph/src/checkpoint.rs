//! Per-thread checkpoints: a state snapshot plus the node to resume at

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::{error::Result, route::NodeId, state::ConversationState};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub thread_id: String,
    pub state: ConversationState,
    /// Node to run next; `End` once the run finished
    pub next: NodeId,
    /// Node transitions taken on this thread so far
    pub step: u64,
    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(thread_id: impl Into<String>, state: ConversationState, next: NodeId) -> Self {
        Self {
            thread_id: thread_id.into(),
            state,
            next,
            step: 0,
            updated_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait Checkpointer: Send + Sync {
    async fn get(&self, thread_id: &str) -> Result<Option<Checkpoint>>;

    async fn put(&self, checkpoint: Checkpoint) -> Result<()>;
}

/// Checkpoints held in process memory
#[derive(Default)]
pub struct MemoryCheckpointer {
    threads: Mutex<HashMap<String, Checkpoint>>,
}

impl MemoryCheckpointer {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Checkpointer for MemoryCheckpointer {
    async fn get(&self, thread_id: &str) -> Result<Option<Checkpoint>> {
        Ok(self.threads.lock().get(thread_id).cloned())
    }

    async fn put(&self, checkpoint: Checkpoint) -> Result<()> {
        self.threads
            .lock()
            .insert(checkpoint.thread_id.clone(), checkpoint);
        Ok(())
    }
}

/// One JSON file per thread, replaced atomically on every write
pub struct FileCheckpointer {
    dir: PathBuf,
}

impl FileCheckpointer {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Escapes every byte outside `[A-Za-z0-9-]` as `_xx`, so distinct ids get distinct files
    fn path_for(&self, thread_id: &str) -> PathBuf {
        let mut safe = String::with_capacity(thread_id.len());
        for byte in thread_id.bytes() {
            if byte.is_ascii_alphanumeric() || byte == b'-' {
                safe.push(char::from(byte));
            } else {
                safe.push_str(&format!("_{:02x}", byte));
            }
        }
        self.dir.join(format!("{}.json", safe))
    }
}

#[async_trait]
impl Checkpointer for FileCheckpointer {
    async fn get(&self, thread_id: &str) -> Result<Option<Checkpoint>> {
        let path = self.path_for(thread_id);
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, checkpoint: Checkpoint) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(&checkpoint.thread_id);
        let tmp = path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(&checkpoint)?;
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::WorkerKind;
    use crate::state::{ChatMessage, StateUpdate};

    fn sample() -> Checkpoint {
        let mut state = ConversationState::new("cultpass", "f556c0");
        state.apply(
            StateUpdate::new()
                .validated()
                .message(ChatMessage::assistant("Welcome!"))
                .worker(WorkerKind::Faq),
        );
        Checkpoint::new("thread/1", state, NodeId::ReadMessage)
    }

    #[tokio::test]
    async fn test_memory_checkpointer() {
        let cp = MemoryCheckpointer::new();
        assert!(cp.get("thread/1").await.unwrap().is_none());
        let checkpoint = sample();
        cp.put(checkpoint.clone()).await.unwrap();
        assert_eq!(cp.get("thread/1").await.unwrap(), Some(checkpoint));
        assert!(cp.get("thread/2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_checkpointer_keeps_similar_ids_apart() {
        let dir = tempfile::tempdir().unwrap();
        let cp = FileCheckpointer::new(dir.path());
        let slash = sample();
        let mut underscore = sample();
        underscore.thread_id = "thread_1".into();
        underscore.next = NodeId::Supervisor;

        cp.put(slash.clone()).await.unwrap();
        cp.put(underscore.clone()).await.unwrap();

        assert_eq!(cp.get("thread/1").await.unwrap(), Some(slash));
        assert_eq!(cp.get("thread_1").await.unwrap(), Some(underscore));
        assert_ne!(cp.path_for("a/b"), cp.path_for("a_b"));
        assert_ne!(cp.path_for("a_2fb"), cp.path_for("a/b"));
        assert_eq!(
            cp.path_for("3f2c-9a"),
            dir.path().join("3f2c-9a.json")
        );
    }

    #[tokio::test]
    async fn test_file_checkpointer_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cp = FileCheckpointer::new(dir.path().join("threads"));

        assert!(cp.get("thread/1").await.unwrap().is_none());

        let checkpoint = sample();
        cp.put(checkpoint.clone()).await.unwrap();
        let loaded = cp.get("thread/1").await.unwrap().unwrap();
        assert_eq!(loaded, checkpoint);
        assert_eq!(loaded.next, NodeId::ReadMessage);

        // overwrite leaves no temp file behind
        let mut next = checkpoint.clone();
        next.next = NodeId::End;
        next.step = 7;
        cp.put(next).await.unwrap();
        assert_eq!(cp.get("thread/1").await.unwrap().unwrap().step, 7);
        let files: Vec<_> = std::fs::read_dir(cp.dir()).unwrap().collect();
        assert_eq!(files.len(), 1);
    }

    #[tokio::test]
    async fn test_file_checkpointer_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.json"), "{not json").unwrap();
        let cp = FileCheckpointer::new(dir.path());
        assert!(cp.get("broken").await.is_err());
    }
}
