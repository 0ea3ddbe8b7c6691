//! Persistence gateway: the append-only sink for session and message records.
//!
//! The engine only ever appends. Implementations must accept concurrent
//! appends from many sessions without interleaving partial records.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::core::types::{NegotiationMessage, NegotiationSession, Role, SessionStatus};

/// Session row: written when a session starts and again when it completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub requirement: String,
    pub status: SessionStatus,
    #[serde(with = "crate::core::types::timestamp")]
    pub created_at: DateTime<Utc>,
}

impl From<&NegotiationSession> for SessionRecord {
    fn from(session: &NegotiationSession) -> Self {
        Self {
            id: session.id.clone(),
            requirement: session.requirement.clone(),
            status: session.status,
            created_at: session.created_at,
        }
    }
}

/// Message row: one per emitted message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub session_id: String,
    pub agent: Role,
    pub content: String,
    /// Always `false` for proposer messages.
    pub approved: bool,
    #[serde(with = "crate::core::types::timestamp")]
    pub created_at: DateTime<Utc>,
}

impl MessageRecord {
    pub fn new(session_id: &str, message: &NegotiationMessage) -> Self {
        Self {
            session_id: session_id.to_string(),
            agent: message.role,
            content: message.content.clone(),
            approved: message.approved.unwrap_or(false),
            created_at: message.created_at,
        }
    }
}

/// A record queued for the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistenceRecord {
    Session(SessionRecord),
    Message(MessageRecord),
}

/// Append-only storage port.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    async fn append_session(&self, record: &SessionRecord) -> Result<()>;

    async fn append_message(&self, record: &MessageRecord) -> Result<()>;

    async fn append(&self, record: &PersistenceRecord) -> Result<()> {
        match record {
            PersistenceRecord::Session(r) => self.append_session(r).await,
            PersistenceRecord::Message(r) => self.append_message(r).await,
        }
    }
}

/// Gateway that keeps every record in memory, in append order.
#[derive(Debug, Default)]
pub struct InMemoryGateway {
    records: Mutex<Vec<PersistenceRecord>>,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all records appended so far.
    pub fn records(&self) -> Vec<PersistenceRecord> {
        self.lock().clone()
    }

    pub fn sessions(&self) -> Vec<SessionRecord> {
        self.lock()
            .iter()
            .filter_map(|r| match r {
                PersistenceRecord::Session(s) => Some(s.clone()),
                PersistenceRecord::Message(_) => None,
            })
            .collect()
    }

    pub fn messages(&self) -> Vec<MessageRecord> {
        self.lock()
            .iter()
            .filter_map(|r| match r {
                PersistenceRecord::Message(m) => Some(m.clone()),
                PersistenceRecord::Session(_) => None,
            })
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<PersistenceRecord>> {
        // A poisoned lock still holds a consistent Vec: pushes cannot panic halfway.
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl PersistenceGateway for InMemoryGateway {
    async fn append_session(&self, record: &SessionRecord) -> Result<()> {
        self.lock().push(PersistenceRecord::Session(record.clone()));
        Ok(())
    }

    async fn append_message(&self, record: &MessageRecord) -> Result<()> {
        self.lock().push(PersistenceRecord::Message(record.clone()));
        Ok(())
    }
}

/// Gateway appending JSON lines to `sessions.jsonl` and `messages.jsonl`.
#[derive(Debug)]
pub struct JsonlGateway {
    sessions_path: PathBuf,
    messages_path: PathBuf,
    // Serializes appends so concurrent sessions never interleave lines.
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonlGateway {
    pub fn new(dir: &Path) -> Self {
        Self {
            sessions_path: dir.join("sessions.jsonl"),
            messages_path: dir.join("messages.jsonl"),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn sessions_path(&self) -> &Path {
        &self.sessions_path
    }

    pub fn messages_path(&self) -> &Path {
        &self.messages_path
    }

    async fn append_line<T: Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        let mut line = serde_json::to_string(value).context("serialize record")?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        let parent = path
            .parent()
            .ok_or_else(|| anyhow!("record path missing parent {}", path.display()))?;
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("create directory {}", parent.display()))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .with_context(|| format!("open {}", path.display()))?;
        file.write_all(line.as_bytes())
            .await
            .with_context(|| format!("append {}", path.display()))?;
        file.flush()
            .await
            .with_context(|| format!("flush {}", path.display()))?;
        debug!(path = %path.display(), bytes = line.len(), "appended record");
        Ok(())
    }
}

#[async_trait]
impl PersistenceGateway for JsonlGateway {
    async fn append_session(&self, record: &SessionRecord) -> Result<()> {
        self.append_line(&self.sessions_path, record).await
    }

    async fn append_message(&self, record: &MessageRecord) -> Result<()> {
        self.append_line(&self.messages_path, record).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_record(status: SessionStatus) -> SessionRecord {
        SessionRecord::from(&NegotiationSession {
            status,
            ..NegotiationSession::new("s-1", "requirement")
        })
    }

    #[tokio::test]
    async fn in_memory_keeps_append_order() {
        let gateway = InMemoryGateway::new();
        let proposal = NegotiationMessage::proposal("p");
        gateway
            .append(&PersistenceRecord::Session(session_record(
                SessionStatus::InProgress,
            )))
            .await
            .expect("session");
        gateway
            .append(&PersistenceRecord::Message(MessageRecord::new("s-1", &proposal)))
            .await
            .expect("message");

        let records = gateway.records();
        assert_eq!(records.len(), 2);
        assert!(matches!(records[0], PersistenceRecord::Session(_)));
        assert_eq!(gateway.messages()[0].content, "p");
        assert!(!gateway.messages()[0].approved);
    }

    #[tokio::test]
    async fn jsonl_appends_one_line_per_record() {
        let temp = tempfile::tempdir().expect("tempdir");
        let gateway = JsonlGateway::new(&temp.path().join("records"));

        gateway
            .append_session(&session_record(SessionStatus::InProgress))
            .await
            .expect("append");
        gateway
            .append_session(&session_record(SessionStatus::Completed))
            .await
            .expect("append");
        let review = NegotiationMessage::review("looks good", true);
        gateway
            .append_message(&MessageRecord::new("s-1", &review))
            .await
            .expect("append");

        let sessions = std::fs::read_to_string(gateway.sessions_path()).expect("read");
        let lines: Vec<&str> = sessions.lines().collect();
        assert_eq!(lines.len(), 2);
        let last: SessionRecord = serde_json::from_str(lines[1]).expect("parse");
        assert_eq!(last.status, SessionStatus::Completed);

        let messages = std::fs::read_to_string(gateway.messages_path()).expect("read");
        let value: serde_json::Value = serde_json::from_str(messages.trim()).expect("parse");
        assert_eq!(value["agent"], "pm");
        assert_eq!(value["approved"], true);
        assert_eq!(value["session_id"], "s-1");
    }
}
