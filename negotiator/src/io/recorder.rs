//! Fire-and-forget recording of one session's records.
//!
//! The loop hands records to a [`SessionRecorder`] without waiting. A
//! background task drains them into the gateway one at a time, which keeps a
//! session's records in causal order while never blocking the negotiation.
//! Failures are logged and counted in [`PersistenceStats`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::core::types::{NegotiationMessage, NegotiationSession};
use crate::io::persistence::{MessageRecord, PersistenceGateway, PersistenceRecord, SessionRecord};

/// Counters shared by every recorder of a process.
#[derive(Debug, Default)]
pub struct PersistenceStats {
    records_written: AtomicU64,
    failures: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PersistenceStatsSnapshot {
    pub records_written: u64,
    pub failures: u64,
}

impl PersistenceStats {
    pub fn snapshot(&self) -> PersistenceStatsSnapshot {
        PersistenceStatsSnapshot {
            records_written: self.records_written.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

/// Handle the loop uses to queue records for its session.
#[derive(Debug, Clone)]
pub struct SessionRecorder {
    session_id: String,
    tx: mpsc::UnboundedSender<PersistenceRecord>,
}

impl SessionRecorder {
    /// Spawn the drain task for `session_id`.
    ///
    /// The task ends once every recorder clone is dropped and the queue is
    /// empty; awaiting the handle waits for all queued writes.
    pub fn spawn(
        session_id: &str,
        gateway: Arc<dyn PersistenceGateway>,
        stats: Arc<PersistenceStats>,
    ) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<PersistenceRecord>();
        let task_session_id = session_id.to_string();
        let handle = tokio::spawn(async move {
            while let Some(record) = rx.recv().await {
                match gateway.append(&record).await {
                    Ok(()) => {
                        stats.records_written.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(err) => {
                        stats.failures.fetch_add(1, Ordering::Relaxed);
                        warn!(
                            session_id = %task_session_id,
                            record = record_kind(&record),
                            error = %format!("{err:#}"),
                            "persistence write failed"
                        );
                    }
                }
            }
            debug!(session_id = %task_session_id, "recorder drained");
        });
        (
            Self {
                session_id: session_id.to_string(),
                tx,
            },
            handle,
        )
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn record_session(&self, session: &NegotiationSession) {
        self.enqueue(PersistenceRecord::Session(SessionRecord::from(session)));
    }

    pub fn record_message(&self, message: &NegotiationMessage) {
        self.enqueue(PersistenceRecord::Message(MessageRecord::new(
            &self.session_id,
            message,
        )));
    }

    fn enqueue(&self, record: PersistenceRecord) {
        if self.tx.send(record).is_err() {
            warn!(session_id = %self.session_id, "recorder task gone, record dropped");
        }
    }
}

fn record_kind(record: &PersistenceRecord) -> &'static str {
    match record {
        PersistenceRecord::Session(_) => "session",
        PersistenceRecord::Message(_) => "message",
    }
}
