//! Session boundary: turns raw requests into negotiation streams.
//!
//! The boundary validates input, leases the session id so at most one
//! negotiation owns it at a time, wires a recorder against the shared
//! persistence gateway and hands back the event stream. Dropping the stream
//! releases the lease.

use std::collections::HashSet;
use std::num::NonZeroU32;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};

use futures::Stream;
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::agents::Responder;
use crate::core::request::{NegotiationRequest, ValidationError};
use crate::core::types::NegotiationEvent;
use crate::io::persistence::PersistenceGateway;
use crate::io::recorder::{PersistenceStats, PersistenceStatsSnapshot, SessionRecorder};
use crate::negotiation::{EventStream, NegotiationRun};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error("session `{0}` already has a negotiation in progress")]
    AlreadyActive(String),
}

/// Counters exposed by the stats endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BoundaryStats {
    pub sessions_started: u64,
    pub active_sessions: u64,
    pub records_written: u64,
    pub persistence_failures: u64,
}

type ActiveSet = Arc<Mutex<HashSet<String>>>;

pub struct SessionBoundary {
    responder: Arc<dyn Responder>,
    gateway: Arc<dyn PersistenceGateway>,
    persistence: Arc<PersistenceStats>,
    max_rounds: NonZeroU32,
    shutdown: CancellationToken,
    active: ActiveSet,
    sessions_started: AtomicU64,
}

impl SessionBoundary {
    pub fn new(
        responder: Arc<dyn Responder>,
        gateway: Arc<dyn PersistenceGateway>,
        max_rounds: NonZeroU32,
    ) -> Self {
        Self {
            responder,
            gateway,
            persistence: Arc::new(PersistenceStats::default()),
            max_rounds,
            shutdown: CancellationToken::new(),
            active: Arc::default(),
            sessions_started: AtomicU64::new(0),
        }
    }

    /// Cancel every session opened through this boundary when `token` fires.
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub fn max_rounds(&self) -> NonZeroU32 {
        self.max_rounds
    }

    pub fn stats(&self) -> BoundaryStats {
        let PersistenceStatsSnapshot {
            records_written,
            failures,
        } = self.persistence.snapshot();
        BoundaryStats {
            sessions_started: self.sessions_started.load(Ordering::Relaxed),
            active_sessions: lock(&self.active).len() as u64,
            records_written,
            persistence_failures: failures,
        }
    }

    /// Validate raw fields and start a negotiation.
    ///
    /// Must be called from within a tokio runtime: the session's recorder task
    /// is spawned here.
    pub fn open(
        &self,
        requirement: Option<String>,
        session_id: Option<String>,
    ) -> Result<EventStream, SessionError> {
        let request = NegotiationRequest::new(requirement, session_id)?;
        self.open_request(&request)
    }

    #[instrument(skip_all, fields(session_id = %request.session_id()))]
    pub fn open_request(&self, request: &NegotiationRequest) -> Result<EventStream, SessionError> {
        let lease = SessionLease::acquire(&self.active, request.session_id())
            .ok_or_else(|| SessionError::AlreadyActive(request.session_id().to_string()))?;

        let (recorder, _drain) = SessionRecorder::spawn(
            request.session_id(),
            self.gateway.clone(),
            self.persistence.clone(),
        );
        let events = NegotiationRun::new(request, self.max_rounds, self.responder.clone(), recorder)
            .with_cancellation(self.shutdown.child_token())
            .into_stream();

        let started = self.sessions_started.fetch_add(1, Ordering::Relaxed) + 1;
        info!(sessions_started = started, "session opened");
        Ok(Box::pin(LeasedStream {
            inner: events,
            _lease: lease,
        }))
    }
}

fn lock(active: &ActiveSet) -> MutexGuard<'_, HashSet<String>> {
    active.lock().unwrap_or_else(|e| e.into_inner())
}

/// Exclusive claim on a session id, released on drop.
struct SessionLease {
    active: ActiveSet,
    session_id: String,
}

impl SessionLease {
    fn acquire(active: &ActiveSet, session_id: &str) -> Option<Self> {
        if !lock(active).insert(session_id.to_string()) {
            return None;
        }
        Some(Self {
            active: active.clone(),
            session_id: session_id.to_string(),
        })
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        lock(&self.active).remove(&self.session_id);
    }
}

struct LeasedStream {
    inner: EventStream,
    _lease: SessionLease,
}

impl Stream for LeasedStream {
    type Item = NegotiationEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::persistence::InMemoryGateway;
    use crate::test_support::{PendingResponder, ScriptedResponder, collect_events, rounds};
    use futures::StreamExt;

    fn boundary(responder: Arc<dyn Responder>) -> SessionBoundary {
        SessionBoundary::new(responder, Arc::new(InMemoryGateway::new()), rounds(4))
    }

    fn open(b: &SessionBoundary, session_id: &str) -> EventStream {
        b.open(Some("req".into()), Some(session_id.into())).expect("open")
    }

    #[tokio::test]
    async fn blank_fields_are_rejected_before_anything_starts() {
        let b = boundary(Arc::new(ScriptedResponder::rounds(&[true])));
        let err = b
            .open(Some("  ".into()), Some("s-1".into()))
            .err()
            .expect("invalid");
        assert!(matches!(
            err,
            SessionError::Invalid(ValidationError::MissingField("requirement"))
        ));
        let err = b.open(Some("req".into()), None).err().expect("invalid");
        assert!(matches!(
            err,
            SessionError::Invalid(ValidationError::MissingField("sessionId"))
        ));
        assert_eq!(b.stats().sessions_started, 0);
    }

    #[tokio::test]
    async fn duplicate_active_session_is_rejected_until_stream_drops() {
        let b = boundary(Arc::new(PendingResponder));
        let first = open(&b, "s-1");
        assert_eq!(b.stats().active_sessions, 1);

        let err = b
            .open(Some("req".into()), Some("s-1".into()))
            .err()
            .expect("conflict");
        assert!(matches!(err, SessionError::AlreadyActive(ref id) if id == "s-1"));

        let other = open(&b, "s-2");
        assert_eq!(b.stats().active_sessions, 2);

        drop(first);
        drop(other);
        assert_eq!(b.stats().active_sessions, 0);
        let _reopened = open(&b, "s-1");
        assert_eq!(b.stats().sessions_started, 3);
    }

    #[tokio::test]
    async fn finished_session_id_can_be_reused() {
        let b = boundary(Arc::new(ScriptedResponder::rounds(&[true, true])));
        let events = collect_events(open(&b, "s-1")).await;
        assert_eq!(events.len(), 3);
        let again = collect_events(open(&b, "s-1")).await;
        assert_eq!(again.len(), 3);
    }

    #[tokio::test]
    async fn shutdown_ends_streams_without_completion() {
        let shutdown = CancellationToken::new();
        let b = boundary(Arc::new(PendingResponder)).with_shutdown(shutdown.clone());
        let mut events = open(&b, "s-1");

        shutdown.cancel();
        assert_eq!(events.next().await, None);
    }

    #[tokio::test]
    async fn stats_include_persistence_counters() {
        let gateway = Arc::new(InMemoryGateway::new());
        let b = SessionBoundary::new(
            Arc::new(ScriptedResponder::rounds(&[true])),
            gateway.clone(),
            rounds(4),
        );
        let events = collect_events(open(&b, "s-1")).await;
        assert_eq!(events.len(), 3);

        // Session start, two messages, session completion.
        for _ in 0..50 {
            if b.stats().records_written == 4 {
                break;
            }
            tokio::task::yield_now().await;
        }
        let stats = b.stats();
        assert_eq!(stats.records_written, 4);
        assert_eq!(stats.persistence_failures, 0);
        assert_eq!(gateway.records().len(), 4);
    }
}
