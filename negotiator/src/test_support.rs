//! Test-only responders, gateways and stream helpers.

use std::collections::VecDeque;
use std::num::NonZeroU32;
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use tempfile::TempDir;

use crate::agents::{Responder, Response, SessionContext};
use crate::core::types::{NegotiationEvent, Role};
use crate::io::persistence::{JsonlGateway, MessageRecord, PersistenceGateway, SessionRecord};

/// One queued reply of a [`ScriptedResponder`].
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Reply(Response),
    Fail(String),
}

/// What a [`ScriptedResponder`] was asked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptedCall {
    pub role: Role,
    pub round: u32,
    pub input: String,
    pub history_len: usize,
}

/// Responder that answers from a fixed queue regardless of role and records
/// every call it receives.
#[derive(Debug, Default)]
pub struct ScriptedResponder {
    replies: Mutex<VecDeque<ScriptedReply>>,
    calls: Mutex<Vec<ScriptedCall>>,
}

impl ScriptedResponder {
    pub fn new(replies: Vec<ScriptedReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// One proposal followed by one review per entry in `verdicts`.
    ///
    /// Round `n` produces `"proposal n"` and `"review n"`.
    pub fn rounds(verdicts: &[bool]) -> Self {
        let replies = verdicts
            .iter()
            .enumerate()
            .flat_map(|(idx, &approved)| {
                let round = idx + 1;
                [
                    ScriptedReply::Reply(Response::proposal(format!("proposal {round}"))),
                    ScriptedReply::Reply(Response::verdict(format!("review {round}"), approved)),
                ]
            })
            .collect();
        Self::new(replies)
    }

    pub fn calls(&self) -> Vec<ScriptedCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl Responder for ScriptedResponder {
    async fn respond(&self, role: Role, ctx: &SessionContext<'_>) -> Result<Response> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(ScriptedCall {
                role,
                round: ctx.round,
                input: ctx.input.to_string(),
                history_len: ctx.history.len(),
            });
        let next = self
            .replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        match next {
            Some(ScriptedReply::Reply(response)) => Ok(response),
            Some(ScriptedReply::Fail(message)) => Err(anyhow!(message)),
            None => bail!("scripted responder exhausted"),
        }
    }
}

/// Responder whose calls never resolve.
#[derive(Debug, Clone, Copy, Default)]
pub struct PendingResponder;

#[async_trait]
impl Responder for PendingResponder {
    async fn respond(&self, _role: Role, _ctx: &SessionContext<'_>) -> Result<Response> {
        std::future::pending().await
    }
}

/// Gateway that rejects every write.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingGateway;

#[async_trait]
impl PersistenceGateway for FailingGateway {
    async fn append_session(&self, _record: &SessionRecord) -> Result<()> {
        bail!("gateway unavailable")
    }

    async fn append_message(&self, _record: &MessageRecord) -> Result<()> {
        bail!("gateway unavailable")
    }
}

/// JSONL gateway rooted in a fresh temporary directory.
///
/// Keep the returned [`TempDir`] alive for as long as the gateway is used.
pub fn temp_jsonl_gateway() -> (TempDir, Arc<JsonlGateway>) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let gateway = Arc::new(JsonlGateway::new(dir.path()));
    (dir, gateway)
}

/// Drain a negotiation stream to completion.
pub async fn collect_events<S>(stream: S) -> Vec<NegotiationEvent>
where
    S: Stream<Item = NegotiationEvent>,
{
    stream.collect().await
}

/// Shorthand for a non-zero round budget in tests.
pub fn rounds(n: u32) -> NonZeroU32 {
    NonZeroU32::new(n).expect("round budget must be non-zero")
}
