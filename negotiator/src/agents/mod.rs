//! Responder capability: the pluggable content producer behind each role.
//!
//! The [`Responder`] trait decouples the negotiation loop from however content
//! is actually generated. The loop calls it once per step and never retries;
//! retry policy, if any, belongs to the implementation. Tests use scripted
//! responders that return predetermined replies.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::core::types::{NegotiationMessage, Role};

pub mod canned;

/// What a responder sees when it is asked to speak.
#[derive(Debug, Clone, Copy)]
pub struct SessionContext<'a> {
    pub session_id: &'a str,
    pub requirement: &'a str,
    /// 1-indexed round being negotiated.
    pub round: u32,
    /// Role-specific input: the requirement for the first proposal, the latest
    /// reviewer feedback for revisions, the latest proposal for reviews.
    pub input: &'a str,
    /// Messages emitted so far, in causal order.
    pub history: &'a [NegotiationMessage],
}

impl<'a> SessionContext<'a> {
    /// Most recent message produced by `role`.
    pub fn latest_from(&self, role: Role) -> Option<&'a NegotiationMessage> {
        self.history.iter().rev().find(|m| m.role == role)
    }

    pub fn is_revision(&self) -> bool {
        self.round > 1
    }
}

/// A responder's reply.
///
/// `approved` must be set on every reviewer reply; the loop reports a missing
/// verdict as a contract violation rather than assuming rejection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub content: String,
    pub approved: Option<bool>,
}

impl Response {
    pub fn proposal(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            approved: None,
        }
    }

    pub fn verdict(content: impl Into<String>, approved: bool) -> Self {
        Self {
            content: content.into(),
            approved: Some(approved),
        }
    }
}

/// Abstraction over content generation for both negotiation roles.
#[async_trait]
pub trait Responder: Send + Sync {
    /// Produce the next message for `role`. May be slow; is a suspension point.
    async fn respond(&self, role: Role, context: &SessionContext<'_>) -> Result<Response>;
}

/// Routes each role to its own responder implementation.
#[derive(Clone)]
pub struct PairedResponder {
    proposer: Arc<dyn Responder>,
    reviewer: Arc<dyn Responder>,
}

impl PairedResponder {
    pub fn new(proposer: Arc<dyn Responder>, reviewer: Arc<dyn Responder>) -> Self {
        Self { proposer, reviewer }
    }
}

#[async_trait]
impl Responder for PairedResponder {
    async fn respond(&self, role: Role, context: &SessionContext<'_>) -> Result<Response> {
        match role {
            Role::Proposer => self.proposer.respond(role, context).await,
            Role::Reviewer => self.reviewer.respond(role, context).await,
        }
    }
}
