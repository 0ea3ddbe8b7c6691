//! Canned responders: template-backed stand-ins for real content generators.
//!
//! They reproduce the placeholder behavior of the hosted demo (fixed proposal
//! texts, a reviewer that withholds approval for a configurable number of
//! rounds, simulated latency). The approval rule lives here, not in the loop.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use async_trait::async_trait;
use minijinja::context;
use tracing::debug;

use crate::agents::{PairedResponder, Responder, Response, SessionContext};
use crate::core::types::Role;
use crate::io::config::ResponderConfig;
use crate::templates;

const PROPOSALS: &[&str] = &["proposal_architecture", "proposal_services"];
const REVISIONS: &[&str] = &["revision_experience", "revision_journey"];
const REVIEWS: &[&str] = &["review_experience", "review_business"];
const APPROVAL: &str = "review_approval";

const FEEDBACK_EXCERPT_CHARS: usize = 160;

/// Proposer that answers from the bundled proposal and revision templates.
#[derive(Debug, Clone)]
pub struct CannedProposer {
    proposal_delay: Duration,
    revision_delay: Duration,
}

/// Reviewer that rejects until `approve_from_round`, then approves.
#[derive(Debug, Clone)]
pub struct CannedReviewer {
    review_delay: Duration,
    approve_from_round: u32,
}

impl CannedProposer {
    pub fn new(config: &ResponderConfig) -> Self {
        Self {
            proposal_delay: config.proposal_delay(),
            revision_delay: config.revision_delay(),
        }
    }
}

impl CannedReviewer {
    pub fn new(config: &ResponderConfig) -> Self {
        Self {
            review_delay: config.review_delay(),
            approve_from_round: config.approve_from_round,
        }
    }
}

/// Both canned roles behind one [`Responder`].
pub fn canned_responder(config: &ResponderConfig) -> PairedResponder {
    PairedResponder::new(
        Arc::new(CannedProposer::new(config)),
        Arc::new(CannedReviewer::new(config)),
    )
}

#[async_trait]
impl Responder for CannedProposer {
    async fn respond(&self, role: Role, ctx: &SessionContext<'_>) -> Result<Response> {
        if role != Role::Proposer {
            bail!("canned proposer cannot respond as {role}");
        }
        let (delay, names) = if ctx.is_revision() {
            (self.revision_delay, REVISIONS)
        } else {
            (self.proposal_delay, PROPOSALS)
        };
        simulate_latency(delay).await;

        let name = pick(names, ctx.session_id, ctx.round);
        debug!(
            session_id = %ctx.session_id,
            round = ctx.round,
            template = name,
            "canned proposal"
        );
        let content = templates::render(
            name,
            context! {
                requirement => ctx.requirement.trim(),
                round => ctx.round,
                feedback_excerpt => excerpt(ctx.input),
            },
        )?;
        Ok(Response::proposal(content))
    }
}

#[async_trait]
impl Responder for CannedReviewer {
    async fn respond(&self, role: Role, ctx: &SessionContext<'_>) -> Result<Response> {
        if role != Role::Reviewer {
            bail!("canned reviewer cannot respond as {role}");
        }
        simulate_latency(self.review_delay).await;

        let approved = ctx.round >= self.approve_from_round;
        let name = if approved {
            APPROVAL
        } else {
            let idx = (ctx.round.saturating_sub(1) as usize).min(REVIEWS.len() - 1);
            REVIEWS[idx]
        };
        debug!(
            session_id = %ctx.session_id,
            round = ctx.round,
            approved,
            "canned review"
        );
        let content = templates::render(
            name,
            context! {
                requirement => ctx.requirement.trim(),
                round => ctx.round,
            },
        )?;
        Ok(Response::verdict(content, approved))
    }
}

async fn simulate_latency(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

/// Deterministic per-session choice among equivalent templates.
fn pick(names: &[&'static str], session_id: &str, round: u32) -> &'static str {
    let seed = session_id
        .bytes()
        .fold(round as usize, |acc, b| acc.wrapping_add(b as usize));
    names[seed % names.len()]
}

fn excerpt(text: &str) -> String {
    let line = text
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or_default();
    if line.chars().count() <= FEEDBACK_EXCERPT_CHARS {
        return line.to_string();
    }
    let mut cut: String = line.chars().take(FEEDBACK_EXCERPT_CHARS).collect();
    cut.push_str("...");
    cut
}
