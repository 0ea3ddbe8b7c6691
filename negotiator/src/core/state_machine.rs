//! Negotiation state machine: explicit states and legal transition guards.
//!
//! The orchestration loop never decides termination on its own. It reports
//! what happened (a proposal was recorded, a review came back) and this
//! machine answers with the next state, so round accounting and the budget
//! policy can be tested without any streaming involved.
//!
//! ```text
//! Init → AwaitingProposal
//! AwaitingProposal → AwaitingReview
//! AwaitingReview → Revising | Completed
//! Revising → AwaitingProposal
//! ```

use std::fmt;
use std::num::NonZeroU32;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::core::types::{NegotiationSession, SessionStatus};

/// The set of negotiation states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NegotiationState {
    Init,
    AwaitingProposal,
    AwaitingReview,
    Revising,
    /// Terminal.
    Completed,
}

impl NegotiationState {
    pub fn is_terminal(self) -> bool {
        self == Self::Completed
    }
}

impl fmt::Display for NegotiationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => write!(f, "Init"),
            Self::AwaitingProposal => write!(f, "AwaitingProposal"),
            Self::AwaitingReview => write!(f, "AwaitingReview"),
            Self::Revising => write!(f, "Revising"),
            Self::Completed => write!(f, "Completed"),
        }
    }
}

fn is_legal_transition(from: NegotiationState, to: NegotiationState) -> bool {
    matches!(
        (from, to),
        (NegotiationState::Init, NegotiationState::AwaitingProposal)
            | (
                NegotiationState::AwaitingProposal,
                NegotiationState::AwaitingReview
            )
            | (NegotiationState::AwaitingReview, NegotiationState::Revising)
            | (NegotiationState::AwaitingReview, NegotiationState::Completed)
            | (NegotiationState::Revising, NegotiationState::AwaitingProposal)
    )
}

/// Why a negotiation reached `Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionReason {
    /// The reviewer approved the latest proposal.
    Approved,
    /// The round budget ran out before approval.
    RoundBudgetExhausted,
}

/// What the loop should do after a review is recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewOutcome {
    Revise,
    Complete(CompletionReason),
}

/// A single recorded state transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: NegotiationState,
    pub to: NegotiationState,
    /// Reviewer messages recorded at the time of the transition.
    pub round_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("illegal negotiation transition: {from} -> {to}")]
pub struct IllegalTransition {
    pub from: NegotiationState,
    pub to: NegotiationState,
}

/// The negotiation state machine. Owns the session it advances.
#[derive(Debug, Clone)]
pub struct NegotiationMachine {
    session: NegotiationSession,
    state: NegotiationState,
    max_rounds: NonZeroU32,
    completion: Option<CompletionReason>,
    transitions: Vec<TransitionRecord>,
}

impl NegotiationMachine {
    pub fn new(session: NegotiationSession, max_rounds: NonZeroU32) -> Self {
        Self {
            session,
            state: NegotiationState::Init,
            max_rounds,
            completion: None,
            transitions: Vec::new(),
        }
    }

    pub fn state(&self) -> NegotiationState {
        self.state
    }

    pub fn session(&self) -> &NegotiationSession {
        &self.session
    }

    pub fn max_rounds(&self) -> u32 {
        self.max_rounds.get()
    }

    pub fn round_count(&self) -> u32 {
        self.session.round_count
    }

    /// 1-indexed round currently being negotiated (or the last one, once completed).
    pub fn current_round(&self) -> u32 {
        if self.state.is_terminal() {
            self.session.round_count
        } else {
            self.session.round_count + 1
        }
    }

    pub fn completion(&self) -> Option<CompletionReason> {
        self.completion
    }

    pub fn transitions(&self) -> &[TransitionRecord] {
        &self.transitions
    }

    /// `Init → AwaitingProposal`; the session becomes in-progress.
    pub fn start(&mut self) -> Result<(), IllegalTransition> {
        self.advance(NegotiationState::AwaitingProposal)?;
        self.session.status = SessionStatus::InProgress;
        Ok(())
    }

    /// `AwaitingProposal → AwaitingReview`.
    pub fn proposal_recorded(&mut self) -> Result<(), IllegalTransition> {
        self.advance(NegotiationState::AwaitingReview)
    }

    /// Record a reviewer verdict and move to `Revising` or `Completed`.
    ///
    /// Every review counts as one round. Once the budget is spent the session
    /// completes even without approval.
    pub fn review_recorded(&mut self, approved: bool) -> Result<ReviewOutcome, IllegalTransition> {
        let rounds = self.session.round_count + 1;
        let outcome = if approved {
            ReviewOutcome::Complete(CompletionReason::Approved)
        } else if rounds >= self.max_rounds.get() {
            ReviewOutcome::Complete(CompletionReason::RoundBudgetExhausted)
        } else {
            ReviewOutcome::Revise
        };
        let to = match outcome {
            ReviewOutcome::Revise => NegotiationState::Revising,
            ReviewOutcome::Complete(_) => NegotiationState::Completed,
        };
        if !is_legal_transition(self.state, to) {
            return Err(IllegalTransition {
                from: self.state,
                to,
            });
        }

        self.session.round_count = rounds;
        self.advance(to)?;
        if let ReviewOutcome::Complete(reason) = outcome {
            self.session.status = SessionStatus::Completed;
            self.completion = Some(reason);
        }
        Ok(outcome)
    }

    /// `Revising → AwaitingProposal`.
    pub fn resume_proposals(&mut self) -> Result<(), IllegalTransition> {
        self.advance(NegotiationState::AwaitingProposal)
    }

    fn advance(&mut self, to: NegotiationState) -> Result<(), IllegalTransition> {
        if !is_legal_transition(self.state, to) {
            return Err(IllegalTransition {
                from: self.state,
                to,
            });
        }
        debug!(
            session_id = %self.session.id,
            from = %self.state,
            to = %to,
            round_count = self.session.round_count,
            "negotiation transition"
        );
        self.transitions.push(TransitionRecord {
            from: self.state,
            to,
            round_count: self.session.round_count,
        });
        self.state = to;
        Ok(())
    }
}
