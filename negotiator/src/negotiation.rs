//! Orchestration loop for a single negotiation.
//!
//! [`NegotiationRun`] owns the session, its message history and the state
//! machine. Each call to [`NegotiationRun::next_event`] advances the machine
//! until exactly one observable event is produced, so a consumer pulling the
//! stream sees step N before step N+1 starts executing.
//!
//! Nothing happens until the first pull: the session record is written when
//! the run leaves `Init`, not when the run is created.
//!
//! The run stops after a `complete` event, after an `error` event, or silently
//! when its cancellation token fires. Dropping the stream drops the run, which
//! also stops any further responder calls.

use std::num::NonZeroU32;
use std::pin::Pin;
use std::sync::Arc;

use futures::stream::{self, Stream};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::agents::{Responder, Response, SessionContext};
use crate::core::request::NegotiationRequest;
use crate::core::state_machine::{
    CompletionReason, IllegalTransition, NegotiationMachine, NegotiationState,
};
use crate::core::types::{NegotiationEvent, NegotiationMessage, NegotiationSession, Role};
use crate::io::recorder::SessionRecorder;
use crate::templates;

/// Events of one negotiation, produced lazily as the consumer polls.
pub type EventStream = Pin<Box<dyn Stream<Item = NegotiationEvent> + Send>>;

/// Why a run halted without completing.
#[derive(Debug, Error)]
pub enum NegotiationError {
    #[error("{role} responder failed: {message}")]
    Responder { role: Role, message: String },
    #[error("reviewer response is missing the approval decision")]
    MissingApproval,
    #[error("negotiation cancelled")]
    Cancelled,
    #[error(transparent)]
    Transition(#[from] IllegalTransition),
    #[error("build completion summary: {0}")]
    Summary(String),
}

/// One negotiation in flight.
pub struct NegotiationRun {
    machine: NegotiationMachine,
    responder: Arc<dyn Responder>,
    recorder: SessionRecorder,
    cancel: CancellationToken,
    history: Vec<NegotiationMessage>,
    finished: bool,
}

impl NegotiationRun {
    pub fn new(
        request: &NegotiationRequest,
        max_rounds: NonZeroU32,
        responder: Arc<dyn Responder>,
        recorder: SessionRecorder,
    ) -> Self {
        let session = NegotiationSession::new(request.session_id(), request.requirement());
        Self {
            machine: NegotiationMachine::new(session, max_rounds),
            responder,
            recorder,
            cancel: CancellationToken::new(),
            history: Vec::new(),
            finished: false,
        }
    }

    /// Stop the run when `cancel` fires, aborting an in-flight responder call.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn session(&self) -> &NegotiationSession {
        self.machine.session()
    }

    pub fn state(&self) -> NegotiationState {
        self.machine.state()
    }

    pub fn history(&self) -> &[NegotiationMessage] {
        &self.history
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Advance until the next observable event. `None` once the run is over.
    pub async fn next_event(&mut self) -> Option<NegotiationEvent> {
        if self.finished {
            return None;
        }
        match self.advance().await {
            Ok(event) => {
                if event.is_terminal() {
                    self.finished = true;
                }
                Some(event)
            }
            Err(NegotiationError::Cancelled) => {
                self.finished = true;
                info!(
                    round_count = self.machine.round_count(),
                    "negotiation cancelled"
                );
                None
            }
            Err(err) => {
                self.finished = true;
                warn!(
                    state = %self.machine.state(),
                    round_count = self.machine.round_count(),
                    error = %err,
                    "negotiation halted"
                );
                Some(NegotiationEvent::Error {
                    detail: err.to_string(),
                })
            }
        }
    }

    /// Turn the run into a lazily polled event stream.
    pub fn into_stream(self) -> EventStream {
        let span = info_span!("negotiation", session_id = %self.session().id);
        Box::pin(stream::unfold(self, move |mut run| {
            let span = span.clone();
            async move { run.next_event().await.map(|event| (event, run)) }.instrument(span)
        }))
    }

    async fn advance(&mut self) -> Result<NegotiationEvent, NegotiationError> {
        loop {
            match self.machine.state() {
                NegotiationState::Init => {
                    self.machine.start()?;
                    self.recorder.record_session(self.machine.session());
                    info!(
                        max_rounds = self.machine.max_rounds(),
                        "negotiation started"
                    );
                }
                NegotiationState::AwaitingProposal => {
                    let response = self.invoke(Role::Proposer).await?;
                    if response.approved.is_some() {
                        debug!("ignoring approval flag on proposer response");
                    }
                    self.machine.proposal_recorded()?;
                    return Ok(self.emit(NegotiationMessage::proposal(response.content)));
                }
                NegotiationState::AwaitingReview => {
                    let response = self.invoke(Role::Reviewer).await?;
                    let approved = response
                        .approved
                        .ok_or(NegotiationError::MissingApproval)?;
                    let outcome = self.machine.review_recorded(approved)?;
                    debug!(
                        round_count = self.machine.round_count(),
                        approved,
                        ?outcome,
                        "review recorded"
                    );
                    return Ok(self.emit(NegotiationMessage::review(response.content, approved)));
                }
                NegotiationState::Revising => self.machine.resume_proposals()?,
                NegotiationState::Completed => return self.complete(),
            }
        }
    }

    async fn invoke(&self, role: Role) -> Result<Response, NegotiationError> {
        let session = self.machine.session();
        let input = match role {
            Role::Proposer => self.latest_content(Role::Reviewer),
            Role::Reviewer => self.latest_content(Role::Proposer),
        }
        .unwrap_or(&session.requirement);
        let ctx = SessionContext {
            session_id: &session.id,
            requirement: &session.requirement,
            round: self.machine.current_round(),
            input,
            history: &self.history,
        };
        debug!(%role, round = ctx.round, "invoking responder");

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(NegotiationError::Cancelled),
            result = self.responder.respond(role, &ctx) => {
                result.map_err(|err| NegotiationError::Responder {
                    role,
                    message: format!("{err:#}"),
                })
            }
        }
    }

    fn latest_content(&self, role: Role) -> Option<&str> {
        self.history
            .iter()
            .rev()
            .find(|m| m.role == role)
            .map(|m| m.content.as_str())
    }

    fn emit(&mut self, message: NegotiationMessage) -> NegotiationEvent {
        self.recorder.record_message(&message);
        self.history.push(message.clone());
        NegotiationEvent::Message { message }
    }

    fn complete(&mut self) -> Result<NegotiationEvent, NegotiationError> {
        let reason = self
            .machine
            .completion()
            .unwrap_or(CompletionReason::RoundBudgetExhausted);
        let session = self.machine.session();
        let result = templates::render_summary(&session.requirement, session.round_count, reason)
            .map_err(|err| NegotiationError::Summary(format!("{err:#}")))?;
        self.recorder.record_session(session);
        info!(
            round_count = session.round_count,
            ?reason,
            "negotiation completed"
        );
        Ok(NegotiationEvent::Complete { result })
    }
}

/// Start a fresh negotiation and return its event stream.
///
/// Each call is an independent session; the stream is finite (at most
/// `2 * max_rounds + 1` events) and cannot be restarted.
pub fn run_negotiation(
    request: &NegotiationRequest,
    responder: Arc<dyn Responder>,
    recorder: SessionRecorder,
    max_rounds: NonZeroU32,
) -> EventStream {
    NegotiationRun::new(request, max_rounds, responder, recorder).into_stream()
}
