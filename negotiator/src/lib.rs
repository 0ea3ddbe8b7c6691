//! Bounded proposer/reviewer negotiation engine.
//!
//! A negotiation alternates between a proposer and a reviewer until the reviewer
//! approves or the round budget runs out, and every observable step is exposed
//! to the caller as an ordered, lazily produced event stream. The crate keeps a
//! strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (types, request validation, the
//!   negotiation state machine). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting ports (configuration files, the persistence
//!   gateway and its per-session recorder).
//! - **[`agents`]**: The responder capability contract and the canned
//!   responders used when no real content generator is wired in.
//!
//! [`negotiation`] drives the state machine against a responder and a recorder;
//! [`session`] is the boundary that validates requests and hands out streams.

pub mod agents;
pub mod core;
pub mod io;
pub mod logging;
pub mod negotiation;
pub mod session;
pub mod templates;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
