//! Deterministic, pure logic shared by the negotiation engine.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod request;
pub mod state_machine;
pub mod types;
