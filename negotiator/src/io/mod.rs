//! I/O ports for the negotiation engine.

pub mod config;
pub mod persistence;
pub mod recorder;
