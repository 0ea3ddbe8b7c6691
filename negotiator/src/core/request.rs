//! Validation of incoming negotiation requests.
//!
//! Validation happens before any session state exists, so a rejected request
//! leaves nothing behind.

use thiserror::Error;

/// Reasons a request is rejected before a stream opens.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
}

/// A validated request to start one negotiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiationRequest {
    requirement: String,
    session_id: String,
}

impl NegotiationRequest {
    /// Build a request from raw optional fields.
    ///
    /// Both fields are required; blank strings count as missing.
    pub fn new(
        requirement: Option<String>,
        session_id: Option<String>,
    ) -> Result<Self, ValidationError> {
        let requirement = require("requirement", requirement)?;
        let session_id = require("sessionId", session_id)?;
        Ok(Self {
            requirement,
            session_id,
        })
    }

    pub fn requirement(&self) -> &str {
        &self.requirement
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

fn require(name: &'static str, value: Option<String>) -> Result<String, ValidationError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ValidationError::MissingField(name)),
    }
}
