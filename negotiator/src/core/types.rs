//! Shared deterministic types for the negotiation core.
//!
//! These types define the stable contracts between the loop, the responders,
//! the persistence port and the event stream. Their serde shapes are the wire
//! format consumed by clients, so field names must not drift.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which side of the negotiation produced a message.
///
/// On the wire the proposer is `"swe"` and the reviewer is `"pm"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "swe")]
    Proposer,
    #[serde(rename = "pm")]
    Reviewer,
}

impl Role {
    /// Wire name used in event payloads and persistence records.
    pub fn wire_name(self) -> &'static str {
        match self {
            Self::Proposer => "swe",
            Self::Reviewer => "pm",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Proposer => write!(f, "proposer"),
            Self::Reviewer => write!(f, "reviewer"),
        }
    }
}

/// Lifecycle of a negotiation session. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionStatus {
    Pending,
    InProgress,
    Completed,
}

/// One bounded negotiation instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NegotiationSession {
    pub id: String,
    pub requirement: String,
    pub status: SessionStatus,
    /// Number of reviewer messages emitted so far.
    pub round_count: u32,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

impl NegotiationSession {
    pub fn new(id: impl Into<String>, requirement: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            requirement: requirement.into(),
            status: SessionStatus::Pending,
            round_count: 0,
            created_at: Utc::now(),
        }
    }
}

/// A single immutable message in a session's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NegotiationMessage {
    pub id: String,
    #[serde(rename = "agent")]
    pub role: Role,
    pub content: String,
    #[serde(rename = "timestamp", with = "timestamp")]
    pub created_at: DateTime<Utc>,
    /// Present on reviewer messages only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved: Option<bool>,
}

impl NegotiationMessage {
    pub fn proposal(content: impl Into<String>) -> Self {
        Self::new(Role::Proposer, content.into(), None)
    }

    pub fn review(content: impl Into<String>, approved: bool) -> Self {
        Self::new(Role::Reviewer, content.into(), Some(approved))
    }

    fn new(role: Role, content: String, approved: Option<bool>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content,
            created_at: Utc::now(),
            approved,
        }
    }
}

/// The externally observable unit of a negotiation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NegotiationEvent {
    Message { message: NegotiationMessage },
    Complete { result: String },
    Error { detail: String },
}

impl NegotiationEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Message { .. })
    }

    pub fn message(&self) -> Option<&NegotiationMessage> {
        match self {
            Self::Message { message } => Some(message),
            _ => None,
        }
    }
}

/// ISO 8601 timestamps with millisecond precision, as browsers emit them.
pub(crate) mod timestamp {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn fixed_message(role: Role, approved: Option<bool>) -> NegotiationMessage {
        NegotiationMessage {
            id: "m-1".to_string(),
            role,
            content: "body".to_string(),
            created_at: Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap(),
            approved,
        }
    }

    #[test]
    fn proposer_message_event_omits_approved() {
        let event = NegotiationEvent::Message {
            message: fixed_message(Role::Proposer, None),
        };
        let value = serde_json::to_value(&event).expect("serialize");
        assert_eq!(
            value,
            json!({
                "type": "message",
                "message": {
                    "id": "m-1",
                    "agent": "swe",
                    "content": "body",
                    "timestamp": "2025-01-02T03:04:05.000Z"
                }
            })
        );
    }

    #[test]
    fn reviewer_message_event_carries_approved() {
        let event = NegotiationEvent::Message {
            message: fixed_message(Role::Reviewer, Some(false)),
        };
        let value = serde_json::to_value(&event).expect("serialize");
        assert_eq!(value["message"]["agent"], "pm");
        assert_eq!(value["message"]["approved"], false);
    }

    #[test]
    fn complete_and_error_events_use_type_tag() {
        let complete = serde_json::to_value(NegotiationEvent::Complete {
            result: "done".to_string(),
        })
        .expect("serialize");
        assert_eq!(complete, json!({"type": "complete", "result": "done"}));

        let error = serde_json::to_value(NegotiationEvent::Error {
            detail: "boom".to_string(),
        })
        .expect("serialize");
        assert_eq!(error, json!({"type": "error", "detail": "boom"}));
    }

    #[test]
    fn message_event_parses_back_from_wire() {
        let raw = concat!(
            r#"{"type":"message","message":{"id":"x","agent":"pm","content":"ok","#,
            r#""timestamp":"2025-01-02T03:04:05.000Z","approved":true}}"#,
        );
        let event: NegotiationEvent = serde_json::from_str(raw).expect("parse");
        let message = event.message().expect("message event");
        assert_eq!(message.role, Role::Reviewer);
        assert_eq!(message.approved, Some(true));
        assert!(!event.is_terminal());
    }

    #[test]
    fn session_status_orders_forward() {
        assert!(SessionStatus::Pending < SessionStatus::InProgress);
        assert!(SessionStatus::InProgress < SessionStatus::Completed);
        assert_eq!(
            serde_json::to_value(SessionStatus::InProgress).expect("serialize"),
            json!("in-progress")
        );
    }

    #[test]
    fn new_messages_get_distinct_ids() {
        let a = NegotiationMessage::proposal("a");
        let b = NegotiationMessage::proposal("a");
        assert_ne!(a.id, b.id);
        assert_eq!(a.approved, None);
        assert_eq!(NegotiationMessage::review("r", true).approved, Some(true));
    }
}
