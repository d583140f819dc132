//! Coordination event records and canonical hashing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Kind of coordination event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    AgentStart,
    AgentAction,
    AgentComplete,
    AgentError,
    AgentHandoff,
    RoleSwitch,
}

impl EventType {
    /// Stable string form, matching the serialized representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AgentStart => "agent_start",
            Self::AgentAction => "agent_action",
            Self::AgentComplete => "agent_complete",
            Self::AgentError => "agent_error",
            Self::AgentHandoff => "agent_handoff",
            Self::RoleSwitch => "role_switch",
        }
    }
}

/// One record in the coordination event log.
///
/// Field order is the canonical serialization order; `hash` covers every
/// other field, and `prev_hash` chains to the previous record in file
/// order. The timestamp is epoch milliseconds so the canonical form has a
/// single representation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinationEvent {
    /// Unique event id
    pub id: String,
    /// Event kind
    pub event_type: EventType,
    /// Agent that produced the event
    pub agent_id: String,
    /// Role the agent held at the time
    pub role: String,
    /// Task the event relates to, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    /// Event time, epoch milliseconds
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    /// Free-form payload; key order is fixed by the map type
    #[serde(default)]
    pub payload: BTreeMap<String, serde_json::Value>,
    /// Hash of the previous record; empty for the first record
    pub prev_hash: String,
    /// Lowercase-hex SHA-256 of this record with `hash` omitted
    pub hash: String,
}

/// Mirror of `CoordinationEvent` without the hash field, used to produce
/// the canonical bytes that get hashed.
#[derive(Serialize)]
struct CanonicalEvent<'a> {
    id: &'a str,
    event_type: EventType,
    agent_id: &'a str,
    role: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    task_id: Option<&'a str>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    timestamp: DateTime<Utc>,
    payload: &'a BTreeMap<String, serde_json::Value>,
    prev_hash: &'a str,
}

impl CoordinationEvent {
    /// Compute the canonical hash of this record (hash field omitted).
    pub fn compute_hash(&self) -> String {
        let canonical = CanonicalEvent {
            id: &self.id,
            event_type: self.event_type,
            agent_id: &self.agent_id,
            role: &self.role,
            task_id: self.task_id.as_deref(),
            timestamp: self.timestamp,
            payload: &self.payload,
            prev_hash: &self.prev_hash,
        };
        let bytes = serde_json::to_vec(&canonical).expect("event serialization cannot fail");
        hex::encode(Sha256::digest(&bytes))
    }
}

/// An event not yet appended to the log.
///
/// The log fills in id, timestamp, prev-hash, and hash at append time.
#[derive(Debug, Clone)]
pub struct EventDraft {
    pub event_type: EventType,
    pub agent_id: String,
    pub role: String,
    pub task_id: Option<String>,
    pub payload: BTreeMap<String, serde_json::Value>,
}

impl EventDraft {
    /// Create a draft with an empty payload.
    pub fn new(event_type: EventType, agent_id: &str, role: &str) -> Self {
        Self {
            event_type,
            agent_id: agent_id.to_string(),
            role: role.to_string(),
            task_id: None,
            payload: BTreeMap::new(),
        }
    }

    /// Attach a task id.
    pub fn with_task(mut self, task_id: &str) -> Self {
        self.task_id = Some(task_id.to_string());
        self
    }

    /// Add a payload entry.
    pub fn with_payload(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.payload.insert(key.to_string(), value.into());
        self
    }
}
