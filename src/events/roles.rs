//! Agent role tracking and assignment.
//!
//! Each agent holds exactly one role at a time. Roles carry a capability
//! set used by dispatchers; assignment routes on the task type and the
//! `specialty` metadata key, and review work completed by the same agent is
//! detected as self-review.

use super::types::{CoordinationEvent, EventDraft, EventType};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

/// Role an agent can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Implementer,
    Reviewer,
    Coordinator,
    Specialist,
}

impl Role {
    /// Stable string form, matching the serialized representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Implementer => "implementer",
            Self::Reviewer => "reviewer",
            Self::Coordinator => "coordinator",
            Self::Specialist => "specialist",
        }
    }

    /// Capability set for this role.
    pub fn capabilities(&self) -> RoleCapabilities {
        match self {
            Self::Implementer => RoleCapabilities {
                can_execute: true,
                can_review: false,
                can_dispatch: false,
                specialties: vec![],
            },
            Self::Reviewer => RoleCapabilities {
                can_execute: false,
                can_review: true,
                can_dispatch: false,
                specialties: vec![],
            },
            Self::Coordinator => RoleCapabilities {
                can_execute: false,
                can_review: true,
                can_dispatch: true,
                specialties: vec![],
            },
            Self::Specialist => RoleCapabilities {
                can_execute: true,
                can_review: true,
                can_dispatch: false,
                specialties: vec!["security".to_string(), "performance".to_string()],
            },
        }
    }
}

/// What a role is allowed to do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleCapabilities {
    pub can_execute: bool,
    pub can_review: bool,
    pub can_dispatch: bool,
    pub specialties: Vec<String>,
}

/// A task as seen by role assignment.
#[derive(Debug, Clone)]
pub struct TaskSpec {
    /// Task identifier (typically a workstream id)
    pub id: String,
    /// Task type: "implement", "review", "dispatch", ...
    pub task_type: String,
    /// Free-form metadata; the `specialty` key forces specialist routing
    pub metadata: HashMap<String, String>,
}

impl TaskSpec {
    /// Create a task with no metadata.
    pub fn new(id: &str, task_type: &str) -> Self {
        Self {
            id: id.to_string(),
            task_type: task_type.to_string(),
            metadata: HashMap::new(),
        }
    }

    /// Add a metadata entry.
    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }
}

/// Tracks the current role of one agent.
pub struct RoleSwitcher {
    agent_id: String,
    current: RwLock<Role>,
}

impl RoleSwitcher {
    /// Create a switcher for an agent starting in the given role.
    pub fn new(agent_id: &str, initial: Role) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            current: RwLock::new(initial),
        }
    }

    /// The agent this switcher tracks.
    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// Current role.
    pub fn current_role(&self) -> Role {
        *self.current.read().expect("role lock poisoned")
    }

    /// Pick a role for a task.
    ///
    /// A `specialty` metadata key routes to specialist; otherwise the task
    /// type decides. A review task over work this agent completed itself
    /// routes to coordinator so the review can be dispatched elsewhere.
    pub fn assign_role(&self, task: &TaskSpec, history: &[CoordinationEvent]) -> Role {
        if task.metadata.contains_key("specialty") {
            return Role::Specialist;
        }
        match task.task_type.as_str() {
            "review" => {
                if self.is_self_review(&task.id, &self.agent_id, history) {
                    Role::Coordinator
                } else {
                    Role::Reviewer
                }
            }
            "dispatch" | "coordination" => Role::Coordinator,
            _ => Role::Implementer,
        }
    }

    /// Switch to a new role.
    ///
    /// No-op (returns `None`) when the role is unchanged; otherwise the
    /// state mutates and a `role_switch` event draft is returned with
    /// payload `{from, to, reason}` for the caller to append.
    pub fn switch_role(&self, new: Role, reason: &str) -> Option<EventDraft> {
        let mut current = self.current.write().expect("role lock poisoned");
        if *current == new {
            return None;
        }
        let from = *current;
        *current = new;

        tracing::debug!(
            agent = %self.agent_id,
            from = from.as_str(),
            to = new.as_str(),
            reason,
            "role switch"
        );

        Some(
            EventDraft::new(EventType::RoleSwitch, &self.agent_id, new.as_str())
                .with_payload("from", from.as_str())
                .with_payload("to", new.as_str())
                .with_payload("reason", reason),
        )
    }

    /// True iff the history contains an `agent_complete` for the same
    /// (task, agent) pair.
    pub fn is_self_review(
        &self,
        task_id: &str,
        agent_id: &str,
        history: &[CoordinationEvent],
    ) -> bool {
        history.iter().any(|e| {
            e.event_type == EventType::AgentComplete
                && e.agent_id == agent_id
                && e.task_id.as_deref() == Some(task_id)
        })
    }
}
