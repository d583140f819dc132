//! In-process event bus for telemetry consumers.
//!
//! A registry of handler entries keyed by topic, each with a priority and
//! a stable id. Synchronous publish invokes every handler in priority
//! order (lower numeric priority first, registration order breaking ties)
//! and returns the last error after all handlers have run. Asynchronous
//! publish fans out under a cancellation token with the same isolation:
//! one handler's error never prevents the others from running.

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio_util::sync::CancellationToken;

/// Topics published by the core and its collaborators.
pub mod topics {
    pub const COMMAND_PRE: &str = "command:pre";
    pub const COMMAND_POST: &str = "command:post";
    pub const COMMAND_ERROR: &str = "command:error";
    pub const SESSION_START: &str = "session:start";
    pub const SESSION_END: &str = "session:end";
    pub const SESSION_COMPACT: &str = "session:compact";
    pub const SESSION_RESUME: &str = "session:resume";
    pub const GATEWAY_REQUEST: &str = "gateway:request";
    pub const GATEWAY_RESPONSE: &str = "gateway:response";
    pub const GATEWAY_ERROR: &str = "gateway:error";
}

/// An event delivered to subscribers.
#[derive(Debug, Clone)]
pub struct BusEvent {
    pub topic: String,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl BusEvent {
    /// Create an event stamped with the current time.
    pub fn new(topic: &str, payload: serde_json::Value) -> Self {
        Self {
            topic: topic.to_string(),
            payload,
            timestamp: Utc::now(),
        }
    }
}

/// Subscriber callback.
pub type Handler = Arc<dyn Fn(&BusEvent) -> Result<()> + Send + Sync>;

/// Stable handle for unsubscribing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

struct HandlerEntry {
    id: u64,
    priority: i32,
    handler: Handler,
}

/// Topic-keyed handler registry.
#[derive(Default)]
pub struct EventBus {
    registry: RwLock<HashMap<String, Vec<HandlerEntry>>>,
    next_id: AtomicU64,
}

impl EventBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a topic. Lower priority runs first; equal
    /// priorities run in registration order.
    pub fn subscribe(&self, topic: &str, priority: i32, handler: Handler) -> HandlerId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut registry = self.registry.write().expect("bus registry poisoned");
        let entries = registry.entry(topic.to_string()).or_default();
        entries.push(HandlerEntry {
            id,
            priority,
            handler,
        });
        entries.sort_by_key(|e| (e.priority, e.id));
        HandlerId(id)
    }

    /// Remove a handler. Returns whether it was found.
    pub fn unsubscribe(&self, id: HandlerId) -> bool {
        let mut registry = self.registry.write().expect("bus registry poisoned");
        for entries in registry.values_mut() {
            let before = entries.len();
            entries.retain(|e| e.id != id.0);
            if entries.len() != before {
                return true;
            }
        }
        false
    }

    /// Number of handlers subscribed to a topic.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.registry
            .read()
            .expect("bus registry poisoned")
            .get(topic)
            .map(|e| e.len())
            .unwrap_or(0)
    }

    fn handlers_for(&self, topic: &str) -> Vec<Handler> {
        self.registry
            .read()
            .expect("bus registry poisoned")
            .get(topic)
            .map(|entries| entries.iter().map(|e| Arc::clone(&e.handler)).collect())
            .unwrap_or_default()
    }

    /// Invoke every handler for the topic, in priority order, on the
    /// calling thread. All handlers run to completion; the last error is
    /// returned.
    pub fn publish_sync(&self, event: &BusEvent) -> Result<()> {
        let mut last_error = None;
        for handler in self.handlers_for(&event.topic) {
            if let Err(e) = handler(event) {
                tracing::warn!(topic = %event.topic, error = %e, "bus handler failed");
                last_error = Some(e);
            }
        }
        match last_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Fan the event out to every handler concurrently, isolated from each
    /// other, under the cancellation token. Handler errors are logged and
    /// swallowed; the call returns once every handler has finished or the
    /// token fired.
    pub async fn publish_async(&self, event: BusEvent, cancel: CancellationToken) {
        let handlers = self.handlers_for(&event.topic);
        let event = Arc::new(event);

        let tasks: Vec<_> = handlers
            .into_iter()
            .map(|handler| {
                let event = Arc::clone(&event);
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    if cancel.is_cancelled() {
                        return;
                    }
                    if let Err(e) = handler(&event) {
                        tracing::warn!(topic = %event.topic, error = %e, "bus handler failed");
                    }
                })
            })
            .collect();

        tokio::select! {
            _ = cancel.cancelled() => {}
            results = futures::future::join_all(tasks) => {
                for result in results {
                    if let Err(e) = result {
                        tracing::warn!(error = %e, "bus handler task panicked");
                    }
                }
            }
        }
    }
}
