//! Executor contract and error classification.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// The agent driver the orchestrator delegates workstream execution to.
///
/// Errors are opaque to the orchestrator; transient-vs-fatal is decided by
/// the configured [`ErrorClassifier`].
#[async_trait]
pub trait Executor: Send + Sync {
    /// Execute one workstream to completion.
    async fn execute(&self, ws_id: &str) -> Result<()>;
}

/// How an executor error should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Worth retrying within the retry budget
    Transient,
    /// Retrying cannot help (configuration errors, rejected input)
    Fatal,
}

/// Pluggable transient-vs-fatal predicate.
pub type ErrorClassifier = Arc<dyn Fn(&anyhow::Error) -> ErrorClass + Send + Sync>;

/// Marker an executor can wrap an error in to opt out of retries.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct FatalError(pub String);

impl FatalError {
    /// Wrap a message as a fatal, non-retriable error.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Default classification: errors carrying a [`FatalError`] anywhere in
/// their chain are fatal, everything else is transient. Executors opt into
/// fatality explicitly rather than the orchestrator guessing.
pub fn default_classifier() -> ErrorClassifier {
    Arc::new(|error| {
        if error.chain().any(|cause| cause.is::<FatalError>()) {
            ErrorClass::Fatal
        } else {
            ErrorClass::Transient
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn test_plain_errors_are_transient() {
        let classify = default_classifier();
        assert_eq!(classify(&anyhow!("network blip")), ErrorClass::Transient);
    }

    #[test]
    fn test_fatal_marker_is_fatal() {
        let classify = default_classifier();
        let err = anyhow::Error::new(FatalError::new("bad config"));
        assert_eq!(classify(&err), ErrorClass::Fatal);
    }

    #[test]
    fn test_fatal_marker_survives_context_wrapping() {
        let classify = default_classifier();
        let err = anyhow::Error::new(FatalError::new("bad config"))
            .context("while executing 00-AUTH-01");
        assert_eq!(classify(&err), ErrorClass::Fatal);
    }

    #[test]
    fn test_custom_classifier_can_invert() {
        let classify: ErrorClassifier = Arc::new(|_| ErrorClass::Fatal);
        assert_eq!(classify(&anyhow!("anything")), ErrorClass::Fatal);
    }
}
