//! Verification inputs and results.

use serde::{Deserialize, Serialize};

/// Severity of a verification outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// Outcome status of one rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleStatus {
    Pass,
    Fail,
    Skip,
}

/// Result of running one rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    /// Rule that produced this result
    pub rule: String,
    /// Pass, fail, or skip
    pub status: RuleStatus,
    /// Human-readable summary
    pub message: String,
    /// Supporting detail lines
    #[serde(default)]
    pub details: Vec<String>,
    /// How serious a failure is
    pub severity: Severity,
}

impl VerificationResult {
    /// A passing result.
    pub fn pass(rule: &str, message: &str) -> Self {
        Self {
            rule: rule.to_string(),
            status: RuleStatus::Pass,
            message: message.to_string(),
            details: Vec::new(),
            severity: Severity::Info,
        }
    }

    /// A failing result with the given severity.
    pub fn fail(rule: &str, message: &str, severity: Severity) -> Self {
        Self {
            rule: rule.to_string(),
            status: RuleStatus::Fail,
            message: message.to_string(),
            details: Vec::new(),
            severity,
        }
    }

    /// A skipped result.
    pub fn skip(rule: &str, message: &str) -> Self {
        Self {
            rule: rule.to_string(),
            status: RuleStatus::Skip,
            message: message.to_string(),
            details: Vec::new(),
            severity: Severity::Info,
        }
    }

    /// Attach detail lines.
    pub fn with_details(mut self, details: Vec<String>) -> Self {
        self.details = details;
        self
    }

    /// Check if this is a failure at error severity.
    pub fn is_error(&self) -> bool {
        self.status == RuleStatus::Fail && self.severity == Severity::Error
    }

    /// Check if this is a failure at warning severity.
    pub fn is_warning(&self) -> bool {
        self.status == RuleStatus::Fail && self.severity == Severity::Warning
    }
}

/// One file in a code snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceFile {
    /// Path relative to the project root
    pub path: String,
    /// Lines of code
    pub loc: usize,
    /// Named entities (types, functions) declared in the file
    #[serde(default)]
    pub entities: Vec<String>,
}

impl SourceFile {
    /// Create a file entry with no entities.
    pub fn new(path: &str, loc: usize) -> Self {
        Self {
            path: path.to_string(),
            loc,
            entities: Vec::new(),
        }
    }

    /// Attach declared entity names.
    pub fn with_entities(mut self, entities: Vec<String>) -> Self {
        self.entities = entities;
        self
    }
}

/// The set of files a workstream touched, as seen by the rules.
///
/// Rules treat the snapshot as immutable; they never mutate their inputs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CodeSnapshot {
    pub files: Vec<SourceFile>,
}

impl CodeSnapshot {
    /// Build a snapshot from files.
    pub fn new(files: Vec<SourceFile>) -> Self {
        Self { files }
    }

    /// Iterate over all declared entity names.
    pub fn entities(&self) -> impl Iterator<Item = &str> {
        self.files
            .iter()
            .flat_map(|f| f.entities.iter().map(String::as_str))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_classification() {
        assert!(VerificationResult::fail("r", "m", Severity::Error).is_error());
        assert!(!VerificationResult::fail("r", "m", Severity::Warning).is_error());
        assert!(VerificationResult::fail("r", "m", Severity::Warning).is_warning());
        assert!(!VerificationResult::pass("r", "m").is_error());
        assert!(!VerificationResult::skip("r", "m").is_warning());
    }

    #[test]
    fn test_snapshot_entities_flatten() {
        let snapshot = CodeSnapshot::new(vec![
            SourceFile::new("a.rs", 10).with_entities(vec!["Foo".into(), "TestFoo".into()]),
            SourceFile::new("b.rs", 20).with_entities(vec!["Bar".into()]),
        ]);
        let entities: Vec<&str> = snapshot.entities().collect();
        assert_eq!(entities, vec!["Foo", "TestFoo", "Bar"]);
    }
}
