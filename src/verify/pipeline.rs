//! Ordered verification pipeline.

use super::types::{CodeSnapshot, Severity, VerificationResult};
use crate::workstream::Workstream;
use anyhow::Result;

/// A single verification capability.
///
/// Rules are pure: same inputs, same result, no mutation. A rule that
/// cannot evaluate returns `Err`, which the pipeline converts into a
/// failure at error severity.
pub trait Rule: Send + Sync {
    /// Stable rule name, used in results and violation records.
    fn name(&self) -> &str;

    /// Evaluate the rule against a workstream and its code snapshot.
    fn verify(&self, spec: &Workstream, code: &CodeSnapshot) -> Result<VerificationResult>;
}

/// Runs an ordered list of rules over a (spec, code) pair.
pub struct VerificationPipeline {
    rules: Vec<Box<dyn Rule>>,
}

impl VerificationPipeline {
    /// Create an empty pipeline.
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// Append a rule; rules run in insertion order.
    pub fn add_rule(mut self, rule: Box<dyn Rule>) -> Self {
        self.rules.push(rule);
        self
    }

    /// Number of registered rules.
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Run every rule. Rule errors become failure results with severity
    /// `error`, so the remaining rules still run.
    pub fn run(&self, spec: &Workstream, code: &CodeSnapshot) -> Vec<VerificationResult> {
        self.rules
            .iter()
            .map(|rule| match rule.verify(spec, code) {
                Ok(result) => result,
                Err(e) => {
                    tracing::error!(rule = rule.name(), error = %e, "verification rule errored");
                    VerificationResult::fail(
                        rule.name(),
                        &format!("rule error: {e}"),
                        Severity::Error,
                    )
                }
            })
            .collect()
    }

    /// Check if any result is a failure at error severity.
    pub fn has_errors(results: &[VerificationResult]) -> bool {
        results.iter().any(VerificationResult::is_error)
    }

    /// Check if any result is a failure at warning severity.
    pub fn has_warnings(results: &[VerificationResult]) -> bool {
        results.iter().any(VerificationResult::is_warning)
    }
}

impl Default for VerificationPipeline {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verify::types::RuleStatus;
    use crate::workstream::Workstream;
    use anyhow::bail;

    struct AlwaysPass;
    impl Rule for AlwaysPass {
        fn name(&self) -> &str {
            "always_pass"
        }
        fn verify(&self, _: &Workstream, _: &CodeSnapshot) -> Result<VerificationResult> {
            Ok(VerificationResult::pass(self.name(), "ok"))
        }
    }

    struct AlwaysError;
    impl Rule for AlwaysError {
        fn name(&self) -> &str {
            "always_error"
        }
        fn verify(&self, _: &Workstream, _: &CodeSnapshot) -> Result<VerificationResult> {
            bail!("evaluation blew up")
        }
    }

    struct WarnRule;
    impl Rule for WarnRule {
        fn name(&self) -> &str {
            "warn_rule"
        }
        fn verify(&self, _: &Workstream, _: &CodeSnapshot) -> Result<VerificationResult> {
            Ok(VerificationResult::fail(self.name(), "meh", Severity::Warning))
        }
    }

    fn spec() -> Workstream {
        Workstream::new("00-X-01", "X", "Test", vec![])
    }

    #[test]
    fn test_rules_run_in_order() {
        let pipeline = VerificationPipeline::new()
            .add_rule(Box::new(AlwaysPass))
            .add_rule(Box::new(WarnRule));

        let results = pipeline.run(&spec(), &CodeSnapshot::default());
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].rule, "always_pass");
        assert_eq!(results[1].rule, "warn_rule");
    }

    #[test]
    fn test_rule_error_becomes_error_failure_and_rest_still_run() {
        let pipeline = VerificationPipeline::new()
            .add_rule(Box::new(AlwaysError))
            .add_rule(Box::new(AlwaysPass));

        let results = pipeline.run(&spec(), &CodeSnapshot::default());
        assert_eq!(results.len(), 2);
        assert!(results[0].is_error());
        assert!(results[0].message.contains("evaluation blew up"));
        assert_eq!(results[1].status, RuleStatus::Pass);
    }

    #[test]
    fn test_has_errors_and_warnings() {
        let pipeline = VerificationPipeline::new()
            .add_rule(Box::new(AlwaysPass))
            .add_rule(Box::new(WarnRule));
        let results = pipeline.run(&spec(), &CodeSnapshot::default());

        assert!(!VerificationPipeline::has_errors(&results));
        assert!(VerificationPipeline::has_warnings(&results));

        let pipeline = VerificationPipeline::new().add_rule(Box::new(AlwaysError));
        let results = pipeline.run(&spec(), &CodeSnapshot::default());
        assert!(VerificationPipeline::has_errors(&results));
    }

    #[test]
    fn test_empty_pipeline() {
        let results = VerificationPipeline::new().run(&spec(), &CodeSnapshot::default());
        assert!(results.is_empty());
        assert!(!VerificationPipeline::has_errors(&results));
    }
}
