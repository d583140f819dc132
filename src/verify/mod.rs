//! Rule-driven verification of workstream output.
//!
//! A rule is a pure function of (workstream spec, code snapshot) returning
//! pass/fail/skip with a severity. The pipeline runs an ordered list of
//! rules, converting rule errors into failure results so one broken rule
//! cannot abort verification.

pub mod pipeline;
pub mod rules;
pub mod types;

pub use pipeline::{Rule, VerificationPipeline};
pub use rules::{AcCoverageRule, DependencyCheckRule, LocLimitRule, ScopeBoundariesRule};
pub use types::{CodeSnapshot, RuleStatus, Severity, SourceFile, VerificationResult};
