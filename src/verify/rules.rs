//! Built-in verification rules.

use super::pipeline::Rule;
use super::types::{CodeSnapshot, Severity, VerificationResult};
use crate::workstream::Workstream;
use anyhow::Result;
use std::path::Path;

/// Dependency-manifest file names watched by `DependencyCheckRule`.
const MANIFEST_FILES: &[&str] = &[
    "Cargo.toml",
    "Cargo.lock",
    "package.json",
    "package-lock.json",
    "go.mod",
    "go.sum",
    "requirements.txt",
    "pyproject.toml",
];

/// Passes when the snapshot declares any test entity.
///
/// Skipped when the workstream declares no acceptance criteria; fails at
/// warning severity when criteria exist but no entity name starts with
/// `Test`.
pub struct AcCoverageRule;

impl Rule for AcCoverageRule {
    fn name(&self) -> &str {
        "ac_coverage"
    }

    fn verify(&self, spec: &Workstream, code: &CodeSnapshot) -> Result<VerificationResult> {
        if spec.acceptance_criteria.is_empty() {
            return Ok(VerificationResult::skip(
                self.name(),
                "no acceptance criteria declared",
            ));
        }

        let has_tests = code.entities().any(|e| e.starts_with("Test"));
        if has_tests {
            Ok(VerificationResult::pass(self.name(), "test entities found"))
        } else {
            Ok(VerificationResult::fail(
                self.name(),
                "acceptance criteria declared but no test entities found",
                Severity::Warning,
            ))
        }
    }
}

/// Fails (warning) when a touched file is outside the declared scope.
pub struct ScopeBoundariesRule;

impl Rule for ScopeBoundariesRule {
    fn name(&self) -> &str {
        "scope_boundaries"
    }

    fn verify(&self, spec: &Workstream, code: &CodeSnapshot) -> Result<VerificationResult> {
        let out_of_scope: Vec<String> = code
            .files
            .iter()
            .filter(|f| !spec.scope_files.iter().any(|s| s == &f.path))
            .map(|f| f.path.clone())
            .collect();

        if out_of_scope.is_empty() {
            Ok(VerificationResult::pass(
                self.name(),
                "all files within declared scope",
            ))
        } else {
            Ok(VerificationResult::fail(
                self.name(),
                &format!("{} file(s) outside declared scope", out_of_scope.len()),
                Severity::Warning,
            )
            .with_details(out_of_scope))
        }
    }
}

/// Fails (error) when any file exceeds the LOC threshold.
pub struct LocLimitRule {
    limit: usize,
}

impl LocLimitRule {
    /// Create a rule with the given threshold.
    pub fn new(limit: usize) -> Self {
        Self { limit }
    }
}

impl Rule for LocLimitRule {
    fn name(&self) -> &str {
        "loc_limit"
    }

    fn verify(&self, _spec: &Workstream, code: &CodeSnapshot) -> Result<VerificationResult> {
        let oversized: Vec<String> = code
            .files
            .iter()
            .filter(|f| f.loc > self.limit)
            .map(|f| format!("{}: {} LOC (limit {})", f.path, f.loc, self.limit))
            .collect();

        if oversized.is_empty() {
            Ok(VerificationResult::pass(
                self.name(),
                &format!("all files within {} LOC", self.limit),
            ))
        } else {
            Ok(VerificationResult::fail(
                self.name(),
                &format!("{} file(s) exceed the LOC limit", oversized.len()),
                Severity::Error,
            )
            .with_details(oversized))
        }
    }
}

/// Fails (warning) when a dependency manifest was modified.
pub struct DependencyCheckRule;

impl Rule for DependencyCheckRule {
    fn name(&self) -> &str {
        "dependency_check"
    }

    fn verify(&self, _spec: &Workstream, code: &CodeSnapshot) -> Result<VerificationResult> {
        let manifests: Vec<String> = code
            .files
            .iter()
            .filter(|f| {
                Path::new(&f.path)
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| MANIFEST_FILES.contains(&n))
                    .unwrap_or(false)
            })
            .map(|f| f.path.clone())
            .collect();

        if manifests.is_empty() {
            Ok(VerificationResult::pass(
                self.name(),
                "no dependency manifests modified",
            ))
        } else {
            Ok(VerificationResult::fail(
                self.name(),
                &format!("{} dependency manifest(s) modified", manifests.len()),
                Severity::Warning,
            )
            .with_details(manifests))
        }
    }
}
