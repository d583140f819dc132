//! Quality watcher: rule-driven checks on changed files.

use super::debounced::{FileWatcher, WatcherConfig};
use crate::verify::Severity;
use anyhow::Result;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// A finding produced by one check over one file.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckFinding {
    pub message: String,
    pub severity: Severity,
}

/// A check failure attributed to a specific file.
#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    pub file: String,
    pub check: String,
    pub message: String,
    pub severity: Severity,
}

/// Checks the quality watcher runs against each changed file.
pub trait QualityChecker: Send + Sync {
    /// Flag files whose size is out of bounds.
    fn check_file_size(&self, path: &Path) -> Result<Vec<CheckFinding>>;
    /// Flag overly complex functions.
    fn check_complexity(&self, path: &Path) -> Result<Vec<CheckFinding>>;
    /// Flag unchecked type escapes.
    fn check_types(&self, path: &Path) -> Result<Vec<CheckFinding>>;
}

/// Text-heuristic checker for source files.
///
/// Deliberately cheap: it reads the file once and scans lines, so it can
/// run on every save without getting in the way.
pub struct SourceChecker {
    loc_limit: usize,
    complexity_threshold: u32,
}

impl SourceChecker {
    /// Create a checker with the given thresholds.
    pub fn new(loc_limit: usize, complexity_threshold: u32) -> Self {
        Self {
            loc_limit,
            complexity_threshold,
        }
    }
}

impl QualityChecker for SourceChecker {
    fn check_file_size(&self, path: &Path) -> Result<Vec<CheckFinding>> {
        let content = std::fs::read_to_string(path)?;
        let loc = content.lines().filter(|l| !l.trim().is_empty()).count();
        if loc > self.loc_limit {
            Ok(vec![CheckFinding {
                message: format!("{loc} LOC exceeds the {} LOC limit", self.loc_limit),
                severity: Severity::Warning,
            }])
        } else {
            Ok(Vec::new())
        }
    }

    fn check_complexity(&self, path: &Path) -> Result<Vec<CheckFinding>> {
        let content = std::fs::read_to_string(path)?;
        let mut findings = Vec::new();

        let mut current_fn: Option<(String, u32)> = None;
        let flush = |fn_state: &mut Option<(String, u32)>, findings: &mut Vec<CheckFinding>| {
            if let Some((name, score)) = fn_state.take() {
                if score > self.complexity_threshold {
                    findings.push(CheckFinding {
                        message: format!(
                            "function {name} has complexity {score} (threshold {})",
                            self.complexity_threshold
                        ),
                        severity: Severity::Warning,
                    });
                }
            }
        };

        for line in content.lines() {
            let trimmed = line.trim_start();
            if let Some(rest) = trimmed
                .strip_prefix("pub fn ")
                .or_else(|| trimmed.strip_prefix("fn "))
                .or_else(|| trimmed.strip_prefix("pub async fn "))
                .or_else(|| trimmed.strip_prefix("async fn "))
            {
                flush(&mut current_fn, &mut findings);
                let name = rest
                    .split(|c: char| c == '(' || c == '<' || c.is_whitespace())
                    .next()
                    .unwrap_or("unknown")
                    .to_string();
                // Base complexity of 1 per function
                current_fn = Some((name, 1));
            }

            if let Some((_, score)) = current_fn.as_mut() {
                let branches = ["if ", "match ", "while ", "for ", "&&", "||", "?"]
                    .iter()
                    .map(|kw| line.matches(kw).count() as u32)
                    .sum::<u32>();
                *score += branches;
            }
        }
        flush(&mut current_fn, &mut findings);

        Ok(findings)
    }

    fn check_types(&self, path: &Path) -> Result<Vec<CheckFinding>> {
        let content = std::fs::read_to_string(path)?;
        let mut findings = Vec::new();

        for (idx, line) in content.lines().enumerate() {
            if line.contains(".unwrap()") || line.contains(".expect(") {
                findings.push(CheckFinding {
                    message: format!("line {}: unchecked unwrap/expect", idx + 1),
                    severity: Severity::Info,
                });
            }
        }
        Ok(findings)
    }
}

/// Watches source files and aggregates check violations per file.
pub struct QualityWatcher {
    checker: Arc<dyn QualityChecker>,
    violations: RwLock<HashMap<PathBuf, Vec<Violation>>>,
    quiet: bool,
}

impl QualityWatcher {
    /// Create a quality watcher over the given checker.
    pub fn new(checker: Arc<dyn QualityChecker>, quiet: bool) -> Self {
        Self {
            checker,
            violations: RwLock::new(HashMap::new()),
            quiet,
        }
    }

    /// Default include globs: source code.
    pub fn default_includes() -> Vec<String> {
        vec![
            "**/*.rs".to_string(),
            "**/*.go".to_string(),
            "**/*.py".to_string(),
            "**/*.ts".to_string(),
        ]
    }

    /// Default exclude globs: tests and generated mocks.
    pub fn default_excludes() -> Vec<String> {
        vec![
            "**/tests/**".to_string(),
            "**/*_test.*".to_string(),
            "**/target/**".to_string(),
            "**/mocks/**".to_string(),
            "**/*_mock.*".to_string(),
        ]
    }

    /// Build the file watcher this quality watcher feeds from.
    pub fn file_watcher(
        self: &Arc<Self>,
        root: impl Into<PathBuf>,
        debounce: Duration,
    ) -> Result<FileWatcher> {
        let config = WatcherConfig::new(root)
            .with_include(Self::default_includes())
            .with_exclude(Self::default_excludes())
            .with_debounce(debounce);

        let on_change = {
            let qw = Arc::clone(self);
            Box::new(move |path: &Path| qw.handle_change(path)) as Box<dyn Fn(&Path) + Send + Sync>
        };
        let on_error = Box::new(|e: &anyhow::Error| {
            tracing::error!(error = %e, "quality watcher filesystem error");
        }) as Box<dyn Fn(&anyhow::Error) + Send + Sync>;

        FileWatcher::new(config, on_change, on_error)
    }

    /// Re-check one file: previous violations for the file are replaced by
    /// whatever the checks find now.
    pub fn handle_change(&self, path: &Path) {
        let mut fresh: Vec<Violation> = Vec::new();

        let checks: [(&str, fn(&dyn QualityChecker, &Path) -> Result<Vec<CheckFinding>>); 3] = [
            ("file_size", |c, p| c.check_file_size(p)),
            ("complexity", |c, p| c.check_complexity(p)),
            ("types", |c, p| c.check_types(p)),
        ];

        for (check_name, run) in checks {
            match run(self.checker.as_ref(), path) {
                Ok(findings) => {
                    for finding in findings {
                        fresh.push(Violation {
                            file: path.display().to_string(),
                            check: check_name.to_string(),
                            message: finding.message,
                            severity: finding.severity,
                        });
                    }
                }
                Err(e) => {
                    fresh.push(Violation {
                        file: path.display().to_string(),
                        check: check_name.to_string(),
                        message: format!("check failed: {e}"),
                        severity: Severity::Error,
                    });
                }
            }
        }

        if !self.quiet {
            for violation in &fresh {
                self.report(violation);
            }
        }

        let mut violations = self.violations.write().expect("violations lock poisoned");
        violations.insert(path.to_path_buf(), fresh);
    }

    fn report(&self, violation: &Violation) {
        match violation.severity {
            Severity::Error => tracing::error!(
                file = %violation.file,
                check = %violation.check,
                "{}",
                violation.message
            ),
            Severity::Warning => tracing::warn!(
                file = %violation.file,
                check = %violation.check,
                "{}",
                violation.message
            ),
            Severity::Info => tracing::info!(
                file = %violation.file,
                check = %violation.check,
                "{}",
                violation.message
            ),
        }
    }

    /// Stable copy of all current violations, sorted by file then check.
    pub fn violations(&self) -> Vec<Violation> {
        let map = self.violations.read().expect("violations lock poisoned");
        let mut all: Vec<Violation> = map.values().flatten().cloned().collect();
        all.sort_by(|a, b| a.file.cmp(&b.file).then_with(|| a.check.cmp(&b.check)));
        all
    }

    /// Current violations for one file.
    pub fn violations_for(&self, path: &Path) -> Vec<Violation> {
        self.violations
            .read()
            .expect("violations lock poisoned")
            .get(path)
            .cloned()
            .unwrap_or_default()
    }
}
