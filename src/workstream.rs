//! Workstream descriptors and markdown loading.
//!
//! This module provides:
//! - `Workstream` struct representing a single unit of schedulable work
//! - Frontmatter parsing for the planner's markdown descriptor format
//! - Directory loading functions that return descriptors for one feature
//!
//! Descriptors are produced by an external planner and consumed read-only by
//! the core. The file format is YAML frontmatter (`ws_id`, `feature_id`,
//! `title`, `status`, `priority`, `depends_on`, `blocks`, `scope_files`)
//! followed by a markdown body containing an acceptance-criteria checklist.

use anyhow::{Context, Result, bail};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::OnceLock;
use walkdir::WalkDir;

/// Lifecycle status of a workstream, as declared by the planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WorkstreamStatus {
    /// Not yet started
    #[default]
    Backlog,
    /// Currently being executed
    InProgress,
    /// Finished successfully
    Completed,
    /// Blocked on an external factor
    Blocked,
}

/// Priority tier of a workstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Critical,
    High,
    #[default]
    Medium,
    Low,
}

/// A single acceptance criterion parsed from the descriptor body checklist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptanceCriterion {
    /// Criterion text
    pub text: String,
    /// Whether the checklist item was checked (`- [x]`)
    pub done: bool,
}

/// Represents a single workstream descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workstream {
    /// Stable identifier (e.g., "00-AUTH-01")
    pub id: String,
    /// Feature this workstream belongs to (e.g., "AUTH")
    pub feature_id: String,
    /// Human-readable title
    pub title: String,
    /// Planner-declared status
    #[serde(default)]
    pub status: WorkstreamStatus,
    /// Priority tier
    #[serde(default)]
    pub priority: Priority,
    /// Workstream ids this one depends on
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Workstream ids this one blocks
    #[serde(default)]
    pub blocks: Vec<String>,
    /// Files this workstream is scoped to touch
    #[serde(default)]
    pub scope_files: Vec<String>,
    /// Ordered acceptance criteria from the descriptor body
    #[serde(default)]
    pub acceptance_criteria: Vec<AcceptanceCriterion>,
}

impl Workstream {
    /// Create a bare workstream, mainly for tests and programmatic planners.
    pub fn new(id: &str, feature_id: &str, title: &str, depends_on: Vec<String>) -> Self {
        Self {
            id: id.to_string(),
            feature_id: feature_id.to_string(),
            title: title.to_string(),
            status: WorkstreamStatus::default(),
            priority: Priority::default(),
            depends_on,
            blocks: Vec::new(),
            scope_files: Vec::new(),
            acceptance_criteria: Vec::new(),
        }
    }

    /// Declared dependency identifiers.
    #[inline]
    pub fn dependencies(&self) -> &[String] {
        &self.depends_on
    }
}

/// Frontmatter fields as they appear in the descriptor file.
#[derive(Debug, Deserialize)]
struct Frontmatter {
    ws_id: String,
    feature_id: String,
    title: String,
    #[serde(default)]
    status: WorkstreamStatus,
    #[serde(default)]
    priority: Priority,
    #[serde(default)]
    depends_on: Vec<String>,
    #[serde(default)]
    blocks: Vec<String>,
    #[serde(default)]
    scope_files: Vec<String>,
}

fn checklist_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*-\s*\[( |x|X)\]\s*(.+)$").expect("valid checklist regex"))
}

/// Parse a descriptor from raw file content.
///
/// The content must start with a `---` fenced YAML frontmatter block. The
/// markdown body after the closing fence is scanned for checklist items in
/// document order.
pub fn parse_workstream(content: &str) -> Result<Workstream> {
    let rest = content
        .strip_prefix("---")
        .context("Descriptor must start with a '---' frontmatter fence")?;

    let fence_end = rest
        .find("\n---")
        .context("Descriptor frontmatter is missing its closing '---' fence")?;
    let yaml = &rest[..fence_end];
    let body = rest[fence_end + 4..].trim_start_matches('\n');

    let fm: Frontmatter =
        serde_yaml::from_str(yaml).context("Failed to parse descriptor frontmatter")?;

    if fm.ws_id.trim().is_empty() {
        bail!("Descriptor has an empty ws_id");
    }

    let acceptance_criteria = body
        .lines()
        .filter_map(|line| {
            checklist_regex().captures(line).map(|caps| AcceptanceCriterion {
                text: caps[2].trim().to_string(),
                done: !caps[1].trim().is_empty(),
            })
        })
        .collect();

    Ok(Workstream {
        id: fm.ws_id,
        feature_id: fm.feature_id,
        title: fm.title,
        status: fm.status,
        priority: fm.priority,
        depends_on: fm.depends_on,
        blocks: fm.blocks,
        scope_files: fm.scope_files,
        acceptance_criteria,
    })
}

/// Load a single descriptor file.
pub fn load_workstream(path: &Path) -> Result<Workstream> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read descriptor: {}", path.display()))?;
    parse_workstream(&content)
        .with_context(|| format!("Invalid descriptor: {}", path.display()))
}

/// Load every `.md` descriptor under a directory, sorted by workstream id.
///
/// Files that are not valid descriptors fail the load; the planner owns the
/// directory and a malformed file there is an error, not noise.
pub fn load_workstreams(dir: &Path) -> Result<Vec<Workstream>> {
    let mut workstreams = Vec::new();

    for entry in WalkDir::new(dir).min_depth(1).max_depth(2) {
        let entry = entry.context("Failed to walk descriptor directory")?;
        if !entry.file_type().is_file() {
            continue;
        }
        if entry.path().extension().and_then(|e| e.to_str()) != Some("md") {
            continue;
        }
        workstreams.push(load_workstream(entry.path())?);
    }

    workstreams.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(workstreams)
}

/// Load the descriptors for one feature.
pub fn load_feature_workstreams(dir: &Path, feature_id: &str) -> Result<Vec<Workstream>> {
    let all = load_workstreams(dir)?;
    Ok(all
        .into_iter()
        .filter(|ws| ws.feature_id == feature_id)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const DESCRIPTOR: &str = r#"---
ws_id: 00-AUTH-01
feature_id: AUTH
title: Login endpoint
status: backlog
priority: high
depends_on:
  - 00-AUTH-00
blocks:
  - 00-AUTH-02
scope_files:
  - src/auth/login.rs
  - src/auth/mod.rs
---

# Login endpoint

## Acceptance criteria

- [ ] POST /login returns a session token
- [x] Passwords are never logged
- [ ] Rate limiting applies after 5 failures
"#;

    #[test]
    fn test_parse_full_descriptor() {
        let ws = parse_workstream(DESCRIPTOR).unwrap();
        assert_eq!(ws.id, "00-AUTH-01");
        assert_eq!(ws.feature_id, "AUTH");
        assert_eq!(ws.title, "Login endpoint");
        assert_eq!(ws.status, WorkstreamStatus::Backlog);
        assert_eq!(ws.priority, Priority::High);
        assert_eq!(ws.depends_on, vec!["00-AUTH-00"]);
        assert_eq!(ws.blocks, vec!["00-AUTH-02"]);
        assert_eq!(ws.scope_files.len(), 2);
    }

    #[test]
    fn test_acceptance_criteria_order_and_done_flags() {
        let ws = parse_workstream(DESCRIPTOR).unwrap();
        assert_eq!(ws.acceptance_criteria.len(), 3);
        assert_eq!(
            ws.acceptance_criteria[0].text,
            "POST /login returns a session token"
        );
        assert!(!ws.acceptance_criteria[0].done);
        assert!(ws.acceptance_criteria[1].done);
        assert!(!ws.acceptance_criteria[2].done);
    }

    #[test]
    fn test_dependencies_accessor_mirrors_depends_on() {
        let ws = parse_workstream(DESCRIPTOR).unwrap();
        assert_eq!(ws.dependencies(), ws.depends_on.as_slice());
    }

    #[test]
    fn test_missing_frontmatter_fails() {
        let result = parse_workstream("# Just markdown\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_unclosed_frontmatter_fails() {
        let result = parse_workstream("---\nws_id: X\nfeature_id: F\ntitle: T\n");
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("closing '---' fence")
        );
    }

    #[test]
    fn test_empty_ws_id_fails() {
        let content = "---\nws_id: \"\"\nfeature_id: F\ntitle: T\n---\nbody\n";
        assert!(parse_workstream(content).is_err());
    }

    #[test]
    fn test_defaults_for_optional_fields() {
        let content = "---\nws_id: 00-X-01\nfeature_id: X\ntitle: Minimal\n---\n";
        let ws = parse_workstream(content).unwrap();
        assert_eq!(ws.status, WorkstreamStatus::Backlog);
        assert_eq!(ws.priority, Priority::Medium);
        assert!(ws.depends_on.is_empty());
        assert!(ws.acceptance_criteria.is_empty());
    }

    #[test]
    fn test_load_feature_workstreams_filters_and_sorts() {
        let dir = tempdir().unwrap();
        let write = |name: &str, ws_id: &str, feature: &str| {
            std::fs::write(
                dir.path().join(name),
                format!(
                    "---\nws_id: {ws_id}\nfeature_id: {feature}\ntitle: T\n---\n- [ ] done\n"
                ),
            )
            .unwrap();
        };
        write("b.md", "00-AUTH-02", "AUTH");
        write("a.md", "00-AUTH-01", "AUTH");
        write("c.md", "00-BILL-01", "BILL");
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let auth = load_feature_workstreams(dir.path(), "AUTH").unwrap();
        assert_eq!(auth.len(), 2);
        assert_eq!(auth[0].id, "00-AUTH-01");
        assert_eq!(auth[1].id, "00-AUTH-02");

        let bill = load_feature_workstreams(dir.path(), "BILL").unwrap();
        assert_eq!(bill.len(), 1);
    }

    #[test]
    fn test_malformed_descriptor_in_directory_is_an_error() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("bad.md"), "no frontmatter here").unwrap();
        assert!(load_workstreams(dir.path()).is_err());
    }
}
