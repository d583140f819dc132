//! Append-only, hash-chained JSONL event log.
//!
//! Appends serialize the prev-hash/hash/write/fsync sequence under one
//! mutex. Reads open fresh file handles and never hold the append mutex
//! during I/O, so verification and filtering can run alongside writers.

use super::types::{CoordinationEvent, EventDraft, EventType};
use crate::errors::DurabilityError;
use anyhow::Context;
use chrono::Utc;
use std::collections::HashMap;
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use uuid::Uuid;

/// Aggregated event counts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventStats {
    pub total: usize,
    pub by_type: HashMap<String, usize>,
    pub by_agent: HashMap<String, usize>,
    pub by_role: HashMap<String, usize>,
}

/// The coordination event log for one project.
pub struct EventLog {
    path: PathBuf,
    /// Guards the prev-hash/hash/write/fsync sequence.
    last_hash: Mutex<String>,
}

impl EventLog {
    /// Open (or start) the log at `path`, recovering the chain tail from
    /// the existing file.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, DurabilityError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| DurabilityError::EventLogWrite {
                path: path.clone(),
                source,
            })?;
        }

        let last_hash = if path.exists() {
            Self::tail_hash(&path)?
        } else {
            String::new()
        };

        Ok(Self {
            path,
            last_hash: Mutex::new(last_hash),
        })
    }

    /// Log file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tail_hash(path: &Path) -> Result<String, DurabilityError> {
        let file = fs::File::open(path).map_err(|source| DurabilityError::EventLogWrite {
            path: path.to_path_buf(),
            source,
        })?;
        let mut last = String::new();
        for line in BufReader::new(file).lines() {
            let line = line.map_err(|source| DurabilityError::EventLogWrite {
                path: path.to_path_buf(),
                source,
            })?;
            if line.trim().is_empty() {
                continue;
            }
            let event: CoordinationEvent = serde_json::from_str(&line)
                .with_context(|| format!("Unparsable event log record in {}", path.display()))
                .map_err(DurabilityError::Other)?;
            last = event.hash;
        }
        Ok(last)
    }

    #[cfg(unix)]
    fn shared_permissions(path: &Path) -> std::io::Result<()> {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o644))
    }

    #[cfg(not(unix))]
    fn shared_permissions(_path: &Path) -> std::io::Result<()> {
        Ok(())
    }

    /// Append a draft to the log, chaining it to the previous record.
    ///
    /// The record is durable (fsynced) before this returns. Returns the
    /// full record as written.
    pub fn append(&self, draft: EventDraft) -> Result<CoordinationEvent, DurabilityError> {
        let mut last_hash = self.last_hash.lock().expect("event log mutex poisoned");

        let mut event = CoordinationEvent {
            id: Uuid::new_v4().to_string(),
            event_type: draft.event_type,
            agent_id: draft.agent_id,
            role: draft.role,
            task_id: draft.task_id,
            timestamp: Utc::now(),
            payload: draft.payload,
            prev_hash: last_hash.clone(),
            hash: String::new(),
        };
        event.hash = event.compute_hash();

        let line = serde_json::to_string(&event)
            .context("Failed to serialize event")
            .map_err(DurabilityError::Other)?;

        let write = || -> std::io::Result<()> {
            let is_new = !self.path.exists();
            let mut file = fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)?;
            file.write_all(line.as_bytes())?;
            file.write_all(b"\n")?;
            file.sync_all()?;
            if is_new {
                Self::shared_permissions(&self.path)?;
            }
            Ok(())
        };
        write().map_err(|source| DurabilityError::EventLogWrite {
            path: self.path.clone(),
            source,
        })?;

        *last_hash = event.hash.clone();
        Ok(event)
    }

    /// Read every record, in file order.
    pub fn read_all(&self) -> Result<Vec<CoordinationEvent>, DurabilityError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let file = fs::File::open(&self.path).map_err(|source| DurabilityError::EventLogWrite {
            path: self.path.clone(),
            source,
        })?;

        let mut events = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line.map_err(|source| DurabilityError::EventLogWrite {
                path: self.path.clone(),
                source,
            })?;
            if line.trim().is_empty() {
                continue;
            }
            let event: CoordinationEvent = serde_json::from_str(&line)
                .with_context(|| format!("Unparsable event log record in {}", self.path.display()))
                .map_err(DurabilityError::Other)?;
            events.push(event);
        }
        Ok(events)
    }

    /// Records produced by one agent.
    pub fn filter_by_agent(&self, agent_id: &str) -> Result<Vec<CoordinationEvent>, DurabilityError> {
        Ok(self
            .read_all()?
            .into_iter()
            .filter(|e| e.agent_id == agent_id)
            .collect())
    }

    /// Records attached to one task.
    pub fn filter_by_task(&self, task_id: &str) -> Result<Vec<CoordinationEvent>, DurabilityError> {
        Ok(self
            .read_all()?
            .into_iter()
            .filter(|e| e.task_id.as_deref() == Some(task_id))
            .collect())
    }

    /// Counts by type, agent, and role.
    pub fn aggregated_stats(&self) -> Result<EventStats, DurabilityError> {
        let mut stats = EventStats::default();
        for event in self.read_all()? {
            stats.total += 1;
            *stats
                .by_type
                .entry(event.event_type.as_str().to_string())
                .or_insert(0) += 1;
            *stats.by_agent.entry(event.agent_id).or_insert(0) += 1;
            *stats.by_role.entry(event.role).or_insert(0) += 1;
        }
        Ok(stats)
    }

    /// Scan the file top to bottom and verify the hash chain.
    ///
    /// Each record's hash is recomputed from its canonical form and its
    /// `prev_hash` is checked against the previous record's hash. On
    /// mismatch, the offending 1-based line number and the expected and
    /// observed hashes are returned.
    pub fn verify_hash_chain(&self) -> Result<(), DurabilityError> {
        let mut prev_hash = String::new();
        for (idx, event) in self.read_all()?.into_iter().enumerate() {
            let line = idx + 1;

            if event.prev_hash != prev_hash {
                return Err(DurabilityError::HashChainBroken {
                    line,
                    expected: prev_hash,
                    observed: event.prev_hash,
                });
            }

            let recomputed = event.compute_hash();
            if event.hash != recomputed {
                return Err(DurabilityError::HashChainBroken {
                    line,
                    expected: recomputed,
                    observed: event.hash,
                });
            }

            prev_hash = event.hash;
        }
        Ok(())
    }

    /// Count agent_complete records for a (task, agent) pair, the raw
    /// material of the self-review predicate.
    pub fn completions_for(&self, task_id: &str, agent_id: &str) -> Result<usize, DurabilityError> {
        Ok(self
            .read_all()?
            .into_iter()
            .filter(|e| {
                e.event_type == EventType::AgentComplete
                    && e.agent_id == agent_id
                    && e.task_id.as_deref() == Some(task_id)
            })
            .count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn log_in(dir: &Path) -> EventLog {
        EventLog::open(dir.join(".sdp/log/events.jsonl")).unwrap()
    }

    fn draft(event_type: EventType, agent: &str) -> EventDraft {
        EventDraft::new(event_type, agent, "implementer")
    }

    #[test]
    fn test_first_record_has_empty_prev_hash() {
        let dir = tempdir().unwrap();
        let log = log_in(dir.path());

        let event = log.append(draft(EventType::AgentStart, "a1")).unwrap();
        assert!(event.prev_hash.is_empty());
        assert_eq!(event.hash, event.compute_hash());
    }

    #[test]
    fn test_records_chain_in_file_order() {
        let dir = tempdir().unwrap();
        let log = log_in(dir.path());

        let first = log.append(draft(EventType::AgentStart, "a1")).unwrap();
        let second = log.append(draft(EventType::AgentAction, "a1")).unwrap();
        let third = log.append(draft(EventType::AgentComplete, "a1")).unwrap();

        assert_eq!(second.prev_hash, first.hash);
        assert_eq!(third.prev_hash, second.hash);
        log.verify_hash_chain().unwrap();
    }

    #[test]
    fn test_chain_recovered_after_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.jsonl");

        let first = {
            let log = EventLog::open(&path).unwrap();
            log.append(draft(EventType::AgentStart, "a1")).unwrap()
        };

        let log = EventLog::open(&path).unwrap();
        let second = log.append(draft(EventType::AgentAction, "a1")).unwrap();
        assert_eq!(second.prev_hash, first.hash);
        log.verify_hash_chain().unwrap();
    }

    #[test]
    fn test_verify_detects_payload_tampering() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let log = EventLog::open(&path).unwrap();

        log.append(draft(EventType::AgentStart, "a1").with_payload("n", 1))
            .unwrap();
        log.append(draft(EventType::AgentAction, "a1")).unwrap();

        // Tamper with the first record's payload on disk
        let content = fs::read_to_string(&path).unwrap();
        let tampered = content.replacen("\"n\":1", "\"n\":2", 1);
        assert_ne!(content, tampered);
        fs::write(&path, tampered).unwrap();

        let err = log.verify_hash_chain().unwrap_err();
        match err {
            DurabilityError::HashChainBroken { line, .. } => assert_eq!(line, 1),
            other => panic!("Expected HashChainBroken, got {other:?}"),
        }
    }

    #[test]
    fn test_verify_detects_deleted_record() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let log = EventLog::open(&path).unwrap();

        for _ in 0..3 {
            log.append(draft(EventType::AgentAction, "a1")).unwrap();
        }

        // Drop the middle record
        let lines: Vec<String> = fs::read_to_string(&path)
            .unwrap()
            .lines()
            .map(String::from)
            .collect();
        fs::write(&path, format!("{}\n{}\n", lines[0], lines[2])).unwrap();

        let err = log.verify_hash_chain().unwrap_err();
        match err {
            DurabilityError::HashChainBroken { line, .. } => assert_eq!(line, 2),
            other => panic!("Expected HashChainBroken, got {other:?}"),
        }
    }

    #[test]
    fn test_verify_empty_log_succeeds() {
        let dir = tempdir().unwrap();
        let log = log_in(dir.path());
        log.verify_hash_chain().unwrap();
    }

    #[test]
    fn test_filters() {
        let dir = tempdir().unwrap();
        let log = log_in(dir.path());

        log.append(draft(EventType::AgentStart, "a1").with_task("T-1"))
            .unwrap();
        log.append(draft(EventType::AgentStart, "a2").with_task("T-2"))
            .unwrap();
        log.append(draft(EventType::AgentComplete, "a1").with_task("T-1"))
            .unwrap();

        assert_eq!(log.filter_by_agent("a1").unwrap().len(), 2);
        assert_eq!(log.filter_by_agent("a2").unwrap().len(), 1);
        assert_eq!(log.filter_by_task("T-1").unwrap().len(), 2);
        assert!(log.filter_by_task("T-9").unwrap().is_empty());
    }

    #[test]
    fn test_aggregated_stats() {
        let dir = tempdir().unwrap();
        let log = log_in(dir.path());

        log.append(draft(EventType::AgentStart, "a1")).unwrap();
        log.append(draft(EventType::AgentComplete, "a1")).unwrap();
        log.append(EventDraft::new(EventType::AgentStart, "a2", "reviewer"))
            .unwrap();

        let stats = log.aggregated_stats().unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.by_type["agent_start"], 2);
        assert_eq!(stats.by_type["agent_complete"], 1);
        assert_eq!(stats.by_agent["a1"], 2);
        assert_eq!(stats.by_role["implementer"], 2);
        assert_eq!(stats.by_role["reviewer"], 1);
    }

    #[test]
    fn test_concurrent_appends_keep_chain_intact() {
        use std::sync::Arc;
        let dir = tempdir().unwrap();
        let log = Arc::new(log_in(dir.path()));

        let mut handles = Vec::new();
        for i in 0..4 {
            let log = Arc::clone(&log);
            handles.push(std::thread::spawn(move || {
                for _ in 0..10 {
                    log.append(draft(EventType::AgentAction, &format!("a{i}")))
                        .unwrap();
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(log.read_all().unwrap().len(), 40);
        log.verify_hash_chain().unwrap();
    }
}
