//! Outcome recording.
//!
//! A [`LogEntry`] is written once per dispatch attempt. The only change it
//! ever sees afterwards is a single `pending` → `success`/`failed`
//! transition, applied through [`LogStore::resolve`] keyed by
//! (email id, rule id).

use crate::config::{Behavior, Rule};
use crate::dispatcher::IssuePayload;
use crate::email::Email;
use crate::tracker::{CreatedIssue, TrackerError};
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStatus {
    Success,
    Failed,
    Pending,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: Uuid,
    pub email_id: String,
    pub email_subject: String,
    pub email_sender: String,
    // Snapshot of the rule at evaluation time
    pub rule_id: String,
    pub rule_name: String,
    pub behavior: Behavior,
    pub status: LogStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jira_issue_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jira_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Payload awaiting confirmation, for `create-draft` rules.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draft: Option<IssuePayload>,
}

/// What happened to the tracker call for one dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The tracker answered with an issue.
    Created(CreatedIssue),
    /// The tracker call failed.
    Failed(TrackerError),
    /// A tracker call is in flight.
    Outstanding,
    /// The behavior made no tracker call.
    NotSubmitted { draft: Option<IssuePayload> },
}

impl From<Result<CreatedIssue, TrackerError>> for DispatchOutcome {
    fn from(result: Result<CreatedIssue, TrackerError>) -> Self {
        match result {
            Ok(created) => DispatchOutcome::Created(created),
            Err(error) => DispatchOutcome::Failed(error),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LogStoreError {
    #[error("entry for email '{email_id}' and rule '{rule_id}' already exists")]
    Duplicate { email_id: String, rule_id: String },
    #[error("no entry for email '{email_id}' and rule '{rule_id}'")]
    NotFound { email_id: String, rule_id: String },
    #[error("entry for email '{email_id}' and rule '{rule_id}' is already {status:?}")]
    AlreadyResolved {
        email_id: String,
        rule_id: String,
        status: LogStatus,
    },
    #[error("log store could not be written: {0}")]
    Io(String),
}

/// Builds the log entry for one dispatch attempt. Never fails: tracker
/// errors become `failed` entries carrying the error text.
pub fn record(email: &Email, rule: &Rule, outcome: DispatchOutcome) -> LogEntry {
    let mut entry = LogEntry {
        id: Uuid::new_v4(),
        email_id: email.id.clone(),
        email_subject: email.subject.clone(),
        email_sender: email.sender.clone(),
        rule_id: rule.id.clone(),
        rule_name: rule.name.clone(),
        behavior: rule.behavior,
        status: LogStatus::Pending,
        timestamp: Utc::now(),
        resolved_at: None,
        jira_issue_key: None,
        jira_url: None,
        error: None,
        draft: None,
    };

    match outcome {
        DispatchOutcome::Created(created) => {
            entry.status = LogStatus::Success;
            entry.jira_issue_key = Some(created.key);
            entry.jira_url = created.url;
        }
        DispatchOutcome::Failed(error) => {
            entry.status = LogStatus::Failed;
            entry.error = Some(error.to_string());
        }
        DispatchOutcome::Outstanding => {}
        DispatchOutcome::NotSubmitted { draft } => {
            entry.draft = draft;
        }
    }

    entry
}

impl LogEntry {
    /// Applies the one permitted transition out of `pending`.
    pub fn resolve(
        &mut self,
        result: Result<CreatedIssue, TrackerError>,
    ) -> Result<(), LogStoreError> {
        if self.status != LogStatus::Pending {
            return Err(LogStoreError::AlreadyResolved {
                email_id: self.email_id.clone(),
                rule_id: self.rule_id.clone(),
                status: self.status,
            });
        }

        match result {
            Ok(created) => {
                self.status = LogStatus::Success;
                self.jira_issue_key = Some(created.key);
                self.jira_url = created.url;
            }
            Err(error) => {
                self.status = LogStatus::Failed;
                self.error = Some(error.to_string());
            }
        }
        self.resolved_at = Some(Utc::now());
        Ok(())
    }
}

/// Append-only storage for log entries.
pub trait LogStore: Send + Sync {
    /// Stores a new entry; fails if (email id, rule id) is already present.
    fn append(&self, entry: LogEntry) -> Result<(), LogStoreError>;

    /// Moves a pending entry to its terminal status and returns the result.
    fn resolve(
        &self,
        email_id: &str,
        rule_id: &str,
        result: Result<CreatedIssue, TrackerError>,
    ) -> Result<LogEntry, LogStoreError>;

    fn get(&self, email_id: &str, rule_id: &str) -> Option<LogEntry>;

    /// All entries in append order.
    fn entries(&self) -> Vec<LogEntry>;
}

#[derive(Default)]
struct MemoryInner {
    entries: Vec<LogEntry>,
    index: HashMap<(String, String), usize>,
}

impl MemoryInner {
    fn position(&self, email_id: &str, rule_id: &str) -> Option<usize> {
        self.index
            .get(&(email_id.to_string(), rule_id.to_string()))
            .copied()
    }

    fn insert(&mut self, entry: LogEntry) -> Result<(), LogStoreError> {
        let key = (entry.email_id.clone(), entry.rule_id.clone());
        if self.index.contains_key(&key) {
            return Err(LogStoreError::Duplicate {
                email_id: key.0,
                rule_id: key.1,
            });
        }
        self.index.insert(key, self.entries.len());
        self.entries.push(entry);
        Ok(())
    }

    /// Undoes the most recent `insert`.
    fn pop(&mut self) {
        if let Some(entry) = self.entries.pop() {
            self.index.remove(&(entry.email_id, entry.rule_id));
        }
    }

    /// Resolves in place and returns the entry as it was before.
    fn resolve(
        &mut self,
        email_id: &str,
        rule_id: &str,
        result: Result<CreatedIssue, TrackerError>,
    ) -> Result<(usize, LogEntry), LogStoreError> {
        let position = self
            .position(email_id, rule_id)
            .ok_or_else(|| LogStoreError::NotFound {
                email_id: email_id.to_string(),
                rule_id: rule_id.to_string(),
            })?;

        let entry = &mut self.entries[position];
        let before = entry.clone();
        entry.resolve(result)?;
        Ok((position, before))
    }

    fn get(&self, email_id: &str, rule_id: &str) -> Option<LogEntry> {
        self.position(email_id, rule_id)
            .map(|position| self.entries[position].clone())
    }
}

fn lock_inner(inner: &Mutex<MemoryInner>) -> MutexGuard<'_, MemoryInner> {
    // Entries are swapped whole, so a poisoned lock still guards consistent data
    inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Process-local log store.
#[derive(Default)]
pub struct MemoryLogStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LogStore for MemoryLogStore {
    fn append(&self, entry: LogEntry) -> Result<(), LogStoreError> {
        lock_inner(&self.inner).insert(entry)
    }

    fn resolve(
        &self,
        email_id: &str,
        rule_id: &str,
        result: Result<CreatedIssue, TrackerError>,
    ) -> Result<LogEntry, LogStoreError> {
        let mut inner = lock_inner(&self.inner);
        let (position, _) = inner.resolve(email_id, rule_id, result)?;
        Ok(inner.entries[position].clone())
    }

    fn get(&self, email_id: &str, rule_id: &str) -> Option<LogEntry> {
        lock_inner(&self.inner).get(email_id, rule_id)
    }

    fn entries(&self) -> Vec<LogEntry> {
        lock_inner(&self.inner).entries.clone()
    }
}

/// Log store persisted as a JSON array, rewritten after every change.
///
/// Survives process restarts, so repeat runs over the same mail skip
/// pairs already handled and stored drafts can be confirmed later. A
/// change that cannot be written is rolled back and reported as
/// [`LogStoreError::Io`].
pub struct JsonFileLogStore {
    path: PathBuf,
    inner: Mutex<MemoryInner>,
}

impl JsonFileLogStore {
    /// Opens `path`, starting empty if it does not exist yet.
    pub fn open<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut inner = MemoryInner::default();

        if path.exists() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read log file: {}", path.display()))?;
            if !content.trim().is_empty() {
                let entries: Vec<LogEntry> = serde_json::from_str(&content)
                    .with_context(|| format!("Failed to parse log file: {}", path.display()))?;
                for entry in entries {
                    if let Err(e) = inner.insert(entry) {
                        log::warn!("Ignoring entry in {}: {e}", path.display());
                    }
                }
            }
            log::debug!(
                "Loaded {} log entries from {}",
                inner.entries.len(),
                path.display()
            );
        }

        Ok(Self {
            path,
            inner: Mutex::new(inner),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &[LogEntry]) -> Result<(), LogStoreError> {
        let json = serde_json::to_string_pretty(entries).map_err(|e| self.io_error(e))?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        std::fs::write(&tmp, json).map_err(|e| self.io_error(e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| self.io_error(e))
    }

    fn io_error(&self, e: impl std::fmt::Display) -> LogStoreError {
        LogStoreError::Io(format!("{}: {e}", self.path.display()))
    }
}

impl LogStore for JsonFileLogStore {
    fn append(&self, entry: LogEntry) -> Result<(), LogStoreError> {
        let mut inner = lock_inner(&self.inner);
        inner.insert(entry)?;
        if let Err(e) = self.persist(&inner.entries) {
            inner.pop();
            return Err(e);
        }
        Ok(())
    }

    fn resolve(
        &self,
        email_id: &str,
        rule_id: &str,
        result: Result<CreatedIssue, TrackerError>,
    ) -> Result<LogEntry, LogStoreError> {
        let mut inner = lock_inner(&self.inner);
        let (position, before) = inner.resolve(email_id, rule_id, result)?;
        if let Err(e) = self.persist(&inner.entries) {
            inner.entries[position] = before;
            return Err(e);
        }
        Ok(inner.entries[position].clone())
    }

    fn get(&self, email_id: &str, rule_id: &str) -> Option<LogEntry> {
        lock_inner(&self.inner).get(email_id, rule_id)
    }

    fn entries(&self) -> Vec<LogEntry> {
        lock_inner(&self.inner).entries.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RuleStatus, Target, Trigger};

    fn rule(behavior: Behavior) -> Rule {
        Rule {
            id: "r1".to_string(),
            name: "Support".to_string(),
            trigger: Trigger::Label {
                value: "Support".to_string(),
            },
            target: Target {
                project: "SUPPORT".to_string(),
                issue_type: "Bug".to_string(),
            },
            status: RuleStatus::Active,
            behavior,
            created_at: Utc::now(),
        }
    }

    fn email() -> Email {
        Email::new("m1", "Checkout broken", "urgent@customer.com")
    }

    fn created(key: &str) -> CreatedIssue {
        CreatedIssue {
            key: key.to_string(),
            url: None,
        }
    }

    #[test]
    fn test_created_issue_is_success() {
        let entry = record(
            &email(),
            &rule(Behavior::AutoCreate),
            DispatchOutcome::Created(created("SUPPORT-1")),
        );
        assert_eq!(entry.status, LogStatus::Success);
        assert_eq!(entry.jira_issue_key.as_deref(), Some("SUPPORT-1"));
        assert!(entry.error.is_none());
        assert_eq!(entry.email_subject, "Checkout broken");
        assert_eq!(entry.rule_name, "Support");
    }

    #[test]
    fn test_tracker_failure_is_failed_entry() {
        let entry = record(
            &email(),
            &rule(Behavior::AutoCreate),
            DispatchOutcome::Failed(TrackerError::RateLimit),
        );
        assert_eq!(entry.status, LogStatus::Failed);
        assert_eq!(entry.error.as_deref(), Some("Jira API rate limit exceeded"));
        assert!(entry.jira_issue_key.is_none());
    }

    #[test]
    fn test_no_tracker_call_is_pending() {
        let entry = record(
            &email(),
            &rule(Behavior::ManualReview),
            DispatchOutcome::NotSubmitted { draft: None },
        );
        assert_eq!(entry.status, LogStatus::Pending);
        assert!(entry.error.is_none());
        assert!(entry.jira_issue_key.is_none());

        let outstanding = record(&email(), &rule(Behavior::AutoCreate), DispatchOutcome::Outstanding);
        assert_eq!(outstanding.status, LogStatus::Pending);
    }

    #[test]
    fn test_single_transition_only() {
        let mut entry = record(&email(), &rule(Behavior::AutoCreate), DispatchOutcome::Outstanding);
        let before = entry.clone();

        entry.resolve(Ok(created("SUPPORT-2"))).unwrap();
        assert_eq!(entry.status, LogStatus::Success);
        assert!(entry.resolved_at.is_some());
        assert_eq!(entry.id, before.id);
        assert_eq!(entry.timestamp, before.timestamp);
        assert_eq!(entry.rule_name, before.rule_name);

        let second = entry.resolve(Err(TrackerError::RateLimit));
        assert!(matches!(second, Err(LogStoreError::AlreadyResolved { .. })));
        assert_eq!(entry.status, LogStatus::Success);
        assert!(entry.error.is_none());
    }

    #[test]
    fn test_entry_survives_rule_edit() {
        let mut r = rule(Behavior::AutoCreate);
        let entry = record(&email(), &r, DispatchOutcome::Outstanding);
        r.name = "Renamed".to_string();
        assert_eq!(entry.rule_name, "Support");
    }

    #[test]
    fn test_memory_store_append_and_resolve() {
        let store = MemoryLogStore::new();
        let entry = record(&email(), &rule(Behavior::AutoCreate), DispatchOutcome::Outstanding);
        store.append(entry.clone()).unwrap();

        assert!(matches!(
            store.append(entry),
            Err(LogStoreError::Duplicate { .. })
        ));

        let resolved = store
            .resolve("m1", "r1", Err(TrackerError::Network("timeout".to_string())))
            .unwrap();
        assert_eq!(resolved.status, LogStatus::Failed);
        assert_eq!(resolved.error.as_deref(), Some("Jira request failed: timeout"));
        assert_eq!(store.get("m1", "r1").unwrap().status, LogStatus::Failed);
        assert_eq!(store.entries().len(), 1);

        assert!(matches!(
            store.resolve("m1", "missing", Ok(created("X-1"))),
            Err(LogStoreError::NotFound { .. })
        ));
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("triage-log.json");

        let store = JsonFileLogStore::open(&path).unwrap();
        assert!(store.entries().is_empty());
        store
            .append(record(&email(), &rule(Behavior::AutoCreate), DispatchOutcome::Outstanding))
            .unwrap();
        store.resolve("m1", "r1", Ok(created("SUPPORT-3"))).unwrap();
        drop(store);

        let reopened = JsonFileLogStore::open(&path).unwrap();
        let entry = reopened.get("m1", "r1").unwrap();
        assert_eq!(entry.status, LogStatus::Success);
        assert_eq!(entry.jira_issue_key.as_deref(), Some("SUPPORT-3"));
        assert!(matches!(
            reopened.append(record(&email(), &rule(Behavior::AutoCreate), DispatchOutcome::Outstanding)),
            Err(LogStoreError::Duplicate { .. })
        ));
    }

    #[test]
    fn test_file_store_keeps_draft_payload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("triage-log.json");
        let draft = IssuePayload {
            project: "PARTNER".to_string(),
            issue_type: "Task".to_string(),
            summary: "Contract renewal".to_string(),
            description: String::new(),
            reporter: "partner@enterprise.com".to_string(),
            labels: vec!["feedback-triage".to_string()],
        };

        let store = JsonFileLogStore::open(&path).unwrap();
        store
            .append(record(
                &email(),
                &rule(Behavior::CreateDraft),
                DispatchOutcome::NotSubmitted {
                    draft: Some(draft.clone()),
                },
            ))
            .unwrap();

        let reopened = JsonFileLogStore::open(&path).unwrap();
        assert_eq!(reopened.get("m1", "r1").unwrap().draft, Some(draft));
    }

    #[test]
    fn test_unwritable_file_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing-dir").join("triage-log.json");

        let store = JsonFileLogStore::open(&path).unwrap();
        let result =
            store.append(record(&email(), &rule(Behavior::AutoCreate), DispatchOutcome::Outstanding));
        assert!(matches!(result, Err(LogStoreError::Io(_))));
        assert!(store.get("m1", "r1").is_none());
        assert!(store.entries().is_empty());
    }

    #[test]
    fn test_corrupt_log_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("triage-log.json");
        std::fs::write(&path, "{not json").unwrap();

        let err = JsonFileLogStore::open(&path).err().unwrap();
        assert!(err.to_string().starts_with("Failed to parse log file"));
    }
}
