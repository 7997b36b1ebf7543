use crate::recorder::LogStoreError;

/// Errors surfaced to callers of the triage engine.
///
/// Tracker failures never appear here; they become `failed` log entries.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Configuration error in rule '{rule_id}': {reason}")]
    Configuration { rule_id: String, reason: String },
    #[error("Rule not found: {0}")]
    NotFound(String),
    #[error("No draft awaiting confirmation for email '{email_id}' and rule '{rule_id}'")]
    NoDraft { email_id: String, rule_id: String },
    #[error("No Tokio runtime available to run tracker calls")]
    NoRuntime,
    #[error("Log store error: {0}")]
    LogStore(#[from] LogStoreError),
}
