pub mod config;
pub mod dispatcher;
pub mod email;
pub mod engine;
pub mod error;
pub mod matcher;
pub mod recorder;
pub mod selector;
pub mod tracker;
pub mod triage;

pub use config::{Behavior, Config, MatchPolicy, Rule, RuleStatus, Target, Trigger};
pub use dispatcher::{DispatchAction, DispatchResult, Dispatcher, IssuePayload};
pub use email::Email;
pub use engine::{PassReport, PassSummary, PendingPass, Preview, TriageEngine};
pub use error::EngineError;
pub use recorder::{
    DispatchOutcome, JsonFileLogStore, LogEntry, LogStatus, LogStore, LogStoreError, MemoryLogStore,
};
pub use tracker::{CreatedIssue, DisabledTracker, IssueTracker, JiraClient, TrackerError};
