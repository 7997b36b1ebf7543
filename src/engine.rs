//! Evaluation pipeline: match, select, dispatch, record.
//!
//! A pass is split in two. [`TriageEngine::begin_pass`] evaluates every
//! email synchronously, appends one log entry per selected rule and
//! spawns the tracker calls for `auto-create` rules without waiting on
//! them. [`PendingPass::reconcile`] then waits for those calls and
//! applies the `pending` → `success`/`failed` transitions. Dropping a
//! [`PendingPass`] abandons the outstanding calls and leaves their
//! entries pending.

use crate::config::{Config, MatchPolicy, Rule};
use crate::dispatcher::{DispatchAction, DispatchResult, Dispatcher};
use crate::email::Email;
use crate::error::EngineError;
use crate::matcher::{self, MatchResult};
use crate::recorder::{self, DispatchOutcome, LogEntry, LogStatus, LogStore, LogStoreError};
use crate::selector;
use crate::tracker::{CreatedIssue, IssueTracker, TrackerError};
use serde::Serialize;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

pub struct TriageEngine {
    rules: Arc<Vec<Rule>>,
    policy: MatchPolicy,
    dispatcher: Dispatcher,
    tracker: Arc<dyn IssueTracker>,
    store: Arc<dyn LogStore>,
}

/// What one rule would do with one email, without touching the tracker.
#[derive(Debug, Clone, Serialize)]
pub struct Preview {
    pub match_result: MatchResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dispatch: Option<DispatchResult>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PassSummary {
    pub emails: usize,
    pub unmatched_emails: usize,
    pub skipped: usize,
    pub success: usize,
    pub failed: usize,
    pub pending: usize,
    /// Emails or outcomes that could not be evaluated or recorded.
    pub errors: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PassReport {
    pub summary: PassSummary,
    pub entries: Vec<LogEntry>,
}

struct Submission {
    email_id: String,
    rule_id: String,
    handle: JoinHandle<Result<CreatedIssue, TrackerError>>,
}

/// A pass whose tracker calls may still be running.
pub struct PendingPass {
    store: Arc<dyn LogStore>,
    keys: Vec<(String, String)>,
    submissions: Vec<Submission>,
    summary: PassSummary,
}

impl TriageEngine {
    pub fn new(
        config: &Config,
        tracker: Arc<dyn IssueTracker>,
        store: Arc<dyn LogStore>,
    ) -> Result<Self, EngineError> {
        config.validate()?;

        let default_labels = config
            .jira
            .as_ref()
            .map(|j| j.default_labels.clone())
            .unwrap_or_else(Dispatcher::default_labels);

        Ok(Self {
            rules: Arc::new(config.rules.clone()),
            policy: config.match_policy,
            dispatcher: Dispatcher::new(default_labels),
            tracker,
            store,
        })
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn store(&self) -> Arc<dyn LogStore> {
        self.store.clone()
    }

    fn find_rule(&self, rule_id: &str) -> Result<&Rule, EngineError> {
        self.rules
            .iter()
            .find(|r| r.id == rule_id)
            .ok_or_else(|| EngineError::NotFound(rule_id.to_string()))
    }

    /// Selects and dispatches rules for one email. No tracker I/O.
    pub fn evaluate<'a>(
        &'a self,
        email: &Email,
    ) -> Result<Vec<(&'a Rule, DispatchResult)>, EngineError> {
        selector::select(email, &self.rules, self.policy)
            .into_iter()
            .map(|rule| Ok((rule, self.dispatcher.dispatch(email, rule)?)))
            .collect()
    }

    pub fn preview(&self, email: &Email, rule_id: &str) -> Result<Preview, EngineError> {
        let rule = self.find_rule(rule_id)?;
        let match_result = matcher::evaluate_rule(email, rule);
        let dispatch = if match_result.matched {
            Some(self.dispatcher.dispatch(email, rule)?)
        } else {
            None
        };
        Ok(Preview {
            match_result,
            dispatch,
        })
    }

    /// Evaluates all emails and starts their tracker calls.
    ///
    /// Needs a Tokio runtime for the submissions. A failure while
    /// evaluating or recording one email is logged and counted in
    /// [`PassSummary::errors`]; the rest of the pass carries on and every
    /// call already started is handed back for reconciliation. A pair
    /// already present in the log store is skipped.
    pub fn begin_pass(&self, emails: &[Email]) -> Result<PendingPass, EngineError> {
        let runtime = Handle::try_current().map_err(|_| EngineError::NoRuntime)?;

        let mut pass = PendingPass {
            store: self.store.clone(),
            keys: Vec::new(),
            submissions: Vec::new(),
            summary: PassSummary {
                emails: emails.len(),
                ..PassSummary::default()
            },
        };

        for email in emails {
            let selected = match self.evaluate(email) {
                Ok(selected) => selected,
                Err(e) => {
                    log::error!("Email {} could not be evaluated: {e}", email.id);
                    pass.summary.errors += 1;
                    continue;
                }
            };
            if selected.is_empty() {
                pass.summary.unmatched_emails += 1;
                continue;
            }

            for (rule, result) in selected {
                let DispatchResult { action, payload } = result;
                let (outcome, submission) = match (action, payload) {
                    (DispatchAction::Submit, Some(payload)) => {
                        (DispatchOutcome::Outstanding, Some(payload))
                    }
                    (DispatchAction::Draft, draft) => (DispatchOutcome::NotSubmitted { draft }, None),
                    _ => (DispatchOutcome::NotSubmitted { draft: None }, None),
                };

                match self.store.append(recorder::record(email, rule, outcome)) {
                    Ok(()) => {}
                    Err(LogStoreError::Duplicate { .. }) => {
                        log::debug!(
                            "Email {} already handled by rule '{}', skipping",
                            email.id,
                            rule.name
                        );
                        pass.summary.skipped += 1;
                        continue;
                    }
                    Err(e) => {
                        log::error!(
                            "Not dispatching email {} to rule '{}': {e}",
                            email.id,
                            rule.name
                        );
                        pass.summary.errors += 1;
                        continue;
                    }
                }
                pass.keys.push((email.id.clone(), rule.id.clone()));

                if let Some(payload) = submission {
                    let tracker = self.tracker.clone();
                    pass.submissions.push(Submission {
                        email_id: email.id.clone(),
                        rule_id: rule.id.clone(),
                        handle: runtime.spawn(async move { tracker.create_issue(&payload).await }),
                    });
                }
            }
        }

        log::info!(
            "Evaluated {} emails, {} tracker submissions in flight",
            pass.summary.emails,
            pass.submissions.len()
        );
        Ok(pass)
    }

    /// Runs a full pass and waits for every tracker call to settle.
    pub async fn run_pass(&self, emails: &[Email]) -> Result<PassReport, EngineError> {
        Ok(self.begin_pass(emails)?.reconcile().await)
    }

    /// Submits the stored draft of a pending `create-draft` entry.
    pub async fn confirm_draft(&self, email_id: &str, rule_id: &str) -> Result<LogEntry, EngineError> {
        self.find_rule(rule_id)?;

        let entry = self.store.get(email_id, rule_id).ok_or_else(|| {
            LogStoreError::NotFound {
                email_id: email_id.to_string(),
                rule_id: rule_id.to_string(),
            }
        })?;

        if entry.status != LogStatus::Pending {
            return Err(LogStoreError::AlreadyResolved {
                email_id: email_id.to_string(),
                rule_id: rule_id.to_string(),
                status: entry.status,
            }
            .into());
        }

        let draft = entry.draft.ok_or_else(|| EngineError::NoDraft {
            email_id: email_id.to_string(),
            rule_id: rule_id.to_string(),
        })?;

        log::info!("Confirming draft for email {email_id} (rule {rule_id})");
        let result = self.tracker.create_issue(&draft).await;
        Ok(self.store.resolve(email_id, rule_id, result)?)
    }
}

impl PendingPass {
    pub fn in_flight(&self) -> usize {
        self.submissions.len()
    }

    /// Waits for every outstanding tracker call and records its outcome.
    pub async fn reconcile(self) -> PassReport {
        let mut summary = self.summary;
        for submission in self.submissions {
            let result = match submission.handle.await {
                Ok(result) => result,
                Err(e) => Err(TrackerError::Network(format!("submission task aborted: {e}"))),
            };

            match self
                .store
                .resolve(&submission.email_id, &submission.rule_id, result)
            {
                Ok(entry) => log::info!(
                    "Email {} / rule '{}': {:?}",
                    entry.email_id,
                    entry.rule_name,
                    entry.status
                ),
                Err(e) => {
                    log::error!("Failed to record tracker outcome: {e}");
                    summary.errors += 1;
                }
            }
        }

        let entries: Vec<LogEntry> = self
            .keys
            .iter()
            .filter_map(|(email_id, rule_id)| self.store.get(email_id, rule_id))
            .collect();

        for entry in &entries {
            match entry.status {
                LogStatus::Success => summary.success += 1,
                LogStatus::Failed => summary.failed += 1,
                LogStatus::Pending => summary.pending += 1,
            }
        }

        log::info!(
            "Pass complete: {} emails, {} unmatched, {} skipped, {} success, {} failed, {} pending, {} errors",
            summary.emails,
            summary.unmatched_emails,
            summary.skipped,
            summary.success,
            summary.failed,
            summary.pending,
            summary.errors
        );

        PassReport { summary, entries }
    }
}
