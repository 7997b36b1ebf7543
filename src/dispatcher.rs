//! Turns a matched rule into an action and, where the behavior calls for
//! one, a create-issue payload. Nothing here talks to the tracker.

use crate::config::{Behavior, Rule};
use crate::email::Email;
use crate::error::EngineError;
use crate::triage;
use serde::{Deserialize, Serialize};

const NO_SUBJECT: &str = "(no subject)";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuePayload {
    pub project: String,
    pub issue_type: String,
    pub summary: String,
    pub description: String,
    pub reporter: String,
    #[serde(default)]
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DispatchAction {
    /// Send the payload to the tracker now.
    Submit,
    /// Keep the payload until a human confirms it.
    Draft,
    /// No payload; a human decides what happens.
    Hold,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchResult {
    pub action: DispatchAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<IssuePayload>,
}

#[derive(Debug, Clone)]
pub struct Dispatcher {
    default_labels: Vec<String>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(Self::default_labels())
    }
}

impl Dispatcher {
    pub fn default_labels() -> Vec<String> {
        vec!["feedback-triage".to_string()]
    }

    pub fn new(default_labels: Vec<String>) -> Self {
        Self { default_labels }
    }

    pub fn dispatch(&self, email: &Email, rule: &Rule) -> Result<DispatchResult, EngineError> {
        let result = match rule.behavior {
            Behavior::AutoCreate => DispatchResult {
                action: DispatchAction::Submit,
                payload: Some(self.build_payload(email, rule)?),
            },
            Behavior::CreateDraft => DispatchResult {
                action: DispatchAction::Draft,
                payload: Some(self.build_payload(email, rule)?),
            },
            Behavior::ManualReview => DispatchResult {
                action: DispatchAction::Hold,
                payload: None,
            },
        };

        log::info!(
            "Rule '{}' ({}) dispatched email {} as {:?}",
            rule.name,
            rule.behavior,
            email.id,
            result.action
        );
        Ok(result)
    }

    pub fn build_payload(&self, email: &Email, rule: &Rule) -> Result<IssuePayload, EngineError> {
        let project = rule.target.project.trim();
        let issue_type = rule.target.issue_type.trim();
        if project.is_empty() || issue_type.is_empty() {
            return Err(EngineError::Configuration {
                rule_id: rule.id.clone(),
                reason: "rule target needs both a project and an issue type".to_string(),
            });
        }

        let summary = match email.subject.trim() {
            "" => NO_SUBJECT.to_string(),
            _ => email.subject.clone(),
        };

        let mut labels = self.default_labels.clone();
        for label in triage::triage_email(email).labels() {
            if !labels.iter().any(|l| l == label) {
                labels.push(label.to_string());
            }
        }

        Ok(IssuePayload {
            project: project.to_string(),
            issue_type: issue_type.to_string(),
            summary,
            description: email.body.clone(),
            reporter: email.sender.clone(),
            labels,
        })
    }
}

/// Dispatches with the default label set.
pub fn dispatch(email: &Email, rule: &Rule) -> Result<DispatchResult, EngineError> {
    Dispatcher::default().dispatch(email, rule)
}
