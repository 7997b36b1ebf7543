use crate::config::JiraSettings;
use crate::dispatcher::IssuePayload;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use url::Url;

const MAX_ERROR_TEXT: usize = 5000;

/// Why the issue tracker refused or failed a request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TrackerError {
    #[error("Jira authentication failed: {0}")]
    Auth(String),
    #[error("Jira API rate limit exceeded")]
    RateLimit,
    #[error("Jira rejected the issue: {0}")]
    Validation(String),
    #[error("Jira request failed: {0}")]
    Network(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedIssue {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Anything that can turn an [`IssuePayload`] into a tracker issue.
#[async_trait]
pub trait IssueTracker: Send + Sync {
    async fn create_issue(&self, payload: &IssuePayload) -> Result<CreatedIssue, TrackerError>;
}

/// Stand-in used when no tracker is configured; every call fails.
pub struct DisabledTracker;

#[async_trait]
impl IssueTracker for DisabledTracker {
    async fn create_issue(&self, _payload: &IssuePayload) -> Result<CreatedIssue, TrackerError> {
        Err(TrackerError::Auth("issue tracker is not configured".to_string()))
    }
}

/// Jira Cloud client speaking REST v2, authenticated with email + API token.
pub struct JiraClient {
    client: Client,
    base_url: Url,
    email: String,
    api_token: String,
}

#[derive(Deserialize)]
struct CreateIssueResponse {
    key: Option<String>,
}

impl JiraClient {
    pub fn new(settings: &JiraSettings) -> anyhow::Result<Self> {
        settings.ensure_complete()?;

        let base = settings.base_url.trim().trim_end_matches('/');
        let base_url = Url::parse(&format!("{base}/"))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_seconds))
            .user_agent(concat!("feedback-triage/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url,
            email: settings.email.trim().to_string(),
            api_token: settings.api_token.trim().to_string(),
        })
    }

    pub fn browse_url(&self, issue_key: &str) -> String {
        self.base_url
            .join(&format!("browse/{issue_key}"))
            .map(|u| u.to_string())
            .unwrap_or_else(|_| format!("{}browse/{issue_key}", self.base_url))
    }

    fn endpoint(&self, path: &str) -> Result<Url, TrackerError> {
        self.base_url
            .join(path)
            .map_err(|e| TrackerError::Validation(format!("invalid Jira URL: {e}")))
    }

    fn request_body(payload: &IssuePayload) -> serde_json::Value {
        let summary = if payload.summary.trim().is_empty() {
            "(no summary)"
        } else {
            payload.summary.as_str()
        };

        // Jira Cloud only accepts account ids as reporter, so the sender
        // address travels in the description instead.
        let description = format!("Reported by: {}\n\n{}", payload.reporter, payload.description);

        json!({
            "fields": {
                "project": { "key": payload.project },
                "issuetype": { "name": payload.issue_type },
                "summary": summary,
                "description": description,
                "labels": payload.labels,
            }
        })
    }
}

/// Maps an HTTP failure status to the tracker error taxonomy.
pub fn classify_status(status: StatusCode, body: &str) -> TrackerError {
    let detail = truncate(body.trim(), MAX_ERROR_TEXT);
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            TrackerError::Auth(format!("HTTP {}", status.as_u16()))
        }
        StatusCode::TOO_MANY_REQUESTS => TrackerError::RateLimit,
        s if s.is_client_error() => {
            TrackerError::Validation(format!("HTTP {}: {detail}", s.as_u16()))
        }
        s if detail.is_empty() => TrackerError::Network(format!("HTTP {}", s.as_u16())),
        s => TrackerError::Network(format!("HTTP {}: {detail}", s.as_u16())),
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[async_trait]
impl IssueTracker for JiraClient {
    async fn create_issue(&self, payload: &IssuePayload) -> Result<CreatedIssue, TrackerError> {
        let url = self.endpoint("rest/api/2/issue")?;
        log::debug!(
            "Creating {} issue in project {}",
            payload.issue_type,
            payload.project
        );

        let response = self
            .client
            .post(url)
            .basic_auth(&self.email, Some(&self.api_token))
            .header("Accept", "application/json")
            .json(&Self::request_body(payload))
            .send()
            .await
            .map_err(|e| TrackerError::Network(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let error = classify_status(status, &body);
            log::warn!("Jira create issue failed: {error}");
            return Err(error);
        }

        let created: CreateIssueResponse = response
            .json()
            .await
            .map_err(|e| TrackerError::Network(format!("unreadable Jira response: {e}")))?;

        match created.key {
            Some(key) if !key.is_empty() => {
                log::info!("Created Jira issue {key}");
                Ok(CreatedIssue {
                    url: Some(self.browse_url(&key)),
                    key,
                })
            }
            _ => Err(TrackerError::Validation(
                "Jira response did not include an issue key".to_string(),
            )),
        }
    }
}
