use crate::error::EngineError;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub match_policy: MatchPolicy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jira: Option<JiraSettings>,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

/// How many of the matching rules fire for a single email.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchPolicy {
    /// Only the oldest matching active rule fires.
    #[default]
    FirstMatch,
    /// Every matching active rule fires, oldest first.
    FireAll,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JiraSettings {
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub api_token: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_labels")]
    pub default_labels: Vec<String>,
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_labels() -> Vec<String> {
    vec!["feedback-triage".to_string()]
}

impl Default for JiraSettings {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            email: String::new(),
            api_token: String::new(),
            timeout_seconds: default_timeout_seconds(),
            default_labels: default_labels(),
        }
    }
}

impl JiraSettings {
    /// Names of required settings that are still empty.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.base_url.trim().is_empty() {
            missing.push("base_url");
        }
        if self.email.trim().is_empty() {
            missing.push("email");
        }
        if self.api_token.trim().is_empty() {
            missing.push("api_token");
        }
        missing
    }

    pub fn ensure_complete(&self) -> anyhow::Result<()> {
        let missing = self.missing_fields();
        if !missing.is_empty() {
            anyhow::bail!("Missing Jira settings: {}", missing.join(", "));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub name: String,
    pub trigger: Trigger,
    #[serde(default)]
    pub target: Target,
    #[serde(default)]
    pub status: RuleStatus,
    pub behavior: Behavior,
    pub created_at: DateTime<Utc>,
}

impl Rule {
    pub fn is_active(&self) -> bool {
        self.status == RuleStatus::Active
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Trigger {
    /// Exact, case-sensitive membership in the email's label set.
    Label { value: String },
    /// `@domain` suffix match, or exact case-insensitive address match.
    Sender { value: String },
    /// Case-insensitive substring of the subject line.
    Keyword { value: String },
    /// Any trigger type this build does not understand.
    #[serde(other)]
    Unknown,
}

impl Trigger {
    pub fn kind(&self) -> &'static str {
        match self {
            Trigger::Label { .. } => "label",
            Trigger::Sender { .. } => "sender",
            Trigger::Keyword { .. } => "keyword",
            Trigger::Unknown => "unknown",
        }
    }

    pub fn value(&self) -> Option<&str> {
        match self {
            Trigger::Label { value } | Trigger::Sender { value } | Trigger::Keyword { value } => {
                Some(value.as_str())
            }
            Trigger::Unknown => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    #[serde(default)]
    pub project: String,
    #[serde(default)]
    pub issue_type: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleStatus {
    #[default]
    Active,
    Paused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Behavior {
    AutoCreate,
    CreateDraft,
    ManualReview,
}

impl std::fmt::Display for Behavior {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Behavior::AutoCreate => "auto-create",
            Behavior::CreateDraft => "create-draft",
            Behavior::ManualReview => "manual-review",
        };
        f.write_str(name)
    }
}

/// Checks a single rule for problems the rule store should have caught.
///
/// Paused rules only need a known trigger; they never match, so an
/// incomplete target on them is tolerated.
pub fn validate_rule(rule: &Rule) -> Result<(), EngineError> {
    let config_error = |reason: &str| EngineError::Configuration {
        rule_id: rule.id.clone(),
        reason: reason.to_string(),
    };

    if rule.id.trim().is_empty() {
        return Err(config_error("rule id is empty"));
    }

    match rule.trigger.value() {
        None => return Err(config_error("unknown trigger type")),
        Some(value) if value.trim().is_empty() => {
            return Err(config_error("trigger value is empty"))
        }
        Some(_) => {}
    }

    if rule.is_active() {
        if rule.target.project.trim().is_empty() {
            return Err(config_error("active rule has no target project"));
        }
        if rule.target.issue_type.trim().is_empty() {
            return Err(config_error("active rule has no target issue type"));
        }
    }

    Ok(())
}

impl Default for Config {
    fn default() -> Self {
        let created = |month: u32, day: u32| {
            Utc.with_ymd_and_hms(2024, month, day, 9, 0, 0)
                .single()
                .unwrap_or_else(Utc::now)
        };

        Config {
            match_policy: MatchPolicy::FirstMatch,
            logging: Some(LoggingConfig {
                level: "info".to_string(),
            }),
            jira: Some(JiraSettings {
                base_url: "https://your-domain.atlassian.net".to_string(),
                ..JiraSettings::default()
            }),
            rules: vec![
                Rule {
                    id: "rule-support".to_string(),
                    name: "Support label to SUPPORT bugs".to_string(),
                    trigger: Trigger::Label {
                        value: "Support".to_string(),
                    },
                    target: Target {
                        project: "SUPPORT".to_string(),
                        issue_type: "Bug".to_string(),
                    },
                    status: RuleStatus::Active,
                    behavior: Behavior::AutoCreate,
                    created_at: created(1, 15),
                },
                Rule {
                    id: "rule-enterprise".to_string(),
                    name: "Enterprise partner requests".to_string(),
                    trigger: Trigger::Sender {
                        value: "@enterprise.com".to_string(),
                    },
                    target: Target {
                        project: "PARTNER".to_string(),
                        issue_type: "Task".to_string(),
                    },
                    status: RuleStatus::Active,
                    behavior: Behavior::CreateDraft,
                    created_at: created(2, 1),
                },
                Rule {
                    id: "rule-bug-report".to_string(),
                    name: "Bug reports".to_string(),
                    trigger: Trigger::Keyword {
                        value: "bug report".to_string(),
                    },
                    target: Target {
                        project: "DEV".to_string(),
                        issue_type: "Bug".to_string(),
                    },
                    status: RuleStatus::Paused,
                    behavior: Behavior::ManualReview,
                    created_at: created(3, 10),
                },
            ],
        }
    }
}

impl Config {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = serde_yaml::from_str(&content)?;
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn to_file(&self, path: &str) -> anyhow::Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// `JIRA_BASE_URL`, `JIRA_EMAIL` and `JIRA_API_TOKEN` win over file values.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let env_value = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let base_url = env_value("JIRA_BASE_URL");
        let email = env_value("JIRA_EMAIL");
        let api_token = env_value("JIRA_API_TOKEN");

        if base_url.is_none() && email.is_none() && api_token.is_none() && self.jira.is_none() {
            return;
        }

        let jira = self.jira.get_or_insert_with(JiraSettings::default);
        if let Some(base_url) = base_url {
            jira.base_url = base_url;
        }
        if let Some(email) = email {
            jira.email = email;
        }
        if let Some(api_token) = api_token {
            jira.api_token = api_token;
        }
        jira.base_url = jira.base_url.trim().trim_end_matches('/').to_string();
    }

    /// Rejects malformed rules and duplicate ids.
    pub fn validate(&self) -> Result<(), EngineError> {
        let mut seen = HashSet::new();
        for rule in &self.rules {
            validate_rule(rule)?;
            if !seen.insert(rule.id.as_str()) {
                return Err(EngineError::Configuration {
                    rule_id: rule.id.clone(),
                    reason: "duplicate rule id".to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn find_rule(&self, rule_id: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.id == rule_id)
    }
}
