//! Trigger matching.
//!
//! Every function here is pure and total: an email either matches a
//! trigger or it does not. Unknown trigger types never match and are
//! reported by `Config::validate` instead.

use crate::config::{Rule, Trigger};
use crate::email::Email;
use serde::Serialize;

/// Which email field satisfied a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchField {
    Labels,
    Sender,
    Subject,
}

/// Outcome of testing one rule against one email, kept for auditing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchResult {
    pub email_id: String,
    pub rule_id: String,
    pub matched: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<MatchField>,
}

pub fn matches(email: &Email, trigger: &Trigger) -> bool {
    matched_field(email, trigger).is_some()
}

/// Returns the field that caused the match, or `None` for no match.
pub fn matched_field(email: &Email, trigger: &Trigger) -> Option<MatchField> {
    match trigger {
        Trigger::Label { value } => {
            (!value.is_empty() && email.labels.contains(value)).then_some(MatchField::Labels)
        }
        Trigger::Sender { value } => {
            sender_matches(&email.sender, value).then_some(MatchField::Sender)
        }
        Trigger::Keyword { value } => {
            keyword_matches(&email.subject, value).then_some(MatchField::Subject)
        }
        Trigger::Unknown => {
            log::warn!("Ignoring trigger of unknown type for email {}", email.id);
            None
        }
    }
}

pub fn evaluate_rule(email: &Email, rule: &Rule) -> MatchResult {
    let field = if rule.is_active() {
        matched_field(email, &rule.trigger)
    } else {
        None
    };

    log::debug!(
        "Rule '{}' ({} trigger) against email {}: {}",
        rule.name,
        rule.trigger.kind(),
        email.id,
        field.is_some()
    );

    MatchResult {
        email_id: email.id.clone(),
        rule_id: rule.id.clone(),
        matched: field.is_some(),
        field,
    }
}

/// `@domain` matches any address in exactly that domain; anything else
/// must equal the whole address. Both comparisons ignore case.
fn sender_matches(sender: &str, pattern: &str) -> bool {
    if pattern.is_empty() || pattern == "@" {
        return false;
    }

    let sender = sender.trim().to_lowercase();
    let pattern = pattern.to_lowercase();

    if pattern.starts_with('@') {
        // The '@' in the pattern anchors the suffix at the domain boundary,
        // so "user@x.com.evil.com" never matches "@x.com".
        sender.ends_with(&pattern) && sender.len() > pattern.len()
    } else {
        sender == pattern
    }
}

fn keyword_matches(subject: &str, keyword: &str) -> bool {
    if keyword.is_empty() {
        return false;
    }
    subject.to_lowercase().contains(&keyword.to_lowercase())
}
