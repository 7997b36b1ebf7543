//! Keyword heuristics that tag an issue with a category and a priority.

use crate::email::Email;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

lazy_static! {
    static ref WHITESPACE: Regex = Regex::new(r"\s+").expect("whitespace pattern is valid");
}

const ACCOUNT_WORDS: &[&str] = &[
    "login", "log in", "sign in", "sign-in", "account", "subscription", "billing", "refund",
    "payment", "charge", "invoice", "receipt", "plan", "upgrade", "cancel",
];

const BUG_WORDS: &[&str] = &[
    "bug", "crash", "freeze", "hang", "stuck", "not working", "doesn't work", "broken", "error",
    "exception", "traceback", "fail", "failed", "failure", "issue", "can't", "cannot", "unable",
    "won't", "does not", "wrong",
];

const FEATURE_WORDS: &[&str] = &[
    "feature", "request", "could you", "can you add", "please add", "wishlist", "support",
    "would be great", "enhancement", "improve", "improvement",
];

const QUESTION_WORDS: &[&str] = &[
    "how do i", "how to", "what is", "where is", "can i", "is it possible", "question", "help",
    "why",
];

const P0_WORDS: &[&str] = &[
    "data loss", "lost emails", "lost mail", "security", "breach", "leak", "cannot access",
    "locked out", "account hacked",
];

const P1_WORDS: &[&str] = &[
    "crash", "freeze", "hang", "stuck", "cannot send", "can't send", "cannot receive",
    "can't receive", "urgent", "immediately", "asap",
];

const P2_WORDS: &[&str] = &["slow", "lag", "delay", "sometimes", "intermittent", "occasionally"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    AccountSupport,
    Bug,
    FeatureRequest,
    Question,
    Other,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::AccountSupport => "account_support",
            Classification::Bug => "bug",
            Classification::FeatureRequest => "feature_request",
            Classification::Question => "question",
            Classification::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Priority {
    P0,
    P1,
    P2,
    P3,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::P0 => "P0",
            Priority::P1 => "P1",
            Priority::P2 => "P2",
            Priority::P3 => "P3",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TriageLabels {
    pub classification: Classification,
    pub priority: Priority,
}

impl TriageLabels {
    pub fn labels(&self) -> [&'static str; 2] {
        [self.classification.as_str(), self.priority.as_str()]
    }
}

fn contains_any(text: &str, words: &[&str]) -> bool {
    words.iter().any(|w| text.contains(w))
}

pub fn normalize_text(parts: &[&str]) -> String {
    let joined = parts
        .iter()
        .filter(|p| !p.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("\n")
        .to_lowercase();
    WHITESPACE.replace_all(joined.trim(), " ").into_owned()
}

pub fn classify(text: &str) -> Classification {
    // Account words first so "issue with my invoice" is not a bug
    if contains_any(text, ACCOUNT_WORDS) {
        Classification::AccountSupport
    } else if contains_any(text, BUG_WORDS) {
        Classification::Bug
    } else if contains_any(text, FEATURE_WORDS) {
        Classification::FeatureRequest
    } else if contains_any(text, QUESTION_WORDS) {
        Classification::Question
    } else {
        Classification::Other
    }
}

pub fn priority(text: &str) -> Priority {
    if contains_any(text, P0_WORDS) {
        Priority::P0
    } else if contains_any(text, P1_WORDS) {
        Priority::P1
    } else if contains_any(text, P2_WORDS) {
        Priority::P2
    } else {
        Priority::P3
    }
}

pub fn triage_email(email: &Email) -> TriageLabels {
    let text = normalize_text(&[&email.subject, &email.body]);
    TriageLabels {
        classification: classify(&text),
        priority: priority(&text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_collapses_whitespace() {
        assert_eq!(
            normalize_text(&["  App\tCRASHES ", "", "on\n\nlogin"]),
            "app crashes on login"
        );
    }

    #[test]
    fn test_account_words_win_over_bug_words() {
        assert_eq!(
            classify("there is an issue with my invoice"),
            Classification::AccountSupport
        );
        assert_eq!(classify("the app has a bug"), Classification::Bug);
        assert_eq!(
            classify("would be great to have dark mode"),
            Classification::FeatureRequest
        );
        assert_eq!(classify("how do i export"), Classification::Question);
        assert_eq!(classify("thanks for everything"), Classification::Other);
    }

    #[test]
    fn test_priority_levels() {
        assert_eq!(priority("we had data loss overnight"), Priority::P0);
        assert_eq!(priority("urgent: crash at startup"), Priority::P1);
        assert_eq!(priority("sync is slow"), Priority::P2);
        assert_eq!(priority("minor typo"), Priority::P3);
    }

    #[test]
    fn test_triage_email_uses_subject_and_body() {
        let email = Email::new("1", "Checkout", "a@b.com").with_body("The page will freeze");
        let triage = triage_email(&email);
        assert_eq!(triage.classification, Classification::Bug);
        assert_eq!(triage.priority, Priority::P1);
        assert_eq!(triage.labels(), ["bug", "P1"]);
    }
}
