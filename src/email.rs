use anyhow::Context;
use chrono::{DateTime, TimeZone, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;

lazy_static! {
    // "Display Name" <user@example.com>
    static ref NAMED_ADDRESS: Regex = Regex::new(r#"^\s*"?([^"<]*?)"?\s*<([^<>]+)>\s*$"#)
        .expect("named address pattern is valid");
}

/// A fetched message, read-only once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Email {
    #[serde(alias = "email_id", alias = "message_id")]
    pub id: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default, alias = "from", alias = "from_email")]
    pub sender: String,
    #[serde(default, alias = "from_name", skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    #[serde(default, alias = "body_text", alias = "text")]
    pub body: String,
    #[serde(
        default = "Utc::now",
        alias = "date",
        alias = "receivedAt",
        alias = "internalDate",
        deserialize_with = "deserialize_timestamp"
    )]
    pub received_at: DateTime<Utc>,
    #[serde(default, alias = "labelIds")]
    pub labels: BTreeSet<String>,
}

impl Email {
    pub fn new(id: &str, subject: &str, sender: &str) -> Self {
        let mut email = Self {
            id: id.to_string(),
            subject: subject.to_string(),
            sender: sender.to_string(),
            sender_name: None,
            body: String::new(),
            received_at: Utc::now(),
            labels: BTreeSet::new(),
        };
        email.normalize_sender();
        email
    }

    pub fn with_body(mut self, body: &str) -> Self {
        self.body = body.to_string();
        self
    }

    pub fn with_labels(mut self, labels: &[&str]) -> Self {
        self.labels = labels.iter().map(|l| l.to_string()).collect();
        self
    }

    pub fn with_received_at(mut self, received_at: DateTime<Utc>) -> Self {
        self.received_at = received_at;
        self
    }

    /// Splits a `Name <addr>` sender into display name and bare address.
    fn normalize_sender(&mut self) {
        if let Some((name, address)) = parse_named_address(&self.sender) {
            if self.sender_name.is_none() && !name.is_empty() {
                self.sender_name = Some(name);
            }
            self.sender = address;
        } else {
            self.sender = self.sender.trim().to_string();
        }
    }

    pub fn from_json_str(json: &str) -> anyhow::Result<Self> {
        let mut email: Email = serde_json::from_str(json)?;
        email.normalize_sender();
        Ok(email)
    }
}

/// Loads a JSON file holding either one email object or an array of them.
pub fn load_emails(path: &str) -> anyhow::Result<Vec<Email>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read email file: {path}"))?;
    parse_emails(&content).with_context(|| format!("Failed to parse email file: {path}"))
}

pub fn parse_emails(json: &str) -> anyhow::Result<Vec<Email>> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        Many(Vec<Email>),
        One(Box<Email>),
    }

    let mut emails = match serde_json::from_str::<OneOrMany>(json)? {
        OneOrMany::Many(emails) => emails,
        OneOrMany::One(email) => vec![*email],
    };
    for email in &mut emails {
        email.normalize_sender();
    }
    Ok(emails)
}

fn parse_named_address(raw: &str) -> Option<(String, String)> {
    let caps = NAMED_ADDRESS.captures(raw)?;
    let name = caps.get(1).map(|m| m.as_str().trim()).unwrap_or("");
    let address = caps.get(2)?.as_str().trim();
    Some((name.to_string(), address.to_string()))
}

/// Accepts RFC 3339, RFC 2822 (mail `Date` header) or epoch milliseconds.
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawTimestamp {
        Millis(i64),
        Text(String),
    }

    let parsed = match RawTimestamp::deserialize(deserializer)? {
        RawTimestamp::Millis(ms) => Utc.timestamp_millis_opt(ms).single(),
        RawTimestamp::Text(text) => parse_timestamp_text(text.trim()),
    };
    parsed.ok_or_else(|| serde::de::Error::custom("unrecognised timestamp"))
}

fn parse_timestamp_text(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return Some(dt.with_timezone(&Utc));
    }
    text.parse::<i64>()
        .ok()
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_sender_is_split() {
        let email = Email::new("m1", "Hello", "Jane Partner <partner@enterprise.com>");
        assert_eq!(email.sender, "partner@enterprise.com");
        assert_eq!(email.sender_name.as_deref(), Some("Jane Partner"));
    }

    #[test]
    fn test_quoted_display_name() {
        let email = Email::new("m1", "Hello", "\"Support Desk\" <help@acme.io>");
        assert_eq!(email.sender, "help@acme.io");
        assert_eq!(email.sender_name.as_deref(), Some("Support Desk"));
    }

    #[test]
    fn test_bare_sender_kept() {
        let email = Email::new("m1", "Hello", "  urgent@customer.com ");
        assert_eq!(email.sender, "urgent@customer.com");
        assert!(email.sender_name.is_none());
    }

    #[test]
    fn test_parse_fetched_mail_shape() {
        let json = r#"{
            "id": "18c2f",
            "subject": "App crashes on login",
            "from": "User <user@example.com>",
            "body_text": "It crashes every time.",
            "date": "Mon, 15 Jan 2024 10:30:00 +0000",
            "labels": ["INBOX", "Support"]
        }"#;
        let email = Email::from_json_str(json).unwrap();
        assert_eq!(email.id, "18c2f");
        assert_eq!(email.sender, "user@example.com");
        assert_eq!(email.sender_name.as_deref(), Some("User"));
        assert_eq!(email.body, "It crashes every time.");
        assert_eq!(email.received_at.to_rfc3339(), "2024-01-15T10:30:00+00:00");
        assert!(email.labels.contains("Support"));
    }

    #[test]
    fn test_missing_sender_does_not_fail_file() {
        let json = r#"[
            {"id": "a", "subject": "No from header"},
            {"id": "b", "subject": "Normal", "from": "b@x.com"}
        ]"#;
        let emails = parse_emails(json).unwrap();
        assert_eq!(emails.len(), 2);
        assert_eq!(emails[0].sender, "");
        assert_eq!(emails[1].sender, "b@x.com");
    }

    #[test]
    fn test_parse_array_and_epoch_millis() {
        let json = r#"[
            {"id": "a", "subject": "One", "sender": "a@x.com", "received_at": "2024-03-01T08:00:00Z"},
            {"id": "b", "subject": "Two", "sender": "b@x.com", "internalDate": "1704067200000"}
        ]"#;
        let emails = parse_emails(json).unwrap();
        assert_eq!(emails.len(), 2);
        assert_eq!(emails[1].received_at.to_rfc3339(), "2024-01-01T00:00:00+00:00");
    }

    #[test]
    fn test_single_object_file() {
        let json = r#"{"id": "solo", "subject": "Hi", "sender": "s@x.com"}"#;
        let emails = parse_emails(json).unwrap();
        assert_eq!(emails.len(), 1);
        assert_eq!(emails[0].id, "solo");
    }
}
