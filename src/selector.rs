use crate::config::{MatchPolicy, Rule};
use crate::email::Email;
use crate::matcher;

/// Picks the rules that fire for `email`.
///
/// Only active rules are considered. Matches are ordered by `created_at`
/// ascending, ties broken by rule id so the order is stable. Under
/// `FirstMatch` at most one rule is returned. An empty result is not an
/// error.
pub fn select<'a>(email: &Email, rules: &'a [Rule], policy: MatchPolicy) -> Vec<&'a Rule> {
    let mut matching: Vec<&Rule> = rules
        .iter()
        .filter(|rule| rule.is_active())
        .filter(|rule| matcher::matches(email, &rule.trigger))
        .collect();

    matching.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });

    if policy == MatchPolicy::FirstMatch {
        matching.truncate(1);
    }

    if matching.is_empty() {
        log::debug!("No active rule matched email {}", email.id);
    } else {
        let names: Vec<&str> = matching.iter().map(|r| r.name.as_str()).collect();
        log::debug!("Email {} selected rules: {names:?}", email.id);
    }

    matching
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Behavior, RuleStatus, Target, Trigger};
    use chrono::{TimeZone, Utc};

    fn rule(id: &str, day: u32, trigger: Trigger, status: RuleStatus) -> Rule {
        Rule {
            id: id.to_string(),
            name: format!("Rule {id}"),
            trigger,
            target: Target {
                project: "SUPPORT".to_string(),
                issue_type: "Bug".to_string(),
            },
            status,
            behavior: Behavior::AutoCreate,
            created_at: Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap(),
        }
    }

    fn support_label() -> Trigger {
        Trigger::Label {
            value: "Support".to_string(),
        }
    }

    fn crash_keyword() -> Trigger {
        Trigger::Keyword {
            value: "crash".to_string(),
        }
    }

    #[test]
    fn test_first_match_picks_oldest_rule() {
        let rules = vec![
            rule("newer", 20, support_label(), RuleStatus::Active),
            rule("older", 5, crash_keyword(), RuleStatus::Active),
        ];
        let email = Email::new("1", "App crash", "a@b.com").with_labels(&["Support"]);

        let selected = select(&email, &rules, MatchPolicy::FirstMatch);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].id, "older");
    }

    #[test]
    fn test_fire_all_orders_by_creation() {
        let rules = vec![
            rule("c", 20, support_label(), RuleStatus::Active),
            rule("a", 5, crash_keyword(), RuleStatus::Active),
            rule("b", 5, support_label(), RuleStatus::Active),
        ];
        let email = Email::new("1", "App crash", "a@b.com").with_labels(&["Support"]);

        let ids: Vec<&str> = select(&email, &rules, MatchPolicy::FireAll)
            .iter()
            .map(|r| r.id.as_str())
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_paused_rules_never_selected() {
        let rules = vec![
            rule("paused", 1, support_label(), RuleStatus::Paused),
            rule("active", 2, crash_keyword(), RuleStatus::Active),
        ];
        let email = Email::new("1", "Question", "a@b.com").with_labels(&["Support"]);

        for policy in [MatchPolicy::FirstMatch, MatchPolicy::FireAll] {
            assert!(select(&email, &rules, policy).is_empty());
        }
    }

    #[test]
    fn test_no_match_is_empty() {
        let rules = vec![rule("r", 1, crash_keyword(), RuleStatus::Active)];
        let email = Email::new("1", "Hello there", "a@b.com");
        assert!(select(&email, &rules, MatchPolicy::FireAll).is_empty());
        assert!(select(&email, &[], MatchPolicy::FirstMatch).is_empty());
    }
}
