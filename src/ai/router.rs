//! Keyword rules deciding escalation, category, and suggested priority.

use serde::Serialize;

use crate::core::shared::enums::TicketPriority;

pub const ESCALATION_KEYWORDS: &[&str] = &[
    "error",
    "crash",
    "bug",
    "fail",
    "broken",
    "down",
    "payment",
    "billing",
    "charge",
    "deploy",
    "server",
    "database",
    "critical",
    "urgent",
    "hack",
    "security",
    "not working",
    "doesn't work",
    "can't access",
    "unable to",
    "help me",
    "stuck",
    "problem",
    "issue",
    "trouble",
    "emergency",
];

const TECHNICAL_KEYWORDS: &[&str] = &[
    "error",
    "bug",
    "crash",
    "not working",
    "broken",
    "server",
    "database",
    "code",
];
const BILLING_KEYWORDS: &[&str] = &[
    "payment",
    "billing",
    "invoice",
    "charge",
    "subscription",
    "price",
    "cost",
];
const ACCOUNT_KEYWORDS: &[&str] = &["password", "login", "account", "register", "email", "profile"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryCategory {
    Technical,
    Billing,
    Account,
    General,
}

impl QueryCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Technical => "technical",
            Self::Billing => "billing",
            Self::Account => "account",
            Self::General => "general",
        }
    }
}

fn contains_any(query_lower: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| query_lower.contains(k))
}

pub fn has_escalation_trigger(query: &str) -> bool {
    contains_any(&query.to_lowercase(), ESCALATION_KEYWORDS)
}

pub fn needs_escalation(query: &str, confidence: f64, threshold: f64) -> bool {
    has_escalation_trigger(query) || confidence < threshold
}

pub fn categorize(query: &str) -> QueryCategory {
    let q = query.to_lowercase();
    if contains_any(&q, TECHNICAL_KEYWORDS) {
        QueryCategory::Technical
    } else if contains_any(&q, BILLING_KEYWORDS) {
        QueryCategory::Billing
    } else if contains_any(&q, ACCOUNT_KEYWORDS) {
        QueryCategory::Account
    } else {
        QueryCategory::General
    }
}

pub fn suggested_priority(query: &str) -> TicketPriority {
    let q = query.to_lowercase();
    if q.contains("urgent") || q.contains("critical") {
        TicketPriority::High
    } else {
        TicketPriority::Medium
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escalation_by_keyword_or_confidence() {
        assert!(needs_escalation("The server is DOWN", 0.95, 0.6));
        assert!(needs_escalation("My app doesn't work", 0.9, 0.6));
        assert!(needs_escalation("what are your hours", 0.3, 0.6));
        assert!(!needs_escalation("what are your hours", 0.85, 0.6));
        assert!(!needs_escalation("what are your hours", 0.6, 0.6));
    }

    #[test]
    fn test_categorize_precedence() {
        assert_eq!(categorize("payment page shows an error"), QueryCategory::Technical);
        assert_eq!(categorize("Where is my invoice?"), QueryCategory::Billing);
        assert_eq!(categorize("change my profile picture"), QueryCategory::Account);
        assert_eq!(categorize("office hours?"), QueryCategory::General);
    }

    #[test]
    fn test_suggested_priority() {
        assert_eq!(suggested_priority("URGENT: vpn down"), TicketPriority::High);
        assert_eq!(suggested_priority("critical outage"), TicketPriority::High);
        assert_eq!(suggested_priority("printer is slow"), TicketPriority::Medium);
    }
}
