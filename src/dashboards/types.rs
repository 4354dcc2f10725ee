use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::chat::ChatStatus;
use crate::core::shared::enums::{TicketPriority, TicketStatus};
use crate::core::shared::models::ChatRecord;
use crate::core::shared::utils::{round2, truncate_chars};
use crate::tickets::visibility::TicketView;

pub const RECENT_LIMIT: i64 = 10;
pub const PREVIEW_CHARS: usize = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TicketStats {
    pub total: i64,
    pub open: i64,
    pub in_progress: i64,
    pub closed: i64,
    pub unassigned_open: i64,
}

impl TicketStats {
    pub fn from_counts(counts: &[(TicketStatus, i64)], unassigned_open: i64) -> Self {
        let mut stats = Self {
            unassigned_open,
            ..Self::default()
        };
        for (status, count) in counts {
            stats.total += count;
            match status {
                TicketStatus::Open => stats.open += count,
                TicketStatus::InProgress => stats.in_progress += count,
                TicketStatus::Closed => stats.closed += count,
            }
        }
        stats
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RecentTicket {
    pub id: i32,
    pub query: String,
    pub status: TicketStatus,
    pub priority: TicketPriority,
    pub client_username: String,
    pub assigned_developer: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<TicketView> for RecentTicket {
    fn from(view: TicketView) -> Self {
        Self {
            id: view.ticket.id,
            query: truncate_chars(&view.ticket.query, PREVIEW_CHARS),
            status: view.ticket.status,
            priority: view.ticket.priority,
            client_username: view.client_username,
            assigned_developer: view.assigned_developer,
            created_at: view.ticket.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AdminDashboard {
    pub user_counts: BTreeMap<String, i64>,
    pub ticket_stats: TicketStats,
    pub recent_tickets: Vec<RecentTicket>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeveloperWorkload {
    pub id: i32,
    pub username: String,
    pub active_tickets: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PmDashboard {
    #[serde(flatten)]
    pub overview: AdminDashboard,
    pub unassigned_tickets: Vec<RecentTicket>,
    pub developers: Vec<DeveloperWorkload>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkloadStats {
    pub assigned: usize,
    pub completed_today: usize,
    pub avg_completion_hours: f64,
    pub priority_distribution: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeveloperDashboard {
    pub assigned_tickets: Vec<TicketView>,
    pub available_tickets: Vec<TicketView>,
    pub completed_today: Vec<TicketView>,
    pub stats: WorkloadStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClientDashboard {
    pub total_tickets: i64,
    pub open_tickets: i64,
    pub closed_tickets: i64,
    pub recent_chats: Vec<ChatRecord>,
    pub recent_tickets: Vec<RecentTicket>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PerformancePeriod {
    Week,
    Month,
    #[default]
    All,
}

impl PerformancePeriod {
    pub fn since(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Week => Some(now - Duration::days(7)),
            Self::Month => Some(now - Duration::days(30)),
            Self::All => None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PerformanceParams {
    #[serde(default)]
    pub period: PerformancePeriod,
}

/// One assigned ticket as seen by the performance report.
#[derive(Debug, Clone, PartialEq)]
pub struct AssignedTicket {
    pub developer_id: i32,
    pub status: TicketStatus,
    pub assigned_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl AssignedTicket {
    pub fn completion_hours(&self) -> Option<f64> {
        let completed = self.completed_at?;
        let started = self.assigned_at.unwrap_or(self.created_at);
        Some((completed - started).num_seconds().max(0) as f64 / 3600.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeveloperPerformance {
    pub developer_id: i32,
    pub username: String,
    pub total_tickets: usize,
    pub completed_tickets: usize,
    pub in_progress_tickets: usize,
    pub completion_rate: f64,
    pub avg_completion_hours: f64,
}

pub fn average_hours(tickets: &[&AssignedTicket]) -> f64 {
    let hours: Vec<f64> = tickets.iter().filter_map(|t| t.completion_hours()).collect();
    if hours.is_empty() {
        0.0
    } else {
        round2(hours.iter().sum::<f64>() / hours.len() as f64)
    }
}

/// Per-developer totals, most completed first.
pub fn summarize_performance(
    developers: &[(i32, String)],
    tickets: &[AssignedTicket],
) -> Vec<DeveloperPerformance> {
    let mut report: Vec<DeveloperPerformance> = developers
        .iter()
        .map(|(id, username)| {
            let mine: Vec<&AssignedTicket> =
                tickets.iter().filter(|t| t.developer_id == *id).collect();
            let completed = mine.iter().filter(|t| t.completed_at.is_some()).count();
            let in_progress = mine
                .iter()
                .filter(|t| t.status == TicketStatus::InProgress)
                .count();
            let completion_rate = if mine.is_empty() {
                0.0
            } else {
                round2(completed as f64 * 100.0 / mine.len() as f64)
            };
            DeveloperPerformance {
                developer_id: *id,
                username: username.clone(),
                total_tickets: mine.len(),
                completed_tickets: completed,
                in_progress_tickets: in_progress,
                completion_rate,
                avg_completion_hours: average_hours(&mine),
            }
        })
        .collect();

    report.sort_by(|a, b| {
        b.completed_tickets
            .cmp(&a.completed_tickets)
            .then_with(|| a.username.cmp(&b.username))
    });
    report
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChatAnalytics {
    pub total_exchanges: i64,
    /// Conversations the client confirmed as solved.
    pub ai_resolved: i64,
    /// Conversations that ended in a ticket.
    pub human_escalated: i64,
}

impl ChatAnalytics {
    /// Builds the summary from per-status exchange counts.
    pub fn from_statuses(counts: &[(String, i64)]) -> Self {
        let mut analytics = Self::default();
        for (status, count) in counts {
            analytics.total_exchanges += count;
            if status == ChatStatus::Resolved.as_str() {
                analytics.ai_resolved += count;
            } else if status == ChatStatus::TicketCreated.as_str() {
                analytics.human_escalated += count;
            }
        }
        analytics
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Analytics {
    pub chat: ChatAnalytics,
    pub tickets_by_status: BTreeMap<String, i64>,
    pub tickets_by_priority: BTreeMap<String, i64>,
}
