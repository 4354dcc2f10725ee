use chrono::{DateTime, Utc};
use diesel::dsl::count_star;
use diesel::prelude::*;
use std::collections::BTreeMap;

use super::types::{AssignedTicket, ChatAnalytics, DeveloperWorkload, TicketStats};
use crate::core::shared::enums::{Role, TicketPriority, TicketStatus};
use crate::core::shared::error::ApiError;
use crate::core::shared::models::{chat_history, tickets, users};

pub fn user_counts(conn: &mut PgConnection) -> Result<BTreeMap<String, i64>, ApiError> {
    let rows: Vec<(Role, i64)> = users::table
        .group_by(users::role)
        .select((users::role, count_star()))
        .load(conn)?;
    let mut counts: BTreeMap<String, i64> = Role::ALL.iter().map(|r| (r.to_string(), 0)).collect();
    for (role, count) in rows {
        counts.insert(role.to_string(), count);
    }
    Ok(counts)
}

fn status_counts(
    conn: &mut PgConnection,
    client_id: Option<i32>,
) -> Result<Vec<(TicketStatus, i64)>, ApiError> {
    let rows = match client_id {
        Some(id) => tickets::table
            .filter(tickets::user_id.eq(id))
            .group_by(tickets::status)
            .select((tickets::status, count_star()))
            .load(conn)?,
        None => tickets::table
            .group_by(tickets::status)
            .select((tickets::status, count_star()))
            .load(conn)?,
    };
    Ok(rows)
}

/// Status totals, across all tickets or for one client.
pub fn ticket_stats(conn: &mut PgConnection, client_id: Option<i32>) -> Result<TicketStats, ApiError> {
    let counts = status_counts(conn, client_id)?;
    let unassigned = tickets::table
        .filter(tickets::status.eq(TicketStatus::Open))
        .filter(tickets::assigned_to.is_null());
    let unassigned_open: i64 = match client_id {
        Some(id) => unassigned
            .filter(tickets::user_id.eq(id))
            .count()
            .get_result(conn)?,
        None => unassigned.count().get_result(conn)?,
    };
    Ok(TicketStats::from_counts(&counts, unassigned_open))
}

pub fn tickets_by_status(conn: &mut PgConnection) -> Result<BTreeMap<String, i64>, ApiError> {
    Ok(status_counts(conn, None)?
        .into_iter()
        .map(|(status, count)| (status.to_string(), count))
        .collect())
}

pub fn tickets_by_priority(conn: &mut PgConnection) -> Result<BTreeMap<String, i64>, ApiError> {
    let rows: Vec<(TicketPriority, i64)> = tickets::table
        .group_by(tickets::priority)
        .select((tickets::priority, count_star()))
        .load(conn)?;
    let mut counts: BTreeMap<String, i64> =
        TicketPriority::ALL.iter().map(|p| (p.to_string(), 0)).collect();
    for (priority, count) in rows {
        counts.insert(priority.to_string(), count);
    }
    Ok(counts)
}

pub fn active_developers(conn: &mut PgConnection) -> Result<Vec<(i32, String)>, ApiError> {
    Ok(users::table
        .filter(users::role.eq(Role::Developer))
        .filter(users::is_active.eq(true))
        .order(users::username.asc())
        .select((users::id, users::username))
        .load(conn)?)
}

pub fn developer_workloads(conn: &mut PgConnection) -> Result<Vec<DeveloperWorkload>, ApiError> {
    let developers = active_developers(conn)?;
    let loads: BTreeMap<i32, i64> = tickets::table
        .filter(tickets::status.eq_any(TicketStatus::ACTIVE.to_vec()))
        .filter(tickets::assigned_to.is_not_null())
        .group_by(tickets::assigned_to)
        .select((tickets::assigned_to, count_star()))
        .load::<(Option<i32>, i64)>(conn)?
        .into_iter()
        .filter_map(|(id, count)| id.map(|id| (id, count)))
        .collect();

    Ok(developers
        .into_iter()
        .map(|(id, username)| DeveloperWorkload {
            active_tickets: loads.get(&id).copied().unwrap_or(0),
            id,
            username,
        })
        .collect())
}

/// Assigned tickets created since `since`, optionally for one developer.
pub fn assigned_tickets(
    conn: &mut PgConnection,
    since: Option<DateTime<Utc>>,
    developer_id: Option<i32>,
) -> Result<Vec<AssignedTicket>, ApiError> {
    let mut query = tickets::table
        .filter(tickets::assigned_to.is_not_null())
        .select((
            tickets::assigned_to,
            tickets::status,
            tickets::assigned_at,
            tickets::completed_at,
            tickets::created_at,
        ))
        .into_boxed();
    if let Some(since) = since {
        query = query.filter(tickets::created_at.ge(since));
    }
    if let Some(id) = developer_id {
        query = query.filter(tickets::assigned_to.eq(id));
    }

    type Row = (
        Option<i32>,
        TicketStatus,
        Option<DateTime<Utc>>,
        Option<DateTime<Utc>>,
        DateTime<Utc>,
    );
    let rows: Vec<Row> = query.load(conn)?;
    Ok(rows
        .into_iter()
        .filter_map(|(assigned_to, status, assigned_at, completed_at, created_at)| {
            assigned_to.map(|developer_id| AssignedTicket {
                developer_id,
                status,
                assigned_at,
                completed_at,
                created_at,
            })
        })
        .collect())
}

pub fn chat_analytics(conn: &mut PgConnection) -> Result<ChatAnalytics, ApiError> {
    let counts: Vec<(String, i64)> = chat_history::table
        .group_by(chat_history::status)
        .select((chat_history::status, count_star()))
        .load(conn)?;
    Ok(ChatAnalytics::from_statuses(&counts))
}
