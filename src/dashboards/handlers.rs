use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{NaiveTime, Utc};
use diesel::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::storage;
use super::types::{
    average_hours, summarize_performance, AdminDashboard, Analytics, ClientDashboard,
    DeveloperDashboard, DeveloperPerformance, PerformanceParams, PmDashboard, RecentTicket,
    WorkloadStats, RECENT_LIMIT,
};
use crate::core::shared::enums::{Role, TicketStatus};
use crate::core::shared::error::ApiError;
use crate::core::shared::models::{chat_history, ChatRecord};
use crate::core::shared::state::AppState;
use crate::core::shared::utils::with_conn;
use crate::security::AuthenticatedUser;
use crate::tickets::visibility::{
    completed_by, query_tickets, AssigneeFilter, TicketFilter, MAX_RESULTS,
};

const CLIENT_RECENT: i64 = 5;

fn recent(limit: i64) -> TicketFilter {
    TicketFilter {
        limit,
        ..TicketFilter::default()
    }
}

fn overview(conn: &mut PgConnection, user: &AuthenticatedUser) -> Result<AdminDashboard, ApiError> {
    Ok(AdminDashboard {
        user_counts: storage::user_counts(conn)?,
        ticket_stats: storage::ticket_stats(conn, None)?,
        recent_tickets: query_tickets(conn, user, &recent(RECENT_LIMIT))?
            .into_iter()
            .map(RecentTicket::from)
            .collect(),
    })
}

pub async fn admin_dashboard(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
) -> Result<Json<AdminDashboard>, ApiError> {
    user.require_role(&[Role::Admin])?;
    let dashboard = with_conn(&state.conn, move |conn| overview(conn, &user)).await?;
    Ok(Json(dashboard))
}

pub async fn pm_dashboard(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
) -> Result<Json<PmDashboard>, ApiError> {
    user.require_role(&[Role::ProjectManager])?;
    let dashboard = with_conn(&state.conn, move |conn| {
        let unassigned = TicketFilter {
            statuses: vec![TicketStatus::Open],
            limit: RECENT_LIMIT,
            ..TicketFilter::unassigned()
        };
        Ok(PmDashboard {
            overview: overview(conn, &user)?,
            unassigned_tickets: query_tickets(conn, &user, &unassigned)?
                .into_iter()
                .map(RecentTicket::from)
                .collect(),
            developers: storage::developer_workloads(conn)?,
        })
    })
    .await?;
    Ok(Json(dashboard))
}

pub async fn developer_dashboard(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
) -> Result<Json<DeveloperDashboard>, ApiError> {
    user.require_role(&[Role::Developer])?;
    let dashboard = with_conn(&state.conn, move |conn| {
        let mine = TicketFilter {
            assignee: Some(AssigneeFilter::Developers(vec![user.user_id])),
            ..TicketFilter::default()
        };
        let available = TicketFilter {
            statuses: vec![TicketStatus::Open],
            ..TicketFilter::unassigned()
        };
        let assigned_tickets = query_tickets(conn, &user, &mine)?;
        let available_tickets = query_tickets(conn, &user, &available)?;

        let today = Utc::now().date_naive().and_time(NaiveTime::MIN).and_utc();
        let completed_today: Vec<_> = completed_by(conn, user.user_id, MAX_RESULTS)?
            .into_iter()
            .filter(|v| v.ticket.completed_at.is_some_and(|at| at >= today))
            .collect();

        let history = storage::assigned_tickets(conn, None, Some(user.user_id))?;
        let mut priority_distribution: BTreeMap<String, usize> = BTreeMap::new();
        for view in &assigned_tickets {
            *priority_distribution
                .entry(view.ticket.priority.to_string())
                .or_default() += 1;
        }

        Ok(DeveloperDashboard {
            stats: WorkloadStats {
                assigned: assigned_tickets.len(),
                completed_today: completed_today.len(),
                avg_completion_hours: average_hours(&history.iter().collect::<Vec<_>>()),
                priority_distribution,
            },
            assigned_tickets,
            available_tickets,
            completed_today,
        })
    })
    .await?;
    Ok(Json(dashboard))
}

pub async fn client_dashboard(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
) -> Result<Json<ClientDashboard>, ApiError> {
    user.require_role(&[Role::Client])?;
    let dashboard = with_conn(&state.conn, move |conn| {
        let stats = storage::ticket_stats(conn, Some(user.user_id))?;
        let recent_chats: Vec<ChatRecord> = chat_history::table
            .filter(chat_history::user_id.eq(user.user_id))
            .order(chat_history::created_at.desc())
            .limit(CLIENT_RECENT)
            .select(ChatRecord::as_select())
            .load(conn)?;
        let recent_tickets = query_tickets(conn, &user, &recent(CLIENT_RECENT))?
            .into_iter()
            .map(RecentTicket::from)
            .collect();

        Ok(ClientDashboard {
            total_tickets: stats.total,
            open_tickets: stats.open + stats.in_progress,
            closed_tickets: stats.closed,
            recent_chats,
            recent_tickets,
        })
    })
    .await?;
    Ok(Json(dashboard))
}

pub async fn developer_performance(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Query(params): Query<PerformanceParams>,
) -> Result<Json<Vec<DeveloperPerformance>>, ApiError> {
    user.require_role(&[Role::Admin])?;
    let since = params.period.since(Utc::now());
    let report = with_conn(&state.conn, move |conn| {
        let developers = storage::active_developers(conn)?;
        let tickets = storage::assigned_tickets(conn, since, None)?;
        Ok(summarize_performance(&developers, &tickets))
    })
    .await?;
    Ok(Json(report))
}

pub async fn analytics(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
) -> Result<Json<Analytics>, ApiError> {
    user.require_role(&[Role::Admin, Role::ProjectManager])?;
    let report = with_conn(&state.conn, |conn| {
        Ok(Analytics {
            chat: storage::chat_analytics(conn)?,
            tickets_by_status: storage::tickets_by_status(conn)?,
            tickets_by_priority: storage::tickets_by_priority(conn)?,
        })
    })
    .await?;
    Ok(Json(report))
}
