//! Role-scoped ticket queries and per-ticket access decisions.

use chrono::{DateTime, NaiveDate, Utc};
use diesel::dsl;
use diesel::pg::Pg;
use diesel::prelude::*;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::core::shared::enums::{Role, TicketPriority, TicketStatus};
use crate::core::shared::error::ApiError;
use crate::core::shared::models::{tickets, users, Ticket};
use crate::security::AuthenticatedUser;

pub const MAX_RESULTS: i64 = 1000;
pub const INTERNAL_NOTE_MARKER: &str = "INTERNAL:";
pub const HIDDEN_NOTES: &str = "[Internal notes hidden]";
const SLOW_QUERY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketScope {
    /// Only tickets the client opened.
    Own(i32),
    /// OPEN and IN_PROGRESS tickets.
    Active,
    All,
}

impl TicketScope {
    pub fn for_user(user: &AuthenticatedUser) -> Self {
        match user.role {
            Role::Client => Self::Own(user.user_id),
            Role::Developer | Role::ProjectManager => Self::Active,
            Role::Admin => Self::All,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssigneeFilter {
    Unassigned,
    Developers(Vec<i32>),
}

/// Raw query-string filters.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TicketFilterParams {
    pub status: Option<String>,
    pub priority: Option<String>,
    pub assigned_to: Option<String>,
    pub search: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TicketFilter {
    pub statuses: Vec<TicketStatus>,
    pub priorities: Vec<TicketPriority>,
    pub assignee: Option<AssigneeFilter>,
    pub search: Option<String>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
    pub limit: i64,
}

impl Default for TicketFilter {
    fn default() -> Self {
        Self {
            statuses: Vec::new(),
            priorities: Vec::new(),
            assignee: None,
            search: None,
            created_from: None,
            created_to: None,
            limit: MAX_RESULTS,
        }
    }
}

impl TicketFilter {
    pub fn with_statuses(statuses: &[TicketStatus]) -> Self {
        Self {
            statuses: statuses.to_vec(),
            ..Self::default()
        }
    }

    pub fn unassigned() -> Self {
        Self {
            assignee: Some(AssigneeFilter::Unassigned),
            ..Self::default()
        }
    }
}

fn split_list(raw: &Option<String>) -> Vec<&str> {
    raw.as_deref()
        .map(|s| s.split(',').map(str::trim).filter(|v| !v.is_empty()).collect())
        .unwrap_or_default()
}

fn parse_date(raw: &str, end_of_day: bool) -> Result<DateTime<Utc>, ApiError> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| ApiError::BadRequest(format!("Invalid date: {raw}")))?;
    let time = if end_of_day {
        date.and_hms_opt(23, 59, 59)
    } else {
        date.and_hms_opt(0, 0, 0)
    };
    time.map(|t| t.and_utc())
        .ok_or_else(|| ApiError::BadRequest(format!("Invalid date: {raw}")))
}

impl TryFrom<TicketFilterParams> for TicketFilter {
    type Error = ApiError;

    fn try_from(params: TicketFilterParams) -> Result<Self, Self::Error> {
        let statuses = split_list(&params.status)
            .into_iter()
            .map(|s| s.parse().map_err(ApiError::BadRequest))
            .collect::<Result<Vec<TicketStatus>, _>>()?;
        let priorities = split_list(&params.priority)
            .into_iter()
            .map(|s| s.parse().map_err(ApiError::BadRequest))
            .collect::<Result<Vec<TicketPriority>, _>>()?;

        let assignee = match params.assigned_to.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(v) if v.eq_ignore_ascii_case("unassigned") => Some(AssigneeFilter::Unassigned),
            Some(_) => Some(AssigneeFilter::Developers(
                split_list(&params.assigned_to)
                    .into_iter()
                    .map(|id| {
                        id.parse::<i32>()
                            .map_err(|_| ApiError::BadRequest(format!("Invalid developer id: {id}")))
                    })
                    .collect::<Result<_, _>>()?,
            )),
        };

        let search = params
            .search
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        Ok(Self {
            statuses,
            priorities,
            assignee,
            search,
            created_from: params.date_from.as_deref().map(|d| parse_date(d, false)).transpose()?,
            created_to: params.date_to.as_deref().map(|d| parse_date(d, true)).transpose()?,
            limit: params.limit.unwrap_or(MAX_RESULTS).clamp(1, MAX_RESULTS),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TicketView {
    #[serde(flatten)]
    pub ticket: Ticket,
    pub client_username: String,
    pub assigned_developer: Option<String>,
}

/// Escapes LIKE wildcards in user-supplied search text.
fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

type TicketQuery = dsl::IntoBoxed<
    'static,
    dsl::Select<
        dsl::InnerJoin<tickets::table, users::table>,
        (dsl::AsSelect<Ticket, Pg>, users::username),
    >,
    Pg,
>;

/// Role scope ANDed with every requested filter, newest first.
pub(crate) fn ticket_query(user: &AuthenticatedUser, filter: &TicketFilter) -> TicketQuery {
    let mut query = tickets::table
        .inner_join(users::table)
        .select((Ticket::as_select(), users::username))
        .into_boxed();

    query = match TicketScope::for_user(user) {
        TicketScope::Own(id) => query.filter(tickets::user_id.eq(id)),
        TicketScope::Active => query.filter(tickets::status.eq_any(TicketStatus::ACTIVE.to_vec())),
        TicketScope::All => query,
    };

    if !filter.statuses.is_empty() {
        query = query.filter(tickets::status.eq_any(filter.statuses.clone()));
    }
    if !filter.priorities.is_empty() {
        query = query.filter(tickets::priority.eq_any(filter.priorities.clone()));
    }
    match &filter.assignee {
        Some(AssigneeFilter::Unassigned) => query = query.filter(tickets::assigned_to.is_null()),
        Some(AssigneeFilter::Developers(ids)) => {
            query = query.filter(tickets::assigned_to.eq_any(ids.clone()))
        }
        None => {}
    }
    if let Some(term) = &filter.search {
        let pattern = like_pattern(term);
        query = query.filter(
            tickets::query
                .ilike(pattern.clone())
                .or(users::username.ilike(pattern)),
        );
    }
    if let Some(from) = filter.created_from {
        query = query.filter(tickets::created_at.ge(from));
    }
    if let Some(to) = filter.created_to {
        query = query.filter(tickets::created_at.le(to));
    }

    query
        .order(tickets::created_at.desc())
        .limit(filter.limit.clamp(1, MAX_RESULTS))
}

pub fn query_tickets(
    conn: &mut PgConnection,
    user: &AuthenticatedUser,
    filter: &TicketFilter,
) -> Result<Vec<TicketView>, ApiError> {
    let rows: Vec<(Ticket, String)> = ticket_query(user, filter).load(conn)?;

    let views = attach_developer_names(conn, rows)?;
    Ok(redact_for(user, views))
}

pub fn load_ticket_view(conn: &mut PgConnection, ticket_id: i32) -> Result<TicketView, ApiError> {
    let row: (Ticket, String) = tickets::table
        .inner_join(users::table)
        .filter(tickets::id.eq(ticket_id))
        .select((Ticket::as_select(), users::username))
        .first(conn)
        .optional()?
        .ok_or_else(|| ApiError::NotFound(format!("Ticket {ticket_id} not found")))?;

    Ok(attach_developer_names(conn, vec![row])?.remove(0))
}

/// Closed tickets a developer resolved, newest completion first.
pub fn completed_by(
    conn: &mut PgConnection,
    developer_id: i32,
    limit: i64,
) -> Result<Vec<TicketView>, ApiError> {
    let rows: Vec<(Ticket, String)> = tickets::table
        .inner_join(users::table)
        .filter(tickets::assigned_to.eq(developer_id))
        .filter(tickets::status.eq(TicketStatus::Closed))
        .filter(tickets::completed_at.is_not_null())
        .order(tickets::completed_at.desc())
        .limit(limit.clamp(1, MAX_RESULTS))
        .select((Ticket::as_select(), users::username))
        .load(conn)?;
    attach_developer_names(conn, rows)
}

fn attach_developer_names(
    conn: &mut PgConnection,
    rows: Vec<(Ticket, String)>,
) -> Result<Vec<TicketView>, ApiError> {
    let mut ids: Vec<i32> = rows.iter().filter_map(|(t, _)| t.assigned_to).collect();
    ids.sort_unstable();
    ids.dedup();

    let names: HashMap<i32, String> = if ids.is_empty() {
        HashMap::new()
    } else {
        users::table
            .filter(users::id.eq_any(ids))
            .select((users::id, users::username))
            .load::<(i32, String)>(conn)?
            .into_iter()
            .collect()
    };

    Ok(rows
        .into_iter()
        .map(|(ticket, client_username)| {
            let assigned_developer = ticket.assigned_to.and_then(|id| names.get(&id).cloned());
            TicketView {
                ticket,
                client_username,
                assigned_developer,
            }
        })
        .collect())
}

/// Strips internal fields for non-admins and re-checks client ownership.
pub fn redact_for(user: &AuthenticatedUser, mut views: Vec<TicketView>) -> Vec<TicketView> {
    if user.is_admin() {
        return views;
    }
    if user.role == Role::Client {
        views.retain(|v| v.ticket.user_id == user.user_id);
    }
    for view in &mut views {
        redact_ticket(&mut view.ticket);
    }
    views
}

pub fn redact_ticket(ticket: &mut Ticket) {
    if ticket
        .assignment_notes
        .as_deref()
        .is_some_and(|n| n.contains(INTERNAL_NOTE_MARKER))
    {
        ticket.assignment_notes = Some(HIDDEN_NOTES.to_string());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketAction {
    View,
    Assign,
    Complete,
    Update,
    Pass,
    Cancel,
}

pub fn check_ticket_access(
    user: &AuthenticatedUser,
    ticket: &Ticket,
    action: TicketAction,
) -> Result<(), ApiError> {
    let assigned_to_me = ticket.assigned_to == Some(user.user_id);
    let (allowed, reason) = match user.role {
        Role::Admin => (true, ""),
        Role::Client => (ticket.user_id == user.user_id, "You can only access your own tickets"),
        Role::Developer => match action {
            TicketAction::View => (ticket.status.is_active(), "Ticket is not active"),
            TicketAction::Assign => (
                ticket.status == TicketStatus::Open && ticket.assigned_to.is_none(),
                "Ticket not found or already assigned",
            ),
            TicketAction::Complete
            | TicketAction::Update
            | TicketAction::Pass
            | TicketAction::Cancel => (assigned_to_me, "Ticket not assigned to you"),
        },
        Role::ProjectManager => match action {
            TicketAction::View => (ticket.status.is_active(), "Ticket is not active"),
            TicketAction::Assign => (
                ticket.status == TicketStatus::Open,
                "Only open tickets can be assigned",
            ),
            TicketAction::Complete
            | TicketAction::Update
            | TicketAction::Pass
            | TicketAction::Cancel => (false, "Project managers cannot modify ticket progress"),
        },
    };

    if allowed {
        Ok(())
    } else {
        debug!(
            "Denied {:?} on ticket {} for user {} ({})",
            action, ticket.id, user.user_id, user.role
        );
        Err(ApiError::Forbidden(reason.to_string()))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct QueryStatsSnapshot {
    pub total_queries: u64,
    pub avg_response_ms: f64,
}

#[derive(Debug, Default)]
pub struct QueryStats {
    inner: Mutex<QueryStatsSnapshot>,
}

impl QueryStats {
    pub fn record(&self, elapsed: Duration) {
        if elapsed > SLOW_QUERY {
            warn!("Slow ticket visibility query: {:?}", elapsed);
        }
        let mut stats = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let ms = elapsed.as_secs_f64() * 1000.0;
        stats.total_queries += 1;
        stats.avg_response_ms += (ms - stats.avg_response_ms) / stats.total_queries as f64;
    }

    pub fn snapshot(&self) -> QueryStatsSnapshot {
        *self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Runs `f`, recording its wall time.
    pub fn measure<T>(&self, f: impl FnOnce() -> T) -> T {
        let started = Instant::now();
        let out = f();
        self.record(started.elapsed());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: i32, role: Role) -> AuthenticatedUser {
        AuthenticatedUser {
            user_id: id,
            username: format!("user{id}"),
            role,
        }
    }

    fn ticket(owner: i32, status: TicketStatus, assigned_to: Option<i32>) -> Ticket {
        let now = Utc::now();
        Ticket {
            id: 1,
            user_id: owner,
            query: "printer jam".into(),
            status,
            priority: TicketPriority::Medium,
            reply: None,
            assigned_to,
            assigned_by: None,
            assigned_at: None,
            assignment_notes: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_scope_by_role() {
        assert_eq!(TicketScope::for_user(&user(5, Role::Client)), TicketScope::Own(5));
        assert_eq!(TicketScope::for_user(&user(2, Role::Developer)), TicketScope::Active);
        assert_eq!(TicketScope::for_user(&user(3, Role::ProjectManager)), TicketScope::Active);
        assert_eq!(TicketScope::for_user(&user(1, Role::Admin)), TicketScope::All);
    }

    #[test]
    fn test_client_only_own_tickets() {
        let client = user(5, Role::Client);
        assert!(check_ticket_access(&client, &ticket(5, TicketStatus::Closed, None), TicketAction::View).is_ok());
        assert!(check_ticket_access(&client, &ticket(6, TicketStatus::Open, None), TicketAction::View).is_err());
    }

    #[test]
    fn test_developer_rules() {
        let dev = user(2, Role::Developer);
        let open = ticket(5, TicketStatus::Open, None);
        let mine = ticket(5, TicketStatus::InProgress, Some(2));
        let theirs = ticket(5, TicketStatus::InProgress, Some(9));

        assert!(check_ticket_access(&dev, &open, TicketAction::View).is_ok());
        assert!(check_ticket_access(&dev, &open, TicketAction::Assign).is_ok());
        assert!(check_ticket_access(&dev, &mine, TicketAction::Assign).is_err());
        assert!(check_ticket_access(&dev, &mine, TicketAction::Complete).is_ok());
        assert!(check_ticket_access(&dev, &theirs, TicketAction::Pass).is_err());
        assert!(check_ticket_access(&dev, &ticket(5, TicketStatus::Closed, None), TicketAction::View).is_err());
    }

    #[test]
    fn test_pm_rules() {
        let pm = user(3, Role::ProjectManager);
        let open = ticket(5, TicketStatus::Open, Some(2));
        assert!(check_ticket_access(&pm, &open, TicketAction::Assign).is_ok());
        assert!(check_ticket_access(&pm, &ticket(5, TicketStatus::InProgress, Some(2)), TicketAction::Assign).is_err());
        assert!(check_ticket_access(&pm, &open, TicketAction::Complete).is_err());
        assert!(check_ticket_access(&pm, &open, TicketAction::Update).is_err());
    }

    #[test]
    fn test_admin_allowed_everything() {
        let admin = user(1, Role::Admin);
        let closed = ticket(5, TicketStatus::Closed, Some(2));
        for action in [TicketAction::View, TicketAction::Assign, TicketAction::Complete, TicketAction::Cancel] {
            assert!(check_ticket_access(&admin, &closed, action).is_ok());
        }
    }

    #[test]
    fn test_redaction() {
        let mut t = ticket(5, TicketStatus::InProgress, Some(2));
        t.assignment_notes = Some("INTERNAL: customer is on legacy plan".into());
        let view = TicketView {
            ticket: t,
            client_username: "client5".into(),
            assigned_developer: Some("dev".into()),
        };

        let admin_views = redact_for(&user(1, Role::Admin), vec![view.clone()]);
        assert!(admin_views[0].ticket.assignment_notes.as_deref().unwrap().starts_with("INTERNAL:"));

        let dev_views = redact_for(&user(2, Role::Developer), vec![view.clone()]);
        assert_eq!(dev_views[0].ticket.assignment_notes.as_deref(), Some(HIDDEN_NOTES));

        assert!(redact_for(&user(6, Role::Client), vec![view]).is_empty());
    }

    #[test]
    fn test_filter_parsing() {
        let filter = TicketFilter::try_from(TicketFilterParams {
            status: Some("open, in_progress".into()),
            priority: Some("HIGH".into()),
            assigned_to: Some("4,7".into()),
            search: Some("  vpn ".into()),
            date_from: Some("2024-03-01".into()),
            date_to: Some("2024-03-31".into()),
            limit: Some(50_000),
        })
        .unwrap();

        assert_eq!(filter.statuses, vec![TicketStatus::Open, TicketStatus::InProgress]);
        assert_eq!(filter.priorities, vec![TicketPriority::High]);
        assert_eq!(filter.assignee, Some(AssigneeFilter::Developers(vec![4, 7])));
        assert_eq!(filter.search.as_deref(), Some("vpn"));
        assert_eq!(filter.limit, MAX_RESULTS);
        assert!(filter.created_from.unwrap() < filter.created_to.unwrap());
    }

    #[test]
    fn test_filter_unassigned_and_errors() {
        let filter = TicketFilter::try_from(TicketFilterParams {
            assigned_to: Some("Unassigned".into()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(filter.assignee, Some(AssigneeFilter::Unassigned));

        let bad = TicketFilter::try_from(TicketFilterParams {
            status: Some("DONE".into()),
            ..Default::default()
        });
        assert!(bad.is_err());
    }

    fn sql_for(user: &AuthenticatedUser, filter: &TicketFilter) -> String {
        diesel::debug_query::<Pg, _>(&ticket_query(user, filter)).to_string()
    }

    fn where_clause(sql: &str) -> &str {
        let start = sql.find(" WHERE ").map_or(sql.len(), |i| i + 7);
        let end = sql.find(" ORDER BY ").unwrap_or(sql.len());
        &sql[start.min(end)..end]
    }

    #[test]
    fn test_scope_sql_per_role() {
        let filter = TicketFilter::default();

        let client = sql_for(&user(5, Role::Client), &filter);
        assert!(where_clause(&client).contains(r#""tickets"."user_id" = $1"#));
        assert!(!where_clause(&client).contains("status"));

        for role in [Role::Developer, Role::ProjectManager] {
            let sql = sql_for(&user(2, role), &filter);
            assert!(where_clause(&sql).contains(r#""tickets"."status" = ANY($1)"#));
            assert!(!where_clause(&sql).contains("user_id"));
        }

        let admin = sql_for(&user(1, Role::Admin), &filter);
        assert!(!admin.contains(" WHERE "));
        assert!(admin.contains(r#"INNER JOIN "users""#));
        assert!(admin.contains(r#"ORDER BY "tickets"."created_at" DESC LIMIT $1"#));
        assert!(admin.ends_with("binds: [1000]"));
    }

    #[test]
    fn test_filters_are_anded_onto_scope() {
        let filter = TicketFilter {
            statuses: vec![TicketStatus::Open],
            priorities: vec![TicketPriority::High, TicketPriority::Critical],
            assignee: Some(AssigneeFilter::Unassigned),
            search: Some("vpn".into()),
            created_from: Some(Utc::now() - chrono::Duration::days(7)),
            created_to: Some(Utc::now()),
            limit: 25,
        };
        let sql = sql_for(&user(5, Role::Client), &filter);
        let clause = where_clause(&sql);

        assert!(clause.contains(r#""tickets"."user_id" = $1"#));
        assert!(clause.contains(r#""tickets"."status" = ANY("#));
        assert!(clause.contains(r#""tickets"."priority" = ANY("#));
        assert!(clause.contains(r#""tickets"."assigned_to" IS NULL"#));
        assert!(clause.contains(r#""tickets"."query" ILIKE"#));
        assert!(clause.contains(r#""users"."username" ILIKE"#));
        assert!(clause.contains(r#""tickets"."created_at" >= $"#));
        assert!(clause.contains(r#""tickets"."created_at" <= $"#));
        assert_eq!(clause.matches(" OR ").count(), 1);
        assert_eq!(clause.matches(" AND ").count(), 6);
        assert!(sql.contains(r#""%vpn%""#));
        assert!(sql.ends_with(", 25]"));
    }

    #[test]
    fn test_assignee_list_and_limit_clamp() {
        let filter = TicketFilter {
            assignee: Some(AssigneeFilter::Developers(vec![4, 7])),
            limit: 0,
            ..TicketFilter::default()
        };
        let sql = sql_for(&user(1, Role::Admin), &filter);
        assert!(where_clause(&sql).contains(r#""tickets"."assigned_to" = ANY($1)"#));
        assert!(sql.ends_with("binds: [[4, 7], 1]"));
    }

    #[test]
    fn test_like_pattern_escapes() {
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }

    #[test]
    fn test_query_stats_running_average() {
        let stats = QueryStats::default();
        stats.record(Duration::from_millis(10));
        stats.record(Duration::from_millis(30));
        let snap = stats.snapshot();
        assert_eq!(snap.total_queries, 2);
        assert!((snap.avg_response_ms - 20.0).abs() < 1e-6);
        assert_eq!(stats.measure(|| 7), 7);
        assert_eq!(stats.snapshot().total_queries, 3);
    }
}
