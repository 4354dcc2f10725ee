//! Ticket lifecycle transitions. Every operation runs in a single transaction.

use chrono::Utc;
use diesel::dsl;
use diesel::prelude::*;
use log::info;

use super::visibility::{check_ticket_access, TicketAction};
use crate::core::shared::enums::{Role, TicketPriority, TicketStatus};
use crate::core::shared::error::ApiError;
use crate::core::shared::models::{
    ticket_assignment_history, tickets, users, NewAssignmentRecord, NewTicket, Ticket, User,
};
use crate::security::AuthenticatedUser;

pub fn require_text<'a>(value: Option<&'a str>, message: &str) -> Result<&'a str, ApiError> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::BadRequest(message.to_string()))
}

/// Developers may only move their tickets to IN_PROGRESS or CLOSED; closing needs notes.
pub fn validate_status_update(status: TicketStatus, notes: Option<&str>) -> Result<(), ApiError> {
    match status {
        TicketStatus::InProgress => Ok(()),
        TicketStatus::Closed => {
            require_text(notes, "Completion notes are required when closing a ticket").map(|_| ())
        }
        TicketStatus::Open => Err(ApiError::BadRequest(
            "Status must be IN_PROGRESS or CLOSED".to_string(),
        )),
    }
}

fn lock_ticket(conn: &mut PgConnection, ticket_id: i32) -> Result<Ticket, ApiError> {
    tickets::table
        .find(ticket_id)
        .select(Ticket::as_select())
        .for_update()
        .first(conn)
        .optional()?
        .ok_or_else(|| ApiError::NotFound(format!("Ticket {ticket_id} not found")))
}

type ActiveAssignment = dsl::Filter<
    dsl::Filter<ticket_assignment_history::table, dsl::Eq<ticket_assignment_history::ticket_id, i32>>,
    dsl::Eq<ticket_assignment_history::is_active, bool>,
>;

/// At most one row matches; the migration backs this with a partial unique index.
fn active_assignment(ticket_id: i32) -> ActiveAssignment {
    ticket_assignment_history::table
        .filter(ticket_assignment_history::ticket_id.eq(ticket_id))
        .filter(ticket_assignment_history::is_active.eq(true))
}

fn close_active_assignment(
    conn: &mut PgConnection,
    ticket_id: i32,
    note: Option<&str>,
) -> Result<usize, ApiError> {
    let target = active_assignment(ticket_id);

    let closed = match note {
        Some(note) => diesel::update(target)
            .set((
                ticket_assignment_history::is_active.eq(false),
                ticket_assignment_history::unassigned_at.eq(Some(Utc::now())),
                ticket_assignment_history::notes.eq(Some(note)),
            ))
            .execute(conn)?,
        None => diesel::update(target)
            .set((
                ticket_assignment_history::is_active.eq(false),
                ticket_assignment_history::unassigned_at.eq(Some(Utc::now())),
            ))
            .execute(conn)?,
    };
    Ok(closed)
}

fn record_assignment(
    conn: &mut PgConnection,
    ticket_id: i32,
    developer_id: i32,
    assigned_by: i32,
    notes: Option<&str>,
) -> Result<Ticket, ApiError> {
    close_active_assignment(conn, ticket_id, None)?;

    diesel::insert_into(ticket_assignment_history::table)
        .values(&NewAssignmentRecord {
            ticket_id,
            assigned_to: developer_id,
            assigned_by,
            notes,
        })
        .execute(conn)?;

    let now = Utc::now();
    let ticket = diesel::update(tickets::table.find(ticket_id))
        .set((
            tickets::assigned_to.eq(Some(developer_id)),
            tickets::assigned_by.eq(Some(assigned_by)),
            tickets::assigned_at.eq(Some(now)),
            tickets::assignment_notes.eq(notes),
            tickets::status.eq(TicketStatus::InProgress),
            tickets::updated_at.eq(now),
        ))
        .returning(Ticket::as_returning())
        .get_result(conn)?;
    Ok(ticket)
}

pub fn create_ticket(
    conn: &mut PgConnection,
    client_id: i32,
    query: &str,
    priority: TicketPriority,
) -> Result<Ticket, ApiError> {
    let query = require_text(Some(query), "Query is required")?;
    let ticket = diesel::insert_into(tickets::table)
        .values(&NewTicket {
            user_id: client_id,
            query,
            status: TicketStatus::Open,
            priority,
        })
        .returning(Ticket::as_returning())
        .get_result(conn)?;
    info!("Ticket {} created by user {}", ticket.id, client_id);
    Ok(ticket)
}

/// Admin or project-manager routing of a ticket to a developer.
pub fn assign_ticket(
    conn: &mut PgConnection,
    actor: &AuthenticatedUser,
    ticket_id: i32,
    developer_id: i32,
    notes: Option<&str>,
) -> Result<(Ticket, User), ApiError> {
    actor.require_role(&[Role::Admin, Role::ProjectManager])?;
    let notes = notes.map(str::trim).filter(|n| !n.is_empty());

    conn.transaction(|conn| {
        let ticket = lock_ticket(conn, ticket_id)?;
        if ticket.status == TicketStatus::Closed {
            return Err(ApiError::Conflict("Cannot assign a closed ticket".to_string()));
        }
        check_ticket_access(actor, &ticket, TicketAction::Assign)?;

        let developer: User = users::table
            .find(developer_id)
            .select(User::as_select())
            .first(conn)
            .optional()?
            .ok_or_else(|| ApiError::NotFound("Developer not found".to_string()))?;
        if developer.role != Role::Developer || !developer.is_active {
            return Err(ApiError::BadRequest(format!(
                "User {} is not an active developer",
                developer.username
            )));
        }

        let ticket = record_assignment(conn, ticket_id, developer_id, actor.user_id, notes)?;
        info!(
            "Ticket {} assigned to {} by {}",
            ticket_id, developer.username, actor.username
        );
        Ok((ticket, developer))
    })
}

pub fn self_assign(
    conn: &mut PgConnection,
    developer: &AuthenticatedUser,
    ticket_id: i32,
) -> Result<Ticket, ApiError> {
    developer.require_role(&[Role::Developer])?;
    conn.transaction(|conn| {
        let ticket = lock_ticket(conn, ticket_id)?;
        if ticket.status != TicketStatus::Open || ticket.assigned_to.is_some() {
            return Err(ApiError::Conflict(
                "Ticket not found or already assigned".to_string(),
            ));
        }
        record_assignment(
            conn,
            ticket_id,
            developer.user_id,
            developer.user_id,
            Some("Self-assigned"),
        )
    })
}

fn ensure_progress_action(
    developer: &AuthenticatedUser,
    ticket: &Ticket,
    action: TicketAction,
) -> Result<(), ApiError> {
    if developer.role == Role::Developer && ticket.assigned_to != Some(developer.user_id) {
        return Err(ApiError::Forbidden("Ticket not assigned to you".to_string()));
    }
    check_ticket_access(developer, ticket, action)?;
    if ticket.status == TicketStatus::Closed {
        return Err(ApiError::Conflict("Ticket is already closed".to_string()));
    }
    Ok(())
}

pub fn complete_ticket(
    conn: &mut PgConnection,
    developer: &AuthenticatedUser,
    ticket_id: i32,
    notes: Option<&str>,
) -> Result<Ticket, ApiError> {
    let notes = require_text(notes, "Completion notes are required when closing a ticket")?;
    conn.transaction(|conn| {
        let ticket = lock_ticket(conn, ticket_id)?;
        ensure_progress_action(developer, &ticket, TicketAction::Complete)?;
        close_active_assignment(conn, ticket_id, Some("Completed"))?;

        let now = Utc::now();
        let ticket = diesel::update(tickets::table.find(ticket_id))
            .set((
                tickets::status.eq(TicketStatus::Closed),
                tickets::reply.eq(Some(notes)),
                tickets::completed_at.eq(Some(now)),
                tickets::updated_at.eq(now),
            ))
            .returning(Ticket::as_returning())
            .get_result(conn)?;
        info!("Ticket {} completed by {}", ticket_id, developer.username);
        Ok(ticket)
    })
}

pub fn pass_ticket(
    conn: &mut PgConnection,
    developer: &AuthenticatedUser,
    ticket_id: i32,
    reason: Option<&str>,
) -> Result<Ticket, ApiError> {
    let reason = require_text(reason, "A reason is required to pass a ticket")?;
    conn.transaction(|conn| {
        let ticket = lock_ticket(conn, ticket_id)?;
        ensure_progress_action(developer, &ticket, TicketAction::Pass)?;
        let note = format!("Passed by developer: {reason}");
        close_active_assignment(conn, ticket_id, Some(&note))?;

        let ticket = diesel::update(tickets::table.find(ticket_id))
            .set((
                tickets::assigned_to.eq(None::<i32>),
                tickets::assigned_by.eq(None::<i32>),
                tickets::assigned_at.eq(None::<chrono::DateTime<Utc>>),
                tickets::assignment_notes.eq(Some(note.as_str())),
                tickets::status.eq(TicketStatus::Open),
                tickets::updated_at.eq(Utc::now()),
            ))
            .returning(Ticket::as_returning())
            .get_result(conn)?;
        info!("Ticket {} passed back by {}", ticket_id, developer.username);
        Ok(ticket)
    })
}

pub fn cancel_ticket(
    conn: &mut PgConnection,
    developer: &AuthenticatedUser,
    ticket_id: i32,
    reason: Option<&str>,
) -> Result<Ticket, ApiError> {
    let reason = require_text(reason, "A reason is required to cancel a ticket")?;
    conn.transaction(|conn| {
        let ticket = lock_ticket(conn, ticket_id)?;
        ensure_progress_action(developer, &ticket, TicketAction::Cancel)?;
        close_active_assignment(conn, ticket_id, Some(&format!("Cancelled by developer: {reason}")))?;

        let ticket = diesel::update(tickets::table.find(ticket_id))
            .set((
                tickets::status.eq(TicketStatus::Closed),
                tickets::reply.eq(Some(format!("Ticket canceled by developer: {reason}"))),
                tickets::updated_at.eq(Utc::now()),
            ))
            .returning(Ticket::as_returning())
            .get_result(conn)?;
        info!("Ticket {} cancelled by {}", ticket_id, developer.username);
        Ok(ticket)
    })
}

pub fn update_status(
    conn: &mut PgConnection,
    developer: &AuthenticatedUser,
    ticket_id: i32,
    status: TicketStatus,
    notes: Option<&str>,
) -> Result<Ticket, ApiError> {
    validate_status_update(status, notes)?;
    if status == TicketStatus::Closed {
        return complete_ticket(conn, developer, ticket_id, notes);
    }

    conn.transaction(|conn| {
        let ticket = lock_ticket(conn, ticket_id)?;
        ensure_progress_action(developer, &ticket, TicketAction::Update)?;
        let ticket = diesel::update(tickets::table.find(ticket_id))
            .set((tickets::status.eq(status), tickets::updated_at.eq(Utc::now())))
            .returning(Ticket::as_returning())
            .get_result(conn)?;
        Ok(ticket)
    })
}

/// Admin or assigned developer answers and closes a ticket.
pub fn reply_to_ticket(
    conn: &mut PgConnection,
    actor: &AuthenticatedUser,
    ticket_id: i32,
    reply: Option<&str>,
) -> Result<Ticket, ApiError> {
    actor.require_role(&[Role::Admin, Role::Developer])?;
    let reply = require_text(reply, "Reply is required")?;
    conn.transaction(|conn| {
        let ticket = lock_ticket(conn, ticket_id)?;
        check_ticket_access(actor, &ticket, TicketAction::Update)?;
        if ticket.assigned_to.is_some() {
            close_active_assignment(conn, ticket_id, Some("Closed with reply"))?;
        }

        let now = Utc::now();
        let ticket = diesel::update(tickets::table.find(ticket_id))
            .set((
                tickets::reply.eq(Some(reply)),
                tickets::status.eq(TicketStatus::Closed),
                tickets::completed_at.eq(Some(now)),
                tickets::updated_at.eq(now),
            ))
            .returning(Ticket::as_returning())
            .get_result(conn)?;
        Ok(ticket)
    })
}

pub fn set_priority(
    conn: &mut PgConnection,
    actor: &AuthenticatedUser,
    ticket_id: i32,
    priority: TicketPriority,
) -> Result<Ticket, ApiError> {
    actor.require_role(&[Role::Admin, Role::ProjectManager])?;
    let ticket = diesel::update(tickets::table.find(ticket_id))
        .set((tickets::priority.eq(priority), tickets::updated_at.eq(Utc::now())))
        .returning(Ticket::as_returning())
        .get_result(conn)
        .optional()?
        .ok_or_else(|| ApiError::NotFound(format!("Ticket {ticket_id} not found")))?;
    Ok(ticket)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn test_status_update_rules() {
        assert!(validate_status_update(TicketStatus::InProgress, None).is_ok());
        assert!(validate_status_update(TicketStatus::Closed, Some("fixed DNS")).is_ok());

        let err = validate_status_update(TicketStatus::Closed, Some("   ")).unwrap_err();
        assert_eq!(err.to_string(), "Bad request: Completion notes are required when closing a ticket");

        let err = validate_status_update(TicketStatus::Open, None).unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_single_active_assignment_per_ticket() {
        let schema = include_str!("../../migrations/2024-01-01-000000_create_helpdesk/up.sql");
        assert!(schema.contains(
            "CREATE UNIQUE INDEX idx_assignment_one_active\n    ON ticket_assignment_history(ticket_id) WHERE is_active;"
        ));

        let close = diesel::update(active_assignment(7)).set((
            ticket_assignment_history::is_active.eq(false),
            ticket_assignment_history::unassigned_at.eq(Some(Utc::now())),
        ));
        let sql = diesel::debug_query::<diesel::pg::Pg, _>(&close).to_string();
        assert!(sql.starts_with(r#"UPDATE "ticket_assignment_history" SET "is_active" = $1"#));
        assert!(sql.contains(r#""ticket_assignment_history"."ticket_id" = $3"#));
        assert!(sql.contains(r#""ticket_assignment_history"."is_active" = $4"#));
        assert!(sql.contains("binds: [false,"));
        assert!(sql.contains("7, true]"));
    }

    #[test]
    fn test_require_text_trims() {
        assert_eq!(require_text(Some("  reason "), "x").unwrap(), "reason");
        assert!(require_text(None, "x").is_err());
    }

    #[test]
    fn test_progress_action_requires_assignment() {
        let now = Utc::now();
        let ticket = Ticket {
            id: 9,
            user_id: 5,
            query: "laptop fan".into(),
            status: TicketStatus::InProgress,
            priority: TicketPriority::Low,
            reply: None,
            assigned_to: Some(2),
            assigned_by: Some(1),
            assigned_at: Some(now),
            assignment_notes: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        };
        let other = AuthenticatedUser {
            user_id: 3,
            username: "dev3".into(),
            role: Role::Developer,
        };
        let err = ensure_progress_action(&other, &ticket, TicketAction::Complete).unwrap_err();
        assert_eq!(err.to_string(), "Forbidden: Ticket not assigned to you");

        let owner = AuthenticatedUser {
            user_id: 2,
            ..other
        };
        assert!(ensure_progress_action(&owner, &ticket, TicketAction::Complete).is_ok());

        let closed = Ticket {
            status: TicketStatus::Closed,
            ..ticket
        };
        assert_eq!(
            ensure_progress_action(&owner, &closed, TicketAction::Cancel)
                .unwrap_err()
                .status(),
            StatusCode::CONFLICT
        );
    }
}
