//! Fan-out of ticket lifecycle events to in-app notifications and email.

use diesel::prelude::*;
use log::{error, warn};
use std::collections::HashMap;
use std::sync::Arc;

use crate::core::shared::enums::Role;
use crate::core::shared::models::{
    notifications, user_settings, users, NewNotification, Ticket, User, UserSettingsRow,
};
use crate::core::shared::state::AppState;
use crate::core::shared::utils::{truncate_chars, with_conn};
use crate::email::templates::{self, EmailContent, TicketEmailContext};
use crate::email::OutgoingEmail;

#[derive(Debug, Clone, PartialEq)]
pub enum TicketEvent {
    Created { via_chat: bool },
    Assigned { developer_id: i32, developer_name: String, assigned_by: String },
    Completed { developer_name: String },
    Passed { developer_name: String, reason: String },
    Cancelled { developer_name: String, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailAudience {
    Client,
    Staff,
}

impl TicketEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Created { .. } => "ticket_created",
            Self::Assigned { .. } => "ticket_assigned",
            Self::Completed { .. } => "ticket_completed",
            Self::Passed { .. } => "ticket_passed",
            Self::Cancelled { .. } => "ticket_cancelled",
        }
    }

    pub fn email_audience(&self) -> EmailAudience {
        match self {
            Self::Passed { .. } => EmailAudience::Staff,
            _ => EmailAudience::Client,
        }
    }

    fn developer_name(&self) -> Option<&str> {
        match self {
            Self::Created { .. } => None,
            Self::Assigned { developer_name, .. }
            | Self::Completed { developer_name }
            | Self::Passed { developer_name, .. }
            | Self::Cancelled { developer_name, .. } => Some(developer_name),
        }
    }

    fn notes(&self, ticket: &Ticket) -> Option<String> {
        match self {
            Self::Completed { .. } => ticket.reply.clone(),
            Self::Passed { reason, .. } | Self::Cancelled { reason, .. } => Some(reason.clone()),
            _ => None,
        }
    }

    pub fn render_email(&self, ctx: &TicketEmailContext) -> EmailContent {
        match self {
            Self::Created { .. } => templates::ticket_created(ctx),
            Self::Assigned { .. } => templates::developer_assigned(ctx),
            Self::Completed { .. } => templates::ticket_completed(ctx),
            Self::Passed { .. } => templates::ticket_passed(ctx),
            Self::Cancelled { .. } => templates::ticket_cancelled(ctx),
        }
    }
}

fn to_user(user_id: i32, ticket_id: i32, kind: &str, message: String) -> NewNotification {
    NewNotification {
        user_id: Some(user_id),
        role: None,
        ticket_id: Some(ticket_id),
        message,
        notification_type: kind.to_string(),
    }
}

fn to_role(role: Role, ticket_id: i32, kind: &str, message: String) -> NewNotification {
    NewNotification {
        user_id: None,
        role: Some(role),
        ticket_id: Some(ticket_id),
        message,
        notification_type: kind.to_string(),
    }
}

pub fn plan_notifications(event: &TicketEvent, ticket: &Ticket, client_name: &str) -> Vec<NewNotification> {
    let id = ticket.id;
    let kind = event.kind();
    match event {
        TicketEvent::Created { via_chat: true } => vec![
            to_role(
                Role::Admin,
                id,
                kind,
                format!("🤖 AI Assistant created ticket #{id}: {}", truncate_chars(&ticket.query, 100)),
            ),
            to_role(
                Role::ProjectManager,
                id,
                kind,
                format!("🎫 New AI-generated ticket #{id} needs assignment"),
            ),
        ],
        TicketEvent::Created { via_chat: false } => {
            let message = format!(
                "🎫 New ticket #{id} from {client_name}: {}",
                truncate_chars(&ticket.query, 100)
            );
            vec![
                to_role(Role::Admin, id, kind, message.clone()),
                to_role(Role::ProjectManager, id, kind, message),
            ]
        }
        TicketEvent::Assigned {
            developer_id,
            developer_name,
            assigned_by,
        } => vec![
            to_user(
                *developer_id,
                id,
                kind,
                format!("📋 You've been assigned ticket #{id}: {}", truncate_chars(&ticket.query, 80)),
            ),
            to_role(
                Role::Admin,
                id,
                kind,
                format!("✅ Ticket #{id} assigned to {developer_name} by {assigned_by}"),
            ),
        ],
        TicketEvent::Completed { developer_name } => vec![
            to_role(Role::Admin, id, kind, format!("✅ Ticket #{id} completed by {developer_name}")),
            to_role(
                Role::ProjectManager,
                id,
                kind,
                format!("🎉 Ticket #{id} has been resolved by {developer_name}"),
            ),
            to_user(ticket.user_id, id, kind, format!("Your ticket #{id} has been resolved")),
        ],
        TicketEvent::Passed { reason, .. } => {
            let message = format!("Ticket {id} passed back by developer: {reason}");
            vec![
                to_role(Role::Admin, id, kind, message.clone()),
                to_role(Role::ProjectManager, id, kind, message),
            ]
        }
        TicketEvent::Cancelled { reason, .. } => {
            let staff = format!("Ticket {id} cancelled by developer: {reason}");
            vec![
                to_user(ticket.user_id, id, kind, format!("Your ticket {id} was cancelled: {reason}")),
                to_role(Role::Admin, id, kind, staff.clone()),
                to_role(Role::ProjectManager, id, kind, staff),
            ]
        }
    }
}

/// Addresses of recipients who have not opted out of email.
pub fn email_recipients(recipients: &[User], settings: &HashMap<i32, UserSettingsRow>) -> Vec<String> {
    recipients
        .iter()
        .filter_map(|user| match settings.get(&user.id) {
            Some(s) if !s.email_notifications => None,
            Some(s) => s
                .email
                .as_deref()
                .map(str::trim)
                .filter(|e| !e.is_empty())
                .map(str::to_string)
                .or_else(|| Some(user.email.clone())),
            None => Some(user.email.clone()),
        })
        .filter(|email| !email.trim().is_empty())
        .collect()
}

fn collect_emails(
    conn: &mut PgConnection,
    event: &TicketEvent,
    ticket: &Ticket,
    client: &User,
) -> Result<Vec<OutgoingEmail>, diesel::result::Error> {
    let recipients: Vec<User> = match event.email_audience() {
        EmailAudience::Client => vec![client.clone()],
        EmailAudience::Staff => users::table
            .filter(users::role.eq_any(vec![Role::Admin, Role::ProjectManager]))
            .filter(users::is_active.eq(true))
            .select(User::as_select())
            .load(conn)?,
    };

    let ids: Vec<i32> = recipients.iter().map(|u| u.id).collect();
    let settings: HashMap<i32, UserSettingsRow> = user_settings::table
        .filter(user_settings::user_id.eq_any(ids))
        .select(UserSettingsRow::as_select())
        .load(conn)?
        .into_iter()
        .map(|row| (row.user_id, row))
        .collect();

    let ctx = TicketEmailContext {
        ticket_id: ticket.id,
        client_name: client.username.clone(),
        query: ticket.query.clone(),
        priority: ticket.priority,
        developer_name: event.developer_name().map(str::to_string),
        notes: event.notes(ticket),
    };
    let content = event.render_email(&ctx);

    Ok(email_recipients(&recipients, &settings)
        .into_iter()
        .map(|to| OutgoingEmail {
            to,
            content: content.clone(),
        })
        .collect())
}

/// Records in-app notifications and queues emails. Failures are logged only.
pub async fn dispatch(state: &Arc<AppState>, ticket: Ticket, event: TicketEvent) {
    let ticket_id = ticket.id;
    let result = with_conn(&state.conn, move |conn| {
        let client: User = users::table
            .find(ticket.user_id)
            .select(User::as_select())
            .first(conn)?;

        let planned = plan_notifications(&event, &ticket, &client.username);
        diesel::insert_into(notifications::table)
            .values(&planned)
            .execute(conn)?;

        Ok(collect_emails(conn, &event, &ticket, &client)?)
    })
    .await;

    match result {
        Ok(emails) if emails.is_empty() => {
            warn!("No email recipients for ticket {ticket_id} event");
        }
        Ok(emails) => state.email.send_all(emails),
        Err(e) => error!("Failed to dispatch notifications for ticket {ticket_id}: {e}"),
    }
}
