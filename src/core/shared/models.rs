use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

pub use super::enums::{Role, TicketPriority, TicketStatus};
pub use super::schema::{
    chat_history, notifications, ticket_assignment_history, tickets, user_activity_log,
    user_settings, users,
};

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct User {
    pub id: i32,
    pub username: String,
    pub password_hash: String,
    pub email: String,
    pub role: Role,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser<'a> {
    pub username: &'a str,
    pub password_hash: &'a str,
    pub email: &'a str,
    pub role: Role,
    pub is_active: bool,
}

/// User row without credentials, safe to return from the API.
#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct UserSummary {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserSummary {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            role: user.role,
            is_active: user.is_active,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = tickets)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Ticket {
    pub id: i32,
    pub user_id: i32,
    pub query: String,
    pub status: TicketStatus,
    pub priority: TicketPriority,
    pub reply: Option<String>,
    pub assigned_to: Option<i32>,
    pub assigned_by: Option<i32>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub assignment_notes: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = tickets)]
pub struct NewTicket<'a> {
    pub user_id: i32,
    pub query: &'a str,
    pub status: TicketStatus,
    pub priority: TicketPriority,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = ticket_assignment_history)]
pub struct NewAssignmentRecord<'a> {
    pub ticket_id: i32,
    pub assigned_to: i32,
    pub assigned_by: i32,
    pub notes: Option<&'a str>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = user_activity_log)]
pub struct NewActivity<'a> {
    pub user_id: Option<i32>,
    pub action: &'a str,
    pub details: Option<&'a str>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable)]
#[diesel(table_name = notifications)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Notification {
    pub id: i32,
    pub user_id: Option<i32>,
    pub role: Option<Role>,
    pub ticket_id: Option<i32>,
    pub message: String,
    #[serde(rename = "type")]
    pub notification_type: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Insertable)]
#[diesel(table_name = notifications)]
pub struct NewNotification {
    pub user_id: Option<i32>,
    pub role: Option<Role>,
    pub ticket_id: Option<i32>,
    pub message: String,
    pub notification_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable)]
#[diesel(table_name = chat_history)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ChatRecord {
    pub id: i32,
    pub user_id: i32,
    pub session_id: Option<String>,
    pub message: String,
    pub response: String,
    pub source: String,
    pub status: String,
    pub confidence: f64,
    pub ticket_created: bool,
    pub ticket_id: Option<i32>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = chat_history)]
pub struct NewChatRecord<'a> {
    pub user_id: i32,
    pub session_id: Option<&'a str>,
    pub message: &'a str,
    pub response: &'a str,
    pub source: &'a str,
    pub status: &'a str,
    pub confidence: f64,
    pub ticket_created: bool,
    pub ticket_id: Option<i32>,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = user_settings, primary_key(user_id), treat_none_as_null = true)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct UserSettingsRow {
    pub user_id: i32,
    pub email: Option<String>,
    pub email_notifications: bool,
    pub browser_notifications: bool,
    pub ticket_assignment_notifications: bool,
    pub ticket_update_notifications: bool,
    pub updated_at: DateTime<Utc>,
}
