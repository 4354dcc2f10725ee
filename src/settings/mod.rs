use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::core::shared::error::ApiError;
use crate::core::shared::models::{user_settings, UserSettingsRow};
use crate::core::shared::state::AppState;
use crate::core::shared::utils::with_conn;
use crate::core::urls::ApiUrls;
use crate::security::AuthenticatedUser;

fn enabled() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSettings {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default = "enabled")]
    pub email_notifications: bool,
    #[serde(default = "enabled")]
    pub browser_notifications: bool,
    #[serde(default = "enabled")]
    pub ticket_assignment_notifications: bool,
    #[serde(default = "enabled")]
    pub ticket_update_notifications: bool,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            email: None,
            email_notifications: true,
            browser_notifications: true,
            ticket_assignment_notifications: true,
            ticket_update_notifications: true,
        }
    }
}

impl From<UserSettingsRow> for UserSettings {
    fn from(row: UserSettingsRow) -> Self {
        Self {
            email: row.email,
            email_notifications: row.email_notifications,
            browser_notifications: row.browser_notifications,
            ticket_assignment_notifications: row.ticket_assignment_notifications,
            ticket_update_notifications: row.ticket_update_notifications,
        }
    }
}

impl UserSettings {
    pub fn into_row(self, user_id: i32) -> UserSettingsRow {
        UserSettingsRow {
            user_id,
            email: self.email.map(|e| e.trim().to_string()).filter(|e| !e.is_empty()),
            email_notifications: self.email_notifications,
            browser_notifications: self.browser_notifications,
            ticket_assignment_notifications: self.ticket_assignment_notifications,
            ticket_update_notifications: self.ticket_update_notifications,
            updated_at: Utc::now(),
        }
    }
}

pub async fn get_settings(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
) -> Result<Json<UserSettings>, ApiError> {
    let row = with_conn(&state.conn, move |conn| {
        Ok(user_settings::table
            .find(user.user_id)
            .select(UserSettingsRow::as_select())
            .first(conn)
            .optional()?)
    })
    .await?;
    Ok(Json(row.map(UserSettings::from).unwrap_or_default()))
}

pub async fn save_settings(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Json(settings): Json<UserSettings>,
) -> Result<Json<Value>, ApiError> {
    if let Some(email) = settings.email.as_deref().map(str::trim).filter(|e| !e.is_empty()) {
        if !crate::auth::is_valid_email(email) {
            return Err(ApiError::BadRequest("Invalid email address".to_string()));
        }
    }

    let row = settings.into_row(user.user_id);
    let saved = with_conn(&state.conn, move |conn| {
        Ok(diesel::insert_into(user_settings::table)
            .values(&row)
            .on_conflict(user_settings::user_id)
            .do_update()
            .set(&row)
            .returning(UserSettingsRow::as_returning())
            .get_result(conn)?)
    })
    .await?;

    Ok(Json(json!({
        "message": "Settings saved successfully",
        "settings": UserSettings::from(saved),
    })))
}

pub fn configure_settings_routes() -> Router<Arc<AppState>> {
    Router::new().route(ApiUrls::USER_SETTINGS, get(get_settings).post(save_settings))
}
