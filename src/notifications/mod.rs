pub mod events;

use axum::{
    extract::{Path, State},
    routing::{delete, get, post},
    Json, Router,
};
use diesel::prelude::*;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::core::shared::error::ApiError;
use crate::core::shared::models::{notifications, Notification};
use crate::core::shared::state::AppState;
use crate::core::shared::utils::with_conn;
use crate::core::urls::ApiUrls;
use crate::security::AuthenticatedUser;

pub use events::{dispatch, TicketEvent};

pub const LIST_LIMIT: i64 = 50;

pub async fn list_notifications(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
) -> Result<Json<Vec<Notification>>, ApiError> {
    let rows = with_conn(&state.conn, move |conn| {
        Ok(notifications::table
            .filter(
                notifications::user_id
                    .eq(user.user_id)
                    .or(notifications::role.eq(user.role)),
            )
            .order(notifications::created_at.desc())
            .limit(LIST_LIMIT)
            .select(Notification::as_select())
            .load(conn)?)
    })
    .await?;
    Ok(Json(rows))
}

pub async fn mark_read(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<i32>,
) -> Result<Json<Value>, ApiError> {
    let updated = with_conn(&state.conn, move |conn| {
        Ok(diesel::update(
            notifications::table.filter(notifications::id.eq(id)).filter(
                notifications::user_id
                    .eq(user.user_id)
                    .or(notifications::role.eq(user.role)),
            ),
        )
        .set(notifications::is_read.eq(true))
        .execute(conn)?)
    })
    .await?;

    if updated == 0 {
        return Err(ApiError::NotFound("Notification not found".to_string()));
    }
    Ok(Json(json!({ "message": "Notification marked as read" })))
}

pub async fn mark_all_read(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
) -> Result<Json<Value>, ApiError> {
    let updated = with_conn(&state.conn, move |conn| {
        Ok(diesel::update(
            notifications::table
                .filter(notifications::is_read.eq(false))
                .filter(
                    notifications::user_id
                        .eq(user.user_id)
                        .or(notifications::role.eq(user.role)),
                ),
        )
        .set(notifications::is_read.eq(true))
        .execute(conn)?)
    })
    .await?;
    Ok(Json(json!({ "message": "All notifications marked as read", "updated": updated })))
}

pub async fn delete_notification(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<i32>,
) -> Result<Json<Value>, ApiError> {
    let deleted = with_conn(&state.conn, move |conn| {
        Ok(diesel::delete(
            notifications::table.filter(notifications::id.eq(id)).filter(
                notifications::user_id
                    .eq(user.user_id)
                    .or(notifications::role.eq(user.role)),
            ),
        )
        .execute(conn)?)
    })
    .await?;

    if deleted == 0 {
        return Err(ApiError::NotFound("Notification not found".to_string()));
    }
    Ok(Json(json!({ "message": "Notification deleted" })))
}

pub fn configure_notification_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(ApiUrls::NOTIFICATIONS, get(list_notifications))
        .route(ApiUrls::NOTIFICATIONS_READ_ALL, post(mark_all_read))
        .route(ApiUrls::NOTIFICATION_READ, post(mark_read))
        .route(ApiUrls::NOTIFICATION_BY_ID, delete(delete_notification))
}
