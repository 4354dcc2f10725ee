//! User management for admins, plus team listings for project managers and developers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use diesel::prelude::*;
use log::info;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

use super::{create_account, log_activity, NewAccount};
use crate::core::shared::enums::Role;
use crate::core::shared::error::ApiError;
use crate::core::shared::models::{users, UserSummary};
use crate::core::shared::state::AppState;
use crate::core::shared::utils::with_conn;
use crate::core::urls::ApiUrls;
use crate::security::AuthenticatedUser;

/// Roles a project manager may create.
pub const PM_CREATABLE_ROLES: [Role; 2] = [Role::Developer, Role::Client];

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub password: String,
    pub email: String,
    pub role: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStatus {
    pub id: i32,
    pub username: String,
    pub is_active: bool,
}

/// Roles visible in the team listing for `viewer`.
pub fn team_roles(viewer: Role) -> &'static [Role] {
    match viewer {
        Role::ProjectManager => &[Role::Developer, Role::Client],
        Role::Developer => &[Role::ProjectManager, Role::Developer, Role::Client],
        Role::Admin => &Role::ALL,
        Role::Client => &[],
    }
}

pub fn group_by_role(members: Vec<UserSummary>) -> BTreeMap<String, Vec<UserSummary>> {
    let mut grouped: BTreeMap<String, Vec<UserSummary>> = BTreeMap::new();
    for member in members {
        grouped.entry(member.role.to_string()).or_default().push(member);
    }
    grouped
}

/// Ensures `creator` may mint an account with `role`.
pub fn check_creatable_role(creator: Role, role: Role) -> Result<(), ApiError> {
    match creator {
        Role::Admin => Ok(()),
        Role::ProjectManager if PM_CREATABLE_ROLES.contains(&role) => Ok(()),
        Role::ProjectManager => Err(ApiError::Forbidden(
            "Project managers can only create developer or client accounts".to_string(),
        )),
        _ => Err(ApiError::Forbidden("Not allowed to create users".to_string())),
    }
}

async fn create_user_as(
    state: &Arc<AppState>,
    actor: AuthenticatedUser,
    payload: CreateUserRequest,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let role: Role = payload.role.parse().map_err(ApiError::BadRequest)?;
    check_creatable_role(actor.role, role)?;
    let account = NewAccount::validate(&payload.username, &payload.password, &payload.email, role)?;

    let user = with_conn(&state.conn, move |conn| {
        let user = create_account(conn, &account)?;
        log_activity(
            conn,
            Some(actor.user_id),
            "create_user",
            &format!("Created {} account {}", user.role, user.username),
        );
        Ok(user)
    })
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": format!("User {} created successfully", user.username),
            "user": UserSummary::from(user),
        })),
    ))
}

pub async fn list_users(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
) -> Result<Json<Vec<UserSummary>>, ApiError> {
    user.require_role(&[Role::Admin])?;
    let rows = with_conn(&state.conn, |conn| {
        Ok(users::table
            .order(users::created_at.desc())
            .select(UserSummary::as_select())
            .load(conn)?)
    })
    .await?;
    Ok(Json(rows))
}

pub async fn admin_create_user(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    user.require_role(&[Role::Admin])?;
    create_user_as(&state, user, payload).await
}

pub async fn pm_create_user(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    user.require_role(&[Role::ProjectManager])?;
    create_user_as(&state, user, payload).await
}

pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<i32>,
) -> Result<Json<Value>, ApiError> {
    user.require_role(&[Role::Admin])?;
    if id == user.user_id {
        return Err(ApiError::BadRequest("You cannot delete your own account".to_string()));
    }

    let admin_id = user.user_id;
    let username = with_conn(&state.conn, move |conn| {
        let username: String = users::table
            .find(id)
            .select(users::username)
            .first(conn)
            .optional()?
            .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;
        diesel::delete(users::table.find(id)).execute(conn)?;
        log_activity(conn, Some(admin_id), "delete_user", &format!("Deleted user {username}"));
        Ok(username)
    })
    .await?;

    info!("User {} deleted by {}", username, user.username);
    Ok(Json(json!({ "message": format!("User {username} deleted successfully") })))
}

async fn set_active(
    state: &Arc<AppState>,
    actor: AuthenticatedUser,
    id: i32,
    active: bool,
) -> Result<Json<Value>, ApiError> {
    actor.require_role(&[Role::Admin])?;
    if id == actor.user_id && !active {
        return Err(ApiError::BadRequest("You cannot deactivate your own account".to_string()));
    }

    let status = with_conn(&state.conn, move |conn| {
        let (id, username, is_active) = diesel::update(users::table.find(id))
            .set((users::is_active.eq(active), users::updated_at.eq(chrono::Utc::now())))
            .returning((users::id, users::username, users::is_active))
            .get_result::<(i32, String, bool)>(conn)
            .optional()?
            .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;
        let action = if active { "activate_user" } else { "deactivate_user" };
        log_activity(conn, Some(actor.user_id), action, &username);
        Ok(UserStatus {
            id,
            username,
            is_active,
        })
    })
    .await?;

    let verb = if active { "activated" } else { "deactivated" };
    Ok(Json(json!({
        "message": format!("User {} {verb} successfully", status.username),
        "user": status,
    })))
}

pub async fn activate_user(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<i32>,
) -> Result<Json<Value>, ApiError> {
    set_active(&state, user, id, true).await
}

pub async fn deactivate_user(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<i32>,
) -> Result<Json<Value>, ApiError> {
    set_active(&state, user, id, false).await
}

pub async fn team_members(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
) -> Result<Json<BTreeMap<String, Vec<UserSummary>>>, ApiError> {
    user.require_role(&[Role::ProjectManager, Role::Developer])?;
    let roles = team_roles(user.role).to_vec();
    let members = with_conn(&state.conn, move |conn| {
        Ok(users::table
            .filter(users::role.eq_any(roles))
            .order(users::username.asc())
            .select(UserSummary::as_select())
            .load(conn)?)
    })
    .await?;
    Ok(Json(group_by_role(members)))
}

pub fn configure_user_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(ApiUrls::ADMIN_USERS, get(list_users))
        .route(ApiUrls::ADMIN_USER_CREATE, post(admin_create_user))
        .route(ApiUrls::ADMIN_USER_BY_ID, delete(delete_user))
        .route(ApiUrls::ADMIN_USER_ACTIVATE, post(activate_user))
        .route(ApiUrls::ADMIN_USER_DEACTIVATE, post(deactivate_user))
        .route(ApiUrls::PM_TEAM_MEMBERS, get(team_members))
        .route(ApiUrls::PM_CREATE_USER, post(pm_create_user))
        .route(ApiUrls::DEV_TEAM_MEMBERS, get(team_members))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn member(id: i32, role: Role) -> UserSummary {
        UserSummary {
            id,
            username: format!("user{id}"),
            email: format!("user{id}@example.com"),
            role,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_pm_role_limits() {
        assert!(check_creatable_role(Role::ProjectManager, Role::Developer).is_ok());
        assert!(check_creatable_role(Role::ProjectManager, Role::Client).is_ok());
        let err = check_creatable_role(Role::ProjectManager, Role::Admin).unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        assert!(check_creatable_role(Role::Admin, Role::ProjectManager).is_ok());
    }

    #[test]
    fn test_team_roles_by_viewer() {
        assert!(!team_roles(Role::ProjectManager).contains(&Role::Admin));
        assert!(team_roles(Role::Developer).contains(&Role::ProjectManager));
        assert!(team_roles(Role::Client).is_empty());
    }

    #[test]
    fn test_group_by_role() {
        let grouped = group_by_role(vec![
            member(1, Role::Developer),
            member(2, Role::Client),
            member(3, Role::Developer),
        ]);
        assert_eq!(grouped["developer"].len(), 2);
        assert_eq!(grouped["client"][0].id, 2);
        assert!(!grouped.contains_key("admin"));
    }
}
