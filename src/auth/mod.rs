//! Login, self-registration and account bootstrap.

pub mod users;

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use diesel::prelude::*;
use log::{info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::core::config::BootstrapConfig;
use crate::core::shared::enums::Role;
use crate::core::shared::error::ApiError;
use crate::core::shared::models::{user_activity_log, users as users_table, NewActivity, NewUser, User};
use crate::core::shared::state::AppState;
use crate::core::shared::utils::with_conn;
use crate::core::urls::ApiUrls;
use crate::security::password::generate_secure_password;
use crate::security::{hash_password, verify_password, PasswordCheck};

static EMAIL_RE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9-]+(\.[A-Za-z0-9-]+)*$").ok());

const INVALID_CREDENTIALS: &str = "Invalid username or password";

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub role: Role,
    pub username: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub email: String,
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE
        .as_ref()
        .is_some_and(|re| re.is_match(email.trim()))
}

/// Validated, trimmed fields for a new account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAccount {
    pub username: String,
    pub password: String,
    pub email: String,
    pub role: Role,
}

impl NewAccount {
    pub fn validate(username: &str, password: &str, email: &str, role: Role) -> Result<Self, ApiError> {
        let username = username.trim();
        let email = email.trim();
        if username.is_empty() || password.is_empty() || email.is_empty() {
            return Err(ApiError::BadRequest(
                "Username, password and email are required".to_string(),
            ));
        }
        if !is_valid_email(email) {
            return Err(ApiError::BadRequest("Invalid email address".to_string()));
        }
        Ok(Self {
            username: username.to_string(),
            password: password.to_string(),
            email: email.to_string(),
            role,
        })
    }
}

/// Hashes the password and inserts the user; duplicate usernames give 409.
pub fn create_account(conn: &mut PgConnection, account: &NewAccount) -> Result<User, ApiError> {
    let taken = diesel::select(diesel::dsl::exists(
        users_table::table.filter(users_table::username.eq(&account.username)),
    ))
    .get_result::<bool>(conn)?;
    if taken {
        return Err(ApiError::Conflict("Username already exists".to_string()));
    }

    let hash = hash_password(&account.password).map_err(|e| ApiError::Internal(e.to_string()))?;
    let user = diesel::insert_into(users_table::table)
        .values(&NewUser {
            username: &account.username,
            password_hash: &hash,
            email: &account.email,
            role: account.role,
            is_active: true,
        })
        .returning(User::as_returning())
        .get_result(conn)
        .map_err(|e| match ApiError::from(e) {
            ApiError::Conflict(_) => ApiError::Conflict("Username already exists".to_string()),
            other => other,
        })?;
    info!("Created {} account {}", user.role, user.username);
    Ok(user)
}

/// Best-effort audit row; a failure is only logged.
pub fn log_activity(conn: &mut PgConnection, user_id: Option<i32>, action: &str, details: &str) {
    let result = diesel::insert_into(user_activity_log::table)
        .values(&NewActivity {
            user_id,
            action,
            details: Some(details),
        })
        .execute(conn);
    if let Err(e) = result {
        warn!("Failed to write activity log ({action}): {e}");
    }
}

fn authenticate(conn: &mut PgConnection, username: &str, password: &str) -> Result<User, ApiError> {
    let user: Option<User> = users_table::table
        .filter(users_table::username.eq(username))
        .select(User::as_select())
        .first(conn)
        .optional()?;

    let Some(user) = user else {
        log_activity(conn, None, "login_failed", &format!("Unknown username: {username}"));
        return Err(ApiError::Unauthorized(INVALID_CREDENTIALS.to_string()));
    };

    let check = verify_password(password, &user.password_hash)
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    if !check.is_valid() {
        log_activity(conn, Some(user.id), "login_failed", "Invalid password");
        return Err(ApiError::Unauthorized(INVALID_CREDENTIALS.to_string()));
    }
    if !user.is_active {
        log_activity(conn, Some(user.id), "login_denied", "Account is deactivated");
        return Err(ApiError::Forbidden("Account is deactivated".to_string()));
    }

    if check == PasswordCheck::ValidLegacy {
        match hash_password(password) {
            Ok(hash) => {
                if let Err(e) = diesel::update(users_table::table.find(user.id))
                    .set(users_table::password_hash.eq(hash))
                    .execute(conn)
                {
                    warn!("Failed to upgrade legacy password for {}: {e}", user.username);
                } else {
                    info!("Upgraded legacy password hash for {}", user.username);
                }
            }
            Err(e) => warn!("Failed to hash legacy password for {}: {e}", user.username),
        }
    }

    log_activity(conn, Some(user.id), "login", "Successful login");
    Ok(user)
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let username = payload.username.trim().to_string();
    if username.is_empty() || payload.password.is_empty() {
        return Err(ApiError::BadRequest("Username and password are required".to_string()));
    }

    let password = payload.password;
    let user = with_conn(&state.conn, move |conn| authenticate(conn, &username, &password))
        .await
        .map_err(|e| match e {
            ApiError::Database(msg) => ApiError::Unavailable(msg),
            other => other,
        })?;

    let token = state
        .jwt
        .issue(user.id, &user.username, user.role)
        .map_err(|e| ApiError::Internal(format!("Failed to issue token: {e}")))?;

    info!("User {} logged in as {}", user.username, user.role);
    Ok(Json(LoginResponse {
        token,
        role: user.role,
        username: user.username,
    }))
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let account = NewAccount::validate(&payload.username, &payload.password, &payload.email, Role::Client)?;
    let user = with_conn(&state.conn, move |conn| {
        let user = create_account(conn, &account)?;
        log_activity(conn, Some(user.id), "register", "Self-registration");
        Ok(user)
    })
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Registration successful",
            "user_id": user.id,
            "username": user.username,
            "role": user.role,
        })),
    ))
}

/// Creates the configured admin when no users exist. Returns the generated password, if any.
pub fn seed_default_admin(
    conn: &mut PgConnection,
    config: &BootstrapConfig,
) -> anyhow::Result<Option<String>> {
    let count: i64 = users_table::table.count().get_result(conn)?;
    if count > 0 {
        return Ok(None);
    }

    let generated = config.admin_password.is_empty();
    let password = if generated {
        generate_secure_password(16)
    } else {
        config.admin_password.clone()
    };

    let hash = hash_password(&password)?;
    diesel::insert_into(users_table::table)
        .values(&NewUser {
            username: &config.admin_username,
            password_hash: &hash,
            email: &config.admin_email,
            role: Role::Admin,
            is_active: true,
        })
        .execute(conn)?;

    info!("Seeded default admin account '{}'", config.admin_username);
    Ok(generated.then_some(password))
}

pub fn configure_auth_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(ApiUrls::LOGIN, post(login))
        .route(ApiUrls::REGISTER, post(register))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_validation() {
        assert!(is_valid_email("jane.doe@example.com"));
        assert!(is_valid_email("  ops+alerts@corp.io "));
        assert!(!is_valid_email("not-an-email"));
        assert!(!is_valid_email("a b@example.com"));
    }

    #[test]
    fn test_new_account_trims_and_validates() {
        let account = NewAccount::validate(" jane ", "secret1", " jane@example.com ", Role::Client).unwrap();
        assert_eq!(account.username, "jane");
        assert_eq!(account.email, "jane@example.com");
        assert_eq!(account.role, Role::Client);
    }

    #[test]
    fn test_new_account_rejections() {
        let empty = NewAccount::validate("", "secret1", "a@b.com", Role::Client).unwrap_err();
        assert_eq!(empty.status(), StatusCode::BAD_REQUEST);

        let blank_password = NewAccount::validate("jane", "", "a@b.com", Role::Client).unwrap_err();
        assert_eq!(blank_password.status(), StatusCode::BAD_REQUEST);
        // any non-empty password is accepted
        assert!(NewAccount::validate("jane", "1", "a@b.com", Role::Client).is_ok());

        let email = NewAccount::validate("jane", "secret1", "jane", Role::Client).unwrap_err();
        assert!(email.to_string().contains("Invalid email"));
    }
}
