//! Ticket endpoints for every role, backed by the visibility engine and workflow.

pub mod visibility;
pub mod workflow;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::core::shared::enums::{Role, TicketPriority, TicketStatus};
use crate::core::shared::error::ApiError;
use crate::core::shared::models::Ticket;
use crate::core::shared::state::AppState;
use crate::core::shared::utils::with_conn;
use crate::core::urls::ApiUrls;
use crate::notifications::{dispatch, TicketEvent};
use crate::security::AuthenticatedUser;
use visibility::{
    check_ticket_access, load_ticket_view, query_tickets, redact_for, TicketAction, TicketFilter,
    TicketFilterParams, TicketView,
};

#[derive(Debug, Deserialize)]
pub struct CreateTicketRequest {
    #[serde(alias = "description")]
    pub query: String,
    pub priority: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    #[serde(alias = "developerId")]
    pub developer_id: i32,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CompleteRequest {
    #[serde(alias = "notes", alias = "completionNotes")]
    pub completion_notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReasonRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: String,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReplyRequest {
    pub reply: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PriorityRequest {
    pub priority: String,
}

#[derive(Debug, Deserialize)]
pub struct CompletedParams {
    pub limit: Option<i64>,
}

pub fn parse_priority(raw: Option<&str>) -> Result<TicketPriority, ApiError> {
    match raw.map(str::trim).filter(|p| !p.is_empty()) {
        Some(p) => p.parse().map_err(ApiError::BadRequest),
        None => Ok(TicketPriority::default()),
    }
}

/// Runs a role-scoped listing and records its timing.
async fn visible_tickets(
    state: &Arc<AppState>,
    user: AuthenticatedUser,
    filter: TicketFilter,
) -> Result<Vec<TicketView>, ApiError> {
    let stats_state = Arc::clone(state);
    with_conn(&state.conn, move |conn| {
        stats_state
            .visibility_stats
            .measure(|| query_tickets(conn, &user, &filter))
    })
    .await
}

async fn single_ticket(
    state: &Arc<AppState>,
    user: AuthenticatedUser,
    ticket_id: i32,
) -> Result<TicketView, ApiError> {
    with_conn(&state.conn, move |conn| {
        let view = load_ticket_view(conn, ticket_id)?;
        check_ticket_access(&user, &view.ticket, TicketAction::View)?;
        redact_for(&user, vec![view])
            .pop()
            .ok_or_else(|| ApiError::NotFound(format!("Ticket {ticket_id} not found")))
    })
    .await
}

fn action_response(message: &str, ticket: &Ticket) -> Json<Value> {
    Json(json!({ "message": message, "ticket": ticket }))
}

// Client

pub async fn client_tickets(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
) -> Result<Json<Vec<TicketView>>, ApiError> {
    user.require_role(&[Role::Client])?;
    Ok(Json(visible_tickets(&state, user, TicketFilter::default()).await?))
}

pub async fn client_ticket(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<i32>,
) -> Result<Json<TicketView>, ApiError> {
    user.require_role(&[Role::Client])?;
    Ok(Json(single_ticket(&state, user, id).await?))
}

pub async fn create_ticket(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateTicketRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    user.require_role(&[Role::Client])?;
    let priority = parse_priority(payload.priority.as_deref())?;
    let client_id = user.user_id;
    let ticket = with_conn(&state.conn, move |conn| {
        workflow::create_ticket(conn, client_id, &payload.query, priority)
    })
    .await?;

    dispatch(&state, ticket.clone(), TicketEvent::Created { via_chat: false }).await;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Ticket created successfully",
            "ticket_id": ticket.id,
            "ticket": ticket,
        })),
    ))
}

// Shared

pub async fn list_tickets(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Query(params): Query<TicketFilterParams>,
) -> Result<Json<Vec<TicketView>>, ApiError> {
    let filter = TicketFilter::try_from(params)?;
    Ok(Json(visible_tickets(&state, user, filter).await?))
}

pub async fn active_tickets(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
) -> Result<Json<Vec<TicketView>>, ApiError> {
    let filter = TicketFilter::with_statuses(&TicketStatus::ACTIVE);
    Ok(Json(visible_tickets(&state, user, filter).await?))
}

pub async fn get_ticket(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<i32>,
) -> Result<Json<TicketView>, ApiError> {
    Ok(Json(single_ticket(&state, user, id).await?))
}

pub async fn reply_ticket(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<i32>,
    Json(payload): Json<ReplyRequest>,
) -> Result<Json<Value>, ApiError> {
    let actor = user.clone();
    let ticket = with_conn(&state.conn, move |conn| {
        workflow::reply_to_ticket(conn, &actor, id, payload.reply.as_deref())
    })
    .await?;

    dispatch(
        &state,
        ticket.clone(),
        TicketEvent::Completed {
            developer_name: user.username,
        },
    )
    .await;
    Ok(action_response("Reply sent and ticket closed", &ticket))
}

pub async fn update_priority(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<i32>,
    Json(payload): Json<PriorityRequest>,
) -> Result<Json<Value>, ApiError> {
    let priority: TicketPriority = payload.priority.parse().map_err(ApiError::BadRequest)?;
    let ticket = with_conn(&state.conn, move |conn| {
        workflow::set_priority(conn, &user, id, priority)
    })
    .await?;
    Ok(action_response(&format!("Priority set to {priority}"), &ticket))
}

// Admin and project manager

pub async fn admin_tickets(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Query(params): Query<TicketFilterParams>,
) -> Result<Json<Vec<TicketView>>, ApiError> {
    user.require_role(&[Role::Admin])?;
    let filter = TicketFilter::try_from(params)?;
    Ok(Json(visible_tickets(&state, user, filter).await?))
}

pub async fn unassigned_tickets(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
) -> Result<Json<Vec<TicketView>>, ApiError> {
    user.require_role(&[Role::Admin, Role::ProjectManager])?;
    let filter = TicketFilter {
        statuses: vec![TicketStatus::Open],
        ..TicketFilter::unassigned()
    };
    Ok(Json(visible_tickets(&state, user, filter).await?))
}

pub async fn admin_assign_ticket(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<i32>,
    Json(payload): Json<AssignRequest>,
) -> Result<Json<Value>, ApiError> {
    user.require_role(&[Role::Admin])?;
    assign_ticket(state, user, id, payload).await
}

pub async fn pm_assign_ticket(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<i32>,
    Json(payload): Json<AssignRequest>,
) -> Result<Json<Value>, ApiError> {
    user.require_role(&[Role::ProjectManager])?;
    assign_ticket(state, user, id, payload).await
}

async fn assign_ticket(
    state: Arc<AppState>,
    user: AuthenticatedUser,
    id: i32,
    payload: AssignRequest,
) -> Result<Json<Value>, ApiError> {
    let actor = user.clone();
    let (ticket, developer) = with_conn(&state.conn, move |conn| {
        workflow::assign_ticket(conn, &actor, id, payload.developer_id, payload.notes.as_deref())
    })
    .await?;

    let message = format!("Ticket assigned to {}", developer.username);
    dispatch(
        &state,
        ticket.clone(),
        TicketEvent::Assigned {
            developer_id: developer.id,
            developer_name: developer.username,
            assigned_by: user.username,
        },
    )
    .await;
    Ok(action_response(&message, &ticket))
}

// Developer

pub async fn my_assigned(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
) -> Result<Json<Vec<TicketView>>, ApiError> {
    user.require_role(&[Role::Developer])?;
    let filter = TicketFilter {
        assignee: Some(visibility::AssigneeFilter::Developers(vec![user.user_id])),
        ..TicketFilter::default()
    };
    Ok(Json(visible_tickets(&state, user, filter).await?))
}

pub async fn available_tickets(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
) -> Result<Json<Vec<TicketView>>, ApiError> {
    user.require_role(&[Role::Developer])?;
    let filter = TicketFilter {
        statuses: vec![TicketStatus::Open],
        ..TicketFilter::unassigned()
    };
    Ok(Json(visible_tickets(&state, user, filter).await?))
}

pub async fn completed_tickets(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Query(params): Query<CompletedParams>,
) -> Result<Json<Vec<TicketView>>, ApiError> {
    user.require_role(&[Role::Developer])?;
    let limit = params.limit.unwrap_or(visibility::MAX_RESULTS);
    let views = with_conn(&state.conn, move |conn| {
        let views = visibility::completed_by(conn, user.user_id, limit)?;
        Ok(redact_for(&user, views))
    })
    .await?;
    Ok(Json(views))
}

pub async fn self_assign(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<i32>,
) -> Result<Json<Value>, ApiError> {
    let actor = user.clone();
    let ticket = with_conn(&state.conn, move |conn| workflow::self_assign(conn, &actor, id)).await?;

    dispatch(
        &state,
        ticket.clone(),
        TicketEvent::Assigned {
            developer_id: user.user_id,
            developer_name: user.username.clone(),
            assigned_by: user.username,
        },
    )
    .await;
    Ok(action_response("Ticket assigned to you", &ticket))
}

pub async fn complete_ticket(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<i32>,
    Json(payload): Json<CompleteRequest>,
) -> Result<Json<Value>, ApiError> {
    user.require_role(&[Role::Developer])?;
    let actor = user.clone();
    let ticket = with_conn(&state.conn, move |conn| {
        workflow::complete_ticket(conn, &actor, id, payload.completion_notes.as_deref())
    })
    .await?;

    dispatch(
        &state,
        ticket.clone(),
        TicketEvent::Completed {
            developer_name: user.username,
        },
    )
    .await;
    Ok(action_response("Ticket completed", &ticket))
}

pub async fn pass_ticket(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<i32>,
    Json(payload): Json<ReasonRequest>,
) -> Result<Json<Value>, ApiError> {
    user.require_role(&[Role::Developer])?;
    let actor = user.clone();
    let reason = payload.reason.unwrap_or_default().trim().to_string();
    let stored_reason = reason.clone();
    let ticket = with_conn(&state.conn, move |conn| {
        workflow::pass_ticket(conn, &actor, id, Some(&stored_reason))
    })
    .await?;

    dispatch(
        &state,
        ticket.clone(),
        TicketEvent::Passed {
            developer_name: user.username,
            reason,
        },
    )
    .await;
    Ok(action_response("Ticket passed back to the queue", &ticket))
}

pub async fn cancel_ticket(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<i32>,
    Json(payload): Json<ReasonRequest>,
) -> Result<Json<Value>, ApiError> {
    user.require_role(&[Role::Developer])?;
    let actor = user.clone();
    let reason = payload.reason.unwrap_or_default().trim().to_string();
    let stored_reason = reason.clone();
    let ticket = with_conn(&state.conn, move |conn| {
        workflow::cancel_ticket(conn, &actor, id, Some(&stored_reason))
    })
    .await?;

    dispatch(
        &state,
        ticket.clone(),
        TicketEvent::Cancelled {
            developer_name: user.username,
            reason,
        },
    )
    .await;
    Ok(action_response("Ticket cancelled", &ticket))
}

pub async fn update_status(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<i32>,
    Json(payload): Json<StatusRequest>,
) -> Result<Json<Value>, ApiError> {
    user.require_role(&[Role::Developer])?;
    let status: TicketStatus = payload.status.parse().map_err(ApiError::BadRequest)?;
    let actor = user.clone();
    let ticket = with_conn(&state.conn, move |conn| {
        workflow::update_status(conn, &actor, id, status, payload.notes.as_deref())
    })
    .await?;

    if status == TicketStatus::Closed {
        dispatch(
            &state,
            ticket.clone(),
            TicketEvent::Completed {
                developer_name: user.username,
            },
        )
        .await;
    }
    Ok(action_response(&format!("Ticket status updated to {status}"), &ticket))
}

pub fn configure_ticket_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(ApiUrls::CLIENT_TICKETS, get(client_tickets))
        .route(ApiUrls::CLIENT_TICKET_CREATE, post(create_ticket))
        .route(ApiUrls::CLIENT_TICKET_BY_ID, get(client_ticket))
        .route(ApiUrls::TICKETS, get(list_tickets))
        .route(ApiUrls::TICKETS_ACTIVE, get(active_tickets))
        .route(ApiUrls::TICKET_BY_ID, get(get_ticket))
        .route(ApiUrls::TICKET_REPLY, post(reply_ticket))
        .route(ApiUrls::TICKET_PRIORITY, put(update_priority))
        .route(ApiUrls::ADMIN_TICKETS, get(admin_tickets))
        .route(ApiUrls::ADMIN_TICKET_ASSIGN, post(admin_assign_ticket))
        .route(ApiUrls::PM_UNASSIGNED, get(unassigned_tickets))
        .route(ApiUrls::PM_TICKET_ASSIGN, post(pm_assign_ticket))
        .route(ApiUrls::DEV_MY_ASSIGNED, get(my_assigned))
        .route(ApiUrls::DEV_AVAILABLE, get(available_tickets))
        .route(ApiUrls::DEV_COMPLETED, get(completed_tickets))
        .route(ApiUrls::DEV_SELF_ASSIGN, post(self_assign))
        .route(ApiUrls::DEV_COMPLETE, post(complete_ticket))
        .route(ApiUrls::DEV_PASS, post(pass_ticket))
        .route(ApiUrls::DEV_CANCEL, post(cancel_ticket))
        .route(ApiUrls::DEV_STATUS, put(update_status))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_priority_defaults_to_medium() {
        assert_eq!(parse_priority(None).unwrap(), TicketPriority::Medium);
        assert_eq!(parse_priority(Some("  ")).unwrap(), TicketPriority::Medium);
        assert_eq!(parse_priority(Some("critical")).unwrap(), TicketPriority::Critical);
        assert_eq!(
            parse_priority(Some("urgent")).unwrap_err().status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_assign_request_accepts_camel_case() {
        let req: AssignRequest =
            serde_json::from_str(r#"{"developerId": 4, "notes": "INTERNAL: vip"}"#).unwrap();
        assert_eq!(req.developer_id, 4);
        assert_eq!(req.notes.as_deref(), Some("INTERNAL: vip"));
    }

    #[tokio::test]
    async fn test_assign_routes_are_role_specific() {
        use crate::core::shared::test_utils::{bearer, TestAppStateBuilder};
        use axum::body::Body;
        use axum::http::{header, Request};
        use tower::ServiceExt;

        let state = TestAppStateBuilder::new().build();
        let pm = bearer(&state, 2, "pm", Role::ProjectManager);
        let admin = bearer(&state, 1, "admin", Role::Admin);
        let app = configure_ticket_routes().with_state(state);

        let assign = |uri: &str, auth: &str| {
            Request::post(uri)
                .header(header::AUTHORIZATION, auth)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"developer_id": 4}"#))
                .unwrap()
        };

        let response = app.clone().oneshot(assign("/admin/tickets/1/assign", &pm)).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = app.oneshot(assign("/pm/tickets/1/assign", &admin)).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_complete_request_aliases() {
        let req: CompleteRequest = serde_json::from_str(r#"{"notes": "patched"}"#).unwrap();
        assert_eq!(req.completion_notes.as_deref(), Some("patched"));
    }
}
