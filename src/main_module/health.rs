//! Health check handlers

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use std::sync::Arc;

use crate::core::shared::state::AppState;

fn database_ok(state: &AppState) -> bool {
    state.conn.get().is_ok()
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> (StatusCode, Json<serde_json::Value>) {
    let db_ok = tokio::task::spawn_blocking({
        let state = Arc::clone(&state);
        move || database_ok(&state)
    })
    .await
    .unwrap_or(false);

    let status = if db_ok { "healthy" } else { "degraded" };
    let code = if db_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        code,
        Json(serde_json::json!({
            "status": status,
            "service": "ticketdesk",
            "version": env!("CARGO_PKG_VERSION"),
            "database": db_ok
        })),
    )
}

/// Adds pool, AI and visibility-query figures to the basic health report.
pub async fn system_health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<serde_json::Value>) {
    let (db_ok, pool) = tokio::task::spawn_blocking({
        let state = Arc::clone(&state);
        move || (database_ok(&state), state.conn.state())
    })
    .await
    .unwrap_or((false, state.conn.state()));

    let code = if db_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        code,
        Json(serde_json::json!({
            "status": if db_ok { "healthy" } else { "degraded" },
            "version": env!("CARGO_PKG_VERSION"),
            "uptime_secs": state.started_at.elapsed().as_secs(),
            "database": {
                "connected": db_ok,
                "pool_size": pool.connections,
                "idle_connections": pool.idle_connections,
            },
            "ai": {
                "knowledge_entries": state.ai.knowledge().len(),
                "llm_enabled": state.ai.has_llm(),
                "escalation_threshold": state.ai.escalation_threshold(),
            },
            "email_enabled": state.email.is_enabled(),
            "chat_sessions": state.chat_sessions.len(),
            "ticket_queries": state.visibility_stats.snapshot(),
        })),
    )
}
