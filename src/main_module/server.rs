//! HTTP server initialization and routing

use axum::body::Body;
use axum::http::{header, HeaderValue, Method, Request};
use axum::{routing::get, Router};
use log::{error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::ai::admin::configure_knowledge_routes;
use crate::auth::configure_auth_routes;
use crate::auth::users::configure_user_routes;
use crate::chat::configure_chat_routes;
use crate::core::config::ServerConfig;
use crate::core::shared::state::AppState;
use crate::core::urls::ApiUrls;
use crate::dashboards::configure_dashboard_routes;
use crate::notifications::configure_notification_routes;
use crate::settings::configure_settings_routes;
use crate::tickets::configure_ticket_routes;

use super::{health_check, shutdown_signal, system_health};

pub fn create_cors_layer(config: &ServerConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .max_age(Duration::from_secs(3600));

    if config.cors_origins.iter().any(|o| o == "*") {
        return cors.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
    if origins.is_empty() {
        warn!("No valid CORS origins configured, cross-origin requests will be rejected");
        return cors.allow_origin(AllowOrigin::list(Vec::<HeaderValue>::new()));
    }
    cors.allow_origin(origins).allow_credentials(true)
}

/// Every route, with shared state applied but no middleware layers.
pub fn api_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(ApiUrls::HEALTH, get(health_check))
        .route(ApiUrls::SYSTEM_HEALTH, get(system_health))
        .merge(configure_auth_routes())
        .merge(configure_user_routes())
        .merge(configure_chat_routes())
        .merge(configure_ticket_routes())
        .merge(configure_knowledge_routes())
        .merge(configure_notification_routes())
        .merge(configure_settings_routes())
        .merge(configure_dashboard_routes())
        .with_state(state)
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = create_cors_layer(&state.config.server);
    api_router(state).layer(cors).layer(
        TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
            tracing::info_span!(
                "http_request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = %Uuid::new_v4(),
            )
        }),
    )
}

pub async fn run_axum_server(app_state: Arc<AppState>) -> std::io::Result<()> {
    let server = &app_state.config.server;
    let addr: SocketAddr = format!("{}:{}", server.host, server.port)
        .parse()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
    let app = build_router(Arc::clone(&app_state));

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(
                "Failed to bind to {}: {} - is another instance running?",
                addr, e
            );
            return Err(e);
        }
    };
    info!("HTTP server listening on {} ({})", addr, server.base_url);
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(std::io::Error::other)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::shared::enums::Role;
    use crate::core::shared::test_utils::{bearer, TestAppStateBuilder};
    use axum::http::StatusCode;
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tower::ServiceExt;

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    #[tokio::test]
    async fn test_missing_token_is_unauthorized() {
        let app = build_router(TestAppStateBuilder::new().build());
        let request = Request::get("/tickets").body(Body::empty()).unwrap();
        let (status, body) = send(app, request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "No authentication token");
    }

    #[tokio::test]
    async fn test_garbage_token_is_unauthorized() {
        let app = build_router(TestAppStateBuilder::new().build());
        let request = Request::get("/ticket/5")
            .header(header::AUTHORIZATION, "Bearer not.a.jwt")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(app, request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_wrong_role_is_forbidden() {
        let state = TestAppStateBuilder::new().build();
        let auth = bearer(&state, 7, "dev", Role::Developer);
        let app = build_router(state);

        let request = Request::get("/admin/users/all")
            .header(header::AUTHORIZATION, auth.clone())
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(app.clone(), request).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(body["error"].as_str().unwrap().contains("developer"));

        let request = Request::post("/chat")
            .header(header::AUTHORIZATION, auth)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"message":"my vpn is down"}"#))
            .unwrap();
        let (status, _) = send(app, request).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_unknown_route_is_not_found() {
        let app = build_router(TestAppStateBuilder::new().build());
        let request = Request::get("/nope").body(Body::empty()).unwrap();
        let (status, _) = send(app, request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_cors_layer_accepts_wildcard_and_lists() {
        let mut server = ServerConfig::default();
        server.cors_origins = vec!["*".to_string()];
        let _ = create_cors_layer(&server);
        server.cors_origins = vec!["http://localhost:3000".to_string(), "\n".to_string()];
        let _ = create_cors_layer(&server);
    }
}
