//! Role dashboards, developer performance and chat/ticket analytics.

pub mod handlers;
pub mod storage;
pub mod types;

use axum::{routing::get, Router};
use std::sync::Arc;

use crate::core::shared::state::AppState;
use crate::core::urls::ApiUrls;

pub use handlers::*;
pub use types::*;

pub fn configure_dashboard_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(ApiUrls::ADMIN_DASHBOARD, get(admin_dashboard))
        .route(ApiUrls::PM_DASHBOARD, get(pm_dashboard))
        .route(ApiUrls::DEV_DASHBOARD, get(developer_dashboard))
        .route(ApiUrls::CLIENT_DASHBOARD, get(client_dashboard))
        .route(ApiUrls::ADMIN_DEVELOPER_PERFORMANCE, get(developer_performance))
        .route(ApiUrls::ANALYTICS, get(analytics))
}
