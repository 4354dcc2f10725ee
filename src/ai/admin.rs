//! Admin maintenance of the knowledge base file.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use log::info;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use super::knowledge::{KnowledgeEntry, Keywords};
use crate::core::shared::enums::Role;
use crate::core::shared::error::ApiError;
use crate::core::shared::state::AppState;
use crate::core::urls::ApiUrls;
use crate::security::AuthenticatedUser;

#[derive(Debug, Deserialize)]
pub struct NewKnowledgeRequest {
    pub keywords: Keywords,
    pub answer: String,
    pub category: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct IndexedEntry {
    pub index: usize,
    #[serde(flatten)]
    pub entry: KnowledgeEntry,
}

impl NewKnowledgeRequest {
    pub fn into_entry(self) -> Result<KnowledgeEntry, ApiError> {
        let terms = self.keywords.terms();
        if terms.is_empty() {
            return Err(ApiError::BadRequest("At least one keyword is required".to_string()));
        }
        let answer = self.answer.trim();
        if answer.is_empty() {
            return Err(ApiError::BadRequest("Answer is required".to_string()));
        }
        let category = self
            .category
            .map(|c| c.trim().to_lowercase())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| "general".to_string());
        Ok(KnowledgeEntry {
            id: None,
            keywords: Keywords::List(terms),
            answer: answer.to_string(),
            category,
        })
    }
}

/// Runs knowledge-base file work on the blocking pool.
async fn blocking<T, F>(state: &Arc<AppState>, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&AppState) -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    let state = Arc::clone(state);
    tokio::task::spawn_blocking(move || f(&state)).await?
}

pub async fn list_knowledge(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
) -> Result<Json<Vec<IndexedEntry>>, ApiError> {
    user.require_role(&[Role::Admin])?;
    let entries = state
        .ai
        .knowledge()
        .entries()
        .iter()
        .cloned()
        .enumerate()
        .map(|(index, entry)| IndexedEntry { index, entry })
        .collect();
    Ok(Json(entries))
}

pub async fn add_knowledge(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Json(payload): Json<NewKnowledgeRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    user.require_role(&[Role::Admin])?;
    let entry = payload.into_entry()?;
    let index = blocking(&state, move |state| {
        state
            .ai
            .knowledge_mut()
            .add(entry)
            .map_err(|e| ApiError::Internal(format!("Failed to save knowledge base: {e:#}")))
    })
    .await?;

    info!("Knowledge entry {index} added by {}", user.username);
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Knowledge entry added", "index": index })),
    ))
}

pub async fn delete_knowledge(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(index): Path<usize>,
) -> Result<Json<Value>, ApiError> {
    user.require_role(&[Role::Admin])?;
    let removed = blocking(&state, move |state| {
        state
            .ai
            .knowledge_mut()
            .remove(index)
            .map_err(|e| ApiError::Internal(format!("Failed to save knowledge base: {e:#}")))
    })
    .await?
    .ok_or_else(|| ApiError::NotFound(format!("Knowledge entry {index} not found")))?;

    info!("Knowledge entry {index} removed by {}", user.username);
    Ok(Json(json!({ "message": "Knowledge entry deleted", "entry": removed })))
}

pub async fn reload_knowledge(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
) -> Result<Json<Value>, ApiError> {
    user.require_role(&[Role::Admin])?;
    let count = blocking(&state, |state| {
        state.ai.knowledge_mut().reload().map_err(|e| {
            ApiError::BadRequest(format!("Knowledge base file is invalid, keeping current entries: {e:#}"))
        })
    })
    .await?;
    info!("Knowledge base reloaded by {} ({count} entries)", user.username);
    Ok(Json(json!({ "message": "Knowledge base reloaded", "entries": count })))
}

pub fn configure_knowledge_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(ApiUrls::ADMIN_KNOWLEDGE, get(list_knowledge).post(add_knowledge))
        .route(ApiUrls::ADMIN_KNOWLEDGE_RELOAD, post(reload_knowledge))
        .route(ApiUrls::ADMIN_KNOWLEDGE_BY_INDEX, delete(delete_knowledge))
}
