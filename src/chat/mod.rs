//! Client chat intake: knowledge-base answers, hosted fallback, and escalation to tickets.

pub mod session;

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use diesel::prelude::*;
use log::{error, info};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::ai::{router as ai_router, AiEngine, AnswerSource};
use crate::core::shared::enums::Role;
use crate::core::shared::error::ApiError;
use crate::core::shared::models::{chat_history, ChatRecord, NewChatRecord};
use crate::core::shared::state::AppState;
use crate::core::shared::utils::with_conn;
use crate::core::urls::ApiUrls;
use crate::notifications::{dispatch, TicketEvent};
use crate::security::AuthenticatedUser;
use crate::tickets::workflow;
pub use session::{ChatSessions, ChatStage};

pub const FEEDBACK_PROMPT: &str = "\n\nWas this helpful? (Yes/No)";
pub const TECH_DETAILS_PROMPT: &str = "This seems like a technical issue. To create a ticket, could \
you please describe the problem in more detail? (e.g., what steps did you take, what error did you see?)";
pub const NO_MATCH_PROMPT: &str = "I'm not sure how to help with that. Please describe your issue \
in more detail, and I'll create a ticket for our support team.";
pub const RESOLVED_REPLY: &str = "Great! I'm glad I could help. Let me know if there's anything else.";
pub const NOT_RESOLVED_REPLY: &str = "I'm sorry I couldn't resolve your issue. Please provide more \
details, and I will create a ticket for our support team.";

/// Confidence reported for a keyword match from the knowledge base.
pub const KNOWLEDGE_CONFIDENCE: f64 = 0.9;
const HISTORY_LIMIT: i64 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatSource {
    KnowledgeBase,
    Llm,
    HumanEscalation,
}

impl ChatSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::KnowledgeBase => "knowledge_base",
            Self::Llm => "llm",
            Self::HumanEscalation => "human_escalation",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatStatus {
    AwaitingFeedback,
    GatheringInfo,
    Resolved,
    TicketCreated,
}

impl ChatStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AwaitingFeedback => "awaiting_feedback",
            Self::GatheringInfo => "gathering_info",
            Self::Resolved => "resolved",
            Self::TicketCreated => "ticket_created",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatReply {
    pub response: String,
    pub source: ChatSource,
    pub status: ChatStatus,
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket_id: Option<i32>,
}

impl ChatReply {
    fn new(response: impl Into<String>, source: ChatSource, status: ChatStatus, confidence: f64) -> Self {
        Self {
            response: response.into(),
            source,
            status,
            confidence,
            category: None,
            ticket_id: None,
        }
    }

    fn with_category(mut self, category: &str) -> Self {
        self.category = Some(category.to_string());
        self
    }
}

/// A bare "yes" word, not a substring like "yesterday".
pub fn is_affirmative(message: &str) -> bool {
    message
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .any(|word| word == "yes")
}

pub fn handle_feedback(original_query: String, message: &str) -> (ChatReply, Option<ChatStage>) {
    if is_affirmative(message) {
        (
            ChatReply::new(RESOLVED_REPLY, ChatSource::KnowledgeBase, ChatStatus::Resolved, 1.0),
            None,
        )
    } else {
        (
            ChatReply::new(
                NOT_RESOLVED_REPLY,
                ChatSource::HumanEscalation,
                ChatStatus::GatheringInfo,
                0.0,
            ),
            Some(ChatStage::AwaitingTechDetails { original_query }),
        )
    }
}

pub fn ticket_description(original_query: &str, details: &str) -> String {
    format!("Original Query: {original_query}\n\nUser Details: {details}")
}

/// Routes a fresh query: knowledge base first, then the hosted model, else escalate.
pub async fn handle_new_query(engine: &AiEngine, message: &str) -> (ChatReply, Option<ChatStage>) {
    let awaiting_details = || ChatStage::AwaitingTechDetails {
        original_query: message.to_string(),
    };

    if let Some(found) = engine.best_match(message) {
        let entry = found.entry;
        if entry.is_informational() {
            return (
                ChatReply::new(
                    format!("{}{FEEDBACK_PROMPT}", entry.answer),
                    ChatSource::KnowledgeBase,
                    ChatStatus::AwaitingFeedback,
                    KNOWLEDGE_CONFIDENCE,
                )
                .with_category(&entry.category),
                Some(ChatStage::AwaitingFeedback {
                    original_query: message.to_string(),
                }),
            );
        }
        return (
            ChatReply::new(
                TECH_DETAILS_PROMPT,
                ChatSource::KnowledgeBase,
                ChatStatus::GatheringInfo,
                KNOWLEDGE_CONFIDENCE,
            )
            .with_category(&entry.category),
            Some(awaiting_details()),
        );
    }

    let category = ai_router::categorize(message);
    if !ai_router::has_escalation_trigger(message) && engine.has_llm() {
        let answer = engine.fallback_answer(message).await;
        if answer.source == AnswerSource::Llm && !engine.needs_escalation(message, answer.confidence) {
            return (
                ChatReply::new(
                    format!("{}{FEEDBACK_PROMPT}", answer.answer),
                    ChatSource::Llm,
                    ChatStatus::AwaitingFeedback,
                    answer.confidence,
                )
                .with_category(category.as_str()),
                Some(ChatStage::AwaitingFeedback {
                    original_query: message.to_string(),
                }),
            );
        }
    }

    (
        ChatReply::new(
            NO_MATCH_PROMPT,
            ChatSource::HumanEscalation,
            ChatStatus::GatheringInfo,
            0.0,
        )
        .with_category(category.as_str()),
        Some(awaiting_details()),
    )
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(alias = "query")]
    pub message: String,
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    #[serde(flatten)]
    pub reply: ChatReply,
    pub session_id: String,
}

pub async fn chat(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    user.require_role(&[Role::Client])?;
    let message = payload.message.trim().to_string();
    if message.is_empty() {
        return Err(ApiError::BadRequest("Message is required".to_string()));
    }

    let session_id = payload
        .session_id
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| format!("{}_{}", user.user_id, Utc::now().timestamp_millis()));

    let (reply, next) = match state.chat_sessions.take(&session_id, user.user_id) {
        Some(ChatStage::AwaitingTechDetails { original_query }) => {
            match escalate_to_ticket(&state, &user, &original_query, &message).await {
                Ok(reply) => (reply, None),
                Err(e) => {
                    // keep the pending query so the client can resend its details
                    state.chat_sessions.put(
                        &session_id,
                        user.user_id,
                        ChatStage::AwaitingTechDetails { original_query },
                    );
                    return Err(e);
                }
            }
        }
        Some(ChatStage::AwaitingFeedback { original_query }) => handle_feedback(original_query, &message),
        None => handle_new_query(&state.ai, &message).await,
    };

    if let Some(stage) = next {
        state.chat_sessions.put(&session_id, user.user_id, stage);
    }

    let record_reply = reply.clone();
    let record_session = session_id.clone();
    let user_id = user.user_id;
    if let Err(e) = with_conn(&state.conn, move |conn| {
        diesel::insert_into(chat_history::table)
            .values(&NewChatRecord {
                user_id,
                session_id: Some(&record_session),
                message: &message,
                response: &record_reply.response,
                source: record_reply.source.as_str(),
                status: record_reply.status.as_str(),
                confidence: record_reply.confidence,
                ticket_created: record_reply.ticket_id.is_some(),
                ticket_id: record_reply.ticket_id,
            })
            .execute(conn)?;
        Ok(())
    })
    .await
    {
        error!("Failed to save chat history for user {user_id}: {e}");
    }

    Ok(Json(ChatResponse { reply, session_id }))
}

async fn escalate_to_ticket(
    state: &Arc<AppState>,
    user: &AuthenticatedUser,
    original_query: &str,
    details: &str,
) -> Result<ChatReply, ApiError> {
    let description = ticket_description(original_query, details);
    let priority = ai_router::suggested_priority(&description);
    let client_id = user.user_id;
    let ticket = with_conn(&state.conn, move |conn| {
        workflow::create_ticket(conn, client_id, &description, priority)
    })
    .await?;

    info!("Chat escalated to ticket {} for {}", ticket.id, user.username);
    let ticket_id = ticket.id;
    dispatch(state, ticket, TicketEvent::Created { via_chat: true }).await;

    let mut reply = ChatReply::new(
        format!(
            "Thank you. Ticket #{ticket_id} has been created. Our support team will contact you shortly."
        ),
        ChatSource::HumanEscalation,
        ChatStatus::TicketCreated,
        0.0,
    );
    reply.ticket_id = Some(ticket_id);
    Ok(reply)
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub limit: Option<i64>,
}

pub async fn chat_history_handler(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<ChatRecord>>, ApiError> {
    let limit = params.limit.unwrap_or(HISTORY_LIMIT).clamp(1, HISTORY_LIMIT);
    let user_id = user.user_id;
    let rows = with_conn(&state.conn, move |conn| {
        Ok(chat_history::table
            .filter(chat_history::user_id.eq(user_id))
            .order(chat_history::created_at.desc())
            .limit(limit)
            .select(ChatRecord::as_select())
            .load(conn)?)
    })
    .await?;
    Ok(Json(rows))
}

pub fn configure_chat_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(ApiUrls::CHAT, post(chat))
        .route(ApiUrls::CHAT_HISTORY, get(chat_history_handler))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{KnowledgeBase, KnowledgeEntry, Keywords};
    use crate::core::config::AiConfig;
    use crate::llm::LLMProvider;
    use async_trait::async_trait;

    struct CannedLlm;

    #[async_trait]
    impl LLMProvider for CannedLlm {
        async fn generate(
            &self,
            _system_prompt: &str,
            _prompt: &str,
        ) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
            Ok("Try turning Bluetooth off and on.".to_string())
        }
    }

    fn kb_entry(keywords: &[&str], category: &str, answer: &str) -> KnowledgeEntry {
        KnowledgeEntry {
            id: None,
            keywords: Keywords::List(keywords.iter().map(|k| k.to_string()).collect()),
            answer: answer.to_string(),
            category: category.to_string(),
        }
    }

    fn engine(llm: bool) -> AiEngine {
        let kb = KnowledgeBase::from_entries(
            "unused.json",
            vec![
                kb_entry(&["forgot password"], "account", "Use the reset link."),
                kb_entry(&["website slow"], "technical", "Hard refresh."),
            ],
        );
        let provider: Option<Arc<dyn LLMProvider>> = if llm { Some(Arc::new(CannedLlm)) } else { None };
        AiEngine::new(kb, provider, &AiConfig::default())
    }

    #[tokio::test]
    async fn test_informational_match_asks_for_feedback() {
        let (reply, next) = handle_new_query(&engine(false), "I forgot password").await;
        assert_eq!(reply.response, format!("Use the reset link.{FEEDBACK_PROMPT}"));
        assert_eq!(reply.status, ChatStatus::AwaitingFeedback);
        assert_eq!(reply.category.as_deref(), Some("account"));
        assert!(matches!(next, Some(ChatStage::AwaitingFeedback { .. })));
    }

    #[tokio::test]
    async fn test_technical_match_gathers_details() {
        let (reply, next) = handle_new_query(&engine(false), "the website slow again").await;
        assert_eq!(reply.response, TECH_DETAILS_PROMPT);
        assert_eq!(reply.status, ChatStatus::GatheringInfo);
        assert_eq!(
            next,
            Some(ChatStage::AwaitingTechDetails {
                original_query: "the website slow again".into()
            })
        );
    }

    #[tokio::test]
    async fn test_no_match_without_llm_escalates() {
        let (reply, next) = handle_new_query(&engine(false), "my headset hums").await;
        assert_eq!(reply.source, ChatSource::HumanEscalation);
        assert_eq!(reply.response, NO_MATCH_PROMPT);
        assert!(matches!(next, Some(ChatStage::AwaitingTechDetails { .. })));
    }

    #[tokio::test]
    async fn test_no_match_uses_llm_when_confident() {
        let (reply, _) = handle_new_query(&engine(true), "my headset hums").await;
        assert_eq!(reply.source, ChatSource::Llm);
        assert!(reply.response.starts_with("Try turning Bluetooth"));
        assert!(reply.response.ends_with(FEEDBACK_PROMPT));
    }

    #[tokio::test]
    async fn test_escalation_keyword_skips_llm() {
        let (reply, _) = handle_new_query(&engine(true), "server crash on deploy").await;
        assert_eq!(reply.source, ChatSource::HumanEscalation);
        assert_eq!(reply.category.as_deref(), Some("technical"));
    }

    #[test]
    fn test_feedback_transitions() {
        let (reply, next) = handle_feedback("q".into(), "Yes, thanks!");
        assert_eq!(reply.status, ChatStatus::Resolved);
        assert!(next.is_none());

        let (reply, next) = handle_feedback("q".into(), "yesterday it broke again");
        assert_eq!(reply.response, NOT_RESOLVED_REPLY);
        assert_eq!(next, Some(ChatStage::AwaitingTechDetails { original_query: "q".into() }));
    }

    #[tokio::test]
    async fn test_failed_escalation_keeps_pending_details() {
        use crate::core::shared::test_utils::TestAppStateBuilder;

        let state = TestAppStateBuilder::new().build();
        let stage = ChatStage::AwaitingTechDetails {
            original_query: "vpn drops".into(),
        };
        state.chat_sessions.put("s1", 9, stage.clone());

        let user = AuthenticatedUser {
            user_id: 9,
            username: "carol".into(),
            role: Role::Client,
        };
        let request = ChatRequest {
            message: "it happens every hour".into(),
            session_id: Some("s1".into()),
        };
        let result = chat(State(Arc::clone(&state)), user, Json(request)).await;

        assert!(result.is_err());
        assert_eq!(state.chat_sessions.take("s1", 9), Some(stage));
    }

    #[test]
    fn test_ticket_description_format() {
        assert_eq!(
            ticket_description("vpn drops", "happens hourly"),
            "Original Query: vpn drops\n\nUser Details: happens hourly"
        );
    }
}
