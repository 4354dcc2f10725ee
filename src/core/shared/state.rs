use crate::ai::{AiEngine, KnowledgeBase};
use crate::chat::ChatSessions;
use crate::core::config::AppConfig;
use crate::email::EmailService;
use crate::llm::{LLMProvider, OpenAIClient};
use crate::security::JwtManager;
use crate::core::shared::utils::DbPool;
use crate::tickets::visibility::QueryStats;
use log::{info, warn};
use std::sync::Arc;
use std::time::Instant;

pub struct AppState {
    pub config: AppConfig,
    pub conn: DbPool,
    pub jwt: JwtManager,
    pub ai: AiEngine,
    pub email: EmailService,
    pub chat_sessions: ChatSessions,
    pub visibility_stats: QueryStats,
    pub started_at: Instant,
}

impl AppState {
    /// Wires the runtime services from configuration around an existing pool.
    pub fn new(config: AppConfig, conn: DbPool) -> Self {
        let knowledge = KnowledgeBase::load(config.ai.knowledge_base_path.clone());
        info!("Knowledge base loaded with {} entries", knowledge.len());

        let llm: Option<Arc<dyn LLMProvider>> = match OpenAIClient::from_config(&config.ai) {
            Some(client) => {
                info!("LLM fallback enabled ({} via {})", config.ai.model, config.ai.base_url);
                Some(Arc::new(client))
            }
            None => {
                warn!("No AI API key configured, chat will escalate unmatched queries");
                None
            }
        };

        let email = EmailService::from_config(&config.email);
        if !email.is_enabled() {
            warn!("SMTP not configured, email notifications are disabled");
        }

        Self {
            jwt: JwtManager::from_config(&config.auth),
            ai: AiEngine::new(knowledge, llm, &config.ai),
            email,
            chat_sessions: ChatSessions::default(),
            visibility_stats: QueryStats::default(),
            started_at: Instant::now(),
            config,
            conn,
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("server", &self.config.server)
            .field("conn", &"DbPool")
            .field("jwt", &"[REDACTED]")
            .field("llm", &self.ai.has_llm())
            .field("email", &self.email.is_enabled())
            .field("chat_sessions", &self.chat_sessions.len())
            .finish()
    }
}
