use log::{error, warn};
use serde::Serialize;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::knowledge::{KnowledgeBase, KnowledgeMatch};
use super::router;
use crate::core::config::AiConfig;
use crate::llm::LLMProvider;

pub const SYSTEM_PROMPT: &str = "You are a helpful IT support assistant. Provide clear, concise \
solutions to technical problems. If you can solve the issue, provide step-by-step instructions. \
If the issue requires human intervention, suggest creating a support ticket. Keep responses \
under 200 words and be professional.";

pub const UNAVAILABLE_REPLY: &str = "I'm sorry, I couldn't find an answer to that right now. \
Please describe your issue in more detail and I'll create a ticket for our support team.";

pub const UNAVAILABLE_CONFIDENCE: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerSource {
    KnowledgeBase,
    Llm,
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AiAnswer {
    pub answer: String,
    pub confidence: f64,
    pub source: AnswerSource,
}

pub struct AiEngine {
    knowledge: RwLock<KnowledgeBase>,
    llm: Option<Arc<dyn LLMProvider>>,
    llm_confidence: f64,
    escalation_threshold: f64,
}

impl AiEngine {
    pub fn new(knowledge: KnowledgeBase, llm: Option<Arc<dyn LLMProvider>>, config: &AiConfig) -> Self {
        Self {
            knowledge: RwLock::new(knowledge),
            llm,
            llm_confidence: config.llm_confidence,
            escalation_threshold: config.escalation_threshold,
        }
    }

    pub fn knowledge(&self) -> RwLockReadGuard<'_, KnowledgeBase> {
        self.knowledge.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn knowledge_mut(&self) -> RwLockWriteGuard<'_, KnowledgeBase> {
        self.knowledge.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn best_match(&self, query: &str) -> Option<KnowledgeMatch> {
        self.knowledge().best_match(query)
    }

    pub fn has_llm(&self) -> bool {
        self.llm.is_some()
    }

    pub fn escalation_threshold(&self) -> f64 {
        self.escalation_threshold
    }

    pub fn needs_escalation(&self, query: &str, confidence: f64) -> bool {
        router::needs_escalation(query, confidence, self.escalation_threshold)
    }

    /// Asks the hosted model; never fails, degrading to a low-confidence apology.
    pub async fn fallback_answer(&self, query: &str) -> AiAnswer {
        let Some(llm) = &self.llm else {
            warn!("No LLM configured, returning canned reply");
            return unavailable();
        };

        match llm.generate(SYSTEM_PROMPT, query).await {
            Ok(answer) => AiAnswer {
                answer,
                confidence: self.llm_confidence,
                source: AnswerSource::Llm,
            },
            Err(e) => {
                error!("LLM request failed: {e}");
                unavailable()
            }
        }
    }
}

fn unavailable() -> AiAnswer {
    AiAnswer {
        answer: UNAVAILABLE_REPLY.to_string(),
        confidence: UNAVAILABLE_CONFIDENCE,
        source: AnswerSource::Unavailable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct FixedLlm(Result<&'static str, &'static str>);

    #[async_trait]
    impl LLMProvider for FixedLlm {
        async fn generate(
            &self,
            system_prompt: &str,
            _prompt: &str,
        ) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
            assert_eq!(system_prompt, SYSTEM_PROMPT);
            self.0.map(str::to_string).map_err(Into::into)
        }
    }

    fn engine(llm: Option<Arc<dyn LLMProvider>>) -> AiEngine {
        AiEngine::new(KnowledgeBase::default(), llm, &AiConfig::default())
    }

    #[tokio::test]
    async fn test_fallback_success_uses_configured_confidence() {
        let engine = engine(Some(Arc::new(FixedLlm(Ok("Clear the cache.")))));
        let answer = engine.fallback_answer("site looks odd").await;
        assert_eq!(answer.source, AnswerSource::Llm);
        assert_eq!(answer.answer, "Clear the cache.");
        assert!((answer.confidence - 0.85).abs() < f64::EPSILON);
        assert!(!engine.needs_escalation("site looks odd", answer.confidence));
    }

    #[tokio::test]
    async fn test_fallback_error_degrades() {
        let engine = engine(Some(Arc::new(FixedLlm(Err("timeout")))));
        let answer = engine.fallback_answer("anything").await;
        assert_eq!(answer.source, AnswerSource::Unavailable);
        assert!(engine.needs_escalation("anything", answer.confidence));
    }

    #[tokio::test]
    async fn test_fallback_without_client() {
        let engine = engine(None);
        assert!(!engine.has_llm());
        assert_eq!(engine.fallback_answer("x").await.confidence, UNAVAILABLE_CONFIDENCE);
    }
}
