pub mod admin;
pub mod engine;
pub mod knowledge;
pub mod router;

pub use engine::{AiAnswer, AiEngine, AnswerSource};
pub use knowledge::{KnowledgeBase, KnowledgeEntry, KnowledgeMatch, Keywords};
pub use router::{categorize, needs_escalation, suggested_priority, QueryCategory};
