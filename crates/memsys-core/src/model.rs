//! Domain types shared by every component: §3 of the design.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 128-bit identifier rendered as text everywhere outside SQLite rowids.
pub type Id = Uuid;

/// Opaque metadata bag attached to conversations, messages, and memory units.
pub type Metadata = HashMap<String, serde_json::Value>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    Active,
    Completed,
    Archived,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Human,
    Assistant,
    System,
    Tool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UnitType {
    #[default]
    Conversation,
    Documentation,
    Archive,
    Synthetic,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    Semantic,
    Keyword,
    Hybrid,
}

/// A conversation between the user and the assistant.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Id,
    pub project_id: String,
    pub session_id: Option<String>,
    pub title: Option<String>,
    pub started_at: u64,
    pub last_activity_at: u64,
    pub message_count: u32,
    pub token_count: u32,
    pub status: ConversationStatus,
    pub metadata: Metadata,
    pub messages: Vec<Message>,
}

impl Conversation {
    pub fn new(project_id: impl Into<String>) -> Self {
        let now = crate::time::now_unix_millis();
        Self {
            id: Uuid::new_v4(),
            project_id: project_id.into(),
            session_id: None,
            title: None,
            started_at: now,
            last_activity_at: now,
            message_count: 0,
            token_count: 0,
            status: ConversationStatus::Active,
            metadata: Metadata::new(),
            messages: Vec::new(),
        }
    }
}

/// A single turn within a conversation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub id: Id,
    pub conversation_id: Id,
    pub message_type: MessageType,
    pub content: String,
    pub timestamp: u64,
    pub token_count: u32,
    pub metadata: Metadata,
}

impl Message {
    pub fn new(conversation_id: Id, message_type: MessageType, content: impl Into<String>) -> Self {
        let content = content.into();
        let token_count = crate::tokenizer::estimate_tokens(&content);
        Self {
            id: Uuid::new_v4(),
            conversation_id,
            message_type,
            content,
            timestamp: crate::time::now_unix_millis(),
            token_count,
            metadata: Metadata::new(),
        }
    }
}

/// The central entity: a durable, retrievable distillation of a conversation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MemoryUnit {
    pub id: Id,
    pub conversation_id: Id,
    pub project_id: String,
    pub unit_type: UnitType,
    pub title: String,
    pub summary: String,
    pub content: String,
    pub keywords: Vec<String>,
    pub relevance_score: f64,
    pub token_count: u32,
    pub created_at: u64,
    pub updated_at: u64,
    pub expires_at: Option<u64>,
    pub is_active: bool,
    pub metadata: Metadata,
}

impl MemoryUnit {
    /// Truncate `title`/`summary` to their documented caps and normalize keywords.
    /// Called once at construction so every unit that reaches the store already
    /// satisfies the invariants in §3.
    pub fn normalize(mut self) -> Self {
        if self.title.chars().count() > 200 {
            self.title = self.title.chars().take(200).collect();
        }
        if self.summary.chars().count() > 2_000 {
            self.summary = self.summary.chars().take(2_000).collect();
        }
        self.keywords = crate::tokenizer::normalize_keywords(&self.keywords, crate::constants::MAX_KEYWORDS);
        self
    }
}

/// A record of which vector exists for a memory unit and under which model.
/// The vector itself lives only in C3.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Embedding {
    pub memory_unit_id: Id,
    pub model_name: String,
    pub dimension: usize,
    pub created_at: u64,
}

/// Ephemeral result of a retrieval, never persisted.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchResult {
    pub memory_unit: MemoryUnit,
    pub relevance_score: f64,
    pub rerank_score: Option<f64>,
    pub match_type: MatchType,
    pub matched_keywords: Vec<String>,
    pub metadata: Metadata,
}
