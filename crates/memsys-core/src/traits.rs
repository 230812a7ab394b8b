//! Operation interfaces at the component seams, per the "multi-provider
//! routing with heterogeneous SDKs" design note: three narrow interfaces for
//! C1's operations, plus the persistence and indexing seams for C2/C3.
//! Concrete implementations live in the `memsys-gateway`, `memsys-store`,
//! and `memsys-vector` crates; this crate only ever sees trait objects.

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{Conversation, Id, MemoryUnit};

/// `embed(model, text[]) -> vec[]`.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, model: &str, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// `rerank(model, query, docs[], top_k) -> (index, score)[]`.
#[async_trait]
pub trait Reranker: Send + Sync {
    async fn rerank(
        &self,
        model: &str,
        query: &str,
        docs: &[String],
        top_k: usize,
    ) -> Result<Vec<(usize, f64)>>;

    /// Whether a rerank model is currently configured and reachable.
    fn is_available(&self) -> bool;
}

/// `complete(model, messages, params) -> text`.
#[async_trait]
pub trait Completer: Send + Sync {
    async fn complete(&self, model: &str, prompt: &str, max_tokens: u32) -> Result<String>;

    /// Whether a completion model is currently configured.
    fn is_available(&self) -> bool;
}

/// Payload carried alongside each vector in C3.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct VectorPayload {
    pub memory_unit_id: Id,
    pub project_id: String,
    pub unit_type: String,
    pub title: String,
    pub summary: String,
    pub keywords: Vec<String>,
    pub created_at: u64,
    pub relevance_score: f64,
}

#[derive(Clone, Debug, Default)]
pub struct VectorFilter {
    pub project_id: Option<String>,
}

#[derive(Clone, Debug)]
pub struct VectorSearchHit {
    pub point_id: Id,
    pub score: f64,
    pub payload: VectorPayload,
}

/// C3 vector index operations.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn upsert(&self, point_id: Id, vector: Vec<f32>, payload: VectorPayload) -> Result<()>;
    async fn search(
        &self,
        vector: Vec<f32>,
        filter: VectorFilter,
        limit: usize,
    ) -> Result<Vec<VectorSearchHit>>;
    async fn set_payload(&self, point_id: Id, patch: serde_json::Value) -> Result<()>;
    async fn delete(&self, point_id: Id) -> Result<()>;
    async fn count(&self, filter: VectorFilter) -> Result<u64>;
}

#[derive(Clone, Debug, Default)]
pub struct UnitQuery {
    pub project_id: Option<String>,
    pub conversation_id: Option<Id>,
    pub is_active: Option<bool>,
    pub keyword_tokens: Option<Vec<String>>,
}

/// C2 persistent store operations.
#[async_trait]
pub trait Store: Send + Sync {
    /// Persist a Conversation with its Messages and MemoryUnits as one
    /// atomic unit. Idempotent on `conversation.id`: a second call with
    /// the same id is a no-op that returns the ids created the first time.
    async fn store_conversation_atomic(
        &self,
        conversation: &Conversation,
        units: &[MemoryUnit],
    ) -> Result<Vec<Id>>;

    async fn get_conversation(&self, id: Id) -> Result<Option<Conversation>>;

    async fn existing_unit_ids_for_conversation(&self, conversation_id: Id) -> Result<Vec<Id>>;

    async fn set_unit_active(&self, id: Id, is_active: bool) -> Result<()>;

    async fn query_units(&self, query: UnitQuery) -> Result<Vec<MemoryUnit>>;

    async fn get_unit(&self, id: Id) -> Result<Option<MemoryUnit>>;

    /// Units that are active but have no embedding row — the orphan set
    /// scanned by the background sweep.
    async fn orphaned_units(&self) -> Result<Vec<MemoryUnit>>;

    async fn record_embedding(&self, memory_unit_id: Id, model_name: &str, dimension: usize) -> Result<()>;

    async fn has_embedding(&self, memory_unit_id: Id) -> Result<bool>;
}
