//! Long-term memory pipeline and retrieval engine.
//!
//! Conversation ingestion → semantic compression → embedding and vector
//! indexing → hybrid retrieval with AI rerank → memory fusion → context
//! injection. This crate holds the domain model, the component seam traits
//! (`Embedder`, `Reranker`, `Completer`, `Store`, `VectorIndex`), and the
//! pipeline logic that drives them; concrete I/O implementations live in
//! sibling crates.

pub mod compressor;
pub mod constants;
pub mod error;
pub mod fuser;
pub mod injector;
pub mod model;
pub mod orchestrator;
pub mod retriever;
pub mod time;
pub mod tokenizer;
pub mod traits;

pub use compressor::Compressor;
pub use error::{CoreError, ErrorPayload, Result, Warnings};
pub use fuser::{FusionMode, FusionResult, Fuser};
pub use injector::{ContextInjectionRequest, InjectedMemory, InjectionMode, InjectionResult, Injector};
pub use model::{
    Conversation, ConversationStatus, Embedding, Id, MatchType, MemoryUnit, Message, MessageType,
    Metadata, SearchResult, UnitType,
};
pub use orchestrator::{ComponentHealth, HealthState, Orchestrator, StatusReport, StoreConversationResult};
pub use retriever::{QueryType, RetrievalOutcome, Retriever, SearchQuery, Timings};
pub use traits::{
    Completer, Embedder, Reranker, Store, UnitQuery, VectorFilter, VectorIndex, VectorPayload,
    VectorSearchHit,
};
