//! C8 Service Orchestrator: owns the lifecycles of C1–C7 and exposes the
//! four coarse public operations consumed by both transport surfaces.
//!
//! Startup order: C2 → C3 → C1 → (C4, C5, C6) → C7 → C8. Shutdown reverses.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{RwLock, Semaphore};

use crate::compressor::Compressor;
use crate::constants::{COMPRESSOR_INFLIGHT_LIMIT, EMBEDDING_DIM};
use crate::error::{CoreError, Result};
use crate::fuser::Fuser;
use crate::injector::{ContextInjectionRequest, InjectionResult, Injector};
use crate::model::{Conversation, Id};
use crate::retriever::{Retriever, SearchQuery};
use crate::traits::{Embedder, Store, VectorFilter, VectorIndex, VectorPayload};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HealthState {
    Ok,
    Degraded,
    Down,
}

#[derive(Clone, Debug)]
pub struct ComponentHealth {
    pub state: HealthState,
    pub detail: Option<String>,
}

#[derive(Default)]
struct Counters {
    conversations_processed: AtomicU64,
    memories_created: AtomicU64,
    searches: AtomicU64,
    injections: AtomicU64,
}

#[derive(Clone, Debug)]
pub struct StatusReport {
    pub uptime_s: u64,
    pub conversations_processed: u64,
    pub memories_created: u64,
    pub searches: u64,
    pub injections: u64,
    pub component_health: HashMap<String, ComponentHealth>,
}

#[derive(Clone, Debug)]
pub struct StoreConversationResult {
    pub memory_unit_ids: Vec<Id>,
    pub warnings: Vec<String>,
}

pub struct Orchestrator {
    store: Arc<dyn Store>,
    vector_index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    compressor: Compressor,
    retriever: Retriever,
    fuser: Fuser,
    embed_model: String,
    compressor_gate: Semaphore,
    counters: Counters,
    health: RwLock<HashMap<String, ComponentHealth>>,
    started_at: Instant,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn Store>,
        vector_index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
        compressor: Compressor,
        retriever: Retriever,
        fuser: Fuser,
        embed_model: impl Into<String>,
    ) -> Self {
        let mut health = HashMap::new();
        for name in ["store", "vector_index", "gateway", "compressor", "retriever", "fuser"] {
            health.insert(
                name.to_string(),
                ComponentHealth {
                    state: HealthState::Ok,
                    detail: None,
                },
            );
        }

        Self {
            store,
            vector_index,
            embedder,
            compressor,
            retriever,
            fuser,
            embed_model: embed_model.into(),
            compressor_gate: Semaphore::new(COMPRESSOR_INFLIGHT_LIMIT),
            counters: Counters::default(),
            health: RwLock::new(health),
            started_at: Instant::now(),
        }
    }

    pub async fn start(&self) {
        tracing::info!("orchestrator starting: C2 -> C3 -> C1 -> (C4, C5, C6) -> C7 -> C8");
    }

    pub async fn stop(&self) {
        tracing::info!("orchestrator shutting down");
    }

    pub async fn health(&self) -> HashMap<String, ComponentHealth> {
        self.health.read().await.clone()
    }

    /// Idempotent on `conversation.id`: a replayed conversation returns the
    /// ids created on the first call without recomputing anything.
    pub async fn store_conversation(&self, conversation: Conversation) -> Result<StoreConversationResult> {
        let existing = self
            .store
            .existing_unit_ids_for_conversation(conversation.id)
            .await?;
        if !existing.is_empty() {
            return Ok(StoreConversationResult {
                memory_unit_ids: existing,
                warnings: Vec::new(),
            });
        }

        // Backpressure: block when the compressor's in-flight count reaches K_c.
        let _permit = self
            .compressor_gate
            .acquire()
            .await
            .map_err(|_| CoreError::Fatal("compressor semaphore closed".into()))?;

        let units = self.compressor.compress(&conversation).await?;

        let ids = self
            .store
            .store_conversation_atomic(&conversation, &units)
            .await?;

        self.counters.conversations_processed.fetch_add(1, Ordering::Relaxed);
        self.counters
            .memories_created
            .fetch_add(units.len() as u64, Ordering::Relaxed);

        let mut warnings = Vec::new();
        for unit in &units {
            if !unit.is_active {
                continue;
            }
            match self.embedder.embed(&self.embed_model, &[unit.summary.clone()]).await {
                Ok(mut vecs) if vecs.len() == 1 && vecs[0].len() == EMBEDDING_DIM => {
                    let vector = vecs.remove(0);
                    let payload = VectorPayload {
                        memory_unit_id: unit.id,
                        project_id: unit.project_id.clone(),
                        unit_type: format!("{:?}", unit.unit_type).to_lowercase(),
                        title: unit.title.clone(),
                        summary: unit.summary.clone(),
                        keywords: unit.keywords.clone(),
                        created_at: unit.created_at,
                        relevance_score: unit.relevance_score,
                    };
                    match self.vector_index.upsert(unit.id, vector, payload).await {
                        Ok(()) => {
                            if let Err(e) = self
                                .store
                                .record_embedding(unit.id, &self.embed_model, EMBEDDING_DIM)
                                .await
                            {
                                warnings.push(format!("record_embedding_failed:{}: {e}", unit.id));
                            }
                        }
                        Err(e) => warnings.push(format!("index_failed:{}: {e}", unit.id)),
                    }
                }
                Ok(_) => {
                    // Dimensionality invariant: never silently index a
                    // different-width vector. The unit stays an orphan for
                    // the background sweep to retry.
                    warnings.push(format!("embed_dimension_mismatch:{}", unit.id));
                }
                Err(e) => {
                    warnings.push(format!("embed_failed:{}: {e}", unit.id));
                }
            }
        }

        self.retriever.invalidate_project(&conversation.project_id).await;

        Ok(StoreConversationResult {
            memory_unit_ids: ids,
            warnings,
        })
    }

    pub async fn search_memories(&self, query: SearchQuery) -> Result<crate::retriever::RetrievalOutcome> {
        self.counters.searches.fetch_add(1, Ordering::Relaxed);
        self.retriever.retrieve(query, true).await
    }

    pub async fn inject_context(&self, request: ContextInjectionRequest) -> Result<InjectionResult> {
        self.counters.injections.fetch_add(1, Ordering::Relaxed);
        let injector = Injector::new(&self.retriever, &self.fuser);
        injector.inject(request).await
    }

    pub async fn status(&self) -> StatusReport {
        StatusReport {
            uptime_s: self.started_at.elapsed().as_secs(),
            conversations_processed: self.counters.conversations_processed.load(Ordering::Relaxed),
            memories_created: self.counters.memories_created.load(Ordering::Relaxed),
            searches: self.counters.searches.load(Ordering::Relaxed),
            injections: self.counters.injections.load(Ordering::Relaxed),
            component_health: self.health().await,
        }
    }

    /// Background orphan sweep: `is_active=true` units with no embedding row
    /// get re-embedded and re-indexed. Upsert is idempotent because the
    /// point id equals the memory-unit id.
    pub async fn sweep_orphans(&self) -> Result<usize> {
        let orphans = self.store.orphaned_units().await?;
        let mut fixed = 0;
        for unit in orphans {
            let mut vecs = match self.embedder.embed(&self.embed_model, &[unit.summary.clone()]).await {
                Ok(vecs) => vecs,
                Err(e) => {
                    tracing::warn!(unit_id = %unit.id, error = %e, "orphan sweep: embed failed");
                    continue;
                }
            };
            if vecs.len() != 1 || vecs[0].len() != EMBEDDING_DIM {
                tracing::warn!(unit_id = %unit.id, "orphan sweep: embed dimension mismatch");
                continue;
            }
            let vector = vecs.remove(0);
            let payload = VectorPayload {
                memory_unit_id: unit.id,
                project_id: unit.project_id.clone(),
                unit_type: format!("{:?}", unit.unit_type).to_lowercase(),
                title: unit.title.clone(),
                summary: unit.summary.clone(),
                keywords: unit.keywords.clone(),
                created_at: unit.created_at,
                relevance_score: unit.relevance_score,
            };
            match self.vector_index.upsert(unit.id, vector, payload).await {
                Ok(()) => {
                    if let Err(e) = self
                        .store
                        .record_embedding(unit.id, &self.embed_model, EMBEDDING_DIM)
                        .await
                    {
                        tracing::warn!(unit_id = %unit.id, error = %e, "orphan sweep: record_embedding failed");
                        continue;
                    }
                    fixed += 1;
                }
                Err(e) => tracing::warn!(unit_id = %unit.id, error = %e, "orphan sweep: upsert failed"),
            }
        }
        Ok(fixed)
    }

    /// Soft-delete: set `is_active=false` and remove the vector.
    pub async fn deactivate_unit(&self, id: Id) -> Result<()> {
        self.store.set_unit_active(id, false).await?;
        let _ = self.vector_index.delete(id).await;
        Ok(())
    }

    pub async fn count_active_vectors(&self, project_id: Option<String>) -> Result<u64> {
        self.vector_index.count(VectorFilter { project_id }).await
    }
}
