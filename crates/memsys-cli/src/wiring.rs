//! Builds a fully wired `Orchestrator` from a loaded `Config`, or an
//! in-memory one for tests. Shared between the stdio and HTTP transports
//! so both see the same store, index, and gateway.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use memsys_core::compressor::Compressor;
use memsys_core::fuser::Fuser;
use memsys_core::orchestrator::Orchestrator;
use memsys_core::retriever::Retriever;
use memsys_core::traits::{Completer, Embedder, Reranker};
use memsys_gateway::Gateway;
use memsys_store::{ConnectionPool, Store};
use memsys_vector::QdrantVectorIndex;

use crate::config::Config;

pub async fn build_orchestrator(config: &Config) -> anyhow::Result<Orchestrator> {
    let pool = ConnectionPool::open(
        std::path::Path::new(&config.store.path),
        config.store.pool_size,
        Duration::from_secs(memsys_core::constants::POOL_ACQUIRE_TIMEOUT_SECS),
    )
    .context("opening store connection pool")?;
    let store: Arc<dyn memsys_core::traits::Store> = Arc::new(Store::new(Arc::new(pool)));

    let vector_index: Arc<dyn memsys_core::traits::VectorIndex> = {
        let collection = config
            .vector
            .collection
            .clone()
            .unwrap_or_else(|| memsys_vector::DEFAULT_COLLECTION.to_string());
        let index = QdrantVectorIndex::connect(&config.vector.url)
            .context("connecting to qdrant")
            .map(|idx| idx.with_collection(collection))?;
        index.ensure_collection().await.context("ensuring qdrant collection")?;
        Arc::new(index)
    };

    let embed_chain = config.chain_for(&config.models.embed);
    let rerank_chain = config
        .models
        .rerank
        .as_deref()
        .map(|m| config.chain_for(m))
        .unwrap_or_default();
    let heavy_chain = config.chain_for(&config.models.heavy);

    let gateway = Arc::new(
        Gateway::new(
            config.provider_configs(),
            embed_chain,
            rerank_chain,
            heavy_chain,
        )
        .context("building model gateway")?,
    );

    let embedder: Arc<dyn Embedder> = gateway.clone();
    let reranker: Arc<dyn Reranker> = gateway.clone();
    let completer: Arc<dyn Completer> = gateway.clone();

    let compressor = Compressor::new(Some(completer.clone()), config.models.heavy.clone());
    let fuser = Fuser::new(Some(completer), config.models.heavy.clone());
    let retriever = Retriever::new(
        embedder.clone(),
        reranker,
        store.clone(),
        vector_index.clone(),
        config.models.embed.clone(),
        config.models.rerank.clone().unwrap_or_default(),
        true,
    );

    Ok(Orchestrator::new(
        store,
        vector_index,
        embedder,
        compressor,
        retriever,
        fuser,
        config.models.embed.clone(),
    ))
}

/// In-memory orchestrator with no gateway provider configured: used by
/// `mcp_server` and `http_server` unit tests. Embedding/rerank/completion
/// calls fail (no providers to serve them), which is fine for the paths
/// those tests exercise — store/search against an empty index.
#[cfg(test)]
pub async fn test_orchestrator() -> Orchestrator {
    let pool = ConnectionPool::open_in_memory(4).expect("open in-memory pool");
    let store: Arc<dyn memsys_core::traits::Store> = Arc::new(Store::new(Arc::new(pool)));

    struct NullGateway;

    #[async_trait::async_trait]
    impl Embedder for NullGateway {
        async fn embed(&self, _model: &str, texts: &[String]) -> memsys_core::Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|_| vec![0.0_f32; memsys_core::constants::EMBEDDING_DIM])
                .collect())
        }
    }

    #[async_trait::async_trait]
    impl Reranker for NullGateway {
        async fn rerank(
            &self,
            _model: &str,
            _query: &str,
            _docs: &[String],
            _top_k: usize,
        ) -> memsys_core::Result<Vec<(usize, f64)>> {
            Ok(Vec::new())
        }

        fn is_available(&self) -> bool {
            false
        }
    }

    #[async_trait::async_trait]
    impl Completer for NullGateway {
        async fn complete(&self, _model: &str, _prompt: &str, _max_tokens: u32) -> memsys_core::Result<String> {
            Err(memsys_core::CoreError::NotConfigured("no completion provider in tests".into()))
        }

        fn is_available(&self) -> bool {
            false
        }
    }

    let gateway = Arc::new(NullGateway);
    let embedder: Arc<dyn Embedder> = gateway.clone();
    let reranker: Arc<dyn Reranker> = gateway.clone();
    let completer: Arc<dyn Completer> = gateway.clone();

    let vector_index: Arc<dyn memsys_core::traits::VectorIndex> = Arc::new(InMemoryVectorIndex::default());

    let compressor = Compressor::new(Some(completer.clone()), "test-heavy");
    let fuser = Fuser::new(Some(completer), "test-heavy");
    let retriever = Retriever::new(
        embedder.clone(),
        reranker,
        store.clone(),
        vector_index.clone(),
        "test-embed",
        "test-rerank",
        false,
    );

    Orchestrator::new(store, vector_index, embedder, compressor, retriever, fuser, "test-embed")
}

#[cfg(test)]
#[derive(Default)]
struct InMemoryVectorIndex {
    points: tokio::sync::Mutex<std::collections::HashMap<memsys_core::model::Id, (Vec<f32>, memsys_core::traits::VectorPayload)>>,
}

#[cfg(test)]
#[async_trait::async_trait]
impl memsys_core::traits::VectorIndex for InMemoryVectorIndex {
    async fn upsert(
        &self,
        point_id: memsys_core::model::Id,
        vector: Vec<f32>,
        payload: memsys_core::traits::VectorPayload,
    ) -> memsys_core::Result<()> {
        self.points.lock().await.insert(point_id, (vector, payload));
        Ok(())
    }

    async fn search(
        &self,
        _vector: Vec<f32>,
        filter: memsys_core::traits::VectorFilter,
        limit: usize,
    ) -> memsys_core::Result<Vec<memsys_core::traits::VectorSearchHit>> {
        let points = self.points.lock().await;
        let hits = points
            .iter()
            .filter(|(_, (_, payload))| {
                filter
                    .project_id
                    .as_ref()
                    .is_none_or(|p| &payload.project_id == p)
            })
            .take(limit)
            .map(|(id, (_, payload))| memsys_core::traits::VectorSearchHit {
                point_id: *id,
                score: 1.0,
                payload: payload.clone(),
            })
            .collect();
        Ok(hits)
    }

    async fn set_payload(&self, point_id: memsys_core::model::Id, patch: serde_json::Value) -> memsys_core::Result<()> {
        let mut points = self.points.lock().await;
        if let Some((_, payload)) = points.get_mut(&point_id) {
            let mut json = serde_json::to_value(&*payload).unwrap_or_default();
            if let (Some(obj), serde_json::Value::Object(patch_obj)) = (json.as_object_mut(), patch) {
                obj.extend(patch_obj);
            }
            *payload = serde_json::from_value(json).unwrap_or_else(|_| payload.clone());
        }
        Ok(())
    }

    async fn delete(&self, point_id: memsys_core::model::Id) -> memsys_core::Result<()> {
        self.points.lock().await.remove(&point_id);
        Ok(())
    }

    async fn count(&self, filter: memsys_core::traits::VectorFilter) -> memsys_core::Result<u64> {
        let points = self.points.lock().await;
        Ok(points
            .values()
            .filter(|(_, payload)| {
                filter
                    .project_id
                    .as_ref()
                    .is_none_or(|p| &payload.project_id == p)
            })
            .count() as u64)
    }
}
