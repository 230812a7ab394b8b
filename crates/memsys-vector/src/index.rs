//! C3 Vector Index: Qdrant-backed implementation of `memsys_core::VectorIndex`.
//!
//! One collection per deployment (`DEFAULT_COLLECTION`), cosine distance,
//! `EMBEDDING_DIM`-wide vectors. `project_id` rides along as a payload field
//! rather than a separate collection — per the design's single-store
//! project-tag decision, isolation is a filter, not a physical boundary.

use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter,
    PointStruct, SearchPointsBuilder, SetPayloadPointsBuilder, UpsertPointsBuilder,
    VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant};

use memsys_core::traits::{VectorFilter, VectorIndex, VectorPayload, VectorSearchHit};
use memsys_core::{constants::EMBEDDING_DIM, Id};

use crate::error::{Result, VectorError};

pub const DEFAULT_COLLECTION: &str = "memsys_units";

pub struct QdrantVectorIndex {
    client: Qdrant,
    collection: String,
}

impl QdrantVectorIndex {
    pub fn new(client: Qdrant, collection: impl Into<String>) -> Self {
        Self {
            client,
            collection: collection.into(),
        }
    }

    pub fn connect(url: &str) -> Result<Self> {
        let client = Qdrant::from_url(url)
            .build()
            .map_err(|e| VectorError::Client(e.to_string()))?;
        Ok(Self::new(client, DEFAULT_COLLECTION))
    }

    /// Overrides the collection name after construction, e.g. from config.
    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    /// Creates the collection if absent. Idempotent: a pre-existing
    /// collection is left untouched.
    pub async fn ensure_collection(&self) -> Result<()> {
        let exists = self
            .client
            .collection_exists(&self.collection)
            .await
            .map_err(|e| VectorError::Client(e.to_string()))?;
        if exists {
            return Ok(());
        }

        self.client
            .create_collection(
                CreateCollectionBuilder::new(&self.collection)
                    .vectors_config(VectorParamsBuilder::new(EMBEDDING_DIM as u64, Distance::Cosine)),
            )
            .await
            .map_err(|e| VectorError::Client(e.to_string()))?;
        Ok(())
    }
}

fn payload_to_qdrant(payload: &VectorPayload) -> Result<Payload> {
    let json = serde_json::to_value(payload).map_err(|e| VectorError::InvalidPayload(e.to_string()))?;
    Payload::try_from(json).map_err(|e| VectorError::InvalidPayload(e.to_string()))
}

fn payload_from_qdrant(raw: std::collections::HashMap<String, qdrant_client::qdrant::Value>) -> Result<VectorPayload> {
    let payload: Payload = raw.into();
    let json: serde_json::Value = payload.into();
    serde_json::from_value(json).map_err(|e| VectorError::InvalidPayload(e.to_string()))
}

fn project_filter(filter: VectorFilter) -> Option<Filter> {
    filter
        .project_id
        .map(|project_id| Filter::must([Condition::matches("project_id", project_id)]))
}

#[async_trait::async_trait]
impl VectorIndex for QdrantVectorIndex {
    async fn upsert(&self, point_id: Id, vector: Vec<f32>, payload: VectorPayload) -> memsys_core::Result<()> {
        if vector.len() != EMBEDDING_DIM {
            return Err(memsys_core::CoreError::Fatal(format!(
                "expected {EMBEDDING_DIM}-dim vector, got {}",
                vector.len()
            )));
        }

        let qdrant_payload = payload_to_qdrant(&payload)?;
        let point = PointStruct::new(point_id.to_string(), vector, qdrant_payload);

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, vec![point]))
            .await
            .map_err(|e| {
                let e = VectorError::Client(e.to_string());
                tracing::warn!(point_id = %point_id, error = %e, "qdrant upsert failed");
                e
            })?;

        tracing::debug!(point_id = %point_id, "qdrant upsert ok");
        Ok(())
    }

    async fn search(
        &self,
        vector: Vec<f32>,
        filter: VectorFilter,
        limit: usize,
    ) -> memsys_core::Result<Vec<VectorSearchHit>> {
        let mut builder = SearchPointsBuilder::new(&self.collection, vector, limit as u64).with_payload(true);
        if let Some(f) = project_filter(filter) {
            builder = builder.filter(f);
        }

        let response = self
            .client
            .search_points(builder)
            .await
            .map_err(|e| {
                let e = VectorError::Client(e.to_string());
                tracing::warn!(error = %e, "qdrant search failed");
                e
            })?;

        let mut hits = Vec::with_capacity(response.result.len());
        for scored in response.result {
            let point_id = match scored.id.and_then(|id| id.point_id_options) {
                Some(qdrant_client::qdrant::point_id::PointIdOptions::Uuid(s)) => s,
                Some(qdrant_client::qdrant::point_id::PointIdOptions::Num(n)) => n.to_string(),
                None => continue,
            };
            let Ok(point_id) = point_id.parse() else {
                continue;
            };
            let Ok(payload) = payload_from_qdrant(scored.payload) else {
                continue;
            };
            hits.push(VectorSearchHit {
                point_id,
                score: scored.score as f64,
                payload,
            });
        }

        Ok(hits)
    }

    async fn set_payload(&self, point_id: Id, patch: serde_json::Value) -> memsys_core::Result<()> {
        let payload = Payload::try_from(patch).map_err(|e| VectorError::InvalidPayload(e.to_string()))?;

        self.client
            .set_payload(
                SetPayloadPointsBuilder::new(&self.collection, payload)
                    .points_selector(vec![qdrant_client::qdrant::PointId::from(point_id.to_string())]),
            )
            .await
            .map_err(|e| VectorError::Client(e.to_string()))?;
        Ok(())
    }

    async fn delete(&self, point_id: Id) -> memsys_core::Result<()> {
        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.collection)
                    .points(vec![qdrant_client::qdrant::PointId::from(point_id.to_string())]),
            )
            .await
            .map_err(|e| VectorError::Client(e.to_string()))?;
        Ok(())
    }

    async fn count(&self, filter: VectorFilter) -> memsys_core::Result<u64> {
        let mut builder = qdrant_client::qdrant::CountPointsBuilder::new(&self.collection);
        if let Some(f) = project_filter(filter) {
            builder = builder.filter(f);
        }

        let response = self
            .client
            .count(builder)
            .await
            .map_err(|e| VectorError::Client(e.to_string()))?;

        Ok(response.result.map(|r| r.count).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_filter_none_when_unset() {
        assert!(project_filter(VectorFilter { project_id: None }).is_none());
    }

    #[test]
    fn test_project_filter_some_when_set() {
        let f = project_filter(VectorFilter {
            project_id: Some("p1".into()),
        });
        assert!(f.is_some());
    }
}
