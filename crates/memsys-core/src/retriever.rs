//! C5 Semantic Retriever: embed → dense search → keyword search → merge →
//! AI rerank → degrade to rule-based rerank on failure.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{Mutex, OnceCell};

use crate::constants::{
    CACHE_TTL_SECS, DEFAULT_MIN_SCORE, DEFAULT_SEARCH_LIMIT, HYBRID_MERGE_BONUS, MAX_QUERY_CHARS,
    OVER_FETCH_MULTIPLIER, RECENCY_DECAY_SCALE_DAYS, RULE_RERANK_W_IMPORTANCE,
    RULE_RERANK_W_PRE, RULE_RERANK_W_RECENCY,
};
use crate::error::{CoreError, Result};
use crate::model::{MatchType, SearchResult};
use crate::time::{now_unix_millis, Clock};
use crate::tokenizer::tokenize;
use crate::traits::{Embedder, Reranker, Store, VectorFilter, VectorIndex};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueryType {
    Semantic,
    Keyword,
    Hybrid,
}

#[derive(Clone, Debug)]
pub struct SearchQuery {
    pub text: String,
    pub query_type: QueryType,
    pub limit: usize,
    pub min_score: f64,
    pub project_id: Option<String>,
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            text: String::new(),
            query_type: QueryType::Hybrid,
            limit: DEFAULT_SEARCH_LIMIT,
            min_score: DEFAULT_MIN_SCORE,
            project_id: None,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Timings {
    pub embed_ms: u64,
    pub vector_ms: u64,
    pub keyword_ms: u64,
    pub rerank_ms: u64,
    pub total_ms: u64,
}

#[derive(Clone, Debug)]
pub struct RetrievalOutcome {
    pub results: Vec<SearchResult>,
    pub timings: Timings,
    pub warnings: Vec<String>,
}

#[derive(Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    project_id: Option<String>,
    text: String,
    limit: usize,
    min_score_bits: u64,
}

struct CachedEntry {
    created_at: Instant,
    outcome: std::result::Result<RetrievalOutcome, String>,
}

pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    reranker: Arc<dyn Reranker>,
    store: Arc<dyn Store>,
    vector_index: Arc<dyn VectorIndex>,
    embed_model: String,
    rerank_model: String,
    cache_enabled: bool,
    inflight: Mutex<HashMap<CacheKey, Arc<OnceCell<CachedEntry>>>>,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        reranker: Arc<dyn Reranker>,
        store: Arc<dyn Store>,
        vector_index: Arc<dyn VectorIndex>,
        embed_model: impl Into<String>,
        rerank_model: impl Into<String>,
        cache_enabled: bool,
    ) -> Self {
        Self {
            embedder,
            reranker,
            store,
            vector_index,
            embed_model: embed_model.into(),
            rerank_model: rerank_model.into(),
            cache_enabled,
            inflight: Mutex::new(HashMap::new()),
        }
    }

    pub async fn retrieve(&self, mut query: SearchQuery, rerank: bool) -> Result<RetrievalOutcome> {
        let total_clock = Clock::start();
        let mut warnings = Vec::new();

        if query.text.chars().count() > MAX_QUERY_CHARS {
            query.text = query.text.chars().take(MAX_QUERY_CHARS).collect();
            warnings.push("query_truncated".to_string());
        }

        if query.limit == 0 {
            return Ok(RetrievalOutcome {
                results: Vec::new(),
                timings: Timings::default(),
                warnings,
            });
        }

        let key = CacheKey {
            project_id: query.project_id.clone(),
            text: query.text.clone(),
            limit: query.limit,
            min_score_bits: query.min_score.to_bits(),
        };

        if !self.cache_enabled {
            let mut outcome = self.compute(&query, rerank).await?;
            outcome.warnings.extend(warnings);
            outcome.timings.total_ms = total_clock.elapsed_ms();
            return Ok(outcome);
        }

        let cell = {
            let mut map = self.inflight.lock().await;
            map.entry(key.clone()).or_insert_with(|| Arc::new(OnceCell::new())).clone()
        };

        let entry = cell
            .get_or_init(|| async {
                let result = self.compute(&query, rerank).await;
                CachedEntry {
                    created_at: Instant::now(),
                    outcome: result.map_err(|e| e.to_string()),
                }
            })
            .await;

        // Stale entries are evicted lazily: the next caller for this key
        // recomputes once the TTL has elapsed.
        if entry.created_at.elapsed().as_secs() >= CACHE_TTL_SECS {
            let mut map = self.inflight.lock().await;
            map.remove(&key);
        }

        match &entry.outcome {
            Ok(outcome) => {
                let mut outcome = outcome.clone();
                outcome.warnings.extend(warnings);
                Ok(outcome)
            }
            Err(msg) => Err(CoreError::TransientExternal(msg.clone())),
        }
    }

    /// Invalidate every cached entry for a project. Called by the
    /// orchestrator after any write through C2/C3 touching that project.
    pub async fn invalidate_project(&self, project_id: &str) {
        let mut map = self.inflight.lock().await;
        map.retain(|k, _| k.project_id.as_deref() != Some(project_id));
    }

    async fn compute(&self, query: &SearchQuery, rerank: bool) -> Result<RetrievalOutcome> {
        let mut warnings = Vec::new();
        let mut timings = Timings::default();
        let over_fetch = query.limit * OVER_FETCH_MULTIPLIER;

        let mut candidates: HashMap<uuid::Uuid, SearchResult> = HashMap::new();

        let semantic_allowed = query.query_type != QueryType::Keyword;
        let keyword_allowed = query.query_type != QueryType::Semantic;

        let mut embedding = None;
        if semantic_allowed {
            let clock = Clock::start();
            match self.embedder.embed(&self.embed_model, &[query.text.clone()]).await {
                Ok(mut vecs) if !vecs.is_empty() => embedding = Some(vecs.remove(0)),
                Ok(_) | Err(_) => {
                    if query.query_type == QueryType::Semantic {
                        return Err(CoreError::TransientExternal("embedding failed".into()));
                    }
                    warnings.push("semantic_leg_unavailable".to_string());
                }
            }
            timings.embed_ms = clock.elapsed_ms();
        }

        if let Some(vector) = embedding {
            let clock = Clock::start();
            let filter = VectorFilter {
                project_id: query.project_id.clone(),
            };
            if let Ok(hits) = self.vector_index.search(vector, filter, over_fetch).await {
                for hit in hits {
                    candidates
                        .entry(hit.payload.memory_unit_id)
                        .and_modify(|r| merge_into(r, hit.score, MatchType::Semantic))
                        .or_insert_with(|| placeholder_result(&hit.payload, hit.score, MatchType::Semantic));
                }
            }
            timings.vector_ms = clock.elapsed_ms();
        }

        if keyword_allowed {
            let clock = Clock::start();
            let tokens = tokenize(&query.text);
            if !tokens.is_empty() {
                let unit_query = crate::traits::UnitQuery {
                    project_id: query.project_id.clone(),
                    conversation_id: None,
                    is_active: Some(true),
                    keyword_tokens: Some(tokens.clone()),
                };
                if let Ok(units) = self.store.query_units(unit_query).await {
                    for unit in units.into_iter().take(over_fetch) {
                        let matched: Vec<String> = tokens
                            .iter()
                            .filter(|t| {
                                let haystack = format!(
                                    "{} {} {}",
                                    unit.title.to_lowercase(),
                                    unit.summary.to_lowercase(),
                                    unit.content.to_lowercase()
                                );
                                haystack.contains(t.as_str())
                            })
                            .cloned()
                            .collect();
                        let score = matched.len() as f64 / tokens.len() as f64;
                        candidates
                            .entry(unit.id)
                            .and_modify(|r| {
                                merge_into(r, score, MatchType::Keyword);
                                r.matched_keywords = matched.clone();
                            })
                            .or_insert_with(|| {
                                let mut r = result_from_unit(unit.clone(), score, MatchType::Keyword);
                                r.matched_keywords = matched.clone();
                                r
                            });
                    }
                }
            }
            timings.keyword_ms = clock.elapsed_ms();
        }

        let mut results: Vec<SearchResult> = candidates.into_values().collect();

        let reranked = rerank
            && results.len() >= 2
            && self.reranker.is_available();

        if reranked {
            let clock = Clock::start();
            let docs: Vec<String> = results.iter().map(|r| r.memory_unit.summary.clone()).collect();
            match self
                .reranker
                .rerank(&self.rerank_model, &query.text, &docs, query.limit)
                .await
            {
                Ok(scored) => {
                    for (idx, score) in &scored {
                        if let Some(r) = results.get_mut(*idx) {
                            r.rerank_score = Some(*score);
                            r.relevance_score = *score;
                        }
                    }
                    results.sort_by(|a, b| {
                        b.relevance_score
                            .partial_cmp(&a.relevance_score)
                            .unwrap_or(std::cmp::Ordering::Equal)
                            .then_with(|| b.memory_unit.created_at.cmp(&a.memory_unit.created_at))
                    });
                }
                Err(_) => {
                    warnings.push("rerank_degraded".to_string());
                    rule_based_sort(&mut results);
                }
            }
            timings.rerank_ms = clock.elapsed_ms();
        } else {
            if rerank && !self.reranker.is_available() {
                warnings.push("rerank_degraded".to_string());
            }
            rule_based_sort(&mut results);
        }

        results.retain(|r| r.relevance_score >= query.min_score);
        results.truncate(query.limit);

        Ok(RetrievalOutcome {
            results,
            timings,
            warnings,
        })
    }
}

fn merge_into(existing: &mut SearchResult, other_score: f64, other_type: MatchType) {
    if existing.match_type != other_type {
        existing.relevance_score = (existing.relevance_score.max(other_score) + HYBRID_MERGE_BONUS).min(1.0);
        existing.match_type = MatchType::Hybrid;
    } else {
        existing.relevance_score = existing.relevance_score.max(other_score);
    }
}

fn placeholder_result(payload: &crate::traits::VectorPayload, score: f64, match_type: MatchType) -> SearchResult {
    let unit_type = match payload.unit_type.as_str() {
        "documentation" => crate::model::UnitType::Documentation,
        "archive" => crate::model::UnitType::Archive,
        "synthetic" => crate::model::UnitType::Synthetic,
        _ => crate::model::UnitType::Conversation,
    };
    SearchResult {
        memory_unit: crate::model::MemoryUnit {
            id: payload.memory_unit_id,
            conversation_id: payload.memory_unit_id,
            project_id: payload.project_id.clone(),
            unit_type,
            title: payload.title.clone(),
            summary: payload.summary.clone(),
            content: String::new(),
            keywords: payload.keywords.clone(),
            relevance_score: payload.relevance_score,
            token_count: 0,
            created_at: payload.created_at,
            updated_at: payload.created_at,
            expires_at: None,
            is_active: true,
            metadata: Default::default(),
        },
        relevance_score: score,
        rerank_score: None,
        match_type,
        matched_keywords: Vec::new(),
        metadata: Default::default(),
    }
}

fn result_from_unit(unit: crate::model::MemoryUnit, score: f64, match_type: MatchType) -> SearchResult {
    SearchResult {
        memory_unit: unit,
        relevance_score: score,
        rerank_score: None,
        match_type,
        matched_keywords: Vec::new(),
        metadata: Default::default(),
    }
}

fn recency_decay(age_days: f64) -> f64 {
    (-age_days / RECENCY_DECAY_SCALE_DAYS).exp()
}

fn rule_based_sort(results: &mut [SearchResult]) {
    let now = now_unix_millis();
    let scored: Vec<(usize, f64)> = results
        .iter()
        .enumerate()
        .map(|(i, r)| {
            let age_days = (now.saturating_sub(r.memory_unit.created_at)) as f64 / 86_400_000.0;
            let score = RULE_RERANK_W_PRE * r.relevance_score
                + RULE_RERANK_W_IMPORTANCE * r.memory_unit.relevance_score
                + RULE_RERANK_W_RECENCY * recency_decay(age_days);
            (i, score)
        })
        .collect();

    let mut order: Vec<usize> = (0..results.len()).collect();
    order.sort_by(|&a, &b| {
        scored[b]
            .1
            .partial_cmp(&scored[a].1)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let reordered: Vec<SearchResult> = order.iter().map(|&i| results[i].clone()).collect();
    for (i, mut r) in reordered.into_iter().enumerate() {
        r.relevance_score = scored[order[i]].1;
        results[i] = r;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recency_decay_bounds() {
        assert!((recency_decay(0.0) - 1.0).abs() < 1e-9);
        assert!(recency_decay(30.0) < recency_decay(0.0));
        assert!(recency_decay(1000.0) < 0.01);
    }

    #[test]
    fn test_merge_into_marks_hybrid() {
        let payload = crate::traits::VectorPayload {
            memory_unit_id: uuid::Uuid::new_v4(),
            project_id: "p".into(),
            unit_type: "conversation".into(),
            title: "t".into(),
            summary: "s".into(),
            keywords: vec![],
            created_at: 0,
            relevance_score: 0.5,
        };
        let mut r = placeholder_result(&payload, 0.6, MatchType::Semantic);
        merge_into(&mut r, 0.8, MatchType::Keyword);
        assert_eq!(r.match_type, MatchType::Hybrid);
        assert!((r.relevance_score - 0.9).abs() < 1e-9);
        assert!(r.relevance_score <= 1.0);
    }

    #[test]
    fn test_merge_into_clips_at_one() {
        let payload = crate::traits::VectorPayload {
            memory_unit_id: uuid::Uuid::new_v4(),
            project_id: "p".into(),
            unit_type: "conversation".into(),
            title: "t".into(),
            summary: "s".into(),
            keywords: vec![],
            created_at: 0,
            relevance_score: 0.5,
        };
        let mut r = placeholder_result(&payload, 0.95, MatchType::Semantic);
        merge_into(&mut r, 0.95, MatchType::Keyword);
        assert_eq!(r.relevance_score, 1.0);
    }
}
