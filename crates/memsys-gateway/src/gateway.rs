//! C1 Model Gateway: one call surface for embed/rerank/complete across N
//! providers, with per-operation fallback chains, per-(model,provider)
//! retry with jittered exponential backoff, and per-provider concurrency
//! limits.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::Semaphore;

use memsys_core::constants::{RETRY_BASE_MS, RETRY_JITTER_FRACTION, RETRY_MAX_ATTEMPTS};
use memsys_core::traits::{Completer, Embedder, Reranker};

use crate::cost::{CostRecord, CostSink};
use crate::error::GatewayError;
use crate::provider::{ChainEntry, ProviderConfig};

pub struct Gateway {
    providers: HashMap<String, ProviderConfig>,
    semaphores: HashMap<String, Arc<Semaphore>>,
    client: reqwest::Client,
    embed_chain: Vec<ChainEntry>,
    rerank_chain: Vec<ChainEntry>,
    complete_chain: Vec<ChainEntry>,
    cost_sink: CostSink,
}

fn is_retryable_status(status: u16) -> bool {
    status >= 500 || matches!(status, 408 | 425 | 429)
}

fn backoff_delay(attempt: u32) -> Duration {
    let base = RETRY_BASE_MS * 2u64.pow(attempt.saturating_sub(1));
    let jitter_span = (base as f64 * RETRY_JITTER_FRACTION) as i64;
    let jitter = rand::rng().random_range(-jitter_span..=jitter_span);
    Duration::from_millis((base as i64 + jitter).max(0) as u64)
}

impl Gateway {
    pub fn new(
        providers: Vec<ProviderConfig>,
        embed_chain: Vec<ChainEntry>,
        rerank_chain: Vec<ChainEntry>,
        complete_chain: Vec<ChainEntry>,
    ) -> Result<Self, GatewayError> {
        let mut by_name = HashMap::new();
        let mut semaphores = HashMap::new();
        for p in providers {
            semaphores.insert(p.name.clone(), Arc::new(Semaphore::new(p.concurrency_limit.max(1))));
            by_name.insert(p.name.clone(), p);
        }

        for entry in embed_chain.iter().chain(&rerank_chain).chain(&complete_chain) {
            let provider = by_name
                .get(&entry.provider)
                .ok_or_else(|| GatewayError::NotConfigured(format!("provider `{}`", entry.provider)))?;
            if !provider.supports(&entry.model) {
                return Err(GatewayError::NotConfigured(format!(
                    "model `{}` not supported by provider `{}`",
                    entry.model, entry.provider
                )));
            }
        }

        Ok(Self {
            providers: by_name,
            semaphores,
            client: reqwest::Client::new(),
            embed_chain,
            rerank_chain,
            complete_chain,
            cost_sink: CostSink::default(),
        })
    }

    pub fn cost_sink(&self) -> CostSink {
        self.cost_sink.clone()
    }

    fn chain_for_model<'a>(chain: &'a [ChainEntry], model: &str) -> Vec<&'a ChainEntry> {
        let mut matching: Vec<&ChainEntry> = chain.iter().filter(|e| e.model == model).collect();
        if matching.is_empty() {
            matching = chain.iter().collect();
        }
        matching
    }

    async fn acquire(&self, provider: &str) -> Option<tokio::sync::OwnedSemaphorePermit> {
        let sem = self.semaphores.get(provider)?.clone();
        sem.acquire_owned().await.ok()
    }
}

#[async_trait::async_trait]
impl Embedder for Gateway {
    async fn embed(&self, model: &str, texts: &[String]) -> memsys_core::Result<Vec<Vec<f32>>> {
        let chain = Self::chain_for_model(&self.embed_chain, model);
        if chain.is_empty() {
            return Err(GatewayError::NotConfigured(format!("no embedding chain for `{model}`")).into());
        }

        for entry in chain {
            let Some(provider) = self.providers.get(&entry.provider) else {
                continue;
            };

            for attempt in 1..=RETRY_MAX_ATTEMPTS {
                let Some(_permit) = self.acquire(&provider.name).await else {
                    continue;
                };

                let start = std::time::Instant::now();
                let body = serde_json::json!({ "model": entry.model, "input": texts });
                let mut req = self
                    .client
                    .post(format!("{}/embeddings", provider.base_url))
                    .timeout(Duration::from_secs(provider.timeout_secs))
                    .json(&body);
                if let Some(key) = &provider.api_key {
                    req = req.bearer_auth(key);
                }

                match req.send().await {
                    Ok(resp) if resp.status().is_success() => {
                        let latency_ms = start.elapsed().as_millis() as u64;
                        let parsed: serde_json::Value = match resp.json().await {
                            Ok(v) => v,
                            Err(_) => continue,
                        };
                        let Some(data) = parsed.get("data").and_then(|v| v.as_array()) else {
                            continue;
                        };
                        let mut vecs = Vec::with_capacity(data.len());
                        for item in data {
                            let Some(arr) = item.get("embedding").and_then(|v| v.as_array()) else {
                                continue;
                            };
                            vecs.push(arr.iter().filter_map(|v| v.as_f64()).map(|v| v as f32).collect());
                        }
                        if vecs.len() != texts.len() {
                            continue;
                        }

                        let price = provider.price_for(&entry.model);
                        let input_tokens: u32 = texts.iter().map(|t| memsys_core::tokenizer::estimate_tokens(t)).sum();
                        self.cost_sink.record(CostRecord {
                            provider: provider.name.clone(),
                            model: entry.model.clone(),
                            operation: "embed",
                            input_tokens,
                            output_tokens: 0,
                            cost_usd: price.input_per_1k * (input_tokens as f64 / 1000.0),
                            latency_ms,
                            timestamp: memsys_core::time::now_unix_millis(),
                        });

                        return Ok(vecs);
                    }
                    Ok(resp) => {
                        let status = resp.status().as_u16();
                        if !is_retryable_status(status) {
                            tracing::warn!(provider = %provider.name, model = %entry.model, status, "embed: non-retryable status, advancing chain");
                            break;
                        }
                        tracing::debug!(provider = %provider.name, model = %entry.model, status, attempt, "embed: retryable status");
                    }
                    Err(e) => tracing::debug!(provider = %provider.name, model = %entry.model, attempt, error = %e, "embed: request error"),
                }

                if attempt < RETRY_MAX_ATTEMPTS {
                    let delay = backoff_delay(attempt);
                    tracing::debug!(provider = %provider.name, model = %entry.model, attempt, delay_ms = delay.as_millis() as u64, "embed: retrying after backoff");
                    tokio::time::sleep(delay).await;
                }
            }
        }

        tracing::warn!(model, "embed: all providers exhausted");
        Err(GatewayError::AllProvidersExhausted {
            operation: "embed",
            model: model.to_string(),
        }
        .into())
    }
}

#[async_trait::async_trait]
impl Reranker for Gateway {
    async fn rerank(
        &self,
        model: &str,
        query: &str,
        docs: &[String],
        top_k: usize,
    ) -> memsys_core::Result<Vec<(usize, f64)>> {
        let chain = Self::chain_for_model(&self.rerank_chain, model);
        if chain.is_empty() {
            return Err(GatewayError::NotConfigured(format!("no rerank chain for `{model}`")).into());
        }

        for entry in chain {
            let Some(provider) = self.providers.get(&entry.provider) else {
                continue;
            };

            for attempt in 1..=RETRY_MAX_ATTEMPTS {
                let Some(_permit) = self.acquire(&provider.name).await else {
                    continue;
                };

                let start = std::time::Instant::now();
                let body = serde_json::json!({
                    "model": entry.model,
                    "query": query,
                    "documents": docs,
                    "top_n": top_k,
                });
                let mut req = self
                    .client
                    .post(format!("{}/rerank", provider.base_url))
                    .timeout(Duration::from_secs(provider.timeout_secs))
                    .json(&body);
                if let Some(key) = &provider.api_key {
                    req = req.bearer_auth(key);
                }

                match req.send().await {
                    Ok(resp) if resp.status().is_success() => {
                        let latency_ms = start.elapsed().as_millis() as u64;
                        let parsed: serde_json::Value = match resp.json().await {
                            Ok(v) => v,
                            Err(_) => continue,
                        };
                        let Some(results) = parsed.get("results").and_then(|v| v.as_array()) else {
                            continue;
                        };
                        let mut scored = Vec::with_capacity(results.len());
                        for item in results {
                            let Some(idx) = item.get("index").and_then(|v| v.as_u64()) else {
                                continue;
                            };
                            let Some(score) = item.get("relevance_score").and_then(|v| v.as_f64()) else {
                                continue;
                            };
                            scored.push((idx as usize, score));
                        }

                        let price = provider.price_for(&entry.model);
                        let input_tokens = memsys_core::tokenizer::estimate_tokens(query)
                            + docs.iter().map(|d| memsys_core::tokenizer::estimate_tokens(d)).sum::<u32>();
                        self.cost_sink.record(CostRecord {
                            provider: provider.name.clone(),
                            model: entry.model.clone(),
                            operation: "rerank",
                            input_tokens,
                            output_tokens: 0,
                            cost_usd: price.input_per_1k * (input_tokens as f64 / 1000.0),
                            latency_ms,
                            timestamp: memsys_core::time::now_unix_millis(),
                        });

                        return Ok(scored);
                    }
                    Ok(resp) => {
                        let status = resp.status().as_u16();
                        if !is_retryable_status(status) {
                            tracing::warn!(provider = %provider.name, model = %entry.model, status, "rerank: non-retryable status, advancing chain");
                            break;
                        }
                        tracing::debug!(provider = %provider.name, model = %entry.model, status, attempt, "rerank: retryable status");
                    }
                    Err(e) => tracing::debug!(provider = %provider.name, model = %entry.model, attempt, error = %e, "rerank: request error"),
                }

                if attempt < RETRY_MAX_ATTEMPTS {
                    let delay = backoff_delay(attempt);
                    tracing::debug!(provider = %provider.name, model = %entry.model, attempt, delay_ms = delay.as_millis() as u64, "rerank: retrying after backoff");
                    tokio::time::sleep(delay).await;
                }
            }
        }

        tracing::warn!(model, "rerank: all providers exhausted");
        Err(GatewayError::AllProvidersExhausted {
            operation: "rerank",
            model: model.to_string(),
        }
        .into())
    }

    fn is_available(&self) -> bool {
        !self.rerank_chain.is_empty()
    }
}

#[async_trait::async_trait]
impl Completer for Gateway {
    async fn complete(&self, model: &str, prompt: &str, max_tokens: u32) -> memsys_core::Result<String> {
        let chain = Self::chain_for_model(&self.complete_chain, model);
        if chain.is_empty() {
            return Err(GatewayError::NotConfigured(format!("no completion chain for `{model}`")).into());
        }

        for entry in chain {
            let Some(provider) = self.providers.get(&entry.provider) else {
                continue;
            };

            for attempt in 1..=RETRY_MAX_ATTEMPTS {
                let Some(_permit) = self.acquire(&provider.name).await else {
                    continue;
                };

                let start = std::time::Instant::now();
                let body = serde_json::json!({
                    "model": entry.model,
                    "messages": [{"role": "user", "content": prompt}],
                    "max_tokens": max_tokens,
                });
                let mut req = self
                    .client
                    .post(format!("{}/chat/completions", provider.base_url))
                    .timeout(Duration::from_secs(provider.timeout_secs))
                    .json(&body);
                if let Some(key) = &provider.api_key {
                    req = req.bearer_auth(key);
                }

                match req.send().await {
                    Ok(resp) if resp.status().is_success() => {
                        let latency_ms = start.elapsed().as_millis() as u64;
                        let parsed: serde_json::Value = match resp.json().await {
                            Ok(v) => v,
                            Err(_) => continue,
                        };
                        let Some(text) = parsed
                            .get("choices")
                            .and_then(|v| v.as_array())
                            .and_then(|arr| arr.first())
                            .and_then(|c| c.get("message"))
                            .and_then(|m| m.get("content"))
                            .and_then(|v| v.as_str())
                        else {
                            continue;
                        };

                        let price = provider.price_for(&entry.model);
                        let input_tokens = memsys_core::tokenizer::estimate_tokens(prompt);
                        let output_tokens = memsys_core::tokenizer::estimate_tokens(text);
                        self.cost_sink.record(CostRecord {
                            provider: provider.name.clone(),
                            model: entry.model.clone(),
                            operation: "complete",
                            input_tokens,
                            output_tokens,
                            cost_usd: price.input_per_1k * (input_tokens as f64 / 1000.0)
                                + price.output_per_1k * (output_tokens as f64 / 1000.0),
                            latency_ms,
                            timestamp: memsys_core::time::now_unix_millis(),
                        });

                        return Ok(text.to_string());
                    }
                    Ok(resp) => {
                        let status = resp.status().as_u16();
                        if !is_retryable_status(status) {
                            tracing::warn!(provider = %provider.name, model = %entry.model, status, "complete: non-retryable status, advancing chain");
                            break;
                        }
                        tracing::debug!(provider = %provider.name, model = %entry.model, status, attempt, "complete: retryable status");
                    }
                    Err(e) => tracing::debug!(provider = %provider.name, model = %entry.model, attempt, error = %e, "complete: request error"),
                }

                if attempt < RETRY_MAX_ATTEMPTS {
                    let delay = backoff_delay(attempt);
                    tracing::debug!(provider = %provider.name, model = %entry.model, attempt, delay_ms = delay.as_millis() as u64, "complete: retrying after backoff");
                    tokio::time::sleep(delay).await;
                }
            }
        }

        tracing::warn!(model, "complete: all providers exhausted");
        Err(GatewayError::AllProvidersExhausted {
            operation: "complete",
            model: model.to_string(),
        }
        .into())
    }

    fn is_available(&self) -> bool {
        !self.complete_chain.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;

    fn provider(name: &str, models: &[&str]) -> ProviderConfig {
        ProviderConfig {
            name: name.into(),
            base_url: "http://localhost:0".into(),
            api_key: None,
            supported_models: models.iter().map(|m| m.to_string()).collect(),
            prices: Map::new(),
            timeout_secs: 5,
            concurrency_limit: 2,
        }
    }

    #[test]
    fn test_new_rejects_unsupported_model_in_chain() {
        let providers = vec![provider("p1", &["text-embed-a"])];
        let chain = vec![ChainEntry {
            model: "text-embed-b".into(),
            provider: "p1".into(),
        }];
        let result = Gateway::new(providers, chain, Vec::new(), Vec::new());
        assert!(result.is_err());
    }

    #[test]
    fn test_new_accepts_valid_chain() {
        let providers = vec![provider("p1", &["text-embed-a"])];
        let chain = vec![ChainEntry {
            model: "text-embed-a".into(),
            provider: "p1".into(),
        }];
        assert!(Gateway::new(providers, chain, Vec::new(), Vec::new()).is_ok());
    }

    #[test]
    fn test_is_retryable_status() {
        assert!(is_retryable_status(500));
        assert!(is_retryable_status(429));
        assert!(is_retryable_status(408));
        assert!(!is_retryable_status(400));
        assert!(!is_retryable_status(401));
    }

    #[test]
    fn test_backoff_delay_grows_with_attempt() {
        let d1 = backoff_delay(1).as_millis();
        let d3 = backoff_delay(3).as_millis();
        assert!(d3 > d1);
    }

    #[tokio::test]
    async fn test_rerank_unavailable_when_chain_empty() {
        let gw = Gateway::new(vec![provider("p1", &["m"])], Vec::new(), Vec::new(), Vec::new()).unwrap();
        assert!(!Reranker::is_available(&gw));
        assert!(!Completer::is_available(&gw));
    }
}
