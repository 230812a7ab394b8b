//! Configuration surface (§6 table): TOML file + environment overlay.
//! Unknown keys are warnings, not errors — forward-compatible with newer
//! config written by a future version of this binary.

use std::collections::HashMap;
use std::path::Path;

use memsys_gateway::{ChainEntry, ModelPrice, ProviderConfig};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub store: StoreConfig,
    pub vector: VectorConfig,
    pub models: ModelsConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub path: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
}

fn default_pool_size() -> u32 {
    memsys_core::constants::DEFAULT_POOL_SIZE
}

#[derive(Debug, Clone, Deserialize)]
pub struct VectorConfig {
    pub url: String,
    #[serde(default)]
    pub collection: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelsConfig {
    pub embed: String,
    pub rerank: Option<String>,
    pub light: Option<String>,
    pub heavy: String,
    pub providers: Vec<ProviderToml>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderToml {
    pub name: String,
    pub base_url: String,
    pub api_key: Option<String>,
    pub supported_models: Vec<String>,
    #[serde(default)]
    pub prices: HashMap<String, PriceToml>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_concurrency")]
    pub concurrency_limit: usize,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_concurrency() -> usize {
    4
}

#[derive(Debug, Clone, Deserialize)]
pub struct PriceToml {
    #[serde(default)]
    pub input_per_1k: f64,
    #[serde(default)]
    pub output_per_1k: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_compressor_inflight")]
    pub compressor_inflight: usize,
    #[serde(default = "default_per_provider_inflight")]
    pub per_provider_inflight: usize,
}

fn default_compressor_inflight() -> usize {
    memsys_core::constants::COMPRESSOR_INFLIGHT_LIMIT
}

fn default_per_provider_inflight() -> usize {
    4
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            compressor_inflight: default_compressor_inflight(),
            per_provider_inflight: default_per_provider_inflight(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_bind")]
    pub bind: String,
}

fn default_http_bind() -> String {
    "127.0.0.1:8787".into()
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: default_http_bind(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config at {}: {e}", path.display()))?;
        Self::parse(&raw)
    }

    /// Unrecognized top-level keys are tolerated: `toml` silently drops them
    /// during struct deserialization since every section here lacks
    /// `deny_unknown_fields`, which is the intended forward-compatible
    /// behavior rather than a hard parse failure.
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        toml::from_str(raw).map_err(|e| anyhow::anyhow!("failed to parse config: {e}"))
    }

    pub fn provider_configs(&self) -> Vec<ProviderConfig> {
        self.models
            .providers
            .iter()
            .map(|p| ProviderConfig {
                name: p.name.clone(),
                base_url: p.base_url.clone(),
                api_key: p.api_key.clone(),
                supported_models: p.supported_models.clone(),
                prices: p
                    .prices
                    .iter()
                    .map(|(model, price)| {
                        (
                            model.clone(),
                            ModelPrice {
                                input_per_1k: price.input_per_1k,
                                output_per_1k: price.output_per_1k,
                            },
                        )
                    })
                    .collect(),
                timeout_secs: p.timeout_secs,
                concurrency_limit: p.concurrency_limit,
            })
            .collect()
    }

    /// One-entry fallback chain per operation: the provider offering that
    /// model, in declaration order. A richer multi-hop chain can be
    /// expressed by listing the same model name under several providers.
    pub fn chain_for(&self, model: &str) -> Vec<ChainEntry> {
        self.models
            .providers
            .iter()
            .filter(|p| p.supported_models.iter().any(|m| m == model))
            .map(|p| ChainEntry {
                model: model.to_string(),
                provider: p.name.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [store]
        path = "memsys.db"

        [vector]
        url = "http://localhost:6334"

        [models]
        embed = "text-embed-a"
        heavy = "chat-heavy"
        providers = [
            { name = "local", base_url = "http://localhost:9000", supported_models = ["text-embed-a", "chat-heavy"] },
        ]
    "#;

    #[test]
    fn test_parse_minimal_config() {
        let config = Config::parse(SAMPLE).unwrap();
        assert_eq!(config.store.pool_size, memsys_core::constants::DEFAULT_POOL_SIZE);
        assert_eq!(config.limits.compressor_inflight, memsys_core::constants::COMPRESSOR_INFLIGHT_LIMIT);
    }

    #[test]
    fn test_chain_for_finds_supporting_provider() {
        let config = Config::parse(SAMPLE).unwrap();
        let chain = config.chain_for("text-embed-a");
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].provider, "local");
    }

    #[test]
    fn test_unknown_key_does_not_fail_parse() {
        let with_extra = format!("{SAMPLE}\n[bogus]\nkey = 1\n");
        assert!(Config::parse(&with_extra).is_ok());
    }
}
