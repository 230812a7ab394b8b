//! Provider configuration: name, endpoint, auth, supported models, pricing,
//! timeout, and concurrency limit — per §4.1's provider abstraction.

use std::collections::HashMap;

#[derive(Clone, Debug)]
pub struct ModelPrice {
    pub input_per_1k: f64,
    pub output_per_1k: f64,
}

#[derive(Clone, Debug)]
pub struct ProviderConfig {
    pub name: String,
    pub base_url: String,
    pub api_key: Option<String>,
    pub supported_models: Vec<String>,
    pub prices: HashMap<String, ModelPrice>,
    pub timeout_secs: u64,
    pub concurrency_limit: usize,
}

impl ProviderConfig {
    pub fn supports(&self, model: &str) -> bool {
        self.supported_models.iter().any(|m| m == model)
    }

    pub fn price_for(&self, model: &str) -> ModelPrice {
        self.prices.get(model).cloned().unwrap_or(ModelPrice {
            input_per_1k: 0.0,
            output_per_1k: 0.0,
        })
    }
}

/// One entry in an operation's ordered fallback chain.
#[derive(Clone, Debug)]
pub struct ChainEntry {
    pub model: String,
    pub provider: String,
}
