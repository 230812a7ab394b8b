//! Tunable defaults named after the sections of the design that introduce them.
//! All are overridable through configuration; these are the fallback values.

/// Embedding dimension shared by every vector in the live index.
pub const EMBEDDING_DIM: usize = 4096;

/// C1 retry policy: max attempts per (model, provider) pair.
pub const RETRY_MAX_ATTEMPTS: u32 = 3;

/// C1 retry policy: exponential backoff base, in milliseconds.
pub const RETRY_BASE_MS: u64 = 200;

/// C1 retry policy: jitter applied to each backoff, as a fraction (±20%).
pub const RETRY_JITTER_FRACTION: f64 = 0.2;

/// C4 compressor: conversation token threshold above which truncation kicks in.
pub const COMPRESSOR_TOKEN_THRESHOLD: u32 = 8_000;

/// C4 compressor: max JSON-parse retries with a stricter system prompt.
pub const COMPRESSOR_MAX_RETRIES: u32 = 2;

/// C4 compressor: documentation-unit length threshold, in tokens.
pub const DOCUMENTATION_TOKEN_THRESHOLD: u32 = 400;

/// C4 compressor: keyword cap per memory unit.
pub const MAX_KEYWORDS: usize = 32;

/// C4 compressor: importance assigned to a degraded (parse-failed) unit.
pub const DEGRADED_IMPORTANCE: f64 = 0.3;

/// C4 compressor: title prefix length for a degraded unit, in chars.
pub const DEGRADED_TITLE_CHARS: usize = 40;

/// Backpressure: max in-flight compressor calls before `store_conversation` blocks.
pub const COMPRESSOR_INFLIGHT_LIMIT: usize = 4;

/// C5 retriever: default result limit.
pub const DEFAULT_SEARCH_LIMIT: usize = 5;

/// C5 retriever: default minimum score to keep a result.
pub const DEFAULT_MIN_SCORE: f64 = 0.3;

/// C5 retriever: over-fetch multiplier applied to each leg before rerank.
pub const OVER_FETCH_MULTIPLIER: usize = 4;

/// C5 retriever: query-result cache TTL, in seconds.
pub const CACHE_TTL_SECS: u64 = 60;

/// C5 retriever: rule-based rerank weight on the pre-rerank score.
pub const RULE_RERANK_W_PRE: f64 = 0.6;

/// C5 retriever: rule-based rerank weight on importance.
pub const RULE_RERANK_W_IMPORTANCE: f64 = 0.2;

/// C5 retriever: rule-based rerank weight on recency decay.
pub const RULE_RERANK_W_RECENCY: f64 = 0.2;

/// C5 retriever: recency half-life scale, in days, for `exp(-age_days / SCALE)`.
pub const RECENCY_DECAY_SCALE_DAYS: f64 = 30.0;

/// C5 retriever: merge bonus applied when a unit appears in both legs.
pub const HYBRID_MERGE_BONUS: f64 = 0.1;

/// Max accepted length of an inbound query string; longer is truncated.
pub const MAX_QUERY_CHARS: usize = 4_096;

/// C2 store: default bounded connection pool size.
pub const DEFAULT_POOL_SIZE: u32 = 10;

/// C2 store: FIFO acquisition timeout, in seconds.
pub const POOL_ACQUIRE_TIMEOUT_SECS: u64 = 30;

/// Project tag reserved to mean "shared across all projects".
pub const GLOBAL_PROJECT: &str = "global";

/// Max byte length of a project tag.
pub const MAX_PROJECT_TAG_BYTES: usize = 64;
