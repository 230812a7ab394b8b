//! JSON-RPC-over-stdio transport (§6): exposes the orchestrator's four
//! coarse operations as MCP tools, mirrored in style on the teacher's
//! `tool_router`/`tool_handler` server.

use std::sync::Arc;

use memsys_core::injector::{ContextInjectionRequest, InjectionMode};
use memsys_core::model::Conversation;
use memsys_core::orchestrator::Orchestrator;
use memsys_core::retriever::{QueryType, SearchQuery};
use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::*;
use rmcp::{tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler};
use schemars::JsonSchema;
use serde::Deserialize;

#[derive(Clone)]
pub struct MemoryServer {
    orchestrator: Arc<Orchestrator>,
    tool_router: ToolRouter<Self>,
}

impl MemoryServer {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            orchestrator,
            tool_router: Self::tool_router(),
        }
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct StoreConversationRequest {
    /// Full conversation JSON, matching the persisted `Conversation` shape.
    conversation: serde_json::Value,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct SearchRequest {
    /// The text to search memories with.
    query: String,
    /// Optional project scope. Omit to search across all projects.
    project_id: Option<String>,
    /// Max results to return.
    limit: Option<usize>,
    /// Minimum relevance score to keep a result.
    min_score: Option<f64>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct InjectRequest {
    /// The prompt about to be sent to the assistant.
    prompt: String,
    /// Optional query text if different from the prompt itself.
    query_text: Option<String>,
    /// "minimal" | "balanced" | "comprehensive". Defaults to "balanced".
    mode: Option<String>,
    /// Hard cap on tokens added to the prompt.
    max_tokens: Option<u32>,
    /// Optional project scope.
    project_id: Option<String>,
}

fn parse_mode(mode: Option<&str>) -> InjectionMode {
    match mode {
        Some("minimal") => InjectionMode::Minimal,
        Some("comprehensive") => InjectionMode::Comprehensive,
        _ => InjectionMode::Balanced,
    }
}

#[tool_router]
impl MemoryServer {
    #[tool(
        description = "Store a conversation: compresses it into memory units, persists them, and embeds/indexes the active ones. Idempotent on the conversation id."
    )]
    async fn memory_store(
        &self,
        Parameters(req): Parameters<StoreConversationRequest>,
    ) -> Result<CallToolResult, McpError> {
        let conversation: Conversation = serde_json::from_value(req.conversation)
            .map_err(|e| McpError::invalid_params(format!("bad conversation: {e}"), None))?;

        let result = self
            .orchestrator
            .store_conversation(conversation)
            .await
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;

        let json = serde_json::json!({
            "memory_unit_ids": result.memory_unit_ids,
            "warnings": result.warnings,
        });
        Ok(CallToolResult::success(vec![Content::text(
            serde_json::to_string_pretty(&json).unwrap_or_default(),
        )]))
    }

    #[tool(description = "Hybrid search over stored memories: dense vector search union keyword search, AI reranked with a rule-based fallback.")]
    async fn memory_search(
        &self,
        Parameters(req): Parameters<SearchRequest>,
    ) -> Result<CallToolResult, McpError> {
        let query = SearchQuery {
            text: req.query,
            query_type: QueryType::Hybrid,
            limit: req.limit.unwrap_or(memsys_core::constants::DEFAULT_SEARCH_LIMIT),
            min_score: req.min_score.unwrap_or(memsys_core::constants::DEFAULT_MIN_SCORE),
            project_id: req.project_id,
        };

        let outcome = self
            .orchestrator
            .search_memories(query)
            .await
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;

        let json = serde_json::json!({
            "results": outcome.results,
            "warnings": outcome.warnings,
            "timings": {
                "embed_ms": outcome.timings.embed_ms,
                "vector_ms": outcome.timings.vector_ms,
                "keyword_ms": outcome.timings.keyword_ms,
                "rerank_ms": outcome.timings.rerank_ms,
                "total_ms": outcome.timings.total_ms,
            },
        });
        Ok(CallToolResult::success(vec![Content::text(
            serde_json::to_string_pretty(&json).unwrap_or_default(),
        )]))
    }

    #[tool(
        description = "Silently enrich an outgoing prompt with the most relevant prior memories, under a token budget. Never fails hard: on retrieval trouble it returns the original prompt plus a warning."
    )]
    async fn memory_inject(
        &self,
        Parameters(req): Parameters<InjectRequest>,
    ) -> Result<CallToolResult, McpError> {
        let request = ContextInjectionRequest {
            original_prompt: req.prompt,
            query_text: req.query_text,
            injection_mode: parse_mode(req.mode.as_deref()),
            max_tokens: req.max_tokens.unwrap_or(4_000),
            project_id: req.project_id,
        };

        let result = self
            .orchestrator
            .inject_context(request)
            .await
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;

        let json = serde_json::json!({
            "enhanced_prompt": result.enhanced_prompt,
            "injected_memories": result.injected_memories.iter().map(|m| serde_json::json!({
                "id": m.id,
                "title": m.title,
                "summary": m.summary,
            })).collect::<Vec<_>>(),
            "tokens_used": result.tokens_used,
            "warnings": result.warnings,
        });
        Ok(CallToolResult::success(vec![Content::text(
            serde_json::to_string_pretty(&json).unwrap_or_default(),
        )]))
    }

    #[tool(description = "Report component health and lifetime counters.")]
    async fn memory_status(&self) -> Result<CallToolResult, McpError> {
        let status = self.orchestrator.status().await;
        let json = serde_json::json!({
            "uptime_s": status.uptime_s,
            "conversations_processed": status.conversations_processed,
            "memories_created": status.memories_created,
            "searches": status.searches,
            "injections": status.injections,
            "component_health": status.component_health.iter().map(|(k, v)| {
                (k.clone(), serde_json::json!({
                    "state": format!("{:?}", v.state).to_lowercase(),
                    "detail": v.detail,
                }))
            }).collect::<std::collections::HashMap<_, _>>(),
        });
        Ok(CallToolResult::success(vec![Content::text(
            serde_json::to_string_pretty(&json).unwrap_or_default(),
        )]))
    }

    #[tool(description = "Run the background orphan sweep once: re-embeds and re-indexes any active memory unit missing its vector.")]
    async fn memory_sweep_orphans(&self) -> Result<CallToolResult, McpError> {
        let fixed = self
            .orchestrator
            .sweep_orphans()
            .await
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;
        Ok(CallToolResult::success(vec![Content::text(format!(
            "{{\"fixed\": {fixed}}}"
        ))]))
    }
}

#[tool_handler]
impl ServerHandler for MemoryServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "This server gives you persistent long-term memory across conversations.\n\n\
                 - Call `memory_inject` before responding to enrich the prompt with relevant prior \
                   context. Use the result silently; don't announce that you searched memory.\n\
                 - Call `memory_store` at the end of a conversation (or periodically during a long \
                   one) to persist it — it will be compressed, embedded, and indexed.\n\
                 - `memory_search` is available for direct, explicit lookups.\n\
                 - `memory_status` and `memory_sweep_orphans` are operational tools, not part of \
                   the normal conversational flow."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}
