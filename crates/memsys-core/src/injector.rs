//! C7 Context Injector: applies the injection-mode policy, runs C5 → C6,
//! and merges the fused block into the user's prompt under a token budget.

use crate::error::Result;
use crate::fuser::Fuser;
use crate::model::Id;
use crate::retriever::{Retriever, SearchQuery};
use crate::tokenizer::estimate_tokens;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InjectionMode {
    Minimal,
    Balanced,
    Comprehensive,
}

struct ModePolicy {
    retrieve_limit: usize,
    retrieve_min_score: f64,
    fuse_budget: u32,
}

fn policy_for(mode: InjectionMode) -> ModePolicy {
    match mode {
        InjectionMode::Minimal => ModePolicy {
            retrieve_limit: 3,
            retrieve_min_score: 0.6,
            fuse_budget: 400,
        },
        InjectionMode::Balanced => ModePolicy {
            retrieve_limit: 5,
            retrieve_min_score: 0.4,
            fuse_budget: 1_500,
        },
        InjectionMode::Comprehensive => ModePolicy {
            retrieve_limit: 10,
            retrieve_min_score: 0.2,
            fuse_budget: 4_000,
        },
    }
}

#[derive(Clone, Debug)]
pub struct ContextInjectionRequest {
    pub original_prompt: String,
    pub query_text: Option<String>,
    pub injection_mode: InjectionMode,
    pub max_tokens: u32,
    pub project_id: Option<String>,
}

#[derive(Clone, Debug)]
pub struct InjectedMemory {
    pub id: Id,
    pub title: String,
    pub summary: String,
}

#[derive(Clone, Debug)]
pub struct InjectionResult {
    pub enhanced_prompt: String,
    pub injected_memories: Vec<InjectedMemory>,
    pub tokens_used: u32,
    pub warnings: Vec<String>,
}

pub struct Injector<'a> {
    retriever: &'a Retriever,
    fuser: &'a Fuser,
}

impl<'a> Injector<'a> {
    pub fn new(retriever: &'a Retriever, fuser: &'a Fuser) -> Self {
        Self { retriever, fuser }
    }

    pub async fn inject(&self, request: ContextInjectionRequest) -> Result<InjectionResult> {
        let policy = policy_for(request.injection_mode);
        let query_text = request
            .query_text
            .clone()
            .unwrap_or_else(|| request.original_prompt.clone());

        let query = SearchQuery {
            text: query_text,
            query_type: crate::retriever::QueryType::Hybrid,
            limit: policy.retrieve_limit,
            min_score: policy.retrieve_min_score,
            project_id: request.project_id.clone(),
        };

        // inject_context never fails hard on retrieval failure: fall back to
        // the bare prompt with a warning instead of propagating the error.
        let outcome = match self.retriever.retrieve(query, true).await {
            Ok(outcome) => outcome,
            Err(e) => {
                return Ok(InjectionResult {
                    enhanced_prompt: request.original_prompt.clone(),
                    injected_memories: Vec::new(),
                    tokens_used: estimate_tokens(&request.original_prompt),
                    warnings: vec![format!("retrieval_failed: {e}")],
                });
            }
        };

        let mut warnings = outcome.warnings;

        if outcome.results.is_empty() {
            return Ok(InjectionResult {
                enhanced_prompt: request.original_prompt.clone(),
                injected_memories: Vec::new(),
                tokens_used: estimate_tokens(&request.original_prompt),
                warnings,
            });
        }

        let fusion = self
            .fuser
            .fuse(&outcome.results, &request.original_prompt, policy.fuse_budget)
            .await;

        let mut enhanced_prompt = format!("{}\n\n---\n\n{}", fusion.text, request.original_prompt);
        let mut tokens_used = estimate_tokens(&enhanced_prompt);

        if tokens_used > request.max_tokens {
            let prompt_tokens = estimate_tokens(&request.original_prompt);
            if prompt_tokens >= request.max_tokens {
                warnings.push("max_tokens_too_small".to_string());
                return Ok(InjectionResult {
                    enhanced_prompt: request.original_prompt.clone(),
                    injected_memories: Vec::new(),
                    tokens_used: prompt_tokens,
                    warnings,
                });
            }
            enhanced_prompt = truncate_fused_tail(&fusion.text, &request.original_prompt, request.max_tokens);
            tokens_used = estimate_tokens(&enhanced_prompt);
        }

        let injected_memories = outcome
            .results
            .iter()
            .filter(|r| fusion.source_units.contains(&r.memory_unit.id))
            .map(|r| InjectedMemory {
                id: r.memory_unit.id,
                title: r.memory_unit.title.clone(),
                summary: r.memory_unit.summary.clone(),
            })
            .collect();

        Ok(InjectionResult {
            enhanced_prompt,
            injected_memories,
            tokens_used,
            warnings,
        })
    }
}

/// Truncate the fused block from the tail, preserving whole lines, until the
/// combined estimate fits `max_tokens`.
fn truncate_fused_tail(fused: &str, original_prompt: &str, max_tokens: u32) -> String {
    let lines: Vec<&str> = fused.lines().collect();
    let mut kept = lines.len();

    loop {
        let candidate_fused = lines[..kept].join("\n");
        let candidate = format!("{candidate_fused}\n\n---\n\n{original_prompt}");
        if estimate_tokens(&candidate) <= max_tokens || kept == 0 {
            return candidate;
        }
        kept -= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_minimal() {
        let p = policy_for(InjectionMode::Minimal);
        assert_eq!(p.retrieve_limit, 3);
        assert_eq!(p.fuse_budget, 400);
    }

    #[test]
    fn test_policy_comprehensive() {
        let p = policy_for(InjectionMode::Comprehensive);
        assert_eq!(p.retrieve_limit, 10);
        assert_eq!(p.fuse_budget, 4_000);
    }

    #[test]
    fn test_truncate_fused_tail_preserves_whole_lines() {
        let fused = "line one\nline two\nline three";
        let out = truncate_fused_tail(fused, "prompt", 1_000_000);
        assert!(out.contains("line one"));
        assert!(out.contains("line three"));
    }

    #[test]
    fn test_truncate_fused_tail_drops_from_end() {
        let fused = "a\nb\nc\nd\ne\nf\ng\nh";
        let out = truncate_fused_tail(fused, "prompt text here", 12);
        assert!(out.contains("---"));
        assert!(out.ends_with("prompt text here"));
    }
}
