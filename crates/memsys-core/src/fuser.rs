//! C6 Memory Fuser: condenses ranked memory units into a single token-budgeted
//! prose block. Never hallucinates unit ids — `source_units` is exactly the
//! prefix of input units actually consumed.

use std::sync::Arc;

use crate::model::{Id, SearchResult};
use crate::tokenizer::estimate_tokens;
use crate::traits::Completer;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FusionMode {
    Direct,
    Llm,
}

#[derive(Clone, Debug)]
pub struct FusionResult {
    pub text: String,
    pub source_units: Vec<Id>,
}

pub struct Fuser {
    completer: Option<Arc<dyn Completer>>,
    completion_model: String,
}

impl Fuser {
    pub fn new(completer: Option<Arc<dyn Completer>>, completion_model: impl Into<String>) -> Self {
        Self {
            completer,
            completion_model: completion_model.into(),
        }
    }

    pub async fn fuse(&self, units: &[SearchResult], query: &str, budget: u32) -> FusionResult {
        if units.is_empty() {
            return FusionResult {
                text: String::new(),
                source_units: Vec::new(),
            };
        }

        if let Some(completer) = self.completer.as_ref().filter(|c| c.is_available()) {
            let prompt = build_llm_prompt(units, query, budget);
            if let Ok(text) = completer.complete(&self.completion_model, &prompt, budget).await {
                if !text.trim().is_empty() {
                    return FusionResult {
                        text,
                        source_units: units.iter().map(|u| u.memory_unit.id).collect(),
                    };
                }
            }
        }

        direct_fuse(units, budget)
    }
}

fn direct_fuse(units: &[SearchResult], budget: u32) -> FusionResult {
    let mut text = String::new();
    let mut source_units = Vec::new();
    let mut running_tokens = 0u32;

    for (i, unit) in units.iter().enumerate() {
        let line = format!("[{}] {} — {}", i + 1, unit.memory_unit.title, unit.memory_unit.summary);
        let candidate_tokens = estimate_tokens(&line);
        if running_tokens + candidate_tokens > budget {
            break;
        }
        if !text.is_empty() {
            text.push_str("\n\n");
        }
        text.push_str(&line);
        running_tokens += candidate_tokens;
        source_units.push(unit.memory_unit.id);
    }

    FusionResult { text, source_units }
}

fn build_llm_prompt(units: &[SearchResult], query: &str, budget: u32) -> String {
    let memories: String = units
        .iter()
        .enumerate()
        .map(|(i, u)| format!("[{}] {}: {}\n", i + 1, u.memory_unit.title, u.memory_unit.summary))
        .collect();
    format!(
        "Given query {query:?} and the following memories:\n{memories}\n\
         Produce a concise briefing under {budget} tokens that synthesizes only what's relevant."
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MatchType, MemoryUnit, UnitType};
    use uuid::Uuid;

    fn unit(title: &str, summary: &str) -> SearchResult {
        SearchResult {
            memory_unit: MemoryUnit {
                id: Uuid::new_v4(),
                conversation_id: Uuid::new_v4(),
                project_id: "p".into(),
                unit_type: UnitType::Conversation,
                title: title.into(),
                summary: summary.into(),
                content: String::new(),
                keywords: vec![],
                relevance_score: 0.8,
                token_count: 10,
                created_at: 0,
                updated_at: 0,
                expires_at: None,
                is_active: true,
                metadata: Default::default(),
            },
            relevance_score: 0.8,
            rerank_score: None,
            match_type: MatchType::Semantic,
            matched_keywords: vec![],
            metadata: Default::default(),
        }
    }

    #[tokio::test]
    async fn test_direct_fuse_empty_units() {
        let fuser = Fuser::new(None, "model");
        let result = fuser.fuse(&[], "q", 100).await;
        assert!(result.text.is_empty());
        assert!(result.source_units.is_empty());
    }

    #[tokio::test]
    async fn test_direct_fuse_stops_at_budget() {
        let fuser = Fuser::new(None, "model");
        let units = vec![
            unit("Title One", "A reasonably long summary sentence here."),
            unit("Title Two", "Another reasonably long summary sentence here."),
            unit("Title Three", "Yet another reasonably long summary sentence here."),
        ];
        let result = fuser.fuse(&units, "q", 12).await;
        assert!(result.source_units.len() < units.len());
        assert_eq!(result.source_units, units[..result.source_units.len()].iter().map(|u| u.memory_unit.id).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_direct_fuse_never_hallucinates_ids() {
        let fuser = Fuser::new(None, "model");
        let units = vec![unit("A", "summary a"), unit("B", "summary b")];
        let result = fuser.fuse(&units, "q", 1000).await;
        for id in &result.source_units {
            assert!(units.iter().any(|u| u.memory_unit.id == *id));
        }
    }
}
