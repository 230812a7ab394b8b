//! C4 Semantic Compressor: turns a `Conversation` into one or more
//! `MemoryUnit`s via a completion-model prompt, enforcing an output schema.
//!
//! The "dynamic validation of LLM output" design note calls for a schema
//! descriptor, a single validating parser, and a fixed degradation path
//! instead of exception-driven control flow — hence `ParseOutcome` below.

use std::sync::Arc;

use serde::Deserialize;
use uuid::Uuid;

use crate::constants::{
    COMPRESSOR_MAX_RETRIES, COMPRESSOR_TOKEN_THRESHOLD, DEGRADED_IMPORTANCE, DEGRADED_TITLE_CHARS,
    DOCUMENTATION_TOKEN_THRESHOLD, MAX_KEYWORDS,
};
use crate::error::Result;
use crate::model::{Conversation, MemoryUnit, MessageType, UnitType};
use crate::time::now_unix_millis;
use crate::tokenizer::{estimate_tokens, normalize_keywords, tokenize};
use crate::traits::Completer;

/// Strict JSON object the completion model is instructed to return.
#[derive(Debug, Deserialize)]
struct CompressionOutput {
    title: String,
    summary: String,
    #[serde(default)]
    keywords: Vec<String>,
    importance: f64,
    #[serde(default)]
    segments: Option<Vec<SegmentOutput>>,
}

#[derive(Debug, Deserialize)]
struct SegmentOutput {
    title: String,
    summary: String,
    #[serde(default)]
    keywords: Vec<String>,
    importance: f64,
    content: String,
}

/// Tagged result of one parse attempt, per the "avoid exception-driven
/// control flow" design note.
enum ParseOutcome {
    Parsed(CompressionOutput),
    Retry,
}

pub struct Compressor {
    completer: Option<Arc<dyn Completer>>,
    model: String,
}

impl Compressor {
    pub fn new(completer: Option<Arc<dyn Completer>>, model: impl Into<String>) -> Self {
        Self {
            completer,
            model: model.into(),
        }
    }

    /// Compress a conversation into one or more memory units.
    pub async fn compress(&self, conversation: &Conversation) -> Result<Vec<MemoryUnit>> {
        let truncated = truncate_to_budget(conversation, COMPRESSOR_TOKEN_THRESHOLD);

        let Some(completer) = self.completer.as_ref().filter(|c| c.is_available()) else {
            return Ok(vec![degraded_unit(conversation)]);
        };

        let mut system_prompt = build_prompt(&truncated, false);
        for _attempt in 0..=COMPRESSOR_MAX_RETRIES {
            let raw = completer
                .complete(&self.model, &system_prompt, 1_024)
                .await;
            let Ok(raw) = raw else {
                system_prompt = build_prompt(&truncated, true);
                continue;
            };
            match parse_output(&raw) {
                ParseOutcome::Parsed(output) => {
                    return Ok(units_from_output(conversation, output));
                }
                ParseOutcome::Retry => {
                    system_prompt = build_prompt(&truncated, true);
                }
            }
        }

        Ok(vec![degraded_unit(conversation)])
    }
}

fn build_prompt(conversation: &Conversation, strict: bool) -> String {
    let transcript: String = conversation
        .messages
        .iter()
        .map(|m| format!("{:?}: {}\n", m.message_type, m.content))
        .collect();

    let strictness = if strict {
        "Return ONLY a single JSON object, no markdown fences, no prose before or after it."
    } else {
        "Return a single JSON object."
    };

    format!(
        "Summarize the following conversation as a JSON object with fields \
         {{title, summary, keywords[], importance (0..1), segments[]?}}. {strictness}\n\n{transcript}"
    )
}

fn parse_output(raw: &str) -> ParseOutcome {
    let trimmed = raw.trim().trim_start_matches("```json").trim_start_matches("```").trim_end_matches("```");
    match serde_json::from_str::<CompressionOutput>(trimmed.trim()) {
        Ok(output) if !output.title.is_empty() && (0.0..=1.0).contains(&output.importance) => {
            ParseOutcome::Parsed(output)
        }
        _ => ParseOutcome::Retry,
    }
}

fn units_from_output(conversation: &Conversation, output: CompressionOutput) -> Vec<MemoryUnit> {
    let now = now_unix_millis();
    let keywords = normalize_keywords(&output.keywords, MAX_KEYWORDS);
    let content = concat_messages(conversation);
    let unit_type = select_unit_type(conversation);

    let mut units = vec![
        MemoryUnit {
            id: Uuid::new_v4(),
            conversation_id: conversation.id,
            project_id: conversation.project_id.clone(),
            unit_type,
            title: output.title,
            summary: output.summary,
            content: content.clone(),
            keywords,
            relevance_score: output.importance,
            token_count: estimate_tokens(&content),
            created_at: now,
            updated_at: now,
            expires_at: None,
            is_active: true,
            metadata: Default::default(),
        }
        .normalize(),
    ];

    if let Some(segments) = output.segments {
        for seg in segments {
            let seg_keywords = normalize_keywords(&seg.keywords, MAX_KEYWORDS);
            units.push(
                MemoryUnit {
                    id: Uuid::new_v4(),
                    conversation_id: conversation.id,
                    project_id: conversation.project_id.clone(),
                    unit_type: UnitType::Synthetic,
                    title: seg.title,
                    summary: seg.summary,
                    content: seg.content.clone(),
                    keywords: seg_keywords,
                    relevance_score: seg.importance,
                    token_count: estimate_tokens(&seg.content),
                    created_at: now,
                    updated_at: now,
                    expires_at: None,
                    is_active: true,
                    metadata: Default::default(),
                }
                .normalize(),
            );
        }
    }

    units
}

fn degraded_unit(conversation: &Conversation) -> MemoryUnit {
    let now = now_unix_millis();
    let content = concat_messages(conversation);
    let title_source: String = content.chars().take(DEGRADED_TITLE_CHARS).collect();
    MemoryUnit {
        id: Uuid::new_v4(),
        conversation_id: conversation.id,
        project_id: conversation.project_id.clone(),
        unit_type: select_unit_type(conversation),
        title: format!("Conversation {title_source}"),
        summary: content.chars().take(2_000).collect(),
        content: content.clone(),
        keywords: Vec::new(),
        relevance_score: DEGRADED_IMPORTANCE,
        token_count: estimate_tokens(&content),
        created_at: now,
        updated_at: now,
        expires_at: None,
        is_active: true,
        metadata: Default::default(),
    }
    .normalize()
}

fn concat_messages(conversation: &Conversation) -> String {
    conversation
        .messages
        .iter()
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// A human+assistant pair, documentation-length, low question density.
fn select_unit_type(conversation: &Conversation) -> UnitType {
    if conversation.messages.len() != 2 {
        return UnitType::Conversation;
    }
    let human_count = conversation
        .messages
        .iter()
        .filter(|m| m.message_type == MessageType::Human)
        .count();
    let assistant_count = conversation
        .messages
        .iter()
        .filter(|m| m.message_type == MessageType::Assistant)
        .count();
    if human_count != 1 || assistant_count != 1 {
        return UnitType::Conversation;
    }

    let assistant_msg = conversation
        .messages
        .iter()
        .find(|m| m.message_type == MessageType::Assistant)
        .unwrap();
    let tokens = estimate_tokens(&assistant_msg.content);
    if tokens <= DOCUMENTATION_TOKEN_THRESHOLD {
        return UnitType::Conversation;
    }

    let words = tokenize(&assistant_msg.content);
    let question_words = words
        .iter()
        .filter(|w| matches!(w.as_str(), "what" | "why" | "how" | "when" | "where" | "who"))
        .count();
    let question_density = if words.is_empty() {
        0.0
    } else {
        question_words as f64 / words.len() as f64
    };

    if question_density < 0.05 {
        UnitType::Documentation
    } else {
        UnitType::Conversation
    }
}

/// Keep the first `k` and last `m` messages whose combined estimated cost is
/// under `budget`, with a marker message between them.
fn truncate_to_budget(conversation: &Conversation, budget: u32) -> Conversation {
    let total: u32 = conversation.messages.iter().map(|m| m.token_count).sum();
    if total <= budget {
        return conversation.clone();
    }

    let mut kept_front = Vec::new();
    let mut front_cost = 0u32;
    for m in &conversation.messages {
        if front_cost + m.token_count > budget / 2 {
            break;
        }
        front_cost += m.token_count;
        kept_front.push(m.clone());
    }

    let mut kept_back = Vec::new();
    let mut back_cost = 0u32;
    for m in conversation.messages.iter().rev() {
        if front_cost + back_cost + m.token_count > budget {
            break;
        }
        back_cost += m.token_count;
        kept_back.push(m.clone());
    }
    kept_back.reverse();

    let marker = crate::model::Message::new(
        conversation.id,
        MessageType::System,
        "[... conversation truncated to fit token budget ...]",
    );

    let mut messages = kept_front;
    messages.push(marker);
    messages.extend(kept_back);

    let mut truncated = conversation.clone();
    truncated.messages = messages;
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Message;

    fn conv_with(messages: Vec<(MessageType, &str)>) -> Conversation {
        let mut c = Conversation::new("proj");
        for (t, content) in messages {
            c.messages.push(Message::new(c.id, t, content));
        }
        c
    }

    struct NoCompleter;
    #[async_trait::async_trait]
    impl Completer for NoCompleter {
        async fn complete(&self, _model: &str, _prompt: &str, _max_tokens: u32) -> Result<String> {
            unreachable!("should not be called when unavailable")
        }
        fn is_available(&self) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn test_degrades_without_completer() {
        let compressor = Compressor::new(None, "gpt");
        let conv = conv_with(vec![(MessageType::Human, "hello"), (MessageType::Assistant, "hi")]);
        let units = compressor.compress(&conv).await.unwrap();
        assert_eq!(units.len(), 1);
        assert!(units[0].title.starts_with("Conversation "));
        assert_eq!(units[0].relevance_score, DEGRADED_IMPORTANCE);
        assert!(units[0].keywords.is_empty());
    }

    #[tokio::test]
    async fn test_degrades_when_completer_unavailable() {
        let compressor = Compressor::new(Some(Arc::new(NoCompleter)), "gpt");
        let conv = conv_with(vec![(MessageType::Human, "hello")]);
        let units = compressor.compress(&conv).await.unwrap();
        assert_eq!(units.len(), 1);
    }

    #[test]
    fn test_select_unit_type_conversation_default() {
        let conv = conv_with(vec![
            (MessageType::Human, "hi"),
            (MessageType::Assistant, "hello"),
            (MessageType::Human, "bye"),
        ]);
        assert_eq!(select_unit_type(&conv), UnitType::Conversation);
    }

    #[test]
    fn test_select_unit_type_documentation() {
        let long_answer = "This is a long documentation style answer. ".repeat(40);
        let conv = conv_with(vec![
            (MessageType::Human, "explain rust ownership"),
            (MessageType::Assistant, long_answer.as_str()),
        ]);
        assert_eq!(select_unit_type(&conv), UnitType::Documentation);
    }

    #[test]
    fn test_truncate_to_budget_keeps_front_and_back() {
        let mut conv = Conversation::new("proj");
        for i in 0..50 {
            conv.messages.push(Message::new(
                conv.id,
                MessageType::Human,
                format!("message number {i} with some padding text to cost tokens"),
            ));
        }
        let truncated = truncate_to_budget(&conv, 100);
        assert!(truncated.messages.len() < conv.messages.len());
        assert!(
            truncated
                .messages
                .iter()
                .any(|m| m.message_type == MessageType::System)
        );
    }

    #[test]
    fn test_truncate_noop_under_budget() {
        let conv = conv_with(vec![(MessageType::Human, "short")]);
        let truncated = truncate_to_budget(&conv, 8_000);
        assert_eq!(truncated.messages.len(), conv.messages.len());
    }

    #[test]
    fn test_parse_output_rejects_missing_title() {
        let outcome = parse_output(r#"{"title":"","summary":"s","importance":0.5}"#);
        assert!(matches!(outcome, ParseOutcome::Retry));
    }

    #[test]
    fn test_parse_output_accepts_valid_json() {
        let outcome = parse_output(
            r#"{"title":"t","summary":"s","keywords":["a"],"importance":0.5}"#,
        );
        assert!(matches!(outcome, ParseOutcome::Parsed(_)));
    }

    #[test]
    fn test_parse_output_strips_markdown_fence() {
        let outcome = parse_output(
            "```json\n{\"title\":\"t\",\"summary\":\"s\",\"importance\":0.2}\n```",
        );
        assert!(matches!(outcome, ParseOutcome::Parsed(_)));
    }
}
