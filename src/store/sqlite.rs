//! SQLite 文档存储
//!
//! 每个集合一张表，行内保存 JSON 文档和带索引的排序键

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::Connection;

use super::DocumentStore;
use super::model::{BenchmarkRecord, ConversationRecord};

/// 集合名只允许字母、数字和下划线，且不能以数字开头
fn validate_collection_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        anyhow::bail!("无效的集合名: {:?}", name);
    }
    Ok(())
}

/// 底层 SQLite 存储（同步）
struct SqliteDocuments {
    conn: Mutex<Connection>,
    conversations: String,
    benchmarks: String,
}

impl SqliteDocuments {
    fn open(uri: &str, conversations: &str, benchmarks: &str) -> Result<Self> {
        validate_collection_name(conversations)?;
        validate_collection_name(benchmarks)?;
        if conversations == benchmarks {
            anyhow::bail!("对话集合与基准测试集合不能同名: {}", conversations);
        }

        let conn = if uri == ":memory:" {
            Connection::open_in_memory()?
        } else {
            Connection::open(uri).with_context(|| format!("打开数据库失败: {}", uri))?
        };

        for table in [conversations, benchmarks] {
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    sort_key TEXT NOT NULL,
                    document TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_{table}_sort_key ON {table}(sort_key);"
            ))?;
        }

        Ok(Self {
            conn: Mutex::new(conn),
            conversations: conversations.to_string(),
            benchmarks: benchmarks.to_string(),
        })
    }

    fn insert_many(&self, table: &str, documents: &[(String, String)]) -> Result<usize> {
        let conn = self.conn.lock();
        let tx = conn.unchecked_transaction()?;
        {
            let mut stmt =
                tx.prepare(&format!("INSERT INTO {table} (sort_key, document) VALUES (?1, ?2)"))?;
            for (sort_key, document) in documents {
                stmt.execute(rusqlite::params![sort_key, document])?;
            }
        }
        tx.commit()?;
        Ok(documents.len())
    }

    /// 按排序键倒序取最近 `limit` 条文档
    fn find_recent(&self, table: &str, limit: u32) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT document FROM {table} ORDER BY sort_key DESC, id DESC LIMIT ?1"
        ))?;
        let documents = stmt
            .query_map([limit as i64], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(documents)
    }

    fn delete_all(&self, table: &str) -> Result<u64> {
        let conn = self.conn.lock();
        let count = conn.execute(&format!("DELETE FROM {table}"), [])?;
        Ok(count as u64)
    }
}

fn decode_all<T: serde::de::DeserializeOwned>(documents: Vec<String>) -> Result<Vec<T>> {
    documents
        .iter()
        .map(|doc| serde_json::from_str(doc).context("解析存储文档失败"))
        .collect()
}

/// 异步 SQLite 文档存储（公开 API）
#[derive(Clone)]
pub struct SqliteStore {
    inner: Arc<SqliteDocuments>,
}

impl SqliteStore {
    pub fn open(uri: &str, conversations: &str, benchmarks: &str) -> Result<Self> {
        let inner = SqliteDocuments::open(uri, conversations, benchmarks)?;
        tracing::info!(
            uri = %uri,
            conversations = %conversations,
            benchmarks = %benchmarks,
            "文档存储已打开"
        );
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    pub fn in_memory() -> Result<Self> {
        Self::open(":memory:", "remote_messages", "benchmarks")
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&SqliteDocuments) -> Result<T> + Send + 'static,
    {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || f(inner.as_ref())).await?
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn insert_conversation(&self, record: ConversationRecord) -> Result<()> {
        let document = serde_json::to_string(&record)?;
        let sort_key = record.sort_key();
        self.blocking(move |db| {
            db.insert_many(&db.conversations, &[(sort_key, document)])
                .map(|_| ())
        })
        .await
    }

    async fn recent_conversations(&self, limit: u32) -> Result<Vec<ConversationRecord>> {
        let documents = self
            .blocking(move |db| db.find_recent(&db.conversations, limit))
            .await?;
        decode_all(documents)
    }

    async fn clear_conversations(&self) -> Result<u64> {
        self.blocking(|db| db.delete_all(&db.conversations)).await
    }

    async fn insert_benchmarks(&self, records: Vec<BenchmarkRecord>) -> Result<usize> {
        let documents = records
            .iter()
            .map(|r| -> Result<(String, String)> { Ok((r.sort_key(), serde_json::to_string(r)?)) })
            .collect::<Result<Vec<_>>>()?;
        self.blocking(move |db| db.insert_many(&db.benchmarks, &documents))
            .await
    }

    async fn recent_benchmarks(&self, limit: u32) -> Result<Vec<BenchmarkRecord>> {
        let documents = self
            .blocking(move |db| db.find_recent(&db.benchmarks, limit))
            .await?;
        decode_all(documents)
    }

    async fn clear_benchmarks(&self) -> Result<u64> {
        self.blocking(|db| db.delete_all(&db.benchmarks)).await
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;
    use crate::model::chat::{ChatMessage, RequestMetrics, Role};

    fn record_at(offset_secs: i64, text: &str) -> ConversationRecord {
        let mut record = ConversationRecord::from_exchange(
            "m",
            vec![ChatMessage::new(Role::User, text)],
            String::new(),
            RequestMetrics::new(0.0, 0.0, 0),
        );
        record.timestamp = Utc::now() + Duration::seconds(offset_secs);
        record
    }

    #[test]
    fn test_rejects_unsafe_collection_names() {
        assert!(validate_collection_name("remote_messages").is_ok());
        assert!(validate_collection_name("x; DROP TABLE y").is_err());
        assert!(validate_collection_name("1abc").is_err());
        assert!(validate_collection_name("").is_err());
        assert!(SqliteStore::open(":memory:", "same", "same").is_err());
    }

    #[tokio::test]
    async fn test_recent_conversations_newest_first() {
        let store = SqliteStore::in_memory().unwrap();
        store.insert_conversation(record_at(2, "second")).await.unwrap();
        store.insert_conversation(record_at(1, "first")).await.unwrap();
        store.insert_conversation(record_at(3, "third")).await.unwrap();

        let recent = store.recent_conversations(2).await.unwrap();
        let texts: Vec<&str> = recent.iter().map(|r| r.messages[0].content.as_str()).collect();
        assert_eq!(texts, vec!["third", "second"]);
    }

    #[tokio::test]
    async fn test_clear_counts() {
        let store = SqliteStore::in_memory().unwrap();
        assert_eq!(store.clear_conversations().await.unwrap(), 0);
        store.insert_conversation(record_at(0, "a")).await.unwrap();
        store.insert_conversation(record_at(1, "b")).await.unwrap();
        assert_eq!(store.clear_conversations().await.unwrap(), 2);
        assert!(store.recent_conversations(10).await.unwrap().is_empty());
        // 两个集合互不影响
        assert_eq!(store.clear_benchmarks().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_file_backed_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");
        let uri = path.to_str().unwrap();
        {
            let store = SqliteStore::open(uri, "remote_messages", "benchmarks").unwrap();
            store.insert_conversation(record_at(0, "kept")).await.unwrap();
        }
        let reopened = SqliteStore::open(uri, "remote_messages", "benchmarks").unwrap();
        let recent = reopened.recent_conversations(5).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].messages[0].content, "kept");
    }
}
