//! 对话历史与基准测试结果的持久化
//!
//! 存储是可选的：未配置时所有操作返回 [`StoreError::NotConfigured`]，不视为故障

pub mod model;
pub mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use self::model::{BenchmarkRecord, BenchmarkResult, ConversationRecord, HistoryMessage};
use crate::model::chat::Role;

pub use sqlite::SqliteStore;

/// 未配置存储时返回给客户端的错误信息
pub const NOT_CONFIGURED_MESSAGE: &str = "Persistence store not configured";

/// 文档存储后端
///
/// `recent_*` 按写入时间倒序返回最近的文档
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn insert_conversation(&self, record: ConversationRecord) -> anyhow::Result<()>;
    async fn recent_conversations(&self, limit: u32) -> anyhow::Result<Vec<ConversationRecord>>;
    async fn clear_conversations(&self) -> anyhow::Result<u64>;

    async fn insert_benchmarks(&self, records: Vec<BenchmarkRecord>) -> anyhow::Result<usize>;
    async fn recent_benchmarks(&self, limit: u32) -> anyhow::Result<Vec<BenchmarkRecord>>;
    async fn clear_benchmarks(&self) -> anyhow::Result<u64>;
}

/// 存储操作错误
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{}", NOT_CONFIGURED_MESSAGE)]
    NotConfigured,
    #[error("{0:#}")]
    Backend(#[from] anyhow::Error),
}

impl StoreError {
    pub fn is_not_configured(&self) -> bool {
        matches!(self, StoreError::NotConfigured)
    }
}

/// 持久化门面，持有可选的存储后端
#[derive(Clone, Default)]
pub struct PersistenceStore {
    backend: Option<Arc<dyn DocumentStore>>,
}

impl PersistenceStore {
    pub fn new(backend: Arc<dyn DocumentStore>) -> Self {
        Self {
            backend: Some(backend),
        }
    }

    pub fn disabled() -> Self {
        Self { backend: None }
    }

    pub fn is_configured(&self) -> bool {
        self.backend.is_some()
    }

    fn backend(&self) -> Result<&Arc<dyn DocumentStore>, StoreError> {
        self.backend.as_ref().ok_or(StoreError::NotConfigured)
    }

    /// 写入对话记录（fire-and-forget，错误只记录日志）
    pub async fn insert_conversation(&self, record: ConversationRecord) {
        let Some(backend) = self.backend.as_ref() else {
            return;
        };
        let message_count = record.messages.len();
        match backend.insert_conversation(record).await {
            Ok(()) => tracing::debug!(message_count, "对话记录已保存"),
            Err(e) => tracing::error!("保存对话记录失败: {:#}", e),
        }
    }

    /// 取最近 `limit` 个对话，展开为按时间正序的消息列表（过滤 system 消息）
    pub async fn list_conversations(&self, limit: u32) -> Result<Vec<HistoryMessage>, StoreError> {
        let records = self.backend()?.recent_conversations(limit).await?;
        Ok(flatten_history(records))
    }

    pub async fn clear_conversations(&self) -> Result<u64, StoreError> {
        let count = self.backend()?.clear_conversations().await?;
        tracing::info!("已清除 {} 条对话记录", count);
        Ok(count)
    }

    /// 批量保存基准测试结果，返回保存条数
    pub async fn insert_benchmark_batch(&self, results: Vec<BenchmarkResult>) -> Result<usize, StoreError> {
        let backend = self.backend()?;
        if results.is_empty() {
            return Ok(0);
        }
        let created_at = Utc::now();
        let records = results
            .into_iter()
            .map(|r| BenchmarkRecord::new(r, created_at))
            .collect();
        let saved = backend.insert_benchmarks(records).await?;
        tracing::info!("已保存 {} 条基准测试结果", saved);
        Ok(saved)
    }

    /// 取最近 `limit` 条基准测试结果，按客户端 timestamp 正序返回
    pub async fn list_benchmarks(&self, limit: u32) -> Result<Vec<BenchmarkResult>, StoreError> {
        let records = self.backend()?.recent_benchmarks(limit).await?;
        let mut results: Vec<BenchmarkResult> = records.into_iter().map(|r| r.result).collect();
        results.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Ok(results)
    }

    pub async fn clear_benchmarks(&self) -> Result<u64, StoreError> {
        let count = self.backend()?.clear_benchmarks().await?;
        tracing::info!("已清除 {} 条基准测试结果", count);
        Ok(count)
    }
}

/// 展开对话记录：丢弃 system 消息，附加所属对话的时间戳，再按时间正序稳定排序
fn flatten_history(records: Vec<ConversationRecord>) -> Vec<HistoryMessage> {
    let mut messages: Vec<(String, HistoryMessage)> = Vec::new();
    for record in records {
        let key = record.sort_key();
        let timestamp = record.timestamp.to_rfc3339();
        for message in record.messages {
            if message.role == Role::System {
                continue;
            }
            messages.push((
                key.clone(),
                HistoryMessage {
                    role: message.role,
                    content: message.content,
                    timestamp: timestamp.clone(),
                    metrics: message.metrics,
                },
            ));
        }
    }
    messages.sort_by(|a, b| a.0.cmp(&b.0));
    messages.into_iter().map(|(_, m)| m).collect()
}
