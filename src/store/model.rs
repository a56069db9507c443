//! 持久化文档模型

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::model::chat::{ChatMessage, RequestMetrics, Role};

/// 对话记录来源标记
pub const REMOTE_SOURCE: &str = "remote";

/// 对话中保存的一条消息，助手回复附带本次请求的指标
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<RequestMetrics>,
}

impl From<ChatMessage> for StoredMessage {
    fn from(message: ChatMessage) -> Self {
        Self {
            role: message.role,
            content: message.content,
            metrics: None,
        }
    }
}

/// 一次完整对话（写入后不再修改）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub timestamp: DateTime<Utc>,
    pub model: String,
    pub messages: Vec<StoredMessage>,
    pub source: String,
}

impl ConversationRecord {
    /// 由请求消息构建记录，助手回复非空时追加带指标的助手消息
    pub fn from_exchange(
        model: impl Into<String>,
        messages: Vec<ChatMessage>,
        assistant_text: String,
        metrics: RequestMetrics,
    ) -> Self {
        let mut stored: Vec<StoredMessage> = messages.into_iter().map(Into::into).collect();
        if !assistant_text.is_empty() {
            stored.push(StoredMessage {
                role: Role::Assistant,
                content: assistant_text,
                metrics: Some(metrics),
            });
        }
        Self {
            timestamp: Utc::now(),
            model: model.into(),
            messages: stored,
            source: REMOTE_SOURCE.to_string(),
        }
    }

    /// 用作排序键的时间戳（固定精度，字典序即时间序）
    pub fn sort_key(&self) -> String {
        sort_key(&self.timestamp)
    }
}

/// 固定精度的 RFC3339 时间字符串
pub fn sort_key(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// 历史查询返回的扁平化消息
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<RequestMetrics>,
}

/// 基准测试运行位置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BenchmarkMode {
    Local,
    Remote,
}

/// 客户端提交的单条基准测试结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkResult {
    pub prompt_id: String,
    pub prompt_type: String,
    pub mode: BenchmarkMode,
    /// 形如 { ttftMs, tokensPerSec, totalTimeMs, tokenCount }，不做字段校验
    pub metrics: serde_json::Map<String, serde_json::Value>,
    pub timestamp: String,
    pub model_name: String,
}

/// 入库后的基准测试结果，附带服务端创建时间
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkRecord {
    #[serde(flatten)]
    pub result: BenchmarkResult,
    pub created_at: DateTime<Utc>,
}

impl BenchmarkRecord {
    pub fn new(result: BenchmarkResult, created_at: DateTime<Utc>) -> Self {
        Self { result, created_at }
    }

    pub fn sort_key(&self) -> String {
        sort_key(&self.created_at)
    }
}
