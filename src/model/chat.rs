//! 聊天请求与指标类型定义

use serde::{Deserialize, Serialize};

/// 未指定时发送给上游的 max_tokens
pub const DEFAULT_MAX_TOKENS: u32 = 1024;
/// 未指定时发送给上游的 temperature
pub const DEFAULT_TEMPERATURE: f64 = 0.7;

/// 消息角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// 单条聊天消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// POST /api/chat 请求体
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    /// 客户端传入的值会被忽略，上游始终以流式调用
    #[serde(default = "default_stream")]
    pub stream: bool,
    #[serde(default, alias = "max_tokens")]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f64>,
}

fn default_stream() -> bool {
    true
}

impl ChatRequest {
    pub fn effective_max_tokens(&self) -> u32 {
        self.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS)
    }

    pub fn effective_temperature(&self) -> f64 {
        self.temperature.unwrap_or(DEFAULT_TEMPERATURE)
    }
}

/// 单次请求的性能指标
///
/// `token_count` 是收到的流事件数，并非分词器意义上的 token 数
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestMetrics {
    pub ttft_ms: f64,
    pub total_time_ms: f64,
    pub tokens_per_sec: f64,
    pub token_count: u64,
}

impl RequestMetrics {
    pub fn new(ttft_ms: f64, total_time_ms: f64, token_count: u64) -> Self {
        Self {
            ttft_ms,
            total_time_ms,
            tokens_per_sec: tokens_per_sec(token_count, total_time_ms),
            token_count,
        }
    }
}

/// 计算吞吐，耗时非正或无 token 时返回 0
pub fn tokens_per_sec(token_count: u64, total_time_ms: f64) -> f64 {
    if total_time_ms <= 0.0 || token_count == 0 {
        return 0.0;
    }
    token_count as f64 / (total_time_ms / 1000.0)
}
