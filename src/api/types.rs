//! HTTP 接口请求/响应类型

use serde::{Deserialize, Serialize};

use crate::store::model::{BenchmarkResult, HistoryMessage};

fn default_history_limit() -> u32 {
    50
}

fn default_benchmarks_limit() -> u32 {
    200
}

/// GET /api/chat/history 查询参数
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_history_limit")]
    pub limit: u32,
}

/// GET /api/benchmarks 查询参数
#[derive(Debug, Deserialize)]
pub struct BenchmarksQuery {
    #[serde(default = "default_benchmarks_limit")]
    pub limit: u32,
}

/// 历史消息响应
#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub messages: Vec<HistoryMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// 批量删除响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearResponse {
    pub deleted_count: u64,
    pub message: String,
}

/// 仅含错误信息的响应
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

/// POST /api/benchmarks 请求体
#[derive(Debug, Deserialize)]
pub struct BenchmarkBatch {
    pub results: Vec<BenchmarkResult>,
}

/// 基准测试保存响应
#[derive(Debug, Serialize)]
pub struct SaveResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub saved: usize,
}

/// 基准测试查询响应
#[derive(Debug, Serialize)]
pub struct BenchmarksResponse {
    pub results: Vec<BenchmarkResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// 健康检查响应
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub backend: &'static str,
}
