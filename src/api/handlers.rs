//! HTTP 处理器
//!
//! 存储相关失败和无法解析的查询参数默认以 200 + `error` 字段返回
//! （严格模式见 [`AppState::failure_status`] 与 [`AppState::bad_request_status`]）

use axum::{
    Json,
    body::Body,
    extract::{Query, State, rejection::QueryRejection},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};

use super::middleware::AppState;
use super::types::{
    BenchmarkBatch, BenchmarksQuery, BenchmarksResponse, ClearResponse, ErrorBody, HealthResponse,
    HistoryQuery, HistoryResponse, SaveResponse,
};
use crate::model::chat::ChatRequest;
use crate::store::StoreError;

fn log_store_error(action: &str, error: &StoreError) {
    if !error.is_not_configured() {
        tracing::error!("{}失败: {}", action, error);
    }
}

/// POST /api/chat
pub async fn chat(State(state): State<AppState>, Json(request): Json<ChatRequest>) -> Response {
    let stream = state.relay.clone().relay(request);
    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(stream),
    )
        .into_response()
}

/// GET /api/chat/history
pub async fn get_chat_history(
    State(state): State<AppState>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> Response {
    let limit = match query {
        Ok(Query(query)) => query.limit,
        Err(rejection) => {
            tracing::warn!("无效的查询参数: {}", rejection.body_text());
            return (
                state.bad_request_status(),
                Json(HistoryResponse {
                    messages: Vec::new(),
                    error: Some(rejection.body_text()),
                }),
            )
                .into_response();
        }
    };

    match state.store.list_conversations(limit).await {
        Ok(messages) => Json(HistoryResponse {
            messages,
            error: None,
        })
        .into_response(),
        Err(e) => {
            log_store_error("查询对话历史", &e);
            (
                state.failure_status(&e),
                Json(HistoryResponse {
                    messages: Vec::new(),
                    error: Some(e.to_string()),
                }),
            )
                .into_response()
        }
    }
}

/// DELETE /api/chat/history
pub async fn clear_chat_history(State(state): State<AppState>) -> Response {
    match state.store.clear_conversations().await {
        Ok(count) => Json(ClearResponse {
            deleted_count: count,
            message: "All chat history cleared".to_string(),
        })
        .into_response(),
        Err(e) => {
            log_store_error("清空对话历史", &e);
            (state.failure_status(&e), Json(ErrorBody::new(e.to_string()))).into_response()
        }
    }
}

/// POST /api/benchmarks
pub async fn save_benchmarks(
    State(state): State<AppState>,
    Json(batch): Json<BenchmarkBatch>,
) -> Response {
    match state.store.insert_benchmark_batch(batch.results).await {
        Ok(saved) => Json(SaveResponse { error: None, saved }).into_response(),
        Err(e) => {
            log_store_error("保存基准测试结果", &e);
            (
                state.failure_status(&e),
                Json(SaveResponse {
                    error: Some(e.to_string()),
                    saved: 0,
                }),
            )
                .into_response()
        }
    }
}

/// GET /api/benchmarks
pub async fn get_benchmarks(
    State(state): State<AppState>,
    query: Result<Query<BenchmarksQuery>, QueryRejection>,
) -> Response {
    let limit = match query {
        Ok(Query(query)) => query.limit,
        Err(rejection) => {
            tracing::warn!("无效的查询参数: {}", rejection.body_text());
            return (
                state.bad_request_status(),
                Json(BenchmarksResponse {
                    results: Vec::new(),
                    error: Some(rejection.body_text()),
                }),
            )
                .into_response();
        }
    };

    match state.store.list_benchmarks(limit).await {
        Ok(results) => Json(BenchmarksResponse {
            results,
            error: None,
        })
        .into_response(),
        Err(e) => {
            log_store_error("查询基准测试结果", &e);
            (
                state.failure_status(&e),
                Json(BenchmarksResponse {
                    results: Vec::new(),
                    error: Some(e.to_string()),
                }),
            )
                .into_response()
        }
    }
}

/// DELETE /api/benchmarks
pub async fn clear_benchmarks(State(state): State<AppState>) -> Response {
    match state.store.clear_benchmarks().await {
        Ok(count) => Json(ClearResponse {
            deleted_count: count,
            message: "All benchmark results cleared".to_string(),
        })
        .into_response(),
        Err(e) => {
            log_store_error("清空基准测试结果", &e);
            (state.failure_status(&e), Json(ErrorBody::new(e.to_string()))).into_response()
        }
    }
}

/// GET /health
pub async fn health() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok",
            backend: "vllm-proxy",
        }),
    )
}
