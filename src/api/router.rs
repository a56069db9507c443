//! 路由配置

use axum::{
    Router,
    routing::{get, post},
};

use super::handlers::{
    chat, clear_benchmarks, clear_chat_history, get_benchmarks, get_chat_history, health,
    save_benchmarks,
};
use super::middleware::{AppState, cors_layer};

/// 创建应用路由
///
/// # 端点
/// - `POST /api/chat` - 流式转发聊天请求
/// - `GET /api/chat/history` - 最近的对话消息（`?limit=`，默认 50）
/// - `DELETE /api/chat/history` - 清空对话记录
/// - `POST /api/benchmarks` - 批量保存基准测试结果
/// - `GET /api/benchmarks` - 最近的基准测试结果（`?limit=`，默认 200）
/// - `DELETE /api/benchmarks` - 清空基准测试结果
/// - `GET /health` - 健康检查
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/chat", post(chat))
        .route(
            "/api/chat/history",
            get(get_chat_history).delete(clear_chat_history),
        )
        .route(
            "/api/benchmarks",
            get(get_benchmarks).post(save_benchmarks).delete(clear_benchmarks),
        )
        .route("/health", get(health))
        .layer(cors_layer())
        .with_state(state)
}
