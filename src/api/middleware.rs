//! 应用共享状态与中间件

use std::sync::Arc;

use axum::http::StatusCode;

use crate::metrics_log::MetricsRecorder;
use crate::model::config::Config;
use crate::relay::ChatRelay;
use crate::store::{PersistenceStore, SqliteStore, StoreError};
use crate::upstream::{self, UpstreamClient};

/// 应用共享状态
#[derive(Clone)]
pub struct AppState {
    /// 聊天转发器（持有上游客户端、指标记录器和存储）
    pub relay: Arc<ChatRelay>,
    /// 持久化存储（未配置时所有操作返回 not configured）
    pub store: PersistenceStore,
    /// 严格状态码模式
    pub strict_status_codes: bool,
}

impl AppState {
    pub fn new(relay: ChatRelay) -> Self {
        let store = relay.store().clone();
        Self {
            relay: Arc::new(relay),
            store,
            strict_status_codes: false,
        }
    }

    pub fn with_strict_status_codes(mut self, strict: bool) -> Self {
        self.strict_status_codes = strict;
        self
    }

    /// 按配置构建完整的应用状态
    ///
    /// 存储打开失败不会中止启动，只记录错误并以未配置状态运行
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let client = upstream::build_client(
            config.upstream_proxy.as_deref(),
            upstream::UPSTREAM_TIMEOUT_SECS,
        )?;
        let upstream = UpstreamClient::new(client, config.upstream_base_trimmed(), &config.model_name);
        let recorder = MetricsRecorder::new(config.metrics_file());
        let store = open_store(config);

        let relay = ChatRelay::new(upstream, recorder, store);
        Ok(Self::new(relay).with_strict_status_codes(config.strict_status_codes))
    }

    /// 存储相关失败对应的 HTTP 状态码
    ///
    /// 默认始终返回 200，错误信息放在响应体的 `error` 字段中
    pub fn failure_status(&self, error: &StoreError) -> StatusCode {
        if !self.strict_status_codes {
            return StatusCode::OK;
        }
        match error {
            StoreError::NotConfigured => StatusCode::SERVICE_UNAVAILABLE,
            StoreError::Backend(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// 查询参数无法解析时的状态码：默认 200，严格模式 400
    pub fn bad_request_status(&self) -> StatusCode {
        if self.strict_status_codes {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::OK
        }
    }
}

fn open_store(config: &Config) -> PersistenceStore {
    let Some(uri) = config.store_uri.as_deref() else {
        tracing::info!("未配置 STORE_URI，持久化功能已关闭");
        return PersistenceStore::disabled();
    };

    match SqliteStore::open(uri, &config.store_collection, &config.store_benchmarks_collection) {
        Ok(store) => PersistenceStore::new(Arc::new(store)),
        Err(e) => {
            tracing::error!("打开文档存储失败，持久化功能已关闭: {:#}", e);
            PersistenceStore::disabled()
        }
    }
}

/// CORS 中间件层
///
/// 允许所有来源、方法和请求头，供浏览器前端直接调用
pub fn cors_layer() -> tower_http::cors::CorsLayer {
    use tower_http::cors::{Any, CorsLayer};

    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}
