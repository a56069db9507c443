//! 聊天流式转发
//!
//! 原样转发上游 SSE 行，同时统计指标并拼接助手回复；
//! 流结束后写入指标日志并（可选）保存对话记录

pub mod tracker;

use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use bytes::Bytes;
use futures::{Stream, StreamExt};

use crate::common::log_preview;
use crate::metrics_log::MetricsRecorder;
use crate::model::chat::ChatRequest;
use crate::store::PersistenceStore;
use crate::store::model::ConversationRecord;
use crate::upstream::{self, UpstreamClient};

pub use tracker::StreamTracker;

/// 构造单个 SSE 错误事件：`data: {"error": "..."}\n\n`
pub fn error_event(message: impl Into<String>) -> Bytes {
    let payload = serde_json::json!({ "error": message.into() });
    Bytes::from(format!("data: {}\n\n", payload))
}

/// 发给客户端的错误文本：只取最底层的错误，完整上下文链只进日志
fn client_error_message(error: &anyhow::Error) -> String {
    error.root_cause().to_string()
}

/// 每次 poll 都在给定 span 内进行的流
struct InSpan<S> {
    inner: Pin<Box<S>>,
    span: tracing::Span,
}

impl<S: Stream> InSpan<S> {
    fn new(inner: S, span: tracing::Span) -> Self {
        Self {
            inner: Box::pin(inner),
            span,
        }
    }
}

impl<S: Stream> Stream for InSpan<S> {
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let _enter = this.span.enter();
        this.inner.as_mut().poll_next(cx)
    }
}

/// 聊天转发器，进程内共享
pub struct ChatRelay {
    upstream: UpstreamClient,
    recorder: MetricsRecorder,
    store: PersistenceStore,
}

impl ChatRelay {
    pub fn new(upstream: UpstreamClient, recorder: MetricsRecorder, store: PersistenceStore) -> Self {
        Self {
            upstream,
            recorder,
            store,
        }
    }

    pub fn store(&self) -> &PersistenceStore {
        &self.store
    }

    /// 转发一次聊天请求，返回可直接作为 `text/event-stream` 响应体的字节流
    ///
    /// 该流不会产生错误项：所有失败都以单个错误事件的形式写入流后结束。
    /// 整个转发过程的日志都位于带 `request_id` 的 `chat` span 内
    pub fn relay(
        self: std::sync::Arc<Self>,
        request: ChatRequest,
    ) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
        let request_id = uuid::Uuid::new_v4();
        let span = tracing::info_span!("chat", %request_id);

        let stream = async_stream::stream! {
            let started = Instant::now();
            tracing::info!("收到聊天请求，上游: {}", self.upstream.base_url());
            tracing::info!("消息数: {}", request.messages.len());
            for (i, message) in request.messages.iter().enumerate() {
                tracing::info!("  [{}] {}: {}", i, message.role.as_str(), log_preview(&message.content));
            }

            let response = match self.upstream.open_stream(&request).await {
                Ok(response) => response,
                Err(e) => {
                    tracing::error!("流式转发出错: {:#}", e);
                    yield Ok(error_event(client_error_message(&e)));
                    return;
                }
            };

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                tracing::error!("上游错误 {}: {}", status.as_u16(), body);
                yield Ok(error_event(format!("Upstream error: {}", status.as_u16())));
                return;
            }

            let mut tracker = StreamTracker::new(started);
            let mut lines = std::pin::pin!(upstream::lines(response.bytes_stream()));
            while let Some(line) = lines.next().await {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        tracing::error!("流式转发出错: {:#}", e);
                        yield Ok(error_event(client_error_message(&e)));
                        return;
                    }
                };
                if line.is_empty() {
                    continue;
                }
                tracker.observe(&line);
                yield Ok(Bytes::from(format!("{}\n", line)));
            }

            let (metrics, assistant_text) = tracker.finish();
            tracing::info!(
                "请求完成，总耗时: {:.2}ms，tokens: ~{}",
                metrics.total_time_ms,
                metrics.token_count
            );

            self.recorder
                .record(metrics.ttft_ms, metrics.total_time_ms, metrics.token_count)
                .await;

            if self.store.is_configured() {
                let record = ConversationRecord::from_exchange(
                    self.upstream.model(),
                    request.messages,
                    assistant_text,
                    metrics,
                );
                self.store.insert_conversation(record).await;
            }
        };

        InSpan::new(stream, span)
    }
}
