//! 流事件观察器：在转发的同时统计首 token 延迟、事件数并拼接助手回复

use std::time::Instant;

use crate::model::chat::RequestMetrics;

/// SSE 数据行前缀
pub const DATA_PREFIX: &str = "data: ";
/// 上游流结束标记
pub const DONE_SENTINEL: &str = "[DONE]";

/// 单次请求的流统计状态
#[derive(Debug)]
pub struct StreamTracker {
    started: Instant,
    ttft_ms: Option<f64>,
    token_count: u64,
    assistant_text: String,
}

impl StreamTracker {
    pub fn new(started: Instant) -> Self {
        Self {
            started,
            ttft_ms: None,
            token_count: 0,
            assistant_text: String::new(),
        }
    }

    pub fn observe(&mut self, line: &str) {
        self.observe_at(line, Instant::now());
    }

    /// 观察一行上游输出
    ///
    /// 第一个数据行（包括 `[DONE]`）确定 TTFT；除 `[DONE]` 外每个数据行计为一个 token
    pub fn observe_at(&mut self, line: &str, now: Instant) {
        let Some(data) = line.strip_prefix(DATA_PREFIX) else {
            return;
        };

        if self.ttft_ms.is_none() {
            let ttft = elapsed_ms(self.started, now);
            tracing::info!("首 token 延迟: {:.2}ms", ttft);
            self.ttft_ms = Some(ttft);
        }

        let data = data.trim();
        if data == DONE_SENTINEL {
            return;
        }

        self.token_count += 1;
        if let Some(piece) = extract_delta_content(data) {
            self.assistant_text.push_str(&piece);
        }
    }

    pub fn ttft_ms(&self) -> Option<f64> {
        self.ttft_ms
    }

    pub fn token_count(&self) -> u64 {
        self.token_count
    }

    pub fn finish(self) -> (RequestMetrics, String) {
        self.finish_at(Instant::now())
    }

    /// 结束统计，返回指标和完整的助手回复
    pub fn finish_at(self, now: Instant) -> (RequestMetrics, String) {
        let total_time_ms = elapsed_ms(self.started, now);
        let metrics = RequestMetrics::new(
            self.ttft_ms.unwrap_or(0.0),
            total_time_ms,
            self.token_count,
        );
        (metrics, self.assistant_text)
    }
}

fn elapsed_ms(from: Instant, to: Instant) -> f64 {
    to.saturating_duration_since(from).as_secs_f64() * 1000.0
}

/// 提取 `choices[0].delta.content`，解析失败或缺失时返回 None
pub fn extract_delta_content(data: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(data).ok()?;
    let content = value
        .get("choices")?
        .get(0)?
        .get("delta")?
        .get("content")?
        .as_str()?;
    if content.is_empty() {
        None
    } else {
        Some(content.to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn delta_line(content: &str) -> String {
        format!(
            "data: {}",
            serde_json::json!({"choices": [{"delta": {"content": content}}]})
        )
    }

    #[test]
    fn test_extract_delta_content() {
        assert_eq!(
            extract_delta_content(r#"{"choices":[{"delta":{"content":"Hi"}}]}"#).as_deref(),
            Some("Hi")
        );
        assert_eq!(extract_delta_content(r#"{"choices":[{"delta":{"role":"assistant"}}]}"#), None);
        assert_eq!(extract_delta_content(r#"{"choices":[]}"#), None);
        assert_eq!(extract_delta_content("not json"), None);
    }

    #[test]
    fn test_counts_and_accumulates() {
        let start = Instant::now();
        let mut tracker = StreamTracker::new(start);
        tracker.observe_at(&delta_line("Hel"), start + Duration::from_millis(40));
        tracker.observe_at(&delta_line("lo"), start + Duration::from_millis(50));
        tracker.observe_at("data: {broken", start + Duration::from_millis(55));
        tracker.observe_at(": keep-alive", start + Duration::from_millis(56));
        tracker.observe_at("data: [DONE]", start + Duration::from_millis(60));

        // 解析失败的数据行仍然计数，注释行和 [DONE] 不计数
        assert_eq!(tracker.token_count(), 3);

        let (metrics, text) = tracker.finish_at(start + Duration::from_millis(100));
        assert_eq!(text, "Hello");
        assert_eq!(metrics.token_count, 3);
        assert!((metrics.ttft_ms - 40.0).abs() < 1e-6);
        assert!((metrics.total_time_ms - 100.0).abs() < 1e-6);
        assert!((metrics.tokens_per_sec - 30.0).abs() < 1e-6);
    }

    #[test]
    fn test_ttft_set_once_and_bounded_by_total() {
        let start = Instant::now();
        let mut tracker = StreamTracker::new(start);
        tracker.observe_at(&delta_line("a"), start + Duration::from_millis(10));
        tracker.observe_at(&delta_line("b"), start + Duration::from_millis(30));
        let ttft = tracker.ttft_ms().unwrap();
        assert!((ttft - 10.0).abs() < 1e-6);

        let (metrics, _) = tracker.finish_at(start + Duration::from_millis(30));
        assert!(metrics.ttft_ms <= metrics.total_time_ms);
    }

    #[test]
    fn test_done_only_sets_ttft_without_tokens() {
        let start = Instant::now();
        let mut tracker = StreamTracker::new(start);
        tracker.observe_at("data: [DONE]", start + Duration::from_millis(5));
        assert!(tracker.ttft_ms().is_some());

        let (metrics, text) = tracker.finish_at(start + Duration::from_millis(5));
        assert_eq!(metrics.token_count, 0);
        assert_eq!(metrics.tokens_per_sec, 0.0);
        assert!(text.is_empty());
    }

    #[test]
    fn test_no_events_zero_ttft() {
        let start = Instant::now();
        let (metrics, _) = StreamTracker::new(start).finish_at(start);
        assert_eq!(metrics.ttft_ms, 0.0);
        assert_eq!(metrics.total_time_ms, 0.0);
        assert_eq!(metrics.tokens_per_sec, 0.0);
    }
}
