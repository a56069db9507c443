//! 公共工具模块

/// 日志中消息预览的最大字节数
pub const LOG_PREVIEW_BYTES: usize = 50;

/// 截断到不超过 `max_bytes` 字节的最长有效 UTF-8 前缀
pub fn truncate_str_safe(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }

    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }

    &s[..end]
}

/// 生成用于日志的消息内容
///
/// 默认只输出前 [`LOG_PREVIEW_BYTES`] 字节并追加 `...`；
/// 启用 `sensitive-logs` feature 时输出完整内容
pub fn log_preview(content: &str) -> String {
    if cfg!(feature = "sensitive-logs") {
        return content.to_string();
    }
    format!("{}...", truncate_str_safe(content, LOG_PREVIEW_BYTES))
}
