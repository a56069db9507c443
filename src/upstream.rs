//! 上游推理服务客户端
//!
//! 向 OpenAI 兼容的 `/chat/completions` 发起流式请求，并把响应体切分为逐行的事件文本

use std::time::Duration;

use anyhow::Context;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::{Client, Proxy};
use serde::Serialize;

use crate::model::chat::{ChatMessage, ChatRequest};

/// 整个上游交互（连接 + 读完响应体）的超时时间
pub const UPSTREAM_TIMEOUT_SECS: u64 = 60;

/// 构建 HTTP Client
///
/// `timeout_secs` 覆盖整个请求周期，而不是单个 chunk 的读取
pub fn build_client(proxy_url: Option<&str>, timeout_secs: u64) -> anyhow::Result<Client> {
    let mut builder = Client::builder().timeout(Duration::from_secs(timeout_secs));

    if let Some(url) = proxy_url {
        let proxy = Proxy::all(url).with_context(|| format!("无效的代理地址: {}", url))?;
        builder = builder.proxy(proxy);
        tracing::debug!("上游 Client 使用代理: {}", url);
    }

    builder.build().context("构建上游 HTTP Client 失败")
}

/// 发送给上游的请求体
#[derive(Debug, Serialize)]
pub struct CompletionPayload<'a> {
    pub model: &'a str,
    pub messages: &'a [ChatMessage],
    pub stream: bool,
    pub max_tokens: u32,
    pub temperature: f64,
}

impl<'a> CompletionPayload<'a> {
    /// 强制 stream=true，缺省参数使用默认值
    pub fn from_request(model: &'a str, request: &'a ChatRequest) -> Self {
        Self {
            model,
            messages: &request.messages,
            stream: true,
            max_tokens: request.effective_max_tokens(),
            temperature: request.effective_temperature(),
        }
    }
}

/// 上游客户端
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    client: Client,
    base_url: String,
    model: String,
}

impl UpstreamClient {
    pub fn new(client: Client, base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    /// 发起流式请求，返回未读取响应体的 Response
    ///
    /// 状态码由调用方检查
    pub async fn open_stream(&self, request: &ChatRequest) -> anyhow::Result<reqwest::Response> {
        let payload = CompletionPayload::from_request(&self.model, request);
        self.client
            .post(self.completions_url())
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await
            .context("上游请求发送失败")
    }
}

/// 增量行解码器
///
/// 按 `\n` 切分字节流，去掉行尾 `\r`。以字节缓冲，避免 chunk 边界落在多字节字符中间
#[derive(Debug, Default)]
pub struct LineDecoder {
    buffer: Vec<u8>,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一个 chunk，返回其中所有完整的行
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }

    /// 流结束时取出没有换行结尾的残留行
    pub fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let mut rest = std::mem::take(&mut self.buffer);
        if rest.last() == Some(&b'\r') {
            rest.pop();
        }
        Some(String::from_utf8_lossy(&rest).into_owned())
    }
}

/// 把字节流转换为逐行文本流（包含空行，由调用方决定是否跳过）
pub fn lines<S, E>(body: S) -> impl Stream<Item = anyhow::Result<String>> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send,
    E: std::error::Error + Send + Sync + 'static,
{
    async_stream::try_stream! {
        let mut body = std::pin::pin!(body);
        let mut decoder = LineDecoder::new();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.context("读取上游响应流失败")?;
            for line in decoder.push(&chunk) {
                yield line;
            }
        }
        if let Some(rest) = decoder.finish() {
            yield rest;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::chat::Role;

    #[test]
    fn test_build_client_without_proxy() {
        assert!(build_client(None, UPSTREAM_TIMEOUT_SECS).is_ok());
    }

    #[test]
    fn test_build_client_with_socks5_proxy() {
        assert!(build_client(Some("socks5://127.0.0.1:1080"), 30).is_ok());
    }

    #[test]
    fn test_payload_forces_stream_and_defaults() {
        let request = ChatRequest {
            messages: vec![ChatMessage::new(Role::User, "hi")],
            stream: false,
            max_tokens: None,
            temperature: None,
        };
        let payload = CompletionPayload::from_request("llama", &request);
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["model"], "llama");
        assert_eq!(json["stream"], true);
        assert_eq!(json["max_tokens"], 1024);
        assert_eq!(json["temperature"], 0.7);
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "hi");
    }

    #[test]
    fn test_completions_url_trims_slash() {
        let client = UpstreamClient::new(Client::new(), "http://gpu:8000/v1/", "m");
        assert_eq!(client.completions_url(), "http://gpu:8000/v1/chat/completions");
    }

    #[test]
    fn test_line_decoder_across_chunks() {
        let mut decoder = LineDecoder::new();
        assert!(decoder.push(b"data: {\"a\"").is_empty());
        assert_eq!(decoder.push(b":1}\r\n\r\ndata: [DO"), vec!["data: {\"a\":1}", ""]);
        assert_eq!(decoder.push(b"NE]\n"), vec!["data: [DONE]"]);
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn test_line_decoder_split_multibyte() {
        let text = "data: 你好\n".as_bytes();
        let mut decoder = LineDecoder::new();
        // 在 "你" 的第二个字节处切开
        assert!(decoder.push(&text[..7]).is_empty());
        assert_eq!(decoder.push(&text[7..]), vec!["data: 你好"]);
    }

    #[test]
    fn test_line_decoder_trailing_without_newline() {
        let mut decoder = LineDecoder::new();
        assert!(decoder.push(b"data: tail").is_empty());
        assert_eq!(decoder.finish().as_deref(), Some("data: tail"));
        assert_eq!(decoder.finish(), None);
    }

    #[tokio::test]
    async fn test_lines_stream() {
        let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from_static(b"data: 1\n\nda")),
            Ok(Bytes::from_static(b"ta: 2\n")),
        ];
        let collected: Vec<String> = lines(futures::stream::iter(chunks))
            .map(|l| l.unwrap())
            .collect()
            .await;
        assert_eq!(collected, vec!["data: 1", "", "data: 2"]);
    }
}
