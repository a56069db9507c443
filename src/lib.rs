//! vllm-proxy：OpenAI 兼容推理后端的流式转发代理
//!
//! 转发聊天请求并原样回传 SSE 流，同时记录请求指标；
//! 配置文档存储后还会保存对话记录和基准测试结果

pub mod api;
pub mod common;
pub mod metrics_log;
pub mod model;
pub mod relay;
pub mod store;
pub mod upstream;
