use std::path::PathBuf;

use clap::Parser;

/// 指标日志文件名（位于 metrics_dir 下）
pub const METRICS_FILE_NAME: &str = "benchmark_metrics.csv";

/// vllm-proxy 应用配置
///
/// 所有选项均可通过命令行参数或环境变量设置，启动时先加载 `.env`
#[derive(Debug, Clone, Parser)]
#[command(name = "vllm-proxy", version, about = "OpenAI 兼容推理后端的流式转发代理")]
pub struct Config {
    /// 上游推理服务地址（OpenAI 兼容，包含 /v1 前缀）
    #[arg(long, env = "VLLM_API_BASE", default_value_t = default_upstream_base())]
    pub upstream_base: String,

    /// 发送给上游的模型名
    #[arg(long, env = "MODEL_NAME", default_value_t = default_model_name())]
    pub model_name: String,

    #[arg(long, env = "HOST", default_value_t = default_host())]
    pub host: String,

    #[arg(long, env = "PORT", default_value_t = default_port())]
    pub port: u16,

    /// 文档存储（SQLite 数据库路径，支持 `:memory:`）
    ///
    /// 未配置时关闭所有持久化功能
    #[arg(long, env = "STORE_URI")]
    pub store_uri: Option<String>,

    /// 对话记录集合名
    #[arg(long, env = "STORE_COLLECTION", default_value_t = default_collection())]
    pub store_collection: String,

    /// 基准测试结果集合名
    #[arg(long, env = "STORE_BENCHMARKS_COLLECTION", default_value_t = default_benchmarks_collection())]
    pub store_benchmarks_collection: String,

    /// 指标 CSV 日志目录
    #[arg(long, env = "METRICS_DIR", default_value_os_t = default_metrics_dir())]
    pub metrics_dir: PathBuf,

    /// 上游请求使用的代理（可选）
    /// 支持格式: http://host:port, https://host:port, socks5://host:port
    #[arg(long, env = "UPSTREAM_PROXY")]
    pub upstream_proxy: Option<String>,

    /// 严格状态码模式：存储错误返回 500，未配置返回 503（响应体不变）
    #[arg(long, env = "STRICT_STATUS_CODES", default_value_t = false)]
    pub strict_status_codes: bool,
}

fn default_upstream_base() -> String {
    "http://localhost:8000/v1".to_string()
}

fn default_model_name() -> String {
    "llama-2-7b-chat".to_string()
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8001
}

fn default_collection() -> String {
    "remote_messages".to_string()
}

fn default_benchmarks_collection() -> String {
    "benchmarks".to_string()
}

fn default_metrics_dir() -> PathBuf {
    PathBuf::from("/app/metrics")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            upstream_base: default_upstream_base(),
            model_name: default_model_name(),
            host: default_host(),
            port: default_port(),
            store_uri: None,
            store_collection: default_collection(),
            store_benchmarks_collection: default_benchmarks_collection(),
            metrics_dir: default_metrics_dir(),
            upstream_proxy: None,
            strict_status_codes: false,
        }
    }
}

impl Config {
    /// 监听地址
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// 指标 CSV 文件完整路径
    pub fn metrics_file(&self) -> PathBuf {
        self.metrics_dir.join(METRICS_FILE_NAME)
    }

    /// 去掉末尾斜杠的上游地址
    pub fn upstream_base_trimmed(&self) -> &str {
        self.upstream_base.trim_end_matches('/')
    }
}
