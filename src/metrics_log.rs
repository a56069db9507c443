//! 请求指标 CSV 日志
//!
//! 每个完成的聊天请求追加一行，文件不存在时先原子地创建带表头的文件。写入失败只记录日志

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Local;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

/// CSV 表头
pub const CSV_HEADER: &str = "timestamp,ttftMs,totalLatencyMs,approxTokens";

/// 指标记录器
#[derive(Debug, Clone)]
pub struct MetricsRecorder {
    path: PathBuf,
}

impl MetricsRecorder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 追加一行指标，任何错误都只记录日志
    pub async fn record(&self, ttft_ms: f64, total_latency_ms: f64, approx_tokens: u64) {
        if let Err(e) = self.append(ttft_ms, total_latency_ms, approx_tokens).await {
            tracing::error!(path = %self.path.display(), "写入指标日志失败: {:#}", e);
        }
    }

    async fn append(&self, ttft_ms: f64, total_latency_ms: f64, approx_tokens: u64) -> anyhow::Result<()> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)
                    .await
                    .with_context(|| format!("创建指标目录失败: {}", dir.display()))?;
            }
        }

        if !fs::try_exists(&self.path).await.unwrap_or(false) {
            self.create_with_header().await?;
        }

        let row = format_row(
            &Local::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
            ttft_ms,
            total_latency_ms,
            approx_tokens,
        );

        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("打开指标文件失败: {}", self.path.display()))?;
        file.write_all(row.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    /// 原子地创建只含表头的指标文件
    ///
    /// 先写临时文件再硬链接到目标路径，目标一出现就已带表头；
    /// 并发请求中只有一个链接成功，其余得到 AlreadyExists
    async fn create_with_header(&self) -> anyhow::Result<()> {
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(format!(".{}.tmp", uuid::Uuid::new_v4().simple()));
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, format!("{}\n", CSV_HEADER))
            .await
            .with_context(|| format!("写入临时指标文件失败: {}", tmp.display()))?;
        let linked = fs::hard_link(&tmp, &self.path).await;
        let _ = fs::remove_file(&tmp).await;

        match linked {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(()),
            // 不支持硬链接的文件系统：退回 create_new，只有创建者写表头
            Err(_) => match OpenOptions::new().write(true).create_new(true).open(&self.path).await {
                Ok(mut file) => {
                    file.write_all(format!("{}\n", CSV_HEADER).as_bytes()).await?;
                    file.flush().await?;
                    Ok(())
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(()),
                Err(e) => Err(e)
                    .with_context(|| format!("创建指标文件失败: {}", self.path.display())),
            },
        }
    }
}

fn format_row(timestamp: &str, ttft_ms: f64, total_latency_ms: f64, approx_tokens: u64) -> String {
    format!(
        "{},{:.2},{:.2},{}\n",
        timestamp, ttft_ms, total_latency_ms, approx_tokens
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_row() {
        assert_eq!(
            format_row("2026-01-01T00:00:00", 12.3456, 100.0, 7),
            "2026-01-01T00:00:00,12.35,100.00,7\n"
        );
    }

    #[tokio::test]
    async fn test_creates_file_with_single_header() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = MetricsRecorder::new(dir.path().join("nested/benchmark_metrics.csv"));

        recorder.record(10.0, 50.5, 3).await;
        recorder.record(11.0, 60.0, 4).await;

        let content = std::fs::read_to_string(recorder.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], CSV_HEADER);
        assert!(lines[1].ends_with(",10.00,50.50,3"));
        assert!(lines[2].ends_with(",11.00,60.00,4"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_first_writes_share_one_header() {
        for _ in 0..20 {
            let dir = tempfile::tempdir().unwrap();
            let recorder = MetricsRecorder::new(dir.path().join("benchmark_metrics.csv"));

            let tasks: Vec<_> = (0..8u64)
                .map(|i| {
                    let recorder = recorder.clone();
                    tokio::spawn(async move { recorder.record(1.0, 2.0, i).await })
                })
                .collect();
            for task in tasks {
                task.await.unwrap();
            }

            let content = std::fs::read_to_string(recorder.path()).unwrap();
            let lines: Vec<&str> = content.lines().collect();
            assert_eq!(lines.len(), 9);
            assert_eq!(lines[0], CSV_HEADER);
            assert_eq!(lines.iter().filter(|l| **l == CSV_HEADER).count(), 1);

            // 临时文件已清理
            let entries = std::fs::read_dir(dir.path()).unwrap().count();
            assert_eq!(entries, 1);
        }
    }

    #[tokio::test]
    async fn test_write_failure_is_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        // 目标路径是一个目录，打开文件必然失败
        let recorder = MetricsRecorder::new(dir.path());
        recorder.record(1.0, 2.0, 3).await;
        assert!(dir.path().is_dir());
    }
}
