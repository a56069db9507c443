//! 配置与核心数据模型

pub mod chat;
pub mod config;
