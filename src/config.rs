//! 配置模块
//!
//! 支持从 JSON 文件加载系统配置，未配置的字段使用默认值

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::services::upload::MAX_UPLOAD_BYTES;

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// 监听地址
    #[serde(default = "default_host")]
    pub host: String,
    /// 监听端口
    #[serde(default = "default_port")]
    pub port: u16,
    /// 工作线程数（0 表示使用 CPU 核心数）
    #[serde(default)]
    pub workers: usize,
}

/// API 配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ApiConfig {
    /// API Key（为空则不启用认证）
    #[serde(default)]
    pub api_key: String,
}

/// 图表分析服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// 分析服务地址
    #[serde(default = "default_analysis_endpoint")]
    pub endpoint: String,
    /// 请求超时时间（秒）
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// 连接超时时间（秒）
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

/// 批量分析配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// 单个批次的最大并发分析数
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// 单只股票分析超时时间（秒），超时记为失败
    #[serde(default = "default_item_timeout")]
    pub item_timeout_secs: u64,
    /// 上传文件大小上限（字节）
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
    /// 已结束批次的保留时间（秒）
    #[serde(default = "default_retention")]
    pub retention_secs: u64,
    /// 过期清理的检查间隔（秒）
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
    /// 服务端预置的股票列表文件，供 GET /api/stocks 读取
    #[serde(default = "default_stock_list_path")]
    pub stock_list_path: String,
}

/// 轮询客户端配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// 状态轮询间隔（毫秒）
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// 日志级别: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub log: LogConfig,
}

/// 配置文件查找顺序
const CONFIG_PATHS: [&str; 2] = ["config.json", "config/config.json"];

// 默认值函数
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_analysis_endpoint() -> String { "http://127.0.0.1:8000/analyze".to_string() }
fn default_timeout() -> u64 { 120 }
fn default_connect_timeout() -> u64 { 10 }
fn default_max_concurrency() -> usize { 4 }
fn default_item_timeout() -> u64 { 180 }
fn default_max_upload_bytes() -> usize { MAX_UPLOAD_BYTES }
fn default_retention() -> u64 { 24 * 60 * 60 }
fn default_sweep_interval() -> u64 { 5 * 60 }
fn default_stock_list_path() -> String { "stock_list.txt".to_string() }
fn default_poll_interval() -> u64 { 2000 }
fn default_log_level() -> String { "info".to_string() }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            workers: 0,
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            endpoint: default_analysis_endpoint(),
            timeout_secs: default_timeout(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            item_timeout_secs: default_item_timeout(),
            max_upload_bytes: default_max_upload_bytes(),
            retention_secs: default_retention(),
            sweep_interval_secs: default_sweep_interval(),
            stock_list_path: default_stock_list_path(),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl BatchConfig {
    pub fn item_timeout(&self) -> Duration {
        Duration::from_secs(self.item_timeout_secs)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

impl ClientConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

impl AppConfig {
    /// 从 JSON 文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// 查找配置文件，依次检查 `config.json`、`config/config.json`
    pub fn find_config_file() -> Option<&'static str> {
        CONFIG_PATHS.iter().copied().find(|path| Path::new(path).exists())
    }

    /// 从指定文件加载配置，未指定时使用默认值
    ///
    /// 环境变量 `API_KEY` 会覆盖配置文件中的 `api.api_key`。
    /// 文件存在但无法解析时返回错误，不会悄悄退回默认值。
    pub fn load_from(path: Option<&str>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)
                .with_context(|| format!("加载配置文件 {} 失败", path))?,
            None => Self::default(),
        };

        if let Ok(api_key) = std::env::var("API_KEY") {
            config.api.api_key = api_key;
        }
        Ok(config)
    }

    /// 查找并加载配置
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(Self::find_config_file())
    }

    /// 获取服务器绑定地址
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
