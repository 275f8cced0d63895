//! 批量分析客户端
//!
//! `api` 负责与后端通信，`poller` 负责提交批次并按固定间隔轮询进度

pub mod api;
pub mod poller;

pub use api::{BatchApi, HttpBatchApi};
pub use poller::{ClientPoller, PollEvent, PollSession, PollerState, TerminalState};

/// 客户端错误
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// 本地校验失败，未发起请求
    #[error("{0}")]
    InvalidInput(String),

    #[error("批次不存在: {0}")]
    NotFound(String),

    /// 服务端返回的非 2xx 响应
    #[error("服务端错误 {status}: {message}")]
    Api { status: u16, message: String },

    #[error("请求失败: {0}")]
    Http(#[from] reqwest::Error),

    #[error("响应解析失败: {0}")]
    Decode(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
