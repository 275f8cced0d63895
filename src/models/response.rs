//! 通用 API 响应模型
//!
//! 成功时直接返回业务对象，失败时统一返回 `{error, timestamp}`

use chrono::{DateTime, Utc};
use chrono_tz::Asia::Shanghai;
use serde::{Deserialize, Serialize};

/// 转换为北京时间字符串（ISO 8601 格式，带+08:00时区）
pub fn to_beijing_time(time: DateTime<Utc>) -> String {
    time.with_timezone(&Shanghai).to_rfc3339()
}

/// 获取当前北京时间字符串
pub fn get_beijing_time() -> String {
    to_beijing_time(Utc::now())
}

/// 错误响应结构
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// 错误信息
    pub error: String,
    /// 响应时间戳（北京时间）
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            timestamp: get_beijing_time(),
        }
    }
}

/// 健康检查响应
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
}
