//! 错误类型
//!
//! 批量分析链路上的错误分类，以及到 HTTP 状态码的映射。
//! 单只股票的分析失败不属于这里，它作为 `ItemOutcome::Failure` 记录在结果中。

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use thiserror::Error;

use crate::models::{BatchStatus, ErrorResponse};

#[derive(Debug, Error)]
pub enum BatchError {
    /// 请求参数或上传文件不合法，在创建任务之前拒绝
    #[error("{0}")]
    InvalidInput(String),
    #[error("批次不存在: {0}")]
    NotFound(String),
    #[error("批次尚未结束: {0}")]
    JobNotTerminal(String),
    #[error("非法的状态迁移: {from} -> {to}")]
    InvalidStateTransition { from: BatchStatus, to: BatchStatus },
    /// 任务级故障，整个批次提前结束
    #[error("批次执行失败: {0}")]
    JobFailure(String),
    #[error("内部错误: {0}")]
    Internal(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("结果打包失败: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("结果序列化失败: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, BatchError>;

impl ResponseError for BatchError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::JobNotTerminal(_) => StatusCode::CONFLICT,
            Self::JobFailure(_) => StatusCode::BAD_GATEWAY,
            Self::InvalidStateTransition { .. }
            | Self::Internal(_)
            | Self::Io(_)
            | Self::Zip(_)
            | Self::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            log::error!("请求处理失败: {}", self);
        }
        HttpResponse::build(status).json(ErrorResponse::new(self.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_code_mapping() {
        assert_eq!(
            BatchError::InvalidInput("空文件".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            BatchError::NotFound("batch_x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            BatchError::JobNotTerminal("batch_x".into()).status_code(),
            StatusCode::CONFLICT
        );
        let err = BatchError::InvalidStateTransition {
            from: BatchStatus::Completed,
            to: BatchStatus::Running,
        };
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_string(), "非法的状态迁移: completed -> running");
    }
}
