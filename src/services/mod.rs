//! 业务逻辑服务模块
//!
//! 封装批量分析的任务管理和外部分析服务调用

pub mod analysis; // 图表分析服务
pub mod batch;    // 批量分析任务
pub mod upload;   // 股票列表校验与解析
