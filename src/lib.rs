//! 股票图表批量分析服务
//!
//! 服务端接收股票列表文件，按批次并发调用图表分析服务；
//! 客户端提交批次并轮询进度，结束后下载结果。

pub mod client;
pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod state;
