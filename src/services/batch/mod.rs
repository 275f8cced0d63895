//! 批量分析
//!
//! - `store`: 批次记录的唯一持有者
//! - `runner`: 提交与并发执行
//! - `status`: 只读查询
//! - `artifact`: 结果打包
//! - `retention`: 过期清理

pub mod artifact;
pub mod retention;
pub mod runner;
pub mod status;
pub mod store;

pub use artifact::DownloadArtifact;
pub use retention::spawn_retention_sweeper;
pub use runner::BatchRunner;
pub use status::BatchStatusService;
pub use store::BatchJobStore;
