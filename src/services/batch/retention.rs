//! 过期批次清理

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::store::BatchJobStore;

/// 启动后台清理任务，定期删除结束时间超过 `retention` 的批次
pub fn spawn_retention_sweeper(
    store: Arc<BatchJobStore>,
    retention: Duration,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let evicted = store.evict_expired(retention).await;
            if evicted > 0 {
                log::info!("已清理 {} 个过期批次", evicted);
            }
        }
    })
}
