//! 批次提交与进度轮询
//!
//! 状态机：Idle → Submitting → Polling → Terminal(Completed | Failed)
//!
//! 每个轮询会话只有一个后台任务，请求在任务内顺序等待，不会并发；
//! 进入终态、调用 `cancel` 或丢弃 `PollSession` 后不再发出任何请求。

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::api::BatchApi;
use super::ClientError;
use crate::models::{BatchResultsView, BatchStatus, BatchStatusView};
use crate::services::upload::{validate_upload, MAX_UPLOAD_BYTES};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalState {
    Completed,
    Failed,
}

/// 客户端状态
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollerState {
    Idle,
    Submitting,
    Polling { batch_id: String },
    Terminal(TerminalState),
}

/// 轮询过程中产生的事件
#[derive(Debug, Clone)]
pub enum PollEvent {
    /// 每次状态查询的结果
    Progress(BatchStatusView),
    /// 批次完成，附带全部结果
    Completed(BatchResultsView),
    /// 批次失败或轮询出错
    Failed { batch_id: String, message: String },
}

pub struct ClientPoller {
    api: Arc<dyn BatchApi>,
    interval: Duration,
    max_upload_bytes: usize,
    state: Arc<watch::Sender<PollerState>>,
}

impl ClientPoller {
    pub fn new(api: Arc<dyn BatchApi>, interval: Duration) -> Self {
        let (state, _) = watch::channel(PollerState::Idle);
        Self {
            api,
            interval,
            max_upload_bytes: MAX_UPLOAD_BYTES,
            state: Arc::new(state),
        }
    }

    pub fn with_max_upload_bytes(mut self, max_upload_bytes: usize) -> Self {
        self.max_upload_bytes = max_upload_bytes;
        self
    }

    /// 当前状态快照
    pub fn state(&self) -> PollerState {
        self.state.borrow().clone()
    }

    /// 订阅状态变化
    pub fn subscribe(&self) -> watch::Receiver<PollerState> {
        self.state.subscribe()
    }

    /// 没有进行中的批次时把状态置为 `next`，检查和修改是一步完成的
    fn claim(&self, next: PollerState) -> Result<(), ClientError> {
        let claimed = self.state.send_if_modified(|state| match state {
            PollerState::Idle | PollerState::Terminal(_) => {
                *state = next;
                true
            }
            PollerState::Submitting | PollerState::Polling { .. } => false,
        });
        if claimed {
            Ok(())
        } else {
            Err(ClientError::InvalidInput("已有批次正在处理".to_string()))
        }
    }

    /// 校验并提交股票列表，成功后开始轮询
    ///
    /// 本地校验失败时不发起任何请求，状态回到 Idle
    pub async fn submit(
        &self,
        filename: Option<&str>,
        data: Vec<u8>,
        chart_type: &str,
    ) -> Result<PollSession, ClientError> {
        self.claim(PollerState::Submitting)?;

        if let Err(e) = validate_upload(filename, data.len(), self.max_upload_bytes) {
            self.state.send_replace(PollerState::Idle);
            return Err(ClientError::InvalidInput(e.to_string()));
        }
        let filename = filename.unwrap_or_default().trim();

        match self.api.submit_batch(filename, data, chart_type).await {
            Ok(response) => {
                log::info!("批次已提交: {} ({})", response.batch_id, response.message);
                self.state.send_replace(PollerState::Polling {
                    batch_id: response.batch_id.clone(),
                });
                Ok(self.spawn_session(response.batch_id))
            }
            Err(e) => {
                log::error!("提交批次失败: {}", e);
                self.state.send_replace(PollerState::Idle);
                Err(e)
            }
        }
    }

    /// 对已有批次开始轮询，同一时间只允许一个会话
    pub fn poll(&self, batch_id: String) -> Result<PollSession, ClientError> {
        self.claim(PollerState::Polling {
            batch_id: batch_id.clone(),
        })?;
        Ok(self.spawn_session(batch_id))
    }

    fn spawn_session(&self, batch_id: String) -> PollSession {
        let (tx, events) = mpsc::unbounded_channel();
        let handle = tokio::spawn(poll_loop(
            self.api.clone(),
            batch_id.clone(),
            self.interval,
            self.state.clone(),
            tx,
        ));

        PollSession {
            batch_id,
            events,
            handle,
            state: self.state.clone(),
        }
    }
}

async fn poll_loop(
    api: Arc<dyn BatchApi>,
    batch_id: String,
    interval: Duration,
    state: Arc<watch::Sender<PollerState>>,
    tx: mpsc::UnboundedSender<PollEvent>,
) {
    let fail = |message: String| {
        state.send_replace(PollerState::Terminal(TerminalState::Failed));
        let _ = tx.send(PollEvent::Failed {
            batch_id: batch_id.clone(),
            message,
        });
    };

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let status = match api.fetch_status(&batch_id).await {
            Ok(status) => status,
            Err(e) => {
                log::error!("查询批次 {} 状态失败，停止轮询: {}", batch_id, e);
                fail(e.to_string());
                return;
            }
        };

        log::debug!(
            "批次 {} {}: {:.1}% ({}/{})",
            batch_id,
            status.status.label(),
            status.progress,
            status.completed + status.failed,
            status.total
        );
        let current = status.status;
        let failure_message = status.error.clone().unwrap_or_else(|| {
            format!("批次失败：成功 {} 只，失败 {} 只", status.completed, status.failed)
        });
        let _ = tx.send(PollEvent::Progress(status));

        match current {
            BatchStatus::Completed => {
                match api.fetch_results(&batch_id).await {
                    Ok(results) => {
                        state.send_replace(PollerState::Terminal(TerminalState::Completed));
                        let _ = tx.send(PollEvent::Completed(results));
                    }
                    Err(e) => {
                        log::error!("获取批次 {} 结果失败: {}", batch_id, e);
                        fail(e.to_string());
                    }
                }
                return;
            }
            BatchStatus::Failed => {
                log::warn!("批次 {} 失败: {}", batch_id, failure_message);
                fail(failure_message);
                return;
            }
            BatchStatus::Waiting | BatchStatus::Running => {}
        }
    }
}

/// 一次轮询会话
///
/// 丢弃时取消后台任务
pub struct PollSession {
    batch_id: String,
    events: mpsc::UnboundedReceiver<PollEvent>,
    handle: JoinHandle<()>,
    state: Arc<watch::Sender<PollerState>>,
}

impl PollSession {
    pub fn batch_id(&self) -> &str {
        &self.batch_id
    }

    /// 下一个事件；轮询结束后返回 None
    pub async fn next_event(&mut self) -> Option<PollEvent> {
        self.events.recv().await
    }

    /// 等待轮询结束，返回最后一个事件
    pub async fn wait(mut self) -> Option<PollEvent> {
        let mut last = None;
        while let Some(event) = self.events.recv().await {
            last = Some(event);
        }
        last
    }

    pub fn cancel(self) {}
}

impl Drop for PollSession {
    fn drop(&mut self) {
        if self.handle.is_finished() {
            return;
        }
        self.handle.abort();
        let batch_id = &self.batch_id;
        self.state.send_if_modified(|state| match state {
            PollerState::Polling { batch_id: current } if current.as_str() == batch_id.as_str() => {
                *state = PollerState::Idle;
                true
            }
            _ => false,
        });
        log::info!("已取消批次 {} 的轮询", self.batch_id);
    }
}
