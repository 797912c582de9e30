//! # 后台 worker
//!
//! ## 设计思路
//!
//! worker 是一个独立的 tokio 任务，和宿主之间只通过通道交换 JSON 消息，不共享可变内存。
//! 请求按到达顺序逐个处理，同一时刻最多只有一条流水线在跑；需要并行时宿主自行启动多个 worker。
//!
//! ## 实现思路
//!
//! - 入站：`mpsc::Sender<Value>`，宿主可直接转发任意 JSON（无法识别的消息被忽略）。
//! - 出站：`mpsc::Receiver<CreateMaskResult>`，每个请求恰好一条响应。
//! - 状态：`watch` 通道暴露 `Idle` / `Processing`，宿主可订阅。

use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::protocol::{CreateMaskRequest, CreateMaskResult};
use super::{MaskError, MaskHandler, MaskOptions};

/// worker 状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Processing,
}

/// 宿主侧句柄。
///
/// 全部句柄（含克隆）被丢弃后，worker 处理完剩余消息即退出。
#[derive(Clone)]
pub struct WorkerHandle {
    sender: mpsc::Sender<Value>,
    state: watch::Receiver<WorkerState>,
}

impl WorkerHandle {
    /// 投递一条原始消息。
    pub async fn send(&self, message: Value) -> Result<(), MaskError> {
        self.sender
            .send(message)
            .await
            .map_err(|_| MaskError::Internal("worker 已退出".to_string()))
    }

    /// 构造并投递一条 `create-mask` 请求。
    pub async fn create_mask(
        &self,
        id: Value,
        icon_url: &str,
        options: &MaskOptions,
    ) -> Result<(), MaskError> {
        let request = CreateMaskRequest::new(id, icon_url, options)?;
        self.send(request.to_message()).await
    }

    /// 当前状态。
    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    /// 订阅状态变化。
    pub fn subscribe_state(&self) -> watch::Receiver<WorkerState> {
        self.state.clone()
    }
}

/// 后台 worker。
pub struct MaskWorker {
    handler: MaskHandler,
    receiver: mpsc::Receiver<Value>,
    responder: mpsc::Sender<CreateMaskResult>,
    state: watch::Sender<WorkerState>,
}

impl MaskWorker {
    /// 启动 worker，返回句柄、响应通道与任务句柄。
    ///
    /// 必须在 tokio 运行时内调用。
    pub fn spawn(
        handler: MaskHandler,
    ) -> Result<(WorkerHandle, mpsc::Receiver<CreateMaskResult>, JoinHandle<()>), MaskError> {
        let capacity = handler.config_snapshot()?.worker_queue_capacity;

        let (sender, receiver) = mpsc::channel(capacity);
        let (responder, responses) = mpsc::channel(capacity);
        let (state, state_rx) = watch::channel(WorkerState::Idle);

        let worker = Self {
            handler,
            receiver,
            responder,
            state,
        };
        let task = tokio::spawn(worker.run());

        log::info!("🚀 蒙版 worker 已启动（队列容量: {}）", capacity);

        Ok((
            WorkerHandle {
                sender,
                state: state_rx,
            },
            responses,
            task,
        ))
    }

    /// 消息循环。
    async fn run(mut self) {
        while let Some(message) = self.receiver.recv().await {
            let Some(request) = CreateMaskRequest::from_message(&message) else {
                log::warn!("⚠️ 忽略无法识别的消息");
                continue;
            };

            self.state.send_replace(WorkerState::Processing);
            let result = self.process(request).await;

            let delivered = self.responder.send(result).await.is_ok();
            self.state.send_replace(WorkerState::Idle);

            if !delivered {
                log::warn!("⚠️ 响应通道已关闭，worker 退出");
                break;
            }
        }

        log::info!("🛑 蒙版 worker 已退出");
    }

    async fn process(&self, request: CreateMaskRequest) -> CreateMaskResult {
        let outcome = match (request.icon_url(), request.options()) {
            (Ok(icon_url), Ok(options)) => self.handler.create_mask(icon_url, &options).await,
            (Err(e), _) | (_, Err(e)) => Err(e),
        };

        match outcome {
            Ok(data_url) => CreateMaskResult::success(request.id, data_url),
            Err(e) => {
                log::error!(
                    "❌ 蒙版生成失败 - id={} code={} stage={}: {}",
                    request.id,
                    e.code(),
                    e.stage(),
                    e
                );
                CreateMaskResult::failure(request.id, &e)
            }
        }
    }
}
