//! # 标准输入输出桥接
//!
//! ## 设计思路
//!
//! 让 worker 可以作为子进程托管：stdin 每行一条 JSON 消息，stdout 每行一条 JSON 响应。
//! 不引入新的协议，行内容就是 worker 的消息本身；日志走 stderr，不会污染输出。
//!
//! ## 实现思路
//!
//! - 读取循环把每行解析为 JSON 后原样投递给 worker，解析失败的行记录警告后忽略。
//! - 写出单独起一个任务，持续把响应写成一行，避免读写互相阻塞。
//! - 输入结束后丢弃句柄，worker 处理完剩余请求自然退出，写出任务随之结束。

use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::AppError;
use crate::mask::{MaskHandler, MaskWorker};

/// 运行桥接直到输入结束且所有响应写出。
pub async fn run<R, W>(input: R, mut output: W, handler: MaskHandler) -> Result<(), AppError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (handle, mut responses, worker_task) = MaskWorker::spawn(handler)?;

    let writer_task = tokio::spawn(async move {
        let mut written = 0usize;
        while let Some(result) = responses.recv().await {
            let mut line = serde_json::to_string(&result)?;
            line.push('\n');
            output.write_all(line.as_bytes()).await?;
            output.flush().await?;
            written += 1;
        }
        output.shutdown().await?;
        Ok::<usize, AppError>(written)
    });

    let mut lines = input.lines();
    let mut forwarded = 0usize;
    while let Some(line) = lines.next_line().await? {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        match serde_json::from_str::<Value>(trimmed) {
            Ok(message) => {
                handle.send(message).await?;
                forwarded += 1;
            }
            Err(e) => log::warn!("⚠️ 忽略无法解析的输入行: {}", e),
        }
    }
    drop(handle);

    worker_task
        .await
        .map_err(|e| AppError::Task(format!("worker 任务异常结束: {}", e)))?;
    let written = writer_task
        .await
        .map_err(|e| AppError::Task(format!("写出任务异常结束: {}", e)))??;

    log::info!("📭 输入结束 - 转发消息 {} 条，写出响应 {} 条", forwarded, written);
    Ok(())
}
