//! 统一错误类型模块
//!
//! # 设计思路
//!
//! `MaskError` 只描述单次蒙版请求的失败，它会被转换为协议里的 `error` 文案；
//! 宿主桥接程序自身的失败（读 stdin、写 stdout、设置文件、worker 任务异常）由 `AppError` 承载。
//!
//! # 实现思路
//!
//! - 使用 `thiserror` 派生可读错误消息。
//! - 为 `MaskError`、`std::io::Error`、`serde_json::Error` 提供 `From` 转换，`?` 直接可用。

use crate::mask::MaskError;

/// 应用级统一错误类型。
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// 蒙版流水线错误
    #[error("{0}")]
    Mask(#[from] MaskError),

    /// 标准输入输出或文件读写失败
    #[error("I/O 错误: {0}")]
    Io(#[from] std::io::Error),

    /// JSON 序列化失败
    #[error("JSON 错误: {0}")]
    Json(#[from] serde_json::Error),

    /// 设置文件内容非法
    #[error("设置错误: {0}")]
    Settings(String),

    /// worker 或写出任务异常结束
    #[error("后台任务异常: {0}")]
    Task(String),
}
