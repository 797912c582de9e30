//! # 图标蒙版模块（mask）
//!
//! ## 设计思路
//!
//! 把“任意颜色、任意比例、可能带透明留白”的图标转换为紧凑裁剪的白色单色蒙版，
//! 可选地再经过一条像素变换流水线着色，最终以 `data:image/png;base64,...` 返回。
//!
//! 各职责拆分为独立子模块：
//!
//! - `pixels`：像素缓冲基础函数（亮度、包围盒、截断、HSV）
//! - `normalize`：亮度拉伸 + 对比度 + 反相，生成白色剪影
//! - `surface`：请求独占的正方形画布
//! - `fitter`：两轮内容感知适配
//! - `brightness`：平均不透明度重定向
//! - `transform` / `script`：内置变换与 Rhai 自定义变换
//! - `encoder`：PNG + 分块 base64
//! - `loader` / `decoder`：图标加载、校验、解码
//! - `handler`：整条流水线编排 + 阶段耗时日志
//! - `protocol` / `worker`：消息协议与后台任务
//!
//! ## 调用链
//!
//! ```text
//! 宿主消息
//!    ↓
//! worker.rs（识别请求、状态切换、回传响应）
//!    ↓
//! handler.rs（配置快照 + 编排）
//!    ├─ loader.rs（URL / data URL 加载 + 安全校验）
//!    └─ spawn_blocking
//!         ├─ decoder.rs（解码 + 资源限制）
//!         ├─ fitter.rs（首轮适配 → normalize → 包围盒 → 二次裁剪 → normalize）
//!         ├─ brightness.rs（可选）
//!         ├─ transform.rs（可选，逐步读回/写回）
//!         └─ encoder.rs
//!    ↓
//! create-mask-result
//! ```

pub mod brightness;
mod config;
mod decoder;
pub mod encoder;
mod error;
pub mod fitter;
mod handler;
mod loader;
pub mod normalize;
pub mod pixels;
pub mod protocol;
mod script;
mod source;
pub mod surface;
pub mod transform;
pub mod worker;

pub use config::{DEFAULT_CONTRAST, DEFAULT_MASK_SIZE, MaskConfig, MaskOptions, ResampleProfile};
pub use error::MaskError;
pub use handler::MaskHandler;
pub use protocol::{CreateMaskRequest, CreateMaskResult};
pub use script::ScriptError;
pub use source::{IconSource, SourceBitmap};
pub use surface::{Rect, RenderSurface};
pub use transform::{Transform, TransformStep};
pub use worker::{MaskWorker, WorkerHandle, WorkerState};
