//! # 图标蒙版 worker：库入口
//!
//! ## 架构总览
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                 宿主（主线程 / 父进程）                   │
//! │                                                          │
//! │   create-mask { id, iconUrl, options }                   │
//! │        ↓                          ↑                      │
//! └────────┼──────────────────────────┼──────────────────────┘
//!          ↓  mpsc / stdin 行          ↑  mpsc / stdout 行
//! ┌────────┼──────────────────────────┼──────────────────────┐
//! │        ↓          worker (Rust)   ↑                      │
//! │                                                          │
//! │  ┌─ bridge ─────── stdio JSON 行 ↔ worker 通道            │
//! │  ├─ settings ───── 设置文件 → MaskConfig                 │
//! │  ├─ error ──────── AppError（桥接程序）                   │
//! │  └─ mask                                                 │
//! │      ├─ worker / protocol   消息识别 · 状态 · 响应        │
//! │      ├─ handler             配置快照 · 阶段耗时           │
//! │      ├─ loader / decoder    下载 · data URL · 解码限制    │
//! │      ├─ fitter / normalize  两轮适配 · 亮度归一化         │
//! │      ├─ brightness          平均不透明度重定向            │
//! │      ├─ transform / script  内置变换 · Rhai 自定义变换    │
//! │      └─ encoder             PNG · 分块 base64            │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## 模块职责
//!
//! | 模块 | 职责 |
//! |------|------|
//! | [`mask`] | 图标 → 单色蒙版的完整流水线与 worker |
//! | [`bridge`] | 以 stdin/stdout JSON 行托管一个 worker |
//! | [`settings`] | 读取并应用桥接程序的 JSON 设置文件 |
//! | [`error`] | 桥接程序级错误类型 `AppError` |

pub mod bridge;
pub mod error;
pub mod mask;
pub mod settings;
