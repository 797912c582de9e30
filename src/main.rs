//! # 图标蒙版 worker：宿主桥接入口
//!
//! 本文件仅负责日志初始化、设置加载与桥接启动。
//! 用法：`icon-mask-worker [settings.json]`，stdin/stdout 为 JSON 行协议，日志输出到 stderr。

use std::path::PathBuf;

use icon_mask_worker::error::AppError;
use icon_mask_worker::mask::{MaskConfig, MaskHandler};
use icon_mask_worker::{bridge, settings};

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run().await {
        log::error!("❌ 桥接程序异常退出: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    let mut config = MaskConfig::default();

    if let Some(path) = std::env::args_os().nth(1).map(PathBuf::from) {
        let loaded = settings::load_settings(&path)?;
        settings::apply_settings(&mut config, &loaded)?;
        log::info!("⚙️ 已加载设置文件: {}", path.display());
    }

    let handler = MaskHandler::new(config)?;
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    bridge::run(stdin, tokio::io::stdout(), handler).await
}
