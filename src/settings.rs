//! 桥接程序的设置文件：一个可选的 JSON 对象，字段均可省略，省略时沿用默认配置。
//!
//! ```json
//! { "allowPrivateNetwork": false, "resampleProfile": "balanced", "maxFileSize": 10485760 }
//! ```

use std::fs;
use std::path::Path;

use serde_json::Value;

use crate::error::AppError;
use crate::mask::{MaskConfig, ResampleProfile};

/// 读取设置文件。
pub fn load_settings(path: &Path) -> Result<Value, AppError> {
    let content = fs::read_to_string(path)?;
    let parsed = serde_json::from_str::<Value>(&content)
        .map_err(|e| AppError::Settings(format!("解析设置文件失败: {}", e)))?;

    if !parsed.is_object() {
        return Err(AppError::Settings("设置文件必须是 JSON 对象".to_string()));
    }
    Ok(parsed)
}

/// 把设置覆盖到配置上，最后统一校验。
pub fn apply_settings(config: &mut MaskConfig, settings: &Value) -> Result<(), AppError> {
    if let Some(value) = settings.get("allowPrivateNetwork") {
        config.allow_private_network = value
            .as_bool()
            .ok_or_else(|| AppError::Settings("allowPrivateNetwork 必须是布尔值".to_string()))?;
    }

    if let Some(value) = settings.get("resampleProfile") {
        let name = value
            .as_str()
            .ok_or_else(|| AppError::Settings("resampleProfile 必须是字符串".to_string()))?;
        config.apply_resample_profile(ResampleProfile::from_str(name)?);
    }

    if let Some(v) = read_u64(settings, "maxFileSize")? {
        config.max_file_size = v;
    }
    if let Some(v) = read_u64(settings, "downloadTimeout")? {
        config.download_timeout = v;
    }
    if let Some(v) = read_u64(settings, "connectTimeout")? {
        config.connect_timeout = v;
    }
    if let Some(v) = read_u64(settings, "maxDecodedPixels")? {
        config.max_decoded_pixels = v;
    }
    if let Some(v) = read_u64(settings, "maxSurfaceSize")? {
        config.max_surface_size = u32::try_from(v)
            .map_err(|_| AppError::Settings("maxSurfaceSize 超出范围".to_string()))?;
    }
    if let Some(v) = read_u64(settings, "workerQueueCapacity")? {
        config.worker_queue_capacity = usize::try_from(v)
            .map_err(|_| AppError::Settings("workerQueueCapacity 超出范围".to_string()))?;
    }

    config.validate()?;
    Ok(())
}

fn read_u64(settings: &Value, key: &str) -> Result<Option<u64>, AppError> {
    match settings.get(key) {
        None => Ok(None),
        Some(value) => value
            .as_u64()
            .map(Some)
            .ok_or_else(|| AppError::Settings(format!("{} 必须是非负整数", key))),
    }
}
