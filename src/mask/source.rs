//! # 数据源与中间模型
//!
//! ## 设计思路
//!
//! 将“外部输入类型”和“流水线中间结果”解耦：
//! - `IconSource` 表示 `iconUrl` 的来源语义
//! - `RawImageData` 表示已加载但未解码的字节
//! - `SourceBitmap` 表示已解码、请求独占的 RGBA 位图

use image::{DynamicImage, RgbaImage};

use super::MaskError;

/// 图标来源（由 `iconUrl` 解析而来）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IconSource {
    /// `http://` / `https://` 网络地址。
    Url(String),
    /// `data:image/*;base64,...` 内联数据。
    DataUrl(String),
}

impl IconSource {
    /// 根据前缀识别来源，不支持的协议直接拒绝。
    pub fn parse(icon_url: &str) -> Result<Self, MaskError> {
        let trimmed = icon_url.trim();
        if trimmed.is_empty() {
            return Err(MaskError::InvalidFormat("iconUrl 为空".to_string()));
        }

        let lower = trimmed.get(..8).unwrap_or(trimmed).to_ascii_lowercase();
        if lower.starts_with("data:") {
            return Ok(Self::DataUrl(trimmed.to_string()));
        }
        if lower.starts_with("http://") || lower.starts_with("https://") {
            return Ok(Self::Url(trimmed.to_string()));
        }

        Err(MaskError::InvalidFormat("仅支持 HTTP/HTTPS 或 data: 图标地址".to_string()))
    }

    /// 日志用的简短描述，不泄露查询参数与内联数据。
    pub fn describe(&self) -> String {
        match self {
            Self::Url(url) => super::loader::redact_url_for_log(url),
            Self::DataUrl(data) => format!("<data-url {} bytes>", data.len()),
        }
    }
}

/// 加载阶段输出：原始字节与来源标识。
pub(crate) struct RawImageData {
    /// 原始图片字节。
    pub(crate) bytes: Vec<u8>,
    /// 来源提示（用于日志与诊断）。
    pub(crate) source_hint: &'static str,
}

/// 解码后的源位图。
///
/// 只在单个请求内存活，请求结束（成功或失败）时随所有权一起释放。
pub struct SourceBitmap {
    image: DynamicImage,
}

impl SourceBitmap {
    pub fn from_rgba(rgba: RgbaImage) -> Self {
        Self {
            image: DynamicImage::ImageRgba8(rgba),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// 供缩放绘制使用的底层图像（始终为 RGBA8）。
    pub(crate) fn image(&self) -> &DynamicImage {
        &self.image
    }
}

impl Drop for SourceBitmap {
    fn drop(&mut self) {
        log::debug!("🧹 释放源位图 - {}x{}", self.image.width(), self.image.height());
    }
}
