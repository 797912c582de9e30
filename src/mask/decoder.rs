//! # 解码模块
//!
//! ## 设计思路
//!
//! 将“字节 → 源位图”的过程集中管理，并在完整解码前先读 header 尺寸做资源上限检查，
//! 降低恶意输入（超大尺寸的小文件）触发高内存开销的风险。
//!
//! ## 实现思路
//!
//! 1. 猜测格式并读取 header 尺寸
//! 2. 按像素上限与预计内存上限快速拒绝
//! 3. 完整解码，再次校验真实尺寸
//! 4. 统一转换为 RGBA8 并校验字节长度

use image::{GenericImageView, ImageReader};
use std::io::Cursor;

use super::source::{RawImageData, SourceBitmap};
use super::{MaskConfig, MaskError, MaskHandler};

impl MaskHandler {
    /// 将原始字节解码为源位图。
    pub(crate) fn decode_source(
        &self,
        raw: RawImageData,
        config: &MaskConfig,
    ) -> Result<SourceBitmap, MaskError> {
        image::guess_format(&raw.bytes)
            .map_err(|e| MaskError::InvalidFormat(format!("不支持的图片格式：{}", e)))?;

        let (header_width, header_height) = Self::inspect_dimensions_from_memory(&raw.bytes)?;
        Self::validate_pixel_limits(config, header_width, header_height)?;
        Self::validate_decoded_memory_limits(config, header_width, header_height)?;

        let decoded = image::load_from_memory(&raw.bytes)
            .map_err(|e| MaskError::Decode(format!("图片解码失败：{}", e)))?;

        let (width, height) = decoded.dimensions();
        if width == 0 || height == 0 {
            return Err(MaskError::Decode("图片尺寸为 0".to_string()));
        }
        Self::validate_pixel_limits(config, width, height)?;
        Self::validate_decoded_memory_limits(config, width, height)?;

        let rgba = decoded.into_rgba8();
        let expected_len = (width as usize)
            .checked_mul(height as usize)
            .and_then(|pixels| pixels.checked_mul(4))
            .ok_or_else(|| MaskError::ResourceLimit("图片尺寸导致内存溢出风险".to_string()))?;

        if rgba.as_raw().len() != expected_len {
            return Err(MaskError::Decode("解码后像素数据长度异常".to_string()));
        }

        log::debug!(
            "✅ 图片解码成功 - 来源: {} 尺寸: {}x{}",
            raw.source_hint,
            width,
            height
        );

        Ok(SourceBitmap::from_rgba(rgba))
    }

    /// 仅通过图片头信息读取宽高。
    fn inspect_dimensions_from_memory(bytes: &[u8]) -> Result<(u32, u32), MaskError> {
        let reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| MaskError::InvalidFormat(format!("无法识别图片格式：{}", e)))?;

        reader
            .into_dimensions()
            .map_err(|e| MaskError::Decode(format!("无法读取图片尺寸：{}", e)))
    }

    fn validate_pixel_limits(config: &MaskConfig, width: u32, height: u32) -> Result<(), MaskError> {
        let pixels = (width as u64)
            .checked_mul(height as u64)
            .ok_or_else(|| MaskError::ResourceLimit("图片像素数溢出".to_string()))?;

        if pixels > config.max_decoded_pixels {
            return Err(MaskError::ResourceLimit(format!(
                "图片像素过大：{} 像素（限制：{} 像素）",
                pixels, config.max_decoded_pixels
            )));
        }

        Ok(())
    }

    fn validate_decoded_memory_limits(
        config: &MaskConfig,
        width: u32,
        height: u32,
    ) -> Result<(), MaskError> {
        let estimated = (width as u64)
            .checked_mul(height as u64)
            .and_then(|pixels| pixels.checked_mul(4))
            .ok_or_else(|| MaskError::ResourceLimit("图片解码内存估算溢出".to_string()))?;

        if estimated > config.max_decoded_bytes {
            return Err(MaskError::ResourceLimit(format!(
                "图片解码预计内存过大：{:.2} MB（限制：{:.2} MB）",
                estimated as f64 / 1024.0 / 1024.0,
                config.max_decoded_bytes as f64 / 1024.0 / 1024.0
            )));
        }

        Ok(())
    }
}
