//! # 输出编码
//!
//! PNG 字节按 32 KiB 分块送入流式 base64 编码器，再拼成 `data:` URL。
//! 编码器内部会把不足 3 字节的尾巴留到下一块，因此分块结果与整体编码逐字节一致。

use base64::engine::general_purpose::STANDARD;
use base64::write::EncoderStringWriter;
use std::io::Write;

use super::MaskError;
use super::surface::RenderSurface;

/// 单次送入编码器的字节数。
pub const CHUNK_SIZE: usize = 32_768;

/// 输出图片的 MIME 类型。
pub const OUTPUT_MIME: &str = "image/png";

/// 分块 base64 编码。
pub fn encode_base64_chunked(bytes: &[u8]) -> Result<String, MaskError> {
    let mut writer = EncoderStringWriter::new(&STANDARD);
    for chunk in bytes.chunks(CHUNK_SIZE) {
        writer
            .write_all(chunk)
            .map_err(|e| MaskError::Encode(format!("base64 编码失败：{}", e)))?;
    }
    Ok(writer.into_inner())
}

/// 组装 `data:<mime>;base64,<payload>`。
pub fn to_data_url(mime: &str, bytes: &[u8]) -> Result<String, MaskError> {
    let encoded = encode_base64_chunked(bytes)?;
    let mut url = String::with_capacity(5 + mime.len() + 8 + encoded.len());
    url.push_str("data:");
    url.push_str(mime);
    url.push_str(";base64,");
    url.push_str(&encoded);
    Ok(url)
}

/// 画布 → PNG → data URL。
pub fn encode_surface(surface: &RenderSurface) -> Result<String, MaskError> {
    let png = surface.encode_png()?;
    log::debug!("📦 PNG 编码完成 - {} bytes", png.len());
    to_data_url(OUTPUT_MIME, &png)
}
