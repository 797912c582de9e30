//! # 渲染画布
//!
//! ## 设计思路
//!
//! 正方形 RGBA 画布，每个请求独占一个，请求结束即丢弃，不做池化。
//! 提供清空、带源裁剪的缩放绘制、像素读回/写回与 PNG 编码。
//!
//! ## 实现思路
//!
//! - 缩放绘制交给 `fast_image_resize`（带 alpha 预乘，源矩形支持小数裁剪）。
//! - 绘制前按画布语义把超出源图的裁剪矩形截断，并按比例修正目标矩形。
//! - 合成使用 `image::imageops::overlay`（source-over），目标位置越界部分自动裁掉。

use std::io::Cursor;

use fast_image_resize as fr;
use image::imageops::FilterType;
use image::{ImageBuffer, ImageFormat, Rgba, RgbaImage};

use super::pixels::CHANNELS;
use super::source::SourceBitmap;
use super::MaskError;

/// 浮点矩形（源坐标或画布坐标）。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }
}

/// 请求独占的渲染画布。
pub struct RenderSurface {
    size: u32,
    canvas: RgbaImage,
    filter: FilterType,
}

impl RenderSurface {
    /// 创建 `size x size` 的透明画布。
    pub fn new(size: u32, max_size: u32, filter: FilterType) -> Result<Self, MaskError> {
        if size == 0 {
            return Err(MaskError::Surface("画布尺寸不能为 0".to_string()));
        }
        if size > max_size {
            return Err(MaskError::Surface(format!(
                "画布尺寸过大：{}（限制：{}）",
                size, max_size
            )));
        }

        Ok(Self {
            size,
            canvas: RgbaImage::new(size, size),
            filter,
        })
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    /// 当前像素（只读视图）。
    pub fn pixels(&self) -> &[u8] {
        self.canvas.as_raw()
    }

    /// 清空为全透明。
    pub fn clear(&mut self) {
        self.canvas.pixels_mut().for_each(|px| *px = Rgba([0, 0, 0, 0]));
    }

    /// 把源图的 `src` 区域缩放绘制到画布的 `dest` 区域。
    pub fn draw_scaled(&mut self, source: &SourceBitmap, src: Rect, dest: Rect) -> Result<(), MaskError> {
        let Some((src, dest)) = clip_to_source(src, dest, source.width(), source.height()) else {
            log::debug!("🫥 源裁剪区域与源图无交集，跳过绘制");
            return Ok(());
        };

        let target_width = (dest.width.round() as u32).max(1);
        let target_height = (dest.height.round() as u32).max(1);

        let mut patch = fr::images::Image::new(target_width, target_height, fr::PixelType::U8x4);
        let options = fr::ResizeOptions::new()
            .resize_alg(fr::ResizeAlg::Convolution(to_fast_filter(self.filter)))
            .crop(src.x, src.y, src.width, src.height);

        let mut resizer = fr::Resizer::new();
        resizer
            .resize(source.image(), &mut patch, Some(&options))
            .map_err(|e| MaskError::Surface(format!("缩放绘制失败：{}", e)))?;

        let patch = ImageBuffer::<Rgba<u8>, Vec<u8>>::from_raw(target_width, target_height, patch.into_vec())
            .ok_or_else(|| MaskError::Surface("缩放输出缓冲长度异常".to_string()))?;

        image::imageops::overlay(
            &mut self.canvas,
            &patch,
            dest.x.round() as i64,
            dest.y.round() as i64,
        );

        Ok(())
    }

    /// 读回像素缓冲（拷贝）。
    pub fn read_pixels(&self) -> Vec<u8> {
        self.canvas.as_raw().clone()
    }

    /// 写回像素缓冲，长度必须与画布一致。
    pub fn write_pixels(&mut self, buffer: Vec<u8>) -> Result<(), MaskError> {
        let expected = self.size as usize * self.size as usize * CHANNELS;
        if buffer.len() != expected {
            return Err(MaskError::Surface(format!(
                "像素缓冲长度异常：{}（期望：{}）",
                buffer.len(),
                expected
            )));
        }

        self.canvas = RgbaImage::from_raw(self.size, self.size, buffer)
            .ok_or_else(|| MaskError::Surface("像素缓冲无法写回画布".to_string()))?;
        Ok(())
    }

    /// 编码为 PNG 字节。
    pub fn encode_png(&self) -> Result<Vec<u8>, MaskError> {
        let mut bytes = Vec::new();
        self.canvas
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .map_err(|e| MaskError::Encode(format!("PNG 编码失败：{}", e)))?;
        Ok(bytes)
    }
}

/// 按画布语义截断源矩形：超出源图的部分不绘制，目标矩形按比例同步收缩。
fn clip_to_source(src: Rect, dest: Rect, source_width: u32, source_height: u32) -> Option<(Rect, Rect)> {
    if src.width <= 0.0 || src.height <= 0.0 || dest.width <= 0.0 || dest.height <= 0.0 {
        return None;
    }

    let scale_x = dest.width / src.width;
    let scale_y = dest.height / src.height;

    let x0 = src.x.max(0.0);
    let y0 = src.y.max(0.0);
    let x1 = (src.x + src.width).min(source_width as f64);
    let y1 = (src.y + src.height).min(source_height as f64);

    if x1 <= x0 || y1 <= y0 {
        return None;
    }

    let clipped_src = Rect::new(x0, y0, x1 - x0, y1 - y0);
    let clipped_dest = Rect::new(
        dest.x + (x0 - src.x) * scale_x,
        dest.y + (y0 - src.y) * scale_y,
        (x1 - x0) * scale_x,
        (y1 - y0) * scale_y,
    );

    Some((clipped_src, clipped_dest))
}

fn to_fast_filter(filter: FilterType) -> fr::FilterType {
    match filter {
        FilterType::Nearest => fr::FilterType::Box,
        FilterType::Triangle => fr::FilterType::Bilinear,
        FilterType::CatmullRom => fr::FilterType::CatmullRom,
        FilterType::Gaussian => fr::FilterType::Mitchell,
        FilterType::Lanczos3 => fr::FilterType::Lanczos3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mask::pixels::bounding_box;

    fn solid_source(width: u32, height: u32, color: [u8; 4]) -> SourceBitmap {
        SourceBitmap::from_rgba(RgbaImage::from_pixel(width, height, Rgba(color)))
    }

    #[test]
    fn rejects_zero_and_oversized_surfaces() {
        assert!(matches!(
            RenderSurface::new(0, 512, FilterType::Triangle),
            Err(MaskError::Surface(_))
        ));
        assert!(matches!(
            RenderSurface::new(1024, 512, FilterType::Triangle),
            Err(MaskError::Surface(_))
        ));
    }

    #[test]
    fn draw_scaled_places_content_at_destination() {
        let source = solid_source(10, 10, [255, 0, 0, 255]);
        let mut surface = RenderSurface::new(32, 512, FilterType::Triangle).expect("surface");

        surface
            .draw_scaled(&source, Rect::new(0.0, 0.0, 10.0, 10.0), Rect::new(8.0, 4.0, 16.0, 20.0))
            .expect("draw should succeed");

        let bbox = bounding_box(surface.pixels(), 32, 32, 128).expect("content drawn");
        assert_eq!((bbox.min_x, bbox.min_y, bbox.max_x, bbox.max_y), (8, 4, 23, 23));
    }

    #[test]
    fn source_crop_outside_bounds_is_clipped() {
        let source = solid_source(10, 10, [255, 255, 255, 255]);
        let mut surface = RenderSurface::new(20, 512, FilterType::Triangle).expect("surface");

        // 源矩形左侧 5 像素落在源图外，对应目标左侧 10 像素不绘制
        surface
            .draw_scaled(&source, Rect::new(-5.0, 0.0, 10.0, 10.0), Rect::new(0.0, 0.0, 20.0, 20.0))
            .expect("draw should succeed");

        let bbox = bounding_box(surface.pixels(), 20, 20, 128).expect("content drawn");
        assert_eq!(bbox.min_x, 10);
        assert_eq!(bbox.max_x, 19);
    }

    #[test]
    fn clear_and_write_back() {
        let source = solid_source(4, 4, [9, 9, 9, 255]);
        let mut surface = RenderSurface::new(8, 512, FilterType::Nearest).expect("surface");
        surface
            .draw_scaled(&source, Rect::new(0.0, 0.0, 4.0, 4.0), Rect::new(0.0, 0.0, 8.0, 8.0))
            .expect("draw should succeed");
        assert!(surface.pixels().chunks_exact(4).any(|px| px[3] > 0));

        surface.clear();
        assert!(surface.pixels().iter().all(|&b| b == 0));

        assert!(matches!(surface.write_pixels(vec![0; 7]), Err(MaskError::Surface(_))));
        let mut buffer = surface.read_pixels();
        buffer[3] = 200;
        surface.write_pixels(buffer).expect("write back should succeed");
        assert_eq!(surface.pixels()[3], 200);
    }

    #[test]
    fn encode_png_roundtrips_through_decoder() {
        let surface = RenderSurface::new(16, 512, FilterType::Triangle).expect("surface");
        let png = surface.encode_png().expect("encode should succeed");

        let decoded = image::load_from_memory(&png).expect("png should decode");
        assert_eq!((decoded.width(), decoded.height()), (16, 16));
    }
}
