//! # 内容感知适配
//!
//! ## 设计思路
//!
//! 图标常带透明留白且比例各异。首轮按“留边信箱”方式放入画布并归一化，
//! 再用包围盒找到真实内容，回到**原始源图**重新裁剪放大，避免在已缩小的画布上二次采样。
//!
//! ## 实现思路
//!
//! 1. `scale = min(size/w, size/h) * 0.85`，居中绘制 → 归一化（第一轮）
//! 2. `clip` 开启时按阈值 20 求包围盒，四周扩 1 像素
//! 3. 反推到源图坐标，`new_scale = size / max(box_w, box_h) * 0.95`，居中重绘 → 归一化（第二轮）
//! 4. 找不到包围盒时保留第一轮结果

use super::normalize::normalize_mask;
use super::pixels::{BoundingBox, CROP_ALPHA_THRESHOLD, bounding_box};
use super::source::SourceBitmap;
use super::surface::{Rect, RenderSurface};
use super::{MaskError, MaskOptions};

/// 首轮绘制的留边系数。
const INITIAL_FIT_RATIO: f64 = 0.85;
/// 二次裁剪后的填充系数。
const CLIPPED_FIT_RATIO: f64 = 0.95;
/// 包围盒向外扩展的像素数。
const CLIP_MARGIN: u32 = 1;

/// 首轮绘制的仿射参数（源坐标 → 画布坐标）。
#[derive(Debug, Clone, Copy)]
struct Placement {
    scale: f64,
    offset_x: f64,
    offset_y: f64,
}

impl Placement {
    fn centered(content_width: f64, content_height: f64, canvas: f64, ratio: f64) -> Self {
        let scale = (canvas / content_width).min(canvas / content_height) * ratio;
        Self {
            scale,
            offset_x: (canvas - content_width * scale) / 2.0,
            offset_y: (canvas - content_height * scale) / 2.0,
        }
    }

    /// 画布上的包围盒映射回源图坐标。
    fn to_source(&self, bbox: BoundingBox) -> Rect {
        Rect::new(
            (bbox.min_x as f64 - self.offset_x) / self.scale,
            (bbox.min_y as f64 - self.offset_y) / self.scale,
            bbox.width() as f64 / self.scale,
            bbox.height() as f64 / self.scale,
        )
    }
}

/// 把源图适配进画布并生成蒙版，结果留在 `surface` 中。
pub fn fit_and_mask(
    source: &SourceBitmap,
    surface: &mut RenderSurface,
    options: &MaskOptions,
) -> Result<(), MaskError> {
    let size = surface.size();
    let canvas = size as f64;
    let source_width = source.width() as f64;
    let source_height = source.height() as f64;

    let first = Placement::centered(source_width, source_height, canvas, INITIAL_FIT_RATIO);
    surface.clear();
    surface.draw_scaled(
        source,
        Rect::new(0.0, 0.0, source_width, source_height),
        Rect::new(
            first.offset_x,
            first.offset_y,
            source_width * first.scale,
            source_height * first.scale,
        ),
    )?;

    let mut buffer = surface.read_pixels();
    normalize_mask(&mut buffer, options.contrast, options.invert);

    if !options.clip {
        return surface.write_pixels(buffer);
    }

    let Some(bbox) = bounding_box(&buffer, size, size, CROP_ALPHA_THRESHOLD) else {
        log::debug!("🫥 未找到内容包围盒，保留首轮结果");
        return surface.write_pixels(buffer);
    };

    let expanded = bbox.expand_within(CLIP_MARGIN, size, size);
    let crop = first.to_source(expanded);
    log::debug!(
        "✂️ 内容包围盒 {:?} → 源图裁剪 ({:.1}, {:.1}, {:.1}x{:.1})",
        expanded,
        crop.x,
        crop.y,
        crop.width,
        crop.height
    );

    let second = Placement::centered(crop.width, crop.height, canvas, CLIPPED_FIT_RATIO);
    surface.clear();
    surface.draw_scaled(
        source,
        crop,
        Rect::new(
            second.offset_x,
            second.offset_y,
            crop.width * second.scale,
            crop.height * second.scale,
        ),
    )?;

    let mut buffer = surface.read_pixels();
    normalize_mask(&mut buffer, options.contrast, options.invert);
    surface.write_pixels(buffer)
}
