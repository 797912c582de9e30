//! # 像素缓冲基础函数
//!
//! 纯函数，直接作用于 RGBA 行主序字节缓冲（`width * height * 4`）。

/// 归一化、亮度重定向与内置变换所用的“有效像素”阈值。
pub const NORMALIZE_ALPHA_THRESHOLD: u8 = 10;

/// 内容感知裁剪时包围盒所用的阈值。
///
/// 与 `NORMALIZE_ALPHA_THRESHOLD` 刻意分开：裁剪保守，归一化敏感。
pub const CROP_ALPHA_THRESHOLD: u8 = 20;

/// 单像素字节数（RGBA）。
pub const CHANNELS: usize = 4;

/// 包围盒，坐标均为闭区间像素坐标。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
}

impl BoundingBox {
    pub fn width(&self) -> u32 {
        self.max_x - self.min_x + 1
    }

    pub fn height(&self) -> u32 {
        self.max_y - self.min_y + 1
    }

    /// 向四周各扩展 `margin` 像素，并限制在 `width x height` 画布内。
    pub fn expand_within(&self, margin: u32, width: u32, height: u32) -> Self {
        Self {
            min_x: self.min_x.saturating_sub(margin),
            min_y: self.min_y.saturating_sub(margin),
            max_x: self.max_x.saturating_add(margin).min(width.saturating_sub(1)),
            max_y: self.max_y.saturating_add(margin).min(height.saturating_sub(1)),
        }
    }
}

/// 感知亮度（Rec.601 权重），范围 `[0,1]`，忽略 alpha。
#[inline]
pub fn luminance(r: u8, g: u8, b: u8) -> f64 {
    (0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64) / 255.0
}

/// 扫描所有 `alpha >= threshold` 的像素，返回其闭区间包围盒。
///
/// 没有任何像素达标时返回 `None`。
pub fn bounding_box(buffer: &[u8], width: u32, height: u32, threshold: u8) -> Option<BoundingBox> {
    let mut found: Option<BoundingBox> = None;

    for y in 0..height {
        for x in 0..width {
            let idx = (y as usize * width as usize + x as usize) * CHANNELS;
            let Some(&alpha) = buffer.get(idx + 3) else {
                return found;
            };
            if alpha < threshold {
                continue;
            }

            found = Some(match found {
                None => BoundingBox {
                    min_x: x,
                    min_y: y,
                    max_x: x,
                    max_y: y,
                },
                Some(bbox) => BoundingBox {
                    min_x: bbox.min_x.min(x),
                    min_y: bbox.min_y.min(y),
                    max_x: bbox.max_x.max(x),
                    max_y: bbox.max_y.max(y),
                },
            });
        }
    }

    found
}

/// 将 `[0,1]` 区间外的值截断。
#[inline]
pub fn clamp_unit(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

/// 四舍五入并截断到 `0..=255`。
#[inline]
pub fn clamp_channel(value: f64) -> u8 {
    if value.is_nan() {
        return 0;
    }
    value.round().clamp(0.0, 255.0) as u8
}

/// HSV → RGB，`h` 为角度（任意实数，按 360 取模），`s`、`v` 为 `[0,1]`。
pub fn hsv_to_rgb(h: f64, s: f64, v: f64) -> (u8, u8, u8) {
    let h = h.rem_euclid(360.0);
    let s = clamp_unit(s);
    let v = clamp_unit(v);

    let c = v * s;
    let h2 = h / 60.0;
    let x = c * (1.0 - (h2 % 2.0 - 1.0).abs());
    let (r1, g1, b1) = match h2 as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let m = v - c;

    (
        clamp_channel((r1 + m) * 255.0),
        clamp_channel((g1 + m) * 255.0),
        clamp_channel((b1 + m) * 255.0),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn transparent(width: u32, height: u32) -> Vec<u8> {
        vec![0; width as usize * height as usize * CHANNELS]
    }

    fn fill_rect(buffer: &mut [u8], width: u32, rect: BoundingBox, alpha: u8) {
        for y in rect.min_y..=rect.max_y {
            for x in rect.min_x..=rect.max_x {
                let idx = (y as usize * width as usize + x as usize) * CHANNELS;
                buffer[idx..idx + 4].copy_from_slice(&[0, 0, 0, alpha]);
            }
        }
    }

    #[test]
    fn luminance_uses_perceptual_weights() {
        assert_eq!(luminance(0, 0, 0), 0.0);
        assert!((luminance(255, 255, 255) - 1.0).abs() < 1e-12);
        assert!((luminance(255, 0, 0) - 0.299).abs() < 1e-12);
        assert!((luminance(0, 255, 0) - 0.587).abs() < 1e-12);
    }

    #[test]
    fn bounding_box_of_transparent_buffer_is_none() {
        let buffer = transparent(16, 16);
        assert_eq!(bounding_box(&buffer, 16, 16, 1), None);
    }

    #[test]
    fn bounding_box_respects_threshold() {
        let mut buffer = transparent(8, 8);
        fill_rect(
            &mut buffer,
            8,
            BoundingBox { min_x: 2, min_y: 3, max_x: 4, max_y: 5 },
            15,
        );

        assert!(bounding_box(&buffer, 8, 8, NORMALIZE_ALPHA_THRESHOLD).is_some());
        assert_eq!(bounding_box(&buffer, 8, 8, CROP_ALPHA_THRESHOLD), None);
    }

    #[test]
    fn single_pixel_yields_degenerate_box() {
        let mut buffer = transparent(5, 5);
        buffer[(2 * 5 + 3) * CHANNELS + 3] = 255;

        let bbox = bounding_box(&buffer, 5, 5, 1).expect("single pixel should count");
        assert_eq!(bbox, BoundingBox { min_x: 3, min_y: 2, max_x: 3, max_y: 2 });
        assert_eq!(bbox.width(), 1);
        assert_eq!(bbox.height(), 1);
    }

    #[test]
    fn expand_within_clamps_to_canvas() {
        let bbox = BoundingBox { min_x: 0, min_y: 3, max_x: 9, max_y: 6 };
        let expanded = bbox.expand_within(1, 10, 10);
        assert_eq!(expanded, BoundingBox { min_x: 0, min_y: 2, max_x: 9, max_y: 7 });
    }

    #[test]
    fn hsv_primary_hues() {
        assert_eq!(hsv_to_rgb(0.0, 1.0, 1.0), (255, 0, 0));
        assert_eq!(hsv_to_rgb(120.0, 1.0, 1.0), (0, 255, 0));
        assert_eq!(hsv_to_rgb(240.0, 1.0, 1.0), (0, 0, 255));
        assert_eq!(hsv_to_rgb(360.0, 1.0, 1.0), (255, 0, 0));
        assert_eq!(hsv_to_rgb(60.0, 0.0, 1.0), (255, 255, 255));
    }

    #[test]
    fn clamp_channel_never_wraps() {
        assert_eq!(clamp_channel(-3.0), 0);
        assert_eq!(clamp_channel(254.6), 255);
        assert_eq!(clamp_channel(300.0), 255);
        assert_eq!(clamp_channel(f64::NAN), 0);
    }

    proptest! {
        #[test]
        fn bounding_box_matches_single_opaque_rect(
            width in 1u32..32,
            height in 1u32..32,
            a in any::<(u32, u32, u32, u32)>(),
        ) {
            let (x0, x1) = { let p = a.0 % width; let q = a.1 % width; (p.min(q), p.max(q)) };
            let (y0, y1) = { let p = a.2 % height; let q = a.3 % height; (p.min(q), p.max(q)) };
            let rect = BoundingBox { min_x: x0, min_y: y0, max_x: x1, max_y: y1 };

            let mut buffer = transparent(width, height);
            fill_rect(&mut buffer, width, rect, 255);

            prop_assert_eq!(bounding_box(&buffer, width, height, 1), Some(rect));
        }
    }
}
