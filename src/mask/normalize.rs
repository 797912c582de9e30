//! # 蒙版归一化
//!
//! 把任意颜色的图标区域变成白色剪影，alpha 通道承载“拉伸 + 对比度 + 可选反相”后的亮度。
//! 拉伸区间按单个图标计算，因此浅色图标和深色图标都能得到可用的蒙版。

use super::pixels::{CHANNELS, NORMALIZE_ALPHA_THRESHOLD, clamp_channel, clamp_unit, luminance};

/// 亮度跨度小于该值视为“没有可拉伸的区间”。
const MIN_LUMINANCE_RANGE: f64 = 0.01;

/// 亮度拉伸区间（首轮扫描结果）。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LuminanceStretch {
    pub min: f64,
    pub range: f64,
}

/// 首轮扫描：只统计 `alpha >= 10` 的像素，返回可用的拉伸区间。
///
/// 没有任何有效像素时按 `min=1, max=0` 处理，跨度为负，自然不拉伸。
pub fn measure_stretch(buffer: &[u8]) -> Option<LuminanceStretch> {
    let mut min = 1.0_f64;
    let mut max = 0.0_f64;

    for px in buffer.chunks_exact(CHANNELS) {
        if px[3] < NORMALIZE_ALPHA_THRESHOLD {
            continue;
        }
        let l = luminance(px[0], px[1], px[2]);
        min = min.min(l);
        max = max.max(l);
    }

    let range = max - min;
    (range > MIN_LUMINANCE_RANGE).then_some(LuminanceStretch { min, range })
}

/// 单像素的亮度映射曲线：拉伸 → 围绕 0.5 的对比度 → 截断 → 可选反相。
#[inline]
pub fn tone_curve(l: f64, stretch: Option<LuminanceStretch>, contrast: f64, invert: bool) -> f64 {
    let stretched = match stretch {
        Some(s) => (l - s.min) / s.range,
        None => l,
    };
    let shaped = clamp_unit((stretched - 0.5) * contrast + 0.5);
    if invert { 1.0 - shaped } else { shaped }
}

/// 原地归一化：每个像素都变为 `R=G=B=255`，`A = 亮度曲线 * 原 alpha`。
///
/// 第二轮扫描覆盖全部像素（不再按 alpha 过滤）。
pub fn normalize_mask(buffer: &mut [u8], contrast: f64, invert: bool) {
    let stretch = measure_stretch(buffer);

    for px in buffer.chunks_exact_mut(CHANNELS) {
        let l = tone_curve(luminance(px[0], px[1], px[2]), stretch, contrast, invert);
        let alpha = px[3] as f64 / 255.0;

        px[0] = 255;
        px[1] = 255;
        px[2] = 255;
        px[3] = clamp_channel(l * alpha * 255.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pixels(values: &[[u8; 4]]) -> Vec<u8> {
        values.iter().flatten().copied().collect()
    }

    fn alphas(buffer: &[u8]) -> Vec<u8> {
        buffer.chunks_exact(CHANNELS).map(|px| px[3]).collect()
    }

    #[test]
    fn stretches_to_full_range() {
        let mut buffer = pixels(&[[0, 0, 0, 255], [128, 128, 128, 255], [255, 255, 255, 255]]);
        normalize_mask(&mut buffer, 1.0, false);

        assert_eq!(alphas(&buffer), vec![0, 128, 255]);
        assert!(buffer.chunks_exact(CHANNELS).all(|px| px[..3] == [255, 255, 255]));
    }

    #[test]
    fn alpha_scales_with_source_alpha() {
        let mut buffer = pixels(&[[0, 0, 0, 255], [255, 255, 255, 128]]);
        normalize_mask(&mut buffer, 1.0, false);

        assert_eq!(alphas(&buffer), vec![0, 128]);
    }

    #[test]
    fn faint_pixels_are_excluded_from_range_but_still_rewritten() {
        // 唯一的亮像素 alpha=5，不参与统计，于是没有拉伸区间
        let mut buffer = pixels(&[[40, 40, 40, 255], [255, 255, 255, 5]]);
        assert_eq!(measure_stretch(&buffer), None);

        normalize_mask(&mut buffer, 1.0, false);
        let l = luminance(40, 40, 40);
        assert_eq!(buffer[3], clamp_channel(l * 255.0));
        assert_eq!(buffer[7], 5);
        assert_eq!(&buffer[4..7], &[255, 255, 255]);
    }

    #[test]
    fn fully_transparent_buffer_stays_transparent() {
        let mut buffer = vec![0u8; 16 * CHANNELS];
        normalize_mask(&mut buffer, 1.5, false);
        assert!(alphas(&buffer).iter().all(|&a| a == 0));

        let mut buffer = vec![0u8; 16 * CHANNELS];
        normalize_mask(&mut buffer, 1.5, true);
        assert!(alphas(&buffer).iter().all(|&a| a == 0));
    }

    #[test]
    fn normalization_is_idempotent_on_white_masks() {
        let mut buffer = pixels(&[[0, 0, 0, 0], [90, 10, 200, 77], [10, 10, 10, 255], [250, 250, 250, 180]]);
        normalize_mask(&mut buffer, 1.5, false);
        let first = buffer.clone();

        normalize_mask(&mut buffer, 1.5, false);
        assert_eq!(buffer, first);
    }

    #[test]
    fn contrast_pushes_midtones_apart() {
        let dim = tone_curve(0.4, None, 1.5, false);
        let bright = tone_curve(0.6, None, 1.5, false);
        assert!((dim - 0.35).abs() < 1e-9);
        assert!((bright - 0.65).abs() < 1e-9);
        assert_eq!(tone_curve(0.9, None, 3.0, false), 1.0);
        assert_eq!(tone_curve(0.1, None, 3.0, false), 0.0);
    }

    #[test]
    fn inverting_twice_restores_luminance() {
        for step in 0..=100 {
            let l = step as f64 / 100.0;
            let once = tone_curve(l, None, 1.0, true);
            let twice = tone_curve(once, None, 1.0, true);
            assert!((twice - l).abs() < 1e-12, "l={} twice={}", l, twice);
        }
    }

    #[test]
    fn inverted_mask_complements_plain_mask() {
        let source = pixels(&[[0, 0, 0, 255], [60, 60, 60, 255], [150, 90, 30, 255], [255, 255, 255, 255]]);

        let mut plain = source.clone();
        normalize_mask(&mut plain, 1.5, false);
        let mut inverted = source;
        normalize_mask(&mut inverted, 1.5, true);

        for (a, b) in alphas(&plain).into_iter().zip(alphas(&inverted)) {
            let sum = a as i32 + b as i32;
            assert!((sum - 255).abs() <= 1, "plain={} inverted={}", a, b);
        }
    }

    #[test]
    fn solid_black_without_range_clamps_to_transparent() {
        let mut buffer = pixels(&[[0, 0, 0, 255]; 4]);
        normalize_mask(&mut buffer, 1.5, false);
        assert!(alphas(&buffer).iter().all(|&a| a == 0));

        let mut buffer = pixels(&[[0, 0, 0, 255]; 4]);
        normalize_mask(&mut buffer, 1.5, true);
        assert!(alphas(&buffer).iter().all(|&a| a == 255));
    }
}
