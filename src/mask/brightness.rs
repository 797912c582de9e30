//! 亮度重定向：把蒙版的平均不透明度统一拉到目标值，让不同图标视觉重量一致。

use super::pixels::{CHANNELS, NORMALIZE_ALPHA_THRESHOLD, clamp_channel};

/// 平均不透明度低于该值时不做缩放（几乎全透明，放大只会放大噪点）。
const MIN_AVERAGE_OPACITY: f64 = 0.01;

/// `alpha >= 10` 像素的平均不透明度，没有有效像素时返回 `None`。
pub fn average_opacity(buffer: &[u8]) -> Option<f64> {
    let (sum, count) = buffer
        .chunks_exact(CHANNELS)
        .filter(|px| px[3] >= NORMALIZE_ALPHA_THRESHOLD)
        .fold((0.0_f64, 0_u64), |(sum, count), px| {
            (sum + px[3] as f64 / 255.0, count + 1)
        });

    (count > 0).then(|| sum / count as f64)
}

/// 按 `target / avg` 统一缩放所有非透明像素的 alpha。
///
/// 返回实际使用的缩放因子；跳过时返回 `None`。
pub fn retarget_brightness(buffer: &mut [u8], target: f64) -> Option<f64> {
    let avg = average_opacity(buffer)?;
    if avg <= MIN_AVERAGE_OPACITY {
        return None;
    }

    let factor = target / avg;
    for px in buffer.chunks_exact_mut(CHANNELS) {
        if px[3] >= 1 {
            px[3] = clamp_channel(px[3] as f64 * factor);
        }
    }

    Some(factor)
}
