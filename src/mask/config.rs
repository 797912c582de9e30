//! # 配置模块
//!
//! ## 设计思路
//!
//! 配置分为两层：
//! - `MaskConfig`：服务级策略（下载/解码限制、画布上限、重采样滤镜等），由宿主在启动时决定；
//! - `MaskOptions`：单次请求参数（尺寸、反相、对比度、裁剪、亮度、变换流水线），随消息传入。
//!
//! 其中重采样档位（smooth / balanced / crisp）作为高层语义，映射到底层滤镜。
//!
//! ## 实现思路
//!
//! - `Default` 提供生产可用的配置与协议约定的默认参数。
//! - `ResampleProfile` 负责档位字符串解析与反向输出。
//! - `MaskConfig::validate` 在替换配置前做范围校验，避免运行中出现非法策略。

use image::imageops::FilterType;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

use super::transform::TransformStep;
use super::MaskError;

/// 协议约定的默认画布边长。
pub const DEFAULT_MASK_SIZE: u32 = 64;
/// 协议约定的默认对比度倍数。
pub const DEFAULT_CONTRAST: f64 = 1.5;

/// 蒙版服务配置。
///
/// 字段覆盖了下载、解码、渲染与 worker 队列四个阶段。
#[derive(Debug, Clone)]
pub struct MaskConfig {
    /// 下载/解析原始字节时允许的最大体积（字节）。
    pub max_file_size: u64,
    /// 网络下载超时时间（秒）。
    pub download_timeout: u64,
    /// 建立连接（TCP/TLS）超时时间（秒）。
    pub connect_timeout: u64,
    /// 下载首包超时时间（毫秒）。
    pub stream_first_byte_timeout_ms: u64,
    /// 下载分块读取超时时间（毫秒）。
    pub stream_chunk_timeout_ms: u64,
    /// 最大重定向次数。
    pub max_redirects: usize,
    /// 是否允许访问内网或本地地址（默认关闭，防 SSRF）。
    pub allow_private_network: bool,
    /// 解码后的像素上限（`width * height`）。
    pub max_decoded_pixels: u64,
    /// 解码阶段允许的预计内存上限（按 RGBA 估算，字节）。
    pub max_decoded_bytes: u64,
    /// 渲染画布边长上限。
    pub max_surface_size: u32,
    /// 绘制缩放时使用的滤镜。
    pub resize_filter: FilterType,
    /// worker 入站/出站通道容量。
    pub worker_queue_capacity: usize,
}

impl Default for MaskConfig {
    fn default() -> Self {
        Self {
            max_file_size: 10 * 1024 * 1024,
            download_timeout: 30,
            connect_timeout: 8,
            stream_first_byte_timeout_ms: 10_000,
            stream_chunk_timeout_ms: 15_000,
            max_redirects: 5,
            allow_private_network: false,
            max_decoded_pixels: 16_000_000,
            max_decoded_bytes: 64 * 1024 * 1024,
            max_surface_size: 2048,
            resize_filter: FilterType::Triangle,
            worker_queue_capacity: 32,
        }
    }
}

impl MaskConfig {
    /// 校验配置取值范围。
    pub fn validate(&self) -> Result<(), MaskError> {
        if self.max_file_size == 0 {
            return Err(MaskError::InvalidFormat("max_file_size 不能为 0".to_string()));
        }
        if !(1..=300).contains(&self.download_timeout) {
            return Err(MaskError::InvalidFormat("download_timeout 必须在 1~300 秒之间".to_string()));
        }
        if !(1..=120).contains(&self.connect_timeout) {
            return Err(MaskError::InvalidFormat("connect_timeout 必须在 1~120 秒之间".to_string()));
        }
        if !(500..=120_000).contains(&self.stream_first_byte_timeout_ms) {
            return Err(MaskError::InvalidFormat(
                "stream_first_byte_timeout_ms 必须在 500~120000 毫秒之间".to_string(),
            ));
        }
        if !(500..=120_000).contains(&self.stream_chunk_timeout_ms) {
            return Err(MaskError::InvalidFormat(
                "stream_chunk_timeout_ms 必须在 500~120000 毫秒之间".to_string(),
            ));
        }
        if self.max_decoded_pixels == 0 || self.max_decoded_bytes == 0 {
            return Err(MaskError::InvalidFormat("解码限制不能为 0".to_string()));
        }
        if !(1..=8192).contains(&self.max_surface_size) {
            return Err(MaskError::InvalidFormat("max_surface_size 必须在 1~8192 之间".to_string()));
        }
        if self.worker_queue_capacity == 0 {
            return Err(MaskError::InvalidFormat("worker_queue_capacity 不能为 0".to_string()));
        }
        Ok(())
    }

    /// 基于当前滤镜反推重采样档位。
    pub fn infer_resample_profile(&self) -> ResampleProfile {
        match self.resize_filter {
            FilterType::CatmullRom | FilterType::Lanczos3 | FilterType::Gaussian => {
                ResampleProfile::Smooth
            }
            FilterType::Nearest => ResampleProfile::Crisp,
            FilterType::Triangle => ResampleProfile::Balanced,
        }
    }

    /// 应用指定重采样档位。
    pub fn apply_resample_profile(&mut self, profile: ResampleProfile) {
        self.resize_filter = match profile {
            ResampleProfile::Smooth => FilterType::CatmullRom,
            ResampleProfile::Balanced => FilterType::Triangle,
            ResampleProfile::Crisp => FilterType::Nearest,
        };
    }
}

/// 重采样档位（面向宿主的语义）。
///
/// - `Smooth`：边缘最柔和，适合照片类图标
/// - `Balanced`：接近浏览器画布默认平滑效果
/// - `Crisp`：保留像素风图标的硬边
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResampleProfile {
    Smooth,
    Balanced,
    Crisp,
}

impl ResampleProfile {
    /// 从外部字符串解析档位。
    pub fn from_str(profile: &str) -> Result<Self, MaskError> {
        match profile.trim().to_lowercase().as_str() {
            "smooth" => Ok(Self::Smooth),
            "balanced" => Ok(Self::Balanced),
            "crisp" => Ok(Self::Crisp),
            other => Err(MaskError::InvalidFormat(format!(
                "未知重采样档位：{}（可选：smooth / balanced / crisp）",
                other
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Smooth => "smooth",
            Self::Balanced => "balanced",
            Self::Crisp => "crisp",
        }
    }
}

/// 单次 `create-mask` 请求的参数。
///
/// 所有字段均可省略或为 `null`，两种情况都使用协议默认值。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "MaskOptionsWire")]
pub struct MaskOptions {
    /// 输出画布边长（像素）。
    pub size: u32,
    /// 是否反相（让暗部成为不透明区域）。
    pub invert: bool,
    /// 围绕中点的对比度倍数。
    pub contrast: f64,
    /// 是否执行内容感知的二次裁剪。
    pub clip: bool,
    /// 目标平均不透明度，`[0,1]`。
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_brightness: Option<f64>,
    /// 蒙版生成后依次执行的像素变换。
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub pipeline: Vec<TransformStep>,
}

impl Default for MaskOptions {
    fn default() -> Self {
        Self {
            size: DEFAULT_MASK_SIZE,
            invert: false,
            contrast: DEFAULT_CONTRAST,
            clip: true,
            target_brightness: None,
            pipeline: Vec::new(),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MaskOptionsWire {
    #[serde(default, deserialize_with = "deserialize_size")]
    size: Option<u32>,
    invert: Option<bool>,
    contrast: Option<f64>,
    clip: Option<bool>,
    target_brightness: Option<f64>,
    pipeline: Option<Vec<TransformStep>>,
}

impl From<MaskOptionsWire> for MaskOptions {
    fn from(wire: MaskOptionsWire) -> Self {
        let defaults = Self::default();
        Self {
            size: wire.size.unwrap_or(defaults.size),
            invert: wire.invert.unwrap_or(defaults.invert),
            contrast: wire.contrast.unwrap_or(defaults.contrast),
            clip: wire.clip.unwrap_or(defaults.clip),
            target_brightness: wire.target_brightness,
            pipeline: wire.pipeline.unwrap_or(defaults.pipeline),
        }
    }
}

impl MaskOptions {
    /// 限定在 `[0,1]` 内的目标亮度。
    pub fn clamped_target_brightness(&self) -> Option<f64> {
        self.target_brightness
            .filter(|value| value.is_finite())
            .map(|value| value.clamp(0.0, 1.0))
    }
}

/// 宿主可能传入 `64` 或 `64.0`，统一四舍五入为整数边长。
fn deserialize_size<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(value) = Option::<f64>::deserialize(deserializer)? else {
        return Ok(None);
    };
    if !value.is_finite() || value < 0.0 || value > u32::MAX as f64 {
        return Err(D::Error::custom(format!("size 取值非法：{}", value)));
    }
    Ok(Some(value.round() as u32))
}
