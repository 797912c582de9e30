//! # 错误模型模块
//!
//! ## 设计思路
//!
//! 使用单一错误枚举承载蒙版生成链路中所有“致命”错误，避免字符串拼接式错误处理。
//! 通过 `thiserror` 保持人类可读错误，同时让调用侧可按分支匹配。
//!
//! 注意：自定义变换“执行期”失败不属于本枚举，它们在流水线内部被记录并跳过，
//! 只有“编译期”失败才会以 `TransformCompile` 的形式终止整个请求。

/// 蒙版生成统一错误类型。
///
/// 在 worker 层被转换为 `dataUrl: null` + `error` 文案的响应。
#[derive(Debug, thiserror::Error)]
pub enum MaskError {
    #[error("网络错误：{0}")]
    Network(String),

    #[error("超时错误：{0}")]
    Timeout(String),

    #[error("格式错误：{0}")]
    InvalidFormat(String),

    #[error("解码错误：{0}")]
    Decode(String),

    #[error("资源限制：{0}")]
    ResourceLimit(String),

    #[error("画布错误：{0}")]
    Surface(String),

    #[error("变换编译失败：{0}")]
    TransformCompile(String),

    #[error("编码错误：{0}")]
    Encode(String),

    #[error("内部错误：{0}")]
    Internal(String),
}

impl MaskError {
    /// 稳定的机器可读错误码，供宿主侧分支处理与日志聚合。
    pub fn code(&self) -> &'static str {
        match self {
            Self::Network(_) => "E_NETWORK",
            Self::Timeout(_) => "E_TIMEOUT",
            Self::InvalidFormat(_) => "E_INVALID_FORMAT",
            Self::Decode(_) => "E_DECODE",
            Self::ResourceLimit(_) => "E_RESOURCE_LIMIT",
            Self::Surface(_) => "E_SURFACE",
            Self::TransformCompile(_) => "E_TRANSFORM_COMPILE",
            Self::Encode(_) => "E_ENCODE",
            Self::Internal(_) => "E_INTERNAL",
        }
    }

    /// 错误发生的处理阶段。
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Network(_) | Self::Timeout(_) => "load",
            Self::InvalidFormat(_) => "validate",
            Self::Decode(_) | Self::ResourceLimit(_) => "decode",
            Self::Surface(_) => "render",
            Self::TransformCompile(_) => "transform",
            Self::Encode(_) => "encode",
            Self::Internal(_) => "internal",
        }
    }
}

impl From<MaskError> for String {
    /// 兼容协议层直接以字符串承载错误的场景。
    fn from(error: MaskError) -> Self {
        error.to_string()
    }
}
