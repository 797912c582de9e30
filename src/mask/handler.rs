//! # 核心编排模块
//!
//! ## 设计思路
//!
//! `MaskHandler` 只负责流程编排与配置管理，不关心消息协议。
//! 处理链路固定为：
//! 1. 读取配置快照，创建画布（尺寸非法时尽早失败）
//! 2. 按来源加载原始字节（异步 I/O）
//! 3. 在阻塞线程池内完成 解码 → 适配 → 亮度 → 变换 → 编码
//!
//! ## 实现思路
//!
//! - 配置通过 `Arc<RwLock<MaskConfig>>` 支持运行时替换。
//! - 单次请求内使用“同一配置快照”，避免处理中途配置漂移。
//! - 像素工作整体放进一次 `spawn_blocking`，任务 panic 统一映射为 `MaskError::Internal`。
//! - 记录 `load/decode/fit/transform/encode/total` 阶段耗时，便于性能诊断。

use std::sync::{Arc, RwLock};
use std::time::Instant;

use super::brightness::retarget_brightness;
use super::encoder::encode_surface;
use super::fitter::fit_and_mask;
use super::source::RawImageData;
use super::surface::RenderSurface;
use super::transform::apply_pipeline;
use super::{IconSource, MaskConfig, MaskError, MaskOptions, ResampleProfile};

/// 蒙版处理器。
///
/// 内部只持有共享配置，克隆开销很小，可以放进阻塞任务。
#[derive(Clone)]
pub struct MaskHandler {
    pub(super) config: Arc<RwLock<MaskConfig>>,
}

impl MaskHandler {
    /// 根据初始配置创建处理器，配置非法时直接拒绝。
    ///
    /// # 示例
    /// ```rust,ignore
    /// use icon_mask_worker::mask::{MaskConfig, MaskHandler};
    ///
    /// let handler = MaskHandler::new(MaskConfig::default())?;
    /// # Ok::<(), icon_mask_worker::mask::MaskError>(())
    /// ```
    pub fn new(config: MaskConfig) -> Result<Self, MaskError> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(RwLock::new(config)),
        })
    }

    /// 获取配置快照，保证单次请求链路使用一致参数。
    pub(super) fn config_snapshot(&self) -> Result<MaskConfig, MaskError> {
        self.config
            .read()
            .map(|cfg| cfg.clone())
            .map_err(|_| MaskError::ResourceLimit("配置读取锁已中毒".to_string()))
    }

    /// 读取当前配置。
    pub fn get_config(&self) -> Result<MaskConfig, MaskError> {
        self.config_snapshot()
    }

    /// 整体替换配置（先校验）。
    pub fn set_config(&self, config: MaskConfig) -> Result<(), MaskError> {
        config.validate()?;

        let mut current = self
            .config
            .write()
            .map_err(|_| MaskError::ResourceLimit("配置写入锁已中毒".to_string()))?;
        *current = config;

        log::info!(
            "⚙️ 已更新蒙版配置（max_file_size={}, max_surface_size={}, allow_private_network={}）",
            current.max_file_size,
            current.max_surface_size,
            current.allow_private_network
        );
        Ok(())
    }

    /// 设置重采样档位。
    pub fn set_resample_profile(&self, profile: ResampleProfile) -> Result<(), MaskError> {
        let mut config = self
            .config
            .write()
            .map_err(|_| MaskError::ResourceLimit("配置写入锁已中毒".to_string()))?;
        config.apply_resample_profile(profile);

        log::info!(
            "⚙️ 已切换重采样档位：{}（filter={:?}）",
            profile.as_str(),
            config.resize_filter
        );
        Ok(())
    }

    /// 获取当前生效的重采样档位。
    pub fn get_resample_profile(&self) -> Result<ResampleProfile, MaskError> {
        let config = self
            .config
            .read()
            .map_err(|_| MaskError::ResourceLimit("配置读取锁已中毒".to_string()))?;
        Ok(config.infer_resample_profile())
    }

    /// 处理主入口：加载图标并生成蒙版 data URL。
    ///
    /// # 示例
    /// ```rust,ignore
    /// use icon_mask_worker::mask::{MaskConfig, MaskHandler, MaskOptions};
    ///
    /// # async fn demo() -> Result<(), icon_mask_worker::mask::MaskError> {
    /// let handler = MaskHandler::new(MaskConfig::default())?;
    /// let data_url = handler
    ///     .create_mask("https://example.com/icon.png", &MaskOptions::default())
    ///     .await?;
    /// assert!(data_url.starts_with("data:image/png;base64,"));
    /// # Ok(())
    /// # }
    /// ```
    pub async fn create_mask(&self, icon_url: &str, options: &MaskOptions) -> Result<String, MaskError> {
        let config = self.config_snapshot()?;
        let total_start = Instant::now();

        let source = IconSource::parse(icon_url)?;
        let surface = RenderSurface::new(options.size, config.max_surface_size, config.resize_filter)?;

        let load_start = Instant::now();
        let raw = match &source {
            IconSource::Url(url) => self.load_from_url(url, &config).await?,
            IconSource::DataUrl(data) => self.load_from_data_url(data, &config)?,
        };
        let load_elapsed = load_start.elapsed();

        let handler = self.clone();
        let options = options.clone();
        let data_url = match tokio::task::spawn_blocking(move || {
            handler.render_mask(raw, surface, &options, &config)
        })
        .await
        {
            Ok(result) => result?,
            Err(e) => {
                return Err(MaskError::Internal(format!("像素处理任务异常退出：{}", e)));
            }
        };

        log::info!(
            "✅ 蒙版生成完成 - 来源: {} load={}ms total={}ms 输出={} 字符",
            source.describe(),
            load_elapsed.as_millis(),
            total_start.elapsed().as_millis(),
            data_url.len()
        );

        Ok(data_url)
    }

    /// 同步像素流水线，运行在阻塞线程池中。
    ///
    /// 源位图在函数返回时释放（无论成功与否）。
    pub(super) fn render_mask(
        &self,
        raw: RawImageData,
        mut surface: RenderSurface,
        options: &MaskOptions,
        config: &MaskConfig,
    ) -> Result<String, MaskError> {
        let decode_start = Instant::now();
        let source = self.decode_source(raw, config)?;
        let decode_elapsed = decode_start.elapsed();

        let fit_start = Instant::now();
        fit_and_mask(&source, &mut surface, options)?;
        drop(source);

        if let Some(target) = options.clamped_target_brightness() {
            let mut buffer = surface.read_pixels();
            match retarget_brightness(&mut buffer, target) {
                Some(factor) => {
                    surface.write_pixels(buffer)?;
                    log::debug!("🔆 亮度重定向 - target={:.3} factor={:.3}", target, factor);
                }
                None => log::debug!("🔅 蒙版几乎全透明，跳过亮度重定向"),
            }
        }
        let fit_elapsed = fit_start.elapsed();

        let transform_start = Instant::now();
        let applied = apply_pipeline(&mut surface, &options.pipeline)?;
        let transform_elapsed = transform_start.elapsed();

        let encode_start = Instant::now();
        let data_url = encode_surface(&surface)?;
        let encode_elapsed = encode_start.elapsed();

        log::info!(
            "🖼️ 像素流水线完成 - size={} decode={}ms fit={}ms transform={}ms({}/{}) encode={}ms",
            surface.size(),
            decode_elapsed.as_millis(),
            fit_elapsed.as_millis(),
            transform_elapsed.as_millis(),
            applied,
            options.pipeline.len(),
            encode_elapsed.as_millis()
        );

        Ok(data_url)
    }
}
