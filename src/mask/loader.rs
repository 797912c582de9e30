//! # 加载与校验模块
//!
//! ## 设计思路
//!
//! 统一处理两类 `iconUrl`（网络地址 / data URL）的原始字节加载，并在“尽可能早”的阶段执行输入校验，
//! 尽快失败，减少不必要的内存与 CPU 消耗。
//!
//! ## 实现思路
//!
//! - URL：协议 + 主机安全 + 手动跟随重定向 + 状态码 + 内容类型 + 体积校验 + 流式下载。
//! - data URL：格式解析 + 解码前体积估算 + 解码后签名校验。
//! - 不做自动重试，也不跨请求缓存下载结果；重试策略由宿主决定。

use base64::{Engine as _, engine::general_purpose};
use std::net::IpAddr;
use std::time::Duration;

use super::source::RawImageData;
use super::{MaskConfig, MaskError, MaskHandler};

const STREAM_SIGNATURE_PROBE_BYTES: usize = 4096;
const BUFFER_INITIAL_CAPACITY: usize = 16 * 1024;

impl MaskHandler {
    /// 从网络地址加载图标原始字节。
    pub(super) async fn load_from_url(
        &self,
        url: &str,
        config: &MaskConfig,
    ) -> Result<RawImageData, MaskError> {
        log::info!("🌐 开始下载图标 - URL: {}", redact_url_for_log(url));

        Self::validate_url_safety(url, config)?;
        let bytes = Self::download_with_validation(url, config).await?;
        Self::validate_image_signature(&bytes)?;

        Ok(RawImageData {
            bytes,
            source_hint: "url",
        })
    }

    /// 从 data URL 加载图标原始字节。
    pub(super) fn load_from_data_url(
        &self,
        data: &str,
        config: &MaskConfig,
    ) -> Result<RawImageData, MaskError> {
        log::debug!("📝 开始解析 data URL 图标 - {} 字符", data.len());

        let bytes = Self::parse_data_url_with_limit(data, config.max_file_size)?;
        if bytes.len() as u64 > config.max_file_size {
            return Err(MaskError::ResourceLimit(format!(
                "data URL 解码后体积过大：{:.2} MB（限制：{:.2} MB）",
                bytes.len() as f64 / 1024.0 / 1024.0,
                config.max_file_size as f64 / 1024.0 / 1024.0
            )));
        }
        Self::validate_image_signature(&bytes)?;

        Ok(RawImageData {
            bytes,
            source_hint: "data-url",
        })
    }

    /// 执行带校验的网络下载。
    ///
    /// 重定向由这里逐跳处理，每一跳都重新做主机安全校验。
    async fn download_with_validation(url: &str, config: &MaskConfig) -> Result<Vec<u8>, MaskError> {
        let client = Self::build_http_client(config)?;
        let mut current_url = reqwest::Url::parse(url)
            .map_err(|e| MaskError::InvalidFormat(format!("URL 格式错误：{}", e)))?;

        for redirect_count in 0..=config.max_redirects {
            log::debug!("📡 发送 HTTP 请求 - {}", redact_url_for_log(current_url.as_str()));

            let response = client
                .get(current_url.clone())
                .header(reqwest::header::ACCEPT, "image/avif,image/webp,image/apng,image/*,*/*;q=0.8")
                .send()
                .await
                .map_err(|e| Self::map_reqwest_error(e, current_url.as_str(), config))?;

            if response.status().is_redirection() {
                if redirect_count >= config.max_redirects {
                    return Err(MaskError::Network(format!(
                        "重定向次数超过限制（{}）",
                        config.max_redirects
                    )));
                }

                let location = response
                    .headers()
                    .get(reqwest::header::LOCATION)
                    .ok_or_else(|| MaskError::Network("重定向响应缺少 Location 头".to_string()))?;
                let location_str = location
                    .to_str()
                    .map_err(|e| MaskError::InvalidFormat(format!("重定向地址无效：{}", e)))?;
                let next_url = current_url
                    .join(location_str)
                    .map_err(|e| MaskError::InvalidFormat(format!("重定向 URL 解析失败：{}", e)))?;

                Self::validate_url_safety(next_url.as_str(), config)?;

                log::debug!("↪️ 跳转到: {}", redact_url_for_log(next_url.as_str()));
                current_url = next_url;
                continue;
            }

            if !response.status().is_success() {
                return Err(MaskError::Network(format!(
                    "HTTP {}: {}",
                    response.status().as_u16(),
                    Self::status_message(response.status().as_u16())
                )));
            }

            if let Some(ct) = response.headers().get(reqwest::header::CONTENT_TYPE) {
                if let Ok(ct_str) = ct.to_str() {
                    if !Self::is_image_content_type(ct_str) {
                        return Err(MaskError::InvalidFormat(format!("不是图片类型：{}", ct_str)));
                    }
                }
            }

            let total_len = response
                .headers()
                .get(reqwest::header::CONTENT_LENGTH)
                .and_then(|cl| cl.to_str().ok())
                .and_then(|cl| cl.parse::<u64>().ok());

            if let Some(size) = total_len {
                if size > config.max_file_size {
                    return Err(MaskError::ResourceLimit(format!(
                        "文件过大：{:.2} MB（限制：{:.2} MB）",
                        size as f64 / 1024.0 / 1024.0,
                        config.max_file_size as f64 / 1024.0 / 1024.0
                    )));
                }
            }

            return Self::read_body_with_limits(response, total_len, config).await;
        }

        Err(MaskError::Network("下载流程异常结束".to_string()))
    }

    /// 流式读取响应体：首包/分块超时、累计体积上限、尽早签名探测。
    async fn read_body_with_limits(
        mut response: reqwest::Response,
        total_len: Option<u64>,
        config: &MaskConfig,
    ) -> Result<Vec<u8>, MaskError> {
        let initial_capacity = total_len
            .map(|len| len.min(config.max_file_size).min(usize::MAX as u64) as usize)
            .filter(|len| *len > 0)
            .unwrap_or(BUFFER_INITIAL_CAPACITY);
        let mut buffer = Vec::with_capacity(initial_capacity);
        let mut total: u64 = 0;
        let mut signature_validated = false;
        let mut received_first_chunk = false;

        loop {
            let read_timeout = if received_first_chunk {
                Duration::from_millis(config.stream_chunk_timeout_ms)
            } else {
                Duration::from_millis(config.stream_first_byte_timeout_ms)
            };

            let next_chunk_result = tokio::time::timeout(read_timeout, response.chunk())
                .await
                .map_err(|_| {
                    if received_first_chunk {
                        MaskError::Timeout("下载数据流读取超时".to_string())
                    } else {
                        MaskError::Timeout("下载首包超时".to_string())
                    }
                })?;

            let Some(chunk) = next_chunk_result
                .map_err(|e| MaskError::Network(format!("下载失败：{}", e)))?
            else {
                break;
            };

            received_first_chunk = true;
            total = total.saturating_add(chunk.len() as u64);
            if total > config.max_file_size {
                return Err(MaskError::ResourceLimit("下载后文件超过大小限制".to_string()));
            }
            buffer.extend_from_slice(&chunk);

            if !signature_validated {
                signature_validated =
                    Self::validate_stream_signature_probe(&buffer, STREAM_SIGNATURE_PROBE_BYTES)?;
            }
        }

        log::debug!("✅ 下载完成 - {} bytes", total);
        Ok(buffer)
    }

    fn build_http_client(config: &MaskConfig) -> Result<reqwest::Client, MaskError> {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(config.download_timeout))
            .connect_timeout(Duration::from_secs(config.connect_timeout))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| MaskError::Network(format!("无法创建 HTTP 客户端：{}", e)))
    }

    fn is_image_content_type(content_type: &str) -> bool {
        content_type
            .split(';')
            .next()
            .map(|base| base.trim().to_ascii_lowercase().starts_with("image/"))
            .unwrap_or(false)
    }

    /// 校验 URL 安全性。
    ///
    /// 默认阻止本地/内网目标（字面 IP 与本地主机名），防止 SSRF。
    fn validate_url_safety(url: &str, config: &MaskConfig) -> Result<(), MaskError> {
        let parsed = reqwest::Url::parse(url)
            .map_err(|e| MaskError::InvalidFormat(format!("URL 格式错误：{}", e)))?;

        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(MaskError::InvalidFormat("仅支持 HTTP/HTTPS".to_string()));
        }

        if config.allow_private_network {
            return Ok(());
        }

        let host = parsed
            .host_str()
            .ok_or_else(|| MaskError::InvalidFormat("URL 缺少主机地址".to_string()))?;

        if Self::is_local_hostname(host) {
            return Err(MaskError::InvalidFormat(format!("禁止访问本地网络地址：{}", host)));
        }

        let bare_host = host.trim_start_matches('[').trim_end_matches(']');
        if let Ok(ip) = bare_host.parse::<IpAddr>() {
            if Self::is_private_or_local_ip(ip) {
                return Err(MaskError::InvalidFormat(format!("禁止访问内网 IP：{}", ip)));
            }
        }

        Ok(())
    }

    fn is_local_hostname(host: &str) -> bool {
        host.eq_ignore_ascii_case("localhost")
            || host.eq_ignore_ascii_case("localhost.")
            || host.ends_with(".local")
    }

    fn is_private_or_local_ip(ip: IpAddr) -> bool {
        match ip {
            IpAddr::V4(v4) => {
                if v4.is_private()
                    || v4.is_loopback()
                    || v4.is_link_local()
                    || v4.is_broadcast()
                    || v4.is_documentation()
                    || v4.is_unspecified()
                    || v4.is_multicast()
                {
                    return true;
                }

                let octets = v4.octets();
                octets[0] == 0 || (octets[0] == 100 && (octets[1] & 0b1100_0000) == 0b0100_0000)
            }
            IpAddr::V6(v6) => {
                v6.is_loopback()
                    || v6.is_unspecified()
                    || v6.is_unique_local()
                    || v6.is_unicast_link_local()
                    || v6.is_multicast()
            }
        }
    }

    fn estimate_base64_decoded_upper_bound_len(base64_data: &str) -> Result<u64, MaskError> {
        let len = base64_data.trim().len() as u64;
        let groups = len
            .checked_add(3)
            .ok_or_else(|| MaskError::ResourceLimit("Base64 输入长度溢出".to_string()))?
            / 4;

        groups
            .checked_mul(3)
            .ok_or_else(|| MaskError::ResourceLimit("Base64 解码体积估算溢出".to_string()))
    }

    /// 解析 `data:image/*;base64,...`，解码前按长度估算体积上限。
    fn parse_data_url_with_limit(data: &str, max_file_size: u64) -> Result<Vec<u8>, MaskError> {
        let normalized = data.trim();

        let is_image = normalized
            .get(..11)
            .map(|prefix| prefix.eq_ignore_ascii_case("data:image/"))
            .unwrap_or(false);
        if !is_image {
            return Err(MaskError::InvalidFormat("data URL 不是图片类型".to_string()));
        }

        let base64_start = normalized
            .find(";base64,")
            .ok_or_else(|| MaskError::InvalidFormat("缺少 base64 标记".to_string()))?;
        let base64_data = &normalized[base64_start + 8..];

        let estimated_len = Self::estimate_base64_decoded_upper_bound_len(base64_data)?;
        if estimated_len > max_file_size {
            return Err(MaskError::ResourceLimit(format!(
                "Base64 预计解码体积过大：{:.2} MB（限制：{:.2} MB）",
                estimated_len as f64 / 1024.0 / 1024.0,
                max_file_size as f64 / 1024.0 / 1024.0
            )));
        }

        general_purpose::STANDARD
            .decode(base64_data.trim())
            .map_err(|e| MaskError::Decode(format!("Base64 解码失败：{}", e)))
    }

    fn map_reqwest_error(e: reqwest::Error, url: &str, config: &MaskConfig) -> MaskError {
        let err_msg = e.to_string().replace(url, &redact_url_for_log(url));

        if e.is_timeout() {
            MaskError::Timeout(format!("下载超时（{}秒）", config.download_timeout))
        } else if e.is_connect() {
            MaskError::Network(format!("无法连接：{}", err_msg))
        } else {
            MaskError::Network(format!("请求失败：{}", err_msg))
        }
    }

    fn status_message(code: u16) -> &'static str {
        match code {
            404 => "未找到",
            403 => "访问被拒绝",
            500..=599 => "服务器错误",
            _ => "请求失败",
        }
    }

    /// 通过文件签名（magic bytes）校验输入是否为图片。
    fn validate_image_signature(bytes: &[u8]) -> Result<(), MaskError> {
        if bytes.is_empty() {
            return Err(MaskError::InvalidFormat("图片内容为空".to_string()));
        }

        let kind = infer::get(bytes)
            .ok_or_else(|| MaskError::InvalidFormat("无法识别图片类型".to_string()))?;

        if kind.matcher_type() != infer::MatcherType::Image {
            return Err(MaskError::InvalidFormat(format!(
                "文件签名不是图片类型：{}",
                kind.mime_type()
            )));
        }

        Ok(())
    }

    /// 流式下载阶段的签名探测。
    ///
    /// 返回值：
    /// - `Ok(true)`：已识别为图片
    /// - `Ok(false)`：当前字节不足以判断，继续下载
    /// - `Err(...)`：已识别为非图片，或达到探测上限仍无法识别
    fn validate_stream_signature_probe(bytes: &[u8], probe_limit: usize) -> Result<bool, MaskError> {
        if bytes.is_empty() {
            return Ok(false);
        }

        if let Some(kind) = infer::get(bytes) {
            if kind.matcher_type() != infer::MatcherType::Image {
                return Err(MaskError::InvalidFormat(format!(
                    "下载内容不是图片类型：{}",
                    kind.mime_type()
                )));
            }
            return Ok(true);
        }

        if bytes.len() >= probe_limit {
            return Err(MaskError::InvalidFormat(format!(
                "下载前 {} 字节内无法识别图片类型",
                probe_limit
            )));
        }

        Ok(false)
    }
}

/// 日志用 URL：去掉查询串与片段，data URL 只保留长度。
pub(crate) fn redact_url_for_log(url: &str) -> String {
    if url.trim_start().get(..5).is_some_and(|p| p.eq_ignore_ascii_case("data:")) {
        return format!("<data-url {} bytes>", url.len());
    }

    let Ok(parsed) = reqwest::Url::parse(url) else {
        return "<invalid-url>".to_string();
    };

    let host = parsed.host_str().unwrap_or("<unknown-host>");
    let port = parsed.port().map(|p| format!(":{}", p)).unwrap_or_default();

    format!("{}://{}{}{}", parsed.scheme(), host, port, parsed.path())
}
