//! # 消息协议
//!
//! 宿主与 worker 之间只交换 JSON 消息：
//!
//! ```text
//! → { type: "create-mask", id, iconUrl, options }
//! ← { type: "create-mask-result", id, dataUrl: string | null, error? }
//! ```
//!
//! `id` 原样回传，用于宿主侧关联请求。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{MaskError, MaskOptions};

pub const CREATE_MASK: &str = "create-mask";
pub const CREATE_MASK_RESULT: &str = "create-mask-result";

/// 已识别的 `create-mask` 请求。
///
/// `iconUrl` 与 `options` 保留原始 JSON，延迟到处理时再校验，
/// 这样格式错误也能带着 `id` 回一条失败响应。
#[derive(Debug, Clone, PartialEq)]
pub struct CreateMaskRequest {
    pub id: Value,
    pub icon_url: Value,
    pub options: Value,
}

impl CreateMaskRequest {
    pub fn new(id: Value, icon_url: impl Into<String>, options: &MaskOptions) -> Result<Self, MaskError> {
        let options = serde_json::to_value(options)
            .map_err(|e| MaskError::InvalidFormat(format!("options 序列化失败：{}", e)))?;
        Ok(Self {
            id,
            icon_url: Value::String(icon_url.into()),
            options,
        })
    }

    /// 识别入站消息；不是 `create-mask` 或缺少 `id` 时返回 `None`。
    pub fn from_message(message: &Value) -> Option<Self> {
        let object = message.as_object()?;
        if object.get("type").and_then(Value::as_str) != Some(CREATE_MASK) {
            return None;
        }
        let id = object.get("id")?.clone();

        Some(Self {
            id,
            icon_url: object.get("iconUrl").cloned().unwrap_or(Value::Null),
            options: object.get("options").cloned().unwrap_or(Value::Null),
        })
    }

    /// 转为线上消息。
    pub fn to_message(&self) -> Value {
        let mut object = Map::new();
        object.insert("type".to_string(), Value::String(CREATE_MASK.to_string()));
        object.insert("id".to_string(), self.id.clone());
        object.insert("iconUrl".to_string(), self.icon_url.clone());
        object.insert("options".to_string(), self.options.clone());
        Value::Object(object)
    }

    pub fn icon_url(&self) -> Result<&str, MaskError> {
        self.icon_url
            .as_str()
            .ok_or_else(|| MaskError::InvalidFormat("iconUrl 必须是字符串".to_string()))
    }

    /// 解析请求参数，缺省或 `null` 时使用默认值。
    pub fn options(&self) -> Result<MaskOptions, MaskError> {
        if self.options.is_null() {
            return Ok(MaskOptions::default());
        }
        MaskOptions::deserialize(&self.options)
            .map_err(|e| MaskError::InvalidFormat(format!("options 格式错误：{}", e)))
    }
}

/// `create-mask-result` 响应。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMaskResult {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: Value,
    pub data_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CreateMaskResult {
    pub fn success(id: Value, data_url: String) -> Self {
        Self {
            kind: CREATE_MASK_RESULT.to_string(),
            id,
            data_url: Some(data_url),
            error: None,
        }
    }

    pub fn failure(id: Value, error: &MaskError) -> Self {
        Self {
            kind: CREATE_MASK_RESULT.to_string(),
            id,
            data_url: None,
            error: Some(error.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.data_url.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn recognizes_create_mask_requests() {
        let message = json!({
            "type": "create-mask",
            "id": {"seq": 7},
            "iconUrl": "https://example.com/a.png",
            "options": {"size": 48}
        });

        let request = CreateMaskRequest::from_message(&message).expect("request expected");
        assert_eq!(request.id, json!({"seq": 7}));
        assert_eq!(request.icon_url().expect("url"), "https://example.com/a.png");
        assert_eq!(request.options().expect("options").size, 48);
    }

    #[test]
    fn ignores_unrecognized_messages() {
        for message in [
            json!("create-mask"),
            json!(null),
            json!([1, 2]),
            json!({"type": "ping", "id": 1}),
            json!({"id": 1, "iconUrl": "https://example.com/a.png"}),
            json!({"type": "create-mask", "iconUrl": "https://example.com/a.png"}),
        ] {
            assert_eq!(CreateMaskRequest::from_message(&message), None, "{}", message);
        }
    }

    #[test]
    fn missing_options_use_defaults_and_bad_options_fail() {
        let request = CreateMaskRequest::from_message(&json!({"type": "create-mask", "id": 1, "iconUrl": "x"}))
            .expect("request expected");
        assert_eq!(request.options().expect("defaults"), MaskOptions::default());

        let request = CreateMaskRequest::from_message(
            &json!({"type": "create-mask", "id": 1, "iconUrl": "x", "options": {"size": "big"}}),
        )
        .expect("request expected");
        assert!(matches!(request.options(), Err(MaskError::InvalidFormat(_))));

        let request = CreateMaskRequest::from_message(&json!({"type": "create-mask", "id": 1, "iconUrl": 5}))
            .expect("request expected");
        assert!(matches!(request.icon_url(), Err(MaskError::InvalidFormat(_))));
    }

    #[test]
    fn request_roundtrips_through_wire_form() {
        let request = CreateMaskRequest::new(json!("abc"), "data:image/png;base64,AAAA", &MaskOptions::default())
            .expect("request should build");
        let parsed = CreateMaskRequest::from_message(&request.to_message()).expect("request expected");

        assert_eq!(parsed.id, json!("abc"));
        assert_eq!(parsed.options().expect("options"), MaskOptions::default());
    }

    #[test]
    fn result_serialization_omits_error_on_success() {
        let ok = serde_json::to_value(CreateMaskResult::success(json!(1), "data:x".to_string()))
            .expect("serialize");
        assert_eq!(ok, json!({"type": "create-mask-result", "id": 1, "dataUrl": "data:x"}));

        let failed = serde_json::to_value(CreateMaskResult::failure(
            json!(2),
            &MaskError::Network("HTTP 404: 未找到".to_string()),
        ))
        .expect("serialize");
        assert_eq!(failed["dataUrl"], Value::Null);
        assert!(failed["error"].as_str().expect("error string").contains("404"));
    }
}
