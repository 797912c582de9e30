//! # 像素变换流水线
//!
//! ## 设计思路
//!
//! 蒙版生成后可按顺序执行若干变换步骤。每一步以 `{ code, args }` 下发：
//! - `code` 命中内置注册表（大小写不敏感）时走原生实现；
//! - 否则视为自定义 Rhai 脚本，编译后按源码原文缓存。
//!
//! ## 实现思路
//!
//! - 先把所有步骤解析为 `Transform`，任何一步编译失败都让整个请求失败。
//! - 执行时每一步都从画布重新读取像素、写回后再进入下一步，保证组合顺序可预期。
//! - 脚本执行失败只记录警告并跳过该步，之前的结果保留。

use once_cell::sync::Lazy;
use rhai::AST;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

use super::MaskError;
use super::pixels::{CHANNELS, NORMALIZE_ALPHA_THRESHOLD, clamp_channel, hsv_to_rgb};
use super::script::{self, ScriptError};
use super::surface::RenderSurface;

/// 线上格式的变换步骤。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformStep {
    pub code: String,
    #[serde(default, deserialize_with = "deserialize_args")]
    pub args: Map<String, Value>,
}

impl TransformStep {
    pub fn new(code: impl Into<String>, args: Map<String, Value>) -> Self {
        Self {
            code: code.into(),
            args,
        }
    }
}

/// `args: null` 与缺省等价。
fn deserialize_args<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Map<String, Value>>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BuiltinKind {
    AngularRainbow,
    SolidRecolor,
}

static BUILTINS: Lazy<HashMap<&'static str, BuiltinKind>> = Lazy::new(|| {
    HashMap::from([
        ("rainbow", BuiltinKind::AngularRainbow),
        ("angular-rainbow", BuiltinKind::AngularRainbow),
        ("rainbow-colorize", BuiltinKind::AngularRainbow),
        ("solid", BuiltinKind::SolidRecolor),
        ("solid-recolor", BuiltinKind::SolidRecolor),
        ("recolor", BuiltinKind::SolidRecolor),
    ])
});

/// 折叠连续空白并去掉首尾空白。
pub fn normalize_code(code: &str) -> String {
    code.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 变换参数：数值可以是 JSON 数字或数字字符串，其余情况回退到默认值。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransformArgs(Map<String, Value>);

impl TransformArgs {
    pub fn number(&self, key: &str, default: f64) -> f64 {
        let parsed = match self.0.get(key) {
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        parsed.filter(|v| v.is_finite()).unwrap_or(default)
    }

    fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

/// 解析后的变换。
#[derive(Debug, Clone)]
pub enum Transform {
    Rainbow(TransformArgs),
    SolidRecolor(TransformArgs),
    Custom { script: Arc<AST>, args: TransformArgs },
}

impl Transform {
    /// 内置注册表优先，未命中则编译为自定义脚本。
    pub fn resolve(step: &TransformStep) -> Result<Self, MaskError> {
        let normalized = normalize_code(&step.code);
        let args = TransformArgs(step.args.clone());

        match BUILTINS.get(normalized.to_lowercase().as_str()) {
            Some(BuiltinKind::AngularRainbow) => Ok(Self::Rainbow(args)),
            Some(BuiltinKind::SolidRecolor) => Ok(Self::SolidRecolor(args)),
            None => {
                let script = script::compile_cached(&step.code)?;
                Ok(Self::Custom { script, args })
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Rainbow(_) => "rainbow",
            Self::SolidRecolor(_) => "solid",
            Self::Custom { .. } => "custom",
        }
    }

    /// 对一份像素缓冲执行变换，返回新缓冲。
    pub fn apply(&self, mut buffer: Vec<u8>, width: u32, height: u32) -> Result<Vec<u8>, ScriptError> {
        match self {
            Self::Rainbow(args) => {
                angular_rainbow(&mut buffer, width, height, args.number("opacity", 1.0));
                Ok(buffer)
            }
            Self::SolidRecolor(args) => {
                let color = [
                    clamp_channel(args.number("r", 255.0)),
                    clamp_channel(args.number("g", 255.0)),
                    clamp_channel(args.number("b", 255.0)),
                ];
                solid_recolor(&mut buffer, color, args.number("opacity", 1.0));
                Ok(buffer)
            }
            Self::Custom { script, args } => script::run(script, buffer, width, height, args.as_map()),
        }
    }
}

/// 以画布中心为原点，顶部为 0°、顺时针递增，把角度映射为色相。
fn angular_rainbow(buffer: &mut [u8], width: u32, height: u32, opacity: f64) {
    let cx = width as f64 / 2.0;
    let cy = height as f64 / 2.0;

    for (index, px) in buffer.chunks_exact_mut(CHANNELS).enumerate() {
        if px[3] < NORMALIZE_ALPHA_THRESHOLD {
            continue;
        }
        let x = (index % width as usize) as f64;
        let y = (index / width as usize) as f64;
        let dx = x - cx;
        let dy = y - cy;

        let angle = dx.atan2(-dy).to_degrees().rem_euclid(360.0);
        let (r, g, b) = hsv_to_rgb(angle, 1.0, 1.0);

        px[0] = r;
        px[1] = g;
        px[2] = b;
        px[3] = clamp_channel(px[3] as f64 * opacity);
    }
}

fn solid_recolor(buffer: &mut [u8], color: [u8; 3], opacity: f64) {
    for px in buffer.chunks_exact_mut(CHANNELS) {
        if px[3] < NORMALIZE_ALPHA_THRESHOLD {
            continue;
        }
        px[..3].copy_from_slice(&color);
        px[3] = clamp_channel(px[3] as f64 * opacity);
    }
}

/// 依次执行流水线，返回成功执行的步骤数。
pub fn apply_pipeline(surface: &mut RenderSurface, steps: &[TransformStep]) -> Result<usize, MaskError> {
    if steps.is_empty() {
        return Ok(0);
    }

    let transforms = steps
        .iter()
        .map(Transform::resolve)
        .collect::<Result<Vec<_>, _>>()?;

    let size = surface.size();
    let mut applied = 0;

    for (index, transform) in transforms.iter().enumerate() {
        let buffer = surface.read_pixels();
        match transform.apply(buffer, size, size) {
            Ok(buffer) => {
                surface.write_pixels(buffer)?;
                applied += 1;
                log::debug!("🎨 变换步骤 #{} ({}) 完成", index, transform.name());
            }
            Err(e) => {
                log::warn!("⚠️ 变换步骤 #{} ({}) 执行失败，已跳过: {}", index, transform.name(), e);
            }
        }
    }

    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::imageops::FilterType;
    use serde_json::json;

    fn step(code: &str, args: Value) -> TransformStep {
        TransformStep::new(code, args.as_object().cloned().unwrap_or_default())
    }

    /// 全白、全不透明的蒙版画布。
    fn white_surface(size: u32) -> RenderSurface {
        let mut surface = RenderSurface::new(size, 512, FilterType::Triangle).expect("surface");
        surface
            .write_pixels(vec![255; size as usize * size as usize * CHANNELS])
            .expect("write should succeed");
        surface
    }

    #[test]
    fn registry_lookup_is_case_and_whitespace_insensitive() {
        assert!(matches!(
            Transform::resolve(&step("  Angular-Rainbow \n", json!({}))),
            Ok(Transform::Rainbow(_))
        ));
        assert!(matches!(
            Transform::resolve(&step("RECOLOR", json!({}))),
            Ok(Transform::SolidRecolor(_))
        ));
        assert!(matches!(
            Transform::resolve(&step("rainbow-colorize", json!({}))),
            Ok(Transform::Rainbow(_))
        ));
    }

    #[test]
    fn args_accept_numbers_and_numeric_strings() {
        let args = TransformArgs(json!({"r": 12, "g": "34", "b": "oops", "opacity": null})
            .as_object()
            .cloned()
            .unwrap_or_default());

        assert_eq!(args.number("r", 255.0), 12.0);
        assert_eq!(args.number("g", 255.0), 34.0);
        assert_eq!(args.number("b", 255.0), 255.0);
        assert_eq!(args.number("opacity", 1.0), 1.0);
        assert_eq!(args.number("missing", 0.5), 0.5);
    }

    #[test]
    fn null_args_deserialize_as_empty() {
        let parsed: TransformStep =
            serde_json::from_str(r#"{"code": "rainbow", "args": null}"#).expect("step should parse");
        assert!(parsed.args.is_empty());

        let parsed: TransformStep = serde_json::from_str(r#"{"code": "solid"}"#).expect("step should parse");
        assert!(parsed.args.is_empty());
    }

    #[test]
    fn rainbow_then_solid_ends_solid() {
        let mut surface = white_surface(16);
        let steps = [step("rainbow", json!({})), step("solid", json!({"r": 10, "g": 20, "b": 30}))];

        assert_eq!(apply_pipeline(&mut surface, &steps).expect("pipeline"), 2);
        assert!(surface.pixels().chunks_exact(4).all(|px| px == [10, 20, 30, 255]));
    }

    #[test]
    fn solid_then_rainbow_ends_as_gradient() {
        let mut surface = white_surface(16);
        let steps = [step("solid", json!({"r": 10, "g": 20, "b": 30})), step("rainbow", json!({}))];

        apply_pipeline(&mut surface, &steps).expect("pipeline");

        let pixels = surface.pixels();
        let at = |x: usize, y: usize| -> [u8; 4] {
            let idx = (y * 16 + x) * 4;
            [pixels[idx], pixels[idx + 1], pixels[idx + 2], pixels[idx + 3]]
        };
        // 顶部中间偏红，右侧中间偏黄绿，底部中间偏青
        assert_eq!(at(8, 0)[0], 255);
        assert!(at(15, 8)[1] > 200);
        assert!(at(8, 15)[2] > 200);
        assert!(pixels.chunks_exact(4).all(|px| px[3] == 255));
    }

    #[test]
    fn rainbow_angle_is_measured_from_integer_pixel_coordinates() {
        let mut buffer = vec![255; 4 * 4 * CHANNELS];
        angular_rainbow(&mut buffer, 4, 4, 1.0);

        let at = |x: usize, y: usize| &buffer[(y * 4 + x) * 4..(y * 4 + x) * 4 + 3];
        // (2,0) 在中心 (2,2) 正上方，(2,3) 在正下方
        assert_eq!(at(2, 0), &[255, 0, 0]);
        assert_eq!(at(2, 3), &[0, 255, 255]);
    }

    #[test]
    fn rainbow_skips_faint_pixels_and_applies_opacity() {
        let mut buffer = vec![255, 255, 255, 9, 255, 255, 255, 200];
        angular_rainbow(&mut buffer, 2, 1, 0.5);

        assert_eq!(&buffer[..4], &[255, 255, 255, 9]);
        assert_eq!(buffer[7], 100);
    }

    #[test]
    fn solid_defaults_to_white_and_clamps_channels() {
        let transform = Transform::resolve(&step("solid", json!({"r": 400, "g": -5})))
            .expect("resolve should succeed");
        let out = transform
            .apply(vec![0, 0, 0, 255, 0, 0, 0, 0], 2, 1)
            .expect("builtin never fails");

        assert_eq!(&out[..4], &[255, 0, 255, 255]);
        assert_eq!(&out[4..], &[0, 0, 0, 0]);
    }

    #[test]
    fn custom_compile_failure_fails_whole_pipeline() {
        let mut surface = white_surface(4);
        let before = surface.read_pixels();
        let steps = [step("solid", json!({"r": 0})), step("let = ;", json!({}))];

        let result = apply_pipeline(&mut surface, &steps);
        assert!(matches!(result, Err(MaskError::TransformCompile(_))));
        assert_eq!(surface.read_pixels(), before);
    }

    #[test]
    fn custom_runtime_failure_is_skipped() {
        let mut surface = white_surface(4);
        let steps = [
            step("solid", json!({"r": 1, "g": 2, "b": 3})),
            step("throw \"boom\";", json!({})),
            step("data = blob(1);", json!({})),
        ];

        assert_eq!(apply_pipeline(&mut surface, &steps).expect("pipeline"), 1);
        assert!(surface.pixels().chunks_exact(4).all(|px| px == [1, 2, 3, 255]));
    }

    #[test]
    fn custom_scripts_differing_in_newlines_are_cached_separately() {
        let live = "// clear alpha\nlet i = 3; while i < data.len() { data[i] = 0; i += 4; }";
        let inert = "// clear alpha let i = 3; while i < data.len() { data[i] = 0; i += 4; }";

        for order in [[live, inert], [inert, live]] {
            for code in order {
                let mut surface = white_surface(2);
                apply_pipeline(&mut surface, &[step(code, json!({}))]).expect("pipeline");
                let expected = if code == live { 0 } else { 255 };
                assert!(
                    surface.pixels().chunks_exact(4).all(|px| px[3] == expected),
                    "code={:?}",
                    code
                );
            }
        }
    }

    #[test]
    fn custom_script_receives_args() {
        let mut surface = white_surface(2);
        let code = "let i = 3;\nwhile i < data.len() {\n  data[i] = args.alpha;\n  i += 4;\n}";

        apply_pipeline(&mut surface, &[step(code, json!({"alpha": 42}))]).expect("pipeline");
        assert!(surface.pixels().chunks_exact(4).all(|px| px[3] == 42));
    }
}
