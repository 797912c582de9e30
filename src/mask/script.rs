//! # 自定义变换脚本
//!
//! ## 设计思路
//!
//! 自定义变换以 Rhai 脚本形式下发，运行在受限引擎里（操作数、调用深度、字符串/Map 大小均有上限），
//! 脚本无法访问文件系统或网络，失控循环会被操作数上限终止。
//!
//! ## 实现思路
//!
//! - 引擎进程级单例（`Lazy`），注册 `luminance` / `clamp` / `hsv_to_rgb` 三个辅助函数。
//! - 编译结果放进进程级 LRU，键为去掉首尾空白后的源码原文，同一脚本只编译一次。
//!   换行对 Rhai 有语义（`//` 行注释到换行结束），因此键不折叠内部空白。
//! - 执行时把像素缓冲作为 `data`（Blob）放进 Scope，执行后再取回并校验长度。

use lru::LruCache;
use once_cell::sync::Lazy;
use rhai::{AST, Array, Blob, Dynamic, Engine, FLOAT, INT, Scope};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use super::MaskError;
use super::pixels::{clamp_channel, hsv_to_rgb, luminance};

/// 单次脚本执行允许的最大操作数。
const MAX_SCRIPT_OPERATIONS: u64 = 200_000_000;
/// 已编译脚本缓存条目上限。
const SCRIPT_CACHE_CAPACITY: usize = 64;

static ENGINE: Lazy<Engine> = Lazy::new(|| build_engine(MAX_SCRIPT_OPERATIONS));

static SCRIPT_CACHE: Lazy<Mutex<LruCache<String, Arc<AST>>>> = Lazy::new(|| {
    let capacity = NonZeroUsize::new(SCRIPT_CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN);
    Mutex::new(LruCache::new(capacity))
});

/// 脚本执行失败（不致命，由流水线记录后跳过该步）。
#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    #[error("脚本参数转换失败：{0}")]
    Args(String),

    #[error("脚本执行失败：{0}")]
    Runtime(String),

    #[error("脚本执行后 data 不再是字节数组")]
    MissingData,

    #[error("脚本输出长度异常：{actual}（期望：{expected}）")]
    LengthMismatch { expected: usize, actual: usize },
}

fn build_engine(max_operations: u64) -> Engine {
    let mut engine = Engine::new();

    engine.set_max_operations(max_operations);
    engine.set_max_call_levels(32);
    engine.set_max_expr_depths(64, 64);
    engine.set_max_string_size(10_000);
    engine.set_max_map_size(1_000);

    engine.on_print(|text| log::debug!("📜 脚本输出: {}", text));
    engine.on_debug(|text, _source, pos| log::debug!("📜 脚本调试 {:?}: {}", pos, text));

    engine.register_fn("luminance", |r: Dynamic, g: Dynamic, b: Dynamic| -> FLOAT {
        luminance(
            clamp_channel(to_f64(&r)),
            clamp_channel(to_f64(&g)),
            clamp_channel(to_f64(&b)),
        )
    });

    engine.register_fn("clamp", |v: Dynamic, lo: Dynamic, hi: Dynamic| -> Dynamic {
        match (v.as_int(), lo.as_int(), hi.as_int()) {
            (Ok(v), Ok(lo), Ok(hi)) => Dynamic::from(v.max(lo).min(hi)),
            _ => Dynamic::from(to_f64(&v).max(to_f64(&lo)).min(to_f64(&hi))),
        }
    });

    engine.register_fn("hsv_to_rgb", |h: Dynamic, s: Dynamic, v: Dynamic| -> Array {
        let (r, g, b) = hsv_to_rgb(to_f64(&h), to_f64(&s), to_f64(&v));
        vec![
            Dynamic::from(r as INT),
            Dynamic::from(g as INT),
            Dynamic::from(b as INT),
        ]
    });

    engine
}

fn to_f64(value: &Dynamic) -> f64 {
    value
        .as_float()
        .ok()
        .or_else(|| value.as_int().ok().map(|v| v as f64))
        .unwrap_or(f64::NAN)
}

/// 按源码原文查缓存，未命中时编译并写入缓存。
pub fn compile_cached(source: &str) -> Result<Arc<AST>, MaskError> {
    let source = source.trim();
    let mut cache = SCRIPT_CACHE
        .lock()
        .map_err(|_| MaskError::ResourceLimit("脚本缓存锁已损坏".to_string()))?;

    if let Some(ast) = cache.get(source) {
        log::debug!("♻️ 命中脚本缓存");
        return Ok(Arc::clone(ast));
    }

    let ast = ENGINE
        .compile(source)
        .map_err(|e| MaskError::TransformCompile(e.to_string()))?;
    let ast = Arc::new(ast);
    cache.put(source.to_string(), Arc::clone(&ast));
    log::debug!("🧩 脚本编译完成并缓存 - 当前条目: {}", cache.len());

    Ok(ast)
}

/// 在进程级引擎上执行脚本，返回脚本写回的像素缓冲。
pub fn run(
    ast: &AST,
    buffer: Vec<u8>,
    width: u32,
    height: u32,
    args: &serde_json::Map<String, serde_json::Value>,
) -> Result<Vec<u8>, ScriptError> {
    run_with(&ENGINE, ast, buffer, width, height, args)
}

fn run_with(
    engine: &Engine,
    ast: &AST,
    buffer: Vec<u8>,
    width: u32,
    height: u32,
    args: &serde_json::Map<String, serde_json::Value>,
) -> Result<Vec<u8>, ScriptError> {
    let expected = buffer.len();
    let args: Dynamic =
        rhai::serde::to_dynamic(args).map_err(|e| ScriptError::Args(e.to_string()))?;

    let mut scope = Scope::new();
    scope.push("data", Dynamic::from_blob(buffer));
    scope.push_constant("width", width as INT);
    scope.push_constant("height", height as INT);
    scope.push("args", args);

    engine
        .run_ast_with_scope(&mut scope, ast)
        .map_err(|e| ScriptError::Runtime(e.to_string()))?;

    let data = scope
        .get_value::<Blob>("data")
        .ok_or(ScriptError::MissingData)?;
    if data.len() != expected {
        return Err(ScriptError::LengthMismatch {
            expected,
            actual: data.len(),
        });
    }

    Ok(data)
}
