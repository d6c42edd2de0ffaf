//! LLM 输出解析 - 业务能力层
//!
//! 只负责"从原始文本里抠出 JSON"：
//! 1. 去掉 markdown 代码围栏（```json ... ```）
//! 2. 从第一个 `{` / `[` 定位到配对的收尾括号
//! 3. serde_json 解码
//!
//! 解码失败返回 `ParseError`（触发纠错子循环），和生成失败是两回事。

use regex::Regex;
use std::sync::OnceLock;

use crate::error::ParseError;
use crate::logger::truncate_text;

fn fence_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // (?s) 让 . 匹配换行；语言标记（json 等）可选
    RE.get_or_init(|| Regex::new(r"(?s)```[a-zA-Z]*\s*(.*?)```").expect("固定正则"))
}

/// 从原始 LLM 输出中提取 JSON 值
pub fn extract_json(raw: &str) -> Result<serde_json::Value, ParseError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ParseError::EmptyResponse);
    }

    // 优先取围栏内的内容
    let candidate = match fence_regex().captures(trimmed) {
        Some(caps) => caps.get(1).map(|m| m.as_str().trim()).unwrap_or(trimmed),
        None => trimmed,
    };

    let sliced = slice_outermost_json(candidate).ok_or_else(|| ParseError::NoJsonFound {
        preview: truncate_text(trimmed, 120),
    })?;

    serde_json::from_str(sliced).map_err(|e| ParseError::DecodeFailed {
        message: e.to_string(),
        preview: truncate_text(sliced, 120),
    })
}

/// 提取成题目数组
///
/// 顶层是数组直接用；顶层是单个对象就包成单元素数组
/// （模型偶尔会在 count=1 时省掉外层数组）。
pub fn extract_question_array(raw: &str) -> Result<Vec<serde_json::Value>, ParseError> {
    match extract_json(raw)? {
        serde_json::Value::Array(items) => Ok(items),
        obj @ serde_json::Value::Object(_) => Ok(vec![obj]),
        other => Err(ParseError::DecodeFailed {
            message: "顶层既不是数组也不是对象".to_string(),
            preview: truncate_text(&other.to_string(), 120),
        }),
    }
}

/// 定位最外层的 JSON 数组/对象：第一个 `{` 或 `[` 到与之配对的收尾括号
///
/// 括号计数时跳过字符串字面量和转义字符。
fn slice_outermost_json(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let start = bytes.iter().position(|&b| b == b'{' || b == b'[')?;
    let open = bytes[start];
    let close = if open == b'{' { b'}' } else { b']' };

    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            _ if b == open => depth += 1,
            _ if b == close => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}
