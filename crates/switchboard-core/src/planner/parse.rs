//! Tolerant parsing of oracle replies.
//!
//! Replies are free text that may contain JSON somewhere. Extraction is a
//! pipeline of stages, each tried only when the previous one found nothing
//! structured:
//!
//! ```text
//! reply ──► parse_whole ──► strip_code_fences + parse_whole ──► scan_balanced ──► None
//! ```
//!
//! Interpreters (`parse_plan`, `parse_verdict`, ...) sit on top of
//! [`extract_json`] and fall back to an empty/default value instead of
//! failing.

use serde_json::{Map, Value};

use super::Plan;
use crate::models::ToolCall;

/// Stage 1: the whole reply is JSON. Scalars don't count as structured.
pub fn parse_whole(text: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(text.trim()) {
        Ok(v @ (Value::Object(_) | Value::Array(_))) => Some(v),
        _ => None,
    }
}

/// Stage 2: drop Markdown code-fence marker lines (```` ``` ```` / ```` ```json ````).
pub fn strip_code_fences(text: &str) -> String {
    text.lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Stage 3: the first balanced `{...}` or `[...]` span that parses.
///
/// One pass pairs every opener with its closer; brackets inside string
/// literals are ignored and a mismatched closer abandons every open span.
/// Balanced spans are then tried in order of their openers, so a span that
/// does not parse falls through to the next one.
pub fn scan_balanced(text: &str) -> Option<Value> {
    let mut open: Vec<(usize, u8)> = Vec::new();
    let mut spans: Vec<(usize, usize)> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in text.as_bytes().iter().enumerate() {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' if !open.is_empty() => in_string = true,
            b'{' => open.push((i, b'}')),
            b'[' => open.push((i, b']')),
            b'}' | b']' => match open.pop() {
                Some((start, expected)) if expected == b => spans.push((start, i)),
                _ => open.clear(),
            },
            _ => {}
        }
    }

    spans.sort_unstable_by_key(|(start, _)| *start);
    spans
        .into_iter()
        .find_map(|(start, end)| parse_whole(&text[start..=end]))
}

/// Run the full extraction pipeline.
pub fn extract_json(text: &str) -> Option<Value> {
    parse_whole(text)
        .or_else(|| parse_whole(&strip_code_fences(text)))
        .or_else(|| scan_balanced(text))
}

/// Interpret a planning reply. Never fails; unreadable replies become the
/// empty plan (`tool_calls = []`, `is_final_answer = false`).
pub fn parse_plan(text: &str) -> Plan {
    let Some(value) = extract_json(text) else {
        tracing::warn!("[Planner] no JSON in oracle reply, using empty plan");
        return Plan::default();
    };

    match value {
        Value::Array(items) => Plan {
            tool_calls: collect_calls(&items),
            ..Plan::default()
        },
        Value::Object(obj) => plan_from_object(obj),
        _ => Plan::default(),
    }
}

fn plan_from_object(mut obj: Map<String, Value>) -> Plan {
    // {"tool_call": {...}} is shorthand for a one-element list.
    if !obj.contains_key("tool_calls") {
        if let Some(single) = obj.remove("tool_call") {
            obj.insert("tool_calls".to_string(), Value::Array(vec![single]));
        }
    }

    let tool_calls = match obj.get("tool_calls") {
        Some(Value::Array(items)) => collect_calls(items),
        Some(single @ Value::Object(_)) => collect_calls(std::slice::from_ref(single)),
        // A bare tool-call object with no wrapper.
        None if looks_like_call(&obj) => collect_calls(&[Value::Object(obj.clone())]),
        _ => Vec::new(),
    };

    Plan {
        tool_calls,
        is_final_answer: obj.get("is_final_answer").map(truthy).unwrap_or(false),
        answer: obj
            .get("answer")
            .or_else(|| obj.get("final_answer"))
            .and_then(|v| v.as_str())
            .map(str::to_string),
    }
}

fn looks_like_call(obj: &Map<String, Value>) -> bool {
    let has_target = ["target_capability_id", "capability_id", "service_id"]
        .iter()
        .any(|k| obj.contains_key(*k));
    has_target && obj.contains_key("action")
}

fn collect_calls(items: &[Value]) -> Vec<ToolCall> {
    items
        .iter()
        .filter_map(|item| match ToolCall::from_value(item) {
            Ok(call) => Some(call),
            Err(e) => {
                tracing::warn!("[Planner] dropping malformed tool call: {}", e);
                None
            }
        })
        .collect()
}

/// Interpret a refinement reply as a list of tool calls.
pub fn parse_tool_calls(text: &str) -> Vec<ToolCall> {
    parse_plan(text).tool_calls
}

/// Interpret a yes/no reply. JSON keys are checked first, then the
/// leading word of the text. Anything unclear is `false`.
pub fn parse_verdict(text: &str, keys: &[&str]) -> bool {
    if let Some(Value::Object(obj)) = extract_json(text) {
        if let Some(v) = keys.iter().find_map(|k| obj.get(*k)) {
            return truthy(v);
        }
    }
    let lowered = text.trim().trim_start_matches(['"', '\'', '*', '`']).to_lowercase();
    lowered.starts_with("yes") || lowered.starts_with("true")
}

/// The `reason` field of a verdict reply, if present.
pub fn parse_reason(text: &str) -> Option<String> {
    match extract_json(text) {
        Some(Value::Object(obj)) => obj
            .get("reason")
            .and_then(|v| v.as_str())
            .map(str::to_string),
        _ => None,
    }
}

/// Interpret a query-repair reply.
pub fn parse_repaired_query(text: &str) -> Option<String> {
    if let Some(Value::Object(obj)) = extract_json(text) {
        return obj
            .get("query")
            .or_else(|| obj.get("sql"))
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
    }
    let stripped = strip_code_fences(text);
    let candidate = stripped.trim();
    let lowered = candidate.to_lowercase();
    if lowered.starts_with("select") || lowered.starts_with("with") {
        Some(candidate.to_string())
    } else {
        None
    }
}

fn truthy(v: &Value) -> bool {
    match v {
        Value::Bool(b) => *b,
        Value::String(s) => matches!(s.trim().to_lowercase().as_str(), "true" | "yes" | "1"),
        Value::Number(n) => n.as_i64() == Some(1),
        _ => false,
    }
}
