//! Result normalization.
//!
//! Capabilities answer in whatever shape suits them. The normalizer turns
//! each payload into a [`NormalizedRecord`] so that merging, deduplication
//! and synthesis work on one schema.
//!
//! Normalization never fails: a payload that cannot be interpreted becomes a
//! record whose content is the payload's JSON text.

pub mod source;

use serde_json::{Map, Value};

use crate::models::{CapabilityResult, NormalizedRecord, SourceType};
use source::{domain_of, extract_source, str_field, summarize_domains};

pub use source::UNKNOWN_SOURCE;

const CONTENT_KEYS: &[&str] = &[
    "content",
    "text",
    "page_content",
    "chunk",
    "body",
    "snippet",
    "description",
    "answer",
    "output",
];
const SCORE_KEYS: &[&str] = &["relevance_score", "score", "similarity"];
const DOCUMENT_LIST_KEYS: &[&str] = &["results", "documents", "chunks", "matches"];
const ROW_LIST_KEYS: &[&str] = &["rows", "data", "records"];
const ENVELOPE_KEYS: &[&str] = &["service_id", "action", "parameters", "status", "timestamp"];

#[derive(Debug, thiserror::Error)]
enum NormalizeError {
    #[error("payload is not a JSON object")]
    NotAnObject,

    #[error("field '{0}' has an unexpected shape")]
    MalformedField(&'static str),
}

#[derive(Debug, Default, Clone)]
pub struct Normalizer;

impl Normalizer {
    pub fn new() -> Self {
        Self
    }

    /// Normalize one raw payload. `hint` overrides type inference.
    pub fn normalize(&self, raw: &Value, hint: Option<SourceType>) -> NormalizedRecord {
        let kind = hint.unwrap_or_else(|| infer_type(raw));
        match try_normalize(raw, kind) {
            Ok(record) => record,
            Err(e) => {
                tracing::debug!("[Normalizer] falling back to raw text ({}): {}", kind, e);
                fallback_record(raw, hint)
            }
        }
    }

    /// Normalize each element, inferring its type independently.
    pub fn normalize_list(&self, raw_results: &[Value]) -> Vec<NormalizedRecord> {
        raw_results.iter().map(|raw| self.normalize(raw, None)).collect()
    }

    /// Records for one capability result.
    ///
    /// Row sets and document lists expand into one record per item; search
    /// results collapse into a single record. Error results yield nothing.
    pub fn records_from_result(
        &self,
        result: &CapabilityResult,
        hint: Option<SourceType>,
    ) -> Vec<NormalizedRecord> {
        if !result.is_success() {
            return Vec::new();
        }
        let raw = result.to_raw();
        let kind = hint.unwrap_or_else(|| infer_type(&raw));
        let payload = result.payload.as_ref().unwrap_or(&Value::Null);

        match kind {
            SourceType::Sql => match list_at(payload, ROW_LIST_KEYS) {
                Some(rows) => self.row_records(result, rows),
                None => vec![self.normalize(&raw, Some(kind))],
            },
            SourceType::Retrieval => match list_at(payload, DOCUMENT_LIST_KEYS) {
                Some(docs) if !docs.is_empty() => docs
                    .iter()
                    .map(|doc| self.normalize(doc, Some(SourceType::Retrieval)))
                    .collect(),
                _ => vec![self.normalize(&raw, Some(kind))],
            },
            _ => vec![self.normalize(&raw, Some(kind))],
        }
    }

    fn row_records(&self, result: &CapabilityResult, rows: &[Value]) -> Vec<NormalizedRecord> {
        let mut base_meta = Map::new();
        base_meta.insert("source".into(), Value::String(result.capability_id.clone()));
        base_meta.insert("action".into(), Value::String(result.action.clone()));
        if let Some(query) = result.parameters.get("query").or_else(|| result.parameters.get("sql")) {
            base_meta.insert("query".into(), query.clone());
        }

        if rows.is_empty() {
            let item = serde_json::json!({
                "content": "The query returned no rows.",
                "title": format!("{} result", result.capability_id),
                "metadata": base_meta,
            });
            return vec![self.normalize(&item, Some(SourceType::Sql))];
        }

        rows.iter()
            .enumerate()
            .map(|(i, row)| {
                let mut meta = base_meta.clone();
                meta.insert("row_index".into(), Value::from(i));
                let item = serde_json::json!({
                    "content": compact(row),
                    "title": format!("{} row {}", result.capability_id, i + 1),
                    "metadata": meta,
                });
                self.normalize(&item, Some(SourceType::Sql))
            })
            .collect()
    }
}

/// Type from an explicit `source_type`, else from id/action substrings.
fn infer_type(raw: &Value) -> SourceType {
    let Some(obj) = raw.as_object() else {
        return SourceType::Generic;
    };
    if let Some(explicit) = str_field(obj, "source_type").and_then(|s| s.parse().ok()) {
        return explicit;
    }
    let id = ["service_id", "capability_id", "server"]
        .iter()
        .find_map(|k| str_field(obj, k))
        .unwrap_or("");
    let action = str_field(obj, "action").unwrap_or("");
    if id.is_empty() && action.is_empty() {
        return SourceType::Generic;
    }
    SourceType::infer(&format!("{} {}", id, action))
}

/// The record-shaped view of a payload: the `result` object's fields with
/// the envelope's own fields layered on top.
fn record_view(raw: &Value) -> Result<Map<String, Value>, NormalizeError> {
    let obj = raw.as_object().ok_or(NormalizeError::NotAnObject)?;
    let mut view = match obj.get("result") {
        Some(Value::Object(inner)) => inner.clone(),
        _ => Map::new(),
    };
    for (k, v) in obj {
        if k != "result" && !ENVELOPE_KEYS.contains(&k.as_str()) {
            view.insert(k.clone(), v.clone());
        }
    }
    match view.get("metadata") {
        None | Some(Value::Object(_)) | Some(Value::Null) => Ok(view),
        Some(_) => Err(NormalizeError::MalformedField("metadata")),
    }
}

fn try_normalize(raw: &Value, kind: SourceType) -> Result<NormalizedRecord, NormalizeError> {
    let view = record_view(raw)?;

    let mut record = NormalizedRecord {
        id: str_field(&view, "id")
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
        content: String::new(),
        title: str_field(&view, "title").unwrap_or("").to_string(),
        url: str_field(&view, "url").unwrap_or("").to_string(),
        source: extract_source(&view),
        source_type: kind,
        relevance_score: score_of(&view).unwrap_or(0.0),
        metadata: match view.get("metadata") {
            Some(Value::Object(m)) => m.clone(),
            _ => Map::new(),
        },
    };
    if let Some(obj) = raw.as_object() {
        for (from, to) in [("service_id", "capability_id"), ("action", "action")] {
            if let Some(v) = str_field(obj, from) {
                record
                    .metadata
                    .entry(to.to_string())
                    .or_insert_with(|| Value::String(v.to_string()));
            }
        }
    }

    match kind {
        SourceType::Search => match search_results(raw)? {
            Some(results) => fill_search(&mut record, &view, raw, results),
            None => record.content = generic_content(&view, raw),
        },
        SourceType::Retrieval => record.content = generic_content(&view, raw),
        SourceType::Download => {
            record.content = download_content(&view, raw);
            if record.source == UNKNOWN_SOURCE {
                if let Some(name) = str_field(&view, "file_name").or_else(|| str_field(&view, "filename")) {
                    record.source = name.to_string();
                }
            }
        }
        SourceType::Sql => record.content = sql_content(&view, raw),
        SourceType::Dns => {
            record.content = dns_content(&view, raw);
            if record.title.is_empty() {
                if let Some(domain) = str_field(&view, "domain").or_else(|| str_field(&view, "hostname")) {
                    record.title = format!("DNS records for {}", domain);
                }
            }
        }
        SourceType::Generic | SourceType::Unknown => record.content = generic_content(&view, raw),
    }

    Ok(record)
}

fn fallback_record(raw: &Value, hint: Option<SourceType>) -> NormalizedRecord {
    let source = raw
        .as_object()
        .map(extract_source)
        .unwrap_or_else(|| UNKNOWN_SOURCE.to_string());
    NormalizedRecord {
        id: uuid::Uuid::new_v4().to_string(),
        content: match raw {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        },
        title: String::new(),
        url: String::new(),
        source,
        source_type: hint.unwrap_or(SourceType::Unknown),
        relevance_score: 0.0,
        metadata: Map::new(),
    }
}

/// `result.result.results`, `result.results`, or `results`.
fn search_results(raw: &Value) -> Result<Option<&Vec<Value>>, NormalizeError> {
    let candidates = [
        raw.get("result").and_then(|r| r.get("result")).and_then(|r| r.get("results")),
        raw.get("result").and_then(|r| r.get("results")),
        raw.get("results"),
    ];
    match candidates.into_iter().flatten().next() {
        None => Ok(None),
        Some(Value::Array(items)) => Ok(Some(items)),
        Some(_) => Err(NormalizeError::MalformedField("results")),
    }
}

fn fill_search(
    record: &mut NormalizedRecord,
    view: &Map<String, Value>,
    raw: &Value,
    results: &[Value],
) {
    let mut blocks = Vec::with_capacity(results.len());
    let mut domains = Vec::new();
    let mut best_score: Option<f64> = None;

    for item in results {
        let Some(obj) = item.as_object() else {
            blocks.push(compact(item));
            continue;
        };
        let mut block = Vec::new();
        if let Some(title) = str_field(obj, "title") {
            block.push(format!("Title: {}", title));
        }
        if let Some(url) = str_field(obj, "url").or_else(|| str_field(obj, "link")) {
            block.push(format!("URL: {}", url));
            domains.push(domain_of(url));
        }
        if let Some(desc) = ["description", "snippet", "content"]
            .iter()
            .find_map(|k| str_field(obj, k))
        {
            block.push(format!("Description: {}", desc));
        }
        if let Some(score) = score_of(obj) {
            best_score = Some(best_score.map_or(score, |b| b.max(score)));
        }
        blocks.push(block.join("\n"));
    }
    record.content = blocks.join("\n\n");
    if let Some(score) = best_score {
        record.relevance_score = score;
    }

    match results {
        [single] => {
            if let Some(obj) = single.as_object() {
                record.source = extract_source(obj);
                if let Some(title) = str_field(obj, "title") {
                    record.title = title.to_string();
                }
                if let Some(url) = str_field(obj, "url").or_else(|| str_field(obj, "link")) {
                    record.url = url.to_string();
                }
            }
        }
        [] => {}
        _ => {
            if let Some(summary) = summarize_domains(&domains) {
                record.source = summary;
            }
            if record.title.is_empty() {
                record.title = match query_of(view, raw) {
                    Some(q) => format!("Search results for '{}'", q),
                    None => "Search results".to_string(),
                };
            }
        }
    }
    if record.content.is_empty() {
        record.content = "No search results.".to_string();
    }
}

fn query_of<'a>(view: &'a Map<String, Value>, raw: &'a Value) -> Option<&'a str> {
    str_field(view, "query").or_else(|| {
        raw.get("parameters")
            .and_then(|p| p.as_object())
            .and_then(|p| str_field(p, "query"))
    })
}

fn generic_content(view: &Map<String, Value>, raw: &Value) -> String {
    if let Some(text) = CONTENT_KEYS.iter().find_map(|k| str_field(view, k)) {
        return text.to_string();
    }
    match raw.get("result") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => {
            let rest: Map<String, Value> = view
                .iter()
                .filter(|(k, _)| !["id", "title", "url", "source", "source_type", "metadata"].contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            if rest.is_empty() {
                String::new()
            } else {
                compact(&Value::Object(rest))
            }
        }
        Some(other) => compact(other),
    }
}

fn download_content(view: &Map<String, Value>, raw: &Value) -> String {
    if let Some(text) = CONTENT_KEYS.iter().find_map(|k| str_field(view, k)) {
        return text.to_string();
    }
    let name = str_field(view, "file_name").or_else(|| str_field(view, "filename"));
    let Some(name) = name else {
        return generic_content(view, raw);
    };
    let mut line = format!("Downloaded file {}", name);
    let size = view.get("size").or_else(|| view.get("size_bytes")).and_then(|v| v.as_u64());
    let mime = str_field(view, "content_type").or_else(|| str_field(view, "mime_type"));
    match (size, mime) {
        (Some(size), Some(mime)) => line.push_str(&format!(" ({} bytes, {})", size, mime)),
        (Some(size), None) => line.push_str(&format!(" ({} bytes)", size)),
        (None, Some(mime)) => line.push_str(&format!(" ({})", mime)),
        (None, None) => {}
    }
    if let Some(path) = str_field(view, "stored_file_path").or_else(|| str_field(view, "path")) {
        line.push_str(&format!(", stored at {}", path));
    }
    line
}

fn sql_content(view: &Map<String, Value>, raw: &Value) -> String {
    let rows = ROW_LIST_KEYS.iter().find_map(|k| view.get(*k).and_then(|v| v.as_array()));
    let Some(rows) = rows else {
        return generic_content(view, raw);
    };
    let mut lines = Vec::with_capacity(rows.len() + 1);
    if let Some(Value::Array(cols)) = view.get("columns") {
        let names: Vec<String> = cols
            .iter()
            .map(|c| c.as_str().map(str::to_string).unwrap_or_else(|| compact(c)))
            .collect();
        lines.push(format!("columns: {}", names.join(", ")));
    }
    lines.extend(rows.iter().map(compact));
    if rows.is_empty() {
        lines.push("The query returned no rows.".to_string());
    }
    lines.join("\n")
}

fn dns_content(view: &Map<String, Value>, raw: &Value) -> String {
    let records = ["records", "answers", "answer"]
        .iter()
        .find_map(|k| view.get(*k).and_then(|v| v.as_array()));
    let Some(records) = records else {
        return generic_content(view, raw);
    };
    records
        .iter()
        .map(|r| match r.as_object() {
            Some(obj) => {
                let kind = str_field(obj, "type").unwrap_or("?");
                let name = str_field(obj, "name").unwrap_or("");
                let value = obj
                    .get("value")
                    .or_else(|| obj.get("data"))
                    .or_else(|| obj.get("address"))
                    .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| compact(v)))
                    .unwrap_or_default();
                format!("{} {} {}", kind, name, value).trim().to_string()
            }
            None => compact(r),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn score_of(obj: &Map<String, Value>) -> Option<f64> {
    SCORE_KEYS
        .iter()
        .find_map(|k| obj.get(*k).and_then(|v| v.as_f64()))
        .filter(|s| s.is_finite())
}

/// An item list at one of `keys`, or the payload itself when it is a list.
fn list_at<'a>(payload: &'a Value, keys: &[&str]) -> Option<&'a [Value]> {
    if let Value::Array(items) = payload {
        return Some(items);
    }
    keys.iter()
        .find_map(|k| payload.get(*k).and_then(|v| v.as_array()))
        .map(Vec::as_slice)
}

fn compact(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ToolCall;
    use serde_json::json;

    #[test]
    fn test_infers_type_from_envelope() {
        let n = Normalizer::new();
        let record = n.normalize(
            &json!({"service_id": "brave", "action": "web_search", "result": {"results": []}}),
            None,
        );
        assert_eq!(record.source_type, SourceType::Search);
        let record = n.normalize(&json!({"service_id": "misc", "action": "ping", "result": "pong"}), None);
        assert_eq!(record.source_type, SourceType::Generic);
        assert_eq!(record.content, "pong");
    }

    #[test]
    fn test_metadata_source_survives_generic_top_level() {
        let n = Normalizer::new();
        let record = n.normalize(
            &json!({"content": "x", "source": "Document", "metadata": {"source": "Q3 report"}}),
            Some(SourceType::Retrieval),
        );
        assert_eq!(record.source, "Q3 report");
    }

    #[test]
    fn test_search_single_result_uses_its_own_source() {
        let n = Normalizer::new();
        let raw = json!({
            "service_id": "brave",
            "action": "web_search",
            "result": {"result": {"results": [
                {"title": "Tokio", "url": "https://tokio.rs/tokio/tutorial", "description": "Async runtime"}
            ]}}
        });
        let record = n.normalize(&raw, None);
        assert_eq!(record.source, "tokio.rs");
        assert_eq!(record.title, "Tokio");
        assert_eq!(record.url, "https://tokio.rs/tokio/tutorial");
        assert!(record.content.contains("Title: Tokio"));
        assert!(record.content.contains("Description: Async runtime"));
    }

    #[test]
    fn test_search_many_results_names_domains() {
        let n = Normalizer::new();
        let raw = json!({
            "service_id": "web",
            "parameters": {"query": "rust async"},
            "results": [
                {"title": "A", "url": "https://a.com/1", "description": "one"},
                {"title": "B", "url": "https://b.com/2", "description": "two"},
                {"title": "C", "url": "https://c.com/3", "description": "three"},
                {"title": "D", "url": "https://d.com/4", "description": "four"}
            ]
        });
        let record = n.normalize(&raw, Some(SourceType::Search));
        assert_eq!(record.source, "Search results from a.com, b.com, c.com …");
        assert_eq!(record.title, "Search results for 'rust async'");
        assert_eq!(record.content.matches("Title: ").count(), 4);
    }

    #[test]
    fn test_retrieval_passes_text_and_score() {
        let n = Normalizer::new();
        let record = n.normalize(
            &json!({"text": "Refunds take 5 days.", "score": 0.82, "metadata": {"file_name": "policy.md"}}),
            Some(SourceType::Retrieval),
        );
        assert_eq!(record.content, "Refunds take 5 days.");
        assert!((record.relevance_score - 0.82).abs() < 1e-9);
        assert_eq!(record.source, "policy.md");

        let unscored = n.normalize(&json!({"text": "t"}), Some(SourceType::Retrieval));
        assert_eq!(unscored.relevance_score, 0.0);
    }

    #[test]
    fn test_malformed_payload_falls_back() {
        let n = Normalizer::new();
        let raw = json!({"service_id": "web", "results": "not a list", "url": "https://x.io/a"});
        let record = n.normalize(&raw, Some(SourceType::Search));
        assert_eq!(record.source_type, SourceType::Search);
        assert!(record.content.contains("not a list"));
        assert!(!record.id.is_empty());

        let scalar = n.normalize(&json!(42), None);
        assert_eq!(scalar.source_type, SourceType::Unknown);
        assert_eq!(scalar.content, "42");
        assert_eq!(scalar.source, UNKNOWN_SOURCE);

        let bad_meta = n.normalize(&json!({"content": "c", "metadata": "oops"}), None);
        assert_eq!(bad_meta.source_type, SourceType::Unknown);
    }

    #[test]
    fn test_renormalizing_keeps_source_and_content() {
        let n = Normalizer::new();
        let samples = vec![
            (json!({"service_id": "brave", "action": "web_search", "result": {"results": [
                {"title": "A", "url": "https://a.com", "description": "x"},
                {"title": "B", "url": "https://b.com", "description": "y"}
            ]}}), None),
            (json!({"text": "chunk", "metadata": {"filename": "a.txt"}}), Some(SourceType::Retrieval)),
            (json!({"service_id": "files", "action": "download_file", "result": {"file_name": "r.csv", "size": 10}}), None),
            (json!({"result": "plain"}), None),
        ];
        for (raw, hint) in samples {
            let first = n.normalize(&raw, hint);
            let second = n.normalize(&first.to_raw(), None);
            assert_eq!(first.source, second.source, "source drift for {}", raw);
            assert_eq!(first.content, second.content, "content drift for {}", raw);
            assert_eq!(first.source_type, second.source_type);
        }
    }

    #[test]
    fn test_normalize_list_infers_per_element() {
        let n = Normalizer::new();
        let records = n.normalize_list(&[
            json!({"service_id": "rag", "action": "query_documents", "result": {"text": "a"}}),
            json!({"service_id": "dns", "action": "lookup", "result": {"domain": "x.io", "records": [{"type": "A", "name": "x.io", "value": "1.2.3.4"}]}}),
        ]);
        assert_eq!(records[0].source_type, SourceType::Retrieval);
        assert_eq!(records[1].source_type, SourceType::Dns);
        assert_eq!(records[1].content, "A x.io 1.2.3.4");
        assert_eq!(records[1].title, "DNS records for x.io");
    }

    #[test]
    fn test_sql_rows_expand_per_row() {
        let n = Normalizer::new();
        let call = ToolCall::new("pg", "execute_query", json!({"query": "SELECT * FROM users"}));
        let result = CapabilityResult::success(
            &call,
            json!({"columns": ["id", "name"], "rows": [{"id": 1, "name": "ada"}, {"id": 2, "name": "linus"}]}),
        );
        let records = n.records_from_result(&result, Some(SourceType::Sql));
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].source, "pg");
        assert_eq!(records[0].title, "pg row 1");
        assert!(records[1].content.contains("linus"));
        assert_eq!(records[1].metadata["query"], "SELECT * FROM users");
    }

    #[test]
    fn test_retrieval_documents_expand() {
        let n = Normalizer::new();
        let call = ToolCall::new("rag", "query_documents", json!({"query": "refunds"}));
        let result = CapabilityResult::success(
            &call,
            json!({"results": [
                {"content": "a", "score": 0.9, "metadata": {"source": "faq.md"}},
                {"content": "b", "score": 0.4, "metadata": {"source": "terms.md"}}
            ]}),
        );
        let records = n.records_from_result(&result, None);
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].source, "terms.md");
    }

    #[test]
    fn test_error_results_yield_nothing() {
        let n = Normalizer::new();
        let call = ToolCall::new("rag", "query_documents", json!({}));
        let result = CapabilityResult::failure(&call, crate::models::InvocationErrorKind::Timeout, "slow");
        assert!(n.records_from_result(&result, None).is_empty());
    }
}
