//! Source attribution for normalized records.
//!
//! Extraction order, first usable value wins:
//!
//! 1. top-level `source`
//! 2. `metadata.{source, file_name, filename, title, url, path, file_path, stored_file_path}`
//! 3. the domain of a top-level `url`
//! 4. top-level `title`
//! 5. [`UNKNOWN_SOURCE`]
//!
//! Steps 1 and 2 skip generic placeholders such as `"Search"` that some
//! capabilities stamp on every result.

use serde_json::{Map, Value};

pub const UNKNOWN_SOURCE: &str = "Unknown source";

/// Labels that name a kind of result rather than where it came from.
const GENERIC_SOURCES: &[&str] = &["search", "rag document", "web search", "result", "document"];

const METADATA_SOURCE_KEYS: &[&str] = &[
    "source",
    "file_name",
    "filename",
    "title",
    "url",
    "path",
    "file_path",
    "stored_file_path",
];

/// URLs without an authority are cut to this many characters.
const URL_SOURCE_CHARS: usize = 50;

/// Domains listed before a multi-result source is truncated.
const MAX_LISTED_DOMAINS: usize = 3;

pub fn is_placeholder(value: &str) -> bool {
    let lowered = value.trim().to_lowercase();
    GENERIC_SOURCES.contains(&lowered.as_str())
}

/// Non-empty trimmed string at `key`.
pub(crate) fn str_field<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    obj.get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Apply the extraction order to one record-shaped object.
pub fn extract_source(obj: &Map<String, Value>) -> String {
    if let Some(source) = str_field(obj, "source").filter(|s| !is_placeholder(s)) {
        return source.to_string();
    }

    if let Some(Value::Object(meta)) = obj.get("metadata") {
        let from_meta = METADATA_SOURCE_KEYS
            .iter()
            .filter_map(|k| str_field(meta, k))
            .find(|s| !is_placeholder(s));
        if let Some(source) = from_meta {
            return source.to_string();
        }
    }

    if let Some(url) = str_field(obj, "url") {
        return domain_of(url);
    }

    if let Some(title) = str_field(obj, "title") {
        return title.to_string();
    }

    UNKNOWN_SOURCE.to_string()
}

/// Host part of a URL, or its first 50 characters when it has none.
pub fn domain_of(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(parsed) => match parsed.host_str() {
            Some(host) if !host.is_empty() => host.trim_start_matches("www.").to_string(),
            _ => url.chars().take(URL_SOURCE_CHARS).collect(),
        },
        Err(_) => url.chars().take(URL_SOURCE_CHARS).collect(),
    }
}

/// Source label for a result set spanning several sites, e.g.
/// `"Search results from a.com, b.org, c.net …"`.
pub fn summarize_domains(domains: &[String]) -> Option<String> {
    let mut distinct: Vec<&str> = Vec::new();
    for d in domains {
        if !d.is_empty() && !distinct.contains(&d.as_str()) {
            distinct.push(d);
        }
    }
    if distinct.is_empty() {
        return None;
    }
    let listed = distinct
        .iter()
        .take(MAX_LISTED_DOMAINS)
        .copied()
        .collect::<Vec<_>>()
        .join(", ");
    if distinct.len() > MAX_LISTED_DOMAINS {
        Some(format!("Search results from {} …", listed))
    } else {
        Some(format!("Search results from {}", listed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().unwrap().clone()
    }

    #[test]
    fn test_explicit_source_wins() {
        let o = obj(json!({"source": "Annual Report", "url": "https://example.com/x"}));
        assert_eq!(extract_source(&o), "Annual Report");
    }

    #[test]
    fn test_placeholder_source_falls_through_to_metadata() {
        let o = obj(json!({
            "source": "RAG Document",
            "metadata": {"source": "Search", "file_name": "handbook.pdf"}
        }));
        assert_eq!(extract_source(&o), "handbook.pdf");
    }

    #[test]
    fn test_metadata_key_order() {
        let o = obj(json!({"metadata": {"path": "/tmp/a.txt", "title": "Alpha"}}));
        assert_eq!(extract_source(&o), "Alpha");
    }

    #[test]
    fn test_url_domain_then_title() {
        let o = obj(json!({"url": "https://www.rust-lang.org/learn", "title": "Learn"}));
        assert_eq!(extract_source(&o), "rust-lang.org");
        let o = obj(json!({"title": "Only a title"}));
        assert_eq!(extract_source(&o), "Only a title");
        assert_eq!(extract_source(&Map::new()), UNKNOWN_SOURCE);
    }

    #[test]
    fn test_url_without_authority_is_truncated() {
        let long = format!("mailto:{}", "a".repeat(80));
        assert_eq!(domain_of(&long).chars().count(), 50);
        assert_eq!(domain_of("not a url"), "not a url");
    }

    #[test]
    fn test_summarize_domains() {
        let two = vec!["a.com".to_string(), "b.com".to_string(), "a.com".to_string()];
        assert_eq!(
            summarize_domains(&two).as_deref(),
            Some("Search results from a.com, b.com")
        );
        let four: Vec<String> = ["a.com", "b.com", "c.com", "d.com"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            summarize_domains(&four).as_deref(),
            Some("Search results from a.com, b.com, c.com …")
        );
        assert_eq!(summarize_domains(&[]), None);
    }

    #[test]
    fn test_placeholders_are_case_insensitive() {
        assert!(is_placeholder("Web Search"));
        assert!(is_placeholder(" result "));
        assert!(!is_placeholder("Search Console docs"));
    }
}
