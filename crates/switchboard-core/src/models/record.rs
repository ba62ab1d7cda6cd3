use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Characters of content that take part in the dedup key.
pub const DEDUP_CONTENT_PREFIX: usize = 200;

/// Shape family a capability payload belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Search,
    Retrieval,
    Download,
    Sql,
    Dns,
    Generic,
    Unknown,
}

impl SourceType {
    /// Infer from capability id / action substrings.
    pub fn infer(haystack: &str) -> Self {
        let h = haystack.to_ascii_lowercase();
        let has = |keys: &[&str]| keys.iter().any(|k| h.contains(k));
        if has(&["search", "web", "brave"]) {
            SourceType::Search
        } else if has(&["rag", "vector", "query_documents"]) {
            SourceType::Retrieval
        } else if has(&["download", "file"]) {
            SourceType::Download
        } else if has(&["sql", "database"]) {
            SourceType::Sql
        } else if has(&["dns"]) {
            SourceType::Dns
        } else {
            SourceType::Generic
        }
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            SourceType::Search => "search",
            SourceType::Retrieval => "retrieval",
            SourceType::Download => "download",
            SourceType::Sql => "sql",
            SourceType::Dns => "dns",
            SourceType::Generic => "generic",
            SourceType::Unknown => "unknown",
        };
        write!(f, "{}", label)
    }
}

impl std::str::FromStr for SourceType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "search" => Ok(SourceType::Search),
            "retrieval" => Ok(SourceType::Retrieval),
            "download" => Ok(SourceType::Download),
            "sql" => Ok(SourceType::Sql),
            "dns" => Ok(SourceType::Dns),
            "generic" => Ok(SourceType::Generic),
            "unknown" => Ok(SourceType::Unknown),
            other => Err(format!("Unknown SourceType: {}", other)),
        }
    }
}

/// Canonical record every capability output is converted into.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NormalizedRecord {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    pub source: String,
    pub source_type: SourceType,
    #[serde(default)]
    pub relevance_score: f64,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Identity used to drop duplicate records across phases and iterations.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub content_prefix: String,
    pub source: String,
    pub title: String,
    pub url: String,
}

impl NormalizedRecord {
    pub fn dedup_key(&self) -> DedupKey {
        DedupKey {
            content_prefix: self.content.chars().take(DEDUP_CONTENT_PREFIX).collect(),
            source: self.source.clone(),
            title: self.title.clone(),
            url: self.url.clone(),
        }
    }

    /// Serialize back into the loose shape the normalizer accepts.
    pub fn to_raw(&self) -> Value {
        serde_json::json!({
            "id": self.id,
            "content": self.content,
            "title": self.title,
            "url": self.url,
            "source": self.source,
            "source_type": self.source_type,
            "relevance_score": self.relevance_score,
            "metadata": self.metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(content: &str, source: &str) -> NormalizedRecord {
        NormalizedRecord {
            id: "r1".into(),
            content: content.into(),
            title: "T".into(),
            url: String::new(),
            source: source.into(),
            source_type: SourceType::Generic,
            relevance_score: 0.0,
            metadata: Map::new(),
        }
    }

    #[test]
    fn test_infer_source_type() {
        assert_eq!(SourceType::infer("brave web_search"), SourceType::Search);
        assert_eq!(SourceType::infer("docs query_documents"), SourceType::Retrieval);
        assert_eq!(SourceType::infer("files download_file"), SourceType::Download);
        assert_eq!(SourceType::infer("postgres execute_sql"), SourceType::Sql);
        assert_eq!(SourceType::infer("resolver dns_lookup"), SourceType::Dns);
        assert_eq!(SourceType::infer("weather forecast"), SourceType::Generic);
    }

    #[test]
    fn test_dedup_key_ignores_id_and_long_tail() {
        let base = "x".repeat(DEDUP_CONTENT_PREFIX);
        let mut a = record(&format!("{}aaa", base), "s");
        let b = record(&format!("{}bbb", base), "s");
        a.id = "other".into();
        assert_eq!(a.dedup_key(), b.dedup_key());
        assert_ne!(a.dedup_key(), record(&base, "elsewhere").dedup_key());
    }
}
