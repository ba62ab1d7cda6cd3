use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Wire protocol a capability endpoint speaks.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Http,
    Tcp,
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::Http => write!(f, "http"),
            Protocol::Tcp => write!(f, "tcp"),
        }
    }
}

impl std::str::FromStr for Protocol {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(Protocol::Http),
            "tcp" => Ok(Protocol::Tcp),
            other => Err(format!("Unknown protocol: {}", other)),
        }
    }
}

// Unrecognized protocols fall back to HTTP instead of failing discovery.
impl<'de> Deserialize<'de> for Protocol {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(raw.parse().unwrap_or_else(|e| {
            tracing::warn!("[Registry] {}, defaulting to http", e);
            Protocol::Http
        }))
    }
}

const SQL_TOKENS: &[&str] = &["database", "db"];
const SEARCH_TOKENS: &[&str] = &["search", "web", "brave", "websearch"];
const RETRIEVAL_TOKENS: &[&str] = &["rag", "retrieval", "vector", "document", "documents", "docs"];

fn any_token(tokens: &[&str], keys: &[&str]) -> bool {
    tokens.iter().any(|t| keys.contains(t))
}

/// Execution phase a capability is routed to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum CapabilityType {
    Search,
    Retrieval,
    Sql,
    Other,
}

impl CapabilityType {
    /// Classify a free-form type tag, e.g. `"search"`, `"rag"`, `"sql"`.
    ///
    /// The tag is split on non-alphanumerics and matched by whole token, so
    /// `webhook` is not a search tag and `storage` is not a retrieval tag.
    /// A structured-query token wins over every other token.
    pub fn from_tag(tag: &str) -> Option<Self> {
        let tag = tag.to_ascii_lowercase();
        let tokens: Vec<&str> = tag
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|t| !t.is_empty())
            .collect();

        if any_token(&tokens, SQL_TOKENS) || tokens.iter().any(|t| t.contains("sql")) {
            Some(CapabilityType::Sql)
        } else if any_token(&tokens, SEARCH_TOKENS) {
            Some(CapabilityType::Search)
        } else if any_token(&tokens, RETRIEVAL_TOKENS) {
            Some(CapabilityType::Retrieval)
        } else {
            None
        }
    }

    /// Classify by capability id and action when no descriptor is known.
    pub fn infer(capability_id: &str, action: &str) -> Self {
        let haystack = format!("{} {}", capability_id, action).to_ascii_lowercase();
        if haystack.contains("query_documents") {
            return CapabilityType::Retrieval;
        }
        CapabilityType::from_tag(&haystack).unwrap_or(CapabilityType::Other)
    }
}

impl std::fmt::Display for CapabilityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CapabilityType::Search => write!(f, "search"),
            CapabilityType::Retrieval => write!(f, "retrieval"),
            CapabilityType::Sql => write!(f, "sql"),
            CapabilityType::Other => write!(f, "other"),
        }
    }
}

/// A remote capability as announced by the directory service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CapabilityDescriptor {
    pub id: String,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub protocol: Protocol,
    /// Free-form routing tag (`"search"`, `"rag"`, `"sql"`, ...).
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, alias = "capabilities")]
    pub metadata: Map<String, Value>,
}

impl CapabilityDescriptor {
    pub fn new(id: impl Into<String>, host: impl Into<String>, port: u16, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            host: host.into(),
            port,
            protocol: Protocol::Http,
            kind: kind.into(),
            metadata: Map::new(),
        }
    }

    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.protocol, self.host, self.port)
    }

    /// `http://host:port/<action>`
    pub fn endpoint(&self, action: &str) -> String {
        format!("{}/{}", self.base_url(), action.trim_start_matches('/'))
    }

    pub fn routing(&self) -> CapabilityType {
        CapabilityType::from_tag(&self.kind)
            .unwrap_or_else(|| CapabilityType::infer(&self.id, ""))
    }

    /// Human-readable description for the planning prompt.
    pub fn description(&self) -> Option<&str> {
        self.metadata.get("description").and_then(|v| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routing_from_type_tag() {
        let search = CapabilityDescriptor::new("svc-1", "localhost", 8001, "brave_search");
        assert_eq!(search.routing(), CapabilityType::Search);
        let rag = CapabilityDescriptor::new("svc-2", "localhost", 8002, "rag");
        assert_eq!(rag.routing(), CapabilityType::Retrieval);
        let sql = CapabilityDescriptor::new("svc-3", "localhost", 8003, "sql");
        assert_eq!(sql.routing(), CapabilityType::Sql);
        let dns = CapabilityDescriptor::new("svc-4", "localhost", 8004, "dns");
        assert_eq!(dns.routing(), CapabilityType::Other);
    }

    #[test]
    fn test_routing_matches_whole_tokens() {
        let storage = CapabilityDescriptor::new("orders", "h", 1, "sql_storage");
        assert_eq!(storage.routing(), CapabilityType::Sql);
        let blob = CapabilityDescriptor::new("blobs", "h", 1, "storage");
        assert_eq!(blob.routing(), CapabilityType::Other);
        let hook = CapabilityDescriptor::new("notify", "h", 1, "webhook");
        assert_eq!(hook.routing(), CapabilityType::Other);
        assert_eq!(CapabilityType::from_tag("postgresql"), Some(CapabilityType::Sql));
        assert_eq!(CapabilityType::from_tag("vector-search"), Some(CapabilityType::Search));
        assert_eq!(CapabilityType::from_tag("search_db"), Some(CapabilityType::Sql));
    }

    #[test]
    fn test_routing_falls_back_to_id() {
        let svc = CapabilityDescriptor::new("web-search", "localhost", 8001, "");
        assert_eq!(svc.routing(), CapabilityType::Search);
        assert_eq!(
            CapabilityType::infer("docs", "query_documents"),
            CapabilityType::Retrieval
        );
    }

    #[test]
    fn test_unknown_protocol_defaults_to_http() {
        let svc: CapabilityDescriptor = serde_json::from_value(serde_json::json!({
            "id": "legacy",
            "host": "10.0.0.5",
            "port": 9000,
            "protocol": "grpc",
            "type": "sql"
        }))
        .unwrap();
        assert_eq!(svc.protocol, Protocol::Http);
        assert_eq!(svc.endpoint("/execute_query"), "http://10.0.0.5:9000/execute_query");
    }

    #[test]
    fn test_capabilities_alias_for_metadata() {
        let svc: CapabilityDescriptor = serde_json::from_value(serde_json::json!({
            "id": "rag",
            "host": "localhost",
            "port": 8002,
            "protocol": "tcp",
            "type": "rag",
            "capabilities": {"description": "Document index"}
        }))
        .unwrap();
        assert_eq!(svc.protocol, Protocol::Tcp);
        assert_eq!(svc.description(), Some("Document index"));
    }
}
