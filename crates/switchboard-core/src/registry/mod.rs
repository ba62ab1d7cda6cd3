//! Capability discovery.
//!
//! Discovery fails soft: a missing directory or an unreachable one yields an
//! empty capability set plus a recorded error, never a failed run. A
//! successful listing is cached for the life of the client until
//! [`RegistryClient::clear_cache`] is called.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::config::RegistryConfig;
use crate::error::{Result, SwitchboardError};
use crate::models::CapabilityDescriptor;

/// A source of capability descriptors.
#[async_trait]
pub trait CapabilityDirectory: Send + Sync {
    async fn discover_services(&self) -> Result<Vec<CapabilityDescriptor>>;
}

/// Directory service reached over HTTP: `GET {url}/services`.
pub struct HttpDirectory {
    base_url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpDirectory {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            timeout,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ServiceListing {
    Bare(Vec<Value>),
    Wrapped { services: Vec<Value> },
}

#[async_trait]
impl CapabilityDirectory for HttpDirectory {
    async fn discover_services(&self) -> Result<Vec<CapabilityDescriptor>> {
        let url = format!("{}/services", self.base_url);
        let resp = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| SwitchboardError::Discovery(format!("Failed to reach registry: {}", e)))?;

        if !resp.status().is_success() {
            return Err(SwitchboardError::Discovery(format!(
                "Registry returned HTTP {}",
                resp.status()
            )));
        }

        let listing = resp
            .json::<ServiceListing>()
            .await
            .map_err(|e| SwitchboardError::Discovery(format!("Failed to parse registry JSON: {}", e)))?;
        let entries = match listing {
            ServiceListing::Bare(items) | ServiceListing::Wrapped { services: items } => items,
        };

        // One bad entry should not hide the rest of the catalog.
        let mut descriptors = Vec::with_capacity(entries.len());
        for entry in entries {
            match serde_json::from_value::<CapabilityDescriptor>(entry) {
                Ok(d) => descriptors.push(d),
                Err(e) => tracing::warn!("[Registry] skipping malformed service entry: {}", e),
            }
        }
        Ok(descriptors)
    }
}

/// Descriptors declared in configuration.
pub struct StaticDirectory {
    services: Vec<CapabilityDescriptor>,
}

impl StaticDirectory {
    pub fn new(services: Vec<CapabilityDescriptor>) -> Self {
        Self { services }
    }
}

#[async_trait]
impl CapabilityDirectory for StaticDirectory {
    async fn discover_services(&self) -> Result<Vec<CapabilityDescriptor>> {
        Ok(self.services.clone())
    }
}

/// Outcome of a discovery attempt.
#[derive(Debug, Clone, Default)]
pub struct Discovery {
    pub capabilities: Vec<CapabilityDescriptor>,
    /// Set when the directory was configured but could not be read.
    pub error: Option<String>,
}

pub struct RegistryClient {
    directory: Option<Arc<dyn CapabilityDirectory>>,
    cache: RwLock<Option<Vec<CapabilityDescriptor>>>,
}

impl RegistryClient {
    pub fn new(directory: Option<Arc<dyn CapabilityDirectory>>) -> Self {
        Self {
            directory,
            cache: RwLock::new(None),
        }
    }

    /// HTTP directory when a URL is configured, else the static list (which
    /// may be empty).
    pub fn from_config(config: &RegistryConfig) -> Self {
        let directory: Option<Arc<dyn CapabilityDirectory>> = match config.url() {
            Some(url) => Some(Arc::new(HttpDirectory::new(
                url,
                Duration::from_secs(config.timeout_secs),
            ))),
            None if !config.services.is_empty() => {
                Some(Arc::new(StaticDirectory::new(config.services.clone())))
            }
            None => None,
        };
        Self::new(directory)
    }

    pub fn is_configured(&self) -> bool {
        self.directory.is_some()
    }

    pub async fn discover(&self) -> Discovery {
        let Some(ref directory) = self.directory else {
            tracing::info!("[Registry] no directory configured, continuing without capabilities");
            return Discovery::default();
        };

        if let Some(cached) = self.cache.read().await.as_ref() {
            return Discovery {
                capabilities: cached.clone(),
                error: None,
            };
        }

        match directory.discover_services().await {
            Ok(mut capabilities) => {
                let mut seen = std::collections::HashSet::new();
                capabilities.retain(|c| seen.insert(c.id.clone()));
                tracing::info!("[Registry] discovered {} capabilities", capabilities.len());
                *self.cache.write().await = Some(capabilities.clone());
                Discovery {
                    capabilities,
                    error: None,
                }
            }
            Err(e) => {
                tracing::warn!("[Registry] discovery failed: {}", e);
                Discovery {
                    capabilities: Vec::new(),
                    error: Some(e.to_string()),
                }
            }
        }
    }

    pub async fn clear_cache(&self) {
        *self.cache.write().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_unconfigured_registry_is_empty_without_error() {
        let client = RegistryClient::from_config(&RegistryConfig::default());
        assert!(!client.is_configured());
        let discovery = client.discover().await;
        assert!(discovery.capabilities.is_empty());
        assert!(discovery.error.is_none());
    }

    #[tokio::test]
    async fn test_wrapped_listing_and_bad_entries() {
        let app = Router::new().route(
            "/services",
            get(|| async {
                Json(json!({"services": [
                    {"id": "search", "host": "localhost", "port": 8001, "type": "search"},
                    {"id": "broken"},
                    {"id": "rag", "host": "localhost", "port": 8002, "type": "rag", "protocol": "carrier-pigeon"}
                ]}))
            }),
        );
        let url = serve(app).await;
        let client = RegistryClient::new(Some(Arc::new(HttpDirectory::new(url, Duration::from_secs(2)))));
        let discovery = client.discover().await;
        let ids: Vec<&str> = discovery.capabilities.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["search", "rag"]);
        assert_eq!(discovery.capabilities[1].protocol, crate::models::Protocol::Http);
    }

    #[tokio::test]
    async fn test_unreachable_registry_fails_soft() {
        let client = RegistryClient::new(Some(Arc::new(HttpDirectory::new(
            "http://127.0.0.1:9",
            Duration::from_millis(500),
        ))));
        let discovery = client.discover().await;
        assert!(discovery.capabilities.is_empty());
        assert!(discovery.error.unwrap().starts_with("Discovery error"));
    }

    #[tokio::test]
    async fn test_cache_and_clear() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let app = Router::new().route(
            "/services",
            get(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Json(json!([{"id": "pg", "host": "localhost", "port": 8003, "type": "sql"}]))
                }
            }),
        );
        let url = serve(app).await;
        let client = RegistryClient::new(Some(Arc::new(HttpDirectory::new(url, Duration::from_secs(2)))));

        assert_eq!(client.discover().await.capabilities.len(), 1);
        assert_eq!(client.discover().await.capabilities.len(), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        client.clear_cache().await;
        client.discover().await;
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_static_directory_from_config() {
        let config = RegistryConfig {
            services: vec![CapabilityDescriptor::new("pg", "localhost", 5432, "sql")],
            ..RegistryConfig::default()
        };
        let discovery = RegistryClient::from_config(&config).discover().await;
        assert_eq!(discovery.capabilities[0].id, "pg");
    }
}
