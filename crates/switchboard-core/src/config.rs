//! Workflow configuration loaded from YAML.
//!
//! Every knob the engine reads lives here and is handed to the engine at
//! construction time. String values may reference the environment with
//! `${VAR}` or `${VAR:-default}`; references are expanded before parsing.
//!
//! ```yaml
//! max_iterations: 3
//! registry:
//!   url: "${SWITCHBOARD_REGISTRY_URL:-}"
//! oracle:
//!   adapter: anthropic
//!   api_key: "${ANTHROPIC_API_KEY}"
//!   model: "claude-sonnet-4-20250514"
//! capabilities:
//!   search: true
//!   sql: false
//! safety:
//!   blocking_enabled: true
//!   llm_check: false
//! ```

use std::time::Duration;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SwitchboardError};
use crate::models::{CapabilityDescriptor, CapabilityType};
use crate::workflow::transition::steps_required;

/// Top-level configuration for one engine instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Refinement passes allowed before the run fails.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Hard ceiling on stage transitions, independent of `max_iterations`.
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,

    /// How many times a rejected query may be sent back for repair.
    #[serde(default = "default_max_validation_retries")]
    pub max_validation_retries: u32,

    #[serde(default)]
    pub registry: RegistryConfig,

    #[serde(default)]
    pub oracle: OracleConfig,

    #[serde(default)]
    pub capabilities: CapabilityToggles,

    #[serde(default)]
    pub invocation: InvocationConfig,

    #[serde(default)]
    pub safety: SafetyConfig,

    #[serde(default)]
    pub synthesis: SynthesisConfig,
}

fn default_max_iterations() -> u32 {
    3
}

fn default_max_steps() -> u32 {
    64
}

fn default_max_validation_retries() -> u32 {
    2
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            max_steps: default_max_steps(),
            max_validation_retries: default_max_validation_retries(),
            registry: RegistryConfig::default(),
            oracle: OracleConfig::default(),
            capabilities: CapabilityToggles::default(),
            invocation: InvocationConfig::default(),
            safety: SafetyConfig::default(),
            synthesis: SynthesisConfig::default(),
        }
    }
}

/// Where capabilities are discovered from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Directory service base URL. Empty or absent means "not configured".
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default = "default_registry_timeout")]
    pub timeout_secs: u64,

    /// Statically declared capabilities, used when no URL is set.
    #[serde(default)]
    pub services: Vec<CapabilityDescriptor>,
}

fn default_registry_timeout() -> u64 {
    10
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_secs: default_registry_timeout(),
            services: Vec::new(),
        }
    }
}

impl RegistryConfig {
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref().map(str::trim).filter(|u| !u.is_empty())
    }
}

/// Language-model endpoint used for planning and synthesis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    /// `anthropic` (Messages API) or `openai` (chat completions).
    #[serde(default = "default_adapter")]
    pub adapter: String,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default)]
    pub temperature: Option<f64>,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_oracle_timeout")]
    pub timeout_secs: u64,

    /// Total attempts per call, transport failures only.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// First backoff delay; doubles on each retry.
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

fn default_adapter() -> String {
    "anthropic".to_string()
}

fn default_base_url() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_oracle_timeout() -> u64 {
    120
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_ms() -> u64 {
    500
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            adapter: default_adapter(),
            base_url: default_base_url(),
            api_key: String::new(),
            model: default_model(),
            temperature: None,
            max_tokens: default_max_tokens(),
            timeout_secs: default_oracle_timeout(),
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

/// Which capability families the planner may use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityToggles {
    #[serde(default = "default_true")]
    pub search: bool,
    #[serde(default = "default_true")]
    pub retrieval: bool,
    #[serde(default = "default_true")]
    pub sql: bool,
    #[serde(default = "default_true")]
    pub other: bool,
}

fn default_true() -> bool {
    true
}

impl Default for CapabilityToggles {
    fn default() -> Self {
        Self {
            search: true,
            retrieval: true,
            sql: true,
            other: true,
        }
    }
}

impl CapabilityToggles {
    pub fn is_enabled(&self, kind: CapabilityType) -> bool {
        match kind {
            CapabilityType::Search => self.search,
            CapabilityType::Retrieval => self.retrieval,
            CapabilityType::Sql => self.sql,
            CapabilityType::Other => self.other,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvocationConfig {
    /// Per-call timeout for capability requests.
    #[serde(default = "default_invocation_timeout")]
    pub timeout_secs: u64,

    /// Largest TCP reply line accepted before the call fails.
    #[serde(default = "default_max_response_bytes")]
    pub max_response_bytes: u64,
}

fn default_invocation_timeout() -> u64 {
    30
}

fn default_max_response_bytes() -> u64 {
    4 * 1024 * 1024
}

impl Default for InvocationConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_invocation_timeout(),
            max_response_bytes: default_max_response_bytes(),
        }
    }
}

impl InvocationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyConfig {
    /// When false every query is accepted without inspection.
    #[serde(default = "default_true")]
    pub blocking_enabled: bool,

    /// Ask the oracle for a semantic verdict before the lexical rules.
    #[serde(default)]
    pub llm_check: bool,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            blocking_enabled: true,
            llm_check: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisConfig {
    /// Records handed to the synthesis prompt, best-ranked first.
    #[serde(default = "default_max_records")]
    pub max_records: usize,
}

fn default_max_records() -> usize {
    20
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            max_records: default_max_records(),
        }
    }
}

impl WorkflowConfig {
    /// Parse a configuration document, expanding `${VAR}` references first.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let expanded = resolve_env_vars(yaml);
        let config: WorkflowConfig = if expanded.trim().is_empty() {
            WorkflowConfig::default()
        } else {
            serde_yaml::from_str(&expanded)
                .map_err(|e| SwitchboardError::Config(format!("Failed to parse config YAML: {}", e)))?
        };
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file from disk.
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SwitchboardError::Config(format!("Failed to read config file '{}': {}", path, e))
        })?;
        Self::from_yaml(&content)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(SwitchboardError::Config(
                "max_iterations must be >= 1".to_string(),
            ));
        }
        let needed = steps_required(self.max_iterations);
        if self.max_steps < needed {
            return Err(SwitchboardError::Config(format!(
                "max_steps must be >= {} for max_iterations = {}",
                needed, self.max_iterations
            )));
        }
        if self.oracle.max_attempts == 0 {
            return Err(SwitchboardError::Config(
                "oracle.max_attempts must be >= 1".to_string(),
            ));
        }
        match self.oracle.adapter.as_str() {
            "anthropic" | "openai" => {}
            other => {
                return Err(SwitchboardError::Config(format!(
                    "Unknown oracle adapter: '{}'. Must be anthropic or openai.",
                    other
                )))
            }
        }
        Ok(())
    }
}

lazy_static! {
    static ref ENV_REF: Regex = Regex::new(r"\$\{([^}]+)\}").unwrap();
}

/// Resolve environment variable references in a string.
/// Supports `${ENV_VAR}` and `${ENV_VAR:-default}` syntax.
pub fn resolve_env_vars(input: &str) -> String {
    ENV_REF
        .replace_all(input, |caps: &regex::Captures| {
            let var_expr = &caps[1];
            if let Some(idx) = var_expr.find(":-") {
                let var_name = &var_expr[..idx];
                let default_val = &var_expr[idx + 2..];
                std::env::var(var_name).unwrap_or_else(|_| default_val.to_string())
            } else {
                std::env::var(var_expr).unwrap_or_else(|_| format!("${{{}}}", var_expr))
            }
        })
        .to_string()
}
