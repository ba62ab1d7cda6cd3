//! CLI command implementations.
//!
//! Each submodule corresponds to a top-level CLI command. Commands return
//! `Result<(), String>`; `main` prints the error and exits non-zero.

pub mod ask;
pub mod capabilities;
pub mod check;

use std::path::{Path, PathBuf};

use switchboard_core::WorkflowConfig;

/// File name looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "switchboard.yaml";

/// Candidate config files when `--config` is absent, in lookup order.
pub fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(DEFAULT_CONFIG_FILE)];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("switchboard").join("config.yaml"));
    }
    paths
}

/// Load the workflow configuration.
///
/// An explicit path must exist. Without one, the first existing default
/// path is used, and if none exists the built-in defaults apply.
pub fn load_config(explicit: Option<&str>) -> Result<WorkflowConfig, String> {
    load_dotenv();

    if let Some(path) = explicit {
        return WorkflowConfig::from_file(path).map_err(|e| e.to_string());
    }

    match default_config_paths().into_iter().find(|p| p.exists()) {
        Some(path) => {
            tracing::info!("Using config file {}", path.display());
            WorkflowConfig::from_file(&path.to_string_lossy()).map_err(|e| e.to_string())
        }
        None => {
            tracing::warn!(
                "No config file found (looked for {}); using defaults",
                DEFAULT_CONFIG_FILE
            );
            Ok(WorkflowConfig::default())
        }
    }
}

/// Load `.env.local` then `.env` from the working directory. Variables that
/// are already set are left alone.
pub fn load_dotenv() {
    for filename in [".env.local", ".env"] {
        let path = Path::new(filename);
        if let Ok(content) = std::fs::read_to_string(path) {
            for (key, value) in parse_dotenv(&content) {
                if std::env::var(&key).is_err() {
                    std::env::set_var(&key, &value);
                }
            }
        }
    }
}

/// `KEY=VALUE` pairs of a dotenv document. Comments and blank lines are
/// skipped; one layer of matching quotes is stripped from values.
pub fn parse_dotenv(content: &str) -> Vec<(String, String)> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let (key, value) = line.split_once('=')?;
            let key = key.trim().trim_start_matches("export ").trim();
            if key.is_empty() {
                return None;
            }
            let value = value.trim();
            let unquoted = ['"', '\'']
                .iter()
                .find(|q| value.len() >= 2 && value.starts_with(**q) && value.ends_with(**q))
                .map(|_| &value[1..value.len() - 1])
                .unwrap_or(value);
            Some((key.to_string(), unquoted.to_string()))
        })
        .collect()
}

/// Pretty-print a serializable value to stdout.
pub fn print_json<T: serde::Serialize>(value: &T) -> Result<(), String> {
    let text = serde_json::to_string_pretty(value).map_err(|e| e.to_string())?;
    println!("{}", text);
    Ok(())
}

/// Print a summary of a configuration that loaded and validated.
pub fn validate_config(config: &WorkflowConfig) -> Result<(), String> {
    println!("{} Configuration is valid", console::style("✓").green());
    println!("   Max iterations: {}", config.max_iterations);
    println!("   Max steps:      {}", config.max_steps);
    println!(
        "   Registry:       {}",
        config.registry.url().unwrap_or("(none)")
    );
    println!(
        "   Oracle:         {} ({})",
        config.oracle.adapter, config.oracle.model
    );
    println!(
        "   Safety:         blocking={} llm_check={}",
        config.safety.blocking_enabled, config.safety.llm_check
    );
    Ok(())
}
