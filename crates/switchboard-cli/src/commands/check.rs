//! `switchboard check-query`: run the safety validator on one query.

use std::sync::Arc;

use switchboard_core::oracle::HttpOracle;
use switchboard_core::safety::{OracleSafetyCheck, QueryValidator, SafetyVerdict};
use switchboard_core::WorkflowConfig;

pub async fn run(
    mut config: WorkflowConfig,
    query: &str,
    schema: Option<&str>,
    no_blocking: bool,
    json: bool,
) -> Result<(), String> {
    if no_blocking {
        config.safety.blocking_enabled = false;
    }
    let verdict = validator(&config).check(query, schema).await;

    if json {
        super::print_json(&verdict)?;
    } else {
        println!("{}", render(&verdict));
    }

    if verdict.safe {
        Ok(())
    } else {
        Err("query rejected".to_string())
    }
}

/// Validator for `config`, with the oracle attached when `llm_check` is on.
pub fn validator(config: &WorkflowConfig) -> QueryValidator {
    let validator = QueryValidator::new(config.safety.clone());
    if config.safety.llm_check {
        let oracle = Arc::new(HttpOracle::new(config.oracle.clone()));
        validator.with_semantic_check(Arc::new(OracleSafetyCheck::new(oracle)))
    } else {
        validator
    }
}

pub fn render(verdict: &SafetyVerdict) -> String {
    if verdict.safe {
        format!("{} safe", console::style("✓").green())
    } else {
        format!(
            "{} rejected: {}",
            console::style("✗").red(),
            verdict.reason.as_deref().unwrap_or("unspecified")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_only_query_is_safe() {
        let config = WorkflowConfig::default();
        let verdict = validator(&config).check("SELECT id FROM orders", None).await;
        assert!(verdict.safe);
        assert!(render(&verdict).ends_with("safe"));
    }

    #[tokio::test]
    async fn test_rejected_query_renders_reason() {
        let config = WorkflowConfig::default();
        let verdict = validator(&config).check("DROP TABLE orders", None).await;
        assert!(!verdict.safe);
        assert!(render(&verdict).contains("rejected"));
    }

    #[tokio::test]
    async fn test_no_blocking_accepts_anything() {
        let result = run(WorkflowConfig::default(), "DELETE FROM orders", None, true, false).await;
        assert!(result.is_ok());
    }
}
