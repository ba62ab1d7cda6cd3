//! Query safety validation.
//!
//! Structured queries proposed by the planner are checked before they reach
//! a SQL capability. Rules run in a fixed order and the first one that fires
//! decides the verdict:
//!
//! | # | Rule | Verdict |
//! |---|------|---------|
//! | 1 | blocking disabled | safe |
//! | 2 | empty query | unsafe |
//! | 3 | semantic check (optional, oracle-backed) | unsafe if the oracle says so |
//! | 4 | mutating / DDL keyword | unsafe |
//! | 5 | does not start with `select` / `with` | unsafe |
//! | 6 | injection pattern catalog | unsafe |
//! | 7 | statement stacking, comments, encoded literals, dangerous functions | unsafe |
//! | 8 | nothing fired | safe |
//!
//! A failing semantic check never fails the request; the lexical rules still
//! apply.

pub mod patterns;

use std::sync::Arc;

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

use crate::config::SafetyConfig;
use crate::oracle::prompts::SAFETY_SYSTEM_PROMPT;
use crate::oracle::{Oracle, OracleError};
use crate::planner::parse;
use patterns::CATALOG;

lazy_static! {
    static ref MUTATING_KEYWORD: Regex = Regex::new(
        r"\b(drop|delete|insert|update|truncate|alter|exec|execute|merge|replace)\b"
    )
    .unwrap();
    static ref CREATE_OBJECT: Regex = Regex::new(
        r"\bcreate\s+(table|database|index|view|procedure|function|trigger|role|user|schema)\b"
    )
    .unwrap();
    static ref ENCODED_LITERAL: Regex =
        Regex::new(r"\b0x[0-9a-f]+\b|\bx'[0-9a-f]*'|\b0b[01]+\b|\bb'[01]*'").unwrap();
    static ref DANGEROUS_FUNCTION: Regex = Regex::new(
        r"\b(char|nchar|chr|unhex|from_base64|extractvalue|updatexml|make_set|elt)\s*\("
    )
    .unwrap();
}

/// The rule that rejected a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyRule {
    EmptyQuery,
    Semantic,
    MutatingKeyword,
    NotReadOnly,
    InjectionPattern,
    MultipleStatements,
    Comment,
    EncodedLiteral,
    DangerousFunction,
}

impl std::fmt::Display for SafetyRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            SafetyRule::EmptyQuery => "empty query",
            SafetyRule::Semantic => "semantic check",
            SafetyRule::MutatingKeyword => "mutating keyword",
            SafetyRule::NotReadOnly => "not a read-only statement",
            SafetyRule::InjectionPattern => "injection pattern",
            SafetyRule::MultipleStatements => "multiple statements",
            SafetyRule::Comment => "comment marker",
            SafetyRule::EncodedLiteral => "encoded literal",
            SafetyRule::DangerousFunction => "dangerous function",
        };
        write!(f, "{}", label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SafetyVerdict {
    pub safe: bool,
    pub reason: Option<String>,
    pub rule: Option<SafetyRule>,
}

impl SafetyVerdict {
    pub fn safe() -> Self {
        Self {
            safe: true,
            reason: None,
            rule: None,
        }
    }

    pub fn reject(rule: SafetyRule, detail: impl std::fmt::Display) -> Self {
        Self {
            safe: false,
            reason: Some(format!("{}: {}", rule, detail)),
            rule: Some(rule),
        }
    }

    /// `(is_safe, reason)`
    pub fn into_tuple(self) -> (bool, Option<String>) {
        (self.safe, self.reason)
    }
}

/// Semantic (model-based) safety opinion on a query.
#[async_trait]
pub trait SemanticSafetyCheck: Send + Sync {
    async fn is_query_safe(
        &self,
        query: &str,
        schema_context: Option<&str>,
    ) -> Result<(bool, Option<String>), OracleError>;
}

/// [`SemanticSafetyCheck`] answered by the oracle.
pub struct OracleSafetyCheck {
    oracle: Arc<dyn Oracle>,
}

impl OracleSafetyCheck {
    pub fn new(oracle: Arc<dyn Oracle>) -> Self {
        Self { oracle }
    }
}

#[async_trait]
impl SemanticSafetyCheck for OracleSafetyCheck {
    async fn is_query_safe(
        &self,
        query: &str,
        schema_context: Option<&str>,
    ) -> Result<(bool, Option<String>), OracleError> {
        let mut prompt = format!("## Query\n{}", query);
        if let Some(schema) = schema_context.filter(|s| !s.trim().is_empty()) {
            prompt.push_str(&format!("\n\n## Schema\n{}", schema));
        }
        let reply = self.oracle.ask(SAFETY_SYSTEM_PROMPT, &prompt).await?;
        Ok((
            parse::parse_verdict(&reply, &["safe", "is_safe"]),
            parse::parse_reason(&reply),
        ))
    }
}

pub struct QueryValidator {
    config: SafetyConfig,
    semantic: Option<Arc<dyn SemanticSafetyCheck>>,
}

impl QueryValidator {
    pub fn new(config: SafetyConfig) -> Self {
        Self {
            config,
            semantic: None,
        }
    }

    /// Attach a semantic check. It only runs when `llm_check` is enabled.
    pub fn with_semantic_check(mut self, check: Arc<dyn SemanticSafetyCheck>) -> Self {
        self.semantic = Some(check);
        self
    }

    pub fn blocking_enabled(&self) -> bool {
        self.config.blocking_enabled
    }

    /// Run every rule, including the semantic check when configured.
    pub async fn check(&self, query: &str, schema_context: Option<&str>) -> SafetyVerdict {
        if !self.config.blocking_enabled {
            return SafetyVerdict::safe();
        }
        if query.trim().is_empty() {
            return SafetyVerdict::reject(SafetyRule::EmptyQuery, "no query text");
        }

        if self.config.llm_check {
            if let Some(ref semantic) = self.semantic {
                match semantic.is_query_safe(query, schema_context).await {
                    Ok((false, reason)) => {
                        let detail = reason.unwrap_or_else(|| "oracle judged the query unsafe".into());
                        tracing::warn!("[Safety] semantic check rejected query: {}", detail);
                        return SafetyVerdict::reject(SafetyRule::Semantic, detail);
                    }
                    Ok((true, _)) => {}
                    Err(e) => {
                        tracing::warn!("[Safety] semantic check unavailable, using lexical rules: {}", e);
                    }
                }
            }
        }

        self.lexical_rules(query)
    }

    /// Rules 1, 2 and 4 through 8, without the oracle.
    pub fn check_lexical(&self, query: &str) -> SafetyVerdict {
        if !self.config.blocking_enabled {
            return SafetyVerdict::safe();
        }
        if query.trim().is_empty() {
            return SafetyVerdict::reject(SafetyRule::EmptyQuery, "no query text");
        }
        self.lexical_rules(query)
    }

    fn lexical_rules(&self, query: &str) -> SafetyVerdict {
        let q = query.trim().to_lowercase();

        if let Some(m) = MUTATING_KEYWORD.find(&q) {
            return SafetyVerdict::reject(SafetyRule::MutatingKeyword, format!("'{}'", m.as_str()));
        }
        if let Some(m) = CREATE_OBJECT.find(&q) {
            return SafetyVerdict::reject(SafetyRule::MutatingKeyword, format!("'{}'", m.as_str()));
        }

        if !(starts_with_word(&q, "select") || starts_with_word(&q, "with")) {
            return SafetyVerdict::reject(
                SafetyRule::NotReadOnly,
                "query must start with SELECT or WITH",
            );
        }

        if let Some(hit) = CATALOG.first_match(&q) {
            return SafetyVerdict::reject(SafetyRule::InjectionPattern, hit.category);
        }

        let semicolons = q.matches(';').count();
        let trailing_only = semicolons == 1 && q.trim_end().ends_with(';');
        if semicolons > 1 || (semicolons == 1 && !trailing_only) {
            return SafetyVerdict::reject(
                SafetyRule::MultipleStatements,
                "only one statement is allowed",
            );
        }
        if let Some(marker) = ["/*", "--", "#"].iter().find(|m| q.contains(**m)) {
            return SafetyVerdict::reject(SafetyRule::Comment, format!("'{}'", marker));
        }
        if let Some(m) = ENCODED_LITERAL.find(&q) {
            return SafetyVerdict::reject(SafetyRule::EncodedLiteral, format!("'{}'", m.as_str()));
        }
        if let Some(m) = DANGEROUS_FUNCTION.find(&q) {
            let name = m.as_str().trim_end_matches('(').trim();
            return SafetyVerdict::reject(SafetyRule::DangerousFunction, format!("'{}'", name));
        }

        SafetyVerdict::safe()
    }
}

fn starts_with_word(text: &str, word: &str) -> bool {
    text.strip_prefix(word)
        .map(|rest| rest.chars().next().map_or(true, |c| !c.is_alphanumeric() && c != '_'))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> QueryValidator {
        QueryValidator::new(SafetyConfig::default())
    }

    fn rule_of(query: &str) -> Option<SafetyRule> {
        validator().check_lexical(query).rule
    }

    struct FixedCheck(Result<(bool, Option<String>), OracleError>);

    #[async_trait]
    impl SemanticSafetyCheck for FixedCheck {
        async fn is_query_safe(
            &self,
            _query: &str,
            _schema: Option<&str>,
        ) -> Result<(bool, Option<String>), OracleError> {
            self.0.clone()
        }
    }

    #[test]
    fn test_destructive_queries_rejected_only_when_blocking() {
        let open = QueryValidator::new(SafetyConfig {
            blocking_enabled: false,
            llm_check: false,
        });
        for query in ["DROP TABLE users", "DELETE FROM users", "SELECT 1; DROP TABLE x; --"] {
            let verdict = validator().check_lexical(query);
            assert!(!verdict.safe, "should reject: {}", query);
            assert!(verdict.reason.is_some());
            assert!(open.check_lexical(query).safe, "should allow when disabled: {}", query);
        }
    }

    #[test]
    fn test_create_carve_out() {
        assert_eq!(rule_of("SELECT created_at, create_user FROM audit"), None);
        assert_eq!(rule_of("CREATE TABLE t (id int)"), Some(SafetyRule::MutatingKeyword));
        assert_eq!(rule_of("create   index idx on t(a)"), Some(SafetyRule::MutatingKeyword));
    }

    #[test]
    fn test_keywords_are_whole_words() {
        assert_eq!(rule_of("SELECT updated_at, deleted FROM t"), None);
        assert_eq!(rule_of("SELECT * FROM t WHERE x = 1 OR 1=1 UPDATE"), Some(SafetyRule::MutatingKeyword));
    }

    #[test]
    fn test_rule_order() {
        assert_eq!(rule_of("   "), Some(SafetyRule::EmptyQuery));
        assert_eq!(rule_of("SHOW TABLES"), Some(SafetyRule::NotReadOnly));
        assert_eq!(rule_of("selection"), Some(SafetyRule::NotReadOnly));
        assert_eq!(
            rule_of("SELECT * FROM information_schema.tables"),
            Some(SafetyRule::InjectionPattern)
        );
        assert_eq!(rule_of("SELECT 1; SELECT 2"), Some(SafetyRule::MultipleStatements));
        assert_eq!(rule_of("SELECT 1 -- trailing"), Some(SafetyRule::Comment));
        assert_eq!(rule_of("SELECT 1 /* hi */"), Some(SafetyRule::Comment));
        assert_eq!(rule_of("SELECT * FROM t WHERE a = 0x41"), Some(SafetyRule::EncodedLiteral));
        assert_eq!(rule_of("SELECT CHAR(65)"), Some(SafetyRule::DangerousFunction));
    }

    #[test]
    fn test_plain_reads_are_safe() {
        assert!(validator().check_lexical("SELECT * FROM users;").safe);
        assert!(validator()
            .check_lexical("WITH t AS (SELECT id FROM orders) SELECT count(*) FROM t")
            .safe);
        let (safe, reason) = validator().check_lexical("SELECT name FROM users").into_tuple();
        assert!(safe);
        assert!(reason.is_none());
    }

    #[test]
    fn test_reason_names_the_rule() {
        let verdict = validator().check_lexical("SELECT 1; SELECT 2");
        assert!(verdict.reason.unwrap().starts_with("multiple statements"));
    }

    #[tokio::test]
    async fn test_semantic_rejection_wins() {
        let v = QueryValidator::new(SafetyConfig {
            blocking_enabled: true,
            llm_check: true,
        })
        .with_semantic_check(Arc::new(FixedCheck(Ok((false, Some("reads salaries".into()))))));
        let verdict = v.check("SELECT salary FROM staff", Some("staff(salary)")).await;
        assert_eq!(verdict.rule, Some(SafetyRule::Semantic));
        assert_eq!(verdict.reason.as_deref(), Some("semantic check: reads salaries"));
    }

    #[tokio::test]
    async fn test_semantic_failure_falls_through() {
        let v = QueryValidator::new(SafetyConfig {
            blocking_enabled: true,
            llm_check: true,
        })
        .with_semantic_check(Arc::new(FixedCheck(Err(OracleError::Transport("down".into())))));
        assert!(v.check("SELECT 1", None).await.safe);
        assert_eq!(
            v.check("DROP TABLE t", None).await.rule,
            Some(SafetyRule::MutatingKeyword)
        );
    }

    #[tokio::test]
    async fn test_semantic_check_ignored_when_disabled() {
        let v = validator().with_semantic_check(Arc::new(FixedCheck(Ok((false, None)))));
        assert!(v.check("SELECT 1", None).await.safe);
    }
}
