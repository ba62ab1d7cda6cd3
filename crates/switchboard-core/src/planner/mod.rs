//! Planner: the oracle-backed decisions of a workflow run.
//!
//! | Operation | Oracle prompt | Parse failure becomes |
//! |-----------|---------------|-----------------------|
//! | [`Planner::plan`] | planning | empty plan |
//! | [`Planner::can_answer`] | answerability | `false` |
//! | [`Planner::plan_refinement`] | refinement | no new calls |
//! | [`Planner::synthesize`] | synthesis | raw reply text |
//! | [`Planner::answer_directly`] | direct answer | raw reply text |
//! | [`Planner::repair_query`] | query repair | `None` |
//!
//! Only oracle transport failures surface as `Err`; reply parsing never does.

pub mod parse;

use std::fmt::Write as _;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::models::{CapabilityDescriptor, NormalizedRecord, ToolCall};
use crate::oracle::prompts::{
    CAN_ANSWER_SYSTEM_PROMPT, DIRECT_ANSWER_SYSTEM_PROMPT, PLAN_SYSTEM_PROMPT,
    REFINE_SYSTEM_PROMPT, REPAIR_QUERY_SYSTEM_PROMPT, SYNTHESIZE_SYSTEM_PROMPT,
};
use crate::oracle::{Oracle, OracleError};

/// Characters of each record's content shown to the oracle.
const RECORD_PREVIEW_CHARS: usize = 1500;

/// The planner's decision for a request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub tool_calls: Vec<ToolCall>,
    pub is_final_answer: bool,
    /// An answer the oracle volunteered alongside `is_final_answer`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
}

pub struct Planner {
    oracle: Arc<dyn Oracle>,
}

impl Planner {
    pub fn new(oracle: Arc<dyn Oracle>) -> Self {
        Self { oracle }
    }

    /// Decide which capabilities to call for `user_request`.
    pub async fn plan(
        &self,
        user_request: &str,
        capabilities: &[CapabilityDescriptor],
    ) -> Result<Plan, OracleError> {
        let prompt = format!(
            "## Request\n{}\n\n## Available capabilities\n{}",
            user_request,
            render_catalog(capabilities)
        );
        let reply = self.oracle.ask(PLAN_SYSTEM_PROMPT, &prompt).await?;
        let plan = parse::parse_plan(&reply);
        tracing::info!(
            "[Planner] plan: {} tool call(s), is_final_answer={}",
            plan.tool_calls.len(),
            plan.is_final_answer
        );
        Ok(plan)
    }

    /// Whether `synthesized_text` is a sufficient answer.
    pub async fn can_answer(
        &self,
        user_request: &str,
        synthesized_text: &str,
    ) -> Result<bool, OracleError> {
        if synthesized_text.trim().is_empty() {
            return Ok(false);
        }
        let prompt = format!(
            "## Request\n{}\n\n## Draft answer\n{}",
            user_request, synthesized_text
        );
        let reply = self.oracle.ask(CAN_ANSWER_SYSTEM_PROMPT, &prompt).await?;
        Ok(parse::parse_verdict(&reply, &["can_answer", "answerable", "sufficient"]))
    }

    /// Propose further tool calls. An empty list means nothing more can be
    /// gathered.
    pub async fn plan_refinement(
        &self,
        user_request: &str,
        current_records: &[NormalizedRecord],
        synthesized_text: &str,
        capabilities: &[CapabilityDescriptor],
    ) -> Result<Vec<ToolCall>, OracleError> {
        let prompt = format!(
            "## Request\n{}\n\n## Records so far\n{}\n\n## Current draft\n{}\n\n## Available capabilities\n{}",
            user_request,
            render_records(current_records),
            synthesized_text,
            render_catalog(capabilities)
        );
        let reply = self.oracle.ask(REFINE_SYSTEM_PROMPT, &prompt).await?;
        Ok(parse::parse_tool_calls(&reply))
    }

    /// Write an answer from gathered records. `errors` lists capability
    /// failures the answer should acknowledge.
    pub async fn synthesize(
        &self,
        user_request: &str,
        records: &[NormalizedRecord],
        errors: &[String],
    ) -> Result<String, OracleError> {
        let mut prompt = format!(
            "## Request\n{}\n\n## Records\n{}",
            user_request,
            render_records(records)
        );
        if !errors.is_empty() {
            prompt.push_str("\n\n## Capability failures\n");
            for e in errors {
                let _ = writeln!(prompt, "- {}", e);
            }
        }
        let reply = self.oracle.ask(SYNTHESIZE_SYSTEM_PROMPT, &prompt).await?;
        Ok(reply.trim().to_string())
    }

    /// Answer without capabilities. `context` carries notes from earlier
    /// stages (e.g. a discovery failure).
    pub async fn answer_directly(
        &self,
        user_request: &str,
        context: &[String],
    ) -> Result<String, OracleError> {
        let mut prompt = format!("## Request\n{}", user_request);
        if !context.is_empty() {
            prompt.push_str("\n\n## Context\n");
            for note in context {
                let _ = writeln!(prompt, "- {}", note);
            }
        }
        let reply = self.oracle.ask(DIRECT_ANSWER_SYSTEM_PROMPT, &prompt).await?;
        Ok(reply.trim().to_string())
    }

    /// Ask for a read-only rewrite of a rejected query.
    pub async fn repair_query(
        &self,
        user_request: &str,
        rejected_query: &str,
        reason: &str,
    ) -> Result<Option<String>, OracleError> {
        let prompt = format!(
            "## Request\n{}\n\n## Rejected query\n{}\n\n## Rejection reason\n{}",
            user_request, rejected_query, reason
        );
        let reply = self.oracle.ask(REPAIR_QUERY_SYSTEM_PROMPT, &prompt).await?;
        Ok(parse::parse_repaired_query(&reply))
    }
}

fn render_catalog(capabilities: &[CapabilityDescriptor]) -> String {
    if capabilities.is_empty() {
        return "(none)".to_string();
    }
    let mut out = String::new();
    for cap in capabilities {
        let _ = write!(out, "- id: {} | type: {}", cap.id, cap.kind);
        if let Some(desc) = cap.description() {
            let _ = write!(out, " | {}", desc);
        }
        if let Some(actions) = cap.metadata.get("actions") {
            let _ = write!(out, " | actions: {}", actions);
        }
        out.push('\n');
    }
    out
}

fn render_records(records: &[NormalizedRecord]) -> String {
    if records.is_empty() {
        return "(none)".to_string();
    }
    let mut out = String::new();
    for (i, r) in records.iter().enumerate() {
        let _ = writeln!(out, "[{}] source: {} ({})", i + 1, r.source, r.source_type);
        if !r.title.is_empty() {
            let _ = writeln!(out, "title: {}", r.title);
        }
        if !r.url.is_empty() {
            let _ = writeln!(out, "url: {}", r.url);
        }
        let preview: String = r.content.chars().take(RECORD_PREVIEW_CHARS).collect();
        let _ = writeln!(out, "{}\n", preview);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;

    /// Replies with a fixed string and remembers what it was asked.
    struct EchoOracle {
        reply: String,
        seen: Mutex<Vec<(String, String)>>,
    }

    impl EchoOracle {
        fn new(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.to_string(),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Oracle for EchoOracle {
        async fn ask(&self, system: &str, user: &str) -> Result<String, OracleError> {
            self.seen
                .lock()
                .unwrap()
                .push((system.to_string(), user.to_string()));
            Ok(self.reply.clone())
        }
    }

    struct DownOracle;

    #[async_trait]
    impl Oracle for DownOracle {
        async fn ask(&self, _system: &str, _user: &str) -> Result<String, OracleError> {
            Err(OracleError::Transport("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn test_plan_includes_catalog_in_prompt() {
        let oracle = EchoOracle::new(
            r#"{"tool_calls": [{"target_capability_id": "pg", "action": "execute_query", "parameters": {"query": "SELECT 1"}}]}"#,
        );
        let planner = Planner::new(oracle.clone());
        let mut pg = CapabilityDescriptor::new("pg", "localhost", 8003, "sql");
        pg.metadata
            .insert("description".into(), serde_json::json!("Customer database"));

        let plan = planner.plan("Show me all users", &[pg]).await.unwrap();
        assert_eq!(plan.tool_calls.len(), 1);

        let seen = oracle.seen.lock().unwrap();
        assert_eq!(seen[0].0, PLAN_SYSTEM_PROMPT);
        assert!(seen[0].1.contains("id: pg | type: sql | Customer database"));
    }

    #[tokio::test]
    async fn test_plan_with_malformed_reply_is_empty() {
        let planner = Planner::new(EchoOracle::new("\n    \"id\""));
        let plan = planner.plan("anything", &[]).await.unwrap();
        assert!(plan.tool_calls.is_empty());
        assert!(!plan.is_final_answer);
    }

    #[tokio::test]
    async fn test_can_answer_short_circuits_on_empty_draft() {
        let oracle = EchoOracle::new("{\"can_answer\": true}");
        let planner = Planner::new(oracle.clone());
        assert!(!planner.can_answer("q", "   ").await.unwrap());
        assert!(oracle.seen.lock().unwrap().is_empty());
        assert!(planner.can_answer("q", "draft").await.unwrap());
    }

    #[tokio::test]
    async fn test_synthesize_lists_failures() {
        let oracle = EchoOracle::new("  The answer.  ");
        let planner = Planner::new(oracle.clone());
        let text = planner
            .synthesize("q", &[], &["search phase: timeout".to_string()])
            .await
            .unwrap();
        assert_eq!(text, "The answer.");
        assert!(oracle.seen.lock().unwrap()[0]
            .1
            .contains("- search phase: timeout"));
    }

    #[tokio::test]
    async fn test_transport_failure_surfaces() {
        let planner = Planner::new(Arc::new(DownOracle));
        assert!(planner.plan("q", &[]).await.is_err());
        assert!(planner.plan_refinement("q", &[], "", &[]).await.is_err());
    }
}
