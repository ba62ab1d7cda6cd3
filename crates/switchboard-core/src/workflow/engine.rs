//! Workflow Engine: runs one request through the stage graph.
//!
//! The engine:
//! 1. Discovers capabilities (fail-soft)
//! 2. Asks the planner for tool calls, or takes a direct-answer/failure shortcut
//! 3. Executes calls phase by phase (search, then retrieval, then the rest),
//!    validating structured queries before they leave the process
//! 4. Normalizes, merges and deduplicates records across phases
//! 5. Synthesizes an answer and asks whether it is sufficient
//! 6. Refines and loops until answerable or out of iterations
//!
//! Stage handlers return an [`Event`]; the pure [`transition`] function picks
//! the next stage. An `Err` from a handler becomes [`Event::Fault`].

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use super::phases::{self, classify, source_hint, Phase, PhasePlan};
use super::state::WorkflowState;
use super::transition::{transition, Event, Stage};
use crate::config::WorkflowConfig;
use crate::error::{Result, SwitchboardError};
use crate::invoker::{CapabilityInvoker, NetworkInvoker};
use crate::models::{
    CapabilityResult, CapabilityType, InvocationErrorKind, NormalizedRecord, ToolCall, QUERY_KEYS,
};
use crate::normalize::Normalizer;
use crate::oracle::{HttpOracle, Oracle};
use crate::planner::Planner;
use crate::registry::RegistryClient;
use crate::safety::{OracleSafetyCheck, QueryValidator};

/// Characters of each record shown in a fallback answer.
const FALLBACK_PREVIEW_CHARS: usize = 300;

/// What the caller gets back from [`WorkflowEngine::run`].
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowOutcome {
    pub success: bool,
    pub final_answer: String,
    pub terminal_stage: Stage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub iterations: u32,
    pub records: Vec<NormalizedRecord>,
    pub stage_path: Vec<Stage>,
}

pub struct WorkflowEngine {
    config: WorkflowConfig,
    registry: Arc<RegistryClient>,
    planner: Planner,
    invoker: Arc<dyn CapabilityInvoker>,
    validator: QueryValidator,
    normalizer: Normalizer,
}

impl WorkflowEngine {
    pub fn new(
        config: WorkflowConfig,
        registry: Arc<RegistryClient>,
        oracle: Arc<dyn Oracle>,
        invoker: Arc<dyn CapabilityInvoker>,
    ) -> Self {
        let mut validator = QueryValidator::new(config.safety.clone());
        if config.safety.llm_check {
            validator = validator.with_semantic_check(Arc::new(OracleSafetyCheck::new(oracle.clone())));
        }
        Self {
            planner: Planner::new(oracle),
            registry,
            invoker,
            validator,
            normalizer: Normalizer::new(),
            config,
        }
    }

    /// Engine wired to the HTTP oracle, network invoker and configured registry.
    pub fn from_config(config: WorkflowConfig) -> Self {
        let registry = Arc::new(RegistryClient::from_config(&config.registry));
        let oracle: Arc<dyn Oracle> = Arc::new(HttpOracle::new(config.oracle.clone()));
        let invoker: Arc<dyn CapabilityInvoker> =
            Arc::new(NetworkInvoker::new(config.invocation.clone()));
        Self::new(config, registry, oracle, invoker)
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<RegistryClient> {
        &self.registry
    }

    pub fn new_state(&self, user_request: &str) -> WorkflowState {
        WorkflowState::new(user_request.trim(), self.config.max_iterations)
    }

    /// Process one request to a terminal stage. Never fails: errors end in
    /// the `failure` stage with an answer describing them.
    pub async fn run(&self, user_request: &str) -> WorkflowOutcome {
        let mut state = self.new_state(user_request);
        let terminal = self.drive(&mut state).await;
        WorkflowOutcome {
            success: terminal.is_success(),
            final_answer: state.final_answer.clone().unwrap_or_default(),
            terminal_stage: terminal,
            failure_reason: state.failure_reason.clone(),
            error_message: state.error_message.clone(),
            iterations: state.iteration_count,
            records: state.combined_records,
            stage_path: state.stage_path,
        }
    }

    /// Run `state` from `init` to a terminal stage and return that stage.
    pub async fn drive(&self, state: &mut WorkflowState) -> Stage {
        let mut stage = Stage::Init;
        loop {
            if stage.is_terminal() {
                state.stage_path.push(stage);
                match self.execute_stage(stage, state).await {
                    Err(e) if stage != Stage::Failure => {
                        tracing::error!("[Workflow] {} failed: {}", stage, e);
                        state.failure_reason = Some(e.to_string());
                        state.error_message = Some(e.to_string());
                        stage = Stage::Failure;
                        continue;
                    }
                    _ => {}
                }
                tracing::info!(
                    "[Workflow] finished in {} after {} steps, {} refinement(s)",
                    stage,
                    state.step_count,
                    state.iteration_count
                );
                return stage;
            }

            if state.step_count >= self.config.max_steps {
                tracing::error!("[Workflow] step limit {} reached at {}", self.config.max_steps, stage);
                state.failure_reason = Some(format!(
                    "step limit of {} reached at stage {}",
                    self.config.max_steps, stage
                ));
                stage = Stage::Failure;
                continue;
            }
            state.stage_path.push(stage);
            state.step_count += 1;

            let event = match self.execute_stage(stage, state).await {
                Ok(event) => event,
                Err(e) => {
                    tracing::error!("[Workflow] {} failed: {}", stage, e);
                    state.failure_reason = Some(e.to_string());
                    state.error_message = Some(e.to_string());
                    Event::Fault
                }
            };
            let next = transition(stage, &event);
            tracing::debug!("[Workflow] {} --{:?}--> {}", stage, event, next);
            stage = next;
        }
    }

    /// Execute a single stage against `state`.
    pub async fn execute_stage(&self, stage: Stage, state: &mut WorkflowState) -> Result<Event> {
        match stage {
            Stage::Init => self.init(state),
            Stage::Discover => Ok(self.discover(state).await),
            Stage::Plan => self.plan(state).await,
            Stage::RouteDirectAnswer => self.direct_answer(state).await,
            Stage::RouteFailure => Ok(self.no_capability(state)),
            Stage::RouteCapabilities => Ok(self.route(state)),
            Stage::ExecuteSearch => Ok(self.execute_phase(Phase::Search, state).await),
            Stage::ExecuteRetrieval => Ok(self.execute_phase(Phase::Retrieval, state).await),
            Stage::ExecuteOther => Ok(self.execute_phase(Phase::Other, state).await),
            Stage::CombineResults => Ok(self.combine(state)),
            Stage::Synthesize => Ok(self.synthesize(state).await),
            Stage::EvaluateAnswerable => Ok(self.evaluate(state).await),
            Stage::Refine => Ok(self.refine(state).await),
            Stage::FinalAnswer => Ok(self.final_answer(state)),
            Stage::Failure => Ok(self.failure(state)),
        }
    }

    fn init(&self, state: &mut WorkflowState) -> Result<Event> {
        if state.user_request().is_empty() {
            return Err(SwitchboardError::InvalidRequest("the request is empty".to_string()));
        }
        tracing::info!("[Workflow] request: {}", state.user_request());
        Ok(Event::Advance)
    }

    async fn discover(&self, state: &mut WorkflowState) -> Event {
        let discovery = self.registry.discover().await;
        if let Some(err) = discovery.error {
            state.context_notes.push(format!("Capability discovery failed: {}", err));
            state.note_error(err);
        }

        let toggles = &self.config.capabilities;
        state.capabilities = discovery
            .capabilities
            .into_iter()
            .filter(|c| {
                let enabled = toggles.is_enabled(c.routing());
                if !enabled {
                    tracing::debug!("[Workflow] {} hidden ({} disabled)", c.id, c.routing());
                }
                enabled
            })
            .collect();
        if state.capabilities.is_empty() {
            state
                .context_notes
                .push("No backend capabilities are available.".to_string());
        }
        Event::Advance
    }

    async fn plan(&self, state: &mut WorkflowState) -> Result<Event> {
        let plan = self
            .planner
            .plan(state.user_request(), &state.capabilities)
            .await?;
        let event = Event::PlanReady {
            tool_calls: plan.tool_calls.len(),
            is_final_answer: plan.is_final_answer,
        };
        state.tool_calls = plan.tool_calls;
        state.is_final_answer = plan.is_final_answer;
        state.planned_answer = plan.answer.filter(|a| !a.trim().is_empty());
        Ok(event)
    }

    async fn direct_answer(&self, state: &mut WorkflowState) -> Result<Event> {
        let answer = match state.planned_answer.clone() {
            Some(answer) => answer,
            None => {
                self.planner
                    .answer_directly(state.user_request(), &state.context_notes)
                    .await?
            }
        };
        state.synthesized_text = answer.clone();
        state.final_answer = Some(answer);
        Ok(Event::Advance)
    }

    fn no_capability(&self, state: &mut WorkflowState) -> Event {
        let reason = "no applicable capability for this request".to_string();
        let mut answer = "I could not find a capability that can answer this request.".to_string();
        if let Some(ref err) = state.error_message {
            answer.push_str(&format!(" ({})", err));
        }
        state.failure_reason = Some(reason);
        state.final_answer = Some(answer);
        Event::Advance
    }

    fn route(&self, state: &mut WorkflowState) -> Event {
        let calls = std::mem::take(&mut state.tool_calls);
        state.pending = PhasePlan::partition(calls.clone(), &state.capabilities, &self.config.capabilities);
        state.tool_calls = calls;
        tracing::info!(
            "[Workflow] routed {} call(s): search={}, retrieval={}, other={}",
            state.pending.len(),
            state.pending.search.len(),
            state.pending.retrieval.len(),
            state.pending.other.len()
        );
        Event::Advance
    }

    async fn execute_phase(&self, phase: Phase, state: &mut WorkflowState) -> Event {
        let calls = state.pending.take(phase);
        if calls.is_empty() {
            return Event::Advance;
        }
        tracing::info!("[Workflow] {} phase: {} call(s)", phase, calls.len());

        for call in calls {
            let kind = classify(&call, &state.capabilities);
            let mut call = call;
            let result = match self.guard_query(&mut call, kind, state).await {
                Ok(()) => self.invoker.invoke_call(&call, &state.capabilities).await,
                Err(e) => CapabilityResult::failure(&call, InvocationErrorKind::Rejected, e.to_string()),
            };

            if result.is_success() {
                let records = self.normalizer.records_from_result(&result, source_hint(kind));
                tracing::debug!(
                    "[Workflow] {} {} produced {} record(s)",
                    result.capability_id,
                    result.action,
                    records.len()
                );
                state.records_mut(phase).extend(records);
            } else {
                state.note_error(format!(
                    "{} phase: {} {} failed: {}",
                    phase,
                    result.capability_id,
                    result.action,
                    result.error.as_deref().unwrap_or("unknown error")
                ));
            }
            state.results.push(result);
        }
        Event::Advance
    }

    /// Validate the query of a SQL-routed call, asking the planner to repair
    /// rejected queries in place. A SQL call without a string query is
    /// rejected outright.
    async fn guard_query(
        &self,
        call: &mut ToolCall,
        kind: CapabilityType,
        state: &mut WorkflowState,
    ) -> Result<()> {
        if kind != CapabilityType::Sql || !self.validator.blocking_enabled() {
            return Ok(());
        }
        let Some(key) = call.query_key() else {
            let reason = format!(
                "no query text in parameters (expected a string under one of: {})",
                QUERY_KEYS.join(", ")
            );
            tracing::warn!("[Workflow] call to {} rejected: {}", call.target_capability_id, reason);
            state.phase_errors.push(format!(
                "query for {} rejected: {}",
                call.target_capability_id, reason
            ));
            return Err(SwitchboardError::Validation(reason));
        };
        let schema = schema_context(call, state);

        let mut attempt = 0;
        loop {
            let query = call.query_text().unwrap_or_default().to_string();
            let verdict = self.validator.check(&query, schema.as_deref()).await;
            if verdict.safe {
                return Ok(());
            }
            let reason = verdict.reason.unwrap_or_else(|| "rejected".to_string());
            tracing::warn!(
                "[Workflow] query for {} rejected (attempt {}): {}",
                call.target_capability_id,
                attempt + 1,
                reason
            );
            state.phase_errors.push(format!(
                "query for {} rejected: {}",
                call.target_capability_id, reason
            ));

            if attempt >= self.config.max_validation_retries {
                return Err(SwitchboardError::Validation(format!(
                    "{} (after {} repair attempt(s))",
                    reason, self.config.max_validation_retries
                )));
            }
            attempt += 1;

            match self
                .planner
                .repair_query(state.user_request(), &query, &reason)
                .await
            {
                Ok(Some(repaired)) => {
                    call.parameters.insert(key.to_string(), Value::String(repaired));
                }
                Ok(None) => {
                    return Err(SwitchboardError::Validation(format!(
                        "{} (no read-only rewrite available)",
                        reason
                    )));
                }
                Err(e) => {
                    return Err(SwitchboardError::Validation(format!(
                        "{} (repair failed: {})",
                        reason, e
                    )));
                }
            }
        }
    }

    fn combine(&self, state: &mut WorkflowState) -> Event {
        state.combined_records = phases::combine(&[
            &state.search_records[..],
            &state.retrieval_records[..],
            &state.other_records[..],
        ]);
        if !state.combined_records.is_empty() {
            state.error_message = None;
        }
        tracing::info!(
            "[Workflow] combined {} record(s)",
            state.combined_records.len()
        );
        Event::Advance
    }

    async fn synthesize(&self, state: &mut WorkflowState) -> Event {
        let records =
            phases::rank_for_synthesis(&state.combined_records, self.config.synthesis.max_records);
        match self
            .planner
            .synthesize(state.user_request(), &records, &state.phase_errors)
            .await
        {
            Ok(text) if !text.is_empty() => state.synthesized_text = text,
            Ok(_) => state.synthesized_text = fallback_answer(&records),
            Err(e) => {
                state.note_error(format!("synthesis failed: {}", e));
                state.synthesized_text = fallback_answer(&records);
            }
        }
        Event::Advance
    }

    async fn evaluate(&self, state: &mut WorkflowState) -> Event {
        state.can_answer = match self
            .planner
            .can_answer(state.user_request(), &state.synthesized_text)
            .await
        {
            Ok(verdict) => verdict,
            Err(e) => {
                state.note_error(format!("answerability check failed: {}", e));
                false
            }
        };
        tracing::info!(
            "[Workflow] can_answer={} (iteration {}/{})",
            state.can_answer,
            state.iteration_count,
            state.max_iterations
        );
        Event::Evaluated {
            can_answer: state.can_answer,
            iteration_count: state.iteration_count,
            max_iterations: state.max_iterations,
        }
    }

    async fn refine(&self, state: &mut WorkflowState) -> Event {
        state.iteration_count += 1;
        let calls = match self
            .planner
            .plan_refinement(
                state.user_request(),
                &state.combined_records,
                &state.synthesized_text,
                &state.capabilities,
            )
            .await
        {
            Ok(calls) => calls,
            Err(e) => {
                state.note_error(format!("refinement failed: {}", e));
                Vec::new()
            }
        };
        tracing::info!(
            "[Workflow] refinement {}: {} new call(s)",
            state.iteration_count,
            calls.len()
        );
        let event = Event::RefinementPlanned {
            tool_calls: calls.len(),
        };
        state.tool_calls = calls;
        self.route(state);
        event
    }

    fn final_answer(&self, state: &mut WorkflowState) -> Event {
        state.final_answer = Some(state.synthesized_text.clone());
        Event::Advance
    }

    fn failure(&self, state: &mut WorkflowState) -> Event {
        let passes = state.iteration_count;
        let reason = state
            .failure_reason
            .get_or_insert_with(|| format!("no sufficient answer after {} refinement pass(es)", passes))
            .clone();
        state.final_answer = Some(describe_failure(state, &reason));
        Event::Advance
    }
}

/// Best-effort answer for a failed run: the latest synthesis, else the
/// gathered records, else the failure itself.
fn describe_failure(state: &WorkflowState, reason: &str) -> String {
    if !state.synthesized_text.trim().is_empty() {
        return state.synthesized_text.clone();
    }
    if !state.combined_records.is_empty() {
        return fallback_answer(&state.combined_records);
    }
    format!("I was unable to complete this request: {}", reason)
}

/// Plain listing of records, used when the oracle cannot synthesize.
fn fallback_answer(records: &[NormalizedRecord]) -> String {
    if records.is_empty() {
        return "No information could be gathered for this request.".to_string();
    }
    let mut out = String::from("Here is what I found:\n");
    for r in records {
        let preview: String = r.content.chars().take(FALLBACK_PREVIEW_CHARS).collect();
        if r.title.is_empty() {
            out.push_str(&format!("\n- [{}] {}", r.source, preview));
        } else {
            out.push_str(&format!("\n- [{}] {}: {}", r.source, r.title, preview));
        }
    }
    out
}

/// Schema hint for the safety check, from the target's descriptor metadata.
fn schema_context(call: &ToolCall, state: &WorkflowState) -> Option<String> {
    let capability = state
        .capabilities
        .iter()
        .find(|c| c.id == call.target_capability_id)?;
    match capability.metadata.get("schema")? {
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
