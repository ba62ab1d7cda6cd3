use serde::Serialize;

use super::phases::{Phase, PhasePlan};
use super::transition::Stage;
use crate::models::{CapabilityDescriptor, CapabilityResult, NormalizedRecord, ToolCall};

/// Everything one request's run knows. Created per request and owned by
/// that run alone.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowState {
    user_request: String,

    pub capabilities: Vec<CapabilityDescriptor>,
    /// Calls from the most recent plan or refinement.
    pub tool_calls: Vec<ToolCall>,
    pub is_final_answer: bool,
    /// Answer the planner volunteered with `is_final_answer`.
    pub planned_answer: Option<String>,
    /// Calls not yet executed, by phase.
    pub pending: PhasePlan,

    pub search_records: Vec<NormalizedRecord>,
    pub retrieval_records: Vec<NormalizedRecord>,
    pub other_records: Vec<NormalizedRecord>,
    pub combined_records: Vec<NormalizedRecord>,
    /// Every capability result of the run, in execution order.
    pub results: Vec<CapabilityResult>,

    pub synthesized_text: String,
    pub can_answer: bool,
    pub iteration_count: u32,
    pub max_iterations: u32,

    pub final_answer: Option<String>,
    /// Last non-fatal error. Cleared once the combined list is non-empty.
    pub error_message: Option<String>,
    /// Every non-fatal error of the run; not cleared.
    pub phase_errors: Vec<String>,
    /// Notes for a direct answer, e.g. why no capabilities were available.
    pub context_notes: Vec<String>,
    pub failure_reason: Option<String>,

    pub stage_path: Vec<Stage>,
    pub step_count: u32,
}

impl WorkflowState {
    pub fn new(user_request: impl Into<String>, max_iterations: u32) -> Self {
        Self {
            user_request: user_request.into(),
            capabilities: Vec::new(),
            tool_calls: Vec::new(),
            is_final_answer: false,
            planned_answer: None,
            pending: PhasePlan::default(),
            search_records: Vec::new(),
            retrieval_records: Vec::new(),
            other_records: Vec::new(),
            combined_records: Vec::new(),
            results: Vec::new(),
            synthesized_text: String::new(),
            can_answer: false,
            iteration_count: 0,
            max_iterations,
            final_answer: None,
            error_message: None,
            phase_errors: Vec::new(),
            context_notes: Vec::new(),
            failure_reason: None,
            stage_path: Vec::new(),
            step_count: 0,
        }
    }

    pub fn user_request(&self) -> &str {
        &self.user_request
    }

    pub fn records_mut(&mut self, phase: Phase) -> &mut Vec<NormalizedRecord> {
        match phase {
            Phase::Search => &mut self.search_records,
            Phase::Retrieval => &mut self.retrieval_records,
            Phase::Other => &mut self.other_records,
        }
    }

    /// Record a non-fatal error without touching gathered data.
    pub fn note_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        self.phase_errors.push(message.clone());
        self.error_message = Some(message);
    }
}
