//! Phase routing and cross-phase merging.

use std::cmp::Ordering;
use std::collections::HashSet;

use serde::Serialize;

use crate::config::CapabilityToggles;
use crate::models::{CapabilityDescriptor, CapabilityType, NormalizedRecord, SourceType, ToolCall};

/// Execution group. Phases run in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Search,
    Retrieval,
    Other,
}

impl Phase {
    pub fn of(kind: CapabilityType) -> Self {
        match kind {
            CapabilityType::Search => Phase::Search,
            CapabilityType::Retrieval => Phase::Retrieval,
            CapabilityType::Sql | CapabilityType::Other => Phase::Other,
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Search => write!(f, "search"),
            Phase::Retrieval => write!(f, "retrieval"),
            Phase::Other => write!(f, "other"),
        }
    }
}

/// Routing class of a call: its descriptor's, or a guess from the id and
/// action when the target was not discovered.
pub fn classify(call: &ToolCall, capabilities: &[CapabilityDescriptor]) -> CapabilityType {
    capabilities
        .iter()
        .find(|c| c.id == call.target_capability_id)
        .map(CapabilityDescriptor::routing)
        .unwrap_or_else(|| CapabilityType::infer(&call.target_capability_id, &call.action))
}

/// Normalizer hint for results of a given routing class.
pub fn source_hint(kind: CapabilityType) -> Option<SourceType> {
    match kind {
        CapabilityType::Search => Some(SourceType::Search),
        CapabilityType::Retrieval => Some(SourceType::Retrieval),
        CapabilityType::Sql => Some(SourceType::Sql),
        CapabilityType::Other => None,
    }
}

/// Calls waiting to run, grouped by phase.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PhasePlan {
    pub search: Vec<ToolCall>,
    pub retrieval: Vec<ToolCall>,
    pub other: Vec<ToolCall>,
}

impl PhasePlan {
    /// Sort calls into phases, keeping planner order inside each phase.
    /// Calls routed to a disabled capability type are dropped.
    pub fn partition(
        calls: Vec<ToolCall>,
        capabilities: &[CapabilityDescriptor],
        toggles: &CapabilityToggles,
    ) -> Self {
        let mut plan = PhasePlan::default();
        for call in calls {
            let kind = classify(&call, capabilities);
            if !toggles.is_enabled(kind) {
                tracing::warn!(
                    "[Workflow] dropping call to {} ({} capabilities are disabled)",
                    call.target_capability_id,
                    kind
                );
                continue;
            }
            plan.calls_mut(Phase::of(kind)).push(call);
        }
        plan
    }

    pub fn calls_mut(&mut self, phase: Phase) -> &mut Vec<ToolCall> {
        match phase {
            Phase::Search => &mut self.search,
            Phase::Retrieval => &mut self.retrieval,
            Phase::Other => &mut self.other,
        }
    }

    /// Remove and return one phase's calls.
    pub fn take(&mut self, phase: Phase) -> Vec<ToolCall> {
        std::mem::take(self.calls_mut(phase))
    }

    pub fn len(&self) -> usize {
        self.search.len() + self.retrieval.len() + self.other.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Concatenate phase lists in order, keeping the first record per dedup key.
pub fn combine(lists: &[&[NormalizedRecord]]) -> Vec<NormalizedRecord> {
    let mut seen = HashSet::new();
    lists
        .iter()
        .flat_map(|list| list.iter())
        .filter(|r| seen.insert(r.dedup_key()))
        .cloned()
        .collect()
}

/// The `limit` most relevant records. Ties keep their combined order.
pub fn rank_for_synthesis(records: &[NormalizedRecord], limit: usize) -> Vec<NormalizedRecord> {
    let mut ranked = records.to_vec();
    ranked.sort_by(|a, b| {
        b.relevance_score
            .partial_cmp(&a.relevance_score)
            .unwrap_or(Ordering::Equal)
    });
    ranked.truncate(limit);
    ranked
}
