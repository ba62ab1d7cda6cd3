//! Workflow stages and the pure transition function.
//!
//! ```text
//! init → discover → plan ─┬─► route_direct_answer*
//!                         ├─► route_failure*
//!                         └─► route_capabilities
//!                                   │
//!      ┌────────────────────────────┘
//!      ▼
//! execute_search → execute_retrieval → execute_other → combine_results
//!      ▲                                                    │
//!      │                                                    ▼
//!    refine ◄──── evaluate_answerable ◄──────────────── synthesize
//!                   │            │
//!                   ▼            ▼
//!             final_answer*   failure*
//! ```
//!
//! Any stage can fall to `failure*` on [`Event::Fault`].

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Init,
    Discover,
    Plan,
    RouteDirectAnswer,
    RouteFailure,
    RouteCapabilities,
    ExecuteSearch,
    ExecuteRetrieval,
    ExecuteOther,
    CombineResults,
    Synthesize,
    EvaluateAnswerable,
    Refine,
    FinalAnswer,
    Failure,
}

impl Stage {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Stage::RouteDirectAnswer | Stage::RouteFailure | Stage::FinalAnswer | Stage::Failure
        )
    }

    /// Terminal stages that count as a successful run.
    pub fn is_success(self) -> bool {
        matches!(self, Stage::RouteDirectAnswer | Stage::FinalAnswer)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Init => "init",
            Stage::Discover => "discover",
            Stage::Plan => "plan",
            Stage::RouteDirectAnswer => "route_direct_answer",
            Stage::RouteFailure => "route_failure",
            Stage::RouteCapabilities => "route_capabilities",
            Stage::ExecuteSearch => "execute_search",
            Stage::ExecuteRetrieval => "execute_retrieval",
            Stage::ExecuteOther => "execute_other",
            Stage::CombineResults => "combine_results",
            Stage::Synthesize => "synthesize",
            Stage::EvaluateAnswerable => "evaluate_answerable",
            Stage::Refine => "refine",
            Stage::FinalAnswer => "final_answer",
            Stage::Failure => "failure",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a stage reports when it finishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The stage completed; take its single outgoing edge.
    Advance,
    PlanReady {
        tool_calls: usize,
        is_final_answer: bool,
    },
    Evaluated {
        can_answer: bool,
        iteration_count: u32,
        max_iterations: u32,
    },
    RefinementPlanned {
        tool_calls: usize,
    },
    /// Unexpected error inside the stage.
    Fault,
}

pub fn transition(stage: Stage, event: &Event) -> Stage {
    if stage.is_terminal() {
        return stage;
    }

    match (stage, event) {
        (_, Event::Fault) => Stage::Failure,

        (Stage::Init, Event::Advance) => Stage::Discover,
        (Stage::Discover, Event::Advance) => Stage::Plan,

        (
            Stage::Plan,
            Event::PlanReady {
                tool_calls,
                is_final_answer,
            },
        ) => match (*tool_calls, *is_final_answer) {
            (0, true) => Stage::RouteDirectAnswer,
            (0, false) => Stage::RouteFailure,
            _ => Stage::RouteCapabilities,
        },

        (Stage::RouteCapabilities, Event::Advance) => Stage::ExecuteSearch,
        (Stage::ExecuteSearch, Event::Advance) => Stage::ExecuteRetrieval,
        (Stage::ExecuteRetrieval, Event::Advance) => Stage::ExecuteOther,
        (Stage::ExecuteOther, Event::Advance) => Stage::CombineResults,
        (Stage::CombineResults, Event::Advance) => Stage::Synthesize,
        (Stage::Synthesize, Event::Advance) => Stage::EvaluateAnswerable,

        (
            Stage::EvaluateAnswerable,
            Event::Evaluated {
                can_answer,
                iteration_count,
                max_iterations,
            },
        ) => {
            if *can_answer {
                Stage::FinalAnswer
            } else if iteration_count >= max_iterations {
                Stage::Failure
            } else {
                Stage::Refine
            }
        }

        // An empty refinement still counts as a pass; the next evaluation
        // sees the incremented iteration count.
        (Stage::Refine, Event::RefinementPlanned { .. }) => Stage::ExecuteSearch,

        (stage, event) => {
            tracing::error!("[Workflow] no edge from {} on {:?}", stage, event);
            Stage::Failure
        }
    }
}

/// Counted stages of the longest run `transition` allows with
/// `max_iterations` refinement passes: every pass executes, and the last
/// evaluation happens after the final refinement.
pub fn steps_required(max_iterations: u32) -> u32 {
    let mut stage = Stage::Init;
    let mut steps = 0;
    let mut iteration_count = 0;
    while !stage.is_terminal() {
        steps += 1;
        let event = match stage {
            Stage::Plan => Event::PlanReady {
                tool_calls: 1,
                is_final_answer: false,
            },
            Stage::EvaluateAnswerable => Event::Evaluated {
                can_answer: false,
                iteration_count,
                max_iterations,
            },
            Stage::Refine => {
                iteration_count += 1;
                Event::RefinementPlanned { tool_calls: 0 }
            }
            _ => Event::Advance,
        };
        stage = transition(stage, &event);
    }
    steps
}
