//! The orchestration workflow: stages, transitions, run-scoped state and the
//! engine that drives them.

pub mod engine;
pub mod phases;
pub mod state;
pub mod transition;

pub use engine::{WorkflowEngine, WorkflowOutcome};
pub use phases::{Phase, PhasePlan};
pub use state::WorkflowState;
pub use transition::{transition, Event, Stage};
