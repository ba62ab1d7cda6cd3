//! Switchboard Core: answers a natural-language request by orchestrating
//! calls to backend capabilities, with a language model deciding what to call.
//!
//! This crate contains the whole workflow engine and its collaborators. It is
//! transport-agnostic toward its callers, making it suitable for use in:
//!
//! - the `switchboard` CLI
//! - HTTP front ends that embed the engine
//! - tests that script the oracle and the capabilities in memory
//!
//! # Components
//!
//! - [`registry`]: capability discovery (fail-soft, cached)
//! - [`planner`]: oracle-backed planning, answerability and refinement
//! - [`invoker`]: HTTP / TCP capability calls; failures become data
//! - [`safety`]: structured-query validation before execution
//! - [`normalize`]: heterogeneous payloads into [`models::NormalizedRecord`]s
//! - [`workflow`]: the stage graph and the engine that drives it

pub mod config;
pub mod error;
pub mod invoker;
pub mod models;
pub mod normalize;
pub mod oracle;
pub mod planner;
pub mod registry;
pub mod safety;
pub mod workflow;

// Convenience re-exports
pub use config::WorkflowConfig;
pub use error::SwitchboardError;
pub use workflow::{WorkflowEngine, WorkflowOutcome};
