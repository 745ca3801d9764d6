//! Gateway module - orchestration, single-flight registry, and job polling

pub mod inflight;
pub mod job;
pub mod orchestrator;

pub use orchestrator::Orchestrator;
