//! Supervisor pipeline of the fleet.
//!
//! A run walks a task through Analysis, Routing, Execution, Progress and
//! Quality, optionally followed by a time-boxed Judge, looping back to
//! Execution while the result stays below the quality bar and refinement
//! rounds remain. Progress is published as a stream of [`Event`]s.
//!
//! # Main types
//!
//! - [`SupervisorPipeline`] — Builds runs; owns the shared analysis cache.
//! - [`EventStream`] — Finite event stream of one run; dropping it cancels the run.
//! - [`AgentRuntime`] — Seam to the runtime that executes specialist agents.
//! - [`FinalResult`] — Result, verdict, timings and diagnostics of a run.

/// Agent runtime seam and the chat-backed runtime.
pub mod agents;
/// Per-run mutable state.
pub mod context;
/// Event stream types.
pub mod events;
/// Stage executors.
pub mod phases;
/// Pipeline orchestrator.
pub mod pipeline;

pub use agents::{AgentOutput, AgentRequest, AgentRuntime, ChatAgentRuntime};
pub use context::SupervisorContext;
pub use events::{Event, EventPayload, EventSink, FinalResult};
pub use phases::{AnalysisCache, Services};
pub use pipeline::{EventStream, RunReport, SupervisorPipeline, SupervisorPipelineBuilder};
