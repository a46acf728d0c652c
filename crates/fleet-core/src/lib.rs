//! Core types, errors and configuration for the fleet supervisor.
//!
//! This crate holds everything the reasoning and supervisor crates share:
//! the pipeline's data model, the error taxonomy, run configuration and the
//! closed registry of specialist agents and tools.
//!
//! # Main types
//!
//! - [`FleetError`] — Unified error enum for every pipeline stage.
//! - [`FleetResult`] — Convenience alias for `Result<T, FleetError>`.
//! - [`FleetConfig`] — Thresholds, budgets and profile of a run.
//! - [`Task`] — Immutable user request entering the pipeline.
//! - [`AgentRoster`] / [`ToolCatalog`] — Agents and tools available to a run.

/// Run configuration (TOML-loadable).
pub mod config;
/// Error taxonomy.
pub mod error;
/// Agent and tool registry.
pub mod roster;
/// `tracing` subscriber setup.
pub mod telemetry;
/// Pipeline data model.
pub mod types;

pub use config::{FleetConfig, LlmProvider, ModelConfig, PipelineProfile, RetryPolicy};
pub use error::{FleetError, FleetResult};
pub use roster::{
    default_roster, default_tool_catalog, AgentProfile, AgentRole, AgentRoster, ToolCatalog,
    ToolDescriptor, ToolKind,
};
pub use telemetry::{init_tracing, LogFormat};
pub use types::{
    AgentRun, AgentStatus, AnalysisResult, Complexity, ConversationTurn, ExecutionMode,
    ExecutionOutcome, JudgeVerdict, Phase, PhaseStatus, ProgressAction, ProgressAssessment,
    QualityAssessment, QualityFlag, ReasoningEffort, RoutingPlan, Subtask, Task, TurnRole,
};
