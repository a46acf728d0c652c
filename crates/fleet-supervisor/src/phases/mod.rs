//! Stage executors of the supervisor pipeline.
//!
//! Every executor takes the shared [`Services`] and the run's
//! [`SupervisorContext`], stores its result in the context and returns the
//! stage status. Only Execution can fail.

/// Complexity estimate, cached.
pub mod analysis;
/// Agent fan-out and fan-in.
pub mod execution;
/// Time-boxed final review.
pub mod judge;
/// Progress assessment.
pub mod progress;
/// Scoring and refinement decisions.
pub mod quality;
/// Plan validation against the roster.
pub mod routing;

use crate::agents::AgentRuntime;
use fleet_core::{AgentRoster, AnalysisResult, PhaseStatus, ToolCatalog};
use fleet_reasoner::{Origin, Reasoner, TtlCache};
use std::sync::Arc;

/// Cache of model-produced analyses, keyed by task and config fingerprint.
pub type AnalysisCache = TtlCache<String, AnalysisResult>;

/// Collaborators shared by every run of a pipeline.
pub struct Services {
    /// Reasoning model with heuristic fallbacks.
    pub reasoner: Reasoner,
    /// Runtime executing specialist agents.
    pub runtime: Arc<dyn AgentRuntime>,
    /// Agents the router may assign.
    pub roster: AgentRoster,
    /// Tools the router may require.
    pub tools: ToolCatalog,
    /// Analysis cache, shared across runs.
    pub cache: Arc<AnalysisCache>,
}

/// Stage status for a reasoned decision.
pub(crate) fn status_for(origin: &Origin) -> PhaseStatus {
    match origin {
        Origin::Model => PhaseStatus::Success,
        Origin::Heuristic { reason } => PhaseStatus::Fallback {
            reason: reason.clone(),
        },
    }
}
