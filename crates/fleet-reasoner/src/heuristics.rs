//! Deterministic stand-ins for every reasoning call.
//!
//! Used when reasoning is disabled (light profile) or when the model keeps
//! failing. They never fail and never consult anything but their inputs.

use fleet_core::{
    AgentRoster, AnalysisResult, Complexity, ExecutionMode, FleetConfig, JudgeVerdict,
    ProgressAction, ProgressAssessment, QualityAssessment, QualityFlag, RoutingPlan, Task,
};

/// Capability tag assigned when nothing better is known.
pub const GENERIC_CAPABILITY: &str = "general_reasoning";

/// Word-count thresholds of the complexity heuristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeuristicSettings {
    /// At most this many words → low complexity.
    pub simple_task_max_words: usize,
    /// More than this many words → high complexity.
    pub complex_task_min_words: usize,
}

impl Default for HeuristicSettings {
    fn default() -> Self {
        Self {
            simple_task_max_words: 40,
            complex_task_min_words: 150,
        }
    }
}

impl From<&FleetConfig> for HeuristicSettings {
    fn from(config: &FleetConfig) -> Self {
        Self {
            simple_task_max_words: config.simple_task_max_words,
            complex_task_min_words: config.complex_task_min_words,
        }
    }
}

/// Classify complexity by word count.
pub fn complexity_for(words: usize, settings: &HeuristicSettings) -> Complexity {
    if words <= settings.simple_task_max_words {
        Complexity::Low
    } else if words <= settings.complex_task_min_words {
        Complexity::Medium
    } else {
        Complexity::High
    }
}

/// Analysis without a model.
pub fn analysis(task: &Task, settings: &HeuristicSettings) -> AnalysisResult {
    let words = task.word_count();
    let complexity = complexity_for(words, settings);
    let steps = match complexity {
        Complexity::Low => 1,
        Complexity::Medium => 3,
        Complexity::High => 5,
    };
    AnalysisResult {
        complexity,
        capabilities: vec![GENERIC_CAPABILITY.to_string()],
        steps,
        needs_web_search: false,
        reasoning: format!("heuristic: {words} words classified as {complexity} complexity"),
    }
}

/// Routing without a model: every roster agent, delegated, no tools.
pub fn routing(roster: &AgentRoster) -> RoutingPlan {
    RoutingPlan {
        assigned_agents: roster.ids().into_iter().map(String::from).collect(),
        execution_mode: ExecutionMode::Delegated,
        tool_requirements: Vec::new(),
        subtasks: Vec::new(),
        reasoning: "heuristic: all agents assigned, delegated to the first".into(),
    }
}

/// Progress without a model: the task is considered complete.
pub fn progress() -> ProgressAssessment {
    ProgressAssessment {
        action: ProgressAction::Complete,
        rationale: "heuristic: no progress model available, assuming complete".into(),
    }
}

/// Quality without a model: conservative zero score.
pub fn quality() -> QualityAssessment {
    QualityAssessment {
        score: 0.0,
        flag: QualityFlag::Fail,
        improvements: String::new(),
        reasoning: "heuristic: quality could not be assessed".into(),
    }
}

/// Judge without a model: no objection.
pub fn judge() -> JudgeVerdict {
    JudgeVerdict::no_objection("heuristic: judge unavailable")
}
