use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::FleetError;

// --- Task ---

/// Author of a turn in the conversation history attached to a [`Task`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    /// The human end-user.
    User,
    /// A previous assistant answer.
    Assistant,
}

/// A prior exchange the user wants the fleet to take into account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// Who wrote the turn.
    pub role: TurnRole,
    /// The turn's text.
    pub content: String,
}

impl ConversationTurn {
    /// A user-authored turn.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
        }
    }

    /// An assistant-authored turn.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: content.into(),
        }
    }
}

/// How much reasoning the caller wants the model to spend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    /// Fastest possible answer; used for the time-boxed judge.
    Minimal,
    /// Light reasoning.
    Low,
    /// Provider default.
    Medium,
    /// Deep reasoning.
    High,
}

impl fmt::Display for ReasoningEffort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReasoningEffort::Minimal => write!(f, "minimal"),
            ReasoningEffort::Low => write!(f, "low"),
            ReasoningEffort::Medium => write!(f, "medium"),
            ReasoningEffort::High => write!(f, "high"),
        }
    }
}

/// A user task entering the pipeline. Never mutated after construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    id: Uuid,
    text: String,
    #[serde(default)]
    history: Vec<ConversationTurn>,
    #[serde(default)]
    reasoning_effort: Option<ReasoningEffort>,
    created_at: DateTime<Utc>,
}

impl Task {
    /// Create a task from the user's request.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            history: Vec::new(),
            reasoning_effort: None,
            created_at: Utc::now(),
        }
    }

    /// Attach prior conversation turns.
    pub fn with_history(mut self, history: Vec<ConversationTurn>) -> Self {
        self.history = history;
        self
    }

    /// Attach a reasoning-effort hint.
    pub fn with_reasoning_effort(mut self, effort: ReasoningEffort) -> Self {
        self.reasoning_effort = Some(effort);
        self
    }

    /// Unique id of the task.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The user's request text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Prior conversation turns, oldest first.
    pub fn history(&self) -> &[ConversationTurn] {
        &self.history
    }

    /// Optional reasoning-effort hint.
    pub fn reasoning_effort(&self) -> Option<ReasoningEffort> {
        self.reasoning_effort
    }

    /// When the task entered the pipeline.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Number of whitespace-separated words in the task text.
    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

// --- Analysis ---

/// Estimated task complexity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    /// A short, single-step request.
    Low,
    /// A few steps, possibly more than one specialist.
    Medium,
    /// Multi-step work requiring several specialists.
    High,
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Complexity::Low => write!(f, "low"),
            Complexity::Medium => write!(f, "medium"),
            Complexity::High => write!(f, "high"),
        }
    }
}

impl FromStr for Complexity {
    type Err = FleetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" | "simple" | "easy" => Ok(Complexity::Low),
            "medium" | "moderate" => Ok(Complexity::Medium),
            "high" | "complex" | "hard" => Ok(Complexity::High),
            other => Err(FleetError::Validation(format!(
                "unknown complexity '{other}'"
            ))),
        }
    }
}

/// Output of the Analysis stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Estimated complexity.
    pub complexity: Complexity,
    /// Capability tags needed to solve the task, most important first.
    pub capabilities: Vec<String>,
    /// Estimated number of steps.
    pub steps: u32,
    /// Whether fresh information from the web is required.
    pub needs_web_search: bool,
    /// Trace note explaining the decision.
    #[serde(default)]
    pub reasoning: String,
}

// --- Routing ---

/// How the Execution stage drives the assigned agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// A single designated agent executes the whole task.
    Delegated,
    /// Agents run one after another, each seeing the previous output.
    Sequential,
    /// Agents run concurrently and their outputs are merged.
    Parallel,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Delegated => write!(f, "delegated"),
            ExecutionMode::Sequential => write!(f, "sequential"),
            ExecutionMode::Parallel => write!(f, "parallel"),
        }
    }
}

impl FromStr for ExecutionMode {
    type Err = FleetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "delegated" | "delegate" | "single" => Ok(ExecutionMode::Delegated),
            "sequential" | "sequence" | "chain" => Ok(ExecutionMode::Sequential),
            "parallel" | "concurrent" => Ok(ExecutionMode::Parallel),
            other => Err(FleetError::Validation(format!(
                "unknown execution mode '{other}'"
            ))),
        }
    }
}

/// One unit of work handed to a specific agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subtask {
    /// Agent identifier.
    pub agent: String,
    /// What the agent should do.
    pub instruction: String,
}

impl Subtask {
    /// Create a subtask.
    pub fn new(agent: impl Into<String>, instruction: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            instruction: instruction.into(),
        }
    }
}

/// Output of the Routing stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingPlan {
    /// Agents in execution order.
    pub assigned_agents: Vec<String>,
    /// How the agents are driven.
    pub execution_mode: ExecutionMode,
    /// Tools the agents are expected to need.
    pub tool_requirements: Vec<String>,
    /// Per-agent instructions, in order.
    pub subtasks: Vec<Subtask>,
    /// Trace note explaining the decision.
    #[serde(default)]
    pub reasoning: String,
}

impl RoutingPlan {
    /// Rewrite a parallel plan with a single agent into a delegated one.
    ///
    /// Returns `true` when the plan was changed.
    pub fn normalize(&mut self) -> bool {
        if self.execution_mode == ExecutionMode::Parallel && self.assigned_agents.len() == 1 {
            self.execution_mode = ExecutionMode::Delegated;
            return true;
        }
        false
    }

    /// The instruction routed to `agent`, if the plan contains one.
    pub fn instruction_for(&self, agent: &str) -> Option<&str> {
        self.subtasks
            .iter()
            .find(|s| s.agent == agent)
            .map(|s| s.instruction.as_str())
    }
}

// --- Execution ---

/// Final state of a single agent invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AgentStatus {
    /// The agent produced output.
    Completed,
    /// The agent failed after its retry budget.
    Failed {
        /// Failure description.
        reason: String,
    },
    /// The run was abandoned while the agent was in flight.
    Cancelled,
}

/// Record of one agent invocation inside an Execution stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRun {
    /// Agent identifier.
    pub agent: String,
    /// How the invocation ended.
    pub status: AgentStatus,
    /// Agent output, present when completed.
    pub output: Option<String>,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

/// Output of the Execution stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    /// Combined result text.
    pub result: String,
    /// Named outputs produced by the agents.
    pub artifacts: BTreeMap<String, String>,
    /// Per-agent status, in the order the agents were scheduled.
    pub agents: Vec<AgentRun>,
}

impl ExecutionOutcome {
    /// Identifiers of agents that completed.
    pub fn completed_agents(&self) -> Vec<&str> {
        self.agents
            .iter()
            .filter(|r| r.status == AgentStatus::Completed)
            .map(|r| r.agent.as_str())
            .collect()
    }

    /// Whether any agent failed or was cancelled.
    pub fn has_failures(&self) -> bool {
        self.agents
            .iter()
            .any(|r| r.status != AgentStatus::Completed)
    }

    /// Whether no agent produced output at all.
    pub fn is_empty(&self) -> bool {
        self.completed_agents().is_empty()
    }
}

// --- Progress ---

/// What the Progress stage recommends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressAction {
    /// The task is done.
    Complete,
    /// The result should be improved.
    Refine,
    /// The fleet is stuck; a human should look at it.
    Escalate,
}

impl fmt::Display for ProgressAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgressAction::Complete => write!(f, "complete"),
            ProgressAction::Refine => write!(f, "refine"),
            ProgressAction::Escalate => write!(f, "escalate"),
        }
    }
}

impl FromStr for ProgressAction {
    type Err = FleetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "complete" | "completed" | "done" => Ok(ProgressAction::Complete),
            "refine" | "continue" | "needs_refinement" => Ok(ProgressAction::Refine),
            "escalate" | "stalled" => Ok(ProgressAction::Escalate),
            other => Err(FleetError::Validation(format!(
                "unknown progress action '{other}'"
            ))),
        }
    }
}

/// Output of the Progress stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressAssessment {
    /// Recommended next step.
    pub action: ProgressAction,
    /// Trace note explaining the decision.
    #[serde(default)]
    pub rationale: String,
}

// --- Quality ---

/// Verdict attached to a quality score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityFlag {
    /// Good enough to return.
    Pass,
    /// Usable but below the refinement threshold.
    NeedsRefinement,
    /// Not acceptable, or quality could not be assessed.
    Fail,
}

impl fmt::Display for QualityFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QualityFlag::Pass => write!(f, "pass"),
            QualityFlag::NeedsRefinement => write!(f, "needs_refinement"),
            QualityFlag::Fail => write!(f, "fail"),
        }
    }
}

impl FromStr for QualityFlag {
    type Err = FleetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace([' ', '-'], "_").as_str() {
            "pass" | "passed" | "ok" => Ok(QualityFlag::Pass),
            "needs_refinement" | "refine" | "needs_improvement" => Ok(QualityFlag::NeedsRefinement),
            "fail" | "failed" => Ok(QualityFlag::Fail),
            other => Err(FleetError::Validation(format!(
                "unknown quality flag '{other}'"
            ))),
        }
    }
}

/// Output of the Quality stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityAssessment {
    /// Score in `[0, 10]`.
    pub score: f64,
    /// Verdict.
    pub flag: QualityFlag,
    /// Suggested improvements, fed back into refinement rounds.
    #[serde(default)]
    pub improvements: String,
    /// Trace note explaining the decision.
    #[serde(default)]
    pub reasoning: String,
}

impl QualityAssessment {
    /// Whether the score is below `threshold`.
    pub fn is_below(&self, threshold: f64) -> bool {
        self.score < threshold
    }
}

// --- Judge ---

/// Outcome of the optional judge review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeVerdict {
    /// Whether the judge objects to finalising the result.
    pub objection: bool,
    /// Optional independent score in `[0, 10]`.
    pub score: Option<f64>,
    /// Feedback used for a refinement round when the judge objects.
    #[serde(default)]
    pub feedback: String,
    /// Set when the judge ran out of time and its vote was waived.
    #[serde(default)]
    pub timed_out: bool,
}

impl JudgeVerdict {
    /// A vote that never blocks termination.
    pub fn no_objection(feedback: impl Into<String>) -> Self {
        Self {
            objection: false,
            score: None,
            feedback: feedback.into(),
            timed_out: false,
        }
    }

    /// The vote recorded when the judge misses its time budget.
    pub fn timed_out() -> Self {
        Self {
            timed_out: true,
            ..Self::no_objection("judge exceeded its time budget")
        }
    }
}

// --- Phases ---

/// A stage of the supervisor pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Task analysis.
    Analysis,
    /// Agent routing.
    Routing,
    /// Agent execution.
    Execution,
    /// Progress evaluation.
    Progress,
    /// Quality evaluation.
    Quality,
    /// Optional judge review.
    Judge,
}

impl Phase {
    /// Every phase in pipeline order.
    pub const ALL: [Phase; 6] = [
        Phase::Analysis,
        Phase::Routing,
        Phase::Execution,
        Phase::Progress,
        Phase::Quality,
        Phase::Judge,
    ];
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Analysis => write!(f, "analysis"),
            Phase::Routing => write!(f, "routing"),
            Phase::Execution => write!(f, "execution"),
            Phase::Progress => write!(f, "progress"),
            Phase::Quality => write!(f, "quality"),
            Phase::Judge => write!(f, "judge"),
        }
    }
}

/// How a phase's last execution ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PhaseStatus {
    /// The primary path succeeded.
    Success,
    /// The result was served from the analysis cache.
    CacheHit,
    /// Heuristics replaced the reasoning call.
    Fallback {
        /// Why the primary path was not used.
        reason: String,
    },
    /// The phase failed.
    Error {
        /// Failure description.
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_builder_and_word_count() {
        let task = Task::new("  summarize   the latest rust release notes ")
            .with_history(vec![ConversationTurn::user("hi")])
            .with_reasoning_effort(ReasoningEffort::Low);
        assert_eq!(task.word_count(), 6);
        assert_eq!(task.history().len(), 1);
        assert_eq!(task.reasoning_effort(), Some(ReasoningEffort::Low));
    }

    #[test]
    fn test_routing_plan_normalize_single_parallel() {
        let mut plan = RoutingPlan {
            assigned_agents: vec!["researcher".into()],
            execution_mode: ExecutionMode::Parallel,
            tool_requirements: vec![],
            subtasks: vec![],
            reasoning: String::new(),
        };
        assert!(plan.normalize());
        assert_eq!(plan.execution_mode, ExecutionMode::Delegated);
        assert!(!plan.normalize());
    }

    #[test]
    fn test_routing_plan_normalize_keeps_multi_parallel() {
        let mut plan = RoutingPlan {
            assigned_agents: vec!["researcher".into(), "analyst".into()],
            execution_mode: ExecutionMode::Parallel,
            tool_requirements: vec![],
            subtasks: vec![Subtask::new("analyst", "crunch numbers")],
            reasoning: String::new(),
        };
        assert!(!plan.normalize());
        assert_eq!(plan.execution_mode, ExecutionMode::Parallel);
        assert_eq!(plan.instruction_for("analyst"), Some("crunch numbers"));
        assert_eq!(plan.instruction_for("researcher"), None);
    }

    #[test]
    fn test_enum_parsing_aliases() {
        assert_eq!("Complex".parse::<Complexity>().unwrap(), Complexity::High);
        assert_eq!(" parallel ".parse::<ExecutionMode>().unwrap(), ExecutionMode::Parallel);
        assert_eq!("done".parse::<ProgressAction>().unwrap(), ProgressAction::Complete);
        assert_eq!(
            "needs refinement".parse::<QualityFlag>().unwrap(),
            QualityFlag::NeedsRefinement
        );
        assert!("sideways".parse::<ExecutionMode>().is_err());
    }

    #[test]
    fn test_execution_outcome_helpers() {
        let outcome = ExecutionOutcome {
            result: "partial".into(),
            artifacts: BTreeMap::new(),
            agents: vec![
                AgentRun {
                    agent: "researcher".into(),
                    status: AgentStatus::Completed,
                    output: Some("facts".into()),
                    duration_ms: 10,
                },
                AgentRun {
                    agent: "coder".into(),
                    status: AgentStatus::Failed {
                        reason: "boom".into(),
                    },
                    output: None,
                    duration_ms: 5,
                },
            ],
        };
        assert_eq!(outcome.completed_agents(), vec!["researcher"]);
        assert!(outcome.has_failures());
        assert!(!outcome.is_empty());
        assert!(ExecutionOutcome::default().is_empty());
    }

    #[test]
    fn test_phase_status_serialization() {
        let status = PhaseStatus::Fallback {
            reason: "reasoning disabled".into(),
        };
        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains("\"status\":\"fallback\""));
        let parsed: PhaseStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, status);
    }

    #[test]
    fn test_judge_timed_out_is_no_objection() {
        let verdict = JudgeVerdict::timed_out();
        assert!(!verdict.objection);
        assert!(verdict.timed_out);
    }
}
