use crate::heuristics::{self, HeuristicSettings, GENERIC_CAPABILITY};
use crate::retry::{retry_with_backoff, RetryPolicy};
use crate::score::normalize_score;
use crate::signature::{self, ReasoningCall, Signature};
use fleet_core::{
    AgentRoster, AnalysisResult, Complexity, ExecutionMode, ExecutionOutcome, FleetConfig,
    FleetError, FleetResult, JudgeVerdict, ProgressAction, ProgressAssessment,
    QualityAssessment, QualityFlag, ReasoningEffort, RoutingPlan, Subtask, Task, ToolCatalog,
};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Where a stage's decision came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    /// The reasoning model produced it.
    Model,
    /// Deterministic heuristics produced it.
    Heuristic {
        /// Why the model was not used.
        reason: String,
    },
}

/// A stage decision plus its provenance.
#[derive(Debug, Clone)]
pub struct Reasoned<T> {
    /// The decision.
    pub value: T,
    /// Model or heuristic.
    pub origin: Origin,
    /// Fields of the model output that had to be repaired.
    pub warnings: Vec<String>,
}

impl<T> Reasoned<T> {
    fn model(value: T, warnings: Vec<String>) -> Self {
        Self {
            value,
            origin: Origin::Model,
            warnings,
        }
    }

    fn heuristic(value: T, reason: impl Into<String>) -> Self {
        Self {
            value,
            origin: Origin::Heuristic {
                reason: reason.into(),
            },
            warnings: Vec::new(),
        }
    }

    /// Whether heuristics replaced the model.
    pub fn is_fallback(&self) -> bool {
        matches!(self.origin, Origin::Heuristic { .. })
    }
}

/// Runs the four pipeline judgements (plus the judge) against a reasoning
/// model, falling back to heuristics whenever the model is disabled or fails.
pub struct Reasoner {
    call: Option<Arc<dyn ReasoningCall>>,
    retry: RetryPolicy,
    timeout: Duration,
    heuristics: HeuristicSettings,
    pass_threshold: f64,
}

impl Reasoner {
    /// A reasoner backed by `call`, with default retry and timeout settings.
    pub fn new(call: Arc<dyn ReasoningCall>) -> Self {
        Self {
            call: Some(call),
            ..Self::heuristic()
        }
    }

    /// A reasoner that never calls a model.
    pub fn heuristic() -> Self {
        let defaults = FleetConfig::default();
        Self {
            call: None,
            retry: defaults.reasoning_retry.clone(),
            timeout: defaults.reasoning_timeout(),
            heuristics: HeuristicSettings::from(&defaults),
            pass_threshold: defaults.refinement_threshold,
        }
    }

    /// Build from run configuration. The light profile drops `call`.
    pub fn from_config(call: Option<Arc<dyn ReasoningCall>>, config: &FleetConfig) -> Self {
        Self {
            call,
            retry: config.reasoning_retry.clone(),
            timeout: config.reasoning_timeout(),
            ..Self::heuristic()
        }
        .apply_config(config)
    }

    /// Bind the profile, pass threshold and word cutoffs of `config`.
    ///
    /// Retry policy and timeout are left as they are. Under a profile without
    /// reasoning the model call is dropped.
    pub fn apply_config(mut self, config: &FleetConfig) -> Self {
        if !config.reasoning_enabled() {
            self.call = None;
        }
        self.heuristics = HeuristicSettings::from(config);
        self.pass_threshold = config.refinement_threshold;
        self
    }

    /// Override the retry policy.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Override the per-attempt timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the word-count heuristics.
    pub fn with_heuristics(mut self, heuristics: HeuristicSettings) -> Self {
        self.heuristics = heuristics;
        self
    }

    /// Whether a reasoning model is attached.
    pub fn is_enabled(&self) -> bool {
        self.call.is_some()
    }

    /// Estimate complexity, capabilities and web-search needs of `task`.
    pub async fn analyze(&self, task: &Task) -> Reasoned<AnalysisResult> {
        let mut inputs = task_inputs(task);
        inputs.insert(
            "history".into(),
            serde_json::to_value(task.history()).unwrap_or(Value::Null),
        );
        self.reason(&signature::ANALYSIS, Value::Object(inputs), parse_analysis, || {
            heuristics::analysis(task, &self.heuristics)
        })
        .await
    }

    /// Decide which agents run and how.
    ///
    /// The plan is returned as the model wrote it; roster validation and
    /// execution-mode normalisation belong to the routing stage.
    pub async fn route(
        &self,
        task: &Task,
        analysis: &AnalysisResult,
        roster: &AgentRoster,
        tools: &ToolCatalog,
    ) -> Reasoned<RoutingPlan> {
        let mut inputs = task_inputs(task);
        inputs.insert("analysis".into(), to_json(analysis));
        inputs.insert("agents".into(), roster.describe());
        inputs.insert("tools".into(), tools.describe());
        self.reason(&signature::ROUTING, Value::Object(inputs), parse_routing, || {
            heuristics::routing(roster)
        })
        .await
    }

    /// Decide whether the execution outcome completes the task.
    pub async fn assess_progress(
        &self,
        task: &Task,
        outcome: &ExecutionOutcome,
    ) -> Reasoned<ProgressAssessment> {
        let mut inputs = task_inputs(task);
        inputs.insert("result".into(), Value::String(outcome.result.clone()));
        inputs.insert(
            "agents".into(),
            Value::Array(
                outcome
                    .agents
                    .iter()
                    .map(|run| json!({"agent": run.agent, "status": run.status}))
                    .collect(),
            ),
        );
        self.reason(&signature::PROGRESS, Value::Object(inputs), parse_progress, heuristics::progress)
            .await
    }

    /// Score the execution outcome against the task.
    pub async fn assess_quality(
        &self,
        task: &Task,
        outcome: &ExecutionOutcome,
        progress: &ProgressAssessment,
    ) -> Reasoned<QualityAssessment> {
        let mut inputs = task_inputs(task);
        inputs.insert("result".into(), Value::String(outcome.result.clone()));
        inputs.insert("progress".into(), to_json(progress));
        let threshold = self.pass_threshold;
        self.reason(
            &signature::QUALITY,
            Value::Object(inputs),
            |out| parse_quality(out, threshold),
            heuristics::quality,
        )
        .await
    }

    /// Final review under a hard time budget.
    ///
    /// Missing the budget counts as "no objection".
    pub async fn judge(
        &self,
        task: &Task,
        outcome: &ExecutionOutcome,
        quality: &QualityAssessment,
        budget: Duration,
    ) -> Reasoned<JudgeVerdict> {
        let mut inputs = task_inputs(task);
        inputs.insert("result".into(), Value::String(outcome.result.clone()));
        inputs.insert("quality".into(), to_json(quality));
        inputs.insert(
            "reasoning_effort".into(),
            Value::String(ReasoningEffort::Minimal.to_string()),
        );

        let review = self.reason(
            &signature::JUDGE,
            Value::Object(inputs),
            parse_judge,
            heuristics::judge,
        );
        match tokio::time::timeout(budget, review).await {
            Ok(verdict) => verdict,
            Err(_) => {
                warn!(budget_ms = budget.as_millis() as u64, "Judge exceeded its budget, no objection");
                Reasoned::heuristic(
                    JudgeVerdict::timed_out(),
                    FleetError::Timeout(budget).to_string(),
                )
            }
        }
    }

    async fn reason<T, P, F>(
        &self,
        signature: &Signature,
        inputs: Value,
        parse: P,
        fallback: F,
    ) -> Reasoned<T>
    where
        P: FnOnce(Value) -> FleetResult<(T, Vec<String>)>,
        F: FnOnce() -> T,
    {
        let Some(call) = &self.call else {
            debug!(signature = signature.name, "Reasoning disabled, using heuristics");
            return Reasoned::heuristic(fallback(), "reasoning disabled");
        };

        match self.invoke(call, signature, inputs).await.and_then(parse) {
            Ok((value, warnings)) => {
                for warning in &warnings {
                    warn!(signature = signature.name, warning = %warning, "Repaired model output");
                }
                Reasoned::model(value, warnings)
            }
            Err(e) => {
                warn!(
                    signature = signature.name,
                    attempts = e.attempts(),
                    error = %e,
                    "Reasoning failed, falling back to heuristics"
                );
                Reasoned::heuristic(fallback(), e.to_string())
            }
        }
    }

    async fn invoke(
        &self,
        call: &Arc<dyn ReasoningCall>,
        signature: &Signature,
        inputs: Value,
    ) -> FleetResult<Value> {
        let timeout = self.timeout;
        retry_with_backoff(&self.retry, signature.name, |_| {
            let call = Arc::clone(call);
            let inputs = inputs.clone();
            async move {
                match tokio::time::timeout(timeout, call.call(signature, inputs)).await {
                    Ok(result) => result,
                    Err(_) => Err(FleetError::Timeout(timeout)),
                }
            }
        })
        .await
    }
}

// --- Input shaping ---

fn task_inputs(task: &Task) -> Map<String, Value> {
    let mut inputs = Map::new();
    inputs.insert("task".into(), Value::String(task.text().to_string()));
    if let Some(effort) = task.reasoning_effort() {
        inputs.insert("reasoning_effort".into(), Value::String(effort.to_string()));
    }
    inputs
}

fn to_json<T: serde::Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

// --- Output parsing ---

fn object(output: Value) -> FleetResult<Map<String, Value>> {
    match output {
        Value::Object(map) => Ok(map),
        other => Err(FleetError::Reasoning(format!(
            "expected a JSON object, got {other}"
        ))),
    }
}

fn text(map: &Map<String, Value>, key: &str) -> Option<String> {
    match map.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn required_text(map: &Map<String, Value>, key: &str) -> FleetResult<String> {
    text(map, key).ok_or_else(|| FleetError::Reasoning(format!("missing field '{key}'")))
}

fn string_list(map: &Map<String, Value>, key: &str) -> Vec<String> {
    match map.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
        Some(Value::String(s)) => s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
        _ => Vec::new(),
    }
}

fn boolean(map: &Map<String, Value>, key: &str) -> Option<bool> {
    match map.get(key)? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "y" | "1" => Some(true),
            "false" | "no" | "n" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn count(map: &Map<String, Value>, key: &str) -> Option<u32> {
    match map.get(key)? {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f.round() as u64))
            .map(|n| n.min(u32::MAX as u64) as u32),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn parse_analysis(output: Value) -> FleetResult<(AnalysisResult, Vec<String>)> {
    let map = object(output)?;
    let mut warnings = Vec::new();

    let complexity: Complexity = required_text(&map, "complexity")?
        .parse()
        .map_err(|e: FleetError| FleetError::Reasoning(e.to_string()))?;

    let mut capabilities = string_list(&map, "capabilities");
    if capabilities.is_empty() {
        warnings.push(format!("no capabilities returned, using '{GENERIC_CAPABILITY}'"));
        capabilities.push(GENERIC_CAPABILITY.to_string());
    }

    let steps = count(&map, "steps").filter(|s| *s > 0).unwrap_or_else(|| {
        warnings.push("missing or invalid step count".into());
        match complexity {
            Complexity::Low => 1,
            Complexity::Medium => 3,
            Complexity::High => 5,
        }
    });

    Ok((
        AnalysisResult {
            complexity,
            capabilities,
            steps,
            needs_web_search: boolean(&map, "needs_web_search").unwrap_or(false),
            reasoning: text(&map, "reasoning").unwrap_or_default(),
        },
        warnings,
    ))
}

fn parse_routing(output: Value) -> FleetResult<(RoutingPlan, Vec<String>)> {
    let map = object(output)?;
    let mut warnings = Vec::new();

    let assigned_agents = string_list(&map, "assigned_agents");
    if assigned_agents.is_empty() {
        return Err(FleetError::Reasoning("routing assigned no agents".into()));
    }

    let execution_mode = match text(&map, "execution_mode").map(|m| m.parse::<ExecutionMode>()) {
        Some(Ok(mode)) => mode,
        other => {
            let mode = if assigned_agents.len() == 1 {
                ExecutionMode::Delegated
            } else {
                ExecutionMode::Sequential
            };
            let what = match other {
                Some(Err(e)) => e.to_string(),
                _ => "missing execution mode".to_string(),
            };
            warnings.push(format!("{what}, using {mode}"));
            mode
        }
    };

    let mut subtasks = Vec::new();
    if let Some(Value::Array(items)) = map.get("subtasks") {
        for item in items {
            let Value::Object(entry) = item else {
                warnings.push("ignored malformed subtask".into());
                continue;
            };
            let agent = text(entry, "agent");
            let instruction = text(entry, "instruction")
                .or_else(|| text(entry, "task"))
                .or_else(|| text(entry, "description"));
            match (agent, instruction) {
                (Some(agent), Some(instruction)) => subtasks.push(Subtask::new(agent, instruction)),
                _ => warnings.push("ignored subtask without agent or instruction".into()),
            }
        }
    }

    Ok((
        RoutingPlan {
            assigned_agents,
            execution_mode,
            tool_requirements: string_list(&map, "tool_requirements"),
            subtasks,
            reasoning: text(&map, "reasoning").unwrap_or_default(),
        },
        warnings,
    ))
}

fn parse_progress(output: Value) -> FleetResult<(ProgressAssessment, Vec<String>)> {
    let map = object(output)?;
    let action: ProgressAction = required_text(&map, "action")?
        .parse()
        .map_err(|e: FleetError| FleetError::Reasoning(e.to_string()))?;
    Ok((
        ProgressAssessment {
            action,
            rationale: text(&map, "rationale")
                .or_else(|| text(&map, "reasoning"))
                .unwrap_or_default(),
        },
        Vec::new(),
    ))
}

fn parse_quality(output: Value, pass_threshold: f64) -> FleetResult<(QualityAssessment, Vec<String>)> {
    let map = object(output)?;
    let mut warnings = Vec::new();

    let score = map.get("score").and_then(normalize_score);
    let (score, flag) = match score {
        Some(score) => {
            let flag = match text(&map, "flag").map(|f| f.parse::<QualityFlag>()) {
                Some(Ok(flag)) => flag,
                _ => {
                    if score >= pass_threshold {
                        QualityFlag::Pass
                    } else {
                        QualityFlag::NeedsRefinement
                    }
                }
            };
            (score, flag)
        }
        None => {
            warnings.push(format!(
                "unparseable score {}, treating as 0",
                map.get("score").unwrap_or(&Value::Null)
            ));
            (0.0, QualityFlag::Fail)
        }
    };

    Ok((
        QualityAssessment {
            score,
            flag,
            improvements: text(&map, "improvements").unwrap_or_default(),
            reasoning: text(&map, "reasoning").unwrap_or_default(),
        },
        warnings,
    ))
}

fn parse_judge(output: Value) -> FleetResult<(JudgeVerdict, Vec<String>)> {
    let map = object(output)?;
    let objection = boolean(&map, "objection")
        .ok_or_else(|| FleetError::Reasoning("missing field 'objection'".into()))?;
    Ok((
        JudgeVerdict {
            objection,
            score: map.get("score").and_then(normalize_score),
            feedback: text(&map, "feedback").unwrap_or_default(),
            timed_out: false,
        },
        Vec::new(),
    ))
}
