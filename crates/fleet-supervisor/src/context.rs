use crate::events::{EventPayload, EventSink, FinalResult};
use fleet_core::{
    AnalysisResult, ExecutionOutcome, FleetConfig, JudgeVerdict, Phase, PhaseStatus,
    ProgressAssessment, QualityAssessment, QualityFlag, RoutingPlan, Task,
};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Mutable state of one pipeline run.
///
/// Owned by the run; each stage receives it by `&mut`. Stage results are
/// overwritten by later rounds, timings accumulate.
pub struct SupervisorContext {
    /// The task being worked on.
    pub task: Task,
    /// Run configuration.
    pub config: Arc<FleetConfig>,
    /// Analysis result.
    pub analysis: Option<AnalysisResult>,
    /// Validated routing plan.
    pub routing: Option<RoutingPlan>,
    /// Outcome of the latest Execution.
    pub outcome: Option<ExecutionOutcome>,
    /// Latest progress assessment.
    pub progress: Option<ProgressAssessment>,
    /// Latest quality assessment.
    pub quality: Option<QualityAssessment>,
    /// Latest judge vote.
    pub judge: Option<JudgeVerdict>,
    /// Refinement rounds performed so far.
    pub refinement_round: u32,
    /// Feedback notes handed to agents on refinement rounds.
    pub feedback: Vec<String>,
    /// Validation warnings collected so far.
    pub warnings: Vec<String>,
    /// Progress asked for escalation; refinement is off from then on.
    pub escalated: bool,
    /// Irrecoverable execution failure.
    pub failure: Option<String>,
    timings: BTreeMap<Phase, Duration>,
    statuses: BTreeMap<Phase, PhaseStatus>,
    started_at: Instant,
    stage_started_at: Option<Instant>,
    cancel: CancellationToken,
    events: EventSink,
}

impl SupervisorContext {
    /// Fresh context for `task`; the run id comes from `events`.
    pub fn new(
        task: Task,
        config: Arc<FleetConfig>,
        events: EventSink,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            task,
            config,
            analysis: None,
            routing: None,
            outcome: None,
            progress: None,
            quality: None,
            judge: None,
            refinement_round: 0,
            feedback: Vec::new(),
            warnings: Vec::new(),
            escalated: false,
            failure: None,
            timings: BTreeMap::new(),
            statuses: BTreeMap::new(),
            started_at: Instant::now(),
            stage_started_at: None,
            cancel,
            events,
        }
    }

    /// Run identifier.
    pub fn run_id(&self) -> uuid::Uuid {
        self.events.run_id()
    }

    /// Token cancelled when the consumer abandons the run.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// A clone of the event sink, for emitting while the context is borrowed.
    pub fn events(&self) -> EventSink {
        self.events.clone()
    }

    /// Emit an event on behalf of `stage`.
    pub async fn emit(&self, stage: Option<Phase>, payload: EventPayload) {
        self.events.emit(stage, payload).await;
    }

    /// Record a validation warning and publish it.
    pub async fn warn(&mut self, stage: Phase, message: impl Into<String>) {
        let message = message.into();
        warn!(run_id = %self.run_id(), stage = %stage, warning = %message, "Validation warning");
        self.warnings.push(message.clone());
        self.emit(Some(stage), EventPayload::ValidationWarning { message })
            .await;
    }

    /// Mark the start of `stage`.
    pub async fn begin_stage(&mut self, stage: Phase) {
        info!(run_id = %self.run_id(), stage = %stage, round = self.refinement_round, "Stage started");
        self.stage_started_at = Some(Instant::now());
        self.emit(
            Some(stage),
            EventPayload::StageStarted {
                round: self.refinement_round,
            },
        )
        .await;
    }

    /// Mark the end of `stage`, recording its timing and status.
    pub async fn finish_stage(&mut self, stage: Phase, status: PhaseStatus) {
        let elapsed = self
            .stage_started_at
            .take()
            .map(|start| start.elapsed())
            .unwrap_or_default();
        *self.timings.entry(stage).or_default() += elapsed;
        self.statuses.insert(stage, status.clone());

        info!(
            run_id = %self.run_id(),
            stage = %stage,
            status = ?status,
            duration_ms = elapsed.as_millis() as u64,
            "Stage completed"
        );
        let output = self.stage_output(stage);
        self.emit(
            Some(stage),
            EventPayload::StageCompleted {
                status,
                duration_ms: elapsed.as_millis() as u64,
                output,
            },
        )
        .await;
    }

    fn stage_output(&self, stage: Phase) -> Value {
        let value = match stage {
            Phase::Analysis => serde_json::to_value(&self.analysis),
            Phase::Routing => serde_json::to_value(&self.routing),
            Phase::Execution => serde_json::to_value(&self.outcome),
            Phase::Progress => serde_json::to_value(&self.progress),
            Phase::Quality => serde_json::to_value(&self.quality),
            Phase::Judge => serde_json::to_value(&self.judge),
        };
        value.unwrap_or(Value::Null)
    }

    /// Cumulative time spent in each stage.
    pub fn timings(&self) -> &BTreeMap<Phase, Duration> {
        &self.timings
    }

    /// Last recorded status of each stage.
    pub fn statuses(&self) -> &BTreeMap<Phase, PhaseStatus> {
        &self.statuses
    }

    /// Whether another refinement round is allowed.
    pub fn can_refine(&self) -> bool {
        !self.escalated
            && self.failure.is_none()
            && self.refinement_round < self.config.refinement_rounds()
    }

    /// Start a refinement round with `feedback` for the agents.
    ///
    /// `stage` is the stage that asked for it (Quality or Judge).
    pub async fn begin_refinement(&mut self, stage: Phase, score: Option<f64>, feedback: String) {
        self.refinement_round += 1;
        if !feedback.trim().is_empty() {
            self.feedback.push(feedback.clone());
        }
        info!(
            run_id = %self.run_id(),
            stage = %stage,
            round = self.refinement_round,
            score = ?score,
            "Refinement triggered"
        );
        self.emit(
            Some(stage),
            EventPayload::RefinementTriggered {
                round: self.refinement_round,
                score,
                threshold: self.config.refinement_threshold,
                feedback,
            },
        )
        .await;
    }

    /// The verdict reported on the final result.
    ///
    /// Failed runs are `fail`; passing scores are `pass`; a low score left
    /// after every allowed refinement round is `needs_refinement`; otherwise
    /// the Quality stage's own flag stands.
    pub fn final_flag(&self) -> QualityFlag {
        if self.failure.is_some() {
            return QualityFlag::Fail;
        }
        let Some(quality) = &self.quality else {
            return QualityFlag::Fail;
        };
        if !quality.is_below(self.config.refinement_threshold) {
            return QualityFlag::Pass;
        }
        let rounds = self.config.refinement_rounds();
        if rounds > 0 && self.refinement_round >= rounds && !self.escalated {
            QualityFlag::NeedsRefinement
        } else {
            quality.flag
        }
    }

    /// Assemble the run's final result.
    pub fn final_result(&self) -> FinalResult {
        let outcome = self.outcome.clone().unwrap_or_default();
        FinalResult {
            run_id: self.run_id(),
            task_id: self.task.id(),
            result: outcome.result,
            flag: self.final_flag(),
            quality: self.quality.clone(),
            judge: self.judge.clone(),
            refinement_rounds: self.refinement_round,
            escalated: self.escalated,
            failed: self.failure.is_some(),
            error: self.failure.clone(),
            agents: outcome.agents,
            artifacts: outcome.artifacts,
            warnings: self.warnings.clone(),
            phase_timings_ms: self
                .timings
                .iter()
                .map(|(phase, d)| (*phase, d.as_millis() as u64))
                .collect(),
            phase_status: self.statuses.clone(),
            total_duration_ms: self.started_at.elapsed().as_millis() as u64,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use fleet_core::PipelineProfile;
    use tokio::sync::mpsc;

    fn context(config: FleetConfig) -> (SupervisorContext, mpsc::Receiver<crate::Event>) {
        let (tx, rx) = mpsc::channel(64);
        let cancel = CancellationToken::new();
        let sink = EventSink::new(uuid::Uuid::new_v4(), tx, cancel.clone());
        (
            SupervisorContext::new(Task::new("t"), Arc::new(config), sink, cancel),
            rx,
        )
    }

    fn quality(score: f64, flag: QualityFlag) -> QualityAssessment {
        QualityAssessment {
            score,
            flag,
            improvements: String::new(),
            reasoning: String::new(),
        }
    }

    #[tokio::test]
    async fn test_stage_timings_accumulate() {
        let (mut ctx, mut rx) = context(FleetConfig::default());
        ctx.begin_stage(Phase::Execution).await;
        ctx.finish_stage(Phase::Execution, PhaseStatus::Success).await;
        ctx.begin_stage(Phase::Execution).await;
        ctx.finish_stage(Phase::Execution, PhaseStatus::Success).await;

        assert_eq!(ctx.timings().len(), 1);
        assert_eq!(ctx.statuses()[&Phase::Execution], PhaseStatus::Success);
        let kinds: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|e| e.kind())
            .collect();
        assert_eq!(
            kinds,
            vec!["stage_started", "stage_completed", "stage_started", "stage_completed"]
        );
    }

    #[tokio::test]
    async fn test_refinement_budget() {
        let (mut ctx, _rx) = context(FleetConfig {
            max_refinement_rounds: 1,
            ..FleetConfig::default()
        });
        assert!(ctx.can_refine());
        ctx.begin_refinement(Phase::Quality, Some(3.0), "add sources".into())
            .await;
        assert!(!ctx.can_refine());
        assert_eq!(ctx.feedback, vec!["add sources"]);
    }

    #[tokio::test]
    async fn test_escalation_blocks_refinement() {
        let (mut ctx, _rx) = context(FleetConfig::default());
        ctx.escalated = true;
        assert!(!ctx.can_refine());
    }

    #[tokio::test]
    async fn test_light_profile_never_refines() {
        let (ctx, _rx) = context(FleetConfig {
            profile: PipelineProfile::Light,
            ..FleetConfig::default()
        });
        assert!(!ctx.can_refine());
    }

    #[tokio::test]
    async fn test_final_flag_rules() {
        let (mut ctx, _rx) = context(FleetConfig {
            max_refinement_rounds: 2,
            ..FleetConfig::default()
        });
        ctx.quality = Some(quality(9.0, QualityFlag::Pass));
        assert_eq!(ctx.final_flag(), QualityFlag::Pass);

        ctx.quality = Some(quality(5.0, QualityFlag::NeedsRefinement));
        ctx.refinement_round = 2;
        assert_eq!(ctx.final_flag(), QualityFlag::NeedsRefinement);

        ctx.failure = Some("all agents failed".into());
        assert_eq!(ctx.final_flag(), QualityFlag::Fail);
        assert!(ctx.final_result().failed);
    }
}
