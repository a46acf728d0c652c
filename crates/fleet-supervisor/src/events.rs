use chrono::{DateTime, Utc};
use fleet_core::{
    AgentRun, JudgeVerdict, Phase, PhaseStatus, QualityAssessment, QualityFlag,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// One item of a run's event stream.
///
/// Serialises flat: `{"run_id", "stage", "timestamp", "kind", ...payload}`,
/// ready for an SSE or CLI layer to forward as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Run this event belongs to.
    pub run_id: Uuid,
    /// Stage that produced the event; absent for run-level events.
    pub stage: Option<Phase>,
    /// When the event was produced.
    pub timestamp: DateTime<Utc>,
    /// Kind-specific data.
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl Event {
    /// Wire name of the payload kind.
    pub fn kind(&self) -> &'static str {
        self.payload.kind()
    }

    /// Whether this is the last event of a run.
    pub fn is_final(&self) -> bool {
        matches!(self.payload, EventPayload::FinalResult { .. })
    }
}

/// Payload of an [`Event`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventPayload {
    /// A stage began.
    StageStarted {
        /// Refinement round the stage runs in (0 for the first pass).
        round: u32,
    },
    /// A stage finished.
    StageCompleted {
        /// How it ended.
        status: PhaseStatus,
        /// Wall-clock time of this execution of the stage.
        duration_ms: u64,
        /// The stage's result entity.
        output: serde_json::Value,
    },
    /// Partial result of one agent during Execution.
    AgentOutput {
        /// Agent identifier.
        agent: String,
        /// What the agent produced.
        output: String,
    },
    /// Model output had to be repaired or filtered.
    ValidationWarning {
        /// What was dropped or rewritten.
        message: String,
    },
    /// Quality or the judge sent the run back to Execution.
    RefinementTriggered {
        /// Round about to start (1-based).
        round: u32,
        /// Score that triggered the round, when known.
        score: Option<f64>,
        /// Configured pass threshold.
        threshold: f64,
        /// Feedback appended to the agents' instructions.
        feedback: String,
    },
    /// The judge's vote.
    JudgeResult {
        /// The verdict.
        verdict: JudgeVerdict,
    },
    /// Terminal event carrying the run's result.
    FinalResult {
        /// The result.
        result: Box<FinalResult>,
    },
    /// Something failed. Non-fatal errors let the run continue.
    Error {
        /// Failure description.
        message: String,
        /// Whether the run stops because of it.
        fatal: bool,
    },
}

impl EventPayload {
    /// Wire name of the kind.
    pub fn kind(&self) -> &'static str {
        match self {
            EventPayload::StageStarted { .. } => "stage_started",
            EventPayload::StageCompleted { .. } => "stage_completed",
            EventPayload::AgentOutput { .. } => "agent_output",
            EventPayload::ValidationWarning { .. } => "validation_warning",
            EventPayload::RefinementTriggered { .. } => "refinement_triggered",
            EventPayload::JudgeResult { .. } => "judge_result",
            EventPayload::FinalResult { .. } => "final_result",
            EventPayload::Error { .. } => "error",
        }
    }
}

/// Outcome of a whole run, also returned by
/// [`crate::SupervisorPipeline::run_to_completion`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalResult {
    /// Run identifier.
    pub run_id: Uuid,
    /// Task identifier.
    pub task_id: Uuid,
    /// Final answer text (possibly partial when `failed`).
    pub result: String,
    /// Final verdict on the answer.
    pub flag: QualityFlag,
    /// Last quality assessment, when Quality ran.
    pub quality: Option<QualityAssessment>,
    /// Judge vote, when the judge ran.
    pub judge: Option<JudgeVerdict>,
    /// Refinement rounds performed.
    pub refinement_rounds: u32,
    /// Progress asked for human escalation.
    pub escalated: bool,
    /// Execution failed irrecoverably.
    pub failed: bool,
    /// Failure description when `failed`.
    pub error: Option<String>,
    /// Per-agent status of the last Execution.
    pub agents: Vec<AgentRun>,
    /// Named outputs of the last Execution.
    pub artifacts: BTreeMap<String, String>,
    /// Validation warnings collected along the way.
    pub warnings: Vec<String>,
    /// Cumulative wall-clock time per stage.
    pub phase_timings_ms: BTreeMap<Phase, u64>,
    /// Last status per stage.
    pub phase_status: BTreeMap<Phase, PhaseStatus>,
    /// Wall-clock time of the whole run.
    pub total_duration_ms: u64,
}

/// Sending half of a run's event stream.
///
/// A send that finds the consumer gone cancels the run.
#[derive(Debug, Clone)]
pub struct EventSink {
    run_id: Uuid,
    tx: mpsc::Sender<Event>,
    cancel: CancellationToken,
}

impl EventSink {
    /// Sink for run `run_id`; a closed channel cancels `cancel`.
    pub fn new(run_id: Uuid, tx: mpsc::Sender<Event>, cancel: CancellationToken) -> Self {
        Self { run_id, tx, cancel }
    }

    /// Run identifier stamped on every event.
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Publish an event. Returns `false` once the consumer has gone away.
    pub async fn emit(&self, stage: Option<Phase>, payload: EventPayload) -> bool {
        let event = Event {
            run_id: self.run_id,
            stage,
            timestamp: Utc::now(),
            payload,
        };
        if self.tx.send(event).await.is_err() {
            self.cancel.cancel();
            return false;
        }
        true
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_flat() {
        let event = Event {
            run_id: Uuid::nil(),
            stage: Some(Phase::Routing),
            timestamp: Utc::now(),
            payload: EventPayload::ValidationWarning {
                message: "dropped unknown agent 'astrologer'".into(),
            },
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "validation_warning");
        assert_eq!(json["stage"], "routing");
        assert_eq!(json["message"], "dropped unknown agent 'astrologer'");
        assert_eq!(event.kind(), "validation_warning");

        let back: Event = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_stage_completed_nests_status() {
        let payload = EventPayload::StageCompleted {
            status: PhaseStatus::Fallback {
                reason: "reasoning disabled".into(),
            },
            duration_ms: 3,
            output: serde_json::json!({}),
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["kind"], "stage_completed");
        assert_eq!(json["status"]["status"], "fallback");
        assert_eq!(json["status"]["reason"], "reasoning disabled");
    }

    #[tokio::test]
    async fn test_sink_cancels_when_consumer_is_gone() {
        let (tx, rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        let sink = EventSink::new(Uuid::new_v4(), tx, cancel.clone());
        drop(rx);

        let delivered = sink
            .emit(None, EventPayload::StageStarted { round: 0 })
            .await;
        assert!(!delivered);
        assert!(cancel.is_cancelled());
    }
}
