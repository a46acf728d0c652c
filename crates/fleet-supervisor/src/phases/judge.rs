use super::{status_for, Services};
use crate::context::SupervisorContext;
use crate::events::EventPayload;
use fleet_core::{Phase, PhaseStatus};
use fleet_reasoner::heuristics;
use tracing::info;

/// Judge stage: a time-boxed final review. Missing the budget is no objection.
pub async fn execute(services: &Services, ctx: &mut SupervisorContext) -> PhaseStatus {
    let outcome = ctx.outcome.clone().unwrap_or_default();
    let quality = ctx.quality.clone().unwrap_or_else(heuristics::quality);
    let budget = ctx.config.judge_timeout();

    let reasoned = services
        .reasoner
        .judge(&ctx.task, &outcome, &quality, budget)
        .await;

    info!(
        run_id = %ctx.run_id(),
        objection = reasoned.value.objection,
        timed_out = reasoned.value.timed_out,
        "Judge voted"
    );
    ctx.emit(
        Some(Phase::Judge),
        EventPayload::JudgeResult {
            verdict: reasoned.value.clone(),
        },
    )
    .await;
    ctx.judge = Some(reasoned.value);
    status_for(&reasoned.origin)
}

/// Feedback for another round when the judge objected and rounds remain.
pub fn refinement_feedback(ctx: &SupervisorContext) -> Option<String> {
    let verdict = ctx.judge.as_ref()?;
    if !verdict.objection || !ctx.can_refine() {
        return None;
    }
    Some(if verdict.feedback.is_empty() {
        "The final reviewer objected to the answer.".to_string()
    } else {
        format!("Final reviewer objection: {}", verdict.feedback)
    })
}
