use super::{status_for, Services};
use crate::context::SupervisorContext;
use fleet_core::{Phase, PhaseStatus, QualityAssessment};
use fleet_reasoner::heuristics;

/// Quality stage: score the latest outcome.
pub async fn execute(services: &Services, ctx: &mut SupervisorContext) -> PhaseStatus {
    let outcome = ctx.outcome.clone().unwrap_or_default();
    let progress = ctx.progress.clone().unwrap_or_else(heuristics::progress);
    let reasoned = services
        .reasoner
        .assess_quality(&ctx.task, &outcome, &progress)
        .await;
    for warning in &reasoned.warnings {
        ctx.warn(Phase::Quality, warning.clone()).await;
    }
    ctx.quality = Some(reasoned.value);
    status_for(&reasoned.origin)
}

/// Feedback for another round, if the score is below threshold and the run
/// may still refine.
pub fn refinement_feedback(ctx: &SupervisorContext) -> Option<String> {
    let quality = ctx.quality.as_ref()?;
    if !quality.is_below(ctx.config.refinement_threshold) || !ctx.can_refine() {
        return None;
    }
    Some(feedback_text(quality))
}

fn feedback_text(quality: &QualityAssessment) -> String {
    let mut text = format!("Quality score {:.1}/10 is below the bar.", quality.score);
    if !quality.improvements.is_empty() {
        text.push_str(&format!(" Improve: {}", quality.improvements));
    } else if !quality.reasoning.is_empty() {
        text.push_str(&format!(" Reviewer notes: {}", quality.reasoning));
    }
    text
}
