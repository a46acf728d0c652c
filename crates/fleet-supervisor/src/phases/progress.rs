use super::{status_for, Services};
use crate::context::SupervisorContext;
use fleet_core::{Phase, PhaseStatus, ProgressAction};
use tracing::warn;

/// Progress stage. `escalate` switches refinement off for the rest of the run.
pub async fn execute(services: &Services, ctx: &mut SupervisorContext) -> PhaseStatus {
    let outcome = ctx.outcome.clone().unwrap_or_default();
    let reasoned = services.reasoner.assess_progress(&ctx.task, &outcome).await;
    for warning in &reasoned.warnings {
        ctx.warn(Phase::Progress, warning.clone()).await;
    }

    if reasoned.value.action == ProgressAction::Escalate {
        warn!(
            run_id = %ctx.run_id(),
            rationale = %reasoned.value.rationale,
            "Progress escalated, refinement disabled"
        );
        ctx.escalated = true;
    }

    ctx.progress = Some(reasoned.value);
    status_for(&reasoned.origin)
}
