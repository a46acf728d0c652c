use super::Services;
use crate::agents::{AgentOutput, AgentRequest};
use crate::context::SupervisorContext;
use crate::events::{EventPayload, EventSink};
use fleet_core::{
    AgentProfile, AgentRun, AgentStatus, ExecutionMode, ExecutionOutcome, FleetConfig,
    FleetError, FleetResult, Phase, PhaseStatus, RoutingPlan,
};
use fleet_reasoner::{heuristics, retry_with_backoff};
use futures_util::stream::{FuturesUnordered, StreamExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// One agent's share of the work.
struct Assignment {
    profile: AgentProfile,
    request: AgentRequest,
}

struct AgentResult {
    run: AgentRun,
    output: Option<AgentOutput>,
}

/// Execution stage: drive the routed agents and fold their outputs.
///
/// Agents that fail after their retry budget are reported as non-fatal
/// `error` events as long as at least one agent completed. When none did,
/// the stage fails; the partial outcome is still stored in the context.
pub async fn execute(services: &Services, ctx: &mut SupervisorContext) -> FleetResult<PhaseStatus> {
    let plan = match &ctx.routing {
        Some(plan) => plan.clone(),
        None => heuristics::routing(&services.roster),
    };
    let assignments = assignments(&plan, services, ctx);
    if assignments.is_empty() {
        return Err(FleetError::Validation(
            "routing plan contains no runnable agent".into(),
        ));
    }

    info!(
        run_id = %ctx.run_id(),
        mode = %plan.execution_mode,
        agents = assignments.len(),
        round = ctx.refinement_round,
        "Executing agents"
    );

    let config = Arc::clone(&ctx.config);
    let sink = ctx.events();
    let cancel = ctx.cancel_token().clone();

    let results = match plan.execution_mode {
        ExecutionMode::Delegated => {
            let mut results = Vec::with_capacity(1);
            for assignment in assignments.into_iter().take(1) {
                results.push(run_agent(services, &config, assignment, &sink, &cancel).await);
            }
            results
        }
        ExecutionMode::Sequential => {
            let mut results = Vec::new();
            let mut previous: Option<String> = None;
            for mut assignment in assignments {
                if cancel.is_cancelled() {
                    break;
                }
                assignment.request.context = previous.clone();
                let result = run_agent(services, &config, assignment, &sink, &cancel).await;
                if let Some(output) = &result.output {
                    previous = Some(output.content.clone());
                }
                results.push(result);
            }
            results
        }
        ExecutionMode::Parallel => {
            run_parallel(services, &config, assignments, &sink, &cancel).await
        }
    };

    let outcome = build_outcome(plan.execution_mode, results);

    if cancel.is_cancelled() {
        ctx.outcome = Some(outcome);
        return Err(FleetError::Cancelled);
    }

    let failures: Vec<(String, String)> = outcome
        .agents
        .iter()
        .filter_map(|run| match &run.status {
            AgentStatus::Failed { reason } => Some((run.agent.clone(), reason.clone())),
            _ => None,
        })
        .collect();

    if outcome.is_empty() {
        let (agent, message) = failures
            .into_iter()
            .next()
            .unwrap_or_else(|| ("unknown".to_string(), "no agent completed".to_string()));
        ctx.outcome = Some(keep_last_answer(ctx.outcome.take(), outcome));
        return Err(FleetError::AgentExecution { agent, message });
    }

    let total = outcome.agents.len();
    ctx.outcome = Some(outcome);
    for (agent, reason) in &failures {
        let message = FleetError::AgentExecution {
            agent: agent.clone(),
            message: reason.clone(),
        }
        .to_string();
        ctx.emit(
            Some(Phase::Execution),
            EventPayload::Error {
                message,
                fatal: false,
            },
        )
        .await;
    }

    if failures.is_empty() {
        Ok(PhaseStatus::Success)
    } else {
        Ok(PhaseStatus::Error {
            message: format!("{} of {total} agents failed", failures.len()),
        })
    }
}

fn assignments(
    plan: &RoutingPlan,
    services: &Services,
    ctx: &SupervisorContext,
) -> Vec<Assignment> {
    let count = match plan.execution_mode {
        ExecutionMode::Delegated => 1,
        ExecutionMode::Sequential | ExecutionMode::Parallel => plan.assigned_agents.len(),
    };

    plan.assigned_agents
        .iter()
        .filter_map(|id| services.roster.get(id))
        .take(count)
        .map(|profile| {
            let instruction = match plan.execution_mode {
                ExecutionMode::Delegated => ctx.task.text(),
                _ => plan
                    .instruction_for(profile.id())
                    .unwrap_or_else(|| ctx.task.text()),
            };
            let mut request = AgentRequest::new(ctx.task.text(), instruction);
            request.feedback = ctx.feedback.clone();
            request.tools = plan.tool_requirements.clone();
            Assignment {
                profile: profile.clone(),
                request,
            }
        })
        .collect()
}

/// Fan out under a semaphore and wait for every agent before returning.
async fn run_parallel(
    services: &Services,
    config: &FleetConfig,
    assignments: Vec<Assignment>,
    sink: &EventSink,
    cancel: &CancellationToken,
) -> Vec<AgentResult> {
    let total = assignments.len();
    let sem = Arc::new(Semaphore::new(config.max_parallel_agents.max(1)));
    let mut pending = FuturesUnordered::new();

    for (idx, assignment) in assignments.into_iter().enumerate() {
        let sem = Arc::clone(&sem);
        pending.push(async move {
            // Acquire permit (waits while max_parallel_agents are running)
            let _permit = sem.acquire().await;
            (idx, run_agent(services, config, assignment, sink, cancel).await)
        });
    }

    // Fan-in barrier: results are slotted back into scheduling order.
    let mut slots: Vec<Option<AgentResult>> = (0..total).map(|_| None).collect();
    while let Some((idx, result)) = pending.next().await {
        slots[idx] = Some(result);
    }
    slots.into_iter().flatten().collect()
}

async fn run_agent(
    services: &Services,
    config: &FleetConfig,
    assignment: Assignment,
    sink: &EventSink,
    cancel: &CancellationToken,
) -> AgentResult {
    let agent = assignment.profile.id();
    let timeout = config.agent_timeout();
    let start = Instant::now();

    let result = retry_with_backoff(&config.agent_retry, agent, |_| {
        let profile = &assignment.profile;
        let request = assignment.request.clone();
        let cancel = cancel.child_token();
        async move {
            if cancel.is_cancelled() {
                return Err(FleetError::Cancelled);
            }
            match tokio::time::timeout(timeout, services.runtime.execute(profile, request, cancel))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(FleetError::Timeout(timeout)),
            }
        }
    })
    .await;

    let duration_ms = start.elapsed().as_millis() as u64;
    match result {
        Ok(output) => {
            info!(agent, duration_ms, "Agent completed");
            sink.emit(
                Some(Phase::Execution),
                EventPayload::AgentOutput {
                    agent: agent.to_string(),
                    output: output.content.clone(),
                },
            )
            .await;
            AgentResult {
                run: AgentRun {
                    agent: agent.to_string(),
                    status: AgentStatus::Completed,
                    output: Some(output.content.clone()),
                    duration_ms,
                },
                output: Some(output),
            }
        }
        Err(e) => {
            let status = match e.root() {
                FleetError::Cancelled => AgentStatus::Cancelled,
                root => {
                    error!(agent, attempts = e.attempts(), error = %e, "Agent failed");
                    let reason = match root {
                        FleetError::AgentExecution { message, .. } => message.clone(),
                        _ => e.to_string(),
                    };
                    AgentStatus::Failed { reason }
                }
            };
            AgentResult {
                run: AgentRun {
                    agent: agent.to_string(),
                    status,
                    output: None,
                    duration_ms,
                },
                output: None,
            }
        }
    }
}

/// On a round where no agent completed, the previous round's answer stands;
/// the failed runs are appended to its agent records.
fn keep_last_answer(
    previous: Option<ExecutionOutcome>,
    failed: ExecutionOutcome,
) -> ExecutionOutcome {
    match previous {
        Some(mut last) if !last.is_empty() => {
            last.agents.extend(failed.agents);
            last
        }
        _ => failed,
    }
}

fn build_outcome(mode: ExecutionMode, results: Vec<AgentResult>) -> ExecutionOutcome {
    let mut artifacts = BTreeMap::new();
    let mut agents = Vec::with_capacity(results.len());
    let mut completed: Vec<(String, String)> = Vec::new();

    for result in results {
        if let Some(output) = result.output {
            let agent = result.run.agent.clone();
            for (name, value) in output.artifacts {
                artifacts.insert(format!("{agent}/{name}"), value);
            }
            artifacts.insert(agent.clone(), output.content.clone());
            completed.push((agent, output.content));
        }
        agents.push(result.run);
    }

    let result = match mode {
        ExecutionMode::Parallel if completed.len() > 1 => completed
            .iter()
            .map(|(agent, content)| format!("## {agent}\n\n{content}"))
            .collect::<Vec<_>>()
            .join("\n\n"),
        _ => completed
            .pop()
            .map(|(_, content)| content)
            .unwrap_or_default(),
    };

    ExecutionOutcome {
        result,
        artifacts,
        agents,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completed(agent: &str, content: &str) -> AgentResult {
        AgentResult {
            run: AgentRun {
                agent: agent.into(),
                status: AgentStatus::Completed,
                output: Some(content.into()),
                duration_ms: 1,
            },
            output: Some(AgentOutput::text(content)),
        }
    }

    fn failed(agent: &str) -> AgentResult {
        AgentResult {
            run: AgentRun {
                agent: agent.into(),
                status: AgentStatus::Failed {
                    reason: "boom".into(),
                },
                output: None,
                duration_ms: 1,
            },
            output: None,
        }
    }

    #[test]
    fn test_parallel_outcome_joins_sections_in_order() {
        let outcome = build_outcome(
            ExecutionMode::Parallel,
            vec![completed("researcher", "facts"), failed("coder"), completed("writer", "prose")],
        );
        assert_eq!(outcome.result, "## researcher\n\nfacts\n\n## writer\n\nprose");
        assert_eq!(outcome.agents.len(), 3);
        assert!(outcome.has_failures());
        assert_eq!(outcome.completed_agents(), vec!["researcher", "writer"]);
        assert_eq!(outcome.artifacts["writer"], "prose");
    }

    #[test]
    fn test_sequential_outcome_is_last_completed_output() {
        let outcome = build_outcome(
            ExecutionMode::Sequential,
            vec![completed("researcher", "notes"), completed("writer", "final"), failed("reviewer")],
        );
        assert_eq!(outcome.result, "final");
    }

    #[test]
    fn test_failed_round_keeps_previous_answer() {
        let previous = build_outcome(ExecutionMode::Delegated, vec![completed("writer", "draft")]);
        let failed_round = build_outcome(ExecutionMode::Delegated, vec![failed("writer")]);

        let kept = keep_last_answer(Some(previous), failed_round.clone());
        assert_eq!(kept.result, "draft");
        assert_eq!(kept.artifacts["writer"], "draft");
        assert_eq!(kept.agents.len(), 2);
        assert!(kept.has_failures());

        assert_eq!(keep_last_answer(None, failed_round.clone()), failed_round);
    }

    #[test]
    fn test_all_failed_is_empty() {
        let outcome = build_outcome(ExecutionMode::Delegated, vec![failed("writer")]);
        assert!(outcome.is_empty());
        assert_eq!(outcome.result, "");
    }
}
