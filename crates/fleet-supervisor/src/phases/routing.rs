use super::{status_for, Services};
use crate::context::SupervisorContext;
use fleet_core::{AgentRoster, Phase, PhaseStatus, RoutingPlan, ToolCatalog};
use fleet_reasoner::{heuristics, HeuristicSettings};
use tracing::info;

/// Routing stage: ask the reasoner for a plan, then validate it against the
/// roster and tool catalog.
pub async fn execute(services: &Services, ctx: &mut SupervisorContext) -> PhaseStatus {
    let analysis = match &ctx.analysis {
        Some(analysis) => analysis.clone(),
        None => heuristics::analysis(&ctx.task, &HeuristicSettings::from(ctx.config.as_ref())),
    };

    let reasoned = services
        .reasoner
        .route(&ctx.task, &analysis, &services.roster, &services.tools)
        .await;
    let mut status = status_for(&reasoned.origin);
    for warning in &reasoned.warnings {
        ctx.warn(Phase::Routing, warning.clone()).await;
    }

    let (mut plan, dropped) = validate(reasoned.value, &services.roster, &services.tools);
    for message in dropped {
        ctx.warn(Phase::Routing, message).await;
    }

    if plan.assigned_agents.is_empty() {
        ctx.warn(Phase::Routing, "no valid agents left in the plan, using the default plan")
            .await;
        plan = heuristics::routing(&services.roster);
        status = PhaseStatus::Fallback {
            reason: "routing plan had no valid agents".into(),
        };
    }

    if plan.normalize() {
        info!(run_id = %ctx.run_id(), "Single-agent parallel plan rewritten to delegated");
    }

    ctx.routing = Some(plan);
    status
}

/// Drop unknown agents, their subtasks and unknown tools.
///
/// Agent and tool ids are rewritten to their canonical form; duplicates are
/// removed. Returns the cleaned plan and one message per dropped item.
pub fn validate(
    plan: RoutingPlan,
    roster: &AgentRoster,
    tools: &ToolCatalog,
) -> (RoutingPlan, Vec<String>) {
    let mut messages = Vec::new();

    let mut agents: Vec<String> = Vec::new();
    for agent in &plan.assigned_agents {
        match roster.get(agent) {
            Some(profile) => {
                let id = profile.id().to_string();
                if !agents.contains(&id) {
                    agents.push(id);
                }
            }
            None => messages.push(format!("dropped unknown agent '{agent}'")),
        }
    }

    let subtasks = plan
        .subtasks
        .into_iter()
        .filter_map(|mut subtask| {
            let id = roster.get(&subtask.agent).map(|p| p.id().to_string());
            match id {
                Some(id) if agents.contains(&id) => {
                    subtask.agent = id;
                    Some(subtask)
                }
                _ => {
                    messages.push(format!(
                        "dropped subtask for unassigned agent '{}'",
                        subtask.agent
                    ));
                    None
                }
            }
        })
        .collect();

    let mut tool_requirements: Vec<String> = Vec::new();
    for tool in &plan.tool_requirements {
        match tools.get(tool) {
            Some(descriptor) => {
                let id = descriptor.kind.id().to_string();
                if !tool_requirements.contains(&id) {
                    tool_requirements.push(id);
                }
            }
            None => messages.push(format!("dropped unknown tool '{tool}'")),
        }
    }

    (
        RoutingPlan {
            assigned_agents: agents,
            execution_mode: plan.execution_mode,
            tool_requirements,
            subtasks,
            reasoning: plan.reasoning,
        },
        messages,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::{default_roster, default_tool_catalog, ExecutionMode, Subtask};

    fn plan(agents: &[&str], tools: &[&str], subtasks: Vec<Subtask>) -> RoutingPlan {
        RoutingPlan {
            assigned_agents: agents.iter().map(|a| a.to_string()).collect(),
            execution_mode: ExecutionMode::Sequential,
            tool_requirements: tools.iter().map(|t| t.to_string()).collect(),
            subtasks,
            reasoning: String::new(),
        }
    }

    #[test]
    fn test_unknown_agent_is_dropped_with_its_subtask() {
        let raw = plan(
            &["researcher", "astrologer", "writer"],
            &[],
            vec![
                Subtask::new("astrologer", "read the stars"),
                Subtask::new("writer", "write it up"),
            ],
        );
        let (clean, messages) = validate(raw, &default_roster(), &default_tool_catalog());
        assert_eq!(clean.assigned_agents, vec!["researcher", "writer"]);
        assert_eq!(clean.subtasks, vec![Subtask::new("writer", "write it up")]);
        assert_eq!(messages.len(), 2);
        assert!(messages[0].contains("astrologer"));
    }

    #[test]
    fn test_ids_are_canonicalised_and_deduplicated() {
        let raw = plan(&["ResearcherAgent", "researcher"], &["web_search", "teleporter"], vec![]);
        let (clean, messages) = validate(raw, &default_roster(), &default_tool_catalog());
        assert_eq!(clean.assigned_agents, vec!["researcher"]);
        assert_eq!(clean.tool_requirements, vec!["web_search"]);
        assert_eq!(messages, vec!["dropped unknown tool 'teleporter'"]);
    }

    #[test]
    fn test_all_unknown_leaves_empty_plan() {
        let raw = plan(&["ghost"], &[], vec![]);
        let (clean, _) = validate(raw, &default_roster(), &default_tool_catalog());
        assert!(clean.assigned_agents.is_empty());
    }
}
