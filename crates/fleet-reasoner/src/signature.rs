use async_trait::async_trait;
use fleet_core::FleetResult;
use serde::Serialize;

/// Declared schema of a structured reasoning call.
///
/// A signature names the call, tells the model what to do, and lists the
/// input fields it receives and the output fields it must return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Signature {
    /// Short identifier, used in logs and as the prompt title.
    pub name: &'static str,
    /// Task description for the model.
    pub instructions: &'static str,
    /// Names of the JSON input fields.
    pub inputs: &'static [&'static str],
    /// Output fields as `(name, description)` pairs.
    pub outputs: &'static [(&'static str, &'static str)],
}

impl Signature {
    /// Names of the output fields.
    pub fn output_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.outputs.iter().map(|(name, _)| *name)
    }
}

/// An external structured reasoning call (an LLM behind a prompting framework).
///
/// Implementations must report rate limits, timeouts and network trouble as
/// transient errors ([`fleet_core::FleetError::TransientReasoning`] or
/// [`fleet_core::FleetError::Http`]) and everything else as fatal.
#[async_trait]
pub trait ReasoningCall: Send + Sync {
    /// Invoke the model with `inputs` and return its structured output as a JSON object.
    async fn call(
        &self,
        signature: &Signature,
        inputs: serde_json::Value,
    ) -> FleetResult<serde_json::Value>;
}

/// Task analysis.
pub const ANALYSIS: Signature = Signature {
    name: "task_analysis",
    instructions: "Analyse the user's task. Estimate its complexity, the capabilities \
                   needed to solve it, how many steps it takes and whether it needs \
                   current information from the web.",
    inputs: &["task", "history"],
    outputs: &[
        ("complexity", "one of: low, medium, high"),
        ("capabilities", "list of capability tags, most important first"),
        ("steps", "estimated number of steps as an integer"),
        ("needs_web_search", "true if current web information is required"),
        ("reasoning", "one or two sentences explaining the estimate"),
    ],
};

/// Agent routing.
pub const ROUTING: Signature = Signature {
    name: "task_routing",
    instructions: "Choose which agents from the roster should work on the task and how. \
                   Use 'delegated' for a single agent, 'sequential' when each agent builds \
                   on the previous one's output, 'parallel' for independent subtasks. \
                   Only use agent ids and tool ids that appear in the inputs.",
    inputs: &["task", "analysis", "agents", "tools"],
    outputs: &[
        ("assigned_agents", "ordered list of agent ids"),
        ("execution_mode", "one of: delegated, sequential, parallel"),
        ("tool_requirements", "list of tool ids the agents will need"),
        ("subtasks", "list of {agent, instruction} objects"),
        ("reasoning", "one or two sentences explaining the plan"),
    ],
};

/// Progress evaluation.
pub const PROGRESS: Signature = Signature {
    name: "progress_evaluation",
    instructions: "Judge whether the agents' work completes the task, needs another \
                   refinement pass, or is stuck and should be escalated to a human.",
    inputs: &["task", "result", "agents"],
    outputs: &[
        ("action", "one of: complete, refine, escalate"),
        ("rationale", "one or two sentences explaining the decision"),
    ],
};

/// Quality evaluation.
pub const QUALITY: Signature = Signature {
    name: "quality_assessment",
    instructions: "Score how well the result answers the task on a 0-10 scale and list \
                   concrete improvements.",
    inputs: &["task", "result", "progress"],
    outputs: &[
        ("score", "number between 0 and 10"),
        ("flag", "one of: pass, needs_refinement, fail"),
        ("improvements", "concrete changes that would raise the score"),
        ("reasoning", "one or two sentences explaining the score"),
    ],
};

/// Final review before a result is returned.
pub const JUDGE: Signature = Signature {
    name: "final_judge",
    instructions: "Review the final answer once more. Object only if it is wrong, \
                   incomplete or unsafe; otherwise approve it.",
    inputs: &["task", "result", "quality", "reasoning_effort"],
    outputs: &[
        ("objection", "true to block the answer, false to approve it"),
        ("score", "optional independent 0-10 score"),
        ("feedback", "what must change if you object"),
    ],
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_output_names() {
        let names: Vec<_> = QUALITY.output_names().collect();
        assert_eq!(names, vec!["score", "flag", "improvements", "reasoning"]);
    }

    #[test]
    fn test_signatures_have_distinct_names() {
        let mut names = [
            ANALYSIS.name,
            ROUTING.name,
            PROGRESS.name,
            QUALITY.name,
            JUDGE.name,
        ];
        names.sort_unstable();
        let before = names.len();
        let mut deduped = names.to_vec();
        deduped.dedup();
        assert_eq!(deduped.len(), before);
    }
}
