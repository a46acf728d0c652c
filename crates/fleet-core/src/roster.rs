use crate::error::FleetError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Specialist roles available to the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentRole {
    /// Gathers facts, searches the web, cites sources.
    Researcher,
    /// Works with data, numbers and comparisons.
    Analyst,
    /// Produces prose: summaries, reports, documentation.
    Writer,
    /// Writes and runs code.
    Coder,
    /// Critiques drafts for correctness and completeness.
    Reviewer,
}

impl AgentRole {
    /// Every role, in default roster order.
    pub const ALL: [AgentRole; 5] = [
        AgentRole::Researcher,
        AgentRole::Analyst,
        AgentRole::Writer,
        AgentRole::Coder,
        AgentRole::Reviewer,
    ];

    /// Stable identifier used in routing plans.
    pub fn id(self) -> &'static str {
        match self {
            AgentRole::Researcher => "researcher",
            AgentRole::Analyst => "analyst",
            AgentRole::Writer => "writer",
            AgentRole::Coder => "coder",
            AgentRole::Reviewer => "reviewer",
        }
    }

    /// Capability tags this role covers.
    pub fn capabilities(self) -> &'static [&'static str] {
        match self {
            AgentRole::Researcher => &["research", "web_search", "fact_checking", "general_reasoning"],
            AgentRole::Analyst => &["data_analysis", "math", "comparison", "general_reasoning"],
            AgentRole::Writer => &["writing", "summarization", "documentation", "general_reasoning"],
            AgentRole::Coder => &["coding", "code_execution", "debugging"],
            AgentRole::Reviewer => &["review", "fact_checking", "quality_assurance"],
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for AgentRole {
    type Err = FleetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        let wanted = wanted.strip_suffix("agent").unwrap_or(&wanted).trim_end_matches(['_', ' ']);
        AgentRole::ALL
            .into_iter()
            .find(|role| role.id() == wanted)
            .ok_or_else(|| FleetError::Validation(format!("unknown agent '{}'", s.trim())))
    }
}

/// Tools an agent may be granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    /// Web search returning snippets and links.
    WebSearch,
    /// Sandboxed code execution.
    CodeInterpreter,
    /// Headless page fetching.
    Browser,
    /// Read access to user-provided files.
    FileReader,
}

impl ToolKind {
    /// Every tool kind.
    pub const ALL: [ToolKind; 4] = [
        ToolKind::WebSearch,
        ToolKind::CodeInterpreter,
        ToolKind::Browser,
        ToolKind::FileReader,
    ];

    /// Stable identifier used in routing plans.
    pub fn id(self) -> &'static str {
        match self {
            ToolKind::WebSearch => "web_search",
            ToolKind::CodeInterpreter => "code_interpreter",
            ToolKind::Browser => "browser",
            ToolKind::FileReader => "file_reader",
        }
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for ToolKind {
    type Err = FleetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        ToolKind::ALL
            .into_iter()
            .find(|tool| tool.id() == wanted)
            .ok_or_else(|| FleetError::Validation(format!("unknown tool '{}'", s.trim())))
    }
}

/// Configuration of one specialist agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentProfile {
    /// The agent's role; doubles as its identifier.
    pub role: AgentRole,
    /// One-line description shown to the router.
    pub description: String,
    /// System prompt used when the agent runs on a chat backend.
    pub system_prompt: String,
    /// Tools the agent may use.
    pub tools: Vec<ToolKind>,
}

impl AgentProfile {
    /// Identifier used in routing plans.
    pub fn id(&self) -> &'static str {
        self.role.id()
    }
}

/// Ordered set of agents available to a run, at most one per role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRoster {
    agents: Vec<AgentProfile>,
}

impl AgentRoster {
    /// Build a roster; later duplicates of a role are ignored.
    pub fn new(profiles: Vec<AgentProfile>) -> Self {
        let mut agents: Vec<AgentProfile> = Vec::with_capacity(profiles.len());
        for profile in profiles {
            if !agents.iter().any(|a| a.role == profile.role) {
                agents.push(profile);
            }
        }
        Self { agents }
    }

    /// Look up an agent by identifier (case-insensitive, `"CoderAgent"` accepted).
    pub fn get(&self, id: &str) -> Option<&AgentProfile> {
        let role: AgentRole = id.parse().ok()?;
        self.agents.iter().find(|a| a.role == role)
    }

    /// Whether the roster contains `id`.
    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// All agents in roster order.
    pub fn agents(&self) -> &[AgentProfile] {
        &self.agents
    }

    /// Identifiers in roster order.
    pub fn ids(&self) -> Vec<&'static str> {
        self.agents.iter().map(AgentProfile::id).collect()
    }

    /// Agents covering the capability tag, in roster order.
    pub fn agents_for_capability(&self, capability: &str) -> Vec<&AgentProfile> {
        let tag = capability.trim().to_ascii_lowercase();
        self.agents
            .iter()
            .filter(|a| a.role.capabilities().contains(&tag.as_str()))
            .collect()
    }

    /// Number of agents.
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    /// Whether the roster is empty.
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Compact JSON description handed to the routing signature.
    pub fn describe(&self) -> serde_json::Value {
        serde_json::Value::Array(
            self.agents
                .iter()
                .map(|a| {
                    serde_json::json!({
                        "id": a.id(),
                        "description": a.description,
                        "capabilities": a.role.capabilities(),
                        "tools": a.tools,
                    })
                })
                .collect(),
        )
    }
}

/// A tool the router may request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Tool kind.
    pub kind: ToolKind,
    /// What the tool does.
    pub description: String,
}

/// Tools available to a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolCatalog {
    tools: Vec<ToolDescriptor>,
}

impl ToolCatalog {
    /// Build a catalog.
    pub fn new(tools: Vec<ToolDescriptor>) -> Self {
        Self { tools }
    }

    /// Look up a tool by identifier.
    pub fn get(&self, id: &str) -> Option<&ToolDescriptor> {
        let kind: ToolKind = id.parse().ok()?;
        self.tools.iter().find(|t| t.kind == kind)
    }

    /// Whether the catalog offers `id`.
    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// All tools.
    pub fn tools(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    /// Compact JSON description handed to the routing signature.
    pub fn describe(&self) -> serde_json::Value {
        serde_json::Value::Array(
            self.tools
                .iter()
                .map(|t| serde_json::json!({"id": t.kind.id(), "description": t.description}))
                .collect(),
        )
    }
}

/// The standard five-agent roster.
pub fn default_roster() -> AgentRoster {
    AgentRoster::new(vec![
        AgentProfile {
            role: AgentRole::Researcher,
            description: "Finds and verifies up-to-date information, citing sources.".into(),
            system_prompt: RESEARCHER_PROMPT.into(),
            tools: vec![ToolKind::WebSearch, ToolKind::Browser],
        },
        AgentProfile {
            role: AgentRole::Analyst,
            description: "Analyses data, runs calculations and compares options.".into(),
            system_prompt: ANALYST_PROMPT.into(),
            tools: vec![ToolKind::CodeInterpreter, ToolKind::FileReader],
        },
        AgentProfile {
            role: AgentRole::Writer,
            description: "Turns findings into clear, well-structured prose.".into(),
            system_prompt: WRITER_PROMPT.into(),
            tools: vec![],
        },
        AgentProfile {
            role: AgentRole::Coder,
            description: "Writes, runs and debugs code.".into(),
            system_prompt: CODER_PROMPT.into(),
            tools: vec![ToolKind::CodeInterpreter, ToolKind::FileReader],
        },
        AgentProfile {
            role: AgentRole::Reviewer,
            description: "Checks drafts for errors, gaps and unsupported claims.".into(),
            system_prompt: REVIEWER_PROMPT.into(),
            tools: vec![],
        },
    ])
}

/// Every tool kind with its standard description.
pub fn default_tool_catalog() -> ToolCatalog {
    ToolCatalog::new(vec![
        ToolDescriptor {
            kind: ToolKind::WebSearch,
            description: "Search the web for current information.".into(),
        },
        ToolDescriptor {
            kind: ToolKind::CodeInterpreter,
            description: "Execute Python code in a sandbox and return stdout.".into(),
        },
        ToolDescriptor {
            kind: ToolKind::Browser,
            description: "Fetch a web page and return its readable text.".into(),
        },
        ToolDescriptor {
            kind: ToolKind::FileReader,
            description: "Read files the user attached to the conversation.".into(),
        },
    ])
}

const RESEARCHER_PROMPT: &str = "\
You are the Researcher in a team of specialist agents. Gather accurate, \
current information for the task you are given.

Rules:
1. Prefer primary sources and say where each fact comes from.
2. Flag anything you could not verify.
3. Report findings as concise bullet points.
";

const ANALYST_PROMPT: &str = "\
You are the Analyst in a team of specialist agents. Work through data, \
numbers and trade-offs carefully.

Rules:
1. Show the calculation or comparison behind every conclusion.
2. State assumptions explicitly.
3. End with a short, direct answer.
";

const WRITER_PROMPT: &str = "\
You are the Writer in a team of specialist agents. Turn the material you \
receive into a clear, well-organised answer for the user.

Rules:
1. Keep the user's original question in focus.
2. Use headings and lists where they help.
3. Do not invent facts that are not in the material.
";

const CODER_PROMPT: &str = "\
You are the Coder in a team of specialist agents. Write correct, minimal \
code that solves the task.

Rules:
1. Use markdown code blocks with the language tag.
2. Explain how to run the code.
3. Mention edge cases the code does not handle.
";

const REVIEWER_PROMPT: &str = "\
You are the Reviewer in a team of specialist agents. Critique the draft you \
receive.

Rules:
1. Point out factual errors, gaps and unclear passages.
2. Suggest concrete fixes.
3. Finish with the corrected answer.
";

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_roster_covers_all_roles() {
        let roster = default_roster();
        assert_eq!(roster.len(), 5);
        assert_eq!(
            roster.ids(),
            vec!["researcher", "analyst", "writer", "coder", "reviewer"]
        );
        for profile in roster.agents() {
            assert!(!profile.system_prompt.is_empty());
        }
    }

    #[test]
    fn test_lookup_is_forgiving_about_case_and_suffix() {
        let roster = default_roster();
        assert!(roster.contains("Researcher"));
        assert!(roster.contains("CoderAgent"));
        assert!(roster.contains("writer_agent"));
        assert!(!roster.contains("astronaut"));
    }

    #[test]
    fn test_duplicate_roles_are_ignored() {
        let base = default_roster();
        let researcher = base.get("researcher").unwrap().clone();
        let roster = AgentRoster::new(vec![researcher.clone(), researcher]);
        assert_eq!(roster.len(), 1);
    }

    #[test]
    fn test_agents_for_capability() {
        let roster = default_roster();
        let ids: Vec<_> = roster
            .agents_for_capability("fact_checking")
            .into_iter()
            .map(AgentProfile::id)
            .collect();
        assert_eq!(ids, vec!["researcher", "reviewer"]);
        assert!(roster.agents_for_capability("juggling").is_empty());
    }

    #[test]
    fn test_tool_catalog_lookup() {
        let catalog = default_tool_catalog();
        assert!(catalog.contains("web_search"));
        assert!(catalog.contains("Code Interpreter"));
        assert!(!catalog.contains("teleporter"));
        assert_eq!(catalog.describe().as_array().unwrap().len(), 4);
    }

    #[test]
    fn test_roster_describe_shape() {
        let json = default_roster().describe();
        let first = &json[0];
        assert_eq!(first["id"], "researcher");
        assert!(first["capabilities"].is_array());
    }
}
