use async_trait::async_trait;
use fleet_core::{AgentProfile, FleetError, FleetResult};
use fleet_reasoner::{ChatBackend, ChatMessage};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Work handed to a single agent invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRequest {
    /// The user's original task text.
    pub task: String,
    /// What this agent should do; the task itself when routing gave no subtask.
    pub instruction: String,
    /// Output of the previous agent in a sequential plan.
    #[serde(default)]
    pub context: Option<String>,
    /// Refinement notes from earlier rounds, oldest first.
    #[serde(default)]
    pub feedback: Vec<String>,
    /// Tool ids the routing plan expects the agent to use.
    #[serde(default)]
    pub tools: Vec<String>,
}

impl AgentRequest {
    /// Request covering the whole task.
    pub fn new(task: impl Into<String>, instruction: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            instruction: instruction.into(),
            context: None,
            feedback: Vec::new(),
            tools: Vec::new(),
        }
    }

    /// Render the request as a single prompt.
    ///
    /// Refinement feedback is appended verbatim as an annotation block.
    pub fn prompt(&self) -> String {
        let mut prompt = String::new();
        if self.instruction != self.task {
            prompt.push_str(&format!("Overall task:\n{}\n\n", self.task));
        }
        prompt.push_str(&format!("Your assignment:\n{}\n", self.instruction));
        if let Some(context) = &self.context {
            prompt.push_str(&format!("\nWork so far from the previous agent:\n{context}\n"));
        }
        if !self.tools.is_empty() {
            prompt.push_str(&format!("\nTools you may use: {}\n", self.tools.join(", ")));
        }
        if !self.feedback.is_empty() {
            prompt.push_str("\nReviewer feedback on the previous attempt:\n");
            for note in &self.feedback {
                prompt.push_str(&format!("- {note}\n"));
            }
        }
        prompt
    }
}

/// What an agent produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentOutput {
    /// Main answer text.
    pub content: String,
    /// Named side outputs.
    #[serde(default)]
    pub artifacts: BTreeMap<String, String>,
}

impl AgentOutput {
    /// Output with text only.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            artifacts: BTreeMap::new(),
        }
    }
}

/// External runtime that actually runs specialist agents.
///
/// Implementations should return promptly with [`FleetError::Cancelled`]
/// once `cancel` fires. Transient failures (HTTP, timeouts) are retried by
/// the execution stage; anything else fails the agent immediately.
#[async_trait]
pub trait AgentRuntime: Send + Sync {
    /// Run `profile` on `request`.
    async fn execute(
        &self,
        profile: &AgentProfile,
        request: AgentRequest,
        cancel: CancellationToken,
    ) -> FleetResult<AgentOutput>;
}

/// Agent runtime that answers every request with one chat completion,
/// using the profile's system prompt.
pub struct ChatAgentRuntime {
    backend: Arc<dyn ChatBackend>,
}

impl ChatAgentRuntime {
    /// Runtime that sends every agent to `backend`.
    pub fn new(backend: Arc<dyn ChatBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl AgentRuntime for ChatAgentRuntime {
    async fn execute(
        &self,
        profile: &AgentProfile,
        request: AgentRequest,
        cancel: CancellationToken,
    ) -> FleetResult<AgentOutput> {
        let messages = [
            ChatMessage::system(profile.system_prompt.clone()),
            ChatMessage::user(request.prompt()),
        ];
        tokio::select! {
            _ = cancel.cancelled() => Err(FleetError::Cancelled),
            reply = self.backend.complete(&messages) => reply.map(AgentOutput::text),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use fleet_core::default_roster;

    struct Echo;

    #[async_trait]
    impl ChatBackend for Echo {
        async fn complete(&self, messages: &[ChatMessage]) -> FleetResult<String> {
            Ok(messages.last().map(|m| m.content.clone()).unwrap_or_default())
        }
    }

    struct Stuck;

    #[async_trait]
    impl ChatBackend for Stuck {
        async fn complete(&self, _messages: &[ChatMessage]) -> FleetResult<String> {
            std::future::pending().await
        }
    }

    #[test]
    fn test_prompt_includes_context_and_feedback() {
        let mut request = AgentRequest::new("write a report", "collect sources");
        request.context = Some("draft v1".into());
        request.feedback = vec!["cite primary sources".into()];
        request.tools = vec!["web_search".into()];

        let prompt = request.prompt();
        assert!(prompt.contains("Overall task:\nwrite a report"));
        assert!(prompt.contains("Your assignment:\ncollect sources"));
        assert!(prompt.contains("draft v1"));
        assert!(prompt.contains("- cite primary sources"));
        assert!(prompt.contains("web_search"));
    }

    #[test]
    fn test_prompt_for_whole_task_skips_overall_section() {
        let prompt = AgentRequest::new("say hi", "say hi").prompt();
        assert!(!prompt.contains("Overall task"));
    }

    #[tokio::test]
    async fn test_chat_runtime_uses_prompt() {
        let roster = default_roster();
        let profile = roster.get("writer").unwrap();
        let runtime = ChatAgentRuntime::new(Arc::new(Echo));
        let out = runtime
            .execute(profile, AgentRequest::new("t", "t"), CancellationToken::new())
            .await
            .unwrap();
        assert!(out.content.contains("Your assignment:\nt"));
    }

    #[tokio::test]
    async fn test_chat_runtime_observes_cancellation() {
        let roster = default_roster();
        let profile = roster.get("coder").unwrap();
        let runtime = ChatAgentRuntime::new(Arc::new(Stuck));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = runtime
            .execute(profile, AgentRequest::new("t", "t"), cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, FleetError::Cancelled));
    }
}
