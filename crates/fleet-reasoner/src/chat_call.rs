use crate::backends::{ChatBackend, ChatMessage};
use crate::signature::{ReasoningCall, Signature};
use async_trait::async_trait;
use fleet_core::{FleetError, FleetResult};
use serde_json::Value;
use std::sync::Arc;

/// A [`ReasoningCall`] that prompts a chat model for a JSON object.
///
/// The signature becomes the system prompt; the inputs are sent as a JSON
/// user message. The reply may wrap the object in a markdown code fence or
/// surround it with prose; both are tolerated.
pub struct ChatReasoningCall {
    backend: Arc<dyn ChatBackend>,
}

impl ChatReasoningCall {
    /// Reasoning over `backend`.
    pub fn new(backend: Arc<dyn ChatBackend>) -> Self {
        Self { backend }
    }
}

/// Render the system prompt for `signature`.
pub fn system_prompt(signature: &Signature) -> String {
    let mut prompt = format!("# {}\n\n{}\n\nRules:\n", signature.name, signature.instructions);
    prompt.push_str("- Respond with a single JSON object and nothing else.\n");
    prompt.push_str("- Include every field listed below.\n\nFields:\n");
    for (name, description) in signature.outputs {
        prompt.push_str(&format!("- {name}: {description}\n"));
    }
    prompt
}

/// Pull the JSON object out of a model reply.
pub fn extract_json_object(reply: &str) -> FleetResult<Value> {
    let trimmed = reply.trim();
    let start = trimmed.find('{');
    let end = trimmed.rfind('}');
    let candidate = match (start, end) {
        (Some(s), Some(e)) if s < e => &trimmed[s..=e],
        _ => {
            return Err(FleetError::Reasoning(format!(
                "reply contains no JSON object: {trimmed}"
            )))
        }
    };
    let value: Value = serde_json::from_str(candidate)
        .map_err(|e| FleetError::Reasoning(format!("malformed JSON reply: {e}")))?;
    if value.is_object() {
        Ok(value)
    } else {
        Err(FleetError::Reasoning("reply is not a JSON object".into()))
    }
}

#[async_trait]
impl ReasoningCall for ChatReasoningCall {
    async fn call(&self, signature: &Signature, inputs: Value) -> FleetResult<Value> {
        let messages = [
            ChatMessage::system(system_prompt(signature)),
            ChatMessage::user(serde_json::to_string_pretty(&inputs)?),
        ];
        let reply = self.backend.complete(&messages).await?;
        extract_json_object(&reply)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::signature;
    use serde_json::json;

    struct Canned(&'static str);

    #[async_trait]
    impl ChatBackend for Canned {
        async fn complete(&self, messages: &[ChatMessage]) -> FleetResult<String> {
            assert_eq!(messages.len(), 2);
            Ok(self.0.to_string())
        }
    }

    #[test]
    fn test_system_prompt_lists_outputs() {
        let prompt = system_prompt(&signature::PROGRESS);
        assert!(prompt.starts_with("# progress_evaluation"));
        assert!(prompt.contains("- action: one of: complete, refine, escalate"));
        assert!(prompt.contains("- rationale:"));
    }

    #[test]
    fn test_extract_from_fenced_reply() {
        let reply = "Sure!\n```json\n{\"action\": \"complete\"}\n```";
        assert_eq!(extract_json_object(reply).unwrap(), json!({"action": "complete"}));
    }

    #[test]
    fn test_extract_rejects_non_objects() {
        assert!(extract_json_object("no json here").is_err());
        assert!(extract_json_object("{not json}").is_err());
    }

    #[tokio::test]
    async fn test_call_round_trip() {
        let call = ChatReasoningCall::new(Arc::new(Canned(r#"{"objection": false}"#)));
        let out = call.call(&signature::JUDGE, json!({"task": "t"})).await.unwrap();
        assert_eq!(out["objection"], json!(false));
    }
}
