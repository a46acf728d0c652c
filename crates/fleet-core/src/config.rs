use crate::error::{FleetError, FleetResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Which flavour of the pipeline to run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineProfile {
    /// Every stage consults the reasoning model.
    #[default]
    Full,
    /// Latency-optimised: heuristics only, no judge, no refinement.
    Light,
}

impl std::fmt::Display for PipelineProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineProfile::Full => write!(f, "full"),
            PipelineProfile::Light => write!(f, "light"),
        }
    }
}

/// Retry behaviour for reasoning and agent calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Must be at least 1.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base delay in milliseconds for exponential backoff.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    /// Cap in milliseconds for a single backoff wait.
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            backoff_base_ms: 0,
            backoff_max_ms: 0,
        }
    }

    /// Backoff before the retry that follows failed attempt number `attempt` (1-based):
    /// `base * 2^(attempt-1)`, capped at `backoff_max_ms`.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(63);
        let delay = self
            .backoff_base_ms
            .saturating_mul(2u64.saturating_pow(exp))
            .min(self.backoff_max_ms);
        Duration::from_millis(delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    1_000
}

fn default_backoff_max_ms() -> u64 {
    30_000
}

/// OpenAI-compatible provider used by the HTTP chat backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// api.openai.com
    #[default]
    OpenAi,
    /// openrouter.ai
    OpenRouter,
    /// Groq cloud inference.
    Groq,
    /// Any self-hosted OpenAI-compatible server (vLLM, Ollama, LiteLLM).
    Custom,
}

/// Model settings for reasoning calls and chat-backed agents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Provider flavour.
    #[serde(default)]
    pub provider: LlmProvider,
    /// Model identifier, e.g. `gpt-4.1-mini`.
    pub model_id: String,
    /// Bearer token.
    #[serde(default)]
    pub api_key: String,
    /// Overrides the provider's default endpoint.
    #[serde(default)]
    pub api_base_url: Option<String>,
    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Completion token cap.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_temperature() -> f32 {
    0.2
}

fn default_max_tokens() -> u32 {
    2048
}

impl ModelConfig {
    /// Base URL of the chat completions API.
    pub fn base_url(&self) -> &str {
        if let Some(url) = &self.api_base_url {
            url
        } else {
            match self.provider {
                LlmProvider::OpenAi => "https://api.openai.com",
                LlmProvider::OpenRouter => "https://openrouter.ai/api",
                LlmProvider::Groq => "https://api.groq.com/openai",
                LlmProvider::Custom => "http://localhost:8000",
            }
        }
    }
}

/// Run-time configuration of the supervisor pipeline.
///
/// Constructed once by the caller (usually from TOML) and shared read-only
/// with every stage of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetConfig {
    /// Full or light pipeline.
    #[serde(default)]
    pub profile: PipelineProfile,
    /// Quality scores below this trigger a refinement round.
    #[serde(default = "default_refinement_threshold")]
    pub refinement_threshold: f64,
    /// Upper bound on refinement rounds per run.
    #[serde(default = "default_max_refinement_rounds")]
    pub max_refinement_rounds: u32,
    /// Run the judge sub-phase after Quality.
    #[serde(default)]
    pub enable_judge: bool,
    /// Time budget of the judge sub-phase.
    #[serde(default = "default_judge_timeout_seconds")]
    pub judge_timeout_seconds: f64,
    /// Lifetime of analysis cache entries; 0 disables the cache.
    #[serde(default = "default_cache_ttl_seconds")]
    pub cache_ttl_seconds: u64,
    /// Maximum number of analysis cache entries.
    #[serde(default = "default_cache_max_entries")]
    pub cache_max_entries: usize,
    /// Concurrency bound of parallel execution.
    #[serde(default = "default_max_parallel_agents")]
    pub max_parallel_agents: usize,
    /// Tasks with at most this many words are classified as low complexity.
    #[serde(default = "default_simple_task_max_words")]
    pub simple_task_max_words: usize,
    /// Tasks with more than this many words are classified as high complexity.
    #[serde(default = "default_complex_task_min_words")]
    pub complex_task_min_words: usize,
    /// Time budget of a single reasoning attempt.
    #[serde(default = "default_reasoning_timeout_seconds")]
    pub reasoning_timeout_seconds: f64,
    /// Time budget of a single agent attempt.
    #[serde(default = "default_agent_timeout_seconds")]
    pub agent_timeout_seconds: f64,
    /// Retries for reasoning calls.
    #[serde(default)]
    pub reasoning_retry: RetryPolicy,
    /// Retries for agent invocations.
    #[serde(default = "default_agent_retry")]
    pub agent_retry: RetryPolicy,
    /// Model used by the HTTP-backed reasoner and agents.
    #[serde(default)]
    pub model: Option<ModelConfig>,
}

fn default_refinement_threshold() -> f64 {
    8.0
}

fn default_max_refinement_rounds() -> u32 {
    2
}

fn default_judge_timeout_seconds() -> f64 {
    30.0
}

fn default_cache_ttl_seconds() -> u64 {
    3600
}

fn default_cache_max_entries() -> usize {
    1024
}

fn default_max_parallel_agents() -> usize {
    4
}

fn default_simple_task_max_words() -> usize {
    40
}

fn default_complex_task_min_words() -> usize {
    150
}

fn default_reasoning_timeout_seconds() -> f64 {
    60.0
}

fn default_agent_timeout_seconds() -> f64 {
    300.0
}

fn default_agent_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 2,
        ..RetryPolicy::default()
    }
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            profile: PipelineProfile::default(),
            refinement_threshold: default_refinement_threshold(),
            max_refinement_rounds: default_max_refinement_rounds(),
            enable_judge: false,
            judge_timeout_seconds: default_judge_timeout_seconds(),
            cache_ttl_seconds: default_cache_ttl_seconds(),
            cache_max_entries: default_cache_max_entries(),
            max_parallel_agents: default_max_parallel_agents(),
            simple_task_max_words: default_simple_task_max_words(),
            complex_task_min_words: default_complex_task_min_words(),
            reasoning_timeout_seconds: default_reasoning_timeout_seconds(),
            agent_timeout_seconds: default_agent_timeout_seconds(),
            reasoning_retry: RetryPolicy::default(),
            agent_retry: default_agent_retry(),
            model: None,
        }
    }
}

impl FleetConfig {
    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(raw: &str) -> FleetResult<Self> {
        toml::from_str(raw).map_err(|e| FleetError::Config(e.to_string()))
    }

    /// Read and parse a TOML file.
    pub fn load(path: &Path) -> FleetResult<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| FleetError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&raw)
    }

    /// Check every threshold before a run starts.
    pub fn validate(&self) -> FleetResult<()> {
        if !self.refinement_threshold.is_finite()
            || !(0.0..=10.0).contains(&self.refinement_threshold)
        {
            return Err(FleetError::Config(format!(
                "refinement_threshold must be within [0, 10], got {}",
                self.refinement_threshold
            )));
        }
        check_positive("judge_timeout_seconds", self.judge_timeout_seconds)?;
        check_positive("reasoning_timeout_seconds", self.reasoning_timeout_seconds)?;
        check_positive("agent_timeout_seconds", self.agent_timeout_seconds)?;
        if self.max_parallel_agents == 0 {
            return Err(FleetError::Config(
                "max_parallel_agents must be at least 1".into(),
            ));
        }
        if self.cache_max_entries == 0 {
            return Err(FleetError::Config(
                "cache_max_entries must be at least 1".into(),
            ));
        }
        if self.reasoning_retry.max_attempts == 0 || self.agent_retry.max_attempts == 0 {
            return Err(FleetError::Config(
                "retry max_attempts must be at least 1".into(),
            ));
        }
        if self.simple_task_max_words > self.complex_task_min_words {
            return Err(FleetError::Config(format!(
                "simple_task_max_words ({}) exceeds complex_task_min_words ({})",
                self.simple_task_max_words, self.complex_task_min_words
            )));
        }
        if let Some(model) = &self.model {
            if model.model_id.trim().is_empty() {
                return Err(FleetError::Config("model.model_id is empty".into()));
            }
        }
        Ok(())
    }

    /// Whether stages may consult the reasoning model.
    pub fn reasoning_enabled(&self) -> bool {
        self.profile == PipelineProfile::Full
    }

    /// Whether the judge sub-phase runs.
    pub fn judge_enabled(&self) -> bool {
        self.enable_judge && self.reasoning_enabled()
    }

    /// Refinement rounds allowed for the active profile.
    pub fn refinement_rounds(&self) -> u32 {
        match self.profile {
            PipelineProfile::Full => self.max_refinement_rounds,
            PipelineProfile::Light => 0,
        }
    }

    /// Judge time budget.
    pub fn judge_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.judge_timeout_seconds)
    }

    /// Time budget of one reasoning attempt.
    pub fn reasoning_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.reasoning_timeout_seconds)
    }

    /// Time budget of one agent attempt.
    pub fn agent_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.agent_timeout_seconds)
    }

    /// Analysis cache TTL.
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }

    /// Stable description of the settings that influence analysis results.
    pub fn fingerprint(&self) -> String {
        format!(
            "profile={};simple={};complex={};model={}",
            self.profile,
            self.simple_task_max_words,
            self.complex_task_min_words,
            self.model.as_ref().map_or("none", |m| m.model_id.as_str()),
        )
    }
}

fn check_positive(name: &str, value: f64) -> FleetResult<()> {
    if value > 0.0 && Duration::try_from_secs_f64(value).is_ok() {
        Ok(())
    } else {
        Err(FleetError::Config(format!(
            "{name} must be a positive number of seconds, got {value}"
        )))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = FleetConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.simple_task_max_words, 40);
        assert_eq!(config.agent_retry.max_attempts, 2);
    }

    #[test]
    fn test_from_toml_partial() {
        let config = FleetConfig::from_toml_str(
            r#"
            profile = "light"
            refinement_threshold = 7.5
            max_parallel_agents = 2

            [reasoning_retry]
            max_attempts = 5

            [model]
            provider = "groq"
            model_id = "llama-3.3-70b"
            "#,
        )
        .unwrap();
        assert_eq!(config.profile, PipelineProfile::Light);
        assert_eq!(config.refinement_threshold, 7.5);
        assert_eq!(config.reasoning_retry.max_attempts, 5);
        assert_eq!(config.reasoning_retry.backoff_base_ms, 1_000);
        let model = config.model.as_ref().unwrap();
        assert_eq!(model.base_url(), "https://api.groq.com/openai");
        assert!(!config.reasoning_enabled());
        assert_eq!(config.refinement_rounds(), 0);
    }

    #[test]
    fn test_from_toml_rejects_garbage() {
        let err = FleetConfig::from_toml_str("refinement_threshold = \"high\"").unwrap_err();
        assert!(matches!(err, FleetError::Config(_)));
    }

    #[test]
    fn test_validate_rejects_out_of_range_threshold() {
        let config = FleetConfig {
            refinement_threshold: 11.0,
            ..FleetConfig::default()
        };
        assert!(matches!(config.validate(), Err(FleetError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_attempts_and_parallelism() {
        let mut config = FleetConfig::default();
        config.reasoning_retry.max_attempts = 0;
        assert!(config.validate().is_err());

        let config = FleetConfig {
            max_parallel_agents: 0,
            ..FleetConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_non_positive_timeouts() {
        let config = FleetConfig {
            judge_timeout_seconds: 0.0,
            ..FleetConfig::default()
        };
        assert!(config.validate().is_err());

        let config = FleetConfig {
            reasoning_timeout_seconds: f64::NAN,
            ..FleetConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unrepresentable_timeouts() {
        for huge in [1e20, f64::INFINITY] {
            let config = FleetConfig {
                judge_timeout_seconds: huge,
                ..FleetConfig::default()
            };
            assert!(matches!(config.validate(), Err(FleetError::Config(_))));
        }

        let config = FleetConfig {
            agent_timeout_seconds: 1e20,
            ..FleetConfig::default()
        };
        assert!(config.validate().is_err());

        let config = FleetConfig {
            judge_timeout_seconds: 86_400.0,
            ..FleetConfig::default()
        };
        assert!(config.validate().is_ok());
        assert_eq!(config.judge_timeout(), Duration::from_secs(86_400));
    }

    #[test]
    fn test_backoff_for() {
        let policy = RetryPolicy {
            max_attempts: 6,
            backoff_base_ms: 500,
            backoff_max_ms: 3_000,
        };
        assert_eq!(policy.backoff_for(1), Duration::from_millis(500));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(1_000));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(2_000));
        assert_eq!(policy.backoff_for(4), Duration::from_millis(3_000));
        assert_eq!(policy.backoff_for(60), Duration::from_millis(3_000));
    }

    #[test]
    fn test_judge_enabled_only_in_full_profile() {
        let mut config = FleetConfig {
            enable_judge: true,
            ..FleetConfig::default()
        };
        assert!(config.judge_enabled());
        config.profile = PipelineProfile::Light;
        assert!(!config.judge_enabled());
    }

    #[test]
    fn test_fingerprint_tracks_relevant_settings() {
        let a = FleetConfig::default();
        let b = FleetConfig {
            simple_task_max_words: 10,
            ..FleetConfig::default()
        };
        let c = FleetConfig {
            refinement_threshold: 5.0,
            ..FleetConfig::default()
        };
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint(), c.fingerprint());
    }
}
