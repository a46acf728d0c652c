//! Reasoning layer of the fleet supervisor.
//!
//! Wraps an external structured reasoning model behind [`Reasoner`], which
//! turns every failure into a deterministic heuristic decision so the
//! pipeline never stalls on the model. Also provides the shared
//! [`TtlCache`] and the [`retry_with_backoff`] wrapper.
//!
//! # Main types
//!
//! - [`Reasoner`] — Analysis, routing, progress, quality and judge calls.
//! - [`ReasoningCall`] — Seam to the model; [`ChatReasoningCall`] implements it over a [`ChatBackend`].
//! - [`TtlCache`] — Bounded time-to-live cache with hit/miss statistics.

/// Chat completion backends.
pub mod backends;
/// Time-to-live cache.
pub mod cache;
/// Signature prompting over a chat backend.
pub mod chat_call;
/// Deterministic fallbacks.
pub mod heuristics;
/// Model-backed stage decisions.
pub mod reasoner;
/// Exponential backoff.
pub mod retry;
/// Score normalisation.
pub mod score;
/// Reasoning signatures and the model seam.
pub mod signature;

pub use backends::{ChatBackend, ChatMessage, ChatRole, OpenAiBackend};
pub use cache::{CacheStats, TtlCache};
pub use chat_call::ChatReasoningCall;
pub use heuristics::HeuristicSettings;
pub use reasoner::{Origin, Reasoned, Reasoner};
pub use retry::{retry_with_backoff, RetryPolicy};
pub use score::normalize_score;
pub use signature::{ReasoningCall, Signature};
