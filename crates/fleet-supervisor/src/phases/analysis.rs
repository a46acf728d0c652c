use super::{status_for, Services};
use crate::context::SupervisorContext;
use fleet_core::{Phase, PhaseStatus};
use fleet_reasoner::Origin;
use sha2::{Digest, Sha256};
use tracing::debug;

/// Cache key of an analysis: SHA-256 over the task text and config fingerprint.
pub fn cache_key(task_text: &str, fingerprint: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(task_text.as_bytes());
    hasher.update([0x1f]);
    hasher.update(fingerprint.as_bytes());
    hex::encode(hasher.finalize())
}

/// Analysis stage: cache lookup, then the reasoner.
///
/// Only model-produced analyses are cached, so a run that fell back to
/// heuristics does not pin the fallback for the cache's lifetime.
pub async fn execute(services: &Services, ctx: &mut SupervisorContext) -> PhaseStatus {
    let key = cache_key(ctx.task.text(), &ctx.config.fingerprint());

    if let Some(hit) = services.cache.get(&key) {
        debug!(run_id = %ctx.run_id(), key = %key, "Analysis cache hit");
        ctx.analysis = Some(hit);
        return PhaseStatus::CacheHit;
    }

    let reasoned = services.reasoner.analyze(&ctx.task).await;
    for warning in &reasoned.warnings {
        ctx.warn(Phase::Analysis, warning.clone()).await;
    }
    if reasoned.origin == Origin::Model {
        services.cache.set(key, reasoned.value.clone());
    }
    ctx.analysis = Some(reasoned.value);
    status_for(&reasoned.origin)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_is_stable_hex() {
        let a = cache_key("hello", "profile=full");
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(a, cache_key("hello", "profile=full"));
    }

    #[test]
    fn test_cache_key_separates_task_and_fingerprint() {
        assert_ne!(cache_key("hello", "profile=full"), cache_key("hello", "profile=light"));
        assert_ne!(cache_key("ab", "c"), cache_key("a", "bc"));
    }
}
