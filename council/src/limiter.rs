//! Per-provider concurrency limits for outbound model calls.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

use tokio::sync::OwnedSemaphorePermit;
use tokio::sync::Semaphore;
use tracing::warn;

use gauntlet_config::RateLimitsConfig;

/// Wait longer than this for a permit and the queue delay gets logged.
const QUEUE_WAIT_WARN: Duration = Duration::from_secs(1);

/// Semaphore-per-provider rate limiter. Callers hold the returned
/// permit for the duration of the outbound call; excess calls queue on
/// the semaphore.
pub struct RateLimiter {
    limits: RateLimitsConfig,
    semaphores: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl RateLimiter {
    pub fn new(limits: RateLimitsConfig) -> Self {
        Self {
            limits,
            semaphores: Mutex::new(HashMap::new()),
        }
    }

    fn semaphore(&self, provider: &str) -> Arc<Semaphore> {
        let mut semaphores = match self.semaphores.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        semaphores
            .entry(provider.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(self.limits.limit_for(provider))))
            .clone()
    }

    /// Acquire a slot for `provider`, waiting while the provider is at
    /// its concurrency cap.
    pub async fn acquire(&self, provider: &str) -> OwnedSemaphorePermit {
        let semaphore = self.semaphore(provider);
        let started = Instant::now();
        // The semaphore is never closed, so acquisition only fails on
        // shutdown paths that have already dropped the limiter.
        let permit = match semaphore.acquire_owned().await {
            Ok(permit) => permit,
            Err(_closed) => unreachable!("rate limiter semaphores are never closed"),
        };
        let waited = started.elapsed();
        if waited > QUEUE_WAIT_WARN {
            warn!(
                "model call queued {:.1}s waiting for `{provider}` slot",
                waited.as_secs_f64()
            );
        }
        permit
    }
}

/// Provider segment of a model id (`openai/gpt-4o` → `openai`); model
/// ids without a slash map to the default limit bucket.
pub(crate) fn provider_of(model: &str) -> &str {
    model.split_once('/').map_or("default", |(provider, _)| provider)
}
