// SPDX-License-Identifier: MIT OR Apache-2.0
//! Rate-limited gather with retry budgets.
//!
//! [`gather_limited`] runs a list of task factories under a concurrency
//! semaphore and a leaky-bucket rate limiter, retrying retriable failures
//! with backoff. Results are returned in input order regardless of
//! completion order. Cancellation is cooperative: dropping the returned
//! future cancels in-flight attempts and backoff sleeps.
//!
//! Task factories (`Fn() -> Future`) are required rather than bare futures
//! so every retry attempt gets a fresh future; [`gather_limited_futures`]
//! accepts ready-made futures but rejects them when retries are enabled.

use crate::limiter::RateLimiter;
use crate::progress::{ProgressTracker, TaskState};
use crate::retry::{calculate_backoff, RetryExhausted, RetrySettings};
use anyhow::anyhow;
use futures::future::join_all;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{debug, error, warn};

/// Default concurrency bound.
pub const DEFAULT_MAX_CONCURRENT: usize = 5;
/// Default request rate per second.
pub const DEFAULT_MAX_RPS: f64 = 5.0;

/// Options for a gather call.
#[derive(Clone)]
pub struct GatherOptions {
    /// Maximum number of concurrently running attempts.
    pub max_concurrent: usize,
    /// Maximum attempts started per second (0 disables rate limiting).
    pub max_rps: f64,
    /// Retry configuration.
    pub retry: RetrySettings,
    /// Optional progress tracker.
    pub tracker: Option<Arc<dyn ProgressTracker>>,
    /// Optional labeler: maps a task index to a display label.
    pub labeler: Option<Arc<dyn Fn(usize) -> String + Send + Sync>>,
}

impl Default for GatherOptions {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            max_rps: DEFAULT_MAX_RPS,
            retry: RetrySettings::default(),
            tracker: None,
            labeler: None,
        }
    }
}

impl GatherOptions {
    /// Options with retries disabled.
    #[must_use]
    pub fn no_retries() -> Self {
        Self {
            retry: RetrySettings::no_retries(),
            ..Self::default()
        }
    }

    fn label_for(&self, i: usize) -> String {
        match &self.labeler {
            Some(labeler) => (**labeler)(i),
            None => format!("task:{i}"),
        }
    }
}

/// Shared atomic counter capping total retries across all tasks.
struct RetryCounter {
    max_total: Option<u32>,
    count: AtomicU32,
}

impl RetryCounter {
    fn new(max_total: Option<u32>) -> Self {
        Self {
            max_total,
            count: AtomicU32::new(0),
        }
    }

    /// Increment if the global budget allows; false when exhausted.
    fn try_increment(&self) -> bool {
        match self.max_total {
            None => true,
            Some(max) => self
                .count
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |c| {
                    (c < max).then_some(c + 1)
                })
                .is_ok(),
        }
    }
}

/// Run task factories under concurrency and rate limits, retrying
/// retriable failures. Returns one result per input, in input order.
pub async fn gather_limited<T, F, Fut>(specs: Vec<F>, options: &GatherOptions) -> Vec<anyhow::Result<T>>
where
    F: Fn() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    if specs.is_empty() {
        return Vec::new();
    }

    debug!(
        target: "kash.gather",
        tasks = specs.len(),
        max_concurrent = options.max_concurrent,
        max_rps = options.max_rps,
        retry = ?options.retry,
        "gathering"
    );

    let semaphore = Semaphore::new(options.max_concurrent.max(1));
    let limiter = RateLimiter::new(options.max_rps);
    let counter = RetryCounter::new(options.retry.max_total_retries);

    let tasks = specs.iter().enumerate().map(|(i, spec)| {
        run_one(i, spec, options, &semaphore, &limiter, &counter)
    });
    join_all(tasks).await
}

/// Like [`gather_limited`], but propagates the first failure in input order
/// instead of returning per-task results.
pub async fn try_gather_limited<T, F, Fut>(
    specs: Vec<F>,
    options: &GatherOptions,
) -> anyhow::Result<Vec<T>>
where
    F: Fn() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let mut out = Vec::with_capacity(specs.len());
    for result in gather_limited(specs, options).await {
        out.push(result?);
    }
    Ok(out)
}

/// Gather ready-made futures. Disallowed when retries are enabled, because
/// a retry needs a fresh future per attempt; this is a validated input
/// error, not best-effort.
pub async fn gather_limited_futures<T, Fut>(
    futures: Vec<Fut>,
    options: &GatherOptions,
) -> anyhow::Result<Vec<anyhow::Result<T>>>
where
    Fut: Future<Output = anyhow::Result<T>>,
{
    if options.retry.max_task_retries > 0 {
        return Err(anyhow!(
            "futures cannot be retried; pass task factories when retries are enabled \
             (max_task_retries > 0)"
        ));
    }
    if futures.is_empty() {
        return Ok(Vec::new());
    }

    let semaphore = Semaphore::new(options.max_concurrent.max(1));
    let limiter = RateLimiter::new(options.max_rps);

    let tasks = futures.into_iter().map(|fut| {
        let semaphore = &semaphore;
        let limiter = &limiter;
        async move {
            let _permit = semaphore.acquire().await.map_err(|e| anyhow!("semaphore closed: {e}"))?;
            limiter.acquire().await;
            fut.await
        }
    });
    Ok(join_all(tasks).await)
}

/// Run blocking closures on worker threads under the same limits and retry
/// logic. The closure type guarantees a plain value is returned (the
/// async analogue's misuse of passing a future here does not typecheck).
pub async fn gather_limited_sync<T, F>(
    specs: Vec<F>,
    options: &GatherOptions,
) -> Vec<anyhow::Result<T>>
where
    F: Fn() -> anyhow::Result<T> + Send + Sync + 'static,
    T: Send + 'static,
{
    let specs: Vec<Arc<F>> = specs.into_iter().map(Arc::new).collect();
    let factories: Vec<_> = specs
        .iter()
        .map(|spec| {
            let spec = Arc::clone(spec);
            move || {
                let spec = Arc::clone(&spec);
                async move {
                    tokio::task::spawn_blocking(move || (*spec)())
                        .await
                        .map_err(|e| anyhow!("worker thread panicked: {e}"))?
                }
            }
        })
        .collect();
    gather_limited(factories, options).await
}

async fn run_one<T, F, Fut>(
    i: usize,
    spec: &F,
    options: &GatherOptions,
    semaphore: &Semaphore,
    limiter: &RateLimiter,
    counter: &RetryCounter,
) -> anyhow::Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let tracker = options.tracker.as_deref();
    let task_id = match tracker {
        Some(t) => Some(t.add(&options.label_for(i)).await),
        None => None,
    };

    let result = attempt_loop(spec, options, semaphore, limiter, counter, tracker, task_id).await;

    if let (Some(t), Some(id)) = (tracker, task_id) {
        match &result {
            Ok(_) => t.finish(id, TaskState::Completed, None).await,
            Err(e) => t.finish(id, TaskState::Failed, Some(&e.to_string())).await,
        }
    }
    result
}

#[allow(clippy::too_many_arguments)]
async fn attempt_loop<T, F, Fut>(
    spec: &F,
    options: &GatherOptions,
    semaphore: &Semaphore,
    limiter: &RateLimiter,
    counter: &RetryCounter,
    tracker: Option<&dyn ProgressTracker>,
    task_id: Option<u64>,
) -> anyhow::Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let retry = &options.retry;
    let start = Instant::now();
    let mut last_err: Option<anyhow::Error> = None;

    for attempt in 0..=retry.max_task_retries {
        if attempt > 0 {
            let err = last_err.take().unwrap_or_else(|| anyhow!("retry without error"));

            // Global budget: when exhausted, the most recent error is
            // raised as-is, not wrapped.
            if !counter.try_increment() {
                error!(
                    target: "kash.gather",
                    limit = ?counter.max_total,
                    error = %err,
                    "global retry limit reached, not retrying"
                );
                return Err(err);
            }

            let backoff = calculate_backoff(attempt, &err, retry);
            let suppress = tracker.is_some_and(|t| t.suppress_logs());
            if let (Some(t), Some(id)) = (tracker, task_id) {
                let retry_info = format!(
                    "attempt {attempt}/{} (waiting {:.1}s): {err}",
                    retry.max_task_retries,
                    backoff.as_secs_f64()
                );
                t.update(id, None, None, Some(&retry_info)).await;
            }
            if suppress {
                debug!(
                    target: "kash.gather",
                    attempt,
                    total = counter.count.load(Ordering::Relaxed),
                    backoff_ms = backoff.as_millis() as u64,
                    "retriable error, backing off"
                );
            } else {
                warn!(
                    target: "kash.gather",
                    attempt,
                    total = counter.count.load(Ordering::Relaxed),
                    backoff_ms = backoff.as_millis() as u64,
                    error = %err,
                    "retriable error, backing off"
                );
            }
            tokio::time::sleep(backoff).await;
        }

        // Acquire the semaphore and rate limit right before the call.
        let permit = match semaphore.acquire().await {
            Ok(p) => p,
            Err(e) => return Err(anyhow!("semaphore closed: {e}")),
        };
        limiter.acquire().await;
        let result = spec().await;
        drop(permit);

        match result {
            Ok(v) => return Ok(v),
            Err(e) => {
                if attempt == retry.max_task_retries {
                    if retry.max_task_retries == 0 {
                        // No retries configured: raise the original directly.
                        return Err(e);
                    }
                    let elapsed = start.elapsed();
                    error!(
                        target: "kash.gather",
                        attempts = retry.max_task_retries,
                        elapsed_ms = elapsed.as_millis() as u64,
                        error = %e,
                        "retry budget exhausted"
                    );
                    return Err(anyhow::Error::new(RetryExhausted {
                        original: e,
                        attempts: retry.max_task_retries,
                        elapsed,
                    }));
                }
                if (retry.is_retriable)(&e) {
                    last_err = Some(e);
                    continue;
                }
                warn!(target: "kash.gather", error = %e, "non-retriable error, not retrying");
                return Err(e);
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow!("no attempts were made")))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
