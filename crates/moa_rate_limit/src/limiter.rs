//! Token-bucket admission gate built on governor and Tokio primitives.
//!
//! Each [`TokenBucketLimiter`] enforces three constraints at once:
//! - **Concurrency**: a Tokio `Semaphore` bounds the number of running tasks
//! - **Spacing**: a governor GCRA limiter with a burst of one keeps successive
//!   dispatches at least `min_time_ms` apart. It reads the Tokio clock, so
//!   spacing and reservoir refills share one notion of time
//! - **Reservoir**: a burst budget decremented on every dispatch and topped up
//!   by `reservoir_refresh_amount` every `reservoir_refresh_interval_ms`
//!
//! Waiters pass through a fair async mutex (the turnstile) one at a time, so
//! admission is strictly FIFO: the head of the queue holds the turnstile until
//! every constraint is satisfied, and everyone behind it waits their turn.
//!
//! A limiter can be chained behind a parent. Admission is then two-phase: the
//! local gate opens first, then the parent's, and only then does the task run.

use crate::{LimiterConfig, RateLimitConfig};
use governor::clock::Clock;
use governor::middleware::NoOpMiddleware;
use governor::nanos::Nanos;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter as GovernorRateLimiter};
use moa_error::{RateLimitError, RateLimitErrorKind, RateLimitResult};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tracing::{debug, trace};

// Type alias for our direct rate limiter
type DirectRateLimiter =
    GovernorRateLimiter<NotKeyed, InMemoryState, TokioClock, NoOpMiddleware<Nanos>>;

/// Governor time source backed by `tokio::time`, measured from limiter creation.
#[derive(Debug, Clone, Copy)]
struct TokioClock {
    origin: Instant,
}

impl Clock for TokioClock {
    type Instant = Nanos;

    fn now(&self) -> Nanos {
        Nanos::from(self.origin.elapsed())
    }
}

/// Minimum spacing between dispatches.
struct Spacing {
    gate: DirectRateLimiter,
    clock: TokioClock,
}

impl std::fmt::Debug for Spacing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Spacing")
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl Spacing {
    fn new(period: Duration, origin: Instant) -> Option<Self> {
        let clock = TokioClock { origin };
        Quota::with_period(period).map(|quota| Self {
            gate: GovernorRateLimiter::direct_with_clock(quota, clock),
            clock,
        })
    }

    /// Wait until the gate lets one dispatch through.
    async fn until_ready(&self) {
        while let Err(not_until) = self.gate.check() {
            tokio::time::sleep(not_until.wait_time_from(self.clock.now())).await;
        }
    }
}

/// Point-in-time counters for one limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct LimiterStats {
    /// Tasks waiting for admission
    pub queued: usize,
    /// Tasks admitted and not yet released
    pub running: usize,
    /// Dispatches the reservoir can still cover right now
    pub reservoir_remaining: u32,
}

/// Burst budget with lazy periodic refill.
#[derive(Debug)]
struct Reservoir {
    available: u32,
    capacity: u32,
    refill_amount: u32,
    interval: Option<Duration>,
    anchor: Instant,
}

impl Reservoir {
    fn new(config: &LimiterConfig, now: Instant) -> Self {
        Self {
            available: config.reservoir,
            capacity: config.reservoir,
            refill_amount: config.reservoir_refresh_amount,
            interval: config.refresh_interval(),
            anchor: now,
        }
    }

    fn periods_elapsed(&self, now: Instant) -> u32 {
        let Some(interval) = self.interval else {
            return 0;
        };
        let elapsed = now.saturating_duration_since(self.anchor);
        (elapsed.as_millis() / interval.as_millis()).min(u32::MAX as u128) as u32
    }

    fn after_periods(&self, periods: u32) -> u32 {
        self.available
            .saturating_add(self.refill_amount.saturating_mul(periods))
            .min(self.capacity)
    }

    fn refill(&mut self, now: Instant) {
        let periods = self.periods_elapsed(now);
        if periods == 0 {
            return;
        }
        self.available = self.after_periods(periods);
        if let Some(interval) = self.interval {
            self.anchor += interval * periods;
        }
    }

    /// Available tokens at `now` without mutating the refill anchor.
    fn peek(&self, now: Instant) -> u32 {
        self.after_periods(self.periods_elapsed(now))
    }

    fn next_refill(&self) -> Option<Instant> {
        self.interval.map(|interval| self.anchor + interval)
    }
}

/// Decrements the queued counter when a waiter leaves the queue, admitted or not.
struct QueueTicket<'a>(&'a AtomicUsize);

impl<'a> QueueTicket<'a> {
    fn enter(queued: &'a AtomicUsize) -> Self {
        queued.fetch_add(1, Ordering::SeqCst);
        Self(queued)
    }
}

impl Drop for QueueTicket<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// One limiter's share of a permit.
struct Admission {
    running: Arc<AtomicUsize>,
    _slot: OwnedSemaphorePermit,
}

impl Drop for Admission {
    fn drop(&mut self) {
        self.running.fetch_sub(1, Ordering::SeqCst);
    }
}

/// RAII guard for an admitted task.
///
/// Holds a running slot in the limiter and in every limiter it is chained
/// behind. Dropping the guard, including on panic or cancellation, releases
/// all of them.
pub struct LimiterPermit {
    admissions: Vec<Admission>,
}

impl std::fmt::Debug for LimiterPermit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LimiterPermit")
            .field("gates", &self.admissions.len())
            .finish()
    }
}

/// A single token-bucket admission gate, optionally chained behind a parent.
///
/// # Example
///
/// ```rust,ignore
/// use moa_rate_limit::{LimiterConfig, TokenBucketLimiter};
///
/// let limiter = TokenBucketLimiter::new("semrush", LimiterConfig::global_default())?;
///
/// let body = limiter.schedule(|| async { fetch_keywords().await }).await?;
/// ```
pub struct TokenBucketLimiter {
    name: String,
    config: LimiterConfig,

    // FIFO admission order
    turnstile: tokio::sync::Mutex<()>,

    // Concurrent task slots
    slots: Arc<Semaphore>,

    // Minimum dispatch spacing
    spacing: Option<Spacing>,

    reservoir: Mutex<Reservoir>,
    queued: AtomicUsize,
    running: Arc<AtomicUsize>,
    parent: Option<Arc<TokenBucketLimiter>>,
}

impl std::fmt::Debug for TokenBucketLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenBucketLimiter")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("chained", &self.parent.is_some())
            .finish_non_exhaustive()
    }
}

impl TokenBucketLimiter {
    /// Create a standalone limiter.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the configuration could never admit a task.
    pub fn new(name: impl Into<String>, config: LimiterConfig) -> RateLimitResult<Self> {
        let name = name.into();
        config.validate(&name)?;
        Ok(Self::build(name, config, None))
    }

    /// Create a limiter whose tasks must also clear `parent` before running.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the configuration could never admit a task.
    pub fn chained(
        name: impl Into<String>,
        config: LimiterConfig,
        parent: Arc<TokenBucketLimiter>,
    ) -> RateLimitResult<Self> {
        let name = name.into();
        config.validate(&name)?;
        Ok(Self::build(name, config, Some(parent)))
    }

    /// Assemble a limiter from an already-validated configuration.
    pub(crate) fn build(
        name: String,
        config: LimiterConfig,
        parent: Option<Arc<TokenBucketLimiter>>,
    ) -> Self {
        let created = Instant::now();
        let spacing = config
            .min_time()
            .and_then(|period| Spacing::new(period, created));

        debug!(
            limiter = %name,
            max_concurrent = config.max_concurrent,
            min_time_ms = config.min_time_ms,
            reservoir = config.reservoir,
            chained = parent.is_some(),
            "Creating token bucket limiter"
        );

        Self {
            slots: Arc::new(Semaphore::new(config.max_concurrent as usize)),
            reservoir: Mutex::new(Reservoir::new(&config, created)),
            turnstile: tokio::sync::Mutex::new(()),
            queued: AtomicUsize::new(0),
            running: Arc::new(AtomicUsize::new(0)),
            spacing,
            config,
            name,
            parent,
        }
    }

    /// Limiter name (provider name, or `global`).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The configuration this limiter enforces.
    pub fn config(&self) -> &LimiterConfig {
        &self.config
    }

    /// The limiter this one is chained behind, if any.
    pub fn parent(&self) -> Option<&Arc<TokenBucketLimiter>> {
        self.parent.as_ref()
    }

    /// Current counters. Reading them never changes limiter state.
    pub fn stats(&self) -> LimiterStats {
        LimiterStats {
            queued: self.queued.load(Ordering::SeqCst),
            running: self.running.load(Ordering::SeqCst),
            reservoir_remaining: self.lock_reservoir().peek(Instant::now()),
        }
    }

    /// Wait for admission through this limiter and every parent.
    ///
    /// Returns a guard that releases the running slots when dropped. Dropping
    /// the returned future before it resolves withdraws the request without
    /// consuming reservoir.
    ///
    /// # Errors
    ///
    /// Returns `Depleted` if a reservoir is empty and never refills.
    pub async fn acquire(&self) -> RateLimitResult<LimiterPermit> {
        let mut permit = LimiterPermit {
            admissions: Vec::with_capacity(2),
        };
        permit.admissions.push(self.admit().await?);

        let mut next = self.parent.as_deref();
        while let Some(limiter) = next {
            permit.admissions.push(limiter.admit().await?);
            next = limiter.parent.as_deref();
        }

        Ok(permit)
    }

    /// Run `task` once admitted, releasing its slots when it completes.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let response = limiter.schedule(|| client.get(url).send()).await?;
    /// ```
    pub async fn schedule<F, Fut, T>(&self, task: F) -> RateLimitResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _permit = self.acquire().await?;
        Ok(task().await)
    }

    /// Admission through this gate only.
    async fn admit(&self) -> RateLimitResult<Admission> {
        let ticket = QueueTicket::enter(&self.queued);

        let slot = {
            let _turn = self.turnstile.lock().await;
            trace!(limiter = %self.name, "At head of admission queue");

            let slot = Arc::clone(&self.slots)
                .acquire_owned()
                .await
                .map_err(|_| RateLimitError::new(RateLimitErrorKind::Closed(self.name.clone())))?;

            self.wait_for_reservoir().await?;

            if let Some(spacing) = &self.spacing {
                spacing.until_ready().await;
            }

            self.consume_token();
            slot
        };
        drop(ticket);

        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        trace!(limiter = %self.name, running, "Admitted");

        Ok(Admission {
            running: Arc::clone(&self.running),
            _slot: slot,
        })
    }

    async fn wait_for_reservoir(&self) -> RateLimitResult<()> {
        loop {
            let next_refill = {
                let mut reservoir = self.lock_reservoir();
                reservoir.refill(Instant::now());
                if reservoir.available > 0 {
                    return Ok(());
                }
                reservoir.next_refill()
            };

            let Some(at) = next_refill else {
                return Err(RateLimitError::new(RateLimitErrorKind::Depleted(
                    self.name.clone(),
                )));
            };

            debug!(limiter = %self.name, "Reservoir empty, waiting for refill");
            tokio::time::sleep_until(at).await;
        }
    }

    fn consume_token(&self) {
        let mut reservoir = self.lock_reservoir();
        reservoir.refill(Instant::now());
        reservoir.available = reservoir.available.saturating_sub(1);
    }

    fn lock_reservoir(&self) -> MutexGuard<'_, Reservoir> {
        self.reservoir.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Build the global gate for a configuration that has already been validated.
pub(crate) fn global_limiter(config: &RateLimitConfig) -> Arc<TokenBucketLimiter> {
    Arc::new(TokenBucketLimiter::build(
        "global".to_string(),
        config.global,
        None,
    ))
}
