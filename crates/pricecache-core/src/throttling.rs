//! FIFO request queue that spaces upstream calls by a fixed minimum delay.
//!
//! A single worker task drains the queue, so calls run strictly one at a time
//! in enqueue order and no two start closer together than
//! [`ThrottleConfig::min_delay`]. Failed or panicking requests are reported to
//! their caller and never stall the queue. Queued requests cannot be
//! cancelled; dropping the returned future only discards the outcome.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// Delay that keeps a 5 requests/minute free tier within quota.
pub const DEFAULT_MIN_DELAY: Duration = Duration::from_secs(12);

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;
type Job = Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send>;

/// Queue spacing configuration, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleConfig {
    pub min_delay: Duration,
}

impl ThrottleConfig {
    pub const fn new(min_delay: Duration) -> Self {
        Self { min_delay }
    }
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_DELAY)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("request queue worker has stopped")]
    Closed,
    #[error("queued request panicked")]
    RequestPanicked,
}

/// Handle to the shared request queue. Clones feed the same worker.
#[derive(Clone)]
pub struct RequestQueue {
    sender: mpsc::UnboundedSender<Job>,
    pending: Arc<AtomicUsize>,
    config: ThrottleConfig,
}

impl RequestQueue {
    /// Spawn the drain worker on the current tokio runtime.
    ///
    /// # Panics
    /// Panics when called outside a tokio runtime.
    pub fn new(config: ThrottleConfig) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(0));

        tokio::spawn(drain(
            receiver,
            spacing_limiter(config.min_delay),
            Arc::clone(&pending),
        ));

        Self {
            sender,
            pending,
            config,
        }
    }

    pub const fn config(&self) -> ThrottleConfig {
        self.config
    }

    /// Number of requests waiting for their turn, excluding the one running.
    pub fn pending_len(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Append `request` to the queue and resolve with its output once it has run.
    ///
    /// The request is queued when this method is called, not when the returned
    /// future is first polled.
    pub fn enqueue<F, Fut, T>(
        &self,
        request: F,
    ) -> impl Future<Output = Result<T, QueueError>> + Send + 'static
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let job: Job = Box::new(move || -> Pin<Box<dyn Future<Output = ()> + Send>> {
            Box::pin(async move {
                let outcome = AssertUnwindSafe(async move { request().await })
                    .catch_unwind()
                    .await
                    .map_err(|_| QueueError::RequestPanicked);
                if outcome.is_err() {
                    warn!("queued request panicked");
                }
                // The caller may have stopped waiting.
                let _ = outcome_tx.send(outcome);
            })
        });

        self.pending.fetch_add(1, Ordering::SeqCst);
        let queued = match self.sender.send(job) {
            Ok(()) => true,
            Err(_) => {
                self.pending.fetch_sub(1, Ordering::SeqCst);
                false
            }
        };

        async move {
            if !queued {
                return Err(QueueError::Closed);
            }
            outcome_rx.await.map_err(|_| QueueError::Closed)?
        }
    }
}

async fn drain(
    mut receiver: mpsc::UnboundedReceiver<Job>,
    limiter: Option<DirectRateLimiter>,
    pending: Arc<AtomicUsize>,
) {
    while let Some(job) = receiver.recv().await {
        if let Some(limiter) = &limiter {
            limiter.until_ready().await;
        }
        let remaining = pending.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        debug!(pending = remaining, "dispatching queued request");
        job().await;
    }
    debug!("request queue closed");
}

fn spacing_limiter(min_delay: Duration) -> Option<DirectRateLimiter> {
    // Burst of one: each permit becomes available `min_delay` after the last.
    Quota::with_period(min_delay).map(RateLimiter::direct)
}
