//! Token-bucket admission control with priority-aware waiters.
//!
//! Each RPC provider owns one bucket sized to its documented rps. Callers
//! suspend in `acquire` until a token is available; waiters are held in
//! per-priority FIFO queues and a higher band always drains first. The
//! bucket never releases more than one waiter per token, and
//! `available_tokens` exposes the fractional fill level so the provider
//! manager can pick the endpoint with the most headroom.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::time::{sleep_until, Duration, Instant};

/// Admission priority; `High` is reserved for transaction sends so exit
/// paths are never starved behind bulk reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Low = 0,
    Normal = 1,
    High = 2,
}

const PRIORITY_BANDS: usize = 3;

struct BucketInner {
    tokens: f64,
    last_refill: Instant,
    /// One FIFO queue per band, indexed by `Priority as usize`
    queues: [VecDeque<oneshot::Sender<()>>; PRIORITY_BANDS],
    drip_scheduled: bool,
}

impl BucketInner {
    fn waiting(&self) -> usize {
        self.queues.iter().map(VecDeque::len).sum()
    }

    /// Pop the next waiter, highest band first, FIFO inside a band
    fn pop_waiter(&mut self) -> Option<oneshot::Sender<()>> {
        for band in (0..PRIORITY_BANDS).rev() {
            if let Some(tx) = self.queues[band].pop_front() {
                return Some(tx);
            }
        }
        None
    }
}

/// Token bucket with refill rate == capacity-per-second `rps` and a small
/// configurable burst ceiling.
#[derive(Clone)]
pub struct TokenBucket {
    inner: Arc<Mutex<BucketInner>>,
    rps: f64,
    capacity: f64,
}

impl TokenBucket {
    pub fn new(rps: u32, burst: u32) -> Self {
        let rps = rps.max(1) as f64;
        // Burst stays small so callers cannot spike past the provider limit.
        let capacity = burst.clamp(1, 2) as f64;
        Self {
            inner: Arc::new(Mutex::new(BucketInner {
                tokens: capacity,
                last_refill: Instant::now(),
                queues: Default::default(),
                drip_scheduled: false,
            })),
            rps,
            capacity,
        }
    }

    /// Suspend until one token has been granted to this caller.
    pub async fn acquire(&self, priority: Priority) {
        let rx = {
            let mut inner = self.inner.lock();
            refill(&mut inner, self.rps, self.capacity);
            if inner.tokens >= 1.0 && inner.waiting() == 0 {
                inner.tokens -= 1.0;
                None
            } else {
                let (tx, rx) = oneshot::channel();
                inner.queues[priority as usize].push_back(tx);
                drain(&mut inner);
                self.schedule_drip(&mut inner);
                Some(rx)
            }
        };

        if let Some(rx) = rx {
            // The sender is dropped only if the bucket itself is dropped;
            // in that case there is nothing left to rate-limit.
            let _ = rx.await;
        }
    }

    /// Real-valued token count after refill; used for capacity-aware
    /// provider selection.
    pub fn available_tokens(&self) -> f64 {
        let mut inner = self.inner.lock();
        refill(&mut inner, self.rps, self.capacity);
        inner.tokens
    }

    pub fn waiting(&self) -> usize {
        self.inner.lock().waiting()
    }

    /// Arrange a wake-up at the next whole-token instant while waiters
    /// remain. At most one drip task is in flight per bucket.
    fn schedule_drip(&self, inner: &mut BucketInner) {
        if inner.drip_scheduled || inner.waiting() == 0 {
            return;
        }
        inner.drip_scheduled = true;

        let deficit = (1.0 - inner.tokens).max(0.0);
        let wait = Duration::from_secs_f64(deficit / self.rps);
        let wake_at = Instant::now() + wait;

        let bucket = self.clone();
        tokio::spawn(async move {
            sleep_until(wake_at).await;
            let mut inner = bucket.inner.lock();
            inner.drip_scheduled = false;
            refill(&mut inner, bucket.rps, bucket.capacity);
            drain(&mut inner);
            bucket.schedule_drip(&mut inner);
        });
    }
}

fn refill(inner: &mut BucketInner, rps: f64, capacity: f64) {
    let now = Instant::now();
    let elapsed = now.duration_since(inner.last_refill).as_secs_f64();
    if elapsed > 0.0 {
        inner.tokens = (inner.tokens + elapsed * rps).min(capacity);
        inner.last_refill = now;
    }
}

/// Hand whole tokens to queued waiters, one waiter per token. A waiter
/// whose receiver is gone refunds its token.
fn drain(inner: &mut BucketInner) {
    while inner.tokens >= 1.0 {
        let Some(tx) = inner.pop_waiter() else {
            break;
        };
        inner.tokens -= 1.0;
        if tx.send(()).is_err() {
            inner.tokens += 1.0;
        }
    }
}
