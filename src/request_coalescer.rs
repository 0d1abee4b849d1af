//! Single-flight deduplication for upstream RPC reads.
//!
//! The first caller for a key becomes the leader and runs the supplied
//! future; everyone else arriving before it completes attaches to the
//! same outcome. The registration is removed before the result is
//! broadcast, so a caller arriving after completion starts a fresh
//! request. Errors are shared as strings because the underlying error
//! types are not cloneable across waiters.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::broadcast;

type InFlightMap<V> = HashMap<String, broadcast::Sender<Result<V, String>>>;

pub struct RequestCoalescer<V: Clone> {
    in_flight: Arc<Mutex<InFlightMap<V>>>,
}

impl<V: Clone> Default for RequestCoalescer<V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Clears the in-flight registration even if the leader is cancelled
/// mid-future, so a dropped leader cannot wedge the key forever.
struct RegistrationGuard<V: Clone> {
    map: Arc<Mutex<InFlightMap<V>>>,
    key: String,
    armed: bool,
}

impl<V: Clone> Drop for RegistrationGuard<V> {
    fn drop(&mut self) {
        if self.armed {
            self.map.lock().remove(&self.key);
        }
    }
}

impl<V: Clone> RequestCoalescer<V> {
    pub fn new() -> Self {
        Self {
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Run `f` once per key; concurrent callers share the outcome.
    pub async fn dedupe<F, Fut>(&self, key: &str, f: F) -> Result<V, String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, String>>,
    {
        let mut rx = {
            let mut map = self.in_flight.lock();
            if let Some(tx) = map.get(key) {
                Some(tx.subscribe())
            } else {
                let (tx, _) = broadcast::channel(1);
                map.insert(key.to_string(), tx);
                None
            }
        };

        if let Some(rx) = rx.as_mut() {
            return match rx.recv().await {
                Ok(result) => result,
                // Leader dropped without broadcasting (cancelled); report
                // it so the caller can retry with a fresh request.
                Err(_) => Err("coalesced request was cancelled".to_string()),
            };
        }

        let mut guard = RegistrationGuard {
            map: self.in_flight.clone(),
            key: key.to_string(),
            armed: true,
        };

        let result = f().await;

        // Remove the registration before publishing so late arrivals
        // cannot subscribe to an already-finished flight.
        let tx = self.in_flight.lock().remove(&guard.key);
        guard.armed = false;
        if let Some(tx) = tx {
            let _ = tx.send(result.clone());
        }
        result
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().len()
    }
}
