//! Request coalescing keyed by an opaque key
//!
//! While a computation for a key is in flight, later callers with the same key
//! await that computation instead of starting their own. An entry exists only
//! while it has waiters: once the computation completes and every waiter has
//! taken the result, the entry is gone and the next call computes afresh.
//! This is not a TTL cache.
//!
//! An optional accept predicate decides whether a completed result may still be
//! handed to callers that arrive before the last waiter has collected it. A
//! rejected result is delivered to the callers that were already waiting, and
//! the entry is dropped at completion so nobody new can join it.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Weak};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Cooperative cancellation signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Operation cancelled")]
pub struct Cancelled;

struct Flight<V> {
    id: u64,
    future: Shared<BoxFuture<'static, V>>,
    waiters: usize,
}

struct FlightTable<K, V> {
    next_id: u64,
    flights: HashMap<K, Flight<V>>,
}

impl<K: Eq + Hash, V> FlightTable<K, V> {
    /// Register one more waiter on the flight for `key`, if any
    fn join(&mut self, key: &K) -> Option<(u64, Shared<BoxFuture<'static, V>>)> {
        let flight = self.flights.get_mut(key)?;
        flight.waiters += 1;
        Some((flight.id, flight.future.clone()))
    }
}

pub struct SingleFlight<K, V> {
    table: Arc<Mutex<FlightTable<K, V>>>,
}

impl<K, V> Default for SingleFlight<K, V> {
    fn default() -> Self {
        Self {
            table: Arc::new(Mutex::new(FlightTable {
                next_id: 0,
                flights: HashMap::new(),
            })),
        }
    }
}

impl<K, V> SingleFlight<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys with a computation currently in flight
    pub fn in_flight(&self) -> usize {
        self.table.lock().flights.len()
    }

    /// Join the in-flight computation for `key`, or start one with `compute`
    pub async fn get_or_add<F, Fut>(
        &self,
        key: K,
        compute: F,
        cancel: &CancellationToken,
    ) -> Result<V, Cancelled>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V> + Send + 'static,
    {
        self.get_or_add_with(key, compute, |_: &V| true, cancel).await
    }

    /// Like [`get_or_add`](Self::get_or_add), with a predicate deciding whether
    /// the completed result may be shared beyond the callers already waiting
    pub async fn get_or_add_with<F, Fut, A>(
        &self,
        key: K,
        compute: F,
        accept: A,
        cancel: &CancellationToken,
    ) -> Result<V, Cancelled>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V> + Send + 'static,
        A: Fn(&V) -> bool + Send + 'static,
    {
        if cancel.is_cancelled() {
            return Err(Cancelled);
        }

        let joined = self.table.lock().join(&key);
        let (id, future) = match joined {
            Some(joined) => joined,
            None => {
                // Built without the lock so `compute` may call back into this table
                let computation = compute();
                let mut table = self.table.lock();
                match table.join(&key) {
                    Some(joined) => joined,
                    None => {
                        let id = table.next_id;
                        table.next_id += 1;
                        let future = Self::start(
                            Arc::downgrade(&self.table),
                            key.clone(),
                            id,
                            computation,
                            accept,
                        );
                        table.flights.insert(
                            key.clone(),
                            Flight {
                                id,
                                future: future.clone(),
                                waiters: 1,
                            },
                        );
                        (id, future)
                    }
                }
            }
        };

        let _waiter = WaiterGuard {
            table: &*self.table,
            key: &key,
            id,
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Cancelled),
            value = future => Ok(value),
        }
    }

    fn start<Fut, A>(
        table: Weak<Mutex<FlightTable<K, V>>>,
        key: K,
        id: u64,
        computation: Fut,
        accept: A,
    ) -> Shared<BoxFuture<'static, V>>
    where
        Fut: Future<Output = V> + Send + 'static,
        A: Fn(&V) -> bool + Send + 'static,
    {
        async move {
            let value = computation.await;
            if !accept(&value) {
                if let Some(table) = table.upgrade() {
                    remove_flight(&table, &key, id);
                }
            }
            value
        }
        .boxed()
        .shared()
    }
}

fn remove_flight<K: Eq + Hash, V>(table: &Mutex<FlightTable<K, V>>, key: &K, id: u64) {
    let mut table = table.lock();
    if table.flights.get(key).is_some_and(|f| f.id == id) {
        table.flights.remove(key);
    }
}

/// Drops the entry once its last waiter is gone, whether it finished or gave up
struct WaiterGuard<'a, K: Eq + Hash, V> {
    table: &'a Mutex<FlightTable<K, V>>,
    key: &'a K,
    id: u64,
}

impl<K: Eq + Hash, V> Drop for WaiterGuard<'_, K, V> {
    fn drop(&mut self) {
        let mut table = self.table.lock();
        let Some(flight) = table.flights.get_mut(self.key) else {
            return;
        };
        if flight.id != self.id {
            return;
        }
        flight.waiters -= 1;
        if flight.waiters == 0 {
            table.flights.remove(self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use futures::future::join_all;

    fn slow_counter(
        calls: &Arc<AtomicUsize>,
        delay: Duration,
    ) -> impl FnOnce() -> BoxFuture<'static, usize> + use<> {
        let calls = Arc::clone(calls);
        move || {
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                tokio::time::sleep(delay).await;
                n
            }
            .boxed()
        }
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_computation() {
        let flight = Arc::new(SingleFlight::<String, usize>::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let tasks = (0..16).map(|_| {
            let flight = Arc::clone(&flight);
            let compute = slow_counter(&calls, Duration::from_millis(100));
            tokio::spawn(async move {
                flight
                    .get_or_add("key".to_string(), compute, &CancellationToken::new())
                    .await
            })
        });

        let results: Vec<usize> = join_all(tasks)
            .await
            .into_iter()
            .map(|r| r.unwrap().unwrap())
            .collect();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|r| *r == 1));
        assert_eq!(flight.in_flight(), 0);
    }

    #[tokio::test]
    async fn completed_entry_is_not_reused() {
        let flight = SingleFlight::<&'static str, usize>::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let token = CancellationToken::new();

        let first = flight
            .get_or_add("key", slow_counter(&calls, Duration::ZERO), &token)
            .await;
        let second = flight
            .get_or_add("key", slow_counter(&calls, Duration::ZERO), &token)
            .await;

        assert_eq!(first, Ok(1));
        assert_eq!(second, Ok(2));
        assert_eq!(flight.in_flight(), 0);
    }

    #[tokio::test]
    async fn distinct_keys_compute_independently() {
        let flight = SingleFlight::<u32, usize>::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let token = CancellationToken::new();

        let (a, b) = tokio::join!(
            flight.get_or_add(1, slow_counter(&calls, Duration::from_millis(20)), &token),
            flight.get_or_add(2, slow_counter(&calls, Duration::from_millis(20)), &token),
        );

        assert!(a.is_ok() && b.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn rejected_result_still_reaches_current_waiters() {
        let flight = Arc::new(SingleFlight::<&'static str, usize>::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let token = CancellationToken::new();

        let (a, b) = tokio::join!(
            flight.get_or_add_with(
                "key",
                slow_counter(&calls, Duration::from_millis(50)),
                |_| false,
                &token
            ),
            flight.get_or_add_with(
                "key",
                slow_counter(&calls, Duration::from_millis(50)),
                |_| false,
                &token
            ),
        );

        assert_eq!(a, Ok(1));
        assert_eq!(b, Ok(1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let next = flight
            .get_or_add("key", slow_counter(&calls, Duration::ZERO), &token)
            .await;
        assert_eq!(next, Ok(2));
    }

    #[tokio::test]
    async fn cancelled_waiter_does_not_affect_others() {
        let flight = Arc::new(SingleFlight::<&'static str, usize>::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();

        let waiter = {
            let flight = Arc::clone(&flight);
            let compute = slow_counter(&calls, Duration::from_millis(200));
            tokio::spawn(async move {
                flight
                    .get_or_add("key", compute, &CancellationToken::new())
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let cancelled = {
            let flight = Arc::clone(&flight);
            let compute = slow_counter(&calls, Duration::from_millis(200));
            let cancel = cancel.clone();
            tokio::spawn(async move { flight.get_or_add("key", compute, &cancel).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        assert_eq!(cancelled.await.unwrap(), Err(Cancelled));
        assert_eq!(waiter.await.unwrap(), Ok(1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancellation_before_call_never_computes() {
        let flight = SingleFlight::<&'static str, usize>::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = flight
            .get_or_add("key", slow_counter(&calls, Duration::ZERO), &cancel)
            .await;

        assert_eq!(result, Err(Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(flight.in_flight(), 0);
    }

    #[tokio::test]
    async fn abandoned_entry_is_removed() {
        let flight = SingleFlight::<&'static str, usize>::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();

        let pending =
            flight.get_or_add("key", slow_counter(&calls, Duration::from_secs(60)), &cancel);
        let timed_out = tokio::time::timeout(Duration::from_millis(10), pending).await;

        assert!(timed_out.is_err());
        assert_eq!(flight.in_flight(), 0);
    }

    #[tokio::test]
    async fn compute_may_call_back_into_the_table() {
        let flight = SingleFlight::<&'static str, usize>::new();
        let token = CancellationToken::new();

        let value = flight
            .get_or_add(
                "outer",
                || {
                    let seen = flight.in_flight();
                    async move { seen }
                },
                &token,
            )
            .await
            .unwrap();

        assert_eq!(value, 0);
        assert_eq!(flight.in_flight(), 0);
    }
}
