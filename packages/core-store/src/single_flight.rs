//! Single-flight execution for suspending reads.
//!
//! A [`SingleFlight`] maps keys to in-flight operations. The first `run` for
//! a key spawns the operation; later calls for the same key, while it is
//! still pending, get a handle to that same operation. Settlement removes the
//! key, so the next `run` starts fresh.
//!
//! A [`Flight`] can be polled without blocking (`try_read`) by callers that
//! hand "not ready yet" back to their own scheduler, or awaited (`read`).
//! Both return the settled result on every call once it is available.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;

/// The operation behind a [`Flight`] ended without producing a result,
/// e.g. because its task panicked or the runtime shut down.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("in-flight operation ended without settling")]
pub struct Abandoned;

/// Result of a non-blocking read.
#[derive(Debug)]
pub enum ReadState<T, E> {
    /// Still running. Await the flight, then read again.
    Pending(Flight<T, E>),
    /// Settled; the same result is returned on every read.
    Ready(Result<T, E>),
}

impl<T, E> ReadState<T, E> {
    pub fn is_pending(&self) -> bool {
        matches!(self, ReadState::Pending(_))
    }
}

/// Handle to one shared operation.
#[derive(Debug)]
pub struct Flight<T, E> {
    settled: watch::Receiver<Option<Result<T, E>>>,
}

impl<T, E> Clone for Flight<T, E> {
    fn clone(&self) -> Self {
        Self {
            settled: self.settled.clone(),
        }
    }
}

impl<T, E> Flight<T, E>
where
    T: Clone,
    E: Clone + From<Abandoned>,
{
    /// A flight that has already settled with `result`.
    pub fn ready(result: Result<T, E>) -> Self {
        let (_, settled) = watch::channel(Some(result));
        Self { settled }
    }

    /// Non-blocking read.
    pub fn try_read(&self) -> ReadState<T, E> {
        let settled = self.settled.borrow().clone();
        match settled {
            Some(result) => ReadState::Ready(result),
            None => ReadState::Pending(self.clone()),
        }
    }

    /// Wait for the operation to settle and return its result.
    pub async fn read(&self) -> Result<T, E> {
        let mut settled = self.settled.clone();
        loop {
            if let Some(result) = settled.borrow_and_update().clone() {
                return result;
            }
            if settled.changed().await.is_err() {
                return match settled.borrow().clone() {
                    Some(result) => result,
                    None => Err(E::from(Abandoned)),
                };
            }
        }
    }

    pub fn is_settled(&self) -> bool {
        self.settled.borrow().is_some()
    }
}

type FlightMap<K, T, E> = Arc<Mutex<HashMap<K, Flight<T, E>>>>;

/// Removes a flight's key once it settles, or if its task unwinds first.
struct Landing<K: Eq + Hash, T, E> {
    flights: FlightMap<K, T, E>,
    key: Option<K>,
}

impl<K: Eq + Hash, T, E> Landing<K, T, E> {
    fn settle(&mut self, tx: &watch::Sender<Option<Result<T, E>>>, result: Result<T, E>) {
        let mut flights = self.flights.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(key) = self.key.take() {
            flights.remove(&key);
        }
        tx.send_replace(Some(result));
    }
}

impl<K: Eq + Hash, T, E> Drop for Landing<K, T, E> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.flights
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&key);
        }
    }
}

/// Key-to-operation map giving at most one in-flight operation per key.
///
/// Operations are spawned onto the current Tokio runtime, so `run` must be
/// called from within one.
pub struct SingleFlight<K, T, E> {
    flights: FlightMap<K, T, E>,
}

impl<K, T, E> Default for SingleFlight<K, T, E> {
    fn default() -> Self {
        Self {
            flights: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<K, T, E> SingleFlight<K, T, E>
where
    K: Eq + Hash + Clone + Send + 'static,
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the operation running under `key`, or start one with `make`.
    ///
    /// `make` is only called when no operation for `key` is in flight.
    pub fn run<F, Fut>(&self, key: K, make: F) -> Flight<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let mut flights = self.flights.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(flight) = flights.get(&key) {
            return flight.clone();
        }

        let (tx, rx) = watch::channel(None);
        let flight = Flight { settled: rx };
        flights.insert(key.clone(), flight.clone());

        let operation = make();
        let mut landing = Landing {
            flights: Arc::clone(&self.flights),
            key: Some(key),
        };
        tokio::spawn(async move {
            let result = operation.await;
            landing.settle(&tx, result);
        });

        flight
    }

    /// Number of keys with an operation still running.
    pub fn in_flight(&self) -> usize {
        self.flights
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq)]
    enum TestError {
        Failed(String),
        Abandoned,
    }

    impl From<Abandoned> for TestError {
        fn from(_: Abandoned) -> Self {
            TestError::Abandoned
        }
    }

    type Flights = SingleFlight<String, u32, TestError>;

    #[tokio::test]
    async fn concurrent_reads_share_one_operation() {
        let flights = Flights::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let start = |calls: Arc<AtomicUsize>| {
            flights.run("orders".to_string(), move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok(7)
            })
        };

        let a = start(calls.clone());
        let b = start(calls.clone());
        let c = start(calls.clone());
        assert_eq!(flights.in_flight(), 1);

        assert_eq!(a.read().await, Ok(7));
        assert_eq!(b.read().await, Ok(7));
        assert_eq!(c.read().await, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn try_read_is_pending_then_ready_repeatedly() {
        let flights = Flights::new();
        let flight = flights.run("k".to_string(), || async { Ok(1) });

        let pending = flight.try_read();
        assert!(pending.is_pending());
        if let ReadState::Pending(waiting) = pending {
            assert_eq!(waiting.read().await, Ok(1));
        }

        for _ in 0..3 {
            assert!(matches!(flight.try_read(), ReadState::Ready(Ok(1))));
        }
        assert!(flight.is_settled());
    }

    #[tokio::test]
    async fn failures_are_replayed_to_every_reader() {
        let flights = Flights::new();
        let flight = flights.run("k".to_string(), || async {
            Err(TestError::Failed("boom".to_string()))
        });

        let expected = Err(TestError::Failed("boom".to_string()));
        assert_eq!(flight.read().await, expected);
        assert_eq!(flight.read().await, expected);
        assert!(matches!(flight.try_read(), ReadState::Ready(Err(_))));
    }

    #[tokio::test]
    async fn settlement_clears_the_key() {
        let flights = Flights::new();
        let calls = Arc::new(AtomicUsize::new(0));

        for expected in 1..=2 {
            let calls = calls.clone();
            let flight = flights.run("k".to_string(), move || async move {
                Ok(calls.fetch_add(1, Ordering::SeqCst) as u32 + 1)
            });
            assert_eq!(flight.read().await, Ok(expected));
            assert_eq!(flights.in_flight(), 0);
        }
    }

    #[tokio::test]
    async fn ready_flight_is_settled() {
        let flight: Flight<u32, TestError> = Flight::ready(Ok(3));
        assert!(flight.is_settled());
        assert!(matches!(flight.try_read(), ReadState::Ready(Ok(3))));
        assert_eq!(flight.read().await, Ok(3));
    }

    #[tokio::test]
    async fn distinct_keys_run_independently() {
        let flights = Flights::new();
        let a = flights.run("a".to_string(), || async { Ok(1) });
        let b = flights.run("b".to_string(), || async { Ok(2) });
        assert_eq!(flights.in_flight(), 2);

        assert_eq!(a.read().await, Ok(1));
        assert_eq!(b.read().await, Ok(2));
    }

    #[tokio::test]
    async fn panicking_operation_is_abandoned() {
        let flights = Flights::new();
        async fn explode() -> Result<u32, TestError> {
            panic!("operation exploded");
        }

        let flight = flights.run("k".to_string(), explode);

        assert_eq!(flight.read().await, Err(TestError::Abandoned));
        assert_eq!(flights.in_flight(), 0);
    }
}
