//! Active-key state and the rotate-and-retry loop
//!
//! The rotator owns the active key index and the one client bound to it.
//! Both live behind a mutex that is only held for snapshot and rotation,
//! never across a remote call. Each attempt takes an `Arc` of the current
//! client, so a rotation triggered by one request never drops a client that
//! another in-flight request is still using.
//!
//! Rotation after a rate limit is compare-and-advance: the rotator only moves
//! off key `i` if `i` is still active. Two requests that both hit the limit
//! on key `i` advance the index once, not twice.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use common::Secret;
use completion::CallError;
use tracing::{error, info, warn};

use crate::error::{Error, Result};
use crate::pool::CredentialPool;

type Connector<C> = Box<dyn Fn(&str) -> C + Send + Sync>;

struct RotationState<C> {
    active_index: usize,
    client: Arc<C>,
}

/// Snapshot of the rotator for status endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyStatus {
    pub total_keys: usize,
    /// 0-based index of the active key
    pub active_index: usize,
}

impl KeyStatus {
    /// 1-based key number, as shown to operators.
    pub fn current_key(&self) -> usize {
        self.active_index + 1
    }

    /// Keys from the active one to the end of the list.
    pub fn keys_remaining(&self) -> usize {
        self.total_keys - self.active_index
    }
}

/// Round-robin API key rotator with a single bound client.
pub struct KeyRotator<C> {
    pool: CredentialPool,
    connect: Connector<C>,
    state: Mutex<RotationState<C>>,
}

impl<C> KeyRotator<C> {
    /// Build a rotator over `keys`, binding the first client to key #1.
    ///
    /// `connect` builds a client for one key; it runs again on every rotation.
    pub fn new<F>(keys: Vec<Secret<String>>, connect: F) -> Result<Self>
    where
        F: Fn(&str) -> C + Send + Sync + 'static,
    {
        let pool = CredentialPool::new(keys)?;
        let first = pool.get(0).ok_or(Error::NoKeys)?;
        let client = Arc::new(connect(first.expose()));
        info!(keys = pool.len(), "API keys loaded");
        Ok(Self {
            pool,
            connect: Box::new(connect),
            state: Mutex::new(RotationState {
                active_index: 0,
                client,
            }),
        })
    }

    pub fn len(&self) -> usize {
        self.pool.len()
    }

    /// Always false; construction rejects an empty pool.
    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }

    pub fn active_index(&self) -> usize {
        self.lock().active_index
    }

    pub fn status(&self) -> KeyStatus {
        KeyStatus {
            total_keys: self.pool.len(),
            active_index: self.active_index(),
        }
    }

    /// Client bound to the active key.
    pub fn client(&self) -> Arc<C> {
        Arc::clone(&self.lock().client)
    }

    /// Advance to the next key and rebuild the client. Returns the new index.
    ///
    /// With a single key there is nothing to rotate to: returns `NoBackupKeys`
    /// and leaves the state untouched.
    pub fn rotate_key(&self) -> Result<usize> {
        if self.pool.len() <= 1 {
            error!("no backup keys available");
            return Err(Error::NoBackupKeys);
        }
        let mut state = self.lock();
        Ok(self.advance(&mut state))
    }

    /// Run `op` against the active client, rotating on rate limits.
    ///
    /// Makes at most one attempt per key in the pool.
    pub async fn execute_with_retry<A, T, F, Fut>(&self, op: F, args: A) -> Result<T>
    where
        A: Clone,
        F: Fn(Arc<C>, A) -> Fut,
        Fut: Future<Output = completion::Result<T>>,
    {
        self.execute_with_retries(op, args, self.pool.len()).await
    }

    /// Like `execute_with_retry` with an explicit attempt budget.
    ///
    /// A budget of 0 is treated as 1.
    pub async fn execute_with_retries<A, T, F, Fut>(
        &self,
        op: F,
        args: A,
        max_retries: usize,
    ) -> Result<T>
    where
        A: Clone,
        F: Fn(Arc<C>, A) -> Fut,
        Fut: Future<Output = completion::Result<T>>,
    {
        let max_attempts = max_retries.max(1);
        let total = self.pool.len();
        let mut attempt = 0usize;

        loop {
            attempt += 1;
            let (index, client) = self.snapshot();

            let message = match op(client, args.clone()).await {
                Ok(value) => return Ok(value),
                Err(CallError::RateLimited(message)) => message,
                Err(CallError::Remote { status, message }) => {
                    error!(key = index + 1, status, error = %message, "API error, not retrying");
                    return Err(Error::Remote { status, message });
                }
                Err(CallError::Unexpected(message)) => {
                    error!(key = index + 1, error = %message, "unexpected error, not retrying");
                    return Err(Error::Unexpected(message));
                }
            };

            metrics::counter!("resq_rate_limited_total").increment(1);
            warn!(key = index + 1, attempt, error = %message, "rate limit hit");

            if total <= 1 {
                error!("no backup keys available");
                metrics::counter!("resq_keys_exhausted_total", "reason" => "no_backup")
                    .increment(1);
                return Err(Error::NoBackupKeys);
            }

            if attempt >= max_attempts {
                error!(keys = total, attempts = attempt, "all API keys exhausted");
                metrics::counter!("resq_keys_exhausted_total", "reason" => "exhausted")
                    .increment(1);
                return Err(Error::Exhausted {
                    keys: total,
                    attempts: attempt,
                });
            }

            let next = self.advance_from(index);
            info!(key = next + 1, "retrying with next key");
        }
    }

    fn lock(&self) -> MutexGuard<'_, RotationState<C>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn snapshot(&self) -> (usize, Arc<C>) {
        let state = self.lock();
        (state.active_index, Arc::clone(&state.client))
    }

    /// Rotate away from `used` unless another caller already has.
    fn advance_from(&self, used: usize) -> usize {
        let mut state = self.lock();
        if state.active_index != used {
            return state.active_index;
        }
        self.advance(&mut state)
    }

    fn advance(&self, state: &mut RotationState<C>) -> usize {
        let next = self.pool.next_index(state.active_index);
        if let Some(key) = self.pool.get(next) {
            state.client = Arc::new((self.connect)(key.expose()));
            state.active_index = next;
            metrics::counter!("resq_key_rotations_total").increment(1);
            warn!(key = next + 1, "rotated to API key");
        }
        state.active_index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Stand-in for a completion client: remembers which key it was built with.
    #[derive(Debug)]
    struct FakeClient {
        key: String,
    }

    fn keys(names: &[&str]) -> Vec<Secret<String>> {
        names.iter().map(|k| Secret::new(k.to_string())).collect()
    }

    fn rotator(names: &[&str]) -> (KeyRotator<FakeClient>, Arc<AtomicUsize>) {
        let builds = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&builds);
        let rotator = KeyRotator::new(keys(names), move |key: &str| {
            counter.fetch_add(1, Ordering::SeqCst);
            FakeClient {
                key: key.to_string(),
            }
        })
        .unwrap();
        (rotator, builds)
    }

    type BoxedCall = Pin<Box<dyn Future<Output = completion::Result<String>> + Send>>;

    /// Scripted remote: pops one outcome per call and records the key used.
    #[derive(Clone)]
    struct Script {
        outcomes: Arc<Mutex<VecDeque<completion::Result<String>>>>,
        visited: Arc<Mutex<Vec<String>>>,
    }

    impl Script {
        fn new(outcomes: Vec<completion::Result<String>>) -> Self {
            Self {
                outcomes: Arc::new(Mutex::new(outcomes.into())),
                visited: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn visited(&self) -> Vec<String> {
            self.visited.lock().unwrap().clone()
        }

        /// Operation for `execute_with_retry`; each call consumes one outcome
        /// (success once the script runs out).
        fn op(&self) -> impl Fn(Arc<FakeClient>, String) -> BoxedCall {
            let script = self.clone();
            move |client: Arc<FakeClient>, _text: String| -> BoxedCall {
                let script = script.clone();
                Box::pin(async move {
                    script.visited.lock().unwrap().push(client.key.clone());
                    script
                        .outcomes
                        .lock()
                        .unwrap()
                        .pop_front()
                        .unwrap_or_else(|| Ok(format!("ok from {}", client.key)))
                })
            }
        }
    }

    fn rate_limited() -> completion::Result<String> {
        Err(CallError::RateLimited("429".into()))
    }

    #[test]
    fn new_rejects_empty_key_list() {
        let result = KeyRotator::new(vec![], |key: &str| FakeClient {
            key: key.to_string(),
        });
        assert_eq!(result.err(), Some(Error::NoKeys));
    }

    #[test]
    fn new_binds_first_key() {
        let (rotator, builds) = rotator(&["k0", "k1"]);
        assert_eq!(rotator.active_index(), 0);
        assert_eq!(rotator.client().key, "k0");
        assert_eq!(rotator.len(), 2);
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn rotate_key_advances_and_wraps() {
        let (rotator, builds) = rotator(&["k0", "k1", "k2"]);
        assert_eq!(rotator.rotate_key().unwrap(), 1);
        assert_eq!(rotator.client().key, "k1");
        assert_eq!(rotator.rotate_key().unwrap(), 2);
        assert_eq!(rotator.rotate_key().unwrap(), 0);
        assert_eq!(rotator.client().key, "k0");
        assert_eq!(builds.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn rotate_key_with_single_key_errors() {
        let (rotator, builds) = rotator(&["only"]);
        assert_eq!(rotator.rotate_key().unwrap_err(), Error::NoBackupKeys);
        assert_eq!(rotator.active_index(), 0);
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn status_reports_one_based_key() {
        let (rotator, _) = rotator(&["k0", "k1", "k2"]);
        rotator.rotate_key().unwrap();
        let status = rotator.status();
        assert_eq!(status.total_keys, 3);
        assert_eq!(status.active_index, 1);
        assert_eq!(status.current_key(), 2);
        assert_eq!(status.keys_remaining(), 2);
    }

    #[tokio::test]
    async fn all_rate_limited_visits_each_key_once_then_exhausts() {
        let (rotator, _) = rotator(&["k0", "k1", "k2"]);
        let script = Script::new(vec![rate_limited(), rate_limited(), rate_limited()]);

        let err = rotator
            .execute_with_retry(script.op(), "help".to_string())
            .await
            .unwrap_err();

        assert_eq!(
            err,
            Error::Exhausted {
                keys: 3,
                attempts: 3
            }
        );
        assert_eq!(script.visited(), vec!["k0", "k1", "k2"]);
        // Last attempt does not rotate
        assert_eq!(rotator.active_index(), 2);
    }

    #[tokio::test]
    async fn round_robin_starts_from_active_key() {
        let (rotator, _) = rotator(&["k0", "k1", "k2"]);
        rotator.rotate_key().unwrap();
        let script = Script::new(vec![rate_limited(), rate_limited(), rate_limited()]);

        let err = rotator
            .execute_with_retry(script.op(), String::new())
            .await
            .unwrap_err();

        assert!(err.is_exhaustion());
        assert_eq!(script.visited(), vec!["k1", "k2", "k0"]);
    }

    #[tokio::test]
    async fn success_on_second_attempt_stops_rotation() {
        let (rotator, builds) = rotator(&["k0", "k1", "k2", "k3"]);
        let script = Script::new(vec![rate_limited(), Ok("done".into())]);

        let value = rotator
            .execute_with_retry(script.op(), String::new())
            .await
            .unwrap();

        assert_eq!(value, "done");
        assert_eq!(script.visited(), vec!["k0", "k1"]);
        assert_eq!(rotator.active_index(), 1);
        assert_eq!(builds.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn single_key_rate_limited_reports_no_backup_without_second_call() {
        let (rotator, _) = rotator(&["only"]);
        let script = Script::new(vec![rate_limited(), Ok("never".into())]);

        let err = rotator
            .execute_with_retries(script.op(), String::new(), 5)
            .await
            .unwrap_err();

        assert_eq!(err, Error::NoBackupKeys);
        assert_eq!(script.visited(), vec!["only"]);
    }

    #[tokio::test]
    async fn remote_failure_stops_without_rotation() {
        let (rotator, builds) = rotator(&["k0", "k1", "k2"]);
        let script = Script::new(vec![
            rate_limited(),
            Err(CallError::Remote {
                status: 400,
                message: "bad request".into(),
            }),
        ]);

        let err = rotator
            .execute_with_retry(script.op(), String::new())
            .await
            .unwrap_err();

        assert_eq!(
            err,
            Error::Remote {
                status: 400,
                message: "bad request".into()
            }
        );
        assert_eq!(script.visited(), vec!["k0", "k1"]);
        assert_eq!(rotator.active_index(), 1);
        assert_eq!(builds.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn remote_failure_on_first_attempt_makes_zero_rotations() {
        let (rotator, builds) = rotator(&["k0", "k1"]);
        let script = Script::new(vec![Err(CallError::Remote {
            status: 500,
            message: "boom".into(),
        })]);

        let err = rotator
            .execute_with_retry(script.op(), String::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Remote { status: 500, .. }));
        assert_eq!(script.visited().len(), 1);
        assert_eq!(rotator.active_index(), 0);
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unexpected_failure_is_distinct_and_not_retried() {
        let (rotator, _) = rotator(&["k0", "k1"]);
        let script = Script::new(vec![Err(CallError::Unexpected("connection reset".into()))]);

        let err = rotator
            .execute_with_retry(script.op(), String::new())
            .await
            .unwrap_err();

        assert_eq!(err, Error::Unexpected("connection reset".into()));
        assert_eq!(script.visited(), vec!["k0"]);
        assert_eq!(rotator.active_index(), 0);
    }

    #[tokio::test]
    async fn sequential_successes_never_move_active_key() {
        let (rotator, builds) = rotator(&["k0", "k1"]);
        let script = Script::new(vec![]);

        for _ in 0..2 {
                let value = rotator
                .execute_with_retry(script.op(), String::new())
                .await
                .unwrap();
            assert_eq!(value, "ok from k0");
        }

        assert_eq!(rotator.active_index(), 0);
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn args_are_forwarded_to_every_attempt() {
        let (rotator, _) = rotator(&["k0", "k1"]);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let calls = Arc::new(AtomicUsize::new(0));

        let (seen_op, calls_op) = (Arc::clone(&seen), Arc::clone(&calls));
        let value = rotator
            .execute_with_retry(
                move |_client, text: String| {
                    let seen = Arc::clone(&seen_op);
                    let n = calls_op.fetch_add(1, Ordering::SeqCst);
                    async move {
                        seen.lock().unwrap().push(text.clone());
                        if n == 0 {
                            Err(CallError::RateLimited("429".into()))
                        } else {
                            Ok(text.len())
                        }
                    }
                },
                "call option 2".to_string(),
            )
            .await
            .unwrap();

        assert_eq!(value, 13);
        assert_eq!(*seen.lock().unwrap(), vec!["call option 2", "call option 2"]);
    }

    #[tokio::test]
    async fn zero_budget_still_makes_one_attempt() {
        let (rotator, _) = rotator(&["k0", "k1"]);
        let script = Script::new(vec![rate_limited()]);

        let err = rotator
            .execute_with_retries(script.op(), String::new(), 0)
            .await
            .unwrap_err();

        assert_eq!(
            err,
            Error::Exhausted {
                keys: 2,
                attempts: 1
            }
        );
        assert_eq!(script.visited(), vec!["k0"]);
    }

    #[tokio::test]
    async fn budget_above_pool_size_cycles_again() {
        let (rotator, _) = rotator(&["k0", "k1"]);
        let script = Script::new(vec![rate_limited(), rate_limited(), rate_limited()]);

        let err = rotator
            .execute_with_retries(script.op(), String::new(), 3)
            .await
            .unwrap_err();

        assert_eq!(
            err,
            Error::Exhausted {
                keys: 2,
                attempts: 3
            }
        );
        assert_eq!(script.visited(), vec!["k0", "k1", "k0"]);
    }

    #[test]
    fn stale_rotation_does_not_advance_twice() {
        let (rotator, builds) = rotator(&["k0", "k1", "k2"]);
        // Two callers both saw key 0 rate limited
        assert_eq!(rotator.advance_from(0), 1);
        assert_eq!(rotator.advance_from(0), 1);
        assert_eq!(rotator.active_index(), 1);
        assert_eq!(builds.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn in_flight_client_survives_rotation() {
        let (rotator, _) = rotator(&["k0", "k1"]);
        let held = rotator.client();
        rotator.rotate_key().unwrap();
        assert_eq!(held.key, "k0");
        assert_eq!(rotator.client().key, "k1");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_successes_share_one_key() {
        let (rotator, builds) = rotator(&["k0", "k1", "k2"]);
        let rotator = Arc::new(rotator);

        let mut handles = Vec::new();
        for i in 0..16 {
            let rotator = Arc::clone(&rotator);
            handles.push(tokio::spawn(async move {
                rotator
                    .execute_with_retry(
                        |client: Arc<FakeClient>, n: usize| async move {
                            tokio::task::yield_now().await;
                            Ok(format!("{}:{n}", client.key))
                        },
                        i,
                    )
                    .await
            }));
        }
        for handle in handles {
            let value = handle.await.unwrap().unwrap();
            assert!(value.starts_with("k0:"), "got {value}");
        }
        assert_eq!(rotator.active_index(), 0);
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rate_limit_metrics_are_recorded() {
        let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let _guard = metrics::set_default_local_recorder(&recorder);

        let (rotator, _) = rotator(&["k0", "k1"]);
        let script = Script::new(vec![rate_limited(), rate_limited()]);
        let _ = rotator
            .execute_with_retry(script.op(), String::new())
            .await;

        let output = handle.render();
        assert!(output.contains("resq_rate_limited_total 2"), "got: {output}");
        assert!(output.contains("resq_key_rotations_total 1"), "got: {output}");
        assert!(
            output.contains("resq_keys_exhausted_total{reason=\"exhausted\"} 1"),
            "got: {output}"
        );
    }
}
