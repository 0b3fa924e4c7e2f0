//! Batching layer between simulation threads and the inference backend.
//!
//! Simulation threads call [`EvaluationBatcher::submit`] and block on the
//! returned [`EvalHandle`]. A single worker thread collects pending requests
//! into batches of up to `max_batch_size`, waiting at most `max_wait` after
//! the first request, and resolves every handle from one backend call.
//!
//! Identical inputs submitted while one is already in flight share that
//! evaluation instead of adding a second backend row. Completed results go
//! into an optional LRU cache.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, never, unbounded, Receiver, RecvTimeoutError, Sender};
use tracing::{debug, error, info, warn};

use crate::cache::EvalCache;
use crate::evaluator::{EvalInput, EvalOutput, Evaluator, EvaluatorError};

/// Outcome delivered to a waiting simulation thread.
pub type EvalReply = Result<Arc<EvalOutput>, EvaluatorError>;

/// Batching configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct BatcherConfig {
    pub max_batch_size: usize,
    /// Longest a partial batch waits for more requests.
    pub max_wait: Duration,
    /// Cached evaluations. Zero disables the cache.
    pub cache_size: usize,
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 16,
            max_wait: Duration::from_micros(2000),
            cache_size: 65536,
        }
    }
}

/// A request waiting in the queue.
struct PendingEvaluation {
    input: EvalInput,
    fingerprint: u64,
}

/// Completion handle for one submitted evaluation. Resolves exactly once.
#[derive(Debug)]
pub struct EvalHandle {
    rx: Receiver<EvalReply>,
}

impl EvalHandle {
    fn resolved(reply: EvalReply) -> Self {
        let (tx, rx) = bounded(1);
        let _ = tx.send(reply);
        Self { rx }
    }

    /// Block until the evaluation completes.
    pub fn wait(self) -> EvalReply {
        self.rx.recv().unwrap_or_else(|_| {
            Err(EvaluatorError::EvaluationFailed(
                "evaluation batcher shut down".to_string(),
            ))
        })
    }
}

/// Counters describing batcher throughput.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BatcherStats {
    /// Rows sent to the backend.
    pub rows: u64,
    /// Backend calls.
    pub batches: u64,
    pub cache_hits: u64,
}

impl BatcherStats {
    pub fn average_batch_size(&self) -> f64 {
        if self.batches == 0 {
            0.0
        } else {
            self.rows as f64 / self.batches as f64
        }
    }
}

/// State shared between submitters and the worker thread.
struct Shared {
    /// Waiters per fingerprint currently queued or being evaluated.
    inflight: Mutex<HashMap<u64, Vec<Sender<EvalReply>>>>,
    cache: Mutex<EvalCache>,
    rows: AtomicU64,
    batches: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Shared {
    /// Deliver `reply` to every waiter of `fingerprint`.
    fn resolve(&self, fingerprint: u64, reply: EvalReply) {
        let waiters = {
            let mut inflight = lock(&self.inflight);
            if let Ok(output) = &reply {
                lock(&self.cache).insert(fingerprint, Arc::clone(output));
            }
            inflight.remove(&fingerprint).unwrap_or_default()
        };
        for waiter in waiters {
            let _ = waiter.send(reply.clone());
        }
    }

    /// Fail every waiter still registered.
    fn fail_all(&self, message: &str) {
        let waiters: Vec<Sender<EvalReply>> = lock(&self.inflight).drain().flat_map(|(_, w)| w).collect();
        if waiters.is_empty() {
            return;
        }
        warn!(waiters = waiters.len(), "{}", message);
        let reply: EvalReply = Err(EvaluatorError::EvaluationFailed(message.to_string()));
        for waiter in waiters {
            let _ = waiter.send(reply.clone());
        }
    }
}

/// Owns the worker's end of the queue. On exit, normal or unwinding, the
/// queue is closed first so later submissions fail fast, then every request
/// still registered is failed.
struct WorkerExit {
    receiver: Receiver<PendingEvaluation>,
    shared: Arc<Shared>,
}

impl Drop for WorkerExit {
    fn drop(&mut self) {
        drop(std::mem::replace(&mut self.receiver, never()));
        self.shared.fail_all("evaluation batcher shut down");
    }
}

/// Collects evaluation requests from many threads into backend batches.
pub struct EvaluationBatcher {
    sender: Option<Sender<PendingEvaluation>>,
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
    config: BatcherConfig,
}

impl std::fmt::Debug for EvaluationBatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvaluationBatcher")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl EvaluationBatcher {
    /// Start the batching worker thread for `evaluator`.
    pub fn new(evaluator: Arc<dyn Evaluator>, config: BatcherConfig) -> Self {
        let (sender, receiver) = unbounded();
        let shared = Arc::new(Shared {
            inflight: Mutex::new(HashMap::new()),
            cache: Mutex::new(EvalCache::new(config.cache_size)),
            rows: AtomicU64::new(0),
            batches: AtomicU64::new(0),
        });

        let worker_shared = Arc::clone(&shared);
        let worker_config = config.clone();
        let worker = thread::Builder::new()
            .name("eval-batcher".to_string())
            .spawn(move || run_loop(receiver, evaluator, worker_shared, worker_config))
            .ok();
        if worker.is_none() {
            warn!("Failed to spawn evaluation batcher thread");
        }

        Self {
            sender: Some(sender),
            shared,
            worker,
            config,
        }
    }

    pub fn config(&self) -> &BatcherConfig {
        &self.config
    }

    /// Queue `input` for evaluation. Never blocks.
    pub fn submit(&self, input: EvalInput) -> EvalHandle {
        let fingerprint = input.fingerprint();
        let (tx, rx) = bounded(1);
        {
            let mut inflight = lock(&self.shared.inflight);
            if let Some(hit) = lock(&self.shared.cache).get(fingerprint) {
                return EvalHandle::resolved(Ok(hit));
            }
            if let Some(waiters) = inflight.get_mut(&fingerprint) {
                waiters.push(tx);
                return EvalHandle { rx };
            }
            inflight.insert(fingerprint, vec![tx]);
        }

        let pending = PendingEvaluation { input, fingerprint };
        let sent = self
            .sender
            .as_ref()
            .map(|sender| sender.send(pending).is_ok())
            .unwrap_or(false);
        if !sent {
            self.shared.resolve(
                fingerprint,
                Err(EvaluatorError::EvaluationFailed(
                    "evaluation batcher shut down".to_string(),
                )),
            );
        }
        EvalHandle { rx }
    }

    /// Submit and wait.
    pub fn evaluate(&self, input: EvalInput) -> EvalReply {
        self.submit(input).wait()
    }

    /// Drop every cached evaluation.
    pub fn clear_cache(&self) {
        lock(&self.shared.cache).clear();
    }

    pub fn stats(&self) -> BatcherStats {
        BatcherStats {
            rows: self.shared.rows.load(Ordering::Relaxed),
            batches: self.shared.batches.load(Ordering::Relaxed),
            cache_hits: lock(&self.shared.cache).hits(),
        }
    }
}

impl Drop for EvaluationBatcher {
    fn drop(&mut self) {
        // Closing the channel ends the worker loop once the queue drains.
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        let stats = self.stats();
        info!(
            rows = stats.rows,
            batches = stats.batches,
            avg_batch_size = format!("{:.2}", stats.average_batch_size()),
            "Evaluation batcher stopped"
        );
    }
}

/// Worker loop: gather a batch, evaluate it, resolve handles.
fn run_loop(
    receiver: Receiver<PendingEvaluation>,
    evaluator: Arc<dyn Evaluator>,
    shared: Arc<Shared>,
    config: BatcherConfig,
) {
    let max_batch = config.max_batch_size.max(1);
    let mut batch: Vec<PendingEvaluation> = Vec::with_capacity(max_batch);
    let exit = WorkerExit { receiver, shared };
    let (receiver, shared) = (&exit.receiver, &exit.shared);

    loop {
        // 1. Wait for the first request (blocking)
        match receiver.recv() {
            Ok(first) => batch.push(first),
            Err(_) => break, // Channel closed, shut down worker
        }

        // 2. Collect more requests until the batch is full or max_wait passes
        let deadline = Instant::now() + config.max_wait;
        while batch.len() < max_batch {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            match receiver.recv_timeout(deadline - now) {
                Ok(next) => batch.push(next),
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        // 3. Evaluate and dispatch
        process_batch(&mut batch, evaluator.as_ref(), shared);
    }
    debug!("Evaluation batcher worker exiting");
}

fn process_batch(batch: &mut Vec<PendingEvaluation>, evaluator: &dyn Evaluator, shared: &Shared) {
    let (fingerprints, inputs): (Vec<u64>, Vec<EvalInput>) = batch
        .drain(..)
        .map(|pending| (pending.fingerprint, pending.input))
        .unzip();

    let started = Instant::now();
    let result = panic::catch_unwind(AssertUnwindSafe(|| evaluator.evaluate_batch(&inputs))).unwrap_or_else(|payload| {
        let message = panic_message(payload.as_ref());
        error!(rows = inputs.len(), panic = %message, "Evaluator panicked");
        Err(EvaluatorError::EvaluationFailed(format!("evaluator panicked: {}", message)))
    });
    shared.rows.fetch_add(inputs.len() as u64, Ordering::Relaxed);
    shared.batches.fetch_add(1, Ordering::Relaxed);
    debug!(
        rows = inputs.len(),
        elapsed_us = started.elapsed().as_micros() as u64,
        "Evaluated batch"
    );

    match result {
        Ok(outputs) if outputs.len() == inputs.len() => {
            for (fingerprint, output) in fingerprints.into_iter().zip(outputs) {
                shared.resolve(fingerprint, Ok(Arc::new(output)));
            }
        }
        Ok(outputs) => {
            let err = EvaluatorError::EvaluationFailed(format!(
                "backend returned {} results for {} inputs",
                outputs.len(),
                inputs.len()
            ));
            warn!(error = %err, "Evaluation batch failed");
            for fingerprint in fingerprints {
                shared.resolve(fingerprint, Err(err.clone()));
            }
        }
        Err(err) => {
            warn!(error = %err, rows = inputs.len(), "Evaluation batch failed");
            for fingerprint in fingerprints {
                shared.resolve(fingerprint, Err(err.clone()));
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::UniformEvaluator;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Barrier;

    /// Counts backend calls and rows, optionally sleeping to widen races.
    struct CountingEvaluator {
        calls: AtomicUsize,
        rows: AtomicUsize,
        delay: Duration,
    }

    impl CountingEvaluator {
        fn new(delay: Duration) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                rows: AtomicUsize::new(0),
                delay,
            }
        }
    }

    impl Evaluator for CountingEvaluator {
        fn evaluate(&self, input: &EvalInput) -> Result<EvalOutput, EvaluatorError> {
            UniformEvaluator.evaluate(input)
        }

        fn evaluate_batch(&self, inputs: &[EvalInput]) -> Result<Vec<EvalOutput>, EvaluatorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.rows.fetch_add(inputs.len(), Ordering::SeqCst);
            thread::sleep(self.delay);
            inputs.iter().map(|i| self.evaluate(i)).collect()
        }
    }

    struct FailingEvaluator;

    impl Evaluator for FailingEvaluator {
        fn evaluate(&self, _input: &EvalInput) -> Result<EvalOutput, EvaluatorError> {
            Err(EvaluatorError::ModelError("no model".to_string()))
        }
    }

    struct PanickingEvaluator;

    impl Evaluator for PanickingEvaluator {
        fn evaluate(&self, _input: &EvalInput) -> Result<EvalOutput, EvaluatorError> {
            panic!("backend exploded")
        }
    }

    fn input(tag: f32) -> EvalInput {
        EvalInput {
            features: vec![tag; 4],
            legal: vec![0, 1, 4],
            max_len: 2,
        }
    }

    #[test]
    fn test_lone_request_flushes_after_max_wait() {
        let config = BatcherConfig {
            max_batch_size: 64,
            max_wait: Duration::from_millis(5),
            cache_size: 0,
        };
        let batcher = EvaluationBatcher::new(Arc::new(UniformEvaluator), config);

        let started = Instant::now();
        let output = batcher.evaluate(input(1.0)).unwrap();
        assert_eq!(output.policy.len(), 5);
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(batcher.stats().batches, 1);
        assert_eq!(batcher.stats().rows, 1);
    }

    #[test]
    fn test_identical_concurrent_submissions_share_one_row() {
        let backend = Arc::new(CountingEvaluator::new(Duration::from_millis(20)));
        let config = BatcherConfig {
            max_batch_size: 8,
            max_wait: Duration::from_millis(10),
            cache_size: 128,
        };
        let batcher = EvaluationBatcher::new(backend.clone(), config);
        let barrier = Barrier::new(4);

        thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    barrier.wait();
                    batcher.evaluate(input(7.0)).unwrap();
                });
            }
        });
        // A later identical request is served from the cache.
        batcher.evaluate(input(7.0)).unwrap();

        assert_eq!(backend.rows.load(Ordering::SeqCst), 1);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_distinct_requests_are_batched() {
        let backend = Arc::new(CountingEvaluator::new(Duration::ZERO));
        let config = BatcherConfig {
            max_batch_size: 4,
            max_wait: Duration::from_millis(200),
            cache_size: 0,
        };
        let batcher = EvaluationBatcher::new(backend.clone(), config);

        let handles: Vec<EvalHandle> = (0..4).map(|i| batcher.submit(input(i as f32))).collect();
        for handle in handles {
            handle.wait().unwrap();
        }

        assert_eq!(backend.rows.load(Ordering::SeqCst), 4);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        assert!((batcher.stats().average_batch_size() - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_backend_failure_fails_handles() {
        let batcher = EvaluationBatcher::new(Arc::new(FailingEvaluator), BatcherConfig::default());
        let first = batcher.submit(input(1.0));
        let second = batcher.submit(input(2.0));
        assert!(matches!(first.wait(), Err(EvaluatorError::ModelError(_))));
        assert!(matches!(second.wait(), Err(EvaluatorError::ModelError(_))));

        // Failures are not cached.
        assert!(batcher.evaluate(input(1.0)).is_err());
    }

    #[test]
    fn test_clear_cache_forces_reevaluation() {
        let backend = Arc::new(CountingEvaluator::new(Duration::ZERO));
        let batcher = EvaluationBatcher::new(backend.clone(), BatcherConfig::default());

        batcher.evaluate(input(3.0)).unwrap();
        batcher.evaluate(input(3.0)).unwrap();
        assert_eq!(backend.rows.load(Ordering::SeqCst), 1);

        batcher.clear_cache();
        batcher.evaluate(input(3.0)).unwrap();
        assert_eq!(backend.rows.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_backend_panic_fails_handles_and_worker_survives() {
        let batcher = Arc::new(EvaluationBatcher::new(
            Arc::new(PanickingEvaluator),
            BatcherConfig::default(),
        ));

        let (tx, rx) = bounded(1);
        let waiter = Arc::clone(&batcher);
        thread::spawn(move || {
            let _ = tx.send(waiter.evaluate(input(1.0)));
        });
        let reply = rx.recv_timeout(Duration::from_secs(5)).expect("handle never resolved");
        match reply {
            Err(EvaluatorError::EvaluationFailed(message)) => assert!(message.contains("backend exploded")),
            other => panic!("unexpected reply: {:?}", other),
        }

        // The worker thread is still serving requests.
        let second = batcher.submit(input(2.0));
        assert!(second.wait().is_err());
        assert_eq!(batcher.stats().batches, 2);
    }

    #[test]
    fn test_worker_exit_fails_registered_waiters() {
        let shared = Arc::new(Shared {
            inflight: Mutex::new(HashMap::new()),
            cache: Mutex::new(EvalCache::new(0)),
            rows: AtomicU64::new(0),
            batches: AtomicU64::new(0),
        });
        let (tx, rx) = bounded(1);
        lock(&shared.inflight).insert(42, vec![tx]);
        let (_queue_tx, queue_rx) = unbounded();

        drop(WorkerExit {
            receiver: queue_rx,
            shared: Arc::clone(&shared),
        });

        let handle = EvalHandle { rx };
        assert!(matches!(handle.wait(), Err(EvaluatorError::EvaluationFailed(_))));
        assert!(lock(&shared.inflight).is_empty());
    }
}
