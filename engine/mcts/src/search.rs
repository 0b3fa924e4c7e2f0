//! Parallel search driver.
//!
//! Each simulation is one pass of:
//! 1. Selection: descend with PUCT and virtual loss to a leaf
//! 2. Evaluation: submit the leaf to the batcher and wait for the result
//! 3. Expansion: publish the leaf's children with their priors
//! 4. Backup: add the value along the path, flipping perspective per ply
//!
//! [`run_search`] runs simulations on several threads against one shared
//! tree until a stop condition is met or the stop flag is raised.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, RecvTimeoutError};
use thiserror::Error;
use tracing::{debug, trace, warn};

use engine_core::RulesError;

use crate::batcher::EvaluationBatcher;
use crate::evaluator::EvaluatorError;
use crate::time_control::TimeControlError;
use crate::tree::{LeafValue, SearchTree, Selection};

/// Errors that can occur during search.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SearchError {
    #[error("Evaluator error: {0}")]
    EvaluatorError(#[from] EvaluatorError),

    #[error("Rules error: {0}")]
    RulesError(#[from] RulesError),

    #[error("Time control error: {0}")]
    TimeControlError(#[from] TimeControlError),

    #[error("No legal moves available")]
    NoLegalMoves,

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// What one call to [`run_simulation`] achieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulationOutcome {
    /// One backup reached the root.
    Completed,
    /// Nothing was recorded; try again.
    Retry,
}

/// Run a single simulation (select -> evaluate -> expand -> backup).
pub fn run_simulation(tree: &SearchTree, batcher: &EvaluationBatcher) -> Result<SimulationOutcome, SearchError> {
    match tree.select_leaf() {
        Selection::Leaf { path, position } => {
            let Some(&leaf) = path.last() else {
                return Err(SearchError::InvalidState("empty selection path".to_string()));
            };
            let legal = position.legal_moves();
            let input = tree.eval_input(&position, &legal);
            match batcher.evaluate(input) {
                Ok(output) => {
                    tree.expand(leaf, &legal, &output, path.len() == 1);
                    tree.backup(&path, LeafValue::from_output(&output));
                    trace!(depth = path.len(), win_loss = output.win_loss, "Simulation complete");
                    Ok(SimulationOutcome::Completed)
                }
                Err(err) => {
                    leaf.mark_error();
                    tree.abandon(&path);
                    Err(err.into())
                }
            }
        }
        Selection::Terminal { path, value } => {
            tree.backup(&path, value);
            Ok(SimulationOutcome::Completed)
        }
        Selection::Retry => Ok(SimulationOutcome::Retry),
        Selection::Exhausted => Err(SearchError::NoLegalMoves),
    }
}

/// When a search should stop on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SearchLimits {
    /// Stop once the root has this many visits, counting reused ones.
    pub max_visits: Option<u64>,
    /// Wall-clock budget from the start of the search.
    pub max_time: Option<Duration>,
    /// Stop when the best move can no longer be overtaken within
    /// `max_visits`.
    pub stop_on_decisive_lead: bool,
}

impl SearchLimits {
    /// Run until stopped.
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn new(max_visits: u64, max_time: Option<Duration>) -> Self {
        Self {
            max_visits: Some(max_visits),
            max_time,
            stop_on_decisive_lead: false,
        }
    }

    pub fn with_decisive_lead(mut self) -> Self {
        self.stop_on_decisive_lead = true;
        self
    }

    /// Whether the search is done. In-flight simulations are not counted;
    /// workers reserve their visits separately.
    fn reached(&self, tree: &SearchTree, deadline: Option<Instant>) -> bool {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            return true;
        }
        let Some(max_visits) = self.max_visits else {
            return false;
        };
        let visits = tree.root_visits();
        visits >= max_visits
            || (self.stop_on_decisive_lead && decisive_lead(tree, max_visits - visits))
    }
}

/// True when the most visited root child leads the runner-up by more than
/// the visits left to give.
fn decisive_lead(tree: &SearchTree, remaining: u64) -> bool {
    let mut first = 0u64;
    let mut second = 0u64;
    for edge in tree.root().children() {
        let visits = edge.node.visits();
        if visits > first {
            second = first;
            first = visits;
        } else if visits > second {
            second = visits;
        }
    }
    first > 0 && first - second > remaining
}

/// Periodic observer of a running search.
pub struct Checkpoint<'a> {
    pub interval: Duration,
    pub callback: &'a mut dyn FnMut(&SearchTree),
}

/// Totals for one call to [`run_search`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchSummary {
    pub simulations: u64,
    pub root_visits: u64,
    pub elapsed: Duration,
}

/// Search `tree` on `num_threads` threads until `limits` are reached or
/// `stop` is raised. The first simulation error raises `stop` and is
/// returned after every worker has exited.
///
/// With a checkpoint, its callback runs on the calling thread every
/// interval and once more after the workers finish.
pub fn run_search(
    tree: &SearchTree,
    batcher: &EvaluationBatcher,
    num_threads: usize,
    limits: SearchLimits,
    stop: &AtomicBool,
    checkpoint: Option<Checkpoint<'_>>,
) -> Result<SearchSummary, SearchError> {
    let started = Instant::now();
    let deadline = limits.max_time.map(|t| started + t);
    let simulations = AtomicU64::new(0);
    let in_flight = AtomicU64::new(0);
    let num_threads = num_threads.max(1);

    let result = thread::scope(|s| {
        // Each worker holds a sender; the channel disconnects when all exit.
        let (done_tx, done_rx) = bounded::<()>(0);
        let workers: Vec<_> = (0..num_threads)
            .map(|_| {
                let done_tx = done_tx.clone();
                let counters = Counters {
                    simulations: &simulations,
                    in_flight: &in_flight,
                };
                s.spawn(move || {
                    let result = worker_loop(tree, batcher, &limits, deadline, stop, counters);
                    drop(done_tx);
                    result
                })
            })
            .collect();
        drop(done_tx);

        if let Some(checkpoint) = checkpoint {
            loop {
                match done_rx.recv_timeout(checkpoint.interval) {
                    Err(RecvTimeoutError::Timeout) => (checkpoint.callback)(tree),
                    Ok(()) => {}
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            (checkpoint.callback)(tree);
        }

        let mut first_error = None;
        for worker in workers {
            match worker.join() {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    first_error.get_or_insert(err);
                }
                Err(_) => {
                    first_error.get_or_insert(SearchError::InvalidState("search thread panicked".to_string()));
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    });

    let summary = SearchSummary {
        simulations: simulations.load(Ordering::Relaxed),
        root_visits: tree.root_visits(),
        elapsed: started.elapsed(),
    };
    match result {
        Ok(()) => {
            debug!(
                simulations = summary.simulations,
                root_visits = summary.root_visits,
                elapsed_ms = summary.elapsed.as_millis() as u64,
                "Search finished"
            );
            Ok(summary)
        }
        Err(err) => {
            warn!(error = %err, "Search aborted");
            Err(err)
        }
    }
}

#[derive(Clone, Copy)]
struct Counters<'a> {
    simulations: &'a AtomicU64,
    /// Simulations started but not finished.
    in_flight: &'a AtomicU64,
}

/// Consecutive unproductive attempts that only yield before sleeping.
const SPIN_ATTEMPTS: u32 = 4;
const MIN_BACKOFF: Duration = Duration::from_micros(20);
const MAX_BACKOFF: Duration = Duration::from_millis(1);

/// Pacing for a worker that cannot make progress, e.g. while another thread
/// waits on the backend to expand the node it needs. Yields a few times,
/// then sleeps with doubling intervals up to [`MAX_BACKOFF`].
#[derive(Debug, Default)]
struct Backoff {
    attempts: u32,
}

impl Backoff {
    fn delay(&self) -> Option<Duration> {
        self.attempts
            .checked_sub(SPIN_ATTEMPTS)
            .map(|n| MIN_BACKOFF.saturating_mul(1 << n.min(10)).min(MAX_BACKOFF))
    }

    fn wait(&mut self) {
        match self.delay() {
            None => thread::yield_now(),
            Some(delay) => thread::sleep(delay),
        }
        self.attempts = self.attempts.saturating_add(1);
    }

    fn reset(&mut self) {
        self.attempts = 0;
    }
}

fn worker_loop(
    tree: &SearchTree,
    batcher: &EvaluationBatcher,
    limits: &SearchLimits,
    deadline: Option<Instant>,
    stop: &AtomicBool,
    counters: Counters<'_>,
) -> Result<(), SearchError> {
    let mut backoff = Backoff::default();
    while !stop.load(Ordering::Acquire) {
        if limits.reached(tree, deadline) {
            stop.store(true, Ordering::Release);
            break;
        }
        // Reserve a visit so that concurrent workers never overshoot.
        let reserved = counters.in_flight.fetch_add(1, Ordering::AcqRel);
        if let Some(max_visits) = limits.max_visits {
            if reserved + tree.root_visits() >= max_visits {
                counters.in_flight.fetch_sub(1, Ordering::AcqRel);
                backoff.wait();
                continue;
            }
        }

        let outcome = run_simulation(tree, batcher);
        counters.in_flight.fetch_sub(1, Ordering::AcqRel);
        match outcome {
            Ok(SimulationOutcome::Completed) => {
                counters.simulations.fetch_add(1, Ordering::Relaxed);
                backoff.reset();
            }
            Ok(SimulationOutcome::Retry) => backoff.wait(),
            Err(err) => {
                stop.store(true, Ordering::Release);
                return Err(err);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batcher::BatcherConfig;
    use crate::config::SearchParams;
    use crate::evaluator::{EvalInput, EvalOutput, Evaluator, UniformEvaluator};
    use crate::score_tables::ScoreTables;
    use engine_core::{Position, Rules};
    use std::sync::Arc;

    fn tree(params: SearchParams) -> SearchTree {
        let position = Position::empty(9, 9, Rules::chinese()).unwrap();
        SearchTree::new(position, params, Arc::new(ScoreTables::new(20.0)), 9)
    }

    fn batcher() -> EvaluationBatcher {
        EvaluationBatcher::new(
            Arc::new(UniformEvaluator),
            BatcherConfig {
                max_batch_size: 8,
                max_wait: Duration::from_micros(200),
                cache_size: 1024,
            },
        )
    }

    struct BrokenEvaluator;

    impl Evaluator for BrokenEvaluator {
        fn evaluate(&self, _input: &EvalInput) -> Result<EvalOutput, EvaluatorError> {
            Err(EvaluatorError::EvaluationFailed("backend down".to_string()))
        }
    }

    #[test]
    fn test_backoff_yields_then_sleeps_up_to_cap() {
        let mut backoff = Backoff::default();
        for _ in 0..SPIN_ATTEMPTS {
            assert_eq!(backoff.delay(), None);
            backoff.wait();
        }
        assert_eq!(backoff.delay(), Some(MIN_BACKOFF));
        backoff.attempts = SPIN_ATTEMPTS + 1;
        assert_eq!(backoff.delay(), Some(MIN_BACKOFF * 2));
        backoff.attempts = u32::MAX;
        assert_eq!(backoff.delay(), Some(MAX_BACKOFF));

        backoff.reset();
        assert_eq!(backoff.delay(), None);
    }

    #[test]
    fn test_visit_conservation_across_threads() {
        const THREADS: u64 = 4;
        const SIMS: u64 = 25;
        let tree = tree(SearchParams::for_testing());
        let batcher = batcher();

        thread::scope(|s| {
            for _ in 0..THREADS {
                s.spawn(|| {
                    let mut done = 0;
                    while done < SIMS {
                        if run_simulation(&tree, &batcher).unwrap() == SimulationOutcome::Completed {
                            done += 1;
                        }
                    }
                });
            }
        });

        assert_eq!(tree.root_visits(), THREADS * SIMS);
        assert_eq!(tree.root().virtual_losses(), 0);
        let child_visits: u64 = tree.root().children().iter().map(|e| e.node.visits()).sum();
        assert_eq!(child_visits, THREADS * SIMS - 1);
    }

    #[test]
    fn test_run_search_respects_max_visits() {
        let tree = tree(SearchParams::for_testing());
        let batcher = batcher();
        let stop = AtomicBool::new(false);
        let summary = run_search(&tree, &batcher, 4, SearchLimits::new(64, None), &stop, None).unwrap();

        assert_eq!(summary.root_visits, 64);
        assert_eq!(summary.simulations, summary.root_visits);
    }

    #[test]
    fn test_single_visit_search() {
        let tree = tree(SearchParams::for_testing());
        let stop = AtomicBool::new(false);
        run_search(&tree, &batcher(), 2, SearchLimits::new(1, None), &stop, None).unwrap();
        assert_eq!(tree.root_visits(), 1);
        assert!(tree.position().is_legal(tree.best_move()));
    }

    #[test]
    fn test_stop_flag_ends_unbounded_search() {
        let tree = tree(SearchParams::for_testing());
        let batcher = batcher();
        let stop = AtomicBool::new(false);
        thread::scope(|s| {
            let handle = s.spawn(|| run_search(&tree, &batcher, 2, SearchLimits::unbounded(), &stop, None));
            thread::sleep(Duration::from_millis(30));
            stop.store(true, Ordering::Release);
            assert!(handle.join().unwrap().is_ok());
        });
        assert!(tree.root_visits() > 0);
    }

    #[test]
    fn test_time_limit() {
        let tree = tree(SearchParams::for_testing());
        let stop = AtomicBool::new(false);
        let limits = SearchLimits {
            max_visits: None,
            max_time: Some(Duration::from_millis(20)),
            stop_on_decisive_lead: false,
        };
        let summary = run_search(&tree, &batcher(), 2, limits, &stop, None).unwrap();
        assert!(summary.elapsed >= Duration::from_millis(20));
        assert!(summary.elapsed < Duration::from_secs(5));
    }

    #[test]
    fn test_checkpoint_runs_at_least_once() {
        let tree = tree(SearchParams::for_testing());
        let stop = AtomicBool::new(false);
        let mut calls = 0;
        let mut callback = |_: &SearchTree| calls += 1;
        run_search(
            &tree,
            &batcher(),
            2,
            SearchLimits::new(8, None),
            &stop,
            Some(Checkpoint {
                interval: Duration::from_secs(60),
                callback: &mut callback,
            }),
        )
        .unwrap();
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_evaluation_failure_aborts_search() {
        let tree = tree(SearchParams::for_testing());
        let batcher = EvaluationBatcher::new(Arc::new(BrokenEvaluator), BatcherConfig::default());
        let stop = AtomicBool::new(false);
        let result = run_search(&tree, &batcher, 2, SearchLimits::new(10, None), &stop, None);
        assert!(matches!(result, Err(SearchError::EvaluatorError(_))));
        assert!(stop.load(Ordering::Acquire));
        assert_eq!(tree.root().virtual_losses(), 0);
    }

    #[test]
    fn test_decisive_lead() {
        let tree = tree(SearchParams::for_testing());
        run_simulation(&tree, &batcher()).unwrap();
        let children = tree.root().children();
        for _ in 0..10 {
            children[0].node.record(0.0, 0.0, 0.0, 0.0);
        }
        for _ in 0..3 {
            children[1].node.record(0.0, 0.0, 0.0, 0.0);
        }
        assert!(decisive_lead(&tree, 6));
        assert!(!decisive_lead(&tree, 7));

        let limits = SearchLimits::new(20, None).with_decisive_lead();
        // Root has 1 visit, 19 left: not decisive yet.
        assert!(!limits.reached(&tree, None));
    }
}
