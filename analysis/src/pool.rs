//! Parallel analysis over a pool of search sessions.
//!
//! Requests go through an unbounded queue to worker threads. Each worker
//! owns one [`SearchSession`] and handles one request at a time. Finished
//! records go through a second queue to a single writer thread, so output
//! lines appear in completion order and never interleave.
//!
//! Shutdown closes the request queue, lets the workers drain it, joins them,
//! then closes the output queue and joins the writer.

use std::io::{self, Write};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};
use engine_core::{Position, Rules};
use mcts::{EvaluationBatcher, PlayParams, SearchError, SearchLimits, SearchParams, SearchSession};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::request::{AnalysisRequest, Perspective};
use crate::response::{AnalysisResult, OutputRecord};

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("failed to create search session: {0}")]
    Session(#[from] SearchError),

    #[error("failed to spawn pool thread: {0}")]
    Spawn(#[from] io::Error),
}

/// Settings shared by every worker.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub num_workers: usize,
    /// Base parameters; requests override visits, root FPU and temperature.
    pub params: SearchParams,
    pub play: PlayParams,
    pub max_board_len: usize,
    pub perspective: Perspective,
}

pub struct SessionPool {
    requests: Option<Sender<AnalysisRequest>>,
    records: Option<Sender<OutputRecord>>,
    workers: Vec<JoinHandle<()>>,
    writer: Option<JoinHandle<io::Result<u64>>>,
}

impl std::fmt::Debug for SessionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionPool")
            .field("workers", &self.workers.len())
            .field("running", &self.requests.is_some())
            .finish()
    }
}

impl SessionPool {
    /// Start `config.num_workers` workers sharing `batcher` and a writer
    /// thread that owns `sink`.
    pub fn new<W>(config: PoolConfig, batcher: Arc<EvaluationBatcher>, sink: W) -> Result<Self, PoolError>
    where
        W: Write + Send + 'static,
    {
        let num_workers = config.num_workers.max(1);
        let (request_tx, request_rx) = unbounded::<AnalysisRequest>();
        let (record_tx, record_rx) = unbounded::<OutputRecord>();

        let writer = thread::Builder::new()
            .name("analysis-output".to_string())
            .spawn(move || output_loop(record_rx, sink))?;

        let mut workers = Vec::with_capacity(num_workers);
        for worker_id in 0..num_workers {
            let idle = Position::empty(config.max_board_len, config.max_board_len, Rules::default())
                .map_err(SearchError::from)?;
            let session = SearchSession::new(
                idle,
                config.params.clone(),
                config.play.clone(),
                Arc::clone(&batcher),
                config.max_board_len,
            )?;
            let requests = request_rx.clone();
            let records = record_tx.clone();
            let params = config.params.clone();
            let perspective = config.perspective;
            let handle = thread::Builder::new()
                .name(format!("analysis-{}", worker_id))
                .spawn(move || worker_loop(worker_id, session, requests, records, params, perspective))?;
            workers.push(handle);
        }

        info!(
            workers = num_workers,
            perspective = %config.perspective,
            "Session pool started"
        );
        Ok(Self {
            requests: Some(request_tx),
            records: Some(record_tx),
            workers,
            writer: Some(writer),
        })
    }

    /// Queue a position for analysis. Never blocks.
    pub fn enqueue_request(&self, request: AnalysisRequest) {
        if let Some(requests) = &self.requests {
            if requests.send(request).is_err() {
                warn!("Request queue closed, dropping request");
            }
        }
    }

    /// Write a record that did not come from a search, such as a parse error.
    pub fn report(&self, record: OutputRecord) {
        if let Some(records) = &self.records {
            if records.send(record).is_err() {
                warn!("Output queue closed, dropping record");
            }
        }
    }

    /// Drain all queued requests, stop every thread and return the number of
    /// records written.
    pub fn shutdown(mut self) -> io::Result<u64> {
        self.shutdown_inner()
    }

    fn shutdown_inner(&mut self) -> io::Result<u64> {
        let Some(requests) = self.requests.take() else {
            return Ok(0);
        };
        drop(requests);
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                error!("Analysis worker panicked");
            }
        }

        drop(self.records.take());
        let written = match self.writer.take().map(JoinHandle::join) {
            Some(Ok(result)) => result?,
            Some(Err(_)) => return Err(io::Error::new(io::ErrorKind::Other, "output thread panicked")),
            None => 0,
        };
        info!(records = written, "Session pool stopped");
        Ok(written)
    }
}

impl Drop for SessionPool {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown_inner() {
            error!(error = %e, "Session pool shutdown failed");
        }
    }
}

/// Handle requests until the queue is closed and empty.
fn worker_loop(
    worker_id: usize,
    mut session: SearchSession,
    requests: Receiver<AnalysisRequest>,
    records: Sender<OutputRecord>,
    params: SearchParams,
    perspective: Perspective,
) {
    debug!(worker_id, "Analysis worker started");
    for request in requests.iter() {
        let record = match analyze(&mut session, &request, &params, perspective) {
            Ok(result) => OutputRecord::Result(result),
            Err(err) => {
                warn!(
                    worker_id,
                    id = %request.id,
                    turn_number = request.turn_number,
                    error = %err,
                    "Analysis failed"
                );
                OutputRecord::TurnError {
                    id: request.id.clone(),
                    turn_number: request.turn_number,
                    error: err.to_string(),
                }
            }
        };
        // Free the tree while waiting for the next request.
        if let Err(err) = session.clear_search() {
            warn!(worker_id, error = %err, "Clearing search failed");
        }
        if records.send(record).is_err() {
            warn!(worker_id, "Output queue closed, worker exiting");
            break;
        }
    }
    debug!(worker_id, "Analysis worker stopped");
}

fn analyze(
    session: &mut SearchSession,
    request: &AnalysisRequest,
    base: &SearchParams,
    perspective: Perspective,
) -> Result<AnalysisResult, SearchError> {
    let overrides = &request.overrides;
    session.set_params(SearchParams {
        max_visits: overrides.max_visits,
        root_fpu_reduction_max: overrides.root_fpu_reduction_max,
        root_policy_temperature: overrides.root_policy_temperature,
        ..base.clone()
    })?;
    session.set_position(request.position.clone())?;

    let summary = session.search_synchronous(SearchLimits::new(overrides.max_visits, base.max_time()))?;
    debug!(
        id = %request.id,
        turn_number = request.turn_number,
        root_visits = summary.root_visits,
        elapsed_ms = summary.elapsed.as_millis() as u64,
        "Position analyzed"
    );

    let snapshot = session.snapshot(overrides.analysis_pv_len, overrides.include_ownership);
    Ok(AnalysisResult::from_snapshot(request, &snapshot, perspective))
}

/// Write every record as one line until all senders are gone.
fn output_loop<W: Write>(records: Receiver<OutputRecord>, mut sink: W) -> io::Result<u64> {
    let mut written = 0u64;
    for record in records.iter() {
        writeln!(sink, "{}", record.to_json_line())?;
        sink.flush()?;
        written += 1;
    }
    Ok(written)
}
