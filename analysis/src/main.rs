//! Analysis - parallel Go position analysis over JSON lines
//!
//! A long-running process that:
//! 1. Reads one JSON analysis request per line from stdin
//! 2. Searches every requested turn on a pool of search sessions sharing one
//!    batched evaluator
//! 3. Writes one JSON result or error per line to stdout
//!
//! Logs go to stderr so they never mix with results.

use std::io::{self, BufRead};
use std::sync::Arc;

use analysis::{parse_request_line, Config, PoolConfig, SessionPool};
use anyhow::Result;
use clap::Parser;
use mcts::{EvaluationBatcher, Evaluator, UniformEvaluator};
use tracing::{debug, info, warn};

fn init_tracing(level: &str) -> Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();

    Ok(())
}

#[cfg(feature = "onnx")]
fn load_model(config: &Config) -> Result<Arc<dyn Evaluator>> {
    let evaluator = mcts::OnnxEvaluator::load(&config.model_path, config.max_board_len, 1)?;
    Ok(Arc::new(evaluator))
}

#[cfg(not(feature = "onnx"))]
fn load_model(config: &Config) -> Result<Arc<dyn Evaluator>> {
    Err(anyhow::anyhow!(
        "model_path is set to {} but this binary was built without the onnx feature",
        config.model_path
    ))
}

fn build_evaluator(config: &Config) -> Result<Arc<dyn Evaluator>> {
    if config.model_path.is_empty() {
        warn!("No model_path configured, using uniform evaluator");
        return Ok(Arc::new(UniformEvaluator::new()));
    }
    load_model(config)
}

fn main() -> Result<()> {
    // Parse and validate configuration
    let config = Config::parse();
    config.validate()?;

    init_tracing(&config.log_level)?;
    info!(log_level = %config.log_level, "Tracing initialized");

    let evaluator = build_evaluator(&config)?;
    let batcher = Arc::new(EvaluationBatcher::new(evaluator, config.batcher_config()));

    let pool = SessionPool::new(
        PoolConfig {
            num_workers: config.num_analysis_threads,
            params: config.search_params(),
            play: config.play_params(),
            max_board_len: config.max_board_len,
            perspective: config.perspective()?,
        },
        Arc::clone(&batcher),
        io::stdout(),
    )?;
    let defaults = config.request_defaults();

    info!(
        threads = config.num_analysis_threads,
        "Started, ready to begin handling requests"
    );

    for line in io::stdin().lock().lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match parse_request_line(line, &defaults) {
            Ok(parsed) => {
                debug!(turns = parsed.requests.len(), warnings = parsed.warnings.len(), "Request accepted");
                for warning in parsed.warnings {
                    pool.report(warning.into());
                }
                for request in parsed.requests {
                    pool.enqueue_request(request);
                }
            }
            Err(err) => {
                warn!(error = %err, "Request rejected");
                pool.report(err.into());
            }
        }
    }

    let written = pool.shutdown()?;
    let stats = batcher.stats();
    info!(
        records = written,
        rows = stats.rows,
        batches = stats.batches,
        avg_batch_size = stats.average_batch_size(),
        cache_hits = stats.cache_hits,
        "All cleaned up, quitting"
    );
    Ok(())
}
