//! Concurrent Monte Carlo Tree Search for Go analysis and play.
//!
//! Many worker threads share one [`SearchTree`]. Each simulation descends
//! the tree using PUCT with virtual loss, evaluates the leaf through the
//! shared [`EvaluationBatcher`], expands it and backs the value up the path.
//!
//! # Overview
//!
//! 1. **Selection**: PUCT with first-play urgency and virtual loss so that
//!    concurrent workers spread over different lines
//! 2. **Evaluation**: leaves are submitted to the batcher, which coalesces
//!    requests from every thread into one network call and caches results
//! 3. **Expansion**: exactly one worker expands a node; losers of the race
//!    undo their virtual loss and retry
//! 4. **Backup**: win/loss, score and utility are added along the path with
//!    the sign flipped at every ply
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use engine_core::{Position, Rules};
//! use mcts::{
//!     BatcherConfig, EvaluationBatcher, PlayParams, SearchLimits, SearchParams,
//!     SearchSession, UniformEvaluator,
//! };
//!
//! let batcher = Arc::new(EvaluationBatcher::new(
//!     Arc::new(UniformEvaluator::new()),
//!     BatcherConfig::default(),
//! ));
//! let position = Position::empty(19, 19, Rules::japanese())?;
//! let params = SearchParams::default().with_max_visits(800);
//! let mut session = SearchSession::new(position, params, PlayParams::default(), batcher, 19)?;
//!
//! session.search_synchronous(SearchLimits::new(800, None))?;
//! let snapshot = session.snapshot(10, true);
//! println!("best move: {:?}", snapshot.best_move().map(|m| m.loc));
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      SearchSession                       │
//! │   state machine, time controls, resign / PDA / ponder    │
//! ├──────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐   run_search    ┌───────────────────┐  │
//! │  │  SearchTree  │◄───workers─────►│ EvaluationBatcher │  │
//! │  │ (lock-free)  │                 │  (queue + cache)  │  │
//! │  └──────────────┘                 └─────────┬─────────┘  │
//! │                                             ▼            │
//! │                                        Evaluator         │
//! └──────────────────────────────────────────────────────────┘
//! ```

pub mod adaptive;
pub mod analysis;
pub mod batcher;
pub mod cache;
pub mod config;
pub mod evaluator;
pub mod node;
pub mod score_tables;
pub mod search;
pub mod session;
pub mod time_control;
pub mod tree;

#[cfg(feature = "onnx")]
pub mod onnx;

// Re-export main types
pub use adaptive::PlayParams;
pub use analysis::{AnalysisSnapshot, MoveInfo, RootValues};
pub use batcher::{BatcherConfig, BatcherStats, EvalHandle, EvaluationBatcher};
pub use config::SearchParams;
pub use evaluator::{EvalInput, EvalOutput, Evaluator, EvaluatorError, UniformEvaluator};
pub use node::{ChildEdge, NodeStats, SearchNode};
pub use score_tables::ScoreTables;
pub use search::{run_search, Checkpoint, SearchError, SearchLimits, SearchSummary};
pub use session::{AnalyzeCallback, GenMoveOptions, GenMoveResult, SearchSession, SessionState};
pub use time_control::{TimeControlError, TimeControls};
pub use tree::{LeafValue, Selection, SearchTree};

#[cfg(feature = "onnx")]
pub use onnx::OnnxEvaluator;
