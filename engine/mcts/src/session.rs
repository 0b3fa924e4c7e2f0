//! Search session: one game position, its search tree and the controls
//! around it.
//!
//! A session runs at most one search at a time. Synchronous searches block
//! the caller; pondering and analysis run on a background thread until
//! [`SearchSession::stop_and_wait`]. Every operation that starts a new
//! search or changes the position stops the current one first.

use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};

use engine_core::{Loc, Player, Position};

use crate::adaptive::{self, PlayParams};
use crate::analysis::{AnalysisSnapshot, RootValues};
use crate::batcher::EvaluationBatcher;
use crate::config::SearchParams;
use crate::score_tables::ScoreTables;
use crate::search::{run_search, Checkpoint, SearchError, SearchLimits, SearchSummary};
use crate::time_control::TimeControls;
use crate::tree::SearchTree;

/// Shortest interval between analysis callbacks.
const MIN_CALLBACK_INTERVAL: Duration = Duration::from_millis(10);

/// Callback receiving analysis snapshots from a background search.
pub type AnalyzeCallback = Box<dyn FnMut(&AnalysisSnapshot) + Send + 'static>;

/// What the session is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Searching,
    Pondering,
    Analyzing,
}

/// Options for [`SearchSession::gen_move`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GenMoveOptions {
    /// Play the chosen move on the session's position.
    pub commit: bool,
    /// Start pondering after the move is committed.
    pub ponder_after: bool,
}

/// Outcome of [`SearchSession::gen_move`].
#[derive(Debug, Clone, PartialEq)]
pub struct GenMoveResult {
    pub loc: Loc,
    pub resigned: bool,
    /// Root values from white's perspective.
    pub values: Option<RootValues>,
    pub root_visits: u64,
    pub search_factor: f64,
    pub playout_doubling_advantage: f64,
}

/// A background search and the flag that stops it.
struct Background {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<Result<SearchSummary, SearchError>>,
}

/// Search controller for one game.
pub struct SearchSession {
    position: Position,
    params: SearchParams,
    play: PlayParams,
    tree: Arc<SearchTree>,
    batcher: Arc<EvaluationBatcher>,
    score_tables: Arc<ScoreTables>,
    max_len: usize,

    state: SessionState,
    background: Option<Background>,

    time_controls: [TimeControls; 2],
    /// Win/loss after each generated move, white's perspective.
    recent_win_loss_values: Vec<f64>,
    last_search_factor: f64,
    desired_playout_doubling_advantage: f64,

    report_pv_len: usize,
    report_ownership: bool,
}

impl std::fmt::Debug for SearchSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchSession")
            .field("state", &self.state)
            .field("root_visits", &self.tree.root_visits())
            .field("moves", &self.position.moves().len())
            .finish_non_exhaustive()
    }
}

impl SearchSession {
    /// Create a session for `position`. Evaluations are padded to `max_len`.
    pub fn new(
        position: Position,
        params: SearchParams,
        play: PlayParams,
        batcher: Arc<EvaluationBatcher>,
        max_len: usize,
    ) -> Result<Self, SearchError> {
        check_fits(&position, max_len)?;
        let score_tables = Arc::new(ScoreTables::new(params.score_scale));
        let tree = Arc::new(SearchTree::new(
            position.clone(),
            params.clone(),
            Arc::clone(&score_tables),
            max_len,
        ));
        Ok(Self {
            position,
            params,
            play,
            tree,
            batcher,
            score_tables,
            max_len,
            state: SessionState::Idle,
            background: None,
            time_controls: [TimeControls::unlimited(), TimeControls::unlimited()],
            recent_win_loss_values: Vec::new(),
            last_search_factor: 1.0,
            desired_playout_doubling_advantage: 0.0,
            report_pv_len: 15,
            report_ownership: false,
        })
    }

    /// Current state. A background search that has already ended on its
    /// own, which only happens on failure, reads as idle.
    pub fn state(&self) -> SessionState {
        match &self.background {
            Some(background) if background.handle.is_finished() => SessionState::Idle,
            _ => self.state,
        }
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    pub fn params(&self) -> &SearchParams {
        &self.params
    }

    pub fn play_params(&self) -> &PlayParams {
        &self.play
    }

    pub fn set_play_params(&mut self, play: PlayParams) {
        self.play = play;
    }

    pub fn root_visits(&self) -> u64 {
        self.tree.root_visits()
    }

    /// Root values from the perspective of the player to move.
    pub fn root_values(&self) -> Option<RootValues> {
        self.tree.root_values()
    }

    /// Current analysis of the tree, safe to call while a search runs.
    pub fn snapshot(&self, pv_len: usize, include_ownership: bool) -> AnalysisSnapshot {
        self.tree.snapshot(pv_len, include_ownership)
    }

    pub fn recent_win_loss_values(&self) -> &[f64] {
        &self.recent_win_loss_values
    }

    pub fn last_search_factor(&self) -> f64 {
        self.last_search_factor
    }

    /// PV length and ownership inclusion for analysis callbacks.
    pub fn set_report_options(&mut self, pv_len: usize, include_ownership: bool) {
        self.report_pv_len = pv_len;
        self.report_ownership = include_ownership;
    }

    pub fn time_controls(&self, player: Player) -> &TimeControls {
        &self.time_controls[player.index()]
    }

    pub fn set_time_controls(&mut self, player: Player, controls: TimeControls) {
        self.time_controls[player.index()] = controls;
    }

    /// GTP `time_settings`: same clock for both players.
    pub fn time_settings(&mut self, main_time: f64, byo_yomi_time: f64, byo_yomi_stones: i64) -> Result<(), SearchError> {
        let controls = TimeControls::from_time_settings(main_time, byo_yomi_time, byo_yomi_stones)?;
        self.time_controls = [controls.clone(), controls];
        Ok(())
    }

    /// GTP `time_left` for one player.
    pub fn time_left(&mut self, player: Player, time: f64, stones: i64) -> Result<(), SearchError> {
        self.time_controls[player.index()].apply_time_left(time, stones)?;
        Ok(())
    }

    /// Replace the position. Discards the tree and the value history; the
    /// evaluation cache is kept.
    pub fn set_position(&mut self, position: Position) -> Result<(), SearchError> {
        self.stop_and_wait()?;
        check_fits(&position, self.max_len)?;
        self.position = position;
        self.recent_win_loss_values.clear();
        self.reset_tree();
        Ok(())
    }

    /// Replace the search parameters. The tree is discarded when they change.
    pub fn set_params(&mut self, params: SearchParams) -> Result<(), SearchError> {
        let stopped = self.stop_and_wait();
        if params != self.params {
            if params.score_scale != self.params.score_scale {
                self.score_tables = Arc::new(ScoreTables::new(params.score_scale));
            }
            self.params = params;
            self.reset_tree();
        }
        stopped
    }

    /// Discard the tree, keeping position and history. Returns the error of
    /// a background search that had failed.
    pub fn clear_search(&mut self) -> Result<(), SearchError> {
        let stopped = self.stop_and_wait();
        self.reset_tree();
        stopped
    }

    pub fn clear_cache(&self) {
        self.batcher.clear_cache();
    }

    /// Play `loc` for the side to move and keep the matching subtree.
    pub fn make_move(&mut self, loc: Loc) -> Result<(), SearchError> {
        self.stop_and_wait()?;
        let next = self.position.play(loc)?;
        let placeholder = Arc::new(self.fresh_tree(next.clone()));
        let old = mem::replace(&mut self.tree, placeholder);
        if let Ok(old) = Arc::try_unwrap(old) {
            self.tree = Arc::new(old.into_subtree(loc, next.clone()));
        }
        debug!(
            loc = %loc.to_gtp(next.board().x_size(), next.board().y_size()),
            reused_visits = self.tree.root_visits(),
            "Move played"
        );
        self.position = next;
        Ok(())
    }

    /// Stop any background search and wait for it. Does nothing when idle.
    ///
    /// If the background search had failed, its error is returned here and
    /// the tree is discarded. The session is idle either way.
    pub fn stop_and_wait(&mut self) -> Result<(), SearchError> {
        self.state = SessionState::Idle;
        let Some(background) = self.background.take() else {
            return Ok(());
        };
        background.stop.store(true, Ordering::Release);
        let result = match background.handle.join() {
            Ok(result) => result,
            Err(_) => Err(SearchError::InvalidState("background search thread panicked".to_string())),
        };
        match result {
            Ok(summary) => {
                debug!(
                    simulations = summary.simulations,
                    root_visits = summary.root_visits,
                    "Background search stopped"
                );
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "Background search failed, clearing tree");
                self.reset_tree();
                Err(err)
            }
        }
    }

    /// Search for `side` within its clock and return the move to play.
    /// Blocks until the search ends.
    pub fn gen_move_synchronous(&mut self, side: Player, search_factor: f64) -> Result<Loc, SearchError> {
        self.prepare_side(side)?;
        let limits = self.move_limits(side, search_factor);
        self.search_blocking(limits, None)?;
        Ok(self.chosen_move())
    }

    /// Like [`gen_move_synchronous`](Self::gen_move_synchronous), calling
    /// `callback` every `interval` and once when the search ends. Calls never
    /// overlap.
    pub fn gen_move_synchronous_analyze(
        &mut self,
        side: Player,
        search_factor: f64,
        interval: Duration,
        callback: &mut dyn FnMut(&AnalysisSnapshot),
    ) -> Result<Loc, SearchError> {
        self.prepare_side(side)?;
        let limits = self.move_limits(side, search_factor);
        let (pv_len, ownership) = (self.report_pv_len, self.report_ownership);
        let mut on_checkpoint = |tree: &SearchTree| callback(&tree.snapshot(pv_len, ownership));
        self.search_blocking(
            limits,
            Some(Checkpoint {
                interval: interval.max(MIN_CALLBACK_INTERVAL),
                callback: &mut on_checkpoint,
            }),
        )?;
        Ok(self.chosen_move())
    }

    /// Run a blocking search with explicit limits, e.g. for analysis.
    pub fn search_synchronous(&mut self, limits: SearchLimits) -> Result<SearchSummary, SearchError> {
        self.stop_and_wait()?;
        self.search_blocking(limits, None)
    }

    /// Search in the background until stopped.
    pub fn ponder(&mut self, search_factor: f64) -> Result<(), SearchError> {
        self.stop_and_wait()?;
        self.last_search_factor = search_factor;
        self.spawn_background(SessionState::Pondering, None)
    }

    /// Search for `side` in the background, calling `callback` with a
    /// snapshot every `interval` until stopped.
    pub fn analyze(&mut self, side: Player, interval: Duration, callback: AnalyzeCallback) -> Result<(), SearchError> {
        self.prepare_side(side)?;
        self.spawn_background(SessionState::Analyzing, Some((interval.max(MIN_CALLBACK_INTERVAL), callback)))
    }

    /// Full move generation for a game: handicap compensation, faster play
    /// when winning, the search itself, resignation, then optionally
    /// committing the move and pondering.
    pub fn gen_move(&mut self, side: Player, options: GenMoveOptions) -> Result<GenMoveResult, SearchError> {
        self.stop_and_wait()?;

        self.desired_playout_doubling_advantage = adaptive::update_playout_doubling_advantage(
            &self.position,
            side,
            &self.recent_win_loss_values,
            self.desired_playout_doubling_advantage,
            &self.play,
        );
        if self.play.dynamic_pda_cap_per_opp_lead != 0.0
            && self.params.playout_doubling_advantage != self.desired_playout_doubling_advantage
        {
            let params = SearchParams {
                playout_doubling_advantage: self.desired_playout_doubling_advantage,
                ..self.params.clone()
            };
            self.set_params(params)?;
        }

        let search_factor = adaptive::search_factor(
            &self.play,
            self.params.win_loss_utility_factor,
            &self.recent_win_loss_values,
            side,
        );
        self.last_search_factor = search_factor;

        let loc = self.gen_move_synchronous(side, search_factor)?;
        let values = self.tree.root_values().map(|v| v.for_white(side));
        let root_visits = self.tree.root_visits();

        if let Some(values) = values {
            self.recent_win_loss_values.push(values.win_loss);
        }
        let lead = values.map_or(0.0, |v| v.score_mean);
        let resigned = self.play.allow_resignation
            && adaptive::should_resign(&self.position, side, &self.recent_win_loss_values, lead, &self.play);

        let board = self.position.board();
        info!(
            player = %side,
            loc = %loc.to_gtp(board.x_size(), board.y_size()),
            visits = root_visits,
            white_win_loss = values.map_or(0.0, |v| v.win_loss),
            white_lead = lead,
            search_factor,
            pda = self.params.playout_doubling_advantage,
            resigned,
            "Generated move"
        );

        let result = GenMoveResult {
            loc,
            resigned,
            values,
            root_visits,
            search_factor,
            playout_doubling_advantage: self.params.playout_doubling_advantage,
        };

        if options.commit && !resigned {
            self.make_move(loc)?;
            if options.ponder_after {
                self.ponder(search_factor)?;
            }
        }
        Ok(result)
    }

    fn fresh_tree(&self, position: Position) -> SearchTree {
        SearchTree::new(
            position,
            self.params.clone(),
            Arc::clone(&self.score_tables),
            self.max_len,
        )
    }

    fn reset_tree(&mut self) {
        self.tree = Arc::new(self.fresh_tree(self.position.clone()));
    }

    /// Stop, and make `side` the player to move, discarding the tree if
    /// that changes anything.
    fn prepare_side(&mut self, side: Player) -> Result<(), SearchError> {
        self.stop_and_wait()?;
        if self.position.next_player() != side {
            self.position.set_next_player(side);
            self.reset_tree();
        }
        Ok(())
    }

    fn move_limits(&self, side: Player, search_factor: f64) -> SearchLimits {
        let max_time = self.time_controls[side.index()].time_budget(
            self.position.board().area(),
            self.position.moves().len(),
            self.params.lag_buffer_secs,
            search_factor,
            self.params.max_time(),
        );
        SearchLimits::new(self.params.max_visits, max_time).with_decisive_lead()
    }

    fn search_blocking(
        &mut self,
        limits: SearchLimits,
        checkpoint: Option<Checkpoint<'_>>,
    ) -> Result<SearchSummary, SearchError> {
        self.state = SessionState::Searching;
        let stop = AtomicBool::new(false);
        let result = run_search(
            &self.tree,
            &self.batcher,
            self.params.num_threads,
            limits,
            &stop,
            checkpoint,
        );
        self.state = SessionState::Idle;
        if result.is_err() {
            self.reset_tree();
        }
        result
    }

    fn spawn_background(
        &mut self,
        state: SessionState,
        reporting: Option<(Duration, AnalyzeCallback)>,
    ) -> Result<(), SearchError> {
        let stop = Arc::new(AtomicBool::new(false));
        let tree = Arc::clone(&self.tree);
        let batcher = Arc::clone(&self.batcher);
        let num_threads = self.params.num_threads;
        let (pv_len, ownership) = (self.report_pv_len, self.report_ownership);
        let thread_stop = Arc::clone(&stop);

        let name = match state {
            SessionState::Analyzing => "analyze",
            _ => "ponder",
        };
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || match reporting {
                Some((interval, mut callback)) => {
                    let mut on_checkpoint = |tree: &SearchTree| callback(&tree.snapshot(pv_len, ownership));
                    run_search(
                        &tree,
                        &batcher,
                        num_threads,
                        SearchLimits::unbounded(),
                        &thread_stop,
                        Some(Checkpoint {
                            interval,
                            callback: &mut on_checkpoint,
                        }),
                    )
                }
                None => run_search(
                    &tree,
                    &batcher,
                    num_threads,
                    SearchLimits::unbounded(),
                    &thread_stop,
                    None,
                ),
            })
            .map_err(|e| SearchError::InvalidState(format!("failed to spawn {} thread: {}", name, e)))?;

        self.background = Some(Background { stop, handle });
        self.state = state;
        Ok(())
    }

    /// Best move of the finished search, pass if it is somehow illegal.
    fn chosen_move(&self) -> Loc {
        let loc = self.tree.best_move();
        if self.position.is_legal(loc) {
            loc
        } else {
            warn!(?loc, "Search returned an illegal move, passing");
            Loc::Pass
        }
    }
}

impl Drop for SearchSession {
    fn drop(&mut self) {
        let _ = self.stop_and_wait();
    }
}

fn check_fits(position: &Position, max_len: usize) -> Result<(), SearchError> {
    let board = position.board();
    if board.x_size() > max_len || board.y_size() > max_len {
        return Err(SearchError::InvalidState(format!(
            "board {}x{} exceeds maximum size {}",
            board.x_size(),
            board.y_size(),
            max_len
        )));
    }
    Ok(())
}
