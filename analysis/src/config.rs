//! Configuration for the analysis service
//!
//! Configuration is loaded from config.toml with environment variable overrides.
//! CLI arguments take highest priority, followed by env vars, then config.toml.

use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::Parser;
use engine_config::{load_config, CentralConfig};
use engine_core::MAX_BOARD_LEN;
use mcts::{BatcherConfig, PlayParams, SearchParams};
use once_cell::sync::Lazy;
use tracing::level_filters::LevelFilter;

use crate::request::{Perspective, RequestDefaults};

// Load central config once at startup
static CENTRAL_CONFIG: Lazy<CentralConfig> = Lazy::new(load_config);

// Default value functions that read from central config
fn default_log_level() -> String {
    CENTRAL_CONFIG.common.log_level.clone()
}

fn default_max_board_len() -> usize {
    CENTRAL_CONFIG.common.max_board_len
}

fn default_num_analysis_threads() -> usize {
    CENTRAL_CONFIG.analysis.num_analysis_threads
}

fn default_num_search_threads() -> usize {
    CENTRAL_CONFIG.search.num_threads
}

fn default_max_visits() -> u64 {
    CENTRAL_CONFIG.search.max_visits
}

fn default_max_time_secs() -> f64 {
    CENTRAL_CONFIG.search.max_time_secs
}

fn default_analysis_pv_len() -> usize {
    CENTRAL_CONFIG.analysis.analysis_pv_len
}

fn default_report_perspective() -> String {
    CENTRAL_CONFIG.analysis.report_perspective.clone()
}

fn default_white_bonus_per_handicap_stone() -> f64 {
    CENTRAL_CONFIG.analysis.white_bonus_per_handicap_stone
}

fn default_assume_handicap() -> bool {
    CENTRAL_CONFIG
        .analysis
        .assume_multiple_starting_black_moves_are_handicap
}

fn default_max_batch_size() -> usize {
    CENTRAL_CONFIG.batcher.max_batch_size
}

fn default_cache_size() -> usize {
    CENTRAL_CONFIG.batcher.cache_size
}

fn default_model_path() -> String {
    CENTRAL_CONFIG.play.model_path.clone()
}

#[derive(Parser, Debug, Clone)]
#[command(name = "analysis")]
#[command(about = "Parallel Go position analysis over JSON lines")]
#[command(
    long_about = "Reads one JSON analysis request per line on stdin, searches every
requested turn on a pool of search sessions and writes one JSON result per
line on stdout. Logs go to stderr.

Configuration is loaded from config.toml with environment variable overrides.
CLI arguments take highest priority."
)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value_t = default_log_level())]
    pub log_level: String,

    /// Side length network inputs are padded to
    #[arg(long, default_value_t = default_max_board_len())]
    pub max_board_len: usize,

    /// Positions analyzed in parallel, one search session each
    #[arg(long, default_value_t = default_num_analysis_threads())]
    pub num_analysis_threads: usize,

    /// Simulation threads per search session
    #[arg(long, default_value_t = default_num_search_threads())]
    pub num_search_threads: usize,

    /// Default visits per position when a request does not set maxVisits
    #[arg(long, default_value_t = default_max_visits())]
    pub max_visits: u64,

    /// Upper bound on one search in seconds (0 to disable)
    #[arg(long, default_value_t = default_max_time_secs())]
    pub max_time_secs: f64,

    /// Default principal variation length
    #[arg(long, default_value_t = default_analysis_pv_len())]
    pub analysis_pv_len: usize,

    /// Perspective of reported values: black, white or side_to_move
    #[arg(long, default_value_t = default_report_perspective())]
    pub report_perspective: String,

    /// Komi added for white per handicap stone
    #[arg(long, default_value_t = default_white_bonus_per_handicap_stone())]
    pub white_bonus_per_handicap_stone: f64,

    /// Treat several black moves before white's first as handicap stones
    #[arg(long, default_value_t = default_assume_handicap())]
    pub assume_multiple_starting_black_moves_are_handicap: bool,

    /// Largest batch sent to the evaluator
    #[arg(long, default_value_t = default_max_batch_size())]
    pub max_batch_size: usize,

    /// Evaluation cache entries (0 to disable)
    #[arg(long, default_value_t = default_cache_size())]
    pub cache_size: usize,

    /// ONNX model file; empty uses the uniform evaluator
    #[arg(long, default_value_t = default_model_path())]
    pub model_path: String,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.num_analysis_threads == 0 {
            return Err(anyhow!("num_analysis_threads must be greater than 0"));
        }

        if self.num_search_threads == 0 {
            return Err(anyhow!("num_search_threads must be greater than 0"));
        }

        if self.max_visits == 0 {
            return Err(anyhow!("max_visits must be greater than 0"));
        }

        if !(2..=MAX_BOARD_LEN).contains(&self.max_board_len) {
            return Err(anyhow!(
                "max_board_len must be between 2 and {}",
                MAX_BOARD_LEN
            ));
        }

        if !self.max_time_secs.is_finite() || self.max_time_secs < 0.0 {
            return Err(anyhow!("max_time_secs must be a non-negative number"));
        }

        if self.max_batch_size == 0 {
            return Err(anyhow!("max_batch_size must be greater than 0"));
        }

        if !(1..=100).contains(&self.analysis_pv_len) {
            return Err(anyhow!("analysis_pv_len must be between 1 and 100"));
        }

        self.perspective()?;

        if self.log_level.parse::<LevelFilter>().is_err() {
            return Err(anyhow!(
                "invalid log level '{}', expected one of trace, debug, info, warn, error",
                self.log_level
            ));
        }

        Ok(())
    }

    pub fn perspective(&self) -> Result<Perspective> {
        self.report_perspective
            .parse()
            .map_err(|e| anyhow!("report_perspective: {}", e))
    }

    /// Search parameters shared by every session before per-request overrides.
    pub fn search_params(&self) -> SearchParams {
        search_params_from(&CENTRAL_CONFIG, self)
    }

    /// Game play settings the sessions are created with.
    pub fn play_params(&self) -> PlayParams {
        play_params_from(&CENTRAL_CONFIG, self)
    }

    pub fn batcher_config(&self) -> BatcherConfig {
        BatcherConfig {
            max_batch_size: self.max_batch_size,
            max_wait: Duration::from_micros(CENTRAL_CONFIG.batcher.max_wait_micros),
            cache_size: self.cache_size,
        }
    }

    pub fn request_defaults(&self) -> RequestDefaults {
        RequestDefaults {
            max_visits: self.max_visits,
            analysis_pv_len: self.analysis_pv_len,
            root_fpu_reduction_max: CENTRAL_CONFIG.search.root_fpu_reduction_max,
            root_policy_temperature: CENTRAL_CONFIG.search.root_policy_temperature,
            max_board_len: self.max_board_len,
            white_bonus_per_handicap_stone: self.white_bonus_per_handicap_stone,
            assume_multiple_starting_black_moves_are_handicap: self
                .assume_multiple_starting_black_moves_are_handicap,
        }
    }
}

fn search_params_from(central: &CentralConfig, config: &Config) -> SearchParams {
    let search = &central.search;
    SearchParams {
        num_threads: config.num_search_threads,
        max_visits: config.max_visits,
        max_time_secs: config.max_time_secs,
        lag_buffer_secs: search.lag_buffer_secs,
        c_puct: search.c_puct,
        fpu_reduction_max: search.fpu_reduction_max,
        root_fpu_reduction_max: search.root_fpu_reduction_max,
        root_policy_temperature: search.root_policy_temperature,
        win_loss_utility_factor: search.win_loss_utility_factor,
        score_utility_factor: search.score_utility_factor,
        score_scale: search.score_scale,
        lcb_stdevs: search.lcb_stdevs,
        virtual_loss: search.virtual_loss,
        root_noise: search.root_noise,
        dirichlet_alpha: search.dirichlet_alpha,
        dirichlet_epsilon: search.dirichlet_epsilon,
        playout_doubling_advantage: 0.0,
        ownership_min_visits: central.analysis.ownership_min_visits,
        seed: search.seed,
    }
}

fn play_params_from(central: &CentralConfig, config: &Config) -> PlayParams {
    let play = &central.play;
    PlayParams {
        allow_resignation: play.allow_resignation,
        resign_threshold: play.resign_threshold,
        resign_consec_turns: play.resign_consec_turns,
        search_factor_when_winning: play.search_factor_when_winning,
        search_factor_when_winning_threshold: play.search_factor_when_winning_threshold,
        dynamic_pda_cap_per_opp_lead: play.dynamic_pda_cap_per_opp_lead,
        count_leading_black_moves_as_handicap: config.assume_multiple_starting_black_moves_are_handicap,
        ..PlayParams::default()
    }
}
