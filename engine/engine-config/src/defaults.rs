//! Default configuration values loaded from config.defaults.toml.
//!
//! The defaults file is embedded at compile time so the binary and the
//! documented defaults never drift apart.

use once_cell::sync::Lazy;
use serde::Deserialize;

/// The embedded defaults TOML file (loaded at compile time)
const DEFAULTS_TOML: &str = include_str!("../../../config.defaults.toml");

/// Parsed defaults structure (parsed once at first use)
static DEFAULTS: Lazy<DefaultsConfig> = Lazy::new(|| {
    toml::from_str(DEFAULTS_TOML).expect("config.defaults.toml should be valid TOML")
});

// ============================================================================
// Internal structs for parsing config.defaults.toml
// ============================================================================

#[derive(Debug, Deserialize)]
struct DefaultsConfig {
    common: CommonDefaults,
    search: SearchDefaults,
    batcher: BatcherDefaults,
    play: PlayDefaults,
    analysis: AnalysisDefaults,
}

#[derive(Debug, Deserialize)]
struct CommonDefaults {
    log_level: String,
    max_board_len: usize,
}

#[derive(Debug, Deserialize)]
struct SearchDefaults {
    num_threads: usize,
    max_visits: u64,
    max_time_secs: f64,
    lag_buffer_secs: f64,
    c_puct: f64,
    fpu_reduction_max: f64,
    root_fpu_reduction_max: f64,
    root_policy_temperature: f64,
    win_loss_utility_factor: f64,
    score_utility_factor: f64,
    score_scale: f64,
    lcb_stdevs: f64,
    virtual_loss: u32,
    root_noise: bool,
    dirichlet_alpha: f64,
    dirichlet_epsilon: f64,
    seed: u64,
}

#[derive(Debug, Deserialize)]
struct BatcherDefaults {
    max_batch_size: usize,
    max_wait_micros: u64,
    cache_size: usize,
}

#[derive(Debug, Deserialize)]
struct PlayDefaults {
    allow_resignation: bool,
    resign_threshold: f64,
    resign_consec_turns: usize,
    search_factor_when_winning: f64,
    search_factor_when_winning_threshold: f64,
    dynamic_pda_cap_per_opp_lead: f64,
    model_path: String,
}

#[derive(Debug, Deserialize)]
struct AnalysisDefaults {
    num_analysis_threads: usize,
    analysis_pv_len: usize,
    report_perspective: String,
    white_bonus_per_handicap_stone: f64,
    assume_multiple_starting_black_moves_are_handicap: bool,
    ownership_min_visits: u64,
}

// ============================================================================
// Public accessor functions
// ============================================================================

// Common
pub fn log_level() -> &'static str {
    &DEFAULTS.common.log_level
}
pub fn max_board_len() -> usize {
    DEFAULTS.common.max_board_len
}

// Search
pub fn num_threads() -> usize {
    DEFAULTS.search.num_threads
}
pub fn max_visits() -> u64 {
    DEFAULTS.search.max_visits
}
pub fn max_time_secs() -> f64 {
    DEFAULTS.search.max_time_secs
}
pub fn lag_buffer_secs() -> f64 {
    DEFAULTS.search.lag_buffer_secs
}
pub fn c_puct() -> f64 {
    DEFAULTS.search.c_puct
}
pub fn fpu_reduction_max() -> f64 {
    DEFAULTS.search.fpu_reduction_max
}
pub fn root_fpu_reduction_max() -> f64 {
    DEFAULTS.search.root_fpu_reduction_max
}
pub fn root_policy_temperature() -> f64 {
    DEFAULTS.search.root_policy_temperature
}
pub fn win_loss_utility_factor() -> f64 {
    DEFAULTS.search.win_loss_utility_factor
}
pub fn score_utility_factor() -> f64 {
    DEFAULTS.search.score_utility_factor
}
pub fn score_scale() -> f64 {
    DEFAULTS.search.score_scale
}
pub fn lcb_stdevs() -> f64 {
    DEFAULTS.search.lcb_stdevs
}
pub fn virtual_loss() -> u32 {
    DEFAULTS.search.virtual_loss
}
pub fn root_noise() -> bool {
    DEFAULTS.search.root_noise
}
pub fn dirichlet_alpha() -> f64 {
    DEFAULTS.search.dirichlet_alpha
}
pub fn dirichlet_epsilon() -> f64 {
    DEFAULTS.search.dirichlet_epsilon
}
pub fn seed() -> u64 {
    DEFAULTS.search.seed
}

// Batcher
pub fn max_batch_size() -> usize {
    DEFAULTS.batcher.max_batch_size
}
pub fn max_wait_micros() -> u64 {
    DEFAULTS.batcher.max_wait_micros
}
pub fn cache_size() -> usize {
    DEFAULTS.batcher.cache_size
}

// Play
pub fn allow_resignation() -> bool {
    DEFAULTS.play.allow_resignation
}
pub fn resign_threshold() -> f64 {
    DEFAULTS.play.resign_threshold
}
pub fn resign_consec_turns() -> usize {
    DEFAULTS.play.resign_consec_turns
}
pub fn search_factor_when_winning() -> f64 {
    DEFAULTS.play.search_factor_when_winning
}
pub fn search_factor_when_winning_threshold() -> f64 {
    DEFAULTS.play.search_factor_when_winning_threshold
}
pub fn dynamic_pda_cap_per_opp_lead() -> f64 {
    DEFAULTS.play.dynamic_pda_cap_per_opp_lead
}
pub fn model_path() -> &'static str {
    &DEFAULTS.play.model_path
}

// Analysis
pub fn num_analysis_threads() -> usize {
    DEFAULTS.analysis.num_analysis_threads
}
pub fn analysis_pv_len() -> usize {
    DEFAULTS.analysis.analysis_pv_len
}
pub fn report_perspective() -> &'static str {
    &DEFAULTS.analysis.report_perspective
}
pub fn white_bonus_per_handicap_stone() -> f64 {
    DEFAULTS.analysis.white_bonus_per_handicap_stone
}
pub fn assume_multiple_starting_black_moves_are_handicap() -> bool {
    DEFAULTS.analysis.assume_multiple_starting_black_moves_are_handicap
}
pub fn ownership_min_visits() -> u64 {
    DEFAULTS.analysis.ownership_min_visits
}
