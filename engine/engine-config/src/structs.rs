//! Configuration struct definitions.
//!
//! All config structs with serde deserialization support and default values.

use crate::defaults;
use serde::Deserialize;

// ============================================================================
// Serde default functions (required for #[serde(default = "...")])
// These call the accessor functions from defaults module
// ============================================================================

fn d_log_level() -> String {
    defaults::log_level().into()
}
fn d_max_board_len() -> usize {
    defaults::max_board_len()
}
fn d_num_threads() -> usize {
    defaults::num_threads()
}
fn d_max_visits() -> u64 {
    defaults::max_visits()
}
fn d_max_time_secs() -> f64 {
    defaults::max_time_secs()
}
fn d_lag_buffer_secs() -> f64 {
    defaults::lag_buffer_secs()
}
fn d_c_puct() -> f64 {
    defaults::c_puct()
}
fn d_fpu_reduction_max() -> f64 {
    defaults::fpu_reduction_max()
}
fn d_root_fpu_reduction_max() -> f64 {
    defaults::root_fpu_reduction_max()
}
fn d_root_policy_temperature() -> f64 {
    defaults::root_policy_temperature()
}
fn d_win_loss_utility_factor() -> f64 {
    defaults::win_loss_utility_factor()
}
fn d_score_utility_factor() -> f64 {
    defaults::score_utility_factor()
}
fn d_score_scale() -> f64 {
    defaults::score_scale()
}
fn d_lcb_stdevs() -> f64 {
    defaults::lcb_stdevs()
}
fn d_virtual_loss() -> u32 {
    defaults::virtual_loss()
}
fn d_root_noise() -> bool {
    defaults::root_noise()
}
fn d_dirichlet_alpha() -> f64 {
    defaults::dirichlet_alpha()
}
fn d_dirichlet_epsilon() -> f64 {
    defaults::dirichlet_epsilon()
}
fn d_seed() -> u64 {
    defaults::seed()
}
fn d_max_batch_size() -> usize {
    defaults::max_batch_size()
}
fn d_max_wait_micros() -> u64 {
    defaults::max_wait_micros()
}
fn d_cache_size() -> usize {
    defaults::cache_size()
}
fn d_allow_resignation() -> bool {
    defaults::allow_resignation()
}
fn d_resign_threshold() -> f64 {
    defaults::resign_threshold()
}
fn d_resign_consec_turns() -> usize {
    defaults::resign_consec_turns()
}
fn d_search_factor_when_winning() -> f64 {
    defaults::search_factor_when_winning()
}
fn d_search_factor_when_winning_threshold() -> f64 {
    defaults::search_factor_when_winning_threshold()
}
fn d_dynamic_pda_cap_per_opp_lead() -> f64 {
    defaults::dynamic_pda_cap_per_opp_lead()
}
fn d_model_path() -> String {
    defaults::model_path().into()
}
fn d_num_analysis_threads() -> usize {
    defaults::num_analysis_threads()
}
fn d_analysis_pv_len() -> usize {
    defaults::analysis_pv_len()
}
fn d_report_perspective() -> String {
    defaults::report_perspective().into()
}
fn d_white_bonus_per_handicap_stone() -> f64 {
    defaults::white_bonus_per_handicap_stone()
}
fn d_assume_handicap() -> bool {
    defaults::assume_multiple_starting_black_moves_are_handicap()
}
fn d_ownership_min_visits() -> u64 {
    defaults::ownership_min_visits()
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Root configuration structure matching config.toml
#[derive(Debug, Deserialize, Default, Clone)]
pub struct CentralConfig {
    #[serde(default)]
    pub common: CommonConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub batcher: BatcherConfig,
    #[serde(default)]
    pub play: PlayConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
}

/// Common configuration shared by all components
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CommonConfig {
    #[serde(default = "d_log_level")]
    pub log_level: String,
    /// Side length network inputs are padded to
    #[serde(default = "d_max_board_len")]
    pub max_board_len: usize,
}

impl Default for CommonConfig {
    fn default() -> Self {
        Self {
            log_level: defaults::log_level().into(),
            max_board_len: defaults::max_board_len(),
        }
    }
}

/// Tree search configuration
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SearchConfig {
    /// Simulation threads per search
    #[serde(default = "d_num_threads")]
    pub num_threads: usize,
    #[serde(default = "d_max_visits")]
    pub max_visits: u64,
    /// Upper bound on a single search; 0 disables the limit
    #[serde(default = "d_max_time_secs")]
    pub max_time_secs: f64,
    /// Seconds reserved per move for communication lag
    #[serde(default = "d_lag_buffer_secs")]
    pub lag_buffer_secs: f64,
    #[serde(default = "d_c_puct")]
    pub c_puct: f64,
    #[serde(default = "d_fpu_reduction_max")]
    pub fpu_reduction_max: f64,
    #[serde(default = "d_root_fpu_reduction_max")]
    pub root_fpu_reduction_max: f64,
    #[serde(default = "d_root_policy_temperature")]
    pub root_policy_temperature: f64,
    #[serde(default = "d_win_loss_utility_factor")]
    pub win_loss_utility_factor: f64,
    #[serde(default = "d_score_utility_factor")]
    pub score_utility_factor: f64,
    #[serde(default = "d_score_scale")]
    pub score_scale: f64,
    #[serde(default = "d_lcb_stdevs")]
    pub lcb_stdevs: f64,
    #[serde(default = "d_virtual_loss")]
    pub virtual_loss: u32,
    #[serde(default = "d_root_noise")]
    pub root_noise: bool,
    #[serde(default = "d_dirichlet_alpha")]
    pub dirichlet_alpha: f64,
    #[serde(default = "d_dirichlet_epsilon")]
    pub dirichlet_epsilon: f64,
    /// Seed for root noise; 0 seeds from entropy
    #[serde(default = "d_seed")]
    pub seed: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            num_threads: defaults::num_threads(),
            max_visits: defaults::max_visits(),
            max_time_secs: defaults::max_time_secs(),
            lag_buffer_secs: defaults::lag_buffer_secs(),
            c_puct: defaults::c_puct(),
            fpu_reduction_max: defaults::fpu_reduction_max(),
            root_fpu_reduction_max: defaults::root_fpu_reduction_max(),
            root_policy_temperature: defaults::root_policy_temperature(),
            win_loss_utility_factor: defaults::win_loss_utility_factor(),
            score_utility_factor: defaults::score_utility_factor(),
            score_scale: defaults::score_scale(),
            lcb_stdevs: defaults::lcb_stdevs(),
            virtual_loss: defaults::virtual_loss(),
            root_noise: defaults::root_noise(),
            dirichlet_alpha: defaults::dirichlet_alpha(),
            dirichlet_epsilon: defaults::dirichlet_epsilon(),
            seed: defaults::seed(),
        }
    }
}

/// Evaluation batching configuration
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BatcherConfig {
    #[serde(default = "d_max_batch_size")]
    pub max_batch_size: usize,
    /// Longest a partial batch waits for more requests
    #[serde(default = "d_max_wait_micros")]
    pub max_wait_micros: u64,
    /// Evaluation cache entries; 0 disables the cache
    #[serde(default = "d_cache_size")]
    pub cache_size: usize,
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self {
            max_batch_size: defaults::max_batch_size(),
            max_wait_micros: defaults::max_wait_micros(),
            cache_size: defaults::cache_size(),
        }
    }
}

/// Game play configuration: resignation, time use and handicap compensation
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PlayConfig {
    #[serde(default = "d_allow_resignation")]
    pub allow_resignation: bool,
    #[serde(default = "d_resign_threshold")]
    pub resign_threshold: f64,
    #[serde(default = "d_resign_consec_turns")]
    pub resign_consec_turns: usize,
    #[serde(default = "d_search_factor_when_winning")]
    pub search_factor_when_winning: f64,
    #[serde(default = "d_search_factor_when_winning_threshold")]
    pub search_factor_when_winning_threshold: f64,
    /// 0 disables dynamic playout doubling advantage
    #[serde(default = "d_dynamic_pda_cap_per_opp_lead")]
    pub dynamic_pda_cap_per_opp_lead: f64,
    /// ONNX model file; empty uses the uniform evaluator
    #[serde(default = "d_model_path")]
    pub model_path: String,
}

impl Default for PlayConfig {
    fn default() -> Self {
        Self {
            allow_resignation: defaults::allow_resignation(),
            resign_threshold: defaults::resign_threshold(),
            resign_consec_turns: defaults::resign_consec_turns(),
            search_factor_when_winning: defaults::search_factor_when_winning(),
            search_factor_when_winning_threshold: defaults::search_factor_when_winning_threshold(),
            dynamic_pda_cap_per_opp_lead: defaults::dynamic_pda_cap_per_opp_lead(),
            model_path: defaults::model_path().into(),
        }
    }
}

/// Parallel analysis service configuration
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Positions analyzed concurrently, one search session each
    #[serde(default = "d_num_analysis_threads")]
    pub num_analysis_threads: usize,
    #[serde(default = "d_analysis_pv_len")]
    pub analysis_pv_len: usize,
    /// "black", "white" or "side_to_move"
    #[serde(default = "d_report_perspective")]
    pub report_perspective: String,
    #[serde(default = "d_white_bonus_per_handicap_stone")]
    pub white_bonus_per_handicap_stone: f64,
    #[serde(default = "d_assume_handicap")]
    pub assume_multiple_starting_black_moves_are_handicap: bool,
    /// Minimum visits before a node's ownership is averaged in
    #[serde(default = "d_ownership_min_visits")]
    pub ownership_min_visits: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            num_analysis_threads: defaults::num_analysis_threads(),
            analysis_pv_len: defaults::analysis_pv_len(),
            report_perspective: defaults::report_perspective().into(),
            white_bonus_per_handicap_stone: defaults::white_bonus_per_handicap_stone(),
            assume_multiple_starting_black_moves_are_handicap:
                defaults::assume_multiple_starting_black_moves_are_handicap(),
            ownership_min_visits: defaults::ownership_min_visits(),
        }
    }
}
