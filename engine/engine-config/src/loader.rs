//! Configuration loading logic.
//!
//! Handles loading config from files and applying environment variable overrides.

use crate::CentralConfig;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Standard locations to search for config.toml
pub const CONFIG_SEARCH_PATHS: &[&str] = &[
    "config.toml",            // Current directory
    "../config.toml",         // Parent directory (when running from subdirectory)
    "/etc/goban/config.toml", // System-wide install
];

/// Load the central configuration from config.toml.
///
/// Searches for config.toml in the following order:
/// 1. Path specified by GOBAN_CONFIG environment variable
/// 2. Current directory (config.toml)
/// 3. Parent directory (../config.toml)
/// 4. System-wide path (/etc/goban/config.toml)
///
/// After loading, environment variable overrides are applied.
pub fn load_config() -> CentralConfig {
    // Check for explicit config path
    if let Ok(path) = std::env::var("GOBAN_CONFIG") {
        let path = PathBuf::from(&path);
        if path.exists() {
            info!("Loading config from GOBAN_CONFIG: {}", path.display());
            return load_from_path(&path);
        }
        warn!(
            "GOBAN_CONFIG={} not found, searching defaults",
            path.display()
        );
    }

    // Search default locations
    for path_str in CONFIG_SEARCH_PATHS {
        let path = PathBuf::from(path_str);
        if path.exists() {
            info!("Loading config from {}", path.display());
            return load_from_path(&path);
        }
    }

    // Fall back to defaults
    debug!("No config.toml found, using built-in defaults");
    apply_env_overrides(CentralConfig::default())
}

/// Load configuration from a specific path.
pub fn load_from_path(path: &Path) -> CentralConfig {
    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => apply_env_overrides(config),
            Err(e) => {
                warn!("Failed to parse {}: {}, using defaults", path.display(), e);
                apply_env_overrides(CentralConfig::default())
            }
        },
        Err(e) => {
            warn!("Failed to read {}: {}, using defaults", path.display(), e);
            apply_env_overrides(CentralConfig::default())
        }
    }
}

/// Macro to reduce env override boilerplate
macro_rules! env_override {
    // String field
    ($config:expr, $section:ident . $field:ident, $key:expr) => {
        if let Ok(v) = std::env::var($key) {
            $config.$section.$field = v;
        }
    };
    // Parseable field (i32, u64, f64, etc.)
    ($config:expr, $section:ident . $field:ident, $key:expr, parse) => {
        if let Ok(v) =
            std::env::var($key).and_then(|s| s.parse().map_err(|_| std::env::VarError::NotPresent))
        {
            $config.$section.$field = v;
        }
    };
}

/// Apply environment variable overrides to a configuration.
///
/// Environment variables follow the pattern: GOBAN_<SECTION>_<KEY>
pub fn apply_env_overrides(mut config: CentralConfig) -> CentralConfig {
    // Common
    env_override!(config, common.log_level, "GOBAN_COMMON_LOG_LEVEL");
    env_override!(config, common.max_board_len, "GOBAN_COMMON_MAX_BOARD_LEN", parse);

    // Search
    env_override!(config, search.num_threads, "GOBAN_SEARCH_NUM_THREADS", parse);
    env_override!(config, search.max_visits, "GOBAN_SEARCH_MAX_VISITS", parse);
    env_override!(config, search.max_time_secs, "GOBAN_SEARCH_MAX_TIME_SECS", parse);
    env_override!(config, search.lag_buffer_secs, "GOBAN_SEARCH_LAG_BUFFER_SECS", parse);
    env_override!(config, search.c_puct, "GOBAN_SEARCH_C_PUCT", parse);
    env_override!(config, search.fpu_reduction_max, "GOBAN_SEARCH_FPU_REDUCTION_MAX", parse);
    env_override!(
        config,
        search.root_fpu_reduction_max,
        "GOBAN_SEARCH_ROOT_FPU_REDUCTION_MAX",
        parse
    );
    env_override!(
        config,
        search.root_policy_temperature,
        "GOBAN_SEARCH_ROOT_POLICY_TEMPERATURE",
        parse
    );
    env_override!(
        config,
        search.win_loss_utility_factor,
        "GOBAN_SEARCH_WIN_LOSS_UTILITY_FACTOR",
        parse
    );
    env_override!(config, search.score_utility_factor, "GOBAN_SEARCH_SCORE_UTILITY_FACTOR", parse);
    env_override!(config, search.score_scale, "GOBAN_SEARCH_SCORE_SCALE", parse);
    env_override!(config, search.lcb_stdevs, "GOBAN_SEARCH_LCB_STDEVS", parse);
    env_override!(config, search.virtual_loss, "GOBAN_SEARCH_VIRTUAL_LOSS", parse);
    env_override!(config, search.root_noise, "GOBAN_SEARCH_ROOT_NOISE", parse);
    env_override!(config, search.dirichlet_alpha, "GOBAN_SEARCH_DIRICHLET_ALPHA", parse);
    env_override!(config, search.dirichlet_epsilon, "GOBAN_SEARCH_DIRICHLET_EPSILON", parse);
    env_override!(config, search.seed, "GOBAN_SEARCH_SEED", parse);

    // Batcher
    env_override!(config, batcher.max_batch_size, "GOBAN_BATCHER_MAX_BATCH_SIZE", parse);
    env_override!(config, batcher.max_wait_micros, "GOBAN_BATCHER_MAX_WAIT_MICROS", parse);
    env_override!(config, batcher.cache_size, "GOBAN_BATCHER_CACHE_SIZE", parse);

    // Play
    env_override!(config, play.allow_resignation, "GOBAN_PLAY_ALLOW_RESIGNATION", parse);
    env_override!(config, play.resign_threshold, "GOBAN_PLAY_RESIGN_THRESHOLD", parse);
    env_override!(config, play.resign_consec_turns, "GOBAN_PLAY_RESIGN_CONSEC_TURNS", parse);
    env_override!(
        config,
        play.search_factor_when_winning,
        "GOBAN_PLAY_SEARCH_FACTOR_WHEN_WINNING",
        parse
    );
    env_override!(
        config,
        play.search_factor_when_winning_threshold,
        "GOBAN_PLAY_SEARCH_FACTOR_WHEN_WINNING_THRESHOLD",
        parse
    );
    env_override!(
        config,
        play.dynamic_pda_cap_per_opp_lead,
        "GOBAN_PLAY_DYNAMIC_PDA_CAP_PER_OPP_LEAD",
        parse
    );
    env_override!(config, play.model_path, "GOBAN_PLAY_MODEL_PATH");

    // Analysis
    env_override!(
        config,
        analysis.num_analysis_threads,
        "GOBAN_ANALYSIS_NUM_ANALYSIS_THREADS",
        parse
    );
    env_override!(config, analysis.analysis_pv_len, "GOBAN_ANALYSIS_ANALYSIS_PV_LEN", parse);
    env_override!(config, analysis.report_perspective, "GOBAN_ANALYSIS_REPORT_PERSPECTIVE");
    env_override!(
        config,
        analysis.white_bonus_per_handicap_stone,
        "GOBAN_ANALYSIS_WHITE_BONUS_PER_HANDICAP_STONE",
        parse
    );
    env_override!(
        config,
        analysis.assume_multiple_starting_black_moves_are_handicap,
        "GOBAN_ANALYSIS_ASSUME_MULTIPLE_STARTING_BLACK_MOVES_ARE_HANDICAP",
        parse
    );
    env_override!(
        config,
        analysis.ownership_min_visits,
        "GOBAN_ANALYSIS_OWNERSHIP_MIN_VISITS",
        parse
    );

    config
}
