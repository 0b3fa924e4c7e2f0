//! Tests for the configuration module.

use super::*;

#[test]
fn test_default_config() {
    let config = CentralConfig::default();
    assert_eq!(config.common.log_level, "info");
    assert_eq!(config.common.max_board_len, 19);
    assert_eq!(config.search.num_threads, 4);
    assert_eq!(config.search.max_visits, 500);
    assert_eq!(config.batcher.max_batch_size, 16);
    assert_eq!(config.analysis.num_analysis_threads, 2);
}

#[test]
fn test_search_defaults() {
    let config = CentralConfig::default();
    assert!((config.search.c_puct - 1.1).abs() < f64::EPSILON);
    assert!((config.search.fpu_reduction_max - 0.2).abs() < f64::EPSILON);
    assert!((config.search.root_fpu_reduction_max - 0.1).abs() < f64::EPSILON);
    assert!((config.search.root_policy_temperature - 1.0).abs() < f64::EPSILON);
    assert!((config.search.score_utility_factor - 0.1).abs() < f64::EPSILON);
    assert_eq!(config.search.virtual_loss, 1);
    assert_eq!(config.search.seed, 0);
    // Analysis runs until max_visits unless a time limit is configured.
    assert_eq!(config.search.max_time_secs, 0.0);
}

#[test]
fn test_play_defaults() {
    let config = CentralConfig::default();
    assert!(!config.play.allow_resignation);
    assert_eq!(config.play.resign_consec_turns, 3);
    assert!((config.play.search_factor_when_winning - 1.0).abs() < f64::EPSILON);
    assert!((config.play.dynamic_pda_cap_per_opp_lead - 0.045).abs() < f64::EPSILON);
    assert!(config.play.model_path.is_empty());
}

#[test]
fn test_batcher_defaults() {
    let config = CentralConfig::default();
    assert_eq!(config.batcher.max_wait_micros, 2000);
    assert_eq!(config.batcher.cache_size, 65536);
}

#[test]
fn test_goban_env_overrides() {
    std::env::set_var("GOBAN_SEARCH_MAX_VISITS", "77");
    std::env::set_var("GOBAN_PLAY_ALLOW_RESIGNATION", "true");
    std::env::set_var("GOBAN_ANALYSIS_REPORT_PERSPECTIVE", "black");
    std::env::set_var("GOBAN_BATCHER_CACHE_SIZE", "not-a-number");

    let config = load_config();
    assert_eq!(config.search.max_visits, 77);
    assert!(config.play.allow_resignation);
    assert_eq!(config.analysis.report_perspective, "black");
    // Unparseable values are ignored
    assert_eq!(config.batcher.cache_size, 65536);

    std::env::remove_var("GOBAN_SEARCH_MAX_VISITS");
    std::env::remove_var("GOBAN_PLAY_ALLOW_RESIGNATION");
    std::env::remove_var("GOBAN_ANALYSIS_REPORT_PERSPECTIVE");
    std::env::remove_var("GOBAN_BATCHER_CACHE_SIZE");
}

#[test]
fn test_parse_config_toml() {
    let toml_content = r#"
[common]
log_level = "debug"

[search]
num_threads = 8
max_visits = 1600
c_puct = 0.9

[batcher]
max_batch_size = 64

[analysis]
num_analysis_threads = 4
report_perspective = "side_to_move"
"#;
    let config: CentralConfig = toml::from_str(toml_content).unwrap();
    assert_eq!(config.common.log_level, "debug");
    assert_eq!(config.search.num_threads, 8);
    assert_eq!(config.search.max_visits, 1600);
    assert!((config.search.c_puct - 0.9).abs() < f64::EPSILON);
    assert_eq!(config.batcher.max_batch_size, 64);
    assert_eq!(config.analysis.num_analysis_threads, 4);
    assert_eq!(config.analysis.report_perspective, "side_to_move");
}

#[test]
fn test_partial_config() {
    let toml_content = r#"
[search]
max_visits = 10
"#;
    let config: CentralConfig = toml::from_str(toml_content).unwrap();
    assert_eq!(config.search.max_visits, 10);
    assert_eq!(config.search.num_threads, 4); // Default
    assert_eq!(config.common.max_board_len, 19); // Default
    assert_eq!(config.analysis.analysis_pv_len, 15); // Default
}

#[test]
fn test_load_from_missing_path_uses_defaults() {
    let config = load_from_path(std::path::Path::new("/nonexistent/goban/config.toml"));
    assert_eq!(config.batcher.max_batch_size, 16);
}
