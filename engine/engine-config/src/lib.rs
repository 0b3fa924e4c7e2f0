//! Centralized configuration loading from config.toml.
//!
//! This crate provides configuration structs and loading logic shared
//! by the search engine and the analysis service.
//!
//! # Configuration Priority
//!
//! Settings are loaded with the following priority (highest to lowest):
//! 1. Environment variables (`GOBAN_<SECTION>_<KEY>`)
//! 2. config.toml file
//! 3. Built-in defaults from config.defaults.toml
//!
//! # Environment Variable Override Pattern
//!
//! ```text
//! GOBAN_<SECTION>_<KEY>=value
//!
//! Examples:
//!     GOBAN_COMMON_LOG_LEVEL=debug
//!     GOBAN_SEARCH_MAX_VISITS=1600
//!     GOBAN_BATCHER_MAX_BATCH_SIZE=32
//!     GOBAN_ANALYSIS_NUM_ANALYSIS_THREADS=8
//! ```

mod defaults;
mod loader;
mod structs;

pub use defaults::*;
pub use loader::{apply_env_overrides, load_config, load_from_path, CONFIG_SEARCH_PATHS};
pub use structs::*;

#[cfg(test)]
mod tests;
