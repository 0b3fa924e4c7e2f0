//! Go rules and positions for the search engine.
//!
//! This crate is the rules collaborator the search relies on:
//! - [`Board`]: stones, captures, ko point, area classification
//! - [`Rules`]: ko, scoring and suicide settings plus komi
//! - [`Position`]: board plus side to move, history, superko and scoring
//! - [`features`]: fixed-size network input encoding

pub mod board;
pub mod error;
pub mod features;
pub mod player;
pub mod position;
pub mod rules;

pub use board::{Board, MAX_BOARD_LEN};
pub use error::RulesError;
pub use features::{encode_features, feature_len, policy_index, policy_len};
pub use player::{Loc, Player};
pub use position::{Move, Position};
pub use rules::{KoRule, Rules, ScoringRule};
