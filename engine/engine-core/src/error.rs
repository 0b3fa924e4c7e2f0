//! Error types for board and rules handling.

use thiserror::Error;

use crate::player::Player;

/// Errors raised while building or mutating positions.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RulesError {
    #[error("invalid board size {x_size}x{y_size}, each side must be between 2 and {max}")]
    InvalidBoardSize {
        x_size: usize,
        y_size: usize,
        max: usize,
    },

    #[error("could not parse location '{0}'")]
    InvalidLocation(String),

    #[error("could not parse player '{0}'")]
    InvalidPlayer(String),

    #[error("unknown rules '{0}'")]
    UnknownRules(String),

    #[error("illegal move {loc} for {player}")]
    IllegalMove { loc: String, player: Player },

    #[error("could not place stone at {0}")]
    InvalidStone(String),

    #[error("invalid board text: {0}")]
    InvalidBoardText(String),
}
