//! Players and board locations.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RulesError;

/// One of the two sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Player {
    Black,
    White,
}

impl Player {
    pub fn opponent(self) -> Player {
        match self {
            Player::Black => Player::White,
            Player::White => Player::Black,
        }
    }

    /// Stable index, 0 for black and 1 for white.
    pub fn index(self) -> usize {
        match self {
            Player::Black => 0,
            Player::White => 1,
        }
    }

    /// +1.0 for white, -1.0 for black. Multiplying a white-perspective value
    /// by this converts it to this player's perspective and back.
    pub fn white_sign(self) -> f64 {
        match self {
            Player::Black => -1.0,
            Player::White => 1.0,
        }
    }
}

impl fmt::Display for Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Player::Black => write!(f, "B"),
            Player::White => write!(f, "W"),
        }
    }
}

impl FromStr for Player {
    type Err = RulesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "b" | "black" => Ok(Player::Black),
            "w" | "white" => Ok(Player::White),
            _ => Err(RulesError::InvalidPlayer(s.to_string())),
        }
    }
}

/// Column letters used by GTP coordinates. "I" is skipped.
const COLUMN_LETTERS: &[u8] = b"ABCDEFGHJKLMNOPQRSTUVWXYZ";

/// A move location: a board point or a pass.
///
/// `y = 0` is the top row, matching the way boards are printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Loc {
    Pass,
    Point { x: u8, y: u8 },
}

impl Loc {
    pub fn point(x: usize, y: usize) -> Loc {
        Loc::Point {
            x: x as u8,
            y: y as u8,
        }
    }

    pub fn is_pass(self) -> bool {
        matches!(self, Loc::Pass)
    }

    /// Format as a GTP coordinate such as `D4` or `pass`.
    ///
    /// Boards wider than the letter table fall back to `(x,y)`.
    pub fn to_gtp(self, x_size: usize, y_size: usize) -> String {
        match self {
            Loc::Pass => "pass".to_string(),
            Loc::Point { x, y } if x_size <= COLUMN_LETTERS.len() => {
                format!("{}{}", COLUMN_LETTERS[x as usize] as char, y_size - y as usize)
            }
            Loc::Point { x, y } => format!("({},{})", x, y),
        }
    }

    /// Parse a GTP coordinate for a board of the given size.
    pub fn parse_gtp(s: &str, x_size: usize, y_size: usize) -> Result<Loc, RulesError> {
        let invalid = || RulesError::InvalidLocation(s.to_string());
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("pass") {
            return Ok(Loc::Pass);
        }

        if let Some(inner) = trimmed.strip_prefix('(').and_then(|t| t.strip_suffix(')')) {
            let (xs, ys) = inner.split_once(',').ok_or_else(invalid)?;
            let x: usize = xs.trim().parse().map_err(|_| invalid())?;
            let y: usize = ys.trim().parse().map_err(|_| invalid())?;
            if x >= x_size || y >= y_size {
                return Err(invalid());
            }
            return Ok(Loc::point(x, y));
        }

        let mut chars = trimmed.chars();
        let letter = chars.next().ok_or_else(invalid)?.to_ascii_uppercase();
        let x = COLUMN_LETTERS
            .iter()
            .position(|&c| c as char == letter)
            .ok_or_else(invalid)?;
        let row: usize = chars.as_str().parse().map_err(|_| invalid())?;
        if x >= x_size || row == 0 || row > y_size {
            return Err(invalid());
        }
        Ok(Loc::point(x, y_size - row))
    }
}
