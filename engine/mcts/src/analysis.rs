//! Read-only summaries of a search, handed to callers and callbacks.
//!
//! Values are from the perspective of the player to move at the root unless
//! stated otherwise. Snapshots taken while a search runs are best-effort:
//! counts of different moves may be read at slightly different times.

use engine_core::{Loc, Player};

/// Win/loss, score and utility summary at the root.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RootValues {
    pub visits: u64,
    /// Expected result in `[-1, 1]`.
    pub win_loss: f64,
    pub score_mean: f64,
    pub score_stdev: f64,
    pub utility: f64,
}

impl RootValues {
    /// Probability of winning in `[0, 1]`.
    pub fn winrate(&self) -> f64 {
        0.5 * (1.0 + self.win_loss)
    }

    /// Same values seen from white, given who moves at the root.
    pub fn for_white(&self, root_player: Player) -> RootValues {
        let sign = root_player.white_sign();
        RootValues {
            win_loss: self.win_loss * sign,
            score_mean: self.score_mean * sign,
            utility: self.utility * sign,
            ..*self
        }
    }
}

/// Statistics of one candidate root move.
#[derive(Debug, Clone, PartialEq)]
pub struct MoveInfo {
    pub loc: Loc,
    pub visits: u64,
    pub utility: f64,
    pub win_loss: f64,
    pub score_mean: f64,
    pub score_stdev: f64,
    /// Root prior after temperature and noise.
    pub prior: f64,
    /// Lower confidence bound on the winrate.
    pub lcb: f64,
    /// Lower confidence bound on the utility.
    pub utility_lcb: f64,
    /// Rank among candidates, 0 for the best.
    pub order: usize,
    /// Principal variation starting with `loc`.
    pub pv: Vec<Loc>,
}

impl MoveInfo {
    pub fn winrate(&self) -> f64 {
        0.5 * (1.0 + self.win_loss)
    }
}

/// Everything an analysis consumer needs from one checkpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisSnapshot {
    pub root_player: Player,
    pub root_visits: u64,
    pub root_values: Option<RootValues>,
    pub moves: Vec<MoveInfo>,
    /// Per board point, row-major, `-1` opponent to `+1` root player.
    pub ownership: Option<Vec<f64>>,
}

impl AnalysisSnapshot {
    pub fn best_move(&self) -> Option<&MoveInfo> {
        self.moves.first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_values_for_white() {
        let values = RootValues {
            visits: 10,
            win_loss: 0.4,
            score_mean: 3.0,
            score_stdev: 5.0,
            utility: 0.5,
        };
        assert!((values.winrate() - 0.7).abs() < 1e-12);

        let white = values.for_white(Player::Black);
        assert_eq!(white.win_loss, -0.4);
        assert_eq!(white.score_mean, -3.0);
        assert_eq!(white.score_stdev, 5.0);
        assert_eq!(values.for_white(Player::White), values);
    }
}
