//! Neural network input encoding.
//!
//! Positions are encoded from the perspective of the side to move and padded
//! to a fixed `max_len x max_len` grid so that boards of different sizes can
//! share one batch.
//!
//! Spatial planes, each `max_len * max_len` floats:
//! 0. on-board mask
//! 1. own stones
//! 2. opponent stones
//! 3. simple-ko forbidden point
//! 4. last move
//!
//! Global features: komi from the mover's side / 20, last move was a pass,
//! territory scoring flag, playout doubling advantage.

use crate::player::Loc;
use crate::position::Position;
use crate::rules::ScoringRule;

pub const NUM_SPATIAL_FEATURES: usize = 5;
pub const NUM_GLOBAL_FEATURES: usize = 4;

/// Length of one encoded input row.
pub const fn feature_len(max_len: usize) -> usize {
    NUM_SPATIAL_FEATURES * max_len * max_len + NUM_GLOBAL_FEATURES
}

/// Length of the policy output: one slot per padded point plus pass.
pub const fn policy_len(max_len: usize) -> usize {
    max_len * max_len + 1
}

/// Policy slot for a move on the padded grid.
pub fn policy_index(loc: Loc, max_len: usize) -> usize {
    match loc {
        Loc::Pass => max_len * max_len,
        Loc::Point { x, y } => y as usize * max_len + x as usize,
    }
}

/// Encode `position` for the side to move.
pub fn encode_features(position: &Position, max_len: usize, playout_doubling_advantage: f32) -> Vec<f32> {
    let board = position.board();
    let plane = max_len * max_len;
    let pla = position.next_player();
    let mut out = vec![0.0f32; feature_len(max_len)];

    for loc in board.points() {
        let i = policy_index(loc, max_len);
        out[i] = 1.0;
        match board.stone_at(loc) {
            Some(p) if p == pla => out[plane + i] = 1.0,
            Some(_) => out[2 * plane + i] = 1.0,
            None => {}
        }
    }

    if let Some(ko) = board.ko_point() {
        out[3 * plane + policy_index(ko, max_len)] = 1.0;
    }

    let last = position.last_move();
    if let Some(m) = last.filter(|m| !m.loc.is_pass()) {
        out[4 * plane + policy_index(m.loc, max_len)] = 1.0;
    }

    let globals = NUM_SPATIAL_FEATURES * plane;
    out[globals] = (position.rules().komi * pla.white_sign() as f32) / 20.0;
    out[globals + 1] = if last.is_some_and(|m| m.loc.is_pass()) { 1.0 } else { 0.0 };
    out[globals + 2] = if position.rules().scoring_rule == ScoringRule::Territory {
        1.0
    } else {
        0.0
    };
    out[globals + 3] = playout_doubling_advantage;
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::MAX_BOARD_LEN;
    use crate::rules::Rules;

    #[test]
    fn test_feature_sizes() {
        assert_eq!(feature_len(19), 5 * 361 + 4);
        assert_eq!(policy_len(19), 362);
        assert_eq!(policy_index(Loc::Pass, 19), 361);
        assert_eq!(policy_index(Loc::point(2, 1), 19), 21);
    }

    #[test]
    fn test_encode_small_board_padded() {
        let position = Position::empty(9, 9, Rules::chinese())
            .unwrap()
            .play(Loc::point(4, 4))
            .unwrap();
        let features = encode_features(&position, MAX_BOARD_LEN, 0.5);
        let plane = MAX_BOARD_LEN * MAX_BOARD_LEN;
        let center = policy_index(Loc::point(4, 4), MAX_BOARD_LEN);

        // Off-board points stay zero.
        assert_eq!(features[policy_index(Loc::point(10, 0), MAX_BOARD_LEN)], 0.0);
        assert_eq!(features[center], 1.0);
        // White to move, so black's stone is the opponent's.
        assert_eq!(features[2 * plane + center], 1.0);
        assert_eq!(features[4 * plane + center], 1.0);
        let globals = NUM_SPATIAL_FEATURES * plane;
        assert!((features[globals] - 7.5 / 20.0).abs() < 1e-6);
        assert_eq!(features[globals + 3], 0.5);
    }
}
