//! Game-level adjustments made between searches: resignation, spending less
//! time when clearly winning, and dynamic handicap compensation through the
//! playout doubling advantage (PDA).
//!
//! All recent win/loss values passed in here are from white's perspective,
//! oldest first.

use engine_core::{Player, Position, MAX_BOARD_LEN};

/// PDA moves in steps of this size. A power of two keeps rounding exact.
pub const PDA_INCREMENT: f64 = 0.125;
/// Largest PDA ever requested.
pub const PDA_HARD_CAP: f64 = 2.75;
/// Black advantage (points) below which no compensation is applied.
const PDA_SCALING_START_POINTS: f64 = 7.0;
/// Value of one handicap stone in points.
const POINTS_PER_HANDICAP_STONE: f64 = 15.0;
/// Turns of history consulted by the search factor rule.
const SEARCH_FACTOR_TURNS: usize = 3;

/// Settings for the adaptive behaviours of a playing session.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayParams {
    pub allow_resignation: bool,
    /// Resign when the white-perspective value is beyond this for the losing side.
    pub resign_threshold: f64,
    pub resign_consec_turns: usize,

    pub search_factor_when_winning: f64,
    pub search_factor_when_winning_threshold: f64,

    /// Zero disables dynamic handicap compensation.
    pub dynamic_pda_cap_per_opp_lead: f64,
    /// Side that receives the compensation.
    pub pda_player: Player,

    /// Treat black moves before white's first move as handicap stones.
    pub count_leading_black_moves_as_handicap: bool,
}

impl Default for PlayParams {
    fn default() -> Self {
        Self {
            allow_resignation: false,
            resign_threshold: -0.90,
            resign_consec_turns: 3,
            search_factor_when_winning: 1.0,
            search_factor_when_winning_threshold: 1.0,
            dynamic_pda_cap_per_opp_lead: 0.045,
            pda_player: Player::White,
            count_leading_black_moves_as_handicap: true,
        }
    }
}

/// Estimated black advantage in points: 15 per handicap stone beyond the
/// first, plus whatever komi is short of 7.
pub fn initial_black_advantage(position: &Position, count_leading_black_moves: bool) -> f64 {
    let extra_black_stones = position.handicap_stones(count_leading_black_moves).saturating_sub(1);
    POINTS_PER_HANDICAP_STONE * extra_black_stones as f64 + (7.0 - position.rules().komi as f64)
}

/// Decide whether `pla` should resign now.
///
/// `recent_values` must already include the value of the search just
/// finished. `lead` is white's expected lead in points.
pub fn should_resign(
    position: &Position,
    pla: Player,
    recent_values: &[f64],
    lead: f64,
    params: &PlayParams,
) -> bool {
    let board = position.board();
    let area = board.area() as f64;
    let advantage = initial_black_advantage(position, params.count_leading_black_moves_as_handicap);

    let mut min_turn_for_resignation = 0usize;
    let mut no_resignation_when_white_score_above = area;
    if advantage > 0.9 && pla == Player::White {
        // Play at least some moves no matter what.
        min_turn_for_resignation = 1 + board.area() / 5;

        // White is expected to catch up gradually. Only resign when well
        // behind that schedule.
        let turns_to_catch_up = (0.60 * area - min_turn_for_resignation as f64).max(1.0);
        let turns_spent = (position.moves().len() as f64 - min_turn_for_resignation as f64)
            .clamp(0.0, turns_to_catch_up);

        let mut resign_score = -advantage * ((turns_to_catch_up - turns_spent) / turns_to_catch_up);
        resign_score -= 5.0;
        resign_score -= advantage * 0.15;
        no_resignation_when_white_score_above = resign_score;
    }

    if position.moves().len() < min_turn_for_resignation {
        return false;
    }
    if pla == Player::White && lead > no_resignation_when_white_score_above {
        return false;
    }
    if params.resign_consec_turns > recent_values.len() {
        return false;
    }

    recent_values
        .iter()
        .rev()
        .take(params.resign_consec_turns)
        .all(|&value| {
            let resigning = if value < params.resign_threshold {
                Some(Player::White)
            } else if value > -params.resign_threshold {
                Some(Player::Black)
            } else {
                None
            };
            resigning == Some(pla)
        })
}

/// Search time multiplier for `pla`: `search_factor_when_winning` once the
/// last three values all favour `pla` beyond the threshold, else 1.
pub fn search_factor(
    params: &PlayParams,
    win_loss_utility_factor: f64,
    recent_values: &[f64],
    pla: Player,
) -> f64 {
    if recent_values.len() < SEARCH_FACTOR_TURNS
        || win_loss_utility_factor - params.search_factor_when_winning_threshold <= 1e-10
    {
        return 1.0;
    }
    let winning = recent_values
        .iter()
        .rev()
        .take(SEARCH_FACTOR_TURNS)
        .all(|&value| value * pla.white_sign() >= params.search_factor_when_winning_threshold);
    if winning {
        params.search_factor_when_winning
    } else {
        1.0
    }
}

/// Largest compensation for this position, rounded to [`PDA_INCREMENT`].
pub fn pda_cap(position: &Position, params: &PlayParams) -> f64 {
    let advantage = initial_black_advantage(position, params.count_leading_black_moves_as_handicap);
    let full_area = (MAX_BOARD_LEN * MAX_BOARD_LEN) as f64;
    let size_scale = (full_area / position.board().area().max(1) as f64).powf(0.25);
    let cap = PDA_HARD_CAP.min(params.dynamic_pda_cap_per_opp_lead * (advantage - PDA_SCALING_START_POINTS) * size_scale);
    (cap / PDA_INCREMENT).round() * PDA_INCREMENT
}

/// Next desired PDA for `pla`, given the currently desired value.
///
/// Returns `current` unchanged when dynamic compensation is disabled.
pub fn update_playout_doubling_advantage(
    position: &Position,
    pla: Player,
    recent_values: &[f64],
    current: f64,
    params: &PlayParams,
) -> f64 {
    if params.dynamic_pda_cap_per_opp_lead <= 0.0 {
        return current;
    }
    let advantage = initial_black_advantage(position, params.count_leading_black_moves_as_handicap);
    if advantage < PDA_SCALING_START_POINTS || pla != params.pda_player {
        return 0.0;
    }

    let cap = pda_cap(position, params);
    let no_white_stones = position.board().count_stones(Player::White) == 0;
    let Some(&last) = recent_values.last() else {
        return cap;
    };
    if no_white_stones {
        return cap;
    }

    // Aim to keep pla's win/loss value between -0.9 and -0.5.
    let value = last * pla.white_sign();
    let desired = if value < -0.9 {
        current + PDA_INCREMENT
    } else if value > -0.5 {
        current - PDA_INCREMENT
    } else {
        current
    };
    desired.max(0.0).min(cap)
}
