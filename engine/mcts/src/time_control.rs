//! Per-player clocks and per-move time budgets.
//!
//! Mirrors the information a GTP controller sends with `time_settings` and
//! `time_left`: a main time followed by canadian overtime (a number of
//! stones to play within each period), or plain absolute time, or no limit.

use std::time::Duration;

use thiserror::Error;

/// Main time used to represent "no limit".
const UNLIMITED_SECS: f64 = 1.0e30;
/// Anything above this is treated as unlimited.
const MAX_SECS: f64 = 1.0e50;
const MAX_STONES: u32 = 100_000;
/// Own moves assumed left in the game at minimum, as a share of the board area.
const MIN_MOVES_LEFT_PER_AREA: f64 = 0.05;

/// Errors from clock updates.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TimeControlError {
    #[error("invalid main_time")]
    InvalidMainTime,

    #[error("invalid byo_yomi_time")]
    InvalidByoYomiTime,

    #[error("invalid byo_yomi_stones")]
    InvalidByoYomiStones,

    #[error("invalid time")]
    InvalidTimeLeft,

    #[error("invalid stones")]
    InvalidStones,
}

/// Clock state of one player.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeControls {
    pub original_main_time: f64,
    /// Seconds added after every move.
    pub increment: f64,
    pub original_num_periods: u32,
    pub num_stones_per_period: u32,
    pub per_period_time: f64,

    pub main_time_left: f64,
    pub in_overtime: bool,
    pub num_periods_left_including_current: u32,
    pub num_stones_left_in_period: u32,
    pub time_left_in_period: f64,
}

impl Default for TimeControls {
    fn default() -> Self {
        Self::unlimited()
    }
}

impl TimeControls {
    /// No time limit at all.
    pub fn unlimited() -> Self {
        Self {
            original_main_time: UNLIMITED_SECS,
            increment: 0.0,
            original_num_periods: 0,
            num_stones_per_period: 0,
            per_period_time: 0.0,
            main_time_left: UNLIMITED_SECS,
            in_overtime: false,
            num_periods_left_including_current: 0,
            num_stones_left_in_period: 0,
            time_left_in_period: 0.0,
        }
    }

    /// Sudden death: `main_time` seconds for the whole game.
    pub fn absolute(main_time: f64) -> Self {
        Self {
            original_main_time: main_time,
            main_time_left: main_time,
            ..Self::unlimited()
        }
    }

    /// Main time followed by one canadian period of `stones` moves in
    /// `period_time` seconds.
    pub fn canadian(main_time: f64, period_time: f64, stones: u32) -> Self {
        Self {
            original_main_time: main_time,
            original_num_periods: 1,
            num_stones_per_period: stones,
            per_period_time: period_time,
            main_time_left: main_time,
            num_periods_left_including_current: 1,
            ..Self::unlimited()
        }
    }

    /// Interpret GTP `time_settings main_time byo_yomi_time byo_yomi_stones`.
    pub fn from_time_settings(
        main_time: f64,
        byo_yomi_time: f64,
        byo_yomi_stones: i64,
    ) -> Result<Self, TimeControlError> {
        if main_time.is_nan() || !(0.0..=MAX_SECS).contains(&main_time) {
            return Err(TimeControlError::InvalidMainTime);
        }
        if byo_yomi_time.is_nan() || !(0.0..=MAX_SECS).contains(&byo_yomi_time) {
            return Err(TimeControlError::InvalidByoYomiTime);
        }
        if !(0..=MAX_STONES as i64).contains(&byo_yomi_stones) {
            return Err(TimeControlError::InvalidByoYomiStones);
        }

        Ok(match byo_yomi_stones {
            // GTP spells "no limit" as zero stones with positive overtime.
            0 if byo_yomi_time > 0.0 => Self::unlimited(),
            0 => Self::absolute(main_time),
            stones => Self::canadian(main_time, byo_yomi_time, stones as u32),
        })
    }

    /// Apply GTP `time_left`. Zero stones means the player is still in main
    /// time; otherwise they are in overtime with `stones` left to play.
    pub fn apply_time_left(&mut self, time: f64, stones: i64) -> Result<(), TimeControlError> {
        // Controllers sometimes report slightly negative time.
        if time.is_nan() || !(-10.0..=MAX_SECS).contains(&time) {
            return Err(TimeControlError::InvalidTimeLeft);
        }
        if !(0..=MAX_STONES as i64).contains(&stones) {
            return Err(TimeControlError::InvalidStones);
        }

        if stones == 0 {
            self.main_time_left = time;
            self.in_overtime = false;
            self.num_periods_left_including_current = self.original_num_periods;
            self.num_stones_left_in_period = 0;
            self.time_left_in_period = 0.0;
        } else {
            self.main_time_left = 0.9;
            self.in_overtime = true;
            self.num_periods_left_including_current = 1;
            self.num_stones_left_in_period = stones as u32;
            self.time_left_in_period = time;
        }
        Ok(())
    }

    pub fn is_unlimited(&self) -> bool {
        !self.in_overtime && self.main_time_left >= UNLIMITED_SECS
    }

    /// Seconds to spend on the next move, before any search factor.
    ///
    /// `None` when the clock imposes no limit.
    pub fn recommended_secs(&self, board_area: usize, turn_number: usize, lag_buffer_secs: f64) -> Option<f64> {
        if self.is_unlimited() {
            return None;
        }

        let area = board_area.max(1) as f64;
        let own_moves_left = ((0.75 * area - turn_number as f64) / 2.0)
            .max(MIN_MOVES_LEFT_PER_AREA * area)
            .max(1.0);

        let mut budget = if self.in_overtime {
            self.time_left_in_period / self.num_stones_left_in_period.max(1) as f64
        } else {
            let mut main = self.main_time_left.max(0.0) / own_moves_left;
            if self.num_periods_left_including_current > 0 && self.num_stones_per_period > 0 {
                // Overtime is guaranteed, so one move's share of it is safe to spend now.
                main += self.per_period_time / self.num_stones_per_period as f64;
            }
            main
        };
        budget += self.increment;
        Some((budget - lag_buffer_secs).max(0.0))
    }

    /// Time budget for the next move after applying `search_factor` and an
    /// optional hard cap.
    pub fn time_budget(
        &self,
        board_area: usize,
        turn_number: usize,
        lag_buffer_secs: f64,
        search_factor: f64,
        max_time: Option<Duration>,
    ) -> Option<Duration> {
        let from_clock = self
            .recommended_secs(board_area, turn_number, lag_buffer_secs)
            .map(|secs| Duration::from_secs_f64((secs * search_factor.max(0.0)).min(MAX_SECS)));
        match (from_clock, max_time) {
            (Some(clock), Some(cap)) => Some(clock.min(cap)),
            (Some(clock), None) => Some(clock),
            (None, cap) => cap.map(|c| c.mul_f64(search_factor.clamp(0.0, 1.0))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_settings_variants() {
        assert!(TimeControls::from_time_settings(0.0, 1.0, 0).unwrap().is_unlimited());

        let absolute = TimeControls::from_time_settings(600.0, 0.0, 0).unwrap();
        assert_eq!(absolute.main_time_left, 600.0);
        assert_eq!(absolute.original_num_periods, 0);

        let canadian = TimeControls::from_time_settings(300.0, 60.0, 25).unwrap();
        assert_eq!(canadian.num_stones_per_period, 25);
        assert_eq!(canadian.num_periods_left_including_current, 1);
        assert!(!canadian.in_overtime);
    }

    #[test]
    fn test_time_settings_validation() {
        assert_eq!(
            TimeControls::from_time_settings(-1.0, 0.0, 0),
            Err(TimeControlError::InvalidMainTime)
        );
        assert_eq!(
            TimeControls::from_time_settings(1.0, f64::NAN, 0),
            Err(TimeControlError::InvalidByoYomiTime)
        );
        assert_eq!(
            TimeControls::from_time_settings(1.0, 1.0, -3),
            Err(TimeControlError::InvalidByoYomiStones)
        );
    }

    #[test]
    fn test_time_left_enters_overtime() {
        let mut tc = TimeControls::canadian(300.0, 60.0, 25);
        tc.apply_time_left(42.0, 10).unwrap();
        assert!(tc.in_overtime);
        assert_eq!(tc.main_time_left, 0.9);
        assert_eq!(tc.num_stones_left_in_period, 10);

        tc.apply_time_left(120.0, 0).unwrap();
        assert!(!tc.in_overtime);
        assert_eq!(tc.main_time_left, 120.0);
        assert_eq!(tc.num_periods_left_including_current, 1);

        assert_eq!(tc.apply_time_left(-20.0, 0), Err(TimeControlError::InvalidTimeLeft));
    }

    #[test]
    fn test_recommended_time() {
        assert_eq!(TimeControls::unlimited().recommended_secs(361, 0, 0.0), None);

        let mut tc = TimeControls::canadian(0.0, 30.0, 5);
        tc.apply_time_left(30.0, 5).unwrap();
        let secs = tc.recommended_secs(361, 100, 1.0).unwrap();
        assert!((secs - 5.0).abs() < 1e-9);

        let absolute = TimeControls::absolute(100.0);
        let early = absolute.recommended_secs(81, 0, 0.0).unwrap();
        let late = absolute.recommended_secs(81, 60, 0.0).unwrap();
        assert!(late > early);
    }

    #[test]
    fn test_time_budget_applies_factor_and_cap() {
        let tc = TimeControls::absolute(1000.0);
        let full = tc.time_budget(361, 0, 0.0, 1.0, None).unwrap();
        let half = tc.time_budget(361, 0, 0.0, 0.5, None).unwrap();
        assert!((half.as_secs_f64() * 2.0 - full.as_secs_f64()).abs() < 1e-6);

        let capped = tc.time_budget(361, 0, 0.0, 1.0, Some(Duration::from_secs(1))).unwrap();
        assert_eq!(capped, Duration::from_secs(1));

        assert_eq!(TimeControls::unlimited().time_budget(361, 0, 0.0, 1.0, None), None);
    }
}
