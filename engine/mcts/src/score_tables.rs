//! Precomputed expected score values.
//!
//! The score part of the utility is `2/pi * atan(score / scale)`. The network
//! predicts a normal distribution over the final score, so the search needs
//! the expectation of that squashed value under `N(mean, stdev^2)`. The
//! integral has no closed form; [`ScoreTables`] samples it on a grid once and
//! interpolates afterwards. Build one per scale and share it with `Arc`.

use std::f64::consts::PI;

/// Grid resolution in units of `scale`.
const STEP: f64 = 0.05;
/// Largest `|mean| / scale` on the grid.
const MAX_MEAN: f64 = 8.0;
/// Largest `stdev / scale` on the grid.
const MAX_STDEV: f64 = 4.0;
/// Integration covers this many standard deviations each side.
const INTEGRATION_SIGMAS: f64 = 6.0;
const INTEGRATION_POINTS: usize = 121;

/// Immutable table of `E[2/pi * atan(X / scale)]`, `X ~ N(mean, stdev^2)`.
#[derive(Debug, Clone)]
pub struct ScoreTables {
    scale: f64,
    mean_points: usize,
    stdev_points: usize,
    /// Row-major by stdev: `values[s * mean_points + m]`.
    values: Vec<f64>,
}

impl ScoreTables {
    /// Build the tables for `scale` points. Non-positive scales fall back to 1.
    pub fn new(scale: f64) -> Self {
        let scale = if scale > 0.0 && scale.is_finite() { scale } else { 1.0 };
        let mean_points = (2.0 * MAX_MEAN / STEP).round() as usize + 1;
        let stdev_points = (MAX_STDEV / STEP).round() as usize + 1;

        let mut values = Vec::with_capacity(mean_points * stdev_points);
        for s in 0..stdev_points {
            let stdev = s as f64 * STEP;
            for m in 0..mean_points {
                let mean = -MAX_MEAN + m as f64 * STEP;
                values.push(expected_atan(mean, stdev));
            }
        }

        Self {
            scale,
            mean_points,
            stdev_points,
            values,
        }
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Expected score value in `[-1, 1]` for a predicted score distribution.
    pub fn score_value(&self, score_mean: f64, score_stdev: f64) -> f64 {
        let mean = score_mean / self.scale;
        let stdev = score_stdev.max(0.0) / self.scale;
        if !mean.is_finite() || !stdev.is_finite() {
            return 0.0;
        }
        if mean.abs() > MAX_MEAN || stdev > MAX_STDEV {
            return expected_atan(mean, stdev);
        }

        let mf = (mean + MAX_MEAN) / STEP;
        let sf = stdev / STEP;
        let m0 = (mf.floor() as usize).min(self.mean_points - 2);
        let s0 = (sf.floor() as usize).min(self.stdev_points - 2);
        let tm = mf - m0 as f64;
        let ts = sf - s0 as f64;

        let at = |s: usize, m: usize| self.values[s * self.mean_points + m];
        let low = at(s0, m0) * (1.0 - tm) + at(s0, m0 + 1) * tm;
        let high = at(s0 + 1, m0) * (1.0 - tm) + at(s0 + 1, m0 + 1) * tm;
        low * (1.0 - ts) + high * ts
    }
}

/// `E[2/pi * atan(X)]` for `X ~ N(mean, stdev^2)` by midpoint quadrature.
fn expected_atan(mean: f64, stdev: f64) -> f64 {
    if stdev <= 1e-9 {
        return 2.0 / PI * mean.atan();
    }
    let width = 2.0 * INTEGRATION_SIGMAS / INTEGRATION_POINTS as f64;
    let mut total = 0.0;
    let mut weight_sum = 0.0;
    for i in 0..INTEGRATION_POINTS {
        let z = -INTEGRATION_SIGMAS + (i as f64 + 0.5) * width;
        let w = (-0.5 * z * z).exp();
        total += w * (mean + stdev * z).atan();
        weight_sum += w;
    }
    2.0 / PI * total / weight_sum
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_stdev_matches_atan() {
        let tables = ScoreTables::new(20.0);
        for score in [-35.0, -7.5, 0.0, 3.25, 12.0] {
            let expected = 2.0 / PI * (score / 20.0f64).atan();
            assert!((tables.score_value(score, 0.0) - expected).abs() < 1e-3);
        }
    }

    #[test]
    fn test_symmetric_and_monotonic() {
        let tables = ScoreTables::new(20.0);
        assert!(tables.score_value(0.0, 10.0).abs() < 1e-9);
        assert!((tables.score_value(15.0, 8.0) + tables.score_value(-15.0, 8.0)).abs() < 1e-6);

        let mut prev = -1.0;
        for i in -40..=40 {
            let v = tables.score_value(i as f64 * 2.0, 10.0);
            assert!(v >= prev);
            prev = v;
        }
    }

    #[test]
    fn test_uncertainty_shrinks_value() {
        let tables = ScoreTables::new(20.0);
        let sharp = tables.score_value(30.0, 0.0);
        let blurry = tables.score_value(30.0, 40.0);
        assert!(blurry < sharp);
        assert!(blurry > 0.0);
    }

    #[test]
    fn test_off_grid_falls_back_to_integration() {
        let tables = ScoreTables::new(1.0);
        let v = tables.score_value(100.0, 0.0);
        assert!((v - 2.0 / PI * 100.0f64.atan()).abs() < 1e-9);
        assert!(tables.score_value(f64::NAN, 1.0) == 0.0);
    }

    #[test]
    fn test_interpolation_close_to_direct() {
        let tables = ScoreTables::new(20.0);
        let direct = expected_atan(13.3 / 20.0, 7.7 / 20.0);
        assert!((tables.score_value(13.3, 7.7) - direct).abs() < 1e-3);
    }
}
