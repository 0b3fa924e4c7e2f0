//! Search parameters.

use std::time::Duration;

/// Parameters controlling a single search.
///
/// Sessions hold one of these and the analysis service overrides a few
/// fields per request.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchParams {
    /// Simulation threads per search.
    pub num_threads: usize,

    /// Stop once the root has this many visits.
    pub max_visits: u64,

    /// Hard cap on the duration of one search. `0.0` disables the cap.
    pub max_time_secs: f64,

    /// Seconds subtracted from every clock-derived budget.
    pub lag_buffer_secs: f64,

    /// Exploration constant in the PUCT formula.
    pub c_puct: f64,

    /// First-play urgency reduction for unvisited children below the root.
    /// Scaled by the square root of the policy mass already visited.
    pub fpu_reduction_max: f64,

    /// First-play urgency reduction at the root.
    pub root_fpu_reduction_max: f64,

    /// Root policy temperature. Values above 1 flatten the priors, values
    /// below 1 sharpen them.
    pub root_policy_temperature: f64,

    /// Weight of the win/loss value in the utility.
    pub win_loss_utility_factor: f64,

    /// Weight of the score value in the utility.
    pub score_utility_factor: f64,

    /// Points at which the score value reaches about half its range.
    pub score_scale: f64,

    /// Standard errors subtracted for the lower confidence bound.
    pub lcb_stdevs: f64,

    /// Virtual losses added per in-flight visit.
    pub virtual_loss: u32,

    /// Mix Dirichlet noise into the root priors.
    pub root_noise: bool,
    pub dirichlet_alpha: f64,
    pub dirichlet_epsilon: f64,

    /// Handicap compensation fed to the network. Positive values make the
    /// side to move play as if it had more playouts than its opponent.
    pub playout_doubling_advantage: f64,

    /// Nodes with fewer visits are skipped when averaging ownership.
    pub ownership_min_visits: u64,

    /// Seed for root noise. `0` seeds from entropy.
    pub seed: u64,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            num_threads: 4,
            max_visits: 500,
            max_time_secs: 0.0,
            lag_buffer_secs: 0.0,
            c_puct: 1.1,
            fpu_reduction_max: 0.2,
            root_fpu_reduction_max: 0.1,
            root_policy_temperature: 1.0,
            win_loss_utility_factor: 1.0,
            score_utility_factor: 0.1,
            score_scale: 20.0,
            lcb_stdevs: 5.0,
            virtual_loss: 1,
            root_noise: false,
            dirichlet_alpha: 0.03,
            dirichlet_epsilon: 0.25,
            playout_doubling_advantage: 0.0,
            ownership_min_visits: 3,
            seed: 0,
        }
    }
}

impl SearchParams {
    /// Create a fast, deterministic config for testing.
    pub fn for_testing() -> Self {
        Self {
            num_threads: 2,
            max_visits: 32,
            max_time_secs: 0.0,
            seed: 42,
            ..Self::default()
        }
    }

    /// The largest utility magnitude a single evaluation can produce.
    pub fn max_utility(&self) -> f64 {
        self.win_loss_utility_factor + self.score_utility_factor
    }

    /// Hard time cap, if any.
    pub fn max_time(&self) -> Option<Duration> {
        (self.max_time_secs > 0.0).then(|| Duration::from_secs_f64(self.max_time_secs))
    }

    /// Builder pattern: set visit budget.
    pub fn with_max_visits(mut self, visits: u64) -> Self {
        self.max_visits = visits;
        self
    }

    /// Builder pattern: set number of simulation threads.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.num_threads = threads;
        self
    }

    /// Builder pattern: set time cap in seconds.
    pub fn with_max_time_secs(mut self, secs: f64) -> Self {
        self.max_time_secs = secs;
        self
    }

    /// Builder pattern: set root policy temperature.
    pub fn with_root_policy_temperature(mut self, temperature: f64) -> Self {
        self.root_policy_temperature = temperature;
        self
    }

    /// Builder pattern: enable or disable root noise.
    pub fn with_root_noise(mut self, enabled: bool) -> Self {
        self.root_noise = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_params() {
        let params = SearchParams::default();
        assert_eq!(params.max_visits, 500);
        assert!((params.c_puct - 1.1).abs() < 1e-9);
        assert!((params.max_utility() - 1.1).abs() < 1e-9);
    }

    #[test]
    fn test_builder_pattern() {
        let params = SearchParams::default()
            .with_max_visits(100)
            .with_threads(8)
            .with_root_policy_temperature(1.5);

        assert_eq!(params.max_visits, 100);
        assert_eq!(params.num_threads, 8);
        assert!((params.root_policy_temperature - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_max_time() {
        assert!(SearchParams::for_testing().max_time().is_none());
        assert!(SearchParams::default().max_time().is_none());
        let params = SearchParams::default().with_max_time_secs(2.5);
        assert_eq!(params.max_time(), Some(Duration::from_millis(2500)));
    }
}
