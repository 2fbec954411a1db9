//! Score history, trailing-window trend and stuck detection.

use crate::config::{clamp_usize, MAX_TREND_WINDOW, MIN_TREND_WINDOW};
use crate::models::ConvergenceMetrics;

/// Least-squares slope of `values` against their index. Fewer than two
/// points have no trend.
pub fn linear_slope(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let mean_x = (n - 1) as f64 / 2.0;
    let mean_y = values.iter().sum::<f64>() / n as f64;
    let mut numerator = 0.0;
    let mut denominator = 0.0;
    for (i, y) in values.iter().enumerate() {
        let dx = i as f64 - mean_x;
        numerator += dx * (y - mean_y);
        denominator += dx * dx;
    }
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

impl ConvergenceMetrics {
    pub fn new(window: usize, stuck_threshold: f64) -> Self {
        Self {
            window: clamp_usize(window, MIN_TREND_WINDOW, MAX_TREND_WINDOW),
            stuck_threshold: stuck_threshold.abs(),
            ..Self::default()
        }
    }

    /// Append a round's score and recompute trend and stuck state.
    pub fn record(&mut self, score: f64) {
        self.history.push(score);
        self.recompute();
    }

    pub fn window_scores(&self) -> &[f64] {
        let start = self.history.len().saturating_sub(self.window);
        &self.history[start..]
    }

    pub fn latest(&self) -> Option<f64> {
        self.history.last().copied()
    }

    pub fn best(&self) -> Option<f64> {
        self.history.iter().copied().reduce(f64::max)
    }

    fn recompute(&mut self) {
        self.trend = linear_slope(self.window_scores());
        let full_window = self.history.len() >= self.window;
        self.is_stuck = full_window && self.trend.abs() < self.stuck_threshold;
        self.stuck_reason = self.is_stuck.then(|| {
            format!(
                "score trend {:+.4} stayed within ±{:.4} over the last {} rounds",
                self.trend, self.stuck_threshold, self.window
            )
        });
    }
}
