//! Rolling Baselines
//! Mission: Maintain per-metric rolling statistics and flag deviations

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Rolling window of recent values for one (asset, metric) pairing.
///
/// The window holds the last N accepted values. A new observation is tested
/// against the statistics of the existing window before it is absorbed, so a
/// single outlier cannot mask itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaselineState {
    capacity: usize,
    window: VecDeque<f64>,
}

impl BaselineState {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            window: VecDeque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.window.len() >= self.capacity
    }

    pub fn mean(&self) -> f64 {
        if self.window.is_empty() {
            return 0.0;
        }
        self.window.iter().sum::<f64>() / self.window.len() as f64
    }

    /// Sample standard deviation of the window.
    pub fn stddev(&self) -> f64 {
        let count = self.window.len();
        if count < 2 {
            return 0.0;
        }
        let mean = self.mean();
        let variance = self
            .window
            .iter()
            .map(|value| (value - mean).powi(2))
            .sum::<f64>()
            / (count - 1) as f64;
        variance.sqrt()
    }

    /// Test a new value against the current window, then absorb it.
    ///
    /// Returns the signed deviation multiplier `(v − μ) / σ` when the window
    /// is full and the deviation magnitude reaches the threshold. A steady
    /// run collapses σ to zero, so σ is floored at machine epsilon: any
    /// departure from a flat baseline is then maximally anomalous, while a
    /// repeat of the flat value scores zero.
    pub fn observe(&mut self, value: f64, threshold: f64) -> Option<f64> {
        let mut anomaly = None;
        if self.is_full() {
            let mean = self.mean();
            let sigma = self.stddev().max(f64::EPSILON);
            let deviation = (value - mean) / sigma;
            if deviation.abs() >= threshold {
                anomaly = Some(deviation);
            }
        }
        self.window.push_back(value);
        while self.window.len() > self.capacity {
            self.window.pop_front();
        }
        anomaly
    }

    pub fn values(&self) -> Vec<f64> {
        self.window.iter().copied().collect()
    }

    pub fn from_values(capacity: usize, values: Vec<f64>) -> Self {
        let mut state = Self::new(capacity);
        for value in values {
            state.window.push_back(value);
        }
        while state.window.len() > state.capacity {
            state.window.pop_front();
        }
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_anomaly_until_window_full() {
        let mut baseline = BaselineState::new(20);
        for _ in 0..19 {
            assert!(baseline.observe(10.0, 3.0).is_none());
        }
        // Window not yet full: even a wild value passes silently.
        assert!(baseline.observe(95.0, 3.0).is_none());
    }

    #[test]
    fn test_steady_run_then_spike_flags_anomaly() {
        let mut baseline = BaselineState::new(20);
        for _ in 0..20 {
            assert!(baseline.observe(10.0, 3.0).is_none());
        }
        let deviation = baseline.observe(95.0, 3.0).expect("spike must flag");
        assert!(deviation >= 3.0);
        assert!(deviation.is_finite());
    }

    #[test]
    fn test_flat_value_on_flat_baseline_is_quiet() {
        let mut baseline = BaselineState::new(20);
        for _ in 0..20 {
            baseline.observe(10.0, 3.0);
        }
        assert!(baseline.observe(10.0, 3.0).is_none());
    }

    #[test]
    fn test_deviation_sign_is_preserved() {
        let mut baseline = BaselineState::new(5);
        for value in [50.0, 52.0, 48.0, 51.0, 49.0] {
            baseline.observe(value, 3.0);
        }
        let deviation = baseline.observe(0.0, 3.0).expect("drop must flag");
        assert!(deviation < 0.0);
    }

    #[test]
    fn test_window_eviction_fifo() {
        let mut baseline = BaselineState::new(3);
        for value in [1.0, 2.0, 3.0, 4.0] {
            baseline.observe(value, 100.0);
        }
        assert_eq!(baseline.values(), vec![2.0, 3.0, 4.0]);
        assert_eq!(baseline.len(), 3);
    }

    #[test]
    fn test_statistics() {
        let baseline = BaselineState::from_values(10, vec![2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert!((baseline.mean() - 5.0).abs() < 1e-9);
        // Sample stddev of this classic set is ~2.138.
        assert!((baseline.stddev() - 2.1380899352993947).abs() < 1e-9);
    }
}
