//! Sliding windows and least-squares trend fitting
//!
//! The fit is recomputed from scratch on every sample; windows are small
//! and fixed in size.

use crate::models::Channel;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// Samples needed before a trend is trusted
pub const MIN_SAMPLES: usize = 3;

/// Default window capacity
pub const DEFAULT_WINDOW_SIZE: usize = 10;

/// Slope magnitude above which a trend has a direction
const DIRECTION_THRESHOLD: f64 = 0.02;

/// Fixed-capacity, insertion-ordered buffer of recent samples
#[derive(Debug, Clone)]
pub struct SlidingWindow {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl SlidingWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a sample, evicting the oldest when full
    pub fn push(&mut self, value: f64) {
        while self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn latest(&self) -> Option<f64> {
        self.samples.back().copied()
    }

    /// Oldest first
    pub fn values(&self) -> Vec<f64> {
        self.samples.iter().copied().collect()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

/// Direction of a fitted trend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Rising,
    Falling,
    Stable,
}

impl TrendDirection {
    pub fn from_slope(slope: f64) -> Self {
        if slope > DIRECTION_THRESHOLD {
            TrendDirection::Rising
        } else if slope < -DIRECTION_THRESHOLD {
            TrendDirection::Falling
        } else {
            TrendDirection::Stable
        }
    }
}

impl std::fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrendDirection::Rising => write!(f, "rising"),
            TrendDirection::Falling => write!(f, "falling"),
            TrendDirection::Stable => write!(f, "stable"),
        }
    }
}

/// Least-squares fit of a window against its sample index
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegressionResult {
    pub slope: f64,
    pub r_squared: f64,
    pub intercept: f64,
    pub samples: usize,
}

impl RegressionResult {
    /// Result for windows too short (or too degenerate) to fit
    pub fn untrusted(samples: usize) -> Self {
        Self {
            slope: 0.0,
            r_squared: 0.0,
            intercept: 0.0,
            samples,
        }
    }

    pub fn direction(&self) -> TrendDirection {
        TrendDirection::from_slope(self.slope)
    }

    /// Value the fit expects for the next sample
    pub fn prediction(&self) -> f64 {
        round4(self.intercept + self.slope * self.samples as f64)
    }
}

/// Ordinary least squares with x = 0..n-1. Windows shorter than
/// [`MIN_SAMPLES`] yield slope and r² of zero. Results are rounded to four
/// decimals.
pub fn fit(window: &[f64]) -> RegressionResult {
    let n = window.len();
    if n < MIN_SAMPLES {
        return RegressionResult::untrusted(n);
    }

    let nf = n as f64;
    let mean_x = (nf - 1.0) / 2.0;
    let mean_y = window.iter().sum::<f64>() / nf;

    let mut sxy = 0.0;
    let mut sxx = 0.0;
    for (i, y) in window.iter().enumerate() {
        let dx = i as f64 - mean_x;
        sxy += dx * (y - mean_y);
        sxx += dx * dx;
    }

    if sxx == 0.0 {
        return RegressionResult::untrusted(n);
    }

    let slope = sxy / sxx;
    let intercept = mean_y - slope * mean_x;

    let mut ss_res = 0.0;
    let mut ss_tot = 0.0;
    for (i, y) in window.iter().enumerate() {
        let predicted = slope * i as f64 + intercept;
        ss_res += (y - predicted).powi(2);
        ss_tot += (y - mean_y).powi(2);
    }

    let r_squared = if ss_tot == 0.0 {
        0.0
    } else {
        1.0 - ss_res / ss_tot
    };

    RegressionResult {
        slope: round4(slope),
        r_squared: round4(r_squared),
        intercept: round4(intercept),
        samples: n,
    }
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Per-channel windows for a single device
#[derive(Debug, Clone)]
pub struct TrendAnalyzer {
    window_size: usize,
    windows: HashMap<Channel, SlidingWindow>,
}

impl Default for TrendAnalyzer {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_SIZE)
    }
}

impl TrendAnalyzer {
    pub fn new(window_size: usize) -> Self {
        Self {
            window_size: window_size.max(1),
            windows: HashMap::new(),
        }
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Record a sample; returns the refreshed fit once the window holds
    /// enough samples
    pub fn push(&mut self, channel: Channel, value: f64) -> Option<RegressionResult> {
        let window = self
            .windows
            .entry(channel)
            .or_insert_with(|| SlidingWindow::new(self.window_size));
        window.push(value);

        if window.len() < MIN_SAMPLES {
            return None;
        }
        Some(fit(&window.values()))
    }

    pub fn window(&self, channel: Channel) -> Option<&SlidingWindow> {
        self.windows.get(&channel)
    }

    pub fn reset(&mut self) {
        self.windows.clear();
    }
}
