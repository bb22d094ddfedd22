//! Routing readings to per-device analysis
//!
//! A dispatcher subscribed to the reading broadcast hands each reading to a
//! shard chosen by device id, so one device is always processed by the
//! same worker and in arrival order. Each shard exclusively owns the
//! windows and alert state of its devices.

mod device;
mod pool;

pub use device::{DeviceAnalyzer, DeviceOutcome};
pub use pool::{shard_for, AnalysisConfig, AnalysisEvent, AnalysisShared, AnalyzerPool};

use crate::analysis::AlertLevel;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Running count of readings by their worst banded level
#[derive(Debug, Default)]
pub struct LevelTally {
    ok: AtomicU64,
    warn: AtomicU64,
    alert: AtomicU64,
}

/// Copy of the tally counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TallySnapshot {
    pub ok: u64,
    pub warn: u64,
    pub alert: u64,
}

impl LevelTally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, level: AlertLevel) {
        let counter = match level {
            AlertLevel::Ok => &self.ok,
            AlertLevel::Warn => &self.warn,
            AlertLevel::Alert => &self.alert,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TallySnapshot {
        TallySnapshot {
            ok: self.ok.load(Ordering::Relaxed),
            warn: self.warn.load(Ordering::Relaxed),
            alert: self.alert.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        self.ok.store(0, Ordering::Relaxed);
        self.warn.store(0, Ordering::Relaxed);
        self.alert.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tally() {
        let tally = LevelTally::new();
        tally.record(AlertLevel::Ok);
        tally.record(AlertLevel::Ok);
        tally.record(AlertLevel::Alert);
        assert_eq!(
            tally.snapshot(),
            TallySnapshot {
                ok: 2,
                warn: 0,
                alert: 1
            }
        );

        tally.reset();
        assert_eq!(tally.snapshot(), TallySnapshot::default());
    }
}
