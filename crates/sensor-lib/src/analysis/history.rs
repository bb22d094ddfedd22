//! Bounded alert history
//!
//! An explicitly owned ring buffer shared through a cloneable handle.
//! Oldest entries are evicted once the capacity is reached.

use super::alert::{AlertLevel, AlertTransition};
use crate::models::Channel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Default number of retained entries
pub const DEFAULT_HISTORY_CAPACITY: usize = 500;

/// One stored warn/alert transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub device_id: String,
    pub channel: Channel,
    pub level: AlertLevel,
    pub previous: Option<AlertLevel>,
    pub value: f64,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl From<&AlertTransition> for AlertRecord {
    fn from(t: &AlertTransition) -> Self {
        Self {
            device_id: t.device_id.clone(),
            channel: t.channel,
            level: t.level,
            previous: t.previous,
            value: t.value,
            message: t.message(),
            at: t.at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AlertHistory {
    entries: Arc<RwLock<VecDeque<AlertRecord>>>,
    capacity: usize,
}

impl Default for AlertHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl AlertHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Arc::new(RwLock::new(VecDeque::with_capacity(capacity.min(1024)))),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Store a transition if it is a warn or alert. Returns whether it was kept.
    pub async fn record(&self, transition: &AlertTransition) -> bool {
        if !transition.level.is_notable() {
            return false;
        }

        let mut entries = self.entries.write().await;
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(AlertRecord::from(transition));
        true
    }

    /// Newest first, optionally filtered by channel
    pub async fn recent(&self, channel: Option<Channel>, limit: usize) -> Vec<AlertRecord> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .rev()
            .filter(|r| channel.map_or(true, |c| r.channel == c))
            .take(limit)
            .cloned()
            .collect()
    }

    /// All entries grouped by channel, newest first within each group
    pub async fn by_channel(&self) -> BTreeMap<Channel, Vec<AlertRecord>> {
        let entries = self.entries.read().await;
        let mut grouped: BTreeMap<Channel, Vec<AlertRecord>> = BTreeMap::new();
        for record in entries.iter().rev() {
            grouped.entry(record.channel).or_default().push(record.clone());
        }
        grouped
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}
