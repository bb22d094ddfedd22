//! Tracked sensor devices
//!
//! A device is registered on its first reading and lives until removed.
//! Analysis workers write per-channel state here; the API reads snapshots.

use crate::analysis::{AlertLevel, RiskAssessment};
use crate::models::{Channel, SensorReading};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Point-in-time view of one device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    pub device_id: String,
    pub active: bool,
    pub readings: u64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub last_reading: Option<SensorReading>,
    pub alert_levels: BTreeMap<Channel, AlertLevel>,
    pub risks: BTreeMap<Channel, RiskAssessment>,
}

impl DeviceSnapshot {
    fn new(device_id: &str, at: DateTime<Utc>) -> Self {
        Self {
            device_id: device_id.to_string(),
            active: true,
            readings: 0,
            first_seen: at,
            last_seen: at,
            last_reading: None,
            alert_levels: BTreeMap::new(),
            risks: BTreeMap::new(),
        }
    }

    /// Worst banded level across channels
    pub fn worst_level(&self) -> Option<AlertLevel> {
        self.alert_levels.values().max().copied()
    }
}

/// Registry of devices keyed by device id
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: DashMap<String, DeviceSnapshot>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a reading, registering the device if needed. Returns whether
    /// the device is active.
    pub fn observe(&self, reading: &SensorReading) -> bool {
        let mut entry = self
            .devices
            .entry(reading.device_id.clone())
            .or_insert_with(|| {
                info!(device_id = %reading.device_id, "Tracking new device");
                DeviceSnapshot::new(&reading.device_id, reading.received_at)
            });

        entry.readings += 1;
        entry.last_seen = reading.received_at;
        entry.last_reading = Some(reading.clone());
        entry.active
    }

    pub fn set_alert_level(&self, device_id: &str, channel: Channel, level: AlertLevel) {
        if let Some(mut entry) = self.devices.get_mut(device_id) {
            entry.alert_levels.insert(channel, level);
        }
    }

    pub fn set_risk(&self, device_id: &str, channel: Channel, risk: RiskAssessment) {
        if let Some(mut entry) = self.devices.get_mut(device_id) {
            entry.risks.insert(channel, risk);
        }
    }

    /// Enable or disable analysis for a device. Returns false if unknown.
    pub fn set_active(&self, device_id: &str, active: bool) -> bool {
        match self.devices.get_mut(device_id) {
            Some(mut entry) => {
                debug!(device_id = %device_id, active, "Device activation changed");
                entry.active = active;
                true
            }
            None => false,
        }
    }

    /// Unknown devices count as active
    pub fn is_active(&self, device_id: &str) -> bool {
        self.devices.get(device_id).map_or(true, |d| d.active)
    }

    pub fn get(&self, device_id: &str) -> Option<DeviceSnapshot> {
        self.devices.get(device_id).map(|r| r.clone())
    }

    /// All devices ordered by id
    pub fn list(&self) -> Vec<DeviceSnapshot> {
        let mut devices: Vec<DeviceSnapshot> =
            self.devices.iter().map(|r| r.value().clone()).collect();
        devices.sort_by(|a, b| a.device_id.cmp(&b.device_id));
        devices
    }

    pub fn remove(&self, device_id: &str) -> Option<DeviceSnapshot> {
        self.devices.remove(device_id).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}
