// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 nervosys

//! Device registry and health classification
//!
//! Every device record sits behind its own lock so telemetry updates for
//! different devices never contend. Getters always hand out clones.

use crate::error::{FleetError, Result};
use crate::types::{DeviceId, DeviceMetrics, DeviceState, HealthStatus, ThermalMetrics};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

/// Fixed thresholds used to derive [`HealthStatus`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthThresholds {
    /// Temperature above which a device is unhealthy (°C)
    pub temperature_unhealthy: f64,
    /// CPU load above which a device is degraded (percent)
    pub cpu_degraded: f64,
    /// Memory usage above which a device is degraded (percent)
    pub memory_degraded: f64,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            temperature_unhealthy: 80.0,
            cpu_degraded: 90.0,
            memory_degraded: 95.0,
        }
    }
}

impl HealthThresholds {
    /// Classify a metrics snapshot. Unhealthy is checked before Degraded.
    pub fn classify(&self, m: &DeviceMetrics) -> HealthStatus {
        if !m.is_well_formed() {
            return HealthStatus::Unknown;
        }
        if m.temperature > self.temperature_unhealthy {
            HealthStatus::Unhealthy
        } else if m.cpu_load > self.cpu_degraded
            || m.memory_usage > self.memory_degraded
            || m.any_throttle()
        {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }
}

type DeviceSlot = Arc<RwLock<DeviceState>>;

/// Thread-safe device inventory
#[derive(Debug, Default)]
pub struct Inventory {
    devices: RwLock<BTreeMap<DeviceId, DeviceSlot>>,
    thresholds: HealthThresholds,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_thresholds(thresholds: HealthThresholds) -> Self {
        Self {
            devices: RwLock::new(BTreeMap::new()),
            thresholds,
        }
    }

    pub fn thresholds(&self) -> &HealthThresholds {
        &self.thresholds
    }

    /// Insert a new device. Use [`Inventory::update_state`] for changes.
    pub fn register_device(&self, mut state: DeviceState) -> Result<()> {
        // Throttle admission is granted only by the thermal policy manager
        state.metrics.thermal.is_throttled = false;
        state.status = self.thresholds.classify(&state.metrics);

        let mut devices = self.devices.write().map_err(|_| FleetError::poisoned("inventory"))?;
        if devices.contains_key(&state.id) {
            return Err(FleetError::DuplicateDevice(state.id.to_string()));
        }
        log::debug!("registered device {} ({})", state.id, state.status);
        devices.insert(state.id.clone(), Arc::new(RwLock::new(state)));
        Ok(())
    }

    /// Replace a device record with fresh telemetry and recompute its health.
    ///
    /// The policy-owned `thermal.is_throttled` flag is carried over from the
    /// stored record.
    pub fn update_state(&self, mut state: DeviceState) -> Result<HealthStatus> {
        let slot = self.slot(state.id.as_str())?;
        let mut current = slot
            .write()
            .map_err(|_| FleetError::poisoned("device record"))?;

        state.metrics.thermal.is_throttled = current.metrics.thermal.is_throttled;
        state.status = self.thresholds.classify(&state.metrics);
        if state.status != current.status {
            log::info!(
                "device {} health changed: {} -> {}",
                state.id,
                current.status,
                state.status
            );
        }
        let status = state.status;
        *current = state;
        Ok(status)
    }

    /// Store an evaluated thermal snapshot, including the policy throttle flag
    pub(crate) fn record_thermal(&self, id: &str, thermal: ThermalMetrics) -> Result<()> {
        let slot = self.slot(id)?;
        let mut current = slot
            .write()
            .map_err(|_| FleetError::poisoned("device record"))?;
        current.metrics.thermal = thermal;
        current.status = self.thresholds.classify(&current.metrics);
        Ok(())
    }

    pub fn remove_device(&self, id: &str) -> Result<DeviceState> {
        let mut devices = self.devices.write().map_err(|_| FleetError::poisoned("inventory"))?;
        let slot = devices
            .remove(id)
            .ok_or_else(|| FleetError::DeviceNotFound(id.to_string()))?;
        let state = slot
            .read()
            .map_err(|_| FleetError::poisoned("device record"))?
            .clone();
        Ok(state)
    }

    pub fn get_device(&self, id: &str) -> Result<DeviceState> {
        let slot = self.slot(id)?;
        let state = slot
            .read()
            .map_err(|_| FleetError::poisoned("device record"))?
            .clone();
        Ok(state)
    }

    /// Snapshot of every readable device, ordered by id.
    ///
    /// A record whose lock was poisoned is skipped rather than failing the scan.
    pub fn list_devices(&self) -> Result<Vec<DeviceState>> {
        let slots = self.slots()?;
        Ok(slots
            .iter()
            .filter_map(|slot| match slot.read() {
                Ok(state) => Some(state.clone()),
                Err(_) => {
                    log::warn!("skipping poisoned device record");
                    None
                }
            })
            .collect())
    }

    /// Devices whose location names the given zone
    pub fn get_devices_in_zone(&self, zone: &str) -> Result<Vec<DeviceState>> {
        Ok(self
            .list_devices()?
            .into_iter()
            .filter(|d| d.location.zone == zone)
            .collect())
    }

    pub fn device_count(&self) -> Result<usize> {
        Ok(self
            .devices
            .read()
            .map_err(|_| FleetError::poisoned("inventory"))?
            .len())
    }

    /// Count of devices per health status; all four statuses are present
    pub fn get_health_report(&self) -> Result<HashMap<HealthStatus, usize>> {
        let mut report: HashMap<HealthStatus, usize> =
            HealthStatus::ALL.iter().map(|s| (*s, 0)).collect();
        for slot in self.slots()? {
            // Each record is read under its own short lock
            let status = match slot.read() {
                Ok(state) => state.status,
                Err(_) => HealthStatus::Unknown,
            };
            *report.entry(status).or_insert(0) += 1;
        }
        Ok(report)
    }

    fn slot(&self, id: &str) -> Result<DeviceSlot> {
        let devices = self.devices.read().map_err(|_| FleetError::poisoned("inventory"))?;
        devices
            .get(id)
            .cloned()
            .ok_or_else(|| FleetError::DeviceNotFound(id.to_string()))
    }

    fn slots(&self) -> Result<Vec<DeviceSlot>> {
        let devices = self.devices.read().map_err(|_| FleetError::poisoned("inventory"))?;
        Ok(devices.values().cloned().collect())
    }
}
