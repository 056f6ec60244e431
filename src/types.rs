// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 nervosys

//! Shared device data model
//!
//! Device identity, physical placement, resource usage and the thermal
//! snapshot that both the inventory and the thermal policy manager read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::BTreeMap;

/// Opaque device identifier, stable for the device's lifetime
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for DeviceId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for DeviceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Where a device physically sits
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhysicalLocation {
    pub rack: String,
    pub position: u32,
    /// Cooling zone; informational, the authoritative zone comes from the rack
    pub zone: String,
}

impl PhysicalLocation {
    pub fn new(rack: impl Into<String>, position: u32, zone: impl Into<String>) -> Self {
        Self {
            rack: rack.into(),
            position,
            zone: zone.into(),
        }
    }
}

/// Resource dimensions a device may report usage for
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Cpu,
    Memory,
    Disk,
    Network,
    Gpu,
    Power,
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cpu => write!(f, "cpu"),
            Self::Memory => write!(f, "memory"),
            Self::Disk => write!(f, "disk"),
            Self::Network => write!(f, "network"),
            Self::Gpu => write!(f, "gpu"),
            Self::Power => write!(f, "power"),
        }
    }
}

/// Derived device health
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
    #[default]
    Unknown,
}

impl HealthStatus {
    pub const ALL: [HealthStatus; 4] = [
        HealthStatus::Healthy,
        HealthStatus::Degraded,
        HealthStatus::Unhealthy,
        HealthStatus::Unknown,
    ];
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded => write!(f, "degraded"),
            Self::Unhealthy => write!(f, "unhealthy"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Temperature sensor dimension covered by thermal policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThermalDimension {
    Cpu,
    Gpu,
    Ambient,
}

impl ThermalDimension {
    pub const ALL: [ThermalDimension; 3] = [
        ThermalDimension::Cpu,
        ThermalDimension::Gpu,
        ThermalDimension::Ambient,
    ];
}

impl std::fmt::Display for ThermalDimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cpu => write!(f, "CPU"),
            Self::Gpu => write!(f, "GPU"),
            Self::Ambient => write!(f, "ambient"),
        }
    }
}

/// Latest thermal snapshot of a device
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThermalMetrics {
    /// CPU temperature (°C)
    pub cpu_temp: f64,
    /// GPU temperature (°C)
    pub gpu_temp: f64,
    /// Inlet/ambient temperature (°C)
    pub ambient_temp: f64,
    /// Fan speed (RPM)
    pub fan_speed: f64,
    /// Throttle state decided by thermal policy
    pub is_throttled: bool,
    pub last_update: DateTime<Utc>,
}

impl ThermalMetrics {
    /// Reading for one sensor dimension
    pub fn reading(&self, dim: ThermalDimension) -> f64 {
        match dim {
            ThermalDimension::Cpu => self.cpu_temp,
            ThermalDimension::Gpu => self.gpu_temp,
            ThermalDimension::Ambient => self.ambient_temp,
        }
    }

    pub fn is_finite(&self) -> bool {
        ThermalDimension::ALL
            .iter()
            .all(|d| self.reading(*d).is_finite())
    }
}

/// Operational metrics reported by a device
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceMetrics {
    /// Chassis temperature (°C)
    pub temperature: f64,
    /// Power draw (W)
    pub power_usage: f64,
    /// CPU load (percent)
    pub cpu_load: f64,
    /// Memory usage (percent)
    pub memory_usage: f64,
    /// Device-reported throttling
    pub throttled: bool,
    pub thermal: ThermalMetrics,
}

impl DeviceMetrics {
    /// All health-relevant values are finite numbers
    pub fn is_well_formed(&self) -> bool {
        self.temperature.is_finite() && self.cpu_load.is_finite() && self.memory_usage.is_finite()
    }

    /// Throttled either by the device itself or by thermal policy
    pub fn any_throttle(&self) -> bool {
        self.throttled || self.thermal.is_throttled
    }
}

/// Full device record owned by the inventory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceState {
    pub id: DeviceId,
    #[serde(default)]
    pub status: HealthStatus,
    #[serde(default)]
    pub location: PhysicalLocation,
    #[serde(default)]
    pub resources: BTreeMap<ResourceType, f64>,
    #[serde(default)]
    pub metrics: DeviceMetrics,
}

impl DeviceState {
    pub fn new(id: impl Into<DeviceId>, location: PhysicalLocation) -> Self {
        Self {
            id: id.into(),
            status: HealthStatus::Unknown,
            location,
            resources: BTreeMap::new(),
            metrics: DeviceMetrics::default(),
        }
    }

    pub fn with_metrics(mut self, metrics: DeviceMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_resource(mut self, resource: ResourceType, value: f64) -> Self {
        self.resources.insert(resource, value);
        self
    }
}
