// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 nervosys

//! Fleet configuration
//!
//! Thresholds for health classification and alerting, thermal manager
//! settings, and the rack/zone-policy provisioning list, all loaded from
//! TOML. Every section falls back to defaults when omitted.

use crate::analyzer::AnalyzerThresholds;
use crate::error::{FleetError, Result};
use crate::inventory::HealthThresholds;
use crate::thermal::{ThermalManagerConfig, ThermalPolicy};
use crate::topology::RackConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Rack to register at startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RackEntry {
    pub id: String,
    pub max_units: u32,
    pub power_limit: f64,
    pub cooling_zone: String,
}

impl RackEntry {
    pub fn rack_config(&self) -> RackConfig {
        RackConfig::new(self.max_units, self.power_limit, self.cooling_zone.clone())
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    pub fleet_name: String,
    pub health: HealthThresholds,
    pub analyzer: AnalyzerThresholds,
    pub thermal: ThermalManagerConfig,
    pub racks: Vec<RackEntry>,
    /// Zone name -> policy
    pub zone_policies: BTreeMap<String, ThermalPolicy>,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            fleet_name: "fleet".into(),
            health: HealthThresholds::default(),
            analyzer: AnalyzerThresholds::default(),
            thermal: ThermalManagerConfig::default(),
            racks: Vec::new(),
            zone_policies: BTreeMap::new(),
        }
    }
}

impl FleetConfig {
    /// Load from TOML file
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            FleetError::Configuration(format!("Cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    /// Parse from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| FleetError::Configuration(format!("TOML parse error: {}", e)))
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| FleetError::Configuration(format!("TOML serialize error: {}", e)))
    }

    /// Generate sample config
    pub fn sample_toml() -> String {
        r#"# Fleetwatch configuration
fleet_name = "dc-east"

[health]
temperature_unhealthy = 80.0
cpu_degraded = 90.0
memory_degraded = 95.0

[analyzer]
temperature = { warning = 70.0, critical = 80.0 }
cpu_load = { warning = 80.0, critical = 90.0 }
memory_usage = { warning = 85.0, critical = 95.0 }

[thermal]
allow_policy_preprovisioning = false
max_violations_per_zone = 1000
# Keep only the newest events (full history when omitted)
# event_log_capacity = 10000

[[racks]]
id = "rack-a01"
max_units = 42
power_limit = 12000.0
cooling_zone = "zone-1"

[[racks]]
id = "rack-a02"
max_units = 42
power_limit = 12000.0
cooling_zone = "zone-1"

[zone_policies.zone-1]
profile = "balanced"
cpu_warning = 75.0
cpu_critical = 85.0
gpu_warning = 75.0
gpu_critical = 85.0
ambient_warning = 27.0
ambient_critical = 32.0
monitoring_interval_secs = 30
alert_interval_secs = 300
auto_throttle = true
max_devices_throttled = 2
zone_priority = 1
"#
        .into()
    }
}
