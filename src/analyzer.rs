// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 nervosys

//! Fleet-level analysis
//!
//! Resource usage summaries, threshold-based alerting and merged
//! remediation recommendations, all computed on demand from the current
//! inventory snapshot. Nothing here is stored between calls.

use crate::error::Result;
use crate::inventory::Inventory;
use crate::topology::TopologyManager;
use crate::types::{DeviceId, DeviceState, HealthStatus, ResourceType};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Alert severity, ordered by rank
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

impl AlertSeverity {
    /// critical(3) > warning(2) > info(1)
    pub fn rank(self) -> u8 {
        match self {
            Self::Info => 1,
            Self::Warning => 2,
            Self::Critical => 3,
        }
    }
}

impl std::fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Metric dimension an alert rule watches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricDimension {
    Temperature,
    CpuLoad,
    MemoryUsage,
    Throttle,
}

impl MetricDimension {
    /// Remediation that addresses problems in this dimension
    pub fn remediation(self) -> RemediationAction {
        match self {
            Self::Temperature => RemediationAction::OptimizeCooling,
            Self::CpuLoad | Self::MemoryUsage => RemediationAction::BalanceWorkload,
            Self::Throttle => RemediationAction::InvestigateThrottling,
        }
    }
}

/// Fleet alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub device_id: DeviceId,
    pub severity: AlertSeverity,
    pub dimension: MetricDimension,
    pub message: String,
    pub value: f64,
}

/// Remediation action kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemediationAction {
    OptimizeCooling,
    BalanceWorkload,
    InvestigateThrottling,
}

impl std::fmt::Display for RemediationAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OptimizeCooling => write!(f, "optimize_cooling"),
            Self::BalanceWorkload => write!(f, "balance_workload"),
            Self::InvestigateThrottling => write!(f, "investigate_throttling"),
        }
    }
}

/// Remediation recommendation covering every affected device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub action: RemediationAction,
    pub device_ids: Vec<DeviceId>,
    /// Higher is more urgent
    pub priority: u8,
    pub reason: String,
}

/// Warning/critical pair for one dimension
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ThresholdPair {
    pub warning: f64,
    pub critical: f64,
}

/// Alert thresholds per metric dimension
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerThresholds {
    pub temperature: ThresholdPair,
    pub cpu_load: ThresholdPair,
    pub memory_usage: ThresholdPair,
}

impl Default for AnalyzerThresholds {
    fn default() -> Self {
        Self {
            temperature: ThresholdPair { warning: 70.0, critical: 80.0 },
            cpu_load: ThresholdPair { warning: 80.0, critical: 90.0 },
            memory_usage: ThresholdPair { warning: 85.0, critical: 95.0 },
        }
    }
}

/// Fleet-wide usage summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FleetSummary {
    pub total_devices: usize,
    pub healthy_devices: usize,
    /// Devices left out of the resource means because of malformed data
    pub skipped_devices: usize,
    /// Mean usage per resource across devices reporting it
    pub resource_usage: BTreeMap<ResourceType, f64>,
    pub health: BTreeMap<HealthStatus, usize>,
}

/// Capacity usage of a single rack
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RackUtilization {
    pub rack_id: String,
    pub zone: String,
    pub devices: usize,
    pub max_units: u32,
    pub power_usage: f64,
    pub power_limit: f64,
}

impl RackUtilization {
    /// Power utilization as percentage
    pub fn power_utilization(&self) -> f64 {
        if self.power_limit > 0.0 {
            (self.power_usage / self.power_limit) * 100.0
        } else {
            0.0
        }
    }

    /// Space utilization as percentage
    pub fn space_utilization(&self) -> f64 {
        if self.max_units > 0 {
            (self.devices as f64 / self.max_units as f64) * 100.0
        } else {
            0.0
        }
    }
}

/// On-demand fleet analyzer
pub struct Analyzer {
    inventory: Arc<Inventory>,
    topology: Arc<TopologyManager>,
    thresholds: AnalyzerThresholds,
}

impl Analyzer {
    pub fn new(inventory: Arc<Inventory>, topology: Arc<TopologyManager>) -> Self {
        Self::with_thresholds(inventory, topology, AnalyzerThresholds::default())
    }

    pub fn with_thresholds(
        inventory: Arc<Inventory>,
        topology: Arc<TopologyManager>,
        thresholds: AnalyzerThresholds,
    ) -> Self {
        Self {
            inventory,
            topology,
            thresholds,
        }
    }

    pub fn thresholds(&self) -> &AnalyzerThresholds {
        &self.thresholds
    }

    /// Single pass over the fleet
    pub fn analyze_state(&self) -> Result<FleetSummary> {
        let devices = self.inventory.list_devices()?;
        let mut sums: BTreeMap<ResourceType, (f64, usize)> = BTreeMap::new();
        let mut health: BTreeMap<HealthStatus, usize> =
            HealthStatus::ALL.iter().map(|s| (*s, 0)).collect();
        let mut skipped = 0;

        for device in &devices {
            *health.entry(device.status).or_insert(0) += 1;
            if device.status == HealthStatus::Unknown {
                skipped += 1;
                continue;
            }
            for (resource, value) in &device.resources {
                if !value.is_finite() {
                    log::warn!("device {}: ignoring non-finite {} usage", device.id, resource);
                    continue;
                }
                let entry = sums.entry(*resource).or_insert((0.0, 0));
                entry.0 += value;
                entry.1 += 1;
            }
        }

        let resource_usage = sums
            .into_iter()
            .map(|(r, (sum, n))| (r, sum / n as f64))
            .collect();

        Ok(FleetSummary {
            total_devices: devices.len(),
            healthy_devices: health.get(&HealthStatus::Healthy).copied().unwrap_or(0),
            skipped_devices: skipped,
            resource_usage,
            health,
        })
    }

    /// Alerts for the whole fleet, most severe first.
    ///
    /// Ties keep device order, then rule order within a device.
    pub fn get_alerts(&self) -> Result<Vec<Alert>> {
        let mut alerts: Vec<Alert> = self
            .inventory
            .list_devices()?
            .iter()
            .flat_map(|d| self.evaluate_device(d))
            .collect();
        alerts.sort_by(|a, b| b.severity.rank().cmp(&a.severity.rank()));
        Ok(alerts)
    }

    /// Remediation recommendations, most urgent first
    pub fn get_recommendations(&self) -> Result<Vec<Recommendation>> {
        let devices = self.inventory.list_devices()?;
        let mut merged: Vec<(RemediationAction, Vec<DeviceId>, AlertSeverity)> = Vec::new();

        for device in &devices {
            for alert in self.evaluate_device(device) {
                let action = alert.dimension.remediation();
                match merged.iter_mut().find(|(a, _, _)| *a == action) {
                    Some((_, ids, severity)) => {
                        if !ids.contains(&alert.device_id) {
                            ids.push(alert.device_id);
                        }
                        *severity = (*severity).max(alert.severity);
                    }
                    None => merged.push((action, vec![alert.device_id], alert.severity)),
                }
            }
        }

        let mut recs: Vec<Recommendation> = merged
            .into_iter()
            .map(|(action, device_ids, severity)| Recommendation {
                reason: Self::reason(action, device_ids.len(), severity),
                action,
                device_ids,
                priority: severity.rank(),
            })
            .collect();
        recs.sort_by(|a, b| b.priority.cmp(&a.priority));
        Ok(recs)
    }

    /// Per-rack unit and power usage, sorted by rack id
    pub fn rack_utilization(&self) -> Result<Vec<RackUtilization>> {
        let mut by_rack: HashMap<String, (usize, f64)> = HashMap::new();
        for device in self.inventory.list_devices()? {
            let entry = by_rack.entry(device.location.rack.clone()).or_insert((0, 0.0));
            entry.0 += 1;
            if device.metrics.power_usage.is_finite() {
                entry.1 += device.metrics.power_usage;
            }
        }

        Ok(self
            .topology
            .list_racks()?
            .into_iter()
            .map(|(rack_id, cfg)| {
                let (devices, power) = by_rack.get(&rack_id).copied().unwrap_or((0, 0.0));
                RackUtilization {
                    rack_id,
                    zone: cfg.cooling_zone,
                    devices,
                    max_units: cfg.max_units,
                    power_usage: power,
                    power_limit: cfg.power_limit,
                }
            })
            .collect())
    }

    fn evaluate_device(&self, device: &DeviceState) -> Vec<Alert> {
        if !device.metrics.is_well_formed() {
            log::warn!("device {}: malformed metrics, skipped", device.id);
            return Vec::new();
        }
        let m = &device.metrics;
        let t = &self.thresholds;
        let mut alerts = Vec::new();

        for (dim, value, pair) in [
            (MetricDimension::Temperature, m.temperature, t.temperature),
            (MetricDimension::CpuLoad, m.cpu_load, t.cpu_load),
            (MetricDimension::MemoryUsage, m.memory_usage, t.memory_usage),
        ] {
            let severity = if value > pair.critical {
                AlertSeverity::Critical
            } else if value > pair.warning {
                AlertSeverity::Warning
            } else {
                continue;
            };
            alerts.push(Alert {
                device_id: device.id.clone(),
                severity,
                dimension: dim,
                message: Self::message(dim, severity, value),
                value,
            });
        }

        if m.any_throttle() {
            alerts.push(Alert {
                device_id: device.id.clone(),
                severity: AlertSeverity::Info,
                dimension: MetricDimension::Throttle,
                message: "device is throttled".into(),
                value: 1.0,
            });
        }
        alerts
    }

    fn message(dim: MetricDimension, severity: AlertSeverity, value: f64) -> String {
        match (dim, severity) {
            (MetricDimension::Temperature, AlertSeverity::Critical) => {
                format!("temperature exceeds safe threshold ({:.1}°C)", value)
            }
            (MetricDimension::Temperature, _) => format!("temperature elevated ({:.1}°C)", value),
            (MetricDimension::CpuLoad, AlertSeverity::Critical) => {
                format!("CPU load critical ({:.1}%)", value)
            }
            (MetricDimension::CpuLoad, _) => format!("CPU load high ({:.1}%)", value),
            (MetricDimension::MemoryUsage, AlertSeverity::Critical) => {
                format!("memory usage critical ({:.1}%)", value)
            }
            (MetricDimension::MemoryUsage, _) => format!("memory usage high ({:.1}%)", value),
            (MetricDimension::Throttle, _) => "device is throttled".into(),
        }
    }

    fn reason(action: RemediationAction, count: usize, severity: AlertSeverity) -> String {
        match action {
            RemediationAction::OptimizeCooling => format!(
                "{} device(s) running at {} temperature",
                count, severity
            ),
            RemediationAction::BalanceWorkload => format!(
                "{} device(s) with {} CPU or memory load",
                count, severity
            ),
            RemediationAction::InvestigateThrottling => {
                format!("{} device(s) currently throttled", count)
            }
        }
    }
}
