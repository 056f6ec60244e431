// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 nervosys

//! Engine facade wiring topology, inventory, analyzer and thermal manager
//!
//! The components share explicit `Arc` handles; nothing is global.

use crate::analyzer::{Alert, Analyzer, FleetSummary, Recommendation};
use crate::config::FleetConfig;
use crate::error::{FleetError, Result};
use crate::inventory::Inventory;
use crate::thermal::{ThermalEvent, ThermalPolicyManager, ThrottleDecision, ZoneMetrics};
use crate::topology::TopologyManager;
use crate::types::{DeviceState, HealthStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Result of ingesting one telemetry record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestOutcome {
    pub health: HealthStatus,
    pub decision: ThrottleDecision,
}

/// Thermal summary of one zone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneReport {
    pub zone: String,
    pub metrics: ZoneMetrics,
}

/// Everything an operator status page renders
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetReport {
    pub fleet_name: String,
    pub summary: FleetSummary,
    pub alerts: Vec<Alert>,
    pub recommendations: Vec<Recommendation>,
    pub zones: Vec<ZoneReport>,
    pub events: Vec<ThermalEvent>,
    pub generated_at: DateTime<Utc>,
}

pub struct FleetEngine {
    fleet_name: String,
    topology: Arc<TopologyManager>,
    inventory: Arc<Inventory>,
    analyzer: Analyzer,
    thermal: ThermalPolicyManager,
}

impl Default for FleetEngine {
    fn default() -> Self {
        let topology = Arc::new(TopologyManager::new());
        let inventory = Arc::new(Inventory::new());
        Self {
            fleet_name: "fleet".into(),
            analyzer: Analyzer::new(inventory.clone(), topology.clone()),
            thermal: ThermalPolicyManager::new(inventory.clone(), topology.clone()),
            topology,
            inventory,
        }
    }
}

impl FleetEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the engine and provision racks and zone policies from config
    pub fn from_config(config: &FleetConfig) -> Result<Self> {
        let topology = Arc::new(TopologyManager::new());
        let inventory = Arc::new(Inventory::with_thresholds(config.health.clone()));
        let engine = Self {
            fleet_name: config.fleet_name.clone(),
            analyzer: Analyzer::with_thresholds(
                inventory.clone(),
                topology.clone(),
                config.analyzer.clone(),
            ),
            thermal: ThermalPolicyManager::with_config(
                inventory.clone(),
                topology.clone(),
                config.thermal.clone(),
            ),
            topology,
            inventory,
        };

        for rack in &config.racks {
            engine.topology.register_rack(rack.id.clone(), rack.rack_config())?;
        }
        for (zone, policy) in &config.zone_policies {
            engine.thermal.set_zone_policy(zone, policy.clone())?;
        }
        log::info!(
            "fleet {} provisioned: {} racks, {} zone policies",
            engine.fleet_name,
            config.racks.len(),
            config.zone_policies.len()
        );
        Ok(engine)
    }

    pub fn topology(&self) -> &TopologyManager {
        &self.topology
    }

    pub fn inventory(&self) -> &Inventory {
        &self.inventory
    }

    pub fn analyzer(&self) -> &Analyzer {
        &self.analyzer
    }

    pub fn thermal(&self) -> &ThermalPolicyManager {
        &self.thermal
    }

    /// Telemetry path: store the device state, then evaluate its thermal policy.
    ///
    /// The location's zone is normalised to the zone of its rack.
    pub fn ingest(&self, mut state: DeviceState) -> Result<IngestOutcome> {
        match self.topology.get_zone_for_rack(&state.location.rack) {
            Ok(zone) => state.location.zone = zone,
            Err(FleetError::RackNotFound(_)) => {}
            Err(e) => return Err(e),
        }
        let id = state.id.clone();
        let thermal = state.metrics.thermal.clone();

        if let Ok(previous) = self.inventory.get_device(id.as_str()) {
            let previous_zone = self
                .topology
                .get_zone_for_rack(&previous.location.rack)
                .unwrap_or(previous.location.zone);
            if previous.metrics.thermal.is_throttled && previous_zone != state.location.zone {
                self.thermal.release_device(id.as_str())?;
            }
        }

        let health = match self.inventory.update_state(state.clone()) {
            Ok(health) => health,
            Err(FleetError::DeviceNotFound(_)) => {
                self.inventory.register_device(state)?;
                self.inventory.get_device(id.as_str())?.status
            }
            Err(e) => return Err(e),
        };

        let decision = self.thermal.update_device_thermal(id.as_str(), thermal)?;
        // Health may have moved with the throttle decision
        let health = match self.inventory.get_device(id.as_str()) {
            Ok(d) => d.status,
            Err(_) => health,
        };
        Ok(IngestOutcome { health, decision })
    }

    /// Remove a device and everything the thermal manager keeps about it
    pub fn remove_device(&self, device_id: &str) -> Result<DeviceState> {
        let removed = self.inventory.remove_device(device_id)?;
        self.thermal.forget_device(device_id)?;
        Ok(removed)
    }

    /// Snapshot for operators: analysis plus every zone that has a policy
    pub fn report(&self) -> Result<FleetReport> {
        let mut zones = Vec::new();
        for (zone, _) in self.thermal.list_zone_policies()? {
            let metrics = self.thermal.get_zone_metrics(&zone)?;
            zones.push(ZoneReport { zone, metrics });
        }
        Ok(FleetReport {
            fleet_name: self.fleet_name.clone(),
            summary: self.analyzer.analyze_state()?,
            alerts: self.analyzer.get_alerts()?,
            recommendations: self.analyzer.get_recommendations()?,
            zones,
            events: self.thermal.get_thermal_events()?,
            generated_at: Utc::now(),
        })
    }
}
