// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 nervosys

//! Rack registry and cooling zone membership

use crate::error::{FleetError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

/// Physical capacity and zone of a rack
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RackConfig {
    pub max_units: u32,
    /// Power budget (W)
    pub power_limit: f64,
    pub cooling_zone: String,
}

impl RackConfig {
    pub fn new(max_units: u32, power_limit: f64, cooling_zone: impl Into<String>) -> Self {
        Self {
            max_units,
            power_limit,
            cooling_zone: cooling_zone.into(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.cooling_zone.trim().is_empty() {
            return Err(FleetError::InvalidConfig("cooling zone must not be empty".into()));
        }
        if self.max_units == 0 {
            return Err(FleetError::InvalidConfig("max_units must be positive".into()));
        }
        if !(self.power_limit.is_finite() && self.power_limit > 0.0) {
            return Err(FleetError::InvalidConfig(format!(
                "power_limit must be positive, got {}",
                self.power_limit
            )));
        }
        Ok(())
    }
}

/// Aggregate capacity of all racks in a zone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneCapacity {
    pub zone: String,
    pub racks: usize,
    pub max_units: u32,
    pub power_limit: f64,
}

/// Thread-safe rack registry
#[derive(Debug, Default)]
pub struct TopologyManager {
    racks: RwLock<HashMap<String, RackConfig>>,
}

impl TopologyManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a rack; each rack id may be registered only once
    pub fn register_rack(&self, rack_id: impl Into<String>, config: RackConfig) -> Result<()> {
        let rack_id = rack_id.into();
        if rack_id.trim().is_empty() {
            return Err(FleetError::InvalidConfig("rack id must not be empty".into()));
        }
        config.validate()?;

        let mut racks = self.racks.write().map_err(|_| FleetError::poisoned("topology"))?;
        if racks.contains_key(&rack_id) {
            return Err(FleetError::DuplicateRack(rack_id));
        }
        log::debug!("registered rack {} in zone {}", rack_id, config.cooling_zone);
        racks.insert(rack_id, config);
        Ok(())
    }

    pub fn remove_rack(&self, rack_id: &str) -> Result<RackConfig> {
        let mut racks = self.racks.write().map_err(|_| FleetError::poisoned("topology"))?;
        racks
            .remove(rack_id)
            .ok_or_else(|| FleetError::RackNotFound(rack_id.to_string()))
    }

    pub fn get_zone_for_rack(&self, rack_id: &str) -> Result<String> {
        self.get_rack(rack_id).map(|r| r.cooling_zone)
    }

    pub fn get_rack(&self, rack_id: &str) -> Result<RackConfig> {
        let racks = self.racks.read().map_err(|_| FleetError::poisoned("topology"))?;
        racks
            .get(rack_id)
            .cloned()
            .ok_or_else(|| FleetError::RackNotFound(rack_id.to_string()))
    }

    /// All racks, sorted by id
    pub fn list_racks(&self) -> Result<Vec<(String, RackConfig)>> {
        let racks = self.racks.read().map_err(|_| FleetError::poisoned("topology"))?;
        let mut out: Vec<_> = racks.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(out)
    }

    /// Rack ids belonging to a zone, sorted
    pub fn racks_in_zone(&self, zone: &str) -> Result<Vec<String>> {
        Ok(self
            .list_racks()?
            .into_iter()
            .filter(|(_, cfg)| cfg.cooling_zone == zone)
            .map(|(id, _)| id)
            .collect())
    }

    /// Distinct zones referenced by any rack
    pub fn zones(&self) -> Result<Vec<String>> {
        let racks = self.racks.read().map_err(|_| FleetError::poisoned("topology"))?;
        let zones: BTreeSet<String> = racks.values().map(|r| r.cooling_zone.clone()).collect();
        Ok(zones.into_iter().collect())
    }

    pub fn has_zone(&self, zone: &str) -> Result<bool> {
        let racks = self.racks.read().map_err(|_| FleetError::poisoned("topology"))?;
        Ok(racks.values().any(|r| r.cooling_zone == zone))
    }

    pub fn zone_capacity(&self, zone: &str) -> Result<ZoneCapacity> {
        let racks = self.racks.read().map_err(|_| FleetError::poisoned("topology"))?;
        let members: Vec<&RackConfig> = racks.values().filter(|r| r.cooling_zone == zone).collect();
        if members.is_empty() {
            return Err(FleetError::ZoneNotFound(zone.to_string()));
        }
        Ok(ZoneCapacity {
            zone: zone.to_string(),
            racks: members.len(),
            max_units: members.iter().map(|r| r.max_units).sum(),
            power_limit: members.iter().map(|r| r.power_limit).sum(),
        })
    }
}
