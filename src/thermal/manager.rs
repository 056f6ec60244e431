// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 nervosys

//! Thermal policy enforcement with zone-wide throttle admission control.
//!
//! Every thermal update is evaluated against the zone policy of the
//! device's rack. When a critical threshold is exceeded the device asks
//! for one of the zone's throttle slots. Slots are granted first come,
//! first served; once the zone is full, further requests are recorded as
//! policy violations instead.
//!
//! Device-level policies are stored and reported but do not take part in
//! admission: enforcement always uses the zone policy.

use super::events::{ThermalEvent, ThermalEventLog, ThermalEventType};
use super::policy::ThermalPolicy;
use crate::error::{FleetError, Result};
use crate::inventory::Inventory;
use crate::topology::TopologyManager;
use crate::types::{DeviceId, DeviceState, ThermalMetrics};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};

/// Manager settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThermalManagerConfig {
    /// Accept zone policies for zones no rack references yet
    pub allow_policy_preprovisioning: bool,
    /// Cap on retained thermal events; `None` keeps the full history
    pub event_log_capacity: Option<usize>,
    /// Cap on retained violation messages per zone
    pub max_violations_per_zone: usize,
}

impl Default for ThermalManagerConfig {
    fn default() -> Self {
        Self {
            allow_policy_preprovisioning: false,
            event_log_capacity: None,
            max_violations_per_zone: 1000,
        }
    }
}

/// Outcome of a single thermal evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum ThrottleDecision {
    /// Within limits
    Normal,
    /// Above a warning threshold, below every critical one
    Warning,
    /// Holding a throttle slot (newly admitted or kept)
    Throttled,
    /// Below critical but still inside the release hysteresis
    Held,
    /// Throttle slot given back
    Released,
    /// Critical, but the zone has no free slot
    Rejected { violation: String },
    /// Critical, but the zone policy has automatic throttling disabled
    Unmanaged,
}

/// Zone thermal summary, recomputed on every query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneMetrics {
    pub total_devices: usize,
    pub max_temp: f64,
    pub average_temp: f64,
    pub devices_over_temp: usize,
    pub devices_throttled: usize,
    pub policy_violations: Vec<String>,
}

/// Per-zone state serialized under the zone lock
#[derive(Debug, Default)]
struct ZoneState {
    violations: VecDeque<String>,
    /// Devices in the order they were granted a slot
    admissions: Vec<DeviceId>,
}

/// Thermal policy store and enforcer
pub struct ThermalPolicyManager {
    inventory: Arc<Inventory>,
    topology: Arc<TopologyManager>,
    config: ThermalManagerConfig,
    zone_policies: RwLock<HashMap<String, Arc<ThermalPolicy>>>,
    device_policies: RwLock<HashMap<DeviceId, Arc<ThermalPolicy>>>,
    zones: RwLock<HashMap<String, Arc<Mutex<ZoneState>>>>,
    events: RwLock<ThermalEventLog>,
}

impl ThermalPolicyManager {
    pub fn new(inventory: Arc<Inventory>, topology: Arc<TopologyManager>) -> Self {
        Self::with_config(inventory, topology, ThermalManagerConfig::default())
    }

    pub fn with_config(
        inventory: Arc<Inventory>,
        topology: Arc<TopologyManager>,
        config: ThermalManagerConfig,
    ) -> Self {
        let events = match config.event_log_capacity {
            Some(cap) => ThermalEventLog::with_capacity(cap),
            None => ThermalEventLog::unbounded(),
        };
        Self {
            inventory,
            topology,
            config,
            zone_policies: RwLock::new(HashMap::new()),
            device_policies: RwLock::new(HashMap::new()),
            zones: RwLock::new(HashMap::new()),
            events: RwLock::new(events),
        }
    }

    pub fn config(&self) -> &ThermalManagerConfig {
        &self.config
    }

    /// Replace the policy of a zone.
    ///
    /// If the new capacity is below the number of devices currently
    /// throttled in the zone, the most recently admitted devices are
    /// released until the zone fits.
    pub fn set_zone_policy(&self, zone: &str, policy: ThermalPolicy) -> Result<()> {
        policy.validate()?;
        if !self.topology.has_zone(zone)? {
            if !self.config.allow_policy_preprovisioning {
                return Err(FleetError::ZoneNotFound(zone.to_string()));
            }
            log::info!("pre-provisioning thermal policy for zone {}", zone);
        }

        let zone_lock = self.zone_state(zone)?;
        let mut state = zone_lock.lock().map_err(|_| FleetError::poisoned("zone"))?;

        let capacity = policy.max_devices_throttled as usize;
        self.zone_policies
            .write()
            .map_err(|_| FleetError::poisoned("zone policies"))?
            .insert(zone.to_string(), Arc::new(policy));
        log::info!("zone {} policy replaced (capacity {})", zone, capacity);

        let mut throttled: Vec<DeviceId> = self
            .zone_devices(zone)?
            .into_iter()
            .filter(|d| d.metrics.thermal.is_throttled)
            .map(|d| d.id)
            .collect();
        if throttled.len() <= capacity {
            return Ok(());
        }

        // Release order: holders without an admission here first, then latest admissions
        throttled.sort_by_key(|id| {
            let rank = state.admissions.iter().position(|a| a == id).unwrap_or(usize::MAX);
            std::cmp::Reverse(rank)
        });
        let excess = throttled.len() - capacity;
        for id in throttled.into_iter().take(excess) {
            let mut thermal = self.inventory.get_device(id.as_str())?.metrics.thermal;
            thermal.is_throttled = false;
            self.inventory.record_thermal(id.as_str(), thermal)?;
            state.admissions.retain(|a| a != &id);
            log::warn!("zone {} capacity reduced, released throttle on {}", zone, id);
        }
        Ok(())
    }

    pub fn get_zone_policy(&self, zone: &str) -> Result<ThermalPolicy> {
        self.zone_policy(zone)?
            .map(|p| (*p).clone())
            .ok_or_else(|| FleetError::PolicyNotFound(format!("zone {}", zone)))
    }

    /// Zones that have a policy, sorted
    pub fn list_zone_policies(&self) -> Result<Vec<(String, ThermalPolicy)>> {
        let policies = self
            .zone_policies
            .read()
            .map_err(|_| FleetError::poisoned("zone policies"))?;
        let mut out: Vec<_> = policies
            .iter()
            .map(|(z, p)| (z.clone(), (**p).clone()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(out)
    }

    /// Store a device override. Overrides are for visibility and planning;
    /// admission control keeps using the zone policy.
    pub fn set_device_policy(&self, device_id: &str, policy: ThermalPolicy) -> Result<()> {
        policy.validate()?;
        self.inventory.get_device(device_id)?;
        self.device_policies
            .write()
            .map_err(|_| FleetError::poisoned("device policies"))?
            .insert(DeviceId::new(device_id), Arc::new(policy));
        log::debug!("device {} policy override stored", device_id);
        Ok(())
    }

    pub fn get_device_policy(&self, device_id: &str) -> Result<ThermalPolicy> {
        let policies = self
            .device_policies
            .read()
            .map_err(|_| FleetError::poisoned("device policies"))?;
        policies
            .get(device_id)
            .map(|p| (**p).clone())
            .ok_or_else(|| FleetError::PolicyNotFound(format!("device {}", device_id)))
    }

    pub fn remove_device_policy(&self, device_id: &str) -> Result<ThermalPolicy> {
        self.device_policies
            .write()
            .map_err(|_| FleetError::poisoned("device policies"))?
            .remove(device_id)
            .map(|p| (*p).clone())
            .ok_or_else(|| FleetError::PolicyNotFound(format!("device {}", device_id)))
    }

    /// Policy an operator would see for a device: its override, else its zone's.
    pub fn effective_policy(&self, device_id: &str) -> Result<ThermalPolicy> {
        if let Ok(policy) = self.get_device_policy(device_id) {
            return Ok(policy);
        }
        let zone = self.zone_of(device_id)?;
        self.zone_policy(&zone)?
            .map(|p| (*p).clone())
            .ok_or(FleetError::PolicyNotConfigured(zone))
    }

    /// Evaluate a thermal update and store the resulting snapshot.
    ///
    /// The zone policy is read, the zone's throttled devices are counted and
    /// this device's flag is flipped all under the zone lock, so neither
    /// concurrent updates nor a policy replacement can overrun the zone's
    /// capacity.
    pub fn update_device_thermal(
        &self,
        device_id: &str,
        metrics: ThermalMetrics,
    ) -> Result<ThrottleDecision> {
        if !metrics.is_finite() {
            return Err(FleetError::InvalidTelemetry(format!(
                "device {}: non-finite temperature reading",
                device_id
            )));
        }
        let id = DeviceId::new(device_id);
        let zone = self.zone_of(device_id)?;
        if self.inventory.get_device(device_id)?.metrics.thermal.is_throttled {
            // A slot held elsewhere belongs to a zone the device has left
            self.drop_admissions(&id, Some(&zone))?;
        }

        let zone_lock = self.zone_state(&zone)?;
        let mut state = zone_lock.lock().map_err(|_| FleetError::poisoned("zone"))?;
        let policy = self
            .zone_policy(&zone)?
            .ok_or_else(|| FleetError::PolicyNotConfigured(zone.clone()))?;

        let prior = self.inventory.get_device(device_id)?.metrics.thermal.is_throttled;
        // Only an admission recorded in this zone counts as a held slot
        let holds_slot = prior && state.admissions.contains(&id);
        let mut next = metrics;

        let decision = match policy.worst_exceedance(&next) {
            None => {
                let hold = holds_slot && !policy.allows_release(&next);
                next.is_throttled = hold;
                if policy.exceeds_warning(&next) {
                    self.push_event(ThermalEvent::new(ThermalEventType::Warning, id.clone(), hold))?;
                }
                if hold {
                    ThrottleDecision::Held
                } else if prior {
                    state.admissions.retain(|a| a != &id);
                    log::info!("device {} cooled down, throttle released", id);
                    ThrottleDecision::Released
                } else if policy.exceeds_warning(&next) {
                    ThrottleDecision::Warning
                } else {
                    ThrottleDecision::Normal
                }
            }
            Some(_) if !policy.auto_throttle => {
                next.is_throttled = holds_slot;
                self.push_event(ThermalEvent::new(ThermalEventType::Critical, id.clone(), holds_slot))?;
                log::warn!("device {} critical in zone {} with auto-throttle disabled", id, zone);
                ThrottleDecision::Unmanaged
            }
            Some(_) if holds_slot => {
                next.is_throttled = true;
                self.push_event(ThermalEvent::new(ThermalEventType::Critical, id.clone(), true))?;
                ThrottleDecision::Throttled
            }
            Some(worst) => {
                let throttled = self
                    .zone_devices(&zone)?
                    .iter()
                    .filter(|d| d.id != id && d.metrics.thermal.is_throttled)
                    .count();
                if throttled < policy.max_devices_throttled as usize {
                    next.is_throttled = true;
                    state.admissions.push(id.clone());
                    self.push_event(ThermalEvent::new(ThermalEventType::Critical, id.clone(), true))?;
                    log::info!(
                        "device {} throttled in zone {} ({}/{})",
                        id,
                        zone,
                        throttled + 1,
                        policy.max_devices_throttled
                    );
                    ThrottleDecision::Throttled
                } else {
                    let violation = format!(
                        "Device {}: {} temperature {:.1}°C exceeds critical threshold {:.1}°C but zone throttle limit reached",
                        id, worst.dimension, worst.value, worst.threshold
                    );
                    log::warn!("zone {}: {}", zone, violation);
                    next.is_throttled = false;
                    while state.violations.len() >= self.config.max_violations_per_zone.max(1) {
                        state.violations.pop_front();
                    }
                    state.violations.push_back(violation.clone());
                    ThrottleDecision::Rejected { violation }
                }
            }
        };

        self.inventory.record_thermal(device_id, next)?;
        Ok(decision)
    }

    /// Give back a device's throttle slot in the zone of its current rack.
    ///
    /// Used before a device moves to another zone. Returns whether the
    /// device was throttled.
    pub fn release_device(&self, device_id: &str) -> Result<bool> {
        let id = DeviceId::new(device_id);
        let zone = match self.zone_of(device_id) {
            Ok(zone) => Some(zone),
            Err(FleetError::RackNotFound(_)) => None,
            Err(e) => return Err(e),
        };
        let released = {
            let zone_lock = zone.as_deref().map(|z| self.zone_state(z)).transpose()?;
            let _guard = match &zone_lock {
                Some(lock) => Some(lock.lock().map_err(|_| FleetError::poisoned("zone"))?),
                None => None,
            };
            let mut thermal = self.inventory.get_device(device_id)?.metrics.thermal;
            let was_throttled = thermal.is_throttled;
            if was_throttled {
                thermal.is_throttled = false;
                self.inventory.record_thermal(device_id, thermal)?;
                log::info!("device {} leaving zone {:?}, throttle released", id, zone);
            }
            was_throttled
        };
        self.drop_admissions(&id, None)?;
        Ok(released)
    }

    /// Drop everything kept about a device that left the inventory:
    /// its policy override and any recorded admission.
    pub fn forget_device(&self, device_id: &str) -> Result<()> {
        let id = DeviceId::new(device_id);
        self.device_policies
            .write()
            .map_err(|_| FleetError::poisoned("device policies"))?
            .remove(device_id);
        self.drop_admissions(&id, None)?;
        log::debug!("device {} forgotten by thermal manager", id);
        Ok(())
    }

    pub fn get_device_thermal(&self, device_id: &str) -> Result<ThermalMetrics> {
        Ok(self.inventory.get_device(device_id)?.metrics.thermal)
    }

    /// Recompute a zone's thermal summary from current device snapshots
    pub fn get_zone_metrics(&self, zone: &str) -> Result<ZoneMetrics> {
        let policy = match self.zone_policy(zone)? {
            Some(p) => p,
            None => {
                return Err(if self.topology.has_zone(zone)? {
                    FleetError::PolicyNotConfigured(zone.to_string())
                } else {
                    FleetError::ZoneNotFound(zone.to_string())
                });
            }
        };

        let zone_lock = self.zone_state(zone)?;
        let state = zone_lock.lock().map_err(|_| FleetError::poisoned("zone"))?;
        let devices = self.zone_devices(zone)?;

        let temps: Vec<f64> = devices.iter().map(|d| d.metrics.thermal.cpu_temp).collect();
        let max_temp = temps.iter().copied().fold(None, |acc: Option<f64>, t| {
            Some(acc.map_or(t, |a| a.max(t)))
        });
        let average_temp = if temps.is_empty() {
            0.0
        } else {
            temps.iter().sum::<f64>() / temps.len() as f64
        };

        Ok(ZoneMetrics {
            total_devices: devices.len(),
            max_temp: max_temp.unwrap_or(0.0),
            average_temp,
            devices_over_temp: devices
                .iter()
                .filter(|d| !policy.critical_exceedances(&d.metrics.thermal).is_empty())
                .count(),
            devices_throttled: devices
                .iter()
                .filter(|d| d.metrics.thermal.is_throttled)
                .count(),
            policy_violations: state.violations.iter().cloned().collect(),
        })
    }

    /// Full event history in insertion order
    pub fn get_thermal_events(&self) -> Result<Vec<ThermalEvent>> {
        Ok(self
            .events
            .read()
            .map_err(|_| FleetError::poisoned("thermal events"))?
            .all())
    }

    pub fn events_for_device(&self, device_id: &str) -> Result<Vec<ThermalEvent>> {
        Ok(self
            .events
            .read()
            .map_err(|_| FleetError::poisoned("thermal events"))?
            .for_device(device_id))
    }

    pub fn events_since(&self, since: DateTime<Utc>) -> Result<Vec<ThermalEvent>> {
        Ok(self
            .events
            .read()
            .map_err(|_| FleetError::poisoned("thermal events"))?
            .since(since))
    }

    /// Drop accumulated violations of a zone, returning how many were removed
    pub fn clear_violations(&self, zone: &str) -> Result<usize> {
        let zone_lock = self.zone_state(zone)?;
        let mut state = zone_lock.lock().map_err(|_| FleetError::poisoned("zone"))?;
        let n = state.violations.len();
        state.violations.clear();
        Ok(n)
    }

    fn zone_of(&self, device_id: &str) -> Result<String> {
        let device = self.inventory.get_device(device_id)?;
        self.topology.get_zone_for_rack(&device.location.rack)
    }

    fn zone_policy(&self, zone: &str) -> Result<Option<Arc<ThermalPolicy>>> {
        Ok(self
            .zone_policies
            .read()
            .map_err(|_| FleetError::poisoned("zone policies"))?
            .get(zone)
            .cloned())
    }

    /// Devices whose rack belongs to the zone
    fn zone_devices(&self, zone: &str) -> Result<Vec<DeviceState>> {
        let racks: Vec<String> = self.topology.racks_in_zone(zone)?;
        Ok(self
            .inventory
            .list_devices()?
            .into_iter()
            .filter(|d| racks.contains(&d.location.rack))
            .collect())
    }

    fn zone_state(&self, zone: &str) -> Result<Arc<Mutex<ZoneState>>> {
        if let Some(state) = self
            .zones
            .read()
            .map_err(|_| FleetError::poisoned("zones"))?
            .get(zone)
        {
            return Ok(state.clone());
        }
        let mut zones = self.zones.write().map_err(|_| FleetError::poisoned("zones"))?;
        let state = zones.entry(zone.to_string()).or_default().clone();
        Ok(state)
    }

    /// Remove a device's admission from every zone except `keep`.
    /// Zone locks are taken one at a time; callers must not hold one.
    fn drop_admissions(&self, id: &DeviceId, keep: Option<&str>) -> Result<()> {
        let zones: Vec<(String, Arc<Mutex<ZoneState>>)> = self
            .zones
            .read()
            .map_err(|_| FleetError::poisoned("zones"))?
            .iter()
            .filter(|(zone, _)| Some(zone.as_str()) != keep)
            .map(|(zone, state)| (zone.clone(), state.clone()))
            .collect();
        for (zone, lock) in zones {
            let mut state = lock.lock().map_err(|_| FleetError::poisoned("zone"))?;
            let before = state.admissions.len();
            state.admissions.retain(|a| a != id);
            if state.admissions.len() != before {
                log::debug!("dropped stale admission of {} in zone {}", id, zone);
            }
        }
        Ok(())
    }

    fn push_event(&self, event: ThermalEvent) -> Result<()> {
        self.events
            .write()
            .map_err(|_| FleetError::poisoned("thermal events"))?
            .push(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::thermal::policy::ThermalProfile;
    use crate::topology::RackConfig;
    use crate::types::PhysicalLocation;

    struct Fixture {
        inventory: Arc<Inventory>,
        manager: ThermalPolicyManager,
    }

    fn fixture() -> Fixture {
        let inventory = Arc::new(Inventory::new());
        let topology = Arc::new(TopologyManager::new());
        topology.register_rack("rack-a", RackConfig::new(42, 20_000.0, "zone-1")).unwrap();
        topology.register_rack("rack-b", RackConfig::new(42, 20_000.0, "zone-1")).unwrap();
        topology.register_rack("rack-c", RackConfig::new(42, 20_000.0, "zone-2")).unwrap();
        let manager = ThermalPolicyManager::new(inventory.clone(), topology);
        Fixture { inventory, manager }
    }

    fn policy(cpu_critical: f64, max_throttled: u32) -> ThermalPolicy {
        ThermalPolicy {
            profile: ThermalProfile::Custom,
            cpu_warning: cpu_critical - 10.0,
            cpu_critical,
            max_devices_throttled: max_throttled,
            ..ThermalPolicy::for_profile(ThermalProfile::Custom)
        }
    }

    fn add_device(f: &Fixture, id: &str, rack: &str) {
        let zone = if rack == "rack-c" { "zone-2" } else { "zone-1" };
        f.inventory
            .register_device(DeviceState::new(id, PhysicalLocation::new(rack, 1, zone)))
            .unwrap();
    }

    fn cpu(temp: f64) -> ThermalMetrics {
        ThermalMetrics {
            cpu_temp: temp,
            gpu_temp: 50.0,
            ambient_temp: 22.0,
            fan_speed: 4200.0,
            last_update: Utc::now(),
            ..Default::default()
        }
    }

    #[test]
    fn test_first_come_first_served_admission() {
        let f = fixture();
        f.manager.set_zone_policy("zone-1", policy(80.0, 2)).unwrap();
        for id in ["d1", "d2", "d3"] {
            add_device(&f, id, "rack-a");
        }

        assert_eq!(f.manager.update_device_thermal("d1", cpu(81.0)).unwrap(), ThrottleDecision::Throttled);
        assert_eq!(f.manager.update_device_thermal("d2", cpu(82.0)).unwrap(), ThrottleDecision::Throttled);
        let third = f.manager.update_device_thermal("d3", cpu(85.0)).unwrap();
        match third {
            ThrottleDecision::Rejected { violation } => {
                assert!(violation.contains("85.0"));
                assert!(violation.contains("zone throttle limit reached"));
            }
            other => panic!("expected rejection, got {:?}", other),
        }

        assert!(!f.manager.get_device_thermal("d3").unwrap().is_throttled);
        assert_eq!(f.manager.get_device_thermal("d3").unwrap().cpu_temp, 85.0);

        let zm = f.manager.get_zone_metrics("zone-1").unwrap();
        assert_eq!(zm.devices_throttled, 2);
        assert_eq!(zm.devices_over_temp, 3);
        assert_eq!(zm.policy_violations.len(), 1);
        assert_eq!(
            zm.policy_violations[0],
            "Device d3: CPU temperature 85.0°C exceeds critical threshold 80.0°C but zone throttle limit reached"
        );
    }

    #[test]
    fn test_below_warning_no_event() {
        let f = fixture();
        f.manager.set_zone_policy("zone-1", policy(80.0, 2)).unwrap();
        add_device(&f, "cool", "rack-a");

        let d = f.manager.update_device_thermal("cool", cpu(55.0)).unwrap();
        assert_eq!(d, ThrottleDecision::Normal);
        assert!(!f.manager.get_device_thermal("cool").unwrap().is_throttled);
        assert!(f.manager.get_thermal_events().unwrap().is_empty());
    }

    #[test]
    fn test_warning_event() {
        let f = fixture();
        f.manager.set_zone_policy("zone-1", policy(80.0, 2)).unwrap();
        add_device(&f, "warm", "rack-a");

        assert_eq!(f.manager.update_device_thermal("warm", cpu(75.0)).unwrap(), ThrottleDecision::Warning);
        let events = f.manager.get_thermal_events().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, ThermalEventType::Warning);
        assert!(!events[0].throttled);
    }

    #[test]
    fn test_critical_event_on_admission() {
        let f = fixture();
        f.manager.set_zone_policy("zone-1", policy(80.0, 1)).unwrap();
        add_device(&f, "hot", "rack-a");
        f.manager.update_device_thermal("hot", cpu(90.0)).unwrap();

        let events = f.manager.events_for_device("hot").unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, ThermalEventType::Critical);
        assert!(events[0].throttled);
    }

    #[test]
    fn test_release_frees_slot() {
        let f = fixture();
        f.manager.set_zone_policy("zone-1", policy(80.0, 1)).unwrap();
        add_device(&f, "a", "rack-a");
        add_device(&f, "b", "rack-b");

        f.manager.update_device_thermal("a", cpu(85.0)).unwrap();
        assert!(matches!(
            f.manager.update_device_thermal("b", cpu(85.0)).unwrap(),
            ThrottleDecision::Rejected { .. }
        ));
        assert_eq!(f.manager.update_device_thermal("a", cpu(60.0)).unwrap(), ThrottleDecision::Released);
        assert_eq!(f.manager.update_device_thermal("b", cpu(85.0)).unwrap(), ThrottleDecision::Throttled);
        assert_eq!(f.manager.get_zone_metrics("zone-1").unwrap().devices_throttled, 1);
    }

    #[test]
    fn test_throttled_device_keeps_slot_when_zone_full() {
        let f = fixture();
        f.manager.set_zone_policy("zone-1", policy(80.0, 1)).unwrap();
        add_device(&f, "a", "rack-a");
        f.manager.update_device_thermal("a", cpu(85.0)).unwrap();
        assert_eq!(f.manager.update_device_thermal("a", cpu(88.0)).unwrap(), ThrottleDecision::Throttled);
        assert!(f.manager.get_zone_metrics("zone-1").unwrap().policy_violations.is_empty());
    }

    #[test]
    fn test_hysteresis_holds_throttle() {
        let f = fixture();
        let mut p = ThermalPolicy::for_profile(ThermalProfile::Balanced);
        p.max_devices_throttled = 1;
        f.manager.set_zone_policy("zone-1", p).unwrap();
        add_device(&f, "a", "rack-a");

        assert_eq!(f.manager.update_device_thermal("a", cpu(86.0)).unwrap(), ThrottleDecision::Throttled);
        // Below critical 85 but within the 3°C balanced margin
        assert_eq!(f.manager.update_device_thermal("a", cpu(84.0)).unwrap(), ThrottleDecision::Held);
        assert!(f.manager.get_device_thermal("a").unwrap().is_throttled);
        assert_eq!(f.manager.update_device_thermal("a", cpu(81.0)).unwrap(), ThrottleDecision::Released);
        assert!(!f.manager.get_device_thermal("a").unwrap().is_throttled);
    }

    #[test]
    fn test_auto_throttle_disabled() {
        let f = fixture();
        let mut p = policy(80.0, 2);
        p.auto_throttle = false;
        f.manager.set_zone_policy("zone-1", p).unwrap();
        add_device(&f, "a", "rack-a");

        assert_eq!(f.manager.update_device_thermal("a", cpu(90.0)).unwrap(), ThrottleDecision::Unmanaged);
        assert!(!f.manager.get_device_thermal("a").unwrap().is_throttled);
        let events = f.manager.get_thermal_events().unwrap();
        assert_eq!(events.len(), 1);
        assert!(!events[0].throttled);
    }

    #[test]
    fn test_device_override_does_not_change_admission() {
        let f = fixture();
        f.manager.set_zone_policy("zone-1", policy(80.0, 2)).unwrap();
        add_device(&f, "a", "rack-a");
        f.manager.set_device_policy("a", policy(95.0, 2)).unwrap();

        assert_eq!(f.manager.get_device_policy("a").unwrap().cpu_critical, 95.0);
        assert_eq!(f.manager.effective_policy("a").unwrap().cpu_critical, 95.0);
        // 85°C is under the override but over the zone policy: zone policy wins
        assert_eq!(f.manager.update_device_thermal("a", cpu(85.0)).unwrap(), ThrottleDecision::Throttled);

        f.manager.remove_device_policy("a").unwrap();
        assert_eq!(f.manager.effective_policy("a").unwrap().cpu_critical, 80.0);
    }

    #[test]
    fn test_policy_not_configured() {
        let f = fixture();
        add_device(&f, "a", "rack-c");
        let err = f.manager.update_device_thermal("a", cpu(90.0)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PolicyNotConfigured);
        assert!(matches!(f.manager.get_zone_metrics("zone-2"), Err(FleetError::PolicyNotConfigured(_))));
        assert!(matches!(f.manager.get_zone_policy("zone-2"), Err(FleetError::PolicyNotFound(_))));
    }

    #[test]
    fn test_lookup_failures() {
        let f = fixture();
        assert!(matches!(
            f.manager.update_device_thermal("ghost", cpu(50.0)),
            Err(FleetError::DeviceNotFound(_))
        ));
        assert!(matches!(
            f.manager.set_zone_policy("zone-9", policy(80.0, 1)),
            Err(FleetError::ZoneNotFound(_))
        ));
        assert!(matches!(f.manager.get_zone_metrics("zone-9"), Err(FleetError::ZoneNotFound(_))));
        assert!(matches!(
            f.manager.set_device_policy("ghost", policy(80.0, 1)),
            Err(FleetError::DeviceNotFound(_))
        ));
        assert!(matches!(f.manager.get_device_policy("ghost"), Err(FleetError::PolicyNotFound(_))));
    }

    #[test]
    fn test_unregistered_rack() {
        let f = fixture();
        f.inventory
            .register_device(DeviceState::new("stray", PhysicalLocation::new("rack-z", 1, "zone-1")))
            .unwrap();
        assert!(matches!(
            f.manager.update_device_thermal("stray", cpu(50.0)),
            Err(FleetError::RackNotFound(_))
        ));
    }

    #[test]
    fn test_non_finite_reading_rejected_without_side_effects() {
        let f = fixture();
        f.manager.set_zone_policy("zone-1", policy(80.0, 1)).unwrap();
        add_device(&f, "a", "rack-a");
        let err = f.manager.update_device_thermal("a", cpu(f64::NAN)).unwrap_err();
        assert!(matches!(err, FleetError::InvalidTelemetry(_)));
        assert_eq!(f.manager.get_device_thermal("a").unwrap().cpu_temp, 0.0);
    }

    #[test]
    fn test_preprovisioning_allowed_by_config() {
        let inventory = Arc::new(Inventory::new());
        let topology = Arc::new(TopologyManager::new());
        let manager = ThermalPolicyManager::with_config(
            inventory,
            topology,
            ThermalManagerConfig {
                allow_policy_preprovisioning: true,
                ..Default::default()
            },
        );
        manager.set_zone_policy("future-zone", policy(80.0, 3)).unwrap();
        assert_eq!(manager.get_zone_policy("future-zone").unwrap().max_devices_throttled, 3);
        let zm = manager.get_zone_metrics("future-zone").unwrap();
        assert_eq!(zm.total_devices, 0);
        assert_eq!(zm.max_temp, 0.0);
    }

    #[test]
    fn test_invalid_policy_rejected() {
        let f = fixture();
        let mut p = policy(80.0, 1);
        p.cpu_warning = 90.0;
        assert!(matches!(f.manager.set_zone_policy("zone-1", p), Err(FleetError::InvalidConfig(_))));
    }

    #[test]
    fn test_zone_metrics_aggregates_and_idempotent() {
        let f = fixture();
        f.manager.set_zone_policy("zone-1", policy(80.0, 1)).unwrap();
        f.manager.set_zone_policy("zone-2", policy(80.0, 1)).unwrap();
        add_device(&f, "a", "rack-a");
        add_device(&f, "b", "rack-b");
        add_device(&f, "c", "rack-c");
        f.manager.update_device_thermal("a", cpu(60.0)).unwrap();
        f.manager.update_device_thermal("b", cpu(90.0)).unwrap();
        f.manager.update_device_thermal("c", cpu(99.0)).unwrap();

        let first = f.manager.get_zone_metrics("zone-1").unwrap();
        assert_eq!(first.total_devices, 2);
        assert_eq!(first.max_temp, 90.0);
        assert_eq!(first.average_temp, 75.0);
        assert_eq!(first.devices_over_temp, 1);
        assert_eq!(first.devices_throttled, 1);
        assert_eq!(first, f.manager.get_zone_metrics("zone-1").unwrap());
    }

    #[test]
    fn test_zones_have_independent_capacity() {
        let f = fixture();
        f.manager.set_zone_policy("zone-1", policy(80.0, 1)).unwrap();
        f.manager.set_zone_policy("zone-2", policy(80.0, 1)).unwrap();
        add_device(&f, "a", "rack-a");
        add_device(&f, "c", "rack-c");
        assert_eq!(f.manager.update_device_thermal("a", cpu(90.0)).unwrap(), ThrottleDecision::Throttled);
        assert_eq!(f.manager.update_device_thermal("c", cpu(90.0)).unwrap(), ThrottleDecision::Throttled);
    }

    #[test]
    fn test_shrinking_capacity_releases_latest_admissions() {
        let f = fixture();
        f.manager.set_zone_policy("zone-1", policy(80.0, 3)).unwrap();
        for id in ["x", "y", "z"] {
            add_device(&f, id, "rack-a");
        }
        for id in ["y", "x", "z"] {
            f.manager.update_device_thermal(id, cpu(90.0)).unwrap();
        }
        f.manager.set_zone_policy("zone-1", policy(80.0, 1)).unwrap();

        assert!(f.manager.get_device_thermal("y").unwrap().is_throttled);
        assert!(!f.manager.get_device_thermal("x").unwrap().is_throttled);
        assert!(!f.manager.get_device_thermal("z").unwrap().is_throttled);
        assert_eq!(f.manager.get_zone_metrics("zone-1").unwrap().devices_throttled, 1);
    }

    #[test]
    fn test_violation_cap() {
        let inventory = Arc::new(Inventory::new());
        let topology = Arc::new(TopologyManager::new());
        topology.register_rack("rack-a", RackConfig::new(42, 20_000.0, "zone-1")).unwrap();
        let manager = ThermalPolicyManager::with_config(
            inventory.clone(),
            topology,
            ThermalManagerConfig {
                max_violations_per_zone: 2,
                ..Default::default()
            },
        );
        manager.set_zone_policy("zone-1", policy(80.0, 0)).unwrap();
        inventory
            .register_device(DeviceState::new("a", PhysicalLocation::new("rack-a", 1, "zone-1")))
            .unwrap();
        for t in [81.0, 82.0, 83.0] {
            manager.update_device_thermal("a", cpu(t)).unwrap();
        }
        let violations = manager.get_zone_metrics("zone-1").unwrap().policy_violations;
        assert_eq!(violations.len(), 2);
        assert!(violations[0].contains("82.0"));
        assert_eq!(manager.clear_violations("zone-1").unwrap(), 2);
    }

    fn admissions(f: &Fixture, zone: &str) -> Vec<DeviceId> {
        f.manager.zone_state(zone).unwrap().lock().unwrap().admissions.clone()
    }

    fn move_to_rack(f: &Fixture, id: &str, rack: &str, zone: &str) {
        let mut state = f.inventory.get_device(id).unwrap();
        state.location = PhysicalLocation::new(rack, 1, zone);
        f.inventory.update_state(state).unwrap();
    }

    #[test]
    fn test_violation_names_worst_exceedance() {
        let f = fixture();
        f.manager.set_zone_policy("zone-1", policy(80.0, 0)).unwrap();
        add_device(&f, "a", "rack-a");
        let mut m = cpu(81.0);
        m.gpu_temp = 95.0;
        match f.manager.update_device_thermal("a", m).unwrap() {
            ThrottleDecision::Rejected { violation } => assert_eq!(
                violation,
                "Device a: GPU temperature 95.0°C exceeds critical threshold 85.0°C but zone throttle limit reached"
            ),
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_moved_throttled_device_rejected_by_full_zone() {
        let f = fixture();
        f.manager.set_zone_policy("zone-1", policy(80.0, 1)).unwrap();
        f.manager.set_zone_policy("zone-2", policy(80.0, 1)).unwrap();
        add_device(&f, "b", "rack-a");
        add_device(&f, "a", "rack-c");
        assert_eq!(f.manager.update_device_thermal("b", cpu(90.0)).unwrap(), ThrottleDecision::Throttled);
        assert_eq!(f.manager.update_device_thermal("a", cpu(90.0)).unwrap(), ThrottleDecision::Throttled);

        move_to_rack(&f, "a", "rack-a", "zone-1");
        let decision = f.manager.update_device_thermal("a", cpu(95.0)).unwrap();
        assert!(matches!(decision, ThrottleDecision::Rejected { .. }), "{:?}", decision);

        assert!(!f.manager.get_device_thermal("a").unwrap().is_throttled);
        let zm = f.manager.get_zone_metrics("zone-1").unwrap();
        assert_eq!(zm.devices_throttled, 1);
        assert_eq!(zm.policy_violations.len(), 1);
        assert!(admissions(&f, "zone-2").is_empty());
        assert_eq!(admissions(&f, "zone-1"), vec![DeviceId::new("b")]);
    }

    #[test]
    fn test_moved_throttled_device_admitted_when_zone_has_room() {
        let f = fixture();
        f.manager.set_zone_policy("zone-1", policy(80.0, 2)).unwrap();
        f.manager.set_zone_policy("zone-2", policy(80.0, 1)).unwrap();
        add_device(&f, "b", "rack-a");
        add_device(&f, "a", "rack-c");
        f.manager.update_device_thermal("b", cpu(90.0)).unwrap();
        f.manager.update_device_thermal("a", cpu(90.0)).unwrap();

        move_to_rack(&f, "a", "rack-b", "zone-1");
        assert_eq!(f.manager.update_device_thermal("a", cpu(95.0)).unwrap(), ThrottleDecision::Throttled);
        assert_eq!(f.manager.get_zone_metrics("zone-1").unwrap().devices_throttled, 2);
        assert_eq!(admissions(&f, "zone-1"), vec![DeviceId::new("b"), DeviceId::new("a")]);
        assert!(admissions(&f, "zone-2").is_empty());
    }

    #[test]
    fn test_moved_device_not_held_without_slot() {
        let f = fixture();
        let mut p = ThermalPolicy::for_profile(ThermalProfile::Balanced);
        p.max_devices_throttled = 1;
        f.manager.set_zone_policy("zone-1", p.clone()).unwrap();
        f.manager.set_zone_policy("zone-2", p).unwrap();
        add_device(&f, "a", "rack-c");
        f.manager.update_device_thermal("a", cpu(90.0)).unwrap();

        move_to_rack(&f, "a", "rack-a", "zone-1");
        // Inside the hysteresis band, but the slot belonged to zone-2
        assert_eq!(f.manager.update_device_thermal("a", cpu(84.0)).unwrap(), ThrottleDecision::Released);
        assert!(!f.manager.get_device_thermal("a").unwrap().is_throttled);
    }

    #[test]
    fn test_release_device_frees_slot() {
        let f = fixture();
        f.manager.set_zone_policy("zone-1", policy(80.0, 1)).unwrap();
        add_device(&f, "a", "rack-a");
        add_device(&f, "b", "rack-b");
        f.manager.update_device_thermal("a", cpu(90.0)).unwrap();

        assert!(f.manager.release_device("a").unwrap());
        assert!(!f.manager.release_device("a").unwrap());
        assert!(admissions(&f, "zone-1").is_empty());
        assert_eq!(f.manager.update_device_thermal("b", cpu(90.0)).unwrap(), ThrottleDecision::Throttled);
    }

    #[test]
    fn test_forget_device_drops_policy_and_admission() {
        let f = fixture();
        f.manager.set_zone_policy("zone-1", policy(80.0, 1)).unwrap();
        add_device(&f, "a", "rack-a");
        f.manager.set_device_policy("a", policy(90.0, 1)).unwrap();
        f.manager.update_device_thermal("a", cpu(95.0)).unwrap();

        f.inventory.remove_device("a").unwrap();
        f.manager.forget_device("a").unwrap();
        assert!(matches!(f.manager.get_device_policy("a"), Err(FleetError::PolicyNotFound(_))));
        assert!(admissions(&f, "zone-1").is_empty());
    }

    #[test]
    fn test_policy_replacement_during_admissions_respects_capacity() {
        let f = fixture();
        f.manager.set_zone_policy("zone-1", policy(80.0, 8)).unwrap();
        let ids: Vec<String> = (0..16).map(|i| format!("dev-{}", i)).collect();
        for (i, id) in ids.iter().enumerate() {
            add_device(&f, id, if i % 2 == 0 { "rack-a" } else { "rack-b" });
        }

        std::thread::scope(|s| {
            for id in &ids {
                let manager = &f.manager;
                s.spawn(move || {
                    for round in 0..50 {
                        let temp = if round % 2 == 0 { 90.0 } else { 60.0 };
                        manager.update_device_thermal(id, cpu(temp)).unwrap();
                    }
                });
            }
            for _ in 0..50 {
                f.manager.set_zone_policy("zone-1", policy(80.0, 1)).unwrap();
                let zm = f.manager.get_zone_metrics("zone-1").unwrap();
                assert!(zm.devices_throttled <= 1, "capacity 1 but {} throttled", zm.devices_throttled);
                f.manager.set_zone_policy("zone-1", policy(80.0, 8)).unwrap();
            }
        });

        f.manager.set_zone_policy("zone-1", policy(80.0, 1)).unwrap();
        assert!(f.manager.get_zone_metrics("zone-1").unwrap().devices_throttled <= 1);
    }

    #[test]
    fn test_concurrent_admission_never_exceeds_capacity() {
        let f = fixture();
        f.manager.set_zone_policy("zone-1", policy(80.0, 3)).unwrap();
        let ids: Vec<String> = (0..32).map(|i| format!("dev-{}", i)).collect();
        for (i, id) in ids.iter().enumerate() {
            add_device(&f, id, if i % 2 == 0 { "rack-a" } else { "rack-b" });
        }

        std::thread::scope(|s| {
            for id in &ids {
                let manager = &f.manager;
                s.spawn(move || {
                    for round in 0..20 {
                        let temp = if round % 3 == 2 { 60.0 } else { 90.0 + round as f64 };
                        manager.update_device_thermal(id, cpu(temp)).unwrap();
                        let zm = manager.get_zone_metrics("zone-1").unwrap();
                        assert!(zm.devices_throttled <= 3, "throttled {}", zm.devices_throttled);
                    }
                });
            }
        });

        let zm = f.manager.get_zone_metrics("zone-1").unwrap();
        assert!(zm.devices_throttled <= 3);
        assert!(!zm.policy_violations.is_empty());
    }
}
