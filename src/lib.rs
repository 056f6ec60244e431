// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 nervosys

//! Fleetwatch: fleet analysis and thermal policy engine
//!
//! Tracks racked devices grouped into cooling zones and answers two
//! questions continuously: what is wrong right now (alerts and
//! recommendations from the [`analyzer`]), and which devices should be
//! throttled automatically without exceeding a zone's shared throttle
//! capacity (the [`thermal`] policy manager).
//!
//! # Examples
//!
//! ```no_run
//! use fleetwatch::{FleetEngine, RackConfig, ThermalPolicy, DeviceState, PhysicalLocation};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = FleetEngine::new();
//! engine.topology().register_rack("rack-a01", RackConfig::new(42, 12_000.0, "zone-1"))?;
//! engine.thermal().set_zone_policy("zone-1", ThermalPolicy::default())?;
//!
//! let device = DeviceState::new("node-17", PhysicalLocation::new("rack-a01", 12, "zone-1"));
//! let outcome = engine.ingest(device)?;
//! println!("health={} decision={:?}", outcome.health, outcome.decision);
//!
//! for alert in engine.analyzer().get_alerts()? {
//!     println!("[{}] {}: {}", alert.severity, alert.device_id, alert.message);
//! }
//! # Ok(())
//! # }
//! ```

pub mod analyzer;
pub mod config;
pub mod engine;
pub mod error;
pub mod inventory;
pub mod thermal;
pub mod topology;
pub mod types;

pub use analyzer::{
    Alert, AlertSeverity, Analyzer, AnalyzerThresholds, FleetSummary, MetricDimension,
    RackUtilization, Recommendation, RemediationAction,
};
pub use config::FleetConfig;
pub use engine::{FleetEngine, FleetReport, IngestOutcome};
pub use error::{ErrorKind, FleetError, Result};
pub use inventory::{HealthThresholds, Inventory};
pub use thermal::{
    ThermalEvent, ThermalEventType, ThermalPolicy, ThermalPolicyManager, ThermalProfile,
    ThrottleDecision, ZoneMetrics,
};
pub use topology::{RackConfig, TopologyManager};
pub use types::{
    DeviceId, DeviceMetrics, DeviceState, HealthStatus, PhysicalLocation, ResourceType,
    ThermalDimension, ThermalMetrics,
};
