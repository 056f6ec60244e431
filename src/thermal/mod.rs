// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 nervosys

//! Thermal policy management
//!
//! Zone and device thermal policies, automatic throttle admission under a
//! shared per-zone capacity, zone metrics and the thermal event history.

pub mod events;
pub mod manager;
pub mod policy;

pub use events::{ThermalEvent, ThermalEventLog, ThermalEventType};
pub use manager::{ThermalManagerConfig, ThermalPolicyManager, ThrottleDecision, ZoneMetrics};
pub use policy::{Exceedance, ThermalPolicy, ThermalProfile};
