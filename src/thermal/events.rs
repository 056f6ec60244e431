//! Thermal event history

use crate::types::DeviceId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Event type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThermalEventType {
    Warning,
    Critical,
}

impl std::fmt::Display for ThermalEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Warning => write!(f, "warning"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// One qualifying thermal evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThermalEvent {
    #[serde(rename = "type")]
    pub event_type: ThermalEventType,
    pub device_id: DeviceId,
    /// Throttle state after the evaluation
    pub throttled: bool,
    pub timestamp: DateTime<Utc>,
}

impl ThermalEvent {
    pub fn new(event_type: ThermalEventType, device_id: DeviceId, throttled: bool) -> Self {
        Self {
            event_type,
            device_id,
            throttled,
            timestamp: Utc::now(),
        }
    }
}

/// Append-only event log; optionally a ring of fixed capacity
#[derive(Debug, Default)]
pub struct ThermalEventLog {
    events: VecDeque<ThermalEvent>,
    capacity: Option<usize>,
}

impl ThermalEventLog {
    /// Log keeping the full history
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Log keeping at most `capacity` events, oldest evicted first
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity.min(4096)),
            capacity: Some(capacity.max(1)),
        }
    }

    pub fn push(&mut self, event: ThermalEvent) {
        if let Some(cap) = self.capacity {
            while self.events.len() >= cap {
                self.events.pop_front();
            }
        }
        self.events.push_back(event);
    }

    /// All retained events in insertion order
    pub fn all(&self) -> Vec<ThermalEvent> {
        self.events.iter().cloned().collect()
    }

    pub fn for_device(&self, id: &str) -> Vec<ThermalEvent> {
        self.events
            .iter()
            .filter(|e| e.device_id.as_str() == id)
            .cloned()
            .collect()
    }

    pub fn since(&self, since: DateTime<Utc>) -> Vec<ThermalEvent> {
        self.events
            .iter()
            .filter(|e| e.timestamp >= since)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
