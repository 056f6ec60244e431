//! Thermal policy definitions.
//!
//! A policy carries warning/critical trip temperatures for CPU, GPU and
//! ambient sensors plus the automatic throttle settings of its scope.
//! Policies are always replaced whole, never merged.

use crate::error::{FleetError, Result};
use crate::types::{ThermalDimension, ThermalMetrics};
use serde::{Deserialize, Serialize};

/// Policy profile. Selects preset thresholds and the release hysteresis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThermalProfile {
    /// Run hot, throttle late.
    Performance,
    /// Default datacenter profile.
    #[default]
    Balanced,
    /// Acoustic/longevity oriented, throttle early.
    Quiet,
    /// Operator-supplied thresholds, no release hysteresis.
    Custom,
}

impl ThermalProfile {
    /// Degrees below critical a throttled device must cool to before release.
    pub fn hysteresis_c(self) -> f64 {
        match self {
            Self::Performance => 2.0,
            Self::Balanced => 3.0,
            Self::Quiet => 5.0,
            Self::Custom => 0.0,
        }
    }
}

impl std::fmt::Display for ThermalProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Performance => write!(f, "performance"),
            Self::Balanced => write!(f, "balanced"),
            Self::Quiet => write!(f, "quiet"),
            Self::Custom => write!(f, "custom"),
        }
    }
}

/// Thermal policy for a zone or a single device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThermalPolicy {
    pub profile: ThermalProfile,
    pub cpu_warning: f64,
    pub cpu_critical: f64,
    pub gpu_warning: f64,
    pub gpu_critical: f64,
    pub ambient_warning: f64,
    pub ambient_critical: f64,
    /// Expected telemetry period (seconds).
    pub monitoring_interval_secs: u64,
    /// Minimum spacing between repeated alerts (seconds).
    pub alert_interval_secs: u64,
    pub auto_throttle: bool,
    /// Zone-wide throttle capacity.
    pub max_devices_throttled: u32,
    /// Higher zones are served first by operators; informational here.
    pub zone_priority: u32,
}

impl Default for ThermalPolicy {
    fn default() -> Self {
        Self::for_profile(ThermalProfile::Balanced)
    }
}

/// A reading above its trip temperature.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Exceedance {
    pub dimension: ThermalDimension,
    pub value: f64,
    pub threshold: f64,
}

impl Exceedance {
    /// Degrees above the trip temperature
    pub fn margin(&self) -> f64 {
        self.value - self.threshold
    }
}

impl ThermalPolicy {
    /// Preset thresholds for a profile.
    pub fn for_profile(profile: ThermalProfile) -> Self {
        let (cpu, gpu, ambient, max_throttled) = match profile {
            ThermalProfile::Performance => ((85.0, 95.0), (83.0, 92.0), (30.0, 35.0), 4),
            ThermalProfile::Balanced | ThermalProfile::Custom => {
                ((75.0, 85.0), (75.0, 85.0), (27.0, 32.0), 2)
            }
            ThermalProfile::Quiet => ((65.0, 75.0), (65.0, 75.0), (25.0, 30.0), 1),
        };
        Self {
            profile,
            cpu_warning: cpu.0,
            cpu_critical: cpu.1,
            gpu_warning: gpu.0,
            gpu_critical: gpu.1,
            ambient_warning: ambient.0,
            ambient_critical: ambient.1,
            monitoring_interval_secs: 30,
            alert_interval_secs: 300,
            auto_throttle: true,
            max_devices_throttled: max_throttled,
            zone_priority: 0,
        }
    }

    pub fn warning(&self, dim: ThermalDimension) -> f64 {
        match dim {
            ThermalDimension::Cpu => self.cpu_warning,
            ThermalDimension::Gpu => self.gpu_warning,
            ThermalDimension::Ambient => self.ambient_warning,
        }
    }

    pub fn critical(&self, dim: ThermalDimension) -> f64 {
        match dim {
            ThermalDimension::Cpu => self.cpu_critical,
            ThermalDimension::Gpu => self.gpu_critical,
            ThermalDimension::Ambient => self.ambient_critical,
        }
    }

    pub fn validate(&self) -> Result<()> {
        for dim in ThermalDimension::ALL {
            let (warn, crit) = (self.warning(dim), self.critical(dim));
            if !warn.is_finite() || !crit.is_finite() {
                return Err(FleetError::InvalidConfig(format!(
                    "{} thresholds must be finite",
                    dim
                )));
            }
            if warn >= crit {
                return Err(FleetError::InvalidConfig(format!(
                    "{} warning {:.1}°C must be below critical {:.1}°C",
                    dim, warn, crit
                )));
            }
        }
        if self.monitoring_interval_secs == 0 || self.alert_interval_secs == 0 {
            return Err(FleetError::InvalidConfig(
                "monitoring and alert intervals must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Readings strictly above their critical threshold, in CPU, GPU, ambient order.
    pub fn critical_exceedances(&self, m: &ThermalMetrics) -> Vec<Exceedance> {
        ThermalDimension::ALL
            .iter()
            .filter_map(|dim| {
                let value = m.reading(*dim);
                let threshold = self.critical(*dim);
                (value > threshold).then_some(Exceedance {
                    dimension: *dim,
                    value,
                    threshold,
                })
            })
            .collect()
    }

    /// The exceedance furthest above its threshold; ties go to the
    /// earlier dimension (CPU, GPU, ambient).
    pub fn worst_exceedance(&self, m: &ThermalMetrics) -> Option<Exceedance> {
        self.critical_exceedances(m)
            .into_iter()
            .reduce(|worst, e| if e.margin() > worst.margin() { e } else { worst })
    }

    pub fn exceeds_warning(&self, m: &ThermalMetrics) -> bool {
        ThermalDimension::ALL
            .iter()
            .any(|dim| m.reading(*dim) > self.warning(*dim))
    }

    /// Every reading has cooled past the profile's release point.
    pub fn allows_release(&self, m: &ThermalMetrics) -> bool {
        let margin = self.profile.hysteresis_c();
        ThermalDimension::ALL
            .iter()
            .all(|dim| m.reading(*dim) <= self.critical(*dim) - margin)
    }
}
