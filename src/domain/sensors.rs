#![allow(dead_code)]
use std::time::Duration;
use thiserror::Error;

#[cfg(feature = "sim")]
use crate::domain::clock::Clock;
#[cfg(feature = "sim")]
use std::sync::Arc;

#[derive(Debug, Error)]
pub enum SensorError {
    #[error("Communication error: {0}")]
    Communication(String),
    #[error("No reading available yet")]
    NoReading,
}

/// Household power meter at the grid connection point.
///
/// Positive readings mean the household draws from the grid.
#[cfg_attr(test, mockall::automock)]
pub trait PowerMeter: Send + Sync {
    /// Total household power in watts. `raw` skips any smoothing the meter
    /// implementation applies for display purposes.
    fn power_total_w(&self, raw: bool) -> f64;
    /// Uptime stamp of the last reading, `None` before the first.
    fn last_update(&self) -> Option<Duration>;
}

/// Battery management system view of the storage battery.
#[cfg_attr(test, mockall::automock)]
pub trait Battery: Send + Sync {
    /// Whether the BMS link currently delivers plausible data.
    fn is_valid(&self) -> bool;
    /// State of charge, percent.
    fn soc_percent(&self) -> f64;
    /// Age of the SoC reading, `None` before the first.
    fn soc_age(&self) -> Option<Duration>;
}

/// Solar charge controller telemetry (Victron-style VE.Direct frame).
#[cfg_attr(test, mockall::automock)]
pub trait SolarChargeController: Send + Sync {
    fn is_data_valid(&self) -> bool;
    /// Battery-side output voltage in volts.
    fn voltage_v(&self) -> f64;
    /// Battery-side output current in amps.
    fn current_a(&self) -> f64;
    /// Panel-side input power in watts.
    fn panel_power_w(&self) -> f64;
}

/// Grid-powered DC charger (PSU) that may also be charging the battery.
#[cfg_attr(test, mockall::automock)]
pub trait DcPsuCharger: Send + Sync {
    /// Whether the PSU is actively supplying power right now. While it is,
    /// the limiter yields so the PSU can ramp down first.
    fn is_auto_power_active(&self) -> bool;
}

#[cfg(feature = "sim")]
pub struct SimulatedPowerMeter {
    clock: Arc<dyn Clock>,
    state: parking_lot::RwLock<SimMeterState>,
}

#[cfg(feature = "sim")]
#[derive(Debug, Default)]
struct SimMeterState {
    power_w: f64,
    last_update: Option<Duration>,
}

#[cfg(feature = "sim")]
impl SimulatedPowerMeter {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock, state: parking_lot::RwLock::new(SimMeterState::default()) }
    }

    pub fn set_power_w(&self, watts: f64) {
        let mut st = self.state.write();
        st.power_w = watts;
        st.last_update = Some(self.clock.uptime());
    }

    /// Produce a plausible household load for the given hour with some noise.
    pub fn simulate_household(&self, hour: u32) {
        use rand::Rng;
        let base = match hour {
            0..=5 => 180.0,
            6..=8 => 650.0,
            9..=16 => 350.0,
            17..=21 => 900.0,
            _ => 250.0,
        };
        let noise: f64 = rand::thread_rng().gen_range(-40.0..40.0);
        self.set_power_w(base + noise);
    }
}

#[cfg(feature = "sim")]
impl PowerMeter for SimulatedPowerMeter {
    fn power_total_w(&self, _raw: bool) -> f64 {
        self.state.read().power_w
    }

    fn last_update(&self) -> Option<Duration> {
        self.state.read().last_update
    }
}

#[cfg(feature = "sim")]
pub struct SimulatedBattery {
    clock: Arc<dyn Clock>,
    state: parking_lot::RwLock<SimBatteryState>,
}

#[cfg(feature = "sim")]
#[derive(Debug, Default)]
struct SimBatteryState {
    valid: bool,
    soc_percent: f64,
    updated: Option<Duration>,
}

#[cfg(feature = "sim")]
impl SimulatedBattery {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock, state: parking_lot::RwLock::new(SimBatteryState::default()) }
    }

    pub fn set_soc(&self, soc_percent: f64) {
        let mut st = self.state.write();
        st.valid = true;
        st.soc_percent = soc_percent;
        st.updated = Some(self.clock.uptime());
    }

    pub fn set_valid(&self, valid: bool) {
        self.state.write().valid = valid;
    }
}

#[cfg(feature = "sim")]
impl Battery for SimulatedBattery {
    fn is_valid(&self) -> bool {
        self.state.read().valid
    }

    fn soc_percent(&self) -> f64 {
        self.state.read().soc_percent
    }

    fn soc_age(&self) -> Option<Duration> {
        let st = self.state.read();
        st.updated.map(|at| self.clock.uptime().saturating_sub(at))
    }
}

#[cfg(feature = "sim")]
#[derive(Default)]
pub struct SimulatedSolarCharger {
    state: parking_lot::RwLock<SimSolarState>,
}

#[cfg(feature = "sim")]
#[derive(Debug, Default)]
struct SimSolarState {
    valid: bool,
    voltage_v: f64,
    current_a: f64,
    panel_power_w: f64,
}

#[cfg(feature = "sim")]
impl SimulatedSolarCharger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_output(&self, voltage_v: f64, current_a: f64, panel_power_w: f64) {
        let mut st = self.state.write();
        st.valid = true;
        st.voltage_v = voltage_v;
        st.current_a = current_a;
        st.panel_power_w = panel_power_w;
    }

    pub fn set_valid(&self, valid: bool) {
        self.state.write().valid = valid;
    }
}

#[cfg(feature = "sim")]
impl SolarChargeController for SimulatedSolarCharger {
    fn is_data_valid(&self) -> bool {
        self.state.read().valid
    }

    fn voltage_v(&self) -> f64 {
        self.state.read().voltage_v
    }

    fn current_a(&self) -> f64 {
        self.state.read().current_a
    }

    fn panel_power_w(&self) -> f64 {
        self.state.read().panel_power_w
    }
}

#[cfg(feature = "sim")]
#[derive(Default)]
pub struct SimulatedPsuCharger {
    active: parking_lot::RwLock<bool>,
}

#[cfg(feature = "sim")]
impl SimulatedPsuCharger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_active(&self, active: bool) {
        *self.active.write() = active;
    }
}

#[cfg(feature = "sim")]
impl DcPsuCharger for SimulatedPsuCharger {
    fn is_auto_power_active(&self) -> bool {
        *self.active.read()
    }
}
