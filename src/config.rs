use anyhow::Result;
use figment::{providers::{Env, Format, Toml}, Figment};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub controller: ControllerConfig,
    pub power_limiter: DplConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ControllerConfig {
    pub tick_ms: u64,
}

/// How to drain the battery when solar passthrough is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatteryDrainStrategy {
    /// Discharge only while no usable solar power is available.
    EmptyAtNight,
    /// Discharge whenever the start threshold is reached.
    EmptyWhenFull,
}

/// Dynamic power limiter settings, read by the control loop on every tick.
///
/// Thresholds of zero (or less) disable the respective check. Voltages are
/// battery-side DC volts, SoC values are percent.
#[derive(Debug, Clone, Deserialize)]
pub struct DplConfig {
    pub enabled: bool,
    /// Serial of the inverter this limiter controls.
    pub inverter_serial: u64,
    /// DC input channel whose voltage is used for threshold decisions.
    pub inverter_channel: usize,
    /// Whether this inverter's output is part of the power meter reading.
    pub is_inverter_behind_power_meter: bool,
    pub power_meter_enabled: bool,
    pub battery_enabled: bool,
    pub solar_charger_enabled: bool,
    pub lower_power_limit_w: i32,
    pub upper_power_limit_w: i32,
    /// Household consumption setpoint; the limiter never drives net draw to zero.
    pub target_power_consumption_w: i32,
    pub target_power_consumption_hysteresis_w: i32,
    pub battery_soc_start_threshold: f64,
    pub battery_soc_stop_threshold: f64,
    pub voltage_start_threshold: f64,
    pub voltage_stop_threshold: f64,
    /// Volts added per watt of AC output to undo the sag of a loaded battery.
    pub voltage_load_correction_factor: f64,
    pub solar_passthrough_enabled: bool,
    /// Cable/junction losses between solar charger and inverter, percent.
    pub solar_passthrough_losses_percent: f64,
    pub battery_drain_strategy: BatteryDrainStrategy,
    pub full_solar_passthrough_soc: f64,
    pub full_solar_passthrough_start_voltage: f64,
    pub full_solar_passthrough_stop_voltage: f64,
    /// Hour of day (0-23) for the daily inverter restart, negative disables it.
    pub restart_hour: i8,
}

impl Default for DplConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            inverter_serial: 0,
            inverter_channel: 0,
            is_inverter_behind_power_meter: false,
            power_meter_enabled: true,
            battery_enabled: true,
            solar_charger_enabled: true,
            lower_power_limit_w: 50,
            upper_power_limit_w: 800,
            target_power_consumption_w: 0,
            target_power_consumption_hysteresis_w: 0,
            battery_soc_start_threshold: 0.0,
            battery_soc_stop_threshold: 0.0,
            voltage_start_threshold: 0.0,
            voltage_stop_threshold: 0.0,
            voltage_load_correction_factor: 0.001,
            solar_passthrough_enabled: false,
            solar_passthrough_losses_percent: 3.0,
            battery_drain_strategy: BatteryDrainStrategy::EmptyAtNight,
            full_solar_passthrough_soc: 100.0,
            full_solar_passthrough_start_voltage: 0.0,
            full_solar_passthrough_stop_voltage: 0.0,
            restart_hour: -1,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let figment = Figment::new()
            .merge(Toml::file("config/default.toml"))
            .merge(Env::prefixed("DPL__").split("__"));
        Ok(figment.extract()?)
    }
}
