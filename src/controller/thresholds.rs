//! Battery threshold evaluation.
//!
//! A fresh state-of-charge reading is authoritative; a load-corrected DC
//! voltage estimate is the fallback when the BMS is absent, invalid or
//! stale. The composition is the contract, not either signal alone.

use std::time::Duration;

use crate::config::DplConfig;
use crate::domain::{Battery, ChannelField, ChannelType, Inverter};

/// SoC readings older than this fall back to the voltage estimate.
const SOC_MAX_AGE: Duration = Duration::from_secs(60);

/// Comparator applied to a reading and its threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compare {
    GreaterEq,
    LessEq,
    Less,
}

impl Compare {
    pub fn eval(self, lhs: f64, rhs: f64) -> bool {
        match self {
            Compare::GreaterEq => lhs >= rhs,
            Compare::LessEq => lhs <= rhs,
            Compare::Less => lhs < rhs,
        }
    }
}

/// DC voltage corrected for the sag caused by the current AC load.
pub(crate) fn load_corrected_voltage(cfg: &DplConfig, inverter: &dyn Inverter) -> f64 {
    let ac_power = inverter.channel_value(ChannelType::Ac, 0, ChannelField::PowerW);
    let dc_voltage =
        inverter.channel_value(ChannelType::Dc, cfg.inverter_channel, ChannelField::VoltageV);

    if dc_voltage <= 0.0 {
        return 0.0;
    }

    dc_voltage + ac_power * cfg.voltage_load_correction_factor
}

pub(crate) fn test_threshold(
    cfg: &DplConfig,
    battery: &dyn Battery,
    inverter: &dyn Inverter,
    soc_threshold: f64,
    volt_threshold: f64,
    compare: Compare,
) -> bool {
    // prefer SoC provided through the battery interface
    if cfg.battery_enabled
        && soc_threshold > 0.0
        && battery.is_valid()
        && battery.soc_age().is_some_and(|age| age < SOC_MAX_AGE)
    {
        return compare.eval(battery.soc_percent(), soc_threshold);
    }

    // use the voltage threshold as fallback
    if volt_threshold <= 0.0 {
        return false;
    }

    compare.eval(load_corrected_voltage(cfg, inverter), volt_threshold)
}

pub(crate) fn is_start_threshold_reached(
    cfg: &DplConfig,
    battery: &dyn Battery,
    inverter: &dyn Inverter,
) -> bool {
    test_threshold(
        cfg,
        battery,
        inverter,
        cfg.battery_soc_start_threshold,
        cfg.voltage_start_threshold,
        Compare::GreaterEq,
    )
}

pub(crate) fn is_stop_threshold_reached(
    cfg: &DplConfig,
    battery: &dyn Battery,
    inverter: &dyn Inverter,
) -> bool {
    test_threshold(
        cfg,
        battery,
        inverter,
        cfg.battery_soc_stop_threshold,
        cfg.voltage_stop_threshold,
        Compare::LessEq,
    )
}

pub(crate) fn is_below_stop_threshold(
    cfg: &DplConfig,
    battery: &dyn Battery,
    inverter: &dyn Inverter,
) -> bool {
    test_threshold(
        cfg,
        battery,
        inverter,
        cfg.battery_soc_stop_threshold,
        cfg.voltage_stop_threshold,
        Compare::Less,
    )
}

/// Updates the sticky full-solar-passthrough latch and reports whether it is
/// engaged. Separate set/clear thresholds give the latch its hysteresis; it
/// only ever flips on an explicit crossing.
pub(crate) fn use_full_solar_passthrough(
    cfg: &DplConfig,
    battery: &dyn Battery,
    inverter: &dyn Inverter,
    latch: &mut bool,
) -> bool {
    if !cfg.solar_passthrough_enabled {
        return false;
    }

    if test_threshold(
        cfg,
        battery,
        inverter,
        cfg.full_solar_passthrough_soc,
        cfg.full_solar_passthrough_start_voltage,
        Compare::GreaterEq,
    ) {
        *latch = true;
    }

    if test_threshold(
        cfg,
        battery,
        inverter,
        cfg.full_solar_passthrough_soc,
        cfg.full_solar_passthrough_stop_voltage,
        Compare::Less,
    ) {
        *latch = false;
    }

    *latch
}
