//! Power limit calculation: the five-case source-selection policy and the
//! DC to AC efficiency correction.

use tracing::debug;

use crate::config::{BatteryDrainStrategy, DplConfig};
use crate::domain::{ChannelField, ChannelType, Inverter, SolarChargeController};

/// Datasheet peak efficiency, used while the inverter reports zero because it
/// is not producing yet. Without it, a freshly started inverter would compute
/// a limit of zero from its own idle efficiency.
const NOMINAL_PEAK_EFFICIENCY: f64 = 0.967;

/// Minimum panel power for direct solar use, watts.
const MIN_USABLE_PANEL_POWER_W: f64 = 20.0;

/// AC output limit to set so the inverter draws `dc_power_w` on its DC side,
/// corrected for inverter efficiency and cabling losses.
pub(crate) fn inverter_power_dc_to_ac(
    cfg: &DplConfig,
    inverter: &dyn Inverter,
    dc_power_w: i32,
) -> i32 {
    let efficiency_percent =
        inverter.channel_value(ChannelType::Ac, 0, ChannelField::EfficiencyPercent);

    let efficiency_factor = if efficiency_percent > 0.0 {
        efficiency_percent / 100.0
    } else {
        NOMINAL_PEAK_EFFICIENCY
    };

    let losses_factor = 1.0 - cfg.solar_passthrough_losses_percent / 100.0;

    (dc_power_w as f64 * efficiency_factor * losses_factor) as i32
}

/// Whether solar power can drive the inverter directly this tick.
pub(crate) fn can_use_direct_solar_power(
    cfg: &DplConfig,
    below_stop_threshold: bool,
    solar: &dyn SolarChargeController,
) -> bool {
    if !cfg.solar_passthrough_enabled
        || below_stop_threshold
        || !cfg.solar_charger_enabled
        || !solar.is_data_valid()
    {
        return false;
    }

    solar.panel_power_w() >= MIN_USABLE_PANEL_POWER_W
}

/// Instantaneous solar charge power on the battery side, watts DC.
pub(crate) fn solar_charge_power_w(solar_usable: bool, solar: &dyn SolarChargeController) -> i32 {
    if !solar_usable {
        return 0;
    }

    (solar.voltage_v() * solar.current_a()) as i32
}

/// Battery charging cycle decision, §"empties-first": an exhausted battery
/// always disables discharge, the remaining branches only refine the flag.
///
/// The branch order is deliberate and load-bearing; the overlapping
/// strategy conditions must not be merged into a single boolean formula.
pub(crate) fn evaluate_battery_discharge(
    cfg: &DplConfig,
    stop_threshold_reached: bool,
    start_threshold_reached: bool,
    solar_usable: bool,
    previously_enabled: bool,
) -> bool {
    // first, always disable discharge if the battery is empty
    if stop_threshold_reached {
        return false;
    }

    let mut enabled = previously_enabled;

    // solar passthrough disabled: discharge once the start threshold is reached
    if !cfg.solar_passthrough_enabled && start_threshold_reached {
        enabled = true;
    }

    // passthrough enabled, empty-at-night: above the start threshold discharge
    // freely, otherwise only when there is no sunshine to pass through
    if cfg.solar_passthrough_enabled
        && cfg.battery_drain_strategy == BatteryDrainStrategy::EmptyAtNight
    {
        enabled = if start_threshold_reached { true } else { !solar_usable };
    }

    // passthrough enabled, empty-when-full: discharge once the start threshold
    // is reached
    if cfg.solar_passthrough_enabled
        && start_threshold_reached
        && cfg.battery_drain_strategy == BatteryDrainStrategy::EmptyWhenFull
    {
        enabled = true;
    }

    enabled
}

/// The five-case limit policy.
///
/// | solar | battery | full-passthrough | result                            |
/// |-------|---------|------------------|-----------------------------------|
/// | no    | no      | -                | 0                                 |
/// | yes   | no      | -                | min(meter limit, adjusted solar)  |
/// | any   | yes     | no               | meter limit                       |
/// | no    | yes     | yes              | meter limit                       |
/// | yes   | yes     | yes              | max(meter limit, adjusted solar)  |
#[allow(clippy::too_many_arguments)]
pub(crate) fn calc_power_limit(
    cfg: &DplConfig,
    meter_total_w: f64,
    inverter_ac_output_w: f64,
    adjusted_solar_w: i32,
    psu_supplying: bool,
    solar_enabled: bool,
    battery_discharge_enabled: bool,
    full_solar_passthrough: bool,
) -> i32 {
    if !solar_enabled && !battery_discharge_enabled {
        // no energy source is usable
        return 0;
    }

    let mut limit = meter_total_w.round() as i32;

    if cfg.is_inverter_behind_power_meter {
        // the inverter's own output is part of the meter reading and has to
        // be compensated for
        limit += inverter_ac_output_w as i32;
    }

    // a configured target consumption is a deliberate setpoint; we never try
    // to drive net household draw to exactly zero
    limit -= cfg.target_power_consumption_w;

    if battery_discharge_enabled && full_solar_passthrough {
        limit = limit.max(adjusted_solar_w);
    } else if psu_supplying {
        // give the grid-powered PSU priority to ramp down before exporting
        return 0;
    }

    if solar_enabled && !battery_discharge_enabled {
        debug!(
            adjusted_solar_w,
            meter_limit_w = limit,
            "consuming solar power only"
        );
        limit = limit.min(adjusted_solar_w);
    }

    limit
}
