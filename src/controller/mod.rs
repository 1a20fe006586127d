//! The dynamic power limiter control loop.
//!
//! Invoked from a periodic scheduler tick; never blocks and never spawns
//! concurrent work of its own. All mutable control state is owned by the
//! loop; the only concurrency boundary is the inverter command channel,
//! whose completion is observed by polling. A pending command simply skips
//! the tick, which is the loop's backpressure mechanism.

pub mod calculation;
pub mod governor;
pub mod restart;
pub mod shutdown;
pub mod status;
pub mod thresholds;

#[cfg(test)]
pub(crate) mod test_support;

use anyhow::Result;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::DplConfig;
use crate::domain::{
    Battery, ChannelField, ChannelType, Clock, CommandState, DcPsuCharger, Inverter,
    InverterRegistry, PowerMeter, SolarChargeController,
};

pub use restart::RestartSchedule;
pub use status::Status;
pub use thresholds::Compare;

use status::StatusAnnouncer;

/// Externally settable operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Normal,
    Disabled,
    UnconditionalFullSolarPassthrough,
}

/// Coarse state projection for UI surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerLimiterState {
    Inactive,
    UsingSolarAndBattery,
    UsingSolarOnly,
    Charging,
}

/// Power meter readings older than this shut the limiter down.
pub(crate) const METER_MAX_AGE: Duration = Duration::from_secs(30);
/// Grace period after a completed inverter command during which stale
/// readings are expected and ignored.
pub(crate) const SETTLING_DELAY: Duration = Duration::from_secs(3);
/// Initial recalculation backoff after a committed change.
pub(crate) const BACKOFF_DEFAULT: Duration = Duration::from_millis(128);
/// Backoff ceiling while the system is judged stable.
pub(crate) const BACKOFF_CAP: Duration = Duration::from_millis(1024);

/// Process-lifetime control state, owned exclusively by the loop.
#[derive(Default)]
pub(crate) struct ControlState {
    /// Shared handle to the inverter we last worked with; lives as long as
    /// either the controller or the command dispatcher holds it.
    pub(crate) inverter: Option<Arc<dyn Inverter>>,
    pub(crate) last_requested_limit_w: i32,
    pub(crate) last_limit_commit: Option<Duration>,
    pub(crate) last_calculation: Option<Duration>,
    pub(crate) backoff: Duration,
    pub(crate) battery_discharge_enabled: bool,
    /// Sticky full-solar-passthrough latch, hysteresis by construction.
    pub(crate) full_solar_passthrough: bool,
    /// Absolute uptime deadline for the shutdown budget; `None` = inactive.
    /// Armed once, monotonically held until cleared.
    pub(crate) shutdown_deadline: Option<Duration>,
    pub(crate) restart: RestartSchedule,
    pub(crate) next_restart_check: Duration,
    pub(crate) announcer: StatusAnnouncer,
}

impl ControlState {
    fn new() -> Self {
        Self { backoff: BACKOFF_DEFAULT, ..Self::default() }
    }
}

/// External collaborators the limiter fuses each tick.
pub struct Collaborators {
    pub inverters: Arc<dyn InverterRegistry>,
    pub meter: Arc<dyn PowerMeter>,
    pub battery: Arc<dyn Battery>,
    pub solar: Arc<dyn SolarChargeController>,
    pub psu: Arc<dyn DcPsuCharger>,
    pub clock: Arc<dyn Clock>,
}

/// The dynamic power limiter: one owned context object, constructed once and
/// held by the scheduler. No ambient globals.
pub struct PowerLimiter {
    cfg: Arc<RwLock<DplConfig>>,
    inverters: Arc<dyn InverterRegistry>,
    meter: Arc<dyn PowerMeter>,
    battery: Arc<dyn Battery>,
    solar: Arc<dyn SolarChargeController>,
    psu: Arc<dyn DcPsuCharger>,
    pub(crate) clock: Arc<dyn Clock>,
    mode: RwLock<Mode>,
    state: Mutex<ControlState>,
}

impl PowerLimiter {
    pub fn new(cfg: Arc<RwLock<DplConfig>>, deps: Collaborators) -> Self {
        Self {
            cfg,
            inverters: deps.inverters,
            meter: deps.meter,
            battery: deps.battery,
            solar: deps.solar,
            psu: deps.psu,
            clock: deps.clock,
            mode: RwLock::new(Mode::Normal),
            state: Mutex::new(ControlState::new()),
        }
    }

    pub fn set_mode(&self, mode: Mode) {
        *self.mode.write() = mode;
    }

    /// Replace the limiter configuration; picked up on the next tick.
    /// Callers changing the restart hour should follow up with
    /// [`PowerLimiter::calc_next_inverter_restart`].
    pub fn apply_config(&self, cfg: DplConfig) {
        *self.cfg.write() = cfg;
    }

    pub fn mode(&self) -> Mode {
        *self.mode.read()
    }

    pub async fn last_requested_power_limit(&self) -> i32 {
        self.state.lock().await.last_requested_limit_w
    }

    pub async fn last_status(&self) -> Option<Status> {
        self.state.lock().await.announcer.last()
    }

    pub async fn power_limiter_state(&self) -> PowerLimiterState {
        let st = self.state.lock().await;
        let Some(inverter) = &st.inverter else {
            return PowerLimiterState::Inactive;
        };
        if !inverter.is_reachable() {
            return PowerLimiterState::Inactive;
        }
        match (inverter.is_producing(), st.battery_discharge_enabled) {
            (true, true) => PowerLimiterState::UsingSolarAndBattery,
            (true, false) => PowerLimiterState::UsingSolarOnly,
            (false, _) => PowerLimiterState::Charging,
        }
    }

    /// Recompute the next scheduled restart, e.g. after a config change.
    pub async fn calc_next_inverter_restart(&self) {
        let cfg = self.cfg.read().clone();
        let mut st = self.state.lock().await;
        self.recompute_restart(&mut st, &cfg);
    }

    /// Drive the control loop until cancelled.
    pub async fn run(self: Arc<Self>, tick: Duration) -> Result<()> {
        let mut interval = tokio::time::interval(tick.max(Duration::from_millis(50)));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            if let Err(e) = self.tick().await {
                warn!(error = %e, "control tick failed");
            }
        }
    }

    /// One control tick: validate preconditions, decide, command.
    pub async fn tick(&self) -> Result<()> {
        let mut st = self.state.lock().await;
        self.tick_inner(&mut st).await
    }

    async fn tick_inner(&self, st: &mut ControlState) -> Result<()> {
        let cfg = self.cfg.read().clone();
        let uptime = self.clock.uptime();

        // no command may be sent to any inverter until wall-clock time is
        // valid; until then we can do nothing, not even shut down
        if self.clock.local_time().is_none() {
            st.announcer.announce(Status::WaitingForValidTimestamp, uptime);
            return Ok(());
        }

        // mid-shutdown: keep retrying until the inverter is known to be off,
        // preserving the status that led to the decision
        if st.shutdown_deadline.is_some() {
            self.shutdown(st, &cfg).await?;
            return Ok(());
        }

        if !cfg.enabled {
            self.shutdown_with(st, &cfg, Status::DisabledByConfig).await?;
            return Ok(());
        }

        if self.mode() == Mode::Disabled {
            self.shutdown_with(st, &cfg, Status::DisabledByMode).await?;
            return Ok(());
        }

        // in case of (newly) broken configuration, shut down the last
        // inverter we worked with (if any)
        let Some(inverter) = self.inverters.inverter_by_serial(cfg.inverter_serial) else {
            self.shutdown_with(st, &cfg, Status::InverterInvalid).await?;
            return Ok(());
        };

        // if a different inverter is configured now, shut down the previous
        // one first, then pick up the new one
        if let Some(previous) = &st.inverter {
            if previous.serial() != inverter.serial() {
                self.shutdown_with(st, &cfg, Status::InverterChanged).await?;
                return Ok(());
            }
        }

        st.inverter = Some(Arc::clone(&inverter));

        if !inverter.is_reachable() {
            st.announcer.announce(Status::InverterOffline, uptime);
            return Ok(());
        }

        if !inverter.commands_enabled() {
            st.announcer.announce(Status::InverterCommandsDisabled, uptime);
            return Ok(());
        }

        if inverter.last_limit_command() == CommandState::Pending {
            st.announcer.announce(Status::InverterLimitPending, uptime);
            return Ok(());
        }

        if inverter.last_power_command() == CommandState::Pending {
            st.announcer.announce(Status::InverterPowerCmdPending, uptime);
            return Ok(());
        }

        // a calculated limit is always clamped to the reported device max
        // power, which is only known once device info has arrived
        if inverter.max_power_w() <= 0.0 {
            st.announcer.announce(Status::InverterDevInfoPending, uptime);
            return Ok(());
        }

        if self.mode() == Mode::UnconditionalFullSolarPassthrough {
            return self.unconditional_solar_passthrough(st, &cfg, &inverter).await;
        }

        // the normal mode of operation requires a valid power meter reading
        if !cfg.power_meter_enabled {
            self.shutdown_with(st, &cfg, Status::PowerMeterDisabled).await?;
            return Ok(());
        }

        let meter_update = self.meter.last_update();
        let meter_age = meter_update.map(|at| uptime.saturating_sub(at));
        if meter_age.is_none_or(|age| age > METER_MAX_AGE) {
            self.shutdown_with(st, &cfg, Status::PowerMeterTimeout).await?;
            return Ok(());
        }

        // wait out the settling window after the last completed command,
        // then require meter and inverter stats from after that window
        if let Some(last_command) = inverter.last_command_update() {
            let settling_end = last_command + SETTLING_DELAY;
            if uptime < settling_end {
                st.announcer.announce(Status::Settling, uptime);
                return Ok(());
            }
            if inverter.last_stats_update().is_none_or(|at| at <= settling_end) {
                st.announcer.announce(Status::InverterStatsPending, uptime);
                return Ok(());
            }
            if meter_update.is_none_or(|at| at <= settling_end) {
                st.announcer.announce(Status::PowerMeterPending, uptime);
                return Ok(());
            }
        }

        // adaptive backoff: while the system is stable there is no point in
        // recomputing every tick
        if let Some(last) = st.last_calculation {
            if uptime < last + st.backoff {
                st.announcer.announce(Status::Stable, uptime);
                return Ok(());
            }
        }

        self.handle_scheduled_restart(st, &cfg, &inverter).await?;

        let stop_reached = thresholds::is_stop_threshold_reached(
            &cfg,
            self.battery.as_ref(),
            inverter.as_ref(),
        );
        let start_reached = thresholds::is_start_threshold_reached(
            &cfg,
            self.battery.as_ref(),
            inverter.as_ref(),
        );
        let below_stop = thresholds::is_below_stop_threshold(
            &cfg,
            self.battery.as_ref(),
            inverter.as_ref(),
        );
        let solar_usable =
            calculation::can_use_direct_solar_power(&cfg, below_stop, self.solar.as_ref());

        st.battery_discharge_enabled = calculation::evaluate_battery_discharge(
            &cfg,
            stop_reached,
            start_reached,
            solar_usable,
            st.battery_discharge_enabled,
        );

        debug!(
            soc_percent = self.battery.soc_percent(),
            start_threshold_reached = start_reached,
            stop_threshold_reached = stop_reached,
            solar_usable,
            battery_discharge_enabled = st.battery_discharge_enabled,
            producing = inverter.is_producing(),
            "tick decision inputs"
        );

        // evaluated lazily: the latch only updates while battery discharge
        // is allowed
        let full_passthrough = st.battery_discharge_enabled
            && thresholds::use_full_solar_passthrough(
                &cfg,
                self.battery.as_ref(),
                inverter.as_ref(),
                &mut st.full_solar_passthrough,
            );

        let solar_dc_w = calculation::solar_charge_power_w(solar_usable, self.solar.as_ref());
        let adjusted_solar_w =
            calculation::inverter_power_dc_to_ac(&cfg, inverter.as_ref(), solar_dc_w);
        let meter_total_w = self.meter.power_total_w(true);
        let ac_output_w = inverter.channel_value(ChannelType::Ac, 0, ChannelField::PowerW);

        let desired_w = calculation::calc_power_limit(
            &cfg,
            meter_total_w,
            ac_output_w,
            adjusted_solar_w,
            self.psu.is_auto_power_active(),
            solar_usable,
            st.battery_discharge_enabled,
            full_passthrough,
        );

        let committed = self.set_new_power_limit(st, &inverter, desired_w, &cfg).await?;

        debug!(
            desired_w,
            requested_w = st.last_requested_limit_w,
            committed,
            "leaving tick"
        );

        st.last_calculation = Some(uptime);

        if !committed {
            // increase the polling backoff while the system seems stable
            st.backoff = (st.backoff * 2).min(BACKOFF_CAP);
            st.announcer.announce(Status::Stable, uptime);
            return Ok(());
        }

        st.backoff = BACKOFF_DEFAULT;
        Ok(())
    }

    /// The inverter behaves as if connected to the panels directly: all
    /// solar power, and only solar power, is fed to the AC side.
    async fn unconditional_solar_passthrough(
        &self,
        st: &mut ControlState,
        cfg: &DplConfig,
        inverter: &Arc<dyn Inverter>,
    ) -> Result<()> {
        if !cfg.solar_charger_enabled || !self.solar.is_data_valid() {
            self.shutdown_with(st, cfg, Status::SolarTelemetryInvalid).await?;
            return Ok(());
        }

        let solar_dc_w = (self.solar.voltage_v() * self.solar.current_a()) as i32;
        let desired_w = calculation::inverter_power_dc_to_ac(cfg, inverter.as_ref(), solar_dc_w);
        self.set_new_power_limit(st, inverter, desired_w, cfg).await?;
        st.announcer
            .announce(Status::UnconditionalSolarPassthrough, self.clock.uptime());
        Ok(())
    }

    async fn handle_scheduled_restart(
        &self,
        st: &mut ControlState,
        cfg: &DplConfig,
        inverter: &Arc<dyn Inverter>,
    ) -> Result<()> {
        let uptime = self.clock.uptime();

        if let RestartSchedule::At(at) = st.restart {
            if at <= uptime {
                info!("sending scheduled inverter restart");
                inverter.send_restart().await?;
                self.recompute_restart(st, cfg);
                return Ok(());
            }
        }

        if cfg.restart_hour >= 0
            && st.restart == RestartSchedule::Unknown
            && st.next_restart_check <= uptime
        {
            if self.clock.local_time().is_some() {
                self.recompute_restart(st, cfg);
            } else {
                warn!("restart scheduling: wall clock not ready");
                st.next_restart_check = uptime + restart::RESTART_RECHECK;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::test_support::{limiter_with, TestDeps};
    use crate::domain::{ManualClock, MockInverter};

    fn fresh_battery(deps: &mut TestDeps, soc: f64) {
        deps.battery.expect_is_valid().return_const(true);
        deps.battery
            .expect_soc_age()
            .returning(|| Some(Duration::from_secs(10)));
        deps.battery.expect_soc_percent().return_const(soc);
    }

    fn live_meter(deps: &mut TestDeps, watts: f64) {
        let clock = Arc::clone(&deps.clock);
        deps.meter
            .expect_last_update()
            .returning(move || Some(clock.uptime()));
        deps.meter.expect_power_total_w().return_const(watts);
    }

    /// A reachable, producing single-channel inverter with fresh stats.
    fn stocked_inverter(ac_output_w: f64, dc_power_w: f64) -> MockInverter {
        let mut inverter = MockInverter::new();
        inverter.expect_serial().return_const(1u64);
        inverter.expect_is_reachable().return_const(true);
        inverter.expect_commands_enabled().return_const(true);
        inverter
            .expect_last_limit_command()
            .return_const(CommandState::Success);
        inverter
            .expect_last_power_command()
            .return_const(CommandState::Success);
        inverter.expect_max_power_w().return_const(800.0);
        inverter.expect_is_producing().return_const(true);
        inverter
            .expect_channels()
            .returning(|_| vec![0]);
        inverter
            .expect_channel_value()
            .returning(move |ty, _, field| match (ty, field) {
                (ChannelType::Ac, ChannelField::PowerW) => ac_output_w,
                (ChannelType::Dc, ChannelField::PowerW) => dc_power_w,
                _ => 0.0,
            });
        inverter
    }

    fn register(deps: &mut TestDeps, inverter: MockInverter) {
        let inverter: Arc<dyn Inverter> = Arc::new(inverter);
        deps.registry
            .expect_inverter_by_serial()
            .returning(move |_| Some(Arc::clone(&inverter)));
    }

    /// Defaults adjusted so battery discharge engages via a fresh SoC.
    fn cfg() -> DplConfig {
        DplConfig {
            inverter_serial: 1,
            battery_soc_start_threshold: 20.0,
            target_power_consumption_hysteresis_w: 25,
            ..DplConfig::default()
        }
    }

    #[tokio::test]
    async fn invalid_wall_clock_blocks_everything() {
        let deps = TestDeps::default();
        deps.clock.clear_wall();
        // no collaborator expectations: any access panics
        let (limiter, _h) = limiter_with(cfg(), deps);

        limiter.tick().await.unwrap();
        assert_eq!(limiter.last_status().await, Some(Status::WaitingForValidTimestamp));
    }

    #[tokio::test]
    async fn disabled_config_shuts_down() {
        let (limiter, _h) = limiter_with(
            DplConfig { enabled: false, ..cfg() },
            TestDeps::default(),
        );
        limiter.tick().await.unwrap();
        assert_eq!(limiter.last_status().await, Some(Status::DisabledByConfig));
        assert_eq!(limiter.power_limiter_state().await, PowerLimiterState::Inactive);
    }

    #[tokio::test]
    async fn disabled_mode_shuts_down() {
        let (limiter, _h) = limiter_with(cfg(), TestDeps::default());
        limiter.set_mode(Mode::Disabled);
        limiter.tick().await.unwrap();
        assert_eq!(limiter.last_status().await, Some(Status::DisabledByMode));
    }

    #[tokio::test]
    async fn unknown_serial_shuts_down() {
        let mut deps = TestDeps::default();
        deps.registry
            .expect_inverter_by_serial()
            .returning(|_| None);
        let (limiter, _h) = limiter_with(cfg(), deps);
        limiter.tick().await.unwrap();
        assert_eq!(limiter.last_status().await, Some(Status::InverterInvalid));
    }

    #[tokio::test]
    async fn offline_inverter_announces_without_shutdown() {
        let mut deps = TestDeps::default();
        let mut inverter = MockInverter::new();
        inverter.expect_serial().return_const(1u64);
        inverter.expect_is_reachable().return_const(false);
        register(&mut deps, inverter);
        let (limiter, _h) = limiter_with(cfg(), deps);

        limiter.tick().await.unwrap();
        assert_eq!(limiter.last_status().await, Some(Status::InverterOffline));
        // the handle is kept; a later shutdown must reach this inverter
        assert!(limiter.state.lock().await.inverter.is_some());
    }

    /// Shutting down a producing inverter stops it and drops the limit.
    fn expect_stop(inverter: &mut MockInverter) {
        inverter
            .expect_send_power_state()
            .returning(|_| Ok(()));
        inverter
            .expect_send_power_limit()
            .returning(|_, _| Ok(()));
    }

    #[tokio::test]
    async fn meter_disabled_shuts_down() {
        let mut deps = TestDeps::default();
        let mut inverter = stocked_inverter(0.0, 300.0);
        expect_stop(&mut inverter);
        register(&mut deps, inverter);
        let (limiter, _h) = limiter_with(
            DplConfig { power_meter_enabled: false, ..cfg() },
            deps,
        );
        limiter.tick().await.unwrap();
        assert_eq!(limiter.last_status().await, Some(Status::PowerMeterDisabled));
    }

    #[tokio::test]
    async fn stale_meter_shuts_down() {
        let mut deps = TestDeps::default();
        deps.clock.advance(Duration::from_secs(100));
        let mut inverter = stocked_inverter(0.0, 300.0);
        expect_stop(&mut inverter);
        register(&mut deps, inverter);
        deps.meter
            .expect_last_update()
            .returning(|| Some(Duration::from_secs(10)));
        let (limiter, _h) = limiter_with(cfg(), deps);

        limiter.tick().await.unwrap();
        assert_eq!(limiter.last_status().await, Some(Status::PowerMeterTimeout));
    }

    #[tokio::test]
    async fn settling_window_defers_recalculation() {
        let mut deps = TestDeps::default();
        deps.clock.advance(Duration::from_secs(10));
        live_meter(&mut deps, 500.0);
        let mut inverter = stocked_inverter(0.0, 300.0);
        // command completed one second ago, inside the settling window
        inverter
            .expect_last_command_update()
            .returning(|| Some(Duration::from_secs(9)));
        register(&mut deps, inverter);
        let (limiter, _h) = limiter_with(cfg(), deps);

        limiter.tick().await.unwrap();
        assert_eq!(limiter.last_status().await, Some(Status::Settling));
    }

    #[tokio::test]
    async fn committed_tick_resets_backoff_and_stable_ticks_double_it() {
        let mut deps = TestDeps::default();
        deps.clock.advance(Duration::from_secs(10));
        let clock: Arc<ManualClock> = Arc::clone(&deps.clock);
        fresh_battery(&mut deps, 80.0);
        live_meter(&mut deps, 500.0);
        deps.psu.expect_is_auto_power_active().return_const(false);

        let mut inverter = stocked_inverter(0.0, 300.0);
        inverter.expect_last_command_update().returning(|| None);
        inverter
            .expect_send_power_limit()
            .times(1)
            .returning(|_, _| Ok(()));
        register(&mut deps, inverter);
        let (limiter, _h) = limiter_with(cfg(), deps);

        // first tick computes a 500 W limit and commits it
        limiter.tick().await.unwrap();
        assert_eq!(limiter.last_requested_power_limit().await, 500);
        assert_eq!(limiter.state.lock().await.backoff, BACKOFF_DEFAULT);
        assert_eq!(
            limiter.power_limiter_state().await,
            PowerLimiterState::UsingSolarAndBattery
        );

        // an immediate second tick sits out the backoff window
        limiter.tick().await.unwrap();
        assert_eq!(limiter.last_status().await, Some(Status::Stable));

        // past the window, identical inputs: no commit, backoff doubles
        clock.advance(Duration::from_secs(1));
        limiter.tick().await.unwrap();
        assert_eq!(limiter.state.lock().await.backoff, BACKOFF_DEFAULT * 2);
    }

    #[tokio::test]
    async fn unconditional_passthrough_mirrors_solar_output() {
        let mut deps = TestDeps::default();
        deps.solar.expect_is_data_valid().return_const(true);
        deps.solar.expect_voltage_v().return_const(48.0);
        deps.solar.expect_current_a().return_const(6.0);

        let mut inverter = stocked_inverter(0.0, 300.0);
        // 288 W DC at nominal efficiency and 3 % losses
        inverter
            .expect_send_power_limit()
            .with(mockall::predicate::eq(270.0), mockall::predicate::eq(false))
            .times(1)
            .returning(|_, _| Ok(()));
        register(&mut deps, inverter);
        let (limiter, _h) = limiter_with(cfg(), deps);
        limiter.set_mode(Mode::UnconditionalFullSolarPassthrough);

        limiter.tick().await.unwrap();
        assert_eq!(
            limiter.last_status().await,
            Some(Status::UnconditionalSolarPassthrough)
        );
        assert_eq!(limiter.last_requested_power_limit().await, 270);
    }

    #[tokio::test]
    async fn scheduled_restart_fires_and_reschedules() {
        let mut deps = TestDeps::default();
        deps.clock.advance(Duration::from_secs(10));
        let clock: Arc<ManualClock> = Arc::clone(&deps.clock);
        fresh_battery(&mut deps, 80.0);
        live_meter(&mut deps, 500.0);
        deps.psu.expect_is_auto_power_active().return_const(false);

        let mut inverter = stocked_inverter(0.0, 300.0);
        inverter.expect_last_command_update().returning(|| None);
        inverter
            .expect_send_power_limit()
            .returning(|_, _| Ok(()));
        inverter
            .expect_send_restart()
            .times(1)
            .returning(|| Ok(()));
        register(&mut deps, inverter);

        // wall clock starts at 12:00; restart due at 13:00
        let (limiter, _h) = limiter_with(
            DplConfig { restart_hour: 13, ..cfg() },
            deps,
        );

        limiter.tick().await.unwrap();
        assert_eq!(
            limiter.state.lock().await.restart,
            RestartSchedule::At(Duration::from_secs(3610))
        );

        // an hour later the restart fires and moves to the next day
        clock.advance(Duration::from_secs(3610));
        limiter.tick().await.unwrap();
        assert_eq!(
            limiter.state.lock().await.restart,
            RestartSchedule::At(Duration::from_secs(3620 + 24 * 60 * 60))
        );
    }

    #[tokio::test]
    async fn backoff_saturates_at_the_cap() {
        let mut deps = TestDeps::default();
        deps.clock.advance(Duration::from_secs(10));
        let clock: Arc<ManualClock> = Arc::clone(&deps.clock);
        fresh_battery(&mut deps, 80.0);
        live_meter(&mut deps, 500.0);
        deps.psu.expect_is_auto_power_active().return_const(false);

        let mut inverter = stocked_inverter(0.0, 300.0);
        inverter.expect_last_command_update().returning(|| None);
        inverter
            .expect_send_power_limit()
            .returning(|_, _| Ok(()));
        register(&mut deps, inverter);
        let (limiter, _h) = limiter_with(cfg(), deps);

        for _ in 0..16 {
            limiter.tick().await.unwrap();
            clock.advance(Duration::from_secs(2));
        }
        assert_eq!(limiter.state.lock().await.backoff, BACKOFF_CAP);
    }
}
