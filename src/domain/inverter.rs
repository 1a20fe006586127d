#![allow(dead_code)]
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

#[cfg(feature = "sim")]
use crate::domain::clock::Clock;
use std::time::Duration;

/// Inverter-specific errors
#[derive(Debug, Error)]
pub enum InverterError {
    #[error("Communication error: {0}")]
    Communication(String),
    #[error("Invalid power limit: {0}W (exceeds maximum)")]
    InvalidLimit(f64),
    #[error("Inverter offline or unavailable")]
    Offline,
    #[error("Inverter rejected command: {0}")]
    Rejected(String),
}

/// Outcome of the most recent asynchronously dispatched command.
///
/// Commands are fire-and-forget; completion is observed later by polling.
/// The control loop treats `Pending` as a reason to skip work this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandState {
    Pending,
    Success,
    Failure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelType {
    Ac,
    Dc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelField {
    PowerW,
    VoltageV,
    EfficiencyPercent,
}

/// Handle to one microinverter.
///
/// Telemetry getters never block; they read the last received statistics.
/// The `send_*` methods enqueue a command on the radio link and return, with
/// completion reported through [`Inverter::last_limit_command`] and
/// [`Inverter::last_power_command`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Inverter: Send + Sync {
    fn serial(&self) -> u64;
    fn is_reachable(&self) -> bool;
    fn is_producing(&self) -> bool;
    /// Whether the operator allows commands to be sent to this inverter.
    fn commands_enabled(&self) -> bool;
    /// Rated maximum AC power; zero until device info has been received.
    fn max_power_w(&self) -> f64;

    fn channels(&self, ty: ChannelType) -> Vec<usize>;
    fn channel_value(&self, ty: ChannelType, channel: usize, field: ChannelField) -> f64;

    /// Uptime stamp of the last statistics frame, `None` before the first.
    fn last_stats_update(&self) -> Option<Duration>;
    /// Uptime stamp of the last *completed* limit or power command.
    fn last_command_update(&self) -> Option<Duration>;

    fn last_limit_command(&self) -> CommandState;
    fn last_power_command(&self) -> CommandState;

    /// Request a new active power limit in watts.
    async fn send_power_limit(&self, watts: f64, persistent: bool) -> Result<()>;
    /// Request production on/off.
    async fn send_power_state(&self, on: bool) -> Result<()>;
    /// Request a device restart.
    async fn send_restart(&self) -> Result<()>;
}

/// Resolves the configured inverter identity to a live handle each tick.
#[cfg_attr(test, mockall::automock)]
pub trait InverterRegistry: Send + Sync {
    fn inverter_by_serial(&self, serial: u64) -> Option<Arc<dyn Inverter>>;
}

/// Simulated inverter for development and testing.
///
/// Commands complete with a fixed latency; statistics are always fresh.
#[cfg(feature = "sim")]
pub struct SimulatedInverter {
    serial: u64,
    max_power_w: f64,
    clock: Arc<dyn Clock>,
    state: parking_lot::RwLock<SimInverterState>,
}

#[cfg(feature = "sim")]
#[derive(Debug)]
struct SimInverterState {
    reachable: bool,
    producing: bool,
    commands_enabled: bool,
    limit_w: f64,
    efficiency_percent: f64,
    dc_power_w: Vec<f64>,
    dc_voltage_v: Vec<f64>,
    limit_cmd: SimCommand,
    power_cmd: SimCommand,
    last_command_update: Option<Duration>,
}

#[cfg(feature = "sim")]
#[derive(Debug, Clone, Copy)]
struct SimCommand {
    state: CommandState,
    issued: Option<Duration>,
}

#[cfg(feature = "sim")]
impl SimCommand {
    fn idle() -> Self {
        Self { state: CommandState::Success, issued: None }
    }
}

#[cfg(feature = "sim")]
const SIM_COMMAND_LATENCY: Duration = Duration::from_millis(300);

#[cfg(feature = "sim")]
impl SimulatedInverter {
    pub fn new(serial: u64, max_power_w: f64, dc_channels: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            serial,
            max_power_w,
            clock,
            state: parking_lot::RwLock::new(SimInverterState {
                reachable: true,
                producing: false,
                commands_enabled: true,
                limit_w: 0.0,
                efficiency_percent: 0.0,
                dc_power_w: vec![0.0; dc_channels],
                dc_voltage_v: vec![48.0; dc_channels],
                limit_cmd: SimCommand::idle(),
                power_cmd: SimCommand::idle(),
                last_command_update: None,
            }),
        }
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.state.write().reachable = reachable;
    }

    pub fn set_dc_power(&self, channel: usize, watts: f64) {
        let mut st = self.state.write();
        if let Some(p) = st.dc_power_w.get_mut(channel) {
            *p = watts;
        }
    }

    pub fn set_dc_voltage(&self, channel: usize, volts: f64) {
        let mut st = self.state.write();
        if let Some(v) = st.dc_voltage_v.get_mut(channel) {
            *v = volts;
        }
    }

    pub fn limit_w(&self) -> f64 {
        self.resolve_commands();
        self.state.read().limit_w
    }

    /// Resolve in-flight commands whose simulated latency has elapsed.
    fn resolve_commands(&self) {
        let now = self.clock.uptime();
        let mut st = self.state.write();
        let mut resolve = |cmd: &mut SimCommand| -> bool {
            match cmd.issued {
                Some(at) if cmd.state == CommandState::Pending => {
                    if now.saturating_sub(at) >= SIM_COMMAND_LATENCY {
                        cmd.state = CommandState::Success;
                        cmd.issued = None;
                        true
                    } else {
                        false
                    }
                }
                _ => false,
            }
        };
        let limit_done = resolve(&mut st.limit_cmd);
        let power_done = resolve(&mut st.power_cmd);
        if limit_done || power_done {
            st.last_command_update = Some(now);
            if st.producing {
                st.efficiency_percent = 95.0;
            }
        }
    }
}

#[cfg(feature = "sim")]
#[async_trait]
impl Inverter for SimulatedInverter {
    fn serial(&self) -> u64 {
        self.serial
    }

    fn is_reachable(&self) -> bool {
        self.state.read().reachable
    }

    fn is_producing(&self) -> bool {
        self.resolve_commands();
        self.state.read().producing
    }

    fn commands_enabled(&self) -> bool {
        self.state.read().commands_enabled
    }

    fn max_power_w(&self) -> f64 {
        self.max_power_w
    }

    fn channels(&self, ty: ChannelType) -> Vec<usize> {
        match ty {
            ChannelType::Ac => vec![0],
            ChannelType::Dc => (0..self.state.read().dc_power_w.len()).collect(),
        }
    }

    fn channel_value(&self, ty: ChannelType, channel: usize, field: ChannelField) -> f64 {
        let st = self.state.read();
        match (ty, field) {
            (ChannelType::Ac, ChannelField::PowerW) => {
                if st.producing {
                    st.limit_w.min(self.max_power_w)
                } else {
                    0.0
                }
            }
            (ChannelType::Ac, ChannelField::EfficiencyPercent) => st.efficiency_percent,
            (ChannelType::Ac, ChannelField::VoltageV) => 230.0,
            (ChannelType::Dc, ChannelField::PowerW) => {
                st.dc_power_w.get(channel).copied().unwrap_or(0.0)
            }
            (ChannelType::Dc, ChannelField::VoltageV) => {
                st.dc_voltage_v.get(channel).copied().unwrap_or(0.0)
            }
            (ChannelType::Dc, ChannelField::EfficiencyPercent) => 0.0,
        }
    }

    fn last_stats_update(&self) -> Option<Duration> {
        // the simulated radio link delivers statistics continuously
        Some(self.clock.uptime())
    }

    fn last_command_update(&self) -> Option<Duration> {
        self.resolve_commands();
        self.state.read().last_command_update
    }

    fn last_limit_command(&self) -> CommandState {
        self.resolve_commands();
        self.state.read().limit_cmd.state
    }

    fn last_power_command(&self) -> CommandState {
        self.resolve_commands();
        self.state.read().power_cmd.state
    }

    async fn send_power_limit(&self, watts: f64, _persistent: bool) -> Result<()> {
        let now = self.clock.uptime();
        let mut st = self.state.write();
        if !st.reachable {
            return Err(InverterError::Offline.into());
        }
        st.limit_w = watts;
        st.limit_cmd = SimCommand { state: CommandState::Pending, issued: Some(now) };
        Ok(())
    }

    async fn send_power_state(&self, on: bool) -> Result<()> {
        let now = self.clock.uptime();
        let mut st = self.state.write();
        if !st.reachable {
            return Err(InverterError::Offline.into());
        }
        st.producing = on;
        if !on {
            st.efficiency_percent = 0.0;
        }
        st.power_cmd = SimCommand { state: CommandState::Pending, issued: Some(now) };
        Ok(())
    }

    async fn send_restart(&self) -> Result<()> {
        let mut st = self.state.write();
        if !st.reachable {
            return Err(InverterError::Offline.into());
        }
        st.producing = false;
        Ok(())
    }
}

/// Registry over a fixed set of simulated inverters.
#[cfg(feature = "sim")]
#[derive(Default)]
pub struct SimulatedInverterRegistry {
    inverters: Vec<Arc<SimulatedInverter>>,
}

#[cfg(feature = "sim")]
impl SimulatedInverterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, inverter: Arc<SimulatedInverter>) {
        self.inverters.push(inverter);
    }
}

#[cfg(feature = "sim")]
impl InverterRegistry for SimulatedInverterRegistry {
    fn inverter_by_serial(&self, serial: u64) -> Option<Arc<dyn Inverter>> {
        self.inverters
            .iter()
            .find(|inv| inv.serial() == serial)
            .map(|inv| Arc::clone(inv) as Arc<dyn Inverter>)
    }
}

#[cfg(all(test, feature = "sim"))]
mod tests {
    use super::*;
    use crate::domain::clock::ManualClock;

    fn sim() -> (Arc<ManualClock>, SimulatedInverter) {
        let clock = Arc::new(ManualClock::new());
        let inverter = SimulatedInverter::new(1, 800.0, 2, clock.clone());
        (clock, inverter)
    }

    #[tokio::test]
    async fn limit_command_completes_after_latency() {
        let (clock, inverter) = sim();
        inverter.send_power_limit(400.0, false).await.unwrap();
        assert_eq!(inverter.last_limit_command(), CommandState::Pending);

        clock.advance(SIM_COMMAND_LATENCY);
        assert_eq!(inverter.last_limit_command(), CommandState::Success);
        assert_eq!(inverter.last_command_update(), Some(clock.uptime()));
    }

    #[tokio::test]
    async fn unreachable_inverter_rejects_commands() {
        let (_clock, inverter) = sim();
        inverter.set_reachable(false);
        assert!(inverter.send_power_state(true).await.is_err());
    }

    #[tokio::test]
    async fn registry_resolves_by_serial() {
        let clock = Arc::new(ManualClock::new());
        let mut registry = SimulatedInverterRegistry::new();
        registry.register(Arc::new(SimulatedInverter::new(7, 600.0, 2, clock)));
        assert!(registry.inverter_by_serial(7).is_some());
        assert!(registry.inverter_by_serial(8).is_none());
    }
}
