use std::time::Duration;
use strum::EnumIter;
use tracing::info;

/// Reason the control loop did (or did not) act this tick.
///
/// Purely observational: the loop never branches on a previous status, it
/// only suppresses duplicate announcements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter)]
pub enum Status {
    Initializing,
    DisabledByConfig,
    DisabledByMode,
    WaitingForValidTimestamp,
    PowerMeterDisabled,
    PowerMeterTimeout,
    PowerMeterPending,
    InverterInvalid,
    InverterChanged,
    InverterOffline,
    InverterCommandsDisabled,
    InverterLimitPending,
    InverterPowerCmdPending,
    InverterDevInfoPending,
    InverterStatsPending,
    UnconditionalSolarPassthrough,
    SolarTelemetryInvalid,
    Settling,
    Stable,
}

impl Status {
    pub fn text(self) -> &'static str {
        match self {
            Status::Initializing => "initializing (should not see me)",
            Status::DisabledByConfig => "disabled by configuration",
            Status::DisabledByMode => "disabled by operating mode",
            Status::WaitingForValidTimestamp => {
                "waiting for valid date and time to be available"
            }
            Status::PowerMeterDisabled => "no power meter is configured/enabled",
            Status::PowerMeterTimeout => "power meter readings are outdated",
            Status::PowerMeterPending => {
                "waiting for sufficiently recent power meter reading"
            }
            Status::InverterInvalid => "invalid inverter selection/configuration",
            Status::InverterChanged => "target inverter changed",
            Status::InverterOffline => "inverter is offline (polling enabled? radio okay?)",
            Status::InverterCommandsDisabled => {
                "inverter configuration prohibits sending commands"
            }
            Status::InverterLimitPending => "waiting for a power limit command to complete",
            Status::InverterPowerCmdPending => {
                "waiting for a start/stop/restart command to complete"
            }
            Status::InverterDevInfoPending => {
                "waiting for inverter device information to be available"
            }
            Status::InverterStatsPending => "waiting for sufficiently recent inverter data",
            Status::UnconditionalSolarPassthrough => {
                "unconditionally passing through all solar power (mode override)"
            }
            Status::SolarTelemetryInvalid => {
                "solar charger disabled, connection broken, or data outdated"
            }
            Status::Settling => "waiting for the system to settle",
            Status::Stable => "the system is stable, the last power limit is still valid",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.text())
    }
}

/// Repeat interval for announcing an unchanged status.
const REPEAT_INTERVAL: Duration = Duration::from_secs(10);

/// Logs status changes immediately and unchanged statuses at most every 10 s.
/// `DisabledByConfig` is announced once and then stays silent.
#[derive(Debug, Default)]
pub(crate) struct StatusAnnouncer {
    last: Option<Status>,
    last_printed: Option<Duration>,
}

impl StatusAnnouncer {
    pub(crate) fn announce(&mut self, status: Status, uptime: Duration) {
        if self.last == Some(status) {
            if status == Status::DisabledByConfig {
                return;
            }
            if let Some(printed) = self.last_printed {
                if uptime < printed + REPEAT_INTERVAL {
                    return;
                }
            }
        }

        info!(uptime_s = uptime.as_secs_f64(), status = ?status, "{}", status.text());

        self.last = Some(status);
        self.last_printed = Some(uptime);
    }

    pub(crate) fn last(&self) -> Option<Status> {
        self.last
    }

    /// True if a call to [`announce`] with this status at this uptime would
    /// actually log. Used by tests; the announcer itself stays message-free.
    #[cfg(test)]
    fn would_log(&self, status: Status, uptime: Duration) -> bool {
        if self.last != Some(status) {
            return true;
        }
        if status == Status::DisabledByConfig {
            return false;
        }
        match self.last_printed {
            Some(printed) => uptime >= printed + REPEAT_INTERVAL,
            None => true,
        }
    }
}
