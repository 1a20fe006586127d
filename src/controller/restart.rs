//! Scheduled daily inverter restart.
//!
//! Some inverters accumulate a yield offset over long uninterrupted runs; a
//! daily restart at a configured local hour clears it. The schedule is kept
//! as an uptime-relative instant so it survives wall-clock adjustments.

use chrono::Timelike;
use std::time::Duration;

use crate::config::DplConfig;
use crate::controller::{ControlState, PowerLimiter};

/// How often the scheduler re-checks for a pending restart window.
pub(crate) const RESTART_RECHECK: Duration = Duration::from_secs(5);

/// When (if ever) the next scheduled restart fires, in uptime terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RestartSchedule {
    /// Not yet computed, typically because local time is not valid yet.
    #[default]
    Unknown,
    /// Restarts are disabled by configuration.
    Disabled,
    /// Restart when uptime reaches this instant.
    At(Duration),
}

impl PowerLimiter {
    /// Recompute the uptime at which the next scheduled restart is due.
    pub(crate) fn recompute_restart(&self, st: &mut ControlState, cfg: &DplConfig) {
        if cfg.restart_hour < 0 {
            st.restart = RestartSchedule::Disabled;
            return;
        }

        let Some(now) = self.clock.local_time() else {
            // keep whatever we had; retried once local time is valid
            return;
        };

        let target_minute = i64::from(cfg.restart_hour) * 60;
        let current_minute = i64::from(now.hour()) * 60 + i64::from(now.minute());
        let mut minutes_to_restart = target_minute - current_minute;
        if minutes_to_restart <= 0 {
            minutes_to_restart += 24 * 60;
        }

        let due = self.clock.uptime() + Duration::from_secs(minutes_to_restart as u64 * 60);
        st.restart = RestartSchedule::At(due);
        tracing::info!(
            restart_hour = cfg.restart_hour,
            minutes_to_restart,
            "scheduled next inverter restart"
        );
    }
}
