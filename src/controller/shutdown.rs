//! Graceful inverter shutdown.
//!
//! Re-entered from any precondition failure; retries every tick until the
//! inverter is known to be off or the shutdown budget expires. This is the
//! single bounded, explicitly timed-out failure path in the controller.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

use crate::config::DplConfig;
use crate::controller::{ControlState, PowerLimiter, Status};
use crate::domain::CommandState;

/// Maximum time spent trying to shut an inverter down before it is forcibly
/// treated as off.
const SHUTDOWN_BUDGET: Duration = Duration::from_secs(10);

impl PowerLimiter {
    /// Announce `status`, then advance the shutdown sequence.
    pub(crate) async fn shutdown_with(
        &self,
        st: &mut ControlState,
        cfg: &DplConfig,
        status: Status,
    ) -> Result<bool> {
        st.announcer.announce(status, self.clock.uptime());
        self.shutdown(st, cfg).await
    }

    /// Advance the shutdown sequence by one step.
    ///
    /// Returns `true` while the inverter state is still changing or about to
    /// change, `false` once it is (assumed to be) shut down.
    pub(crate) async fn shutdown(&self, st: &mut ControlState, cfg: &DplConfig) -> Result<bool> {
        let uptime = self.clock.uptime();
        let budget_expired = st.shutdown_deadline.is_some_and(|deadline| deadline < uptime);

        let inverter = match &st.inverter {
            Some(inverter) if inverter.is_producing() && !budget_expired => Arc::clone(inverter),
            _ => {
                // already done, or the attempt timed out: release the handle
                st.inverter = None;
                st.shutdown_deadline = None;
                return Ok(false);
            }
        };

        if st.shutdown_deadline.is_none() {
            st.shutdown_deadline = Some(uptime + SHUTDOWN_BUDGET);
        }

        if !inverter.is_reachable() {
            // retry next tick, until the budget expires
            return Ok(true);
        }

        // wait for any in-flight command to finish; polled, never blocked on
        if inverter.last_limit_command() == CommandState::Pending
            || inverter.last_power_command() == CommandState::Pending
        {
            return Ok(true);
        }

        self.commit_power_limit(st, &inverter, cfg.lower_power_limit_w, false)
            .await?;

        Ok(true)
    }
}
