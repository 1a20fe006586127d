//! Hysteresis and command pacing toward the inverter.
//!
//! Every desired limit passes through here; the governor decides whether a
//! command is actually transmitted and enforces the upper bound, the
//! device's rated power and the per-channel scaling correction.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::DplConfig;
use crate::controller::{ControlState, PowerLimiter};
use crate::domain::{ChannelField, ChannelType, Inverter};

/// Re-send the limit when the last commit is older than this, so a dropped
/// command cannot leave the hardware on a stale limit indefinitely.
const LIMIT_REFRESH_AGE: Duration = Duration::from_secs(60);

/// DC inputs above this are counted as producing channels.
const PRODUCING_CHANNEL_MIN_W: f64 = 2.0;

/// Clamp `desired_w` to the configured upper limit and the device's rated
/// power, scaling by total/producing channels in between. The inverter
/// divides its limit evenly across DC inputs, so with shaded channels the
/// request must be scaled up for the total output to match.
pub(crate) fn effective_limit(
    desired_w: i32,
    upper_limit_w: i32,
    max_power_w: i32,
    total_channels: usize,
    producing_channels: usize,
) -> i32 {
    let mut limit = desired_w.min(upper_limit_w);

    if producing_channels > 0 && producing_channels != total_channels {
        limit = (limit as f64 * total_channels as f64 / producing_channels as f64).round() as i32;
    }

    limit.min(max_power_w)
}

impl PowerLimiter {
    /// Sanitize and maybe commit a new power limit. Returns whether a limit
    /// update was committed.
    pub(crate) async fn set_new_power_limit(
        &self,
        st: &mut ControlState,
        inverter: &Arc<dyn Inverter>,
        desired_w: i32,
        cfg: &DplConfig,
    ) -> Result<bool> {
        // stop the inverter entirely when the limit falls below the lower
        // bound; the status is communicated through the shutdown path
        if desired_w < cfg.lower_power_limit_w {
            return self.shutdown(st, cfg).await;
        }

        let dc_channels = inverter.channels(ChannelType::Dc);
        let producing = dc_channels
            .iter()
            .filter(|&&ch| {
                inverter.channel_value(ChannelType::Dc, ch, ChannelField::PowerW)
                    > PRODUCING_CHANNEL_MIN_W
            })
            .count();

        if producing > 0 && producing != dc_channels.len() {
            info!(
                total = dc_channels.len(),
                producing, "scaling power limit for partially producing channels"
            );
        }

        let effective_w = effective_limit(
            desired_w,
            cfg.upper_power_limit_w,
            inverter.max_power_w() as i32,
            dc_channels.len(),
            producing,
        );

        let diff = (effective_w - st.last_requested_limit_w).abs();
        let hysteresis = cfg.target_power_consumption_hysteresis_w;

        let uptime = self.clock.uptime();
        let stale = st
            .last_limit_commit
            .map_or(true, |at| uptime.saturating_sub(at) >= LIMIT_REFRESH_AGE);

        if diff < hysteresis && !stale {
            debug!(
                desired_w,
                last_requested_w = st.last_requested_limit_w,
                diff,
                hysteresis,
                "within hysteresis, keeping last limit"
            );
            return Ok(false);
        }

        debug!(desired_w, effective_w, "(re-)sending power limit");
        self.commit_power_limit(st, inverter, effective_w, true).await?;
        Ok(true)
    }

    /// Transmit a limit, ordering the power-state change so an older,
    /// greater limit can never cause an output spike: stop before the limit
    /// update, start only after it.
    pub(crate) async fn commit_power_limit(
        &self,
        st: &mut ControlState,
        inverter: &Arc<dyn Inverter>,
        limit_w: i32,
        enable_production: bool,
    ) -> Result<()> {
        if !enable_production && inverter.is_producing() {
            info!("stopping inverter");
            inverter.send_power_state(false).await?;
        }

        inverter.send_power_limit(limit_w as f64, false).await?;

        st.last_requested_limit_w = limit_w;
        st.last_limit_commit = Some(self.clock.uptime());

        if enable_production && !inverter.is_producing() {
            info!("starting inverter");
            inverter.send_power_state(true).await?;
        }

        Ok(())
    }
}
