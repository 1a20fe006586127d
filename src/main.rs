use anyhow::Result;
use dynamic_power_limiter::{config, telemetry};
use config::Config;
use telemetry::init_tracing;
#[cfg(feature = "sim")]
use tracing::info;

#[cfg(feature = "sim")]
mod sim_world {
    use chrono::Timelike;
    use dynamic_power_limiter::config::Config;
    use dynamic_power_limiter::controller::{Collaborators, PowerLimiter};
    use dynamic_power_limiter::domain::{
        Clock, SimulatedBattery, SimulatedInverter, SimulatedInverterRegistry, SimulatedPowerMeter,
        SimulatedPsuCharger, SimulatedSolarCharger, SystemClock,
    };
    use std::sync::Arc;
    use std::time::Duration;
    use tracing::info;

    /// Build a simulated plant and the limiter wired to it, and spawn a
    /// background task that keeps the plant's telemetry alive.
    pub fn build(cfg: &Config) -> Arc<PowerLimiter> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());

        let inverter = Arc::new(SimulatedInverter::new(
            cfg.power_limiter.inverter_serial,
            cfg.power_limiter.upper_power_limit_w as f64,
            2,
            Arc::clone(&clock),
        ));
        let mut registry = SimulatedInverterRegistry::new();
        registry.register(Arc::clone(&inverter));

        let meter = Arc::new(SimulatedPowerMeter::new(Arc::clone(&clock)));
        let battery = Arc::new(SimulatedBattery::new(Arc::clone(&clock)));
        let solar = Arc::new(SimulatedSolarCharger::new());
        let psu = Arc::new(SimulatedPsuCharger::new());

        battery.set_soc(75.0);
        solar.set_output(48.0, 6.0, 320.0);
        meter.set_power_w(400.0);

        let limiter = Arc::new(PowerLimiter::new(
            Arc::new(parking_lot::RwLock::new(cfg.power_limiter.clone())),
            Collaborators {
                inverters: Arc::new(registry),
                meter: Arc::clone(&meter) as _,
                battery: Arc::clone(&battery) as _,
                solar: Arc::clone(&solar) as _,
                psu: Arc::clone(&psu) as _,
                clock: Arc::clone(&clock),
            },
        ));

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(2));
            loop {
                interval.tick().await;
                let hour = clock
                    .local_time()
                    .map(|t| t.hour())
                    .unwrap_or(12);
                meter.simulate_household(hour);
                battery.set_soc(75.0);
                info!(limit_w = inverter.limit_w(), "simulated plant heartbeat");
            }
        });

        limiter
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cfg = Config::load()?;

    if !cfg.power_limiter.enabled {
        tracing::warn!("power limiter is disabled by configuration; running idle");
    }

    #[cfg(not(feature = "sim"))]
    anyhow::bail!("no hardware backend compiled in; enable the `sim` feature");

    #[cfg(feature = "sim")]
    {
        info!(
            serial = cfg.power_limiter.inverter_serial,
            tick_ms = cfg.controller.tick_ms,
            "starting dynamic power limiter (simulated plant)"
        );

        let limiter = sim_world::build(&cfg);
        limiter.calc_next_inverter_restart().await;

        let tick = std::time::Duration::from_millis(cfg.controller.tick_ms);
        let loop_handle = tokio::spawn(limiter.run(tick));

        tokio::select! {
            res = loop_handle => {
                res??;
            }
            _ = telemetry::shutdown_signal() => {
                info!("shutdown requested");
            }
        }

        Ok(())
    }
}
