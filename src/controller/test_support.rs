//! Shared fixtures for controller tests.

use chrono::NaiveDate;
use parking_lot::RwLock;
use std::sync::Arc;

use crate::config::DplConfig;
use crate::controller::{Collaborators, PowerLimiter};
use crate::domain::{
    ManualClock, MockBattery, MockDcPsuCharger, MockInverterRegistry, MockPowerMeter,
    MockSolarChargeController,
};

/// Collaborator mocks handed to [`limiter_with`]. Configure expectations on
/// the mocks before constructing the limiter; anything left unconfigured
/// panics when touched, which keeps each test honest about what it exercises.
pub(crate) struct TestDeps {
    pub clock: Arc<ManualClock>,
    pub registry: MockInverterRegistry,
    pub meter: MockPowerMeter,
    pub battery: MockBattery,
    pub solar: MockSolarChargeController,
    pub psu: MockDcPsuCharger,
}

impl Default for TestDeps {
    fn default() -> Self {
        let clock = Arc::new(ManualClock::new());
        // wall-clock validity is a hard precondition of the loop
        clock.set_wall(
            NaiveDate::from_ymd_opt(2024, 6, 1)
                .and_then(|d| d.and_hms_opt(12, 0, 0))
                .expect("valid date"),
        );
        Self {
            clock,
            registry: MockInverterRegistry::new(),
            meter: MockPowerMeter::new(),
            battery: MockBattery::new(),
            solar: MockSolarChargeController::new(),
            psu: MockDcPsuCharger::new(),
        }
    }
}

/// Retained handles into the collaborators after the limiter took ownership.
pub(crate) struct Handles {
    pub clock: Arc<ManualClock>,
}

pub(crate) fn limiter_with(cfg: DplConfig, deps: TestDeps) -> (PowerLimiter, Handles) {
    let handles = Handles { clock: Arc::clone(&deps.clock) };
    let limiter = PowerLimiter::new(
        Arc::new(RwLock::new(cfg)),
        Collaborators {
            inverters: Arc::new(deps.registry),
            meter: Arc::new(deps.meter),
            battery: Arc::new(deps.battery),
            solar: Arc::new(deps.solar),
            psu: Arc::new(deps.psu),
            clock: deps.clock,
        },
    );
    (limiter, handles)
}
