use chrono::{Datelike, Local, NaiveDateTime};
use std::time::{Duration, Instant};

/// Time source for the control loop.
///
/// Deadlines are expressed as [`Duration`] offsets from a monotonic uptime,
/// so they cannot misbehave on counter wraparound. Wall-clock time is only
/// needed by the restart scheduler and may be unavailable until the system
/// clock has been synchronized.
pub trait Clock: Send + Sync {
    /// Monotonic time since the process (or controller) started.
    fn uptime(&self) -> Duration;

    /// Local wall-clock time, `None` while the system clock is not yet valid.
    fn local_time(&self) -> Option<NaiveDateTime>;
}

/// Clock backed by [`Instant`] and the OS wall clock.
#[derive(Debug)]
pub struct SystemClock {
    started: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self { started: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    fn local_time(&self) -> Option<NaiveDateTime> {
        let now = Local::now().naive_local();
        // an unsynchronized clock sits in the distant past
        (now.year() >= 2020).then_some(now)
    }
}

/// Manually advanced clock for tests and the simulator.
#[derive(Debug, Default)]
pub struct ManualClock {
    inner: parking_lot::Mutex<ManualClockState>,
}

#[derive(Debug, Default)]
struct ManualClockState {
    uptime: Duration,
    wall: Option<NaiveDateTime>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        let mut st = self.inner.lock();
        st.uptime += by;
        if let Some(wall) = st.wall {
            st.wall = Some(wall + by);
        }
    }

    pub fn set_wall(&self, wall: NaiveDateTime) {
        self.inner.lock().wall = Some(wall);
    }

    pub fn clear_wall(&self) {
        self.inner.lock().wall = None;
    }
}

impl Clock for ManualClock {
    fn uptime(&self) -> Duration {
        self.inner.lock().uptime
    }

    fn local_time(&self) -> Option<NaiveDateTime> {
        self.inner.lock().wall
    }
}
