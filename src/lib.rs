pub mod config;
pub mod controller;
pub mod domain;
pub mod telemetry;

pub use config::Config;
pub use controller::{Mode, PowerLimiter, PowerLimiterState, Status};
