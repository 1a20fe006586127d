pub mod clock;
pub mod inverter;
pub mod sensors;

pub use clock::*;
pub use inverter::*;
pub use sensors::*;
