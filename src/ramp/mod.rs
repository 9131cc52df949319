pub mod calibration;
pub mod config;
pub mod driver;
pub mod tracker;

pub use calibration::{CalibrationCache, CalibrationTable};
pub use config::{CacheConfig, RampConfig};
pub use driver::{ActiveRamp, RampDirection, RampDriver, RampProgress, RampRequest};
pub use tracker::{AxisRampState, DeadlinePolicy, InstrumentFlags};
