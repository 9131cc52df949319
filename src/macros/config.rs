use serde::Deserialize;

use crate::ramp::config::{CacheConfig, RampConfig};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MacroConfig {
    pub device_name: String,
    pub ramp: RampConfig,
    pub calibration_cache: CacheConfig,
}

impl Default for MacroConfig {
    fn default() -> Self {
        Self {
            device_name: "linkam/tst350/1".to_string(),
            ramp: RampConfig::default(),
            calibration_cache: CacheConfig::default(),
        }
    }
}
