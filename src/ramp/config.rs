use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RampConfig {
    pub poll_interval_ms: u64,
    pub temperature_attribute: String,
    pub pump_speed_attribute: String,
    pub start_command: String,
    pub hold_command: String,
    /// Fail requests whose target equals the current temperature instead of
    /// completing them immediately.
    pub reject_degenerate: bool,
}

impl RampConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for RampConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            temperature_attribute: "Temperature".to_string(),
            pump_speed_attribute: "Pumpspeed".to_string(),
            start_command: "StartRamp".to_string(),
            hold_command: "HoldTemp".to_string(),
            reject_degenerate: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    pub capacity: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            capacity: 16,
        }
    }
}
