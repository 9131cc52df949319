use serde::Deserialize;

use crate::ramp::tracker::DeadlinePolicy;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub name: String,
    pub device_name: String,
    pub deadline: DeadlinePolicy,
    /// Multiplier from axis velocity (deg/min) to the start-ramp rate unit.
    pub rate_factor: f64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            name: "linkam_ctrl".to_string(),
            device_name: "linkam/tst350/1".to_string(),
            deadline: DeadlinePolicy::default(),
            rate_factor: 60.0,
        }
    }
}
