use serde::{Deserialize, Serialize};

use crate::error::LinkamError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AxisParameter {
    Velocity,
    Acceleration,
    Deceleration,
    StepPerUnit,
    BaseRate,
    Tolerance,
}

impl AxisParameter {
    pub const ALL: [AxisParameter; 6] = [
        AxisParameter::Velocity,
        AxisParameter::Acceleration,
        AxisParameter::Deceleration,
        AxisParameter::StepPerUnit,
        AxisParameter::BaseRate,
        AxisParameter::Tolerance,
    ];

    /// Case-insensitive lookup; `None` for names no axis knows.
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.to_ascii_lowercase();
        Self::ALL.into_iter().find(|p| p.as_str() == name)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AxisParameter::Velocity => "velocity",
            AxisParameter::Acceleration => "acceleration",
            AxisParameter::Deceleration => "deceleration",
            AxisParameter::StepPerUnit => "step_per_unit",
            AxisParameter::BaseRate => "base_rate",
            AxisParameter::Tolerance => "tolerance",
        }
    }
}

impl std::fmt::Display for AxisParameter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisParameters {
    pub velocity: f64,
    /// Shared by acceleration and deceleration; no physical effect.
    pub acceleration: f64,
    pub step_per_unit: f64,
    pub base_rate: f64,
}

impl AxisParameters {
    pub fn new() -> Self {
        Self {
            velocity: 1.0,
            acceleration: 0.0,
            step_per_unit: 1.0,
            base_rate: 0.0,
        }
    }
}

impl Default for AxisParameters {
    fn default() -> Self {
        Self::new()
    }
}

pub fn require_positive(parameter: AxisParameter, value: f64) -> anyhow::Result<f64> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(LinkamError::InvalidValue {
            parameter: parameter.to_string(),
            value,
            reason: "must be a positive number".to_string(),
        }
        .into())
    }
}

pub fn require_non_zero(parameter: AxisParameter, value: f64) -> anyhow::Result<f64> {
    if value.is_finite() && value != 0.0 {
        Ok(value)
    } else {
        Err(LinkamError::InvalidValue {
            parameter: parameter.to_string(),
            value,
            reason: "must be a non-zero number".to_string(),
        }
        .into())
    }
}
