use std::time::Duration;

use serde::Deserialize;
use tokio::time::Instant;

use crate::{
    axis::{state::AxisState, state_info::AxisStateInfo},
    error::LinkamError,
};

/// `ErrorMsg` value of a healthy instrument.
pub const HEALTHY: &str = "No_error";

#[derive(Debug, Clone, PartialEq)]
pub struct InstrumentFlags {
    pub idle: bool,
    pub error_message: String,
    pub program: String,
}

impl InstrumentFlags {
    pub fn healthy(idle: bool, program: &str) -> Self {
        Self {
            idle,
            error_message: HEALTHY.to_string(),
            program: program.to_string(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.error_message == HEALTHY
    }
}

/// Heuristic bound on how long a ramp may take before it is reported as an
/// alarm: `multiplier * expected + startup_margin`, where `expected` is the
/// distance divided by the rate. It absorbs the instrument's start-up lag and
/// the slow approach near the target; it is not a physical guarantee.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DeadlinePolicy {
    pub multiplier: f64,
    pub startup_margin_secs: f64,
}

impl Default for DeadlinePolicy {
    fn default() -> Self {
        Self {
            multiplier: 2.0,
            startup_margin_secs: 30.0,
        }
    }
}

impl DeadlinePolicy {
    pub fn expected_duration(distance: f64, rate_per_minute: f64) -> anyhow::Result<Duration> {
        if !(rate_per_minute.is_finite() && rate_per_minute > 0.0) {
            return Err(LinkamError::InvalidValue {
                parameter: "velocity".to_string(),
                value: rate_per_minute,
                reason: "ramp rate must be a positive number of degrees per minute".to_string(),
            }
            .into());
        }
        seconds(distance.abs() / rate_per_minute * 60.0, "distance", distance)
    }

    pub fn allowance(&self, distance: f64, rate_per_minute: f64) -> anyhow::Result<Duration> {
        let expected = Self::expected_duration(distance, rate_per_minute)?;
        let total = expected.as_secs_f64() * self.multiplier + self.startup_margin_secs;
        seconds(total, "deadline", total)
    }

    pub fn deadline(
        &self,
        now: Instant,
        distance: f64,
        rate_per_minute: f64,
    ) -> anyhow::Result<Instant> {
        let allowance = self.allowance(distance, rate_per_minute)?;
        now.checked_add(allowance).ok_or_else(|| {
            LinkamError::InvalidValue {
                parameter: "deadline".to_string(),
                value: allowance.as_secs_f64(),
                reason: "ramp deadline is out of range".to_string(),
            }
            .into()
        })
    }
}

fn seconds(secs: f64, parameter: &str, value: f64) -> anyhow::Result<Duration> {
    Duration::try_from_secs_f64(secs).map_err(|e| {
        LinkamError::InvalidValue {
            parameter: parameter.to_string(),
            value,
            reason: e.to_string(),
        }
        .into()
    })
}

/// Ramp bookkeeping for one temperature axis.
///
/// `target_temperature` is set exactly while a commanded ramp has neither
/// settled nor been aborted, and `move_deadline` is `None` exactly when no
/// ramp is being timed.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AxisRampState {
    target_temperature: Option<f64>,
    current_temperature: Option<f64>,
    tolerance: f64,
    move_deadline: Option<Instant>,
}

impl AxisRampState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn target_temperature(&self) -> Option<f64> {
        self.target_temperature
    }

    pub fn current_temperature(&self) -> Option<f64> {
        self.current_temperature
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    pub fn move_deadline(&self) -> Option<Instant> {
        self.move_deadline
    }

    pub fn is_ramping(&self) -> bool {
        self.target_temperature.is_some()
    }

    /// Zero disables the tolerance check.
    pub fn set_tolerance(&mut self, tolerance: f64) -> anyhow::Result<()> {
        if !(tolerance.is_finite() && tolerance >= 0.0) {
            return Err(LinkamError::InvalidValue {
                parameter: "tolerance".to_string(),
                value: tolerance,
                reason: "tolerance must be zero or positive".to_string(),
            }
            .into());
        }
        self.tolerance = tolerance;
        Ok(())
    }

    pub fn record_temperature(&mut self, temperature: f64) {
        self.current_temperature = Some(temperature);
    }

    /// Starts timing a ramp from `current` to `target`. Nothing from a previous
    /// ramp survives, and nothing changes if the deadline cannot be computed.
    pub fn begin(
        &mut self,
        target: f64,
        current: f64,
        rate_per_minute: f64,
        policy: &DeadlinePolicy,
        now: Instant,
    ) -> anyhow::Result<()> {
        let deadline = policy.deadline(now, target - current, rate_per_minute)?;
        self.target_temperature = Some(target);
        self.current_temperature = Some(current);
        self.move_deadline = Some(deadline);
        Ok(())
    }

    pub fn clear(&mut self) {
        self.target_temperature = None;
        self.move_deadline = None;
    }

    /// Infers the axis state from one poll of the instrument.
    ///
    /// An exceeded deadline is reported as an alarm on every poll until the
    /// ramp is restarted or aborted, whatever the idle flag says.
    pub fn evaluate(&mut self, flags: &InstrumentFlags, now: Instant) -> AxisStateInfo {
        if !flags.is_healthy() {
            return AxisStateInfo::new(AxisState::Fault).with_message(flags.program.clone());
        }

        if matches!(self.move_deadline, Some(deadline) if now >= deadline) {
            return AxisStateInfo::deadline_exceeded();
        }

        if !flags.idle {
            return AxisStateInfo::new(AxisState::Moving).with_message(flags.program.clone());
        }

        if self.tolerance > 0.0 {
            if let (Some(target), Some(current)) =
                (self.target_temperature, self.current_temperature)
            {
                if (target - current).abs() > self.tolerance {
                    return AxisStateInfo::new(AxisState::Moving)
                        .with_message(flags.program.clone());
                }
            }
        }

        self.clear();
        AxisStateInfo::new(AxisState::On).with_message(flags.program.clone())
    }
}
