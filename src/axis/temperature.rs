use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::{
    parameters::{require_non_zero, require_positive, AxisParameter, AxisParameters},
    state::AxisState,
    state_info::AxisStateInfo,
    AxisDriver, AxisRole,
};
use crate::{
    device::{value::Value, DeviceProxy},
    ramp::tracker::{AxisRampState, DeadlinePolicy, InstrumentFlags},
};

const TEMPERATURE: &str = "Temperature";
const IDLE: &str = "IdleT";
const ERROR_MESSAGE: &str = "ErrorMsg";
const PROGRAM: &str = "Program";
const START_RAMP: &str = "StartRamp";
const HOLD: &str = "HoldTemp";

#[derive(Debug, Clone, PartialEq)]
pub struct RampedTemperatureAxis {
    axis: u32,
    params: AxisParameters,
    ramp: AxisRampState,
    policy: DeadlinePolicy,
    rate_factor: f64,
}

impl RampedTemperatureAxis {
    /// `rate_factor` converts the axis velocity (deg/min) into the rate unit
    /// the start command expects.
    pub fn new(axis: u32, policy: DeadlinePolicy, rate_factor: f64) -> Self {
        Self {
            axis,
            params: AxisParameters::default(),
            ramp: AxisRampState::new(),
            policy,
            rate_factor,
        }
    }

    pub fn params(&self) -> &AxisParameters {
        &self.params
    }

    pub fn ramp(&self) -> &AxisRampState {
        &self.ramp
    }

    async fn read_flags(device: &dyn DeviceProxy) -> anyhow::Result<InstrumentFlags> {
        Ok(InstrumentFlags {
            idle: device.read_bool(IDLE).await?,
            error_message: device.read_string(ERROR_MESSAGE).await?,
            program: device.read_string(PROGRAM).await?,
        })
    }
}

#[async_trait::async_trait]
impl AxisDriver for RampedTemperatureAxis {
    fn axis(&self) -> u32 {
        self.axis
    }

    fn role(&self) -> AxisRole {
        AxisRole::Temperature
    }

    async fn read_state(&mut self, device: &dyn DeviceProxy) -> anyhow::Result<AxisStateInfo> {
        let flags = match Self::read_flags(device).await {
            Ok(flags) => flags,
            Err(e) => {
                error!("Axis {} state read failed: {:#}", self.axis, e);
                return Ok(AxisStateInfo::communication_fault());
            }
        };

        let was_ramping = self.ramp.is_ramping();
        let info = self.ramp.evaluate(&flags, Instant::now());
        match info.state {
            AxisState::Alarm => warn!(
                "Axis {} missed its deadline towards {:?}",
                self.axis,
                self.ramp.target_temperature()
            ),
            AxisState::On if was_ramping => debug!("Axis {} settled", self.axis),
            _ => {}
        }
        Ok(info)
    }

    async fn read_position(&mut self, device: &dyn DeviceProxy) -> anyhow::Result<f64> {
        let raw = device.read_f64(TEMPERATURE).await?;
        let temperature = raw / self.params.step_per_unit;
        self.ramp.record_temperature(temperature);
        Ok(temperature)
    }

    async fn start_move(&mut self, device: &dyn DeviceProxy, target: f64) -> anyhow::Result<()> {
        let current = self.read_position(device).await?;
        let velocity = self.params.velocity;
        // validate before anything reaches the device
        self.policy.allowance(target - current, velocity)?;

        device
            .command(
                START_RAMP,
                vec![
                    Value::Float(velocity * self.rate_factor),
                    Value::Float(target * self.params.step_per_unit),
                ],
            )
            .await?;
        self.ramp
            .begin(target, current, velocity, &self.policy, Instant::now())?;

        info!(
            "Axis {} ramping {:.2} -> {:.2} at {} deg/min",
            self.axis, current, target, velocity
        );
        Ok(())
    }

    async fn abort(&mut self, device: &dyn DeviceProxy) -> anyhow::Result<()> {
        device.command(HOLD, Vec::new()).await?;
        self.ramp.clear();
        info!("Axis {} holding temperature", self.axis);
        Ok(())
    }

    async fn get_parameter(
        &self,
        _device: &dyn DeviceProxy,
        parameter: AxisParameter,
    ) -> anyhow::Result<f64> {
        Ok(match parameter {
            AxisParameter::Velocity => self.params.velocity,
            AxisParameter::Acceleration | AxisParameter::Deceleration => self.params.acceleration,
            AxisParameter::StepPerUnit => self.params.step_per_unit,
            AxisParameter::BaseRate => self.params.base_rate,
            AxisParameter::Tolerance => self.ramp.tolerance(),
        })
    }

    async fn set_parameter(
        &mut self,
        _device: &dyn DeviceProxy,
        parameter: AxisParameter,
        value: f64,
    ) -> anyhow::Result<()> {
        match parameter {
            AxisParameter::Velocity => {
                self.params.velocity = require_positive(parameter, value)?;
            }
            AxisParameter::Acceleration | AxisParameter::Deceleration => {
                self.params.acceleration = value;
            }
            AxisParameter::StepPerUnit => {
                self.params.step_per_unit = require_non_zero(parameter, value)?;
            }
            AxisParameter::BaseRate => {
                self.params.base_rate = value;
            }
            AxisParameter::Tolerance => {
                self.ramp.set_tolerance(value)?;
            }
        }
        debug!("Axis {} {} set to {}", self.axis, parameter, value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{device::sim::SimulatedDevice, error::LinkamError};
    use std::time::Duration;

    fn axis() -> RampedTemperatureAxis {
        RampedTemperatureAxis::new(1, DeadlinePolicy::default(), 60.0)
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_move_commands_ramp_and_times_it() {
        let device = SimulatedDevice::tst350("sim", 20.0);
        let mut axis = axis();
        axis.set_parameter(&device, AxisParameter::Velocity, 10.0)
            .await
            .unwrap();

        axis.start_move(&device, 70.0).await.unwrap();

        assert_eq!(
            device.commands("StartRamp").await,
            vec![vec![Value::Float(600.0), Value::Float(70.0)]]
        );
        assert_eq!(axis.ramp().target_temperature(), Some(70.0));
        // 50 degrees at 10 deg/min is 300 s
        let deadline = axis.ramp().move_deadline().unwrap();
        assert_eq!(deadline - Instant::now(), Duration::from_secs(630));
    }

    #[tokio::test]
    async fn test_step_per_unit_scales_position_and_target() {
        let device = SimulatedDevice::tst350("sim", 50.0);
        let mut axis = axis();
        axis.set_parameter(&device, AxisParameter::StepPerUnit, 2.0)
            .await
            .unwrap();

        assert_eq!(axis.read_position(&device).await.unwrap(), 25.0);
        axis.start_move(&device, 30.0).await.unwrap();
        assert_eq!(
            device.commands("StartRamp").await[0][1],
            Value::Float(60.0)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_follows_ramp_to_settled() {
        let device = SimulatedDevice::tst350("sim", 20.0);
        let mut axis = axis();
        axis.set_parameter(&device, AxisParameter::Tolerance, 0.5)
            .await
            .unwrap();
        axis.start_move(&device, 40.0).await.unwrap();

        assert_eq!(axis.read_state(&device).await.unwrap().state, AxisState::Moving);

        // idle but not yet within tolerance
        device.set_attribute("IdleT", Value::Bool(true)).await;
        device.set_attribute("Temperature", Value::Float(38.0)).await;
        axis.read_position(&device).await.unwrap();
        assert_eq!(axis.read_state(&device).await.unwrap().state, AxisState::Moving);

        device.set_attribute("Temperature", Value::Float(39.7)).await;
        axis.read_position(&device).await.unwrap();
        let info = axis.read_state(&device).await.unwrap();
        assert_eq!(info.state, AxisState::On);
        assert_eq!(axis.ramp().target_temperature(), None);
        assert_eq!(axis.ramp().move_deadline(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overdue_ramp_alarms_until_aborted() {
        let device = SimulatedDevice::tst350("sim", 20.0);
        let mut axis = axis();
        axis.set_parameter(&device, AxisParameter::Tolerance, 0.5)
            .await
            .unwrap();
        axis.start_move(&device, 30.0).await.unwrap();

        // 10 degrees at 1 deg/min: 600 s expected, 1230 s allowed
        tokio::time::advance(Duration::from_secs(1231)).await;
        assert_eq!(
            axis.read_state(&device).await.unwrap(),
            AxisStateInfo::deadline_exceeded()
        );
        device.set_attribute("IdleT", Value::Bool(true)).await;
        assert_eq!(axis.read_state(&device).await.unwrap().state, AxisState::Alarm);

        axis.abort(&device).await.unwrap();
        assert_eq!(device.command_count("HoldTemp").await, 1);
        assert_eq!(axis.read_state(&device).await.unwrap().state, AxisState::On);
    }

    #[tokio::test(start_paused = true)]
    async fn test_communication_failure_is_fault_and_keeps_ramp_state() {
        let device = SimulatedDevice::tst350("sim", 20.0);
        let mut axis = axis();
        axis.set_parameter(&device, AxisParameter::Tolerance, 0.5)
            .await
            .unwrap();
        axis.start_move(&device, 30.0).await.unwrap();
        let before = axis.ramp().clone();

        device.fail("ErrorMsg").await;
        let info = axis.read_state(&device).await.unwrap();
        assert_eq!(info, AxisStateInfo::communication_fault());
        assert_eq!(axis.ramp(), &before);
    }

    #[tokio::test]
    async fn test_instrument_error_reports_program() {
        let device = SimulatedDevice::tst350("sim", 20.0)
            .with_attribute("ErrorMsg", Value::from("Sensor_open"))
            .with_attribute("Program", Value::from("Sensor open circuit"));
        let mut axis = axis();

        let info = axis.read_state(&device).await.unwrap();
        assert_eq!(info.state, AxisState::Fault);
        assert_eq!(info.message.as_deref(), Some("Sensor open circuit"));
    }

    #[tokio::test]
    async fn test_failed_start_command_leaves_axis_idle() {
        let device = SimulatedDevice::tst350("sim", 20.0);
        device.fail("StartRamp").await;
        let mut axis = axis();

        let err = axis.start_move(&device, 50.0).await.unwrap_err();
        assert!(err.downcast_ref::<LinkamError>().unwrap().is_communication());
        assert!(!axis.ramp().is_ramping());
        assert_eq!(axis.ramp().move_deadline(), None);
    }

    #[tokio::test]
    async fn test_parameters_are_memorised_and_validated() {
        let device = SimulatedDevice::tst350("sim", 20.0);
        let mut axis = axis();

        axis.set_parameter(&device, AxisParameter::Deceleration, 3.0)
            .await
            .unwrap();
        assert_eq!(
            axis.get_parameter(&device, AxisParameter::Acceleration)
                .await
                .unwrap(),
            3.0
        );
        assert!(axis
            .set_parameter(&device, AxisParameter::Velocity, -1.0)
            .await
            .is_err());
        assert!(axis
            .set_parameter(&device, AxisParameter::Tolerance, -1.0)
            .await
            .is_err());
        assert_eq!(
            axis.get_parameter(&device, AxisParameter::Velocity)
                .await
                .unwrap(),
            1.0
        );
        assert!(device.calls().await.is_empty());
    }
}
