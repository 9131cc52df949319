use tracing::{debug, error, info};

use super::{
    parameters::{require_non_zero, AxisParameter},
    state::AxisState,
    state_info::AxisStateInfo,
    AxisDriver, AxisRole,
};
use crate::device::{value::Value, DeviceProxy};

async fn flag_state(device: &dyn DeviceProxy, axis: u32, flag: &str) -> AxisStateInfo {
    match device.read_bool(flag).await {
        Ok(true) => AxisStateInfo::new(AxisState::Moving),
        Ok(false) => AxisStateInfo::new(AxisState::On),
        Err(e) => {
            error!("Axis {} state read failed: {:#}", axis, e);
            AxisStateInfo::communication_fault()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StretchAxis {
    axis: u32,
    step_per_unit: f64,
    /// Last velocity written to the device, in steps. The device echoes stale
    /// values until the next move, so reads are served from here.
    velocity_steps: i64,
}

impl StretchAxis {
    pub fn new(axis: u32) -> Self {
        Self {
            axis,
            step_per_unit: 1.0,
            velocity_steps: 1,
        }
    }
}

#[async_trait::async_trait]
impl AxisDriver for StretchAxis {
    fn axis(&self) -> u32 {
        self.axis
    }

    fn role(&self) -> AxisRole {
        AxisRole::Stretch
    }

    async fn read_state(&mut self, device: &dyn DeviceProxy) -> anyhow::Result<AxisStateInfo> {
        Ok(flag_state(device, self.axis, "tst_stretching").await)
    }

    async fn read_position(&mut self, device: &dyn DeviceProxy) -> anyhow::Result<f64> {
        Ok(device.read_f64("tst_gap").await? / self.step_per_unit)
    }

    async fn start_move(&mut self, device: &dyn DeviceProxy, target: f64) -> anyhow::Result<()> {
        let steps = target * self.step_per_unit;
        device
            .command("MoveGapAbsolute", vec![Value::Float(steps)])
            .await?;
        info!("Axis {} moving gap to {} ({} steps)", self.axis, target, steps);
        Ok(())
    }

    async fn abort(&mut self, device: &dyn DeviceProxy) -> anyhow::Result<()> {
        device.command("StopTSTMotor", Vec::new()).await?;
        Ok(())
    }

    async fn get_parameter(
        &self,
        _device: &dyn DeviceProxy,
        parameter: AxisParameter,
    ) -> anyhow::Result<f64> {
        match parameter {
            AxisParameter::Velocity => Ok(self.velocity_steps as f64 / self.step_per_unit),
            AxisParameter::StepPerUnit => Ok(self.step_per_unit),
            _ => Err(self.unsupported(parameter)),
        }
    }

    async fn set_parameter(
        &mut self,
        device: &dyn DeviceProxy,
        parameter: AxisParameter,
        value: f64,
    ) -> anyhow::Result<()> {
        match parameter {
            AxisParameter::Velocity => {
                let steps = (value * self.step_per_unit) as i64;
                device
                    .write("tst_motor_velocity", Value::Int(steps))
                    .await?;
                self.velocity_steps = steps;
            }
            AxisParameter::StepPerUnit => {
                self.step_per_unit = require_non_zero(parameter, value)?;
            }
            _ => return Err(self.unsupported(parameter)),
        }
        debug!("Axis {} {} set to {}", self.axis, parameter, value);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct T96TemperatureAxis {
    axis: u32,
}

impl T96TemperatureAxis {
    pub fn new(axis: u32) -> Self {
        Self { axis }
    }
}

#[async_trait::async_trait]
impl AxisDriver for T96TemperatureAxis {
    fn axis(&self) -> u32 {
        self.axis
    }

    fn role(&self) -> AxisRole {
        AxisRole::Temperature
    }

    async fn read_state(&mut self, device: &dyn DeviceProxy) -> anyhow::Result<AxisStateInfo> {
        Ok(flag_state(device, self.axis, "heater_ramping").await)
    }

    async fn read_position(&mut self, device: &dyn DeviceProxy) -> anyhow::Result<f64> {
        device.read_f64("temperature").await
    }

    async fn start_move(&mut self, device: &dyn DeviceProxy, target: f64) -> anyhow::Result<()> {
        device
            .command("StartTemperatureRamp", vec![Value::Float(target)])
            .await?;
        info!("Axis {} ramping to {}", self.axis, target);
        Ok(())
    }

    async fn abort(&mut self, device: &dyn DeviceProxy) -> anyhow::Result<()> {
        device.command("HoldTemperature", Vec::new()).await?;
        Ok(())
    }

    async fn get_parameter(
        &self,
        device: &dyn DeviceProxy,
        parameter: AxisParameter,
    ) -> anyhow::Result<f64> {
        match parameter {
            AxisParameter::Velocity => device.read_f64("ramp_rate").await,
            _ => Err(self.unsupported(parameter)),
        }
    }

    async fn set_parameter(
        &mut self,
        device: &dyn DeviceProxy,
        parameter: AxisParameter,
        value: f64,
    ) -> anyhow::Result<()> {
        match parameter {
            AxisParameter::Velocity => device.write("ramp_rate", Value::Float(value)).await,
            _ => Err(self.unsupported(parameter)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum T96Axis {
    Stretch(StretchAxis),
    Temperature(T96TemperatureAxis),
}

impl T96Axis {
    fn driver(&self) -> &dyn AxisDriver {
        match self {
            T96Axis::Stretch(axis) => axis,
            T96Axis::Temperature(axis) => axis,
        }
    }

    fn driver_mut(&mut self) -> &mut dyn AxisDriver {
        match self {
            T96Axis::Stretch(axis) => axis,
            T96Axis::Temperature(axis) => axis,
        }
    }
}

#[async_trait::async_trait]
impl AxisDriver for T96Axis {
    fn axis(&self) -> u32 {
        self.driver().axis()
    }

    fn role(&self) -> AxisRole {
        self.driver().role()
    }

    async fn read_state(&mut self, device: &dyn DeviceProxy) -> anyhow::Result<AxisStateInfo> {
        self.driver_mut().read_state(device).await
    }

    async fn read_position(&mut self, device: &dyn DeviceProxy) -> anyhow::Result<f64> {
        self.driver_mut().read_position(device).await
    }

    async fn start_move(&mut self, device: &dyn DeviceProxy, target: f64) -> anyhow::Result<()> {
        self.driver_mut().start_move(device, target).await
    }

    async fn abort(&mut self, device: &dyn DeviceProxy) -> anyhow::Result<()> {
        self.driver_mut().abort(device).await
    }

    async fn get_parameter(
        &self,
        device: &dyn DeviceProxy,
        parameter: AxisParameter,
    ) -> anyhow::Result<f64> {
        self.driver().get_parameter(device, parameter).await
    }

    async fn set_parameter(
        &mut self,
        device: &dyn DeviceProxy,
        parameter: AxisParameter,
        value: f64,
    ) -> anyhow::Result<()> {
        self.driver_mut()
            .set_parameter(device, parameter, value)
            .await
    }
}
