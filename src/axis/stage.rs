use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, error, info};

use super::{
    parameters::{require_non_zero, require_positive, AxisParameter, AxisParameters},
    state::AxisState,
    state_info::AxisStateInfo,
    AxisDriver, AxisRole,
};
use crate::{
    device::{value::Value, DeviceProxy},
    error::LinkamError,
};

pub const POSITION_ATTRIBUTES: [&str; 3] = ["PositionX", "PositionY", "PositionZ"];
const MOVE_ABSOLUTE: &str = "MoveAbsolute";

/// `Idle` flags of the whole stage, refreshed once per state cycle. `None`
/// until the first refresh and after a failed one.
pub type IdleSnapshot = Arc<RwLock<Option<Vec<bool>>>>;

/// Sends one `MoveAbsolute [x, y, z]` in steps. Axes without a target are
/// commanded to their current position.
pub async fn move_absolute(
    device: &dyn DeviceProxy,
    targets: &[(usize, f64)],
) -> anyhow::Result<()> {
    let mut positions = Vec::with_capacity(POSITION_ATTRIBUTES.len());
    for (index, attribute) in POSITION_ATTRIBUTES.iter().enumerate() {
        let steps = match targets.iter().rev().find(|(i, _)| *i == index) {
            Some((_, steps)) => *steps,
            None => device.read_f64(attribute).await?,
        };
        positions.push(Value::Int(steps as i64));
    }
    debug!("Stage moving to {:?}", positions);
    device.command(MOVE_ABSOLUTE, positions).await?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct StageAxis {
    axis: u32,
    index: usize,
    params: AxisParameters,
    velocity_steps: i64,
    idle: IdleSnapshot,
}

impl StageAxis {
    pub fn new(axis: u32, idle: IdleSnapshot) -> anyhow::Result<Self> {
        let index = axis
            .checked_sub(1)
            .map(|i| i as usize)
            .filter(|i| *i < POSITION_ATTRIBUTES.len())
            .ok_or_else(|| LinkamError::UnsupportedAxis {
                axis,
                controller: "TST350 stage".to_string(),
            })?;
        Ok(Self {
            axis,
            index,
            params: AxisParameters::default(),
            velocity_steps: 1,
            idle,
        })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn position_attribute(&self) -> &'static str {
        POSITION_ATTRIBUTES[self.index]
    }

    pub fn to_steps(&self, target: f64) -> f64 {
        target * self.params.step_per_unit
    }

    fn speed_command(&self) -> &'static str {
        if self.index < 2 {
            "SetSpeedXY"
        } else {
            "SetSpeedZ"
        }
    }

    fn stop_command(&self) -> &'static str {
        if self.index < 2 {
            "StopXY"
        } else {
            "StopZ"
        }
    }
}

#[async_trait::async_trait]
impl AxisDriver for StageAxis {
    fn axis(&self) -> u32 {
        self.axis
    }

    fn role(&self) -> AxisRole {
        AxisRole::Stage
    }

    async fn read_state(&mut self, _device: &dyn DeviceProxy) -> anyhow::Result<AxisStateInfo> {
        let idle = self.idle.read().await;
        let Some(flags) = idle.as_ref() else {
            return Ok(AxisStateInfo::communication_fault());
        };
        Ok(match flags.get(self.index) {
            Some(true) => AxisStateInfo::new(AxisState::On),
            Some(false) => AxisStateInfo::new(AxisState::Moving),
            None => {
                error!("Axis {} missing from idle flags {:?}", self.axis, flags);
                AxisStateInfo::communication_fault()
            }
        })
    }

    async fn read_position(&mut self, device: &dyn DeviceProxy) -> anyhow::Result<f64> {
        Ok(device.read_f64(self.position_attribute()).await? / self.params.step_per_unit)
    }

    async fn start_move(&mut self, device: &dyn DeviceProxy, target: f64) -> anyhow::Result<()> {
        let steps = self.to_steps(target);
        move_absolute(device, &[(self.index, steps)]).await?;
        info!("Axis {} moving to {} ({} steps)", self.axis, target, steps);
        Ok(())
    }

    async fn abort(&mut self, device: &dyn DeviceProxy) -> anyhow::Result<()> {
        device.command(self.stop_command(), Vec::new()).await?;
        Ok(())
    }

    async fn get_parameter(
        &self,
        _device: &dyn DeviceProxy,
        parameter: AxisParameter,
    ) -> anyhow::Result<f64> {
        match parameter {
            AxisParameter::Velocity => Ok(self.velocity_steps as f64 / self.params.step_per_unit),
            AxisParameter::Acceleration | AxisParameter::Deceleration => {
                Ok(self.params.acceleration)
            }
            AxisParameter::StepPerUnit => Ok(self.params.step_per_unit),
            AxisParameter::BaseRate => Ok(self.params.base_rate),
            AxisParameter::Tolerance => Err(self.unsupported(parameter)),
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
                let velocity = require_positive(parameter, value)?;
                let steps = (velocity * self.params.step_per_unit) as i64;
                device
                    .command(self.speed_command(), vec![Value::Int(steps)])
                    .await?;
                self.velocity_steps = steps;
            }
            AxisParameter::Acceleration | AxisParameter::Deceleration => {
                self.params.acceleration = value;
            }
            AxisParameter::StepPerUnit => {
                self.params.step_per_unit = require_non_zero(parameter, value)?;
            }
            AxisParameter::BaseRate => self.params.base_rate = value,
            AxisParameter::Tolerance => return Err(self.unsupported(parameter)),
        }
        debug!("Axis {} {} set to {}", self.axis, parameter, value);
        Ok(())
    }
}
