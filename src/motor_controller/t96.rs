use super::{config::ControllerConfig, ControllerVariant, LinkamController};
use crate::{
    axis::t96::{StretchAxis, T96Axis, T96TemperatureAxis},
    device::DeviceProxy,
    error::LinkamError,
};

/// Linkam T96 controller. Axis 1 is the TST stretcher, axis 2 the heater;
/// axis 3 is the CSS shearing stage, which has no driver.
pub struct T96;

pub type T96Controller = LinkamController<T96>;

#[async_trait::async_trait]
impl ControllerVariant for T96 {
    type Axis = T96Axis;

    const NAME: &'static str = "LinkamT96MotorCtrl";
    const MAX_AXES: u32 = 3;

    fn create_axis(&self, axis: u32, _config: &ControllerConfig) -> anyhow::Result<Self::Axis> {
        match axis {
            1 => Ok(T96Axis::Stretch(StretchAxis::new(axis))),
            2 => Ok(T96Axis::Temperature(T96TemperatureAxis::new(axis))),
            _ => Err(LinkamError::UnsupportedAxis {
                axis,
                controller: Self::NAME.to_string(),
            }
            .into()),
        }
    }

    async fn refresh(&self, device: &dyn DeviceProxy) -> anyhow::Result<()> {
        device.command("UpdateStateFlags", Vec::new()).await?;
        Ok(())
    }
}
