pub mod parameters;
pub mod stage;
pub mod state;
pub mod state_info;
pub mod t96;
pub mod temperature;

use serde::Serialize;

use crate::{device::DeviceProxy, error::LinkamError};
use parameters::AxisParameter;
use state_info::AxisStateInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AxisRole {
    Temperature,
    Stretch,
    Stage,
}

impl std::fmt::Display for AxisRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AxisRole::Temperature => f.write_str("temperature"),
            AxisRole::Stretch => f.write_str("tst_stretcher"),
            AxisRole::Stage => f.write_str("stage"),
        }
    }
}

/// What every axis variant can do against its device.
///
/// `read_state` never fails because of the device: communication problems
/// are reported as a fault state instead.
#[async_trait::async_trait]
pub trait AxisDriver: Send + Sync {
    fn axis(&self) -> u32;
    fn role(&self) -> AxisRole;

    async fn read_state(&mut self, device: &dyn DeviceProxy) -> anyhow::Result<AxisStateInfo>;
    async fn read_position(&mut self, device: &dyn DeviceProxy) -> anyhow::Result<f64>;
    async fn start_move(&mut self, device: &dyn DeviceProxy, target: f64) -> anyhow::Result<()>;
    async fn abort(&mut self, device: &dyn DeviceProxy) -> anyhow::Result<()>;

    async fn get_parameter(
        &self,
        device: &dyn DeviceProxy,
        parameter: AxisParameter,
    ) -> anyhow::Result<f64>;

    async fn set_parameter(
        &mut self,
        device: &dyn DeviceProxy,
        parameter: AxisParameter,
        value: f64,
    ) -> anyhow::Result<()>;

    fn unsupported(&self, parameter: AxisParameter) -> anyhow::Error {
        LinkamError::UnsupportedParameter {
            parameter: parameter.to_string(),
            axis: self.axis(),
            role: self.role().to_string(),
        }
        .into()
    }
}
