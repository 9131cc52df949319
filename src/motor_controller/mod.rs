pub mod config;
pub mod t96;
pub mod tst350;
pub mod tst350_stage;

use std::{collections::HashMap, sync::Arc};

use tokio::sync::RwLock;
use tracing::{debug, error};

use crate::{
    axis::{parameters::AxisParameter, state_info::AxisStateInfo, AxisDriver},
    device::{DeviceConnector, DeviceProxy},
    error::LinkamError,
};
use config::ControllerConfig;

#[async_trait::async_trait]
pub trait MotorController: Send + Sync {
    fn name(&self) -> &str;
    fn max_axes(&self) -> u32;

    async fn axes(&self) -> Vec<u32>;
    async fn add_axis(&self, axis: u32) -> anyhow::Result<()>;
    async fn remove_axis(&self, axis: u32) -> anyhow::Result<()>;

    /// Called once per polling cycle before the per-axis state reads.
    async fn state_all(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn read_state(&self, axis: u32) -> anyhow::Result<AxisStateInfo>;
    async fn read_position(&self, axis: u32) -> anyhow::Result<f64>;
    async fn start_move(&self, axis: u32, target: f64) -> anyhow::Result<()>;
    async fn abort(&self, axis: u32) -> anyhow::Result<()>;

    /// Starts several axes as one motion.
    async fn start_group(&self, targets: &[(u32, f64)]) -> anyhow::Result<()> {
        for (axis, target) in targets {
            self.start_move(*axis, *target).await?;
        }
        Ok(())
    }

    async fn get_parameter(&self, axis: u32, name: &str) -> anyhow::Result<f64>;
    async fn set_parameter(&self, axis: u32, name: &str, value: f64) -> anyhow::Result<()>;

    async fn shutdown(&self) -> anyhow::Result<()> {
        for axis in self.axes().await {
            self.abort(axis).await?;
        }
        Ok(())
    }
}

/// A Linkam controller model: which axes exist and how they are built.
#[async_trait::async_trait]
pub trait ControllerVariant: Send + Sync + 'static {
    type Axis: AxisDriver;

    const NAME: &'static str;
    const MAX_AXES: u32;

    fn create_axis(&self, axis: u32, config: &ControllerConfig) -> anyhow::Result<Self::Axis>;

    async fn refresh(&self, _device: &dyn DeviceProxy) -> anyhow::Result<()> {
        Ok(())
    }

    /// Every target axis is known to be present.
    async fn start_group(
        &self,
        device: &dyn DeviceProxy,
        axes: &mut HashMap<u32, Self::Axis>,
        targets: &[(u32, f64)],
    ) -> anyhow::Result<()> {
        for (axis, target) in targets {
            let record = axes
                .get_mut(axis)
                .ok_or(LinkamError::AxisNotAdded(*axis))?;
            record.start_move(device, *target).await?;
        }
        Ok(())
    }
}

pub struct LinkamController<V: ControllerVariant> {
    variant: V,
    config: ControllerConfig,
    device: Arc<dyn DeviceProxy>,
    axes: RwLock<HashMap<u32, V::Axis>>,
}

impl<V: ControllerVariant> LinkamController<V> {
    pub fn new(variant: V, config: ControllerConfig, device: Arc<dyn DeviceProxy>) -> Self {
        Self {
            variant,
            config,
            device,
            axes: RwLock::new(HashMap::new()),
        }
    }

    pub async fn connect(
        variant: V,
        config: ControllerConfig,
        connector: &dyn DeviceConnector,
    ) -> anyhow::Result<Self> {
        let device = connector.connect(&config.device_name).await.map_err(|e| {
            error!("{}: cannot reach {}: {:#}", V::NAME, config.device_name, e);
            e
        })?;
        Ok(Self::new(variant, config, device))
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn device(&self) -> &Arc<dyn DeviceProxy> {
        &self.device
    }

    pub async fn axis_snapshot(&self, axis: u32) -> anyhow::Result<V::Axis>
    where
        V::Axis: Clone,
    {
        self.axes
            .read()
            .await
            .get(&axis)
            .cloned()
            .ok_or_else(|| LinkamError::AxisNotAdded(axis).into())
    }

    fn parse_parameter(axis: &V::Axis, name: &str) -> anyhow::Result<AxisParameter> {
        AxisParameter::parse(name).ok_or_else(|| {
            LinkamError::UnsupportedParameter {
                parameter: name.to_string(),
                axis: axis.axis(),
                role: axis.role().to_string(),
            }
            .into()
        })
    }
}

#[async_trait::async_trait]
impl<V: ControllerVariant> MotorController for LinkamController<V> {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn max_axes(&self) -> u32 {
        V::MAX_AXES
    }

    async fn axes(&self) -> Vec<u32> {
        let mut axes: Vec<u32> = self.axes.read().await.keys().copied().collect();
        axes.sort_unstable();
        axes
    }

    async fn add_axis(&self, axis: u32) -> anyhow::Result<()> {
        if axis == 0 || axis > V::MAX_AXES {
            return Err(LinkamError::UnsupportedAxis {
                axis,
                controller: V::NAME.to_string(),
            }
            .into());
        }
        let record = self.variant.create_axis(axis, &self.config)?;
        debug!("{}: adding axis {} ({})", self.config.name, axis, record.role());
        self.axes.write().await.insert(axis, record);
        Ok(())
    }

    async fn remove_axis(&self, axis: u32) -> anyhow::Result<()> {
        debug!("{}: removing axis {}", self.config.name, axis);
        self.axes
            .write()
            .await
            .remove(&axis)
            .map(|_| ())
            .ok_or_else(|| LinkamError::AxisNotAdded(axis).into())
    }

    async fn state_all(&self) -> anyhow::Result<()> {
        // per-axis reads report the fault if the device is really gone
        if let Err(e) = self.variant.refresh(self.device.as_ref()).await {
            error!("{}: state refresh failed: {:#}", self.config.name, e);
        }
        Ok(())
    }

    async fn read_state(&self, axis: u32) -> anyhow::Result<AxisStateInfo> {
        let mut axes = self.axes.write().await;
        let record = axes.get_mut(&axis).ok_or(LinkamError::AxisNotAdded(axis))?;
        record.read_state(self.device.as_ref()).await
    }

    async fn read_position(&self, axis: u32) -> anyhow::Result<f64> {
        let mut axes = self.axes.write().await;
        let record = axes.get_mut(&axis).ok_or(LinkamError::AxisNotAdded(axis))?;
        record.read_position(self.device.as_ref()).await
    }

    async fn start_move(&self, axis: u32, target: f64) -> anyhow::Result<()> {
        let mut axes = self.axes.write().await;
        let record = axes.get_mut(&axis).ok_or(LinkamError::AxisNotAdded(axis))?;
        record.start_move(self.device.as_ref(), target).await
    }

    async fn abort(&self, axis: u32) -> anyhow::Result<()> {
        let mut axes = self.axes.write().await;
        let record = axes.get_mut(&axis).ok_or(LinkamError::AxisNotAdded(axis))?;
        debug!("{}: aborting axis {}", self.config.name, axis);
        record.abort(self.device.as_ref()).await
    }

    async fn start_group(&self, targets: &[(u32, f64)]) -> anyhow::Result<()> {
        let mut axes = self.axes.write().await;
        if let Some((axis, _)) = targets.iter().find(|(axis, _)| !axes.contains_key(axis)) {
            return Err(LinkamError::AxisNotAdded(*axis).into());
        }
        debug!("{}: starting {} axes together", self.config.name, targets.len());
        self.variant
            .start_group(self.device.as_ref(), &mut axes, targets)
            .await
    }

    async fn get_parameter(&self, axis: u32, name: &str) -> anyhow::Result<f64> {
        let axes = self.axes.read().await;
        let record = axes.get(&axis).ok_or(LinkamError::AxisNotAdded(axis))?;
        let parameter = Self::parse_parameter(record, name)?;
        record.get_parameter(self.device.as_ref(), parameter).await
    }

    async fn set_parameter(&self, axis: u32, name: &str, value: f64) -> anyhow::Result<()> {
        let mut axes = self.axes.write().await;
        let record = axes.get_mut(&axis).ok_or(LinkamError::AxisNotAdded(axis))?;
        let parameter = Self::parse_parameter(record, name)?;
        record
            .set_parameter(self.device.as_ref(), parameter, value)
            .await
    }
}
