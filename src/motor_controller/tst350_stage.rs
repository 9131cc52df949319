use std::collections::HashMap;

use super::{config::ControllerConfig, ControllerVariant, LinkamController};
use crate::{
    axis::stage::{move_absolute, IdleSnapshot, StageAxis},
    device::DeviceProxy,
};

/// Linkam TST350 X/Y/Z stage. Axes move together through one
/// `MoveAbsolute` and report motion through the shared `Idle` array.
#[derive(Default)]
pub struct Tst350Stage {
    idle: IdleSnapshot,
}

impl Tst350Stage {
    pub fn new() -> Self {
        Self::default()
    }
}

pub type Tst350StageController = LinkamController<Tst350Stage>;

#[async_trait::async_trait]
impl ControllerVariant for Tst350Stage {
    type Axis = StageAxis;

    const NAME: &'static str = "LinkamTST350MotorCtrl";
    const MAX_AXES: u32 = 3;

    fn create_axis(&self, axis: u32, _config: &ControllerConfig) -> anyhow::Result<Self::Axis> {
        StageAxis::new(axis, self.idle.clone())
    }

    async fn refresh(&self, device: &dyn DeviceProxy) -> anyhow::Result<()> {
        let flags = device.read_flags("Idle").await;
        let mut idle = self.idle.write().await;
        match flags {
            Ok(flags) => {
                *idle = Some(flags);
                Ok(())
            }
            Err(e) => {
                *idle = None;
                Err(e)
            }
        }
    }

    async fn start_group(
        &self,
        device: &dyn DeviceProxy,
        axes: &mut HashMap<u32, Self::Axis>,
        targets: &[(u32, f64)],
    ) -> anyhow::Result<()> {
        let steps: Vec<(usize, f64)> = targets
            .iter()
            .filter_map(|(axis, target)| {
                axes.get(axis)
                    .map(|record| (record.index(), record.to_steps(*target)))
            })
            .collect();
        move_absolute(device, &steps).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        axis::{state::AxisState, state_info::AxisStateInfo},
        device::{sim::SimulatedDevice, value::Value},
        error::LinkamError,
        motor_controller::MotorController,
    };

    async fn controller(device: &Arc<SimulatedDevice>) -> Tst350StageController {
        let ctrl = LinkamController::new(
            Tst350Stage::new(),
            ControllerConfig::default(),
            device.clone(),
        );
        for axis in 1..=3 {
            ctrl.add_axis(axis).await.unwrap();
        }
        ctrl
    }

    #[tokio::test]
    async fn test_group_move_sends_one_command() {
        let device = Arc::new(SimulatedDevice::tst350_stage("sim", [100, 200, 300]));
        let ctrl = controller(&device).await;
        ctrl.set_parameter(1, "step_per_unit", 10.0).await.unwrap();

        ctrl.start_group(&[(1, 2.5), (3, -4.0)]).await.unwrap();

        assert_eq!(
            device.commands("MoveAbsolute").await,
            vec![vec![Value::Int(25), Value::Int(200), Value::Int(-4)]]
        );
        assert_eq!(device.attribute("PositionX").await, Some(Value::Int(25)));
        assert_eq!(ctrl.read_position(1).await.unwrap(), 2.5);
    }

    #[tokio::test]
    async fn test_group_move_with_unknown_axis_sends_nothing() {
        let device = Arc::new(SimulatedDevice::tst350_stage("sim", [0, 0, 0]));
        let ctrl = controller(&device).await;
        ctrl.remove_axis(2).await.unwrap();

        let err = ctrl.start_group(&[(1, 1.0), (2, 1.0)]).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LinkamError>(),
            Some(LinkamError::AxisNotAdded(2))
        ));
        assert!(device.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_each_axis_reads_its_idle_flag() {
        let device = Arc::new(SimulatedDevice::tst350_stage("sim", [0, 0, 0]));
        let ctrl = controller(&device).await;

        ctrl.start_group(&[(1, 5.0), (3, 7.0)]).await.unwrap();
        ctrl.state_all().await.unwrap();
        assert_eq!(ctrl.read_state(1).await.unwrap().state, AxisState::Moving);
        assert_eq!(ctrl.read_state(2).await.unwrap().state, AxisState::On);
        assert_eq!(ctrl.read_state(3).await.unwrap().state, AxisState::Moving);

        ctrl.abort(1).await.unwrap();
        ctrl.state_all().await.unwrap();
        assert_eq!(ctrl.read_state(1).await.unwrap().state, AxisState::On);
        assert_eq!(ctrl.read_state(3).await.unwrap().state, AxisState::Moving);
        assert_eq!(device.command_count("StopXY").await, 1);
        assert_eq!(device.command_count("StopZ").await, 0);
    }

    #[tokio::test]
    async fn test_failed_idle_read_faults_every_axis() {
        let device = Arc::new(SimulatedDevice::tst350_stage("sim", [0, 0, 0]));
        let ctrl = controller(&device).await;
        ctrl.state_all().await.unwrap();
        assert_eq!(ctrl.read_state(2).await.unwrap().state, AxisState::On);

        device.fail("Idle").await;
        assert!(ctrl.state_all().await.is_ok());
        for axis in 1..=3 {
            assert_eq!(
                ctrl.read_state(axis).await.unwrap(),
                AxisStateInfo::communication_fault()
            );
        }

        device.restore("Idle").await;
        ctrl.state_all().await.unwrap();
        assert_eq!(ctrl.read_state(2).await.unwrap().state, AxisState::On);
    }

    #[tokio::test]
    async fn test_velocity_is_stored_in_steps() {
        let device = Arc::new(SimulatedDevice::tst350_stage("sim", [0, 0, 0]));
        let ctrl = controller(&device).await;
        ctrl.set_parameter(3, "step_per_unit", 4.0).await.unwrap();
        ctrl.set_parameter(3, "Velocity", 2.6).await.unwrap();

        assert_eq!(device.commands("SetSpeedZ").await, vec![vec![Value::Int(10)]]);
        assert_eq!(ctrl.get_parameter(3, "velocity").await.unwrap(), 2.5);
    }
}
