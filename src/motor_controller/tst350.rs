use super::{config::ControllerConfig, ControllerVariant, LinkamController};
use crate::axis::temperature::RampedTemperatureAxis;

pub struct Tst350Temperature;

pub type Tst350TempController = LinkamController<Tst350Temperature>;

#[async_trait::async_trait]
impl ControllerVariant for Tst350Temperature {
    type Axis = RampedTemperatureAxis;

    const NAME: &'static str = "LinkamTST350TempMotorCtrl";
    const MAX_AXES: u32 = 1;

    fn create_axis(&self, axis: u32, config: &ControllerConfig) -> anyhow::Result<Self::Axis> {
        Ok(RampedTemperatureAxis::new(
            axis,
            config.deadline.clone(),
            config.rate_factor,
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        axis::state::AxisState,
        device::sim::{SimulatedDevice, SimulatedServer},
        error::LinkamError,
        motor_controller::MotorController,
    };

    fn controller(device: &Arc<SimulatedDevice>) -> Tst350TempController {
        LinkamController::new(Tst350Temperature, ControllerConfig::default(), device.clone())
    }

    #[tokio::test]
    async fn test_axis_lifecycle() {
        let device = Arc::new(SimulatedDevice::tst350("sim", 20.0));
        let ctrl = controller(&device);

        let err = ctrl.read_position(1).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LinkamError>(),
            Some(LinkamError::AxisNotAdded(1))
        ));

        ctrl.add_axis(1).await.unwrap();
        assert_eq!(ctrl.axes().await, vec![1]);
        assert_eq!(ctrl.read_position(1).await.unwrap(), 20.0);

        ctrl.remove_axis(1).await.unwrap();
        assert!(ctrl.read_state(1).await.is_err());
        assert!(ctrl.remove_axis(1).await.is_err());

        let err = ctrl.add_axis(2).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LinkamError>(),
            Some(LinkamError::UnsupportedAxis { axis: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_re_adding_axis_resets_its_record() {
        let device = Arc::new(SimulatedDevice::tst350("sim", 20.0));
        let ctrl = controller(&device);
        ctrl.add_axis(1).await.unwrap();
        ctrl.set_parameter(1, "tolerance", 0.2).await.unwrap();
        ctrl.start_move(1, 40.0).await.unwrap();

        ctrl.add_axis(1).await.unwrap();
        let axis = ctrl.axis_snapshot(1).await.unwrap();
        assert!(!axis.ramp().is_ramping());
        assert_eq!(axis.ramp().tolerance(), 0.0);
    }

    #[tokio::test]
    async fn test_parameter_names_are_resolved() {
        let device = Arc::new(SimulatedDevice::tst350("sim", 20.0));
        let ctrl = controller(&device);
        ctrl.add_axis(1).await.unwrap();

        ctrl.set_parameter(1, "Velocity", 12.5).await.unwrap();
        assert_eq!(ctrl.get_parameter(1, "velocity").await.unwrap(), 12.5);
        ctrl.set_parameter(1, "Tolerance", 0.3).await.unwrap();
        assert_eq!(ctrl.get_parameter(1, "tolerance").await.unwrap(), 0.3);

        let err = ctrl.set_parameter(1, "jerk", 1.0).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Unsupported parameter: jerk is not supported for axis 1 (temperature)"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_move_through_controller() {
        let device = Arc::new(SimulatedDevice::tst350("sim", 20.0).with_ramp_step(5.0));
        let ctrl = controller(&device);
        ctrl.add_axis(1).await.unwrap();
        ctrl.set_parameter(1, "velocity", 10.0).await.unwrap();

        ctrl.start_move(1, 30.0).await.unwrap();
        assert_eq!(ctrl.read_state(1).await.unwrap().state, AxisState::Moving);
        assert_eq!(ctrl.read_position(1).await.unwrap(), 25.0);
        assert_eq!(ctrl.read_position(1).await.unwrap(), 30.0);

        let info = ctrl.read_state(1).await.unwrap();
        assert_eq!(info.state, AxisState::On);
        assert_eq!(info.message.as_deref(), Some("Holding"));
    }

    #[tokio::test]
    async fn test_group_start_falls_back_to_single_moves() {
        let device = Arc::new(SimulatedDevice::tst350("sim", 20.0));
        let ctrl = controller(&device);
        ctrl.add_axis(1).await.unwrap();

        assert!(ctrl.start_group(&[(2, 40.0)]).await.is_err());
        ctrl.start_group(&[(1, 40.0)]).await.unwrap();
        assert_eq!(device.command_count("StartRamp").await, 1);
        assert!(ctrl.axis_snapshot(1).await.unwrap().ramp().is_ramping());
    }

    #[tokio::test]
    async fn test_shutdown_holds_every_axis() {
        let device = Arc::new(SimulatedDevice::tst350("sim", 20.0));
        let ctrl = controller(&device);
        ctrl.add_axis(1).await.unwrap();

        ctrl.shutdown().await.unwrap();
        assert_eq!(device.command_count("HoldTemp").await, 1);
    }

    #[tokio::test]
    async fn test_connect_resolves_configured_device() {
        let device = Arc::new(SimulatedDevice::tst350("bl/linkam/tst350", 20.0));
        let server = SimulatedServer::new().with_device(device.clone());
        let config = ControllerConfig {
            device_name: "bl/linkam/tst350".to_string(),
            ..ControllerConfig::default()
        };

        let ctrl = Tst350TempController::connect(Tst350Temperature, config, &server)
            .await
            .unwrap();
        assert_eq!(ctrl.device().name(), "bl/linkam/tst350");

        let missing = ControllerConfig {
            device_name: "bl/linkam/other".to_string(),
            ..ControllerConfig::default()
        };
        assert!(Tst350TempController::connect(Tst350Temperature, missing, &server)
            .await
            .is_err());
    }
}
