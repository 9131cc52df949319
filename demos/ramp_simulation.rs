use std::{sync::Arc, time::Duration};

use anyhow::Result;
use futures::StreamExt;
use linkam::{
    config::LinkamConfig,
    device::sim::{SimulatedDevice, SimulatedServer},
    macros::{MacroContext, PumpMode},
    motor_controller::{
        config::ControllerConfig,
        tst350::{Tst350TempController, Tst350Temperature},
        tst350_stage::{Tst350Stage, Tst350StageController},
        MotorController,
    },
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    info!("Starting Linkam ramp simulation");

    let config = LinkamConfig::from_json_str(
        r#"{
            "controller": { "device_name": "lab/linkam/tst350" },
            "macros": {
                "device_name": "lab/linkam/tst350",
                "ramp": { "poll_interval_ms": 50 }
            }
        }"#,
    )?;

    let device = Arc::new(SimulatedDevice::tst350("lab/linkam/tst350", 25.0).with_ramp_step(2.5));
    let stage_device = Arc::new(SimulatedDevice::tst350_stage("lab/linkam/stage", [0, 0, 0]));
    let server = SimulatedServer::new()
        .with_device(device.clone())
        .with_device(stage_device);

    let controller =
        Tst350TempController::connect(Tst350Temperature, config.controller.clone(), &server)
            .await?;
    controller.add_axis(1).await?;
    controller.set_parameter(1, "velocity", 10.0).await?;
    controller.set_parameter(1, "tolerance", 0.5).await?;

    controller.start_move(1, 40.0).await?;
    loop {
        controller.state_all().await?;
        let state = controller.read_state(1).await?;
        let position = controller.read_position(1).await?;
        info!("Axis 1: {} at {:.1}", state.state, position);
        if !state.is_moving() {
            if state.is_faulted() {
                error!("Move ended with {:?}", state.message);
            }
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    let macros = MacroContext::connect(config.macros.clone(), &server).await?;
    macros.read_status().await?;
    macros.set_pump_mode(PumpMode::Manual).await?;

    let cancel = CancellationToken::new();
    let mut ramp = macros.ramp(20.0, 10.0, None, cancel.clone()).await?;
    info!("Ramp {} towards {:.1}", ramp.id(), ramp.target());
    while let Some(progress) = ramp.next().await {
        match progress {
            Ok(progress) => info!(
                "Current Temp: {:2.4} ({:.0}%)",
                progress.temperature, progress.percent
            ),
            Err(e) => {
                error!("Ramp failed: {:#}", e);
                break;
            }
        }
    }

    let report = macros.run_ramp(30.0, 10.0, None, cancel).await?;
    info!("Ramp report: {}", serde_json::to_string(&report)?);

    macros.stop().await?;
    controller.shutdown().await?;

    let stage_config = ControllerConfig {
        name: "linkam_stage".to_string(),
        device_name: "lab/linkam/stage".to_string(),
        ..ControllerConfig::default()
    };
    let stage = Tst350StageController::connect(Tst350Stage::new(), stage_config, &server).await?;
    for axis in 1..=3 {
        stage.add_axis(axis).await?;
    }
    stage.start_group(&[(1, 120.0), (2, -40.0)]).await?;
    stage.state_all().await?;
    for axis in stage.axes().await {
        let state = stage.read_state(axis).await?;
        let position = stage.read_position(axis).await?;
        info!("Stage axis {}: {} at {}", axis, state.state, position);
    }
    stage.shutdown().await?;
    info!("Simulation finished");
    Ok(())
}
