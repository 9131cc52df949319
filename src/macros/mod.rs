pub mod config;

use std::{path::Path, sync::Arc};

use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    device::{value::Value, DeviceConnector, DeviceProxy},
    error::LinkamError,
    ramp::{
        calibration::CalibrationCache,
        driver::{ActiveRamp, RampDriver, RampProgress, RampRequest, PUMP_SPEED_MAX},
    },
};
use config::MacroConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PumpMode {
    Auto,
    Manual,
    Driven,
}

impl PumpMode {
    pub fn code(&self) -> i64 {
        match self {
            PumpMode::Auto => 0,
            PumpMode::Manual => 1,
            PumpMode::Driven => 2,
        }
    }
}

/// Hook run after every progress value of [`MacroContext::run_ramp`].
#[async_trait::async_trait]
pub trait Checkpoint: Send + Sync {
    async fn checkpoint(&self, progress: &RampProgress);
}

pub struct TracingCheckpoint;

#[async_trait::async_trait]
impl Checkpoint for TracingCheckpoint {
    async fn checkpoint(&self, progress: &RampProgress) {
        debug!(
            "Current Temp: {:2.4} ({:.1}%)",
            progress.temperature, progress.percent
        );
        tokio::task::yield_now().await;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RampOutcome {
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize)]
pub struct RampReport {
    pub ramp_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub initial: f64,
    pub target: f64,
    pub samples: usize,
    pub last_progress: Option<f64>,
    pub final_temperature: f64,
    pub outcome: RampOutcome,
}

pub struct MacroContext {
    config: MacroConfig,
    device: Arc<dyn DeviceProxy>,
    driver: RampDriver,
    calibrations: CalibrationCache,
    checkpoint: Arc<dyn Checkpoint>,
}

impl MacroContext {
    pub fn new(config: MacroConfig, device: Arc<dyn DeviceProxy>) -> Self {
        let driver = RampDriver::new(device.clone(), config.ramp.clone());
        let calibrations = CalibrationCache::new(&config.calibration_cache);
        Self {
            config,
            device,
            driver,
            calibrations,
            checkpoint: Arc::new(TracingCheckpoint),
        }
    }

    pub async fn connect(
        config: MacroConfig,
        connector: &dyn DeviceConnector,
    ) -> anyhow::Result<Self> {
        let device = connector.connect(&config.device_name).await?;
        info!("Linkam macros bound to {}", config.device_name);
        Ok(Self::new(config, device))
    }

    pub fn with_checkpoint(mut self, checkpoint: Arc<dyn Checkpoint>) -> Self {
        self.checkpoint = checkpoint;
        self
    }

    pub fn config(&self) -> &MacroConfig {
        &self.config
    }

    pub async fn read_status(&self) -> anyhow::Result<String> {
        let status = self.device.read_string("Status").await?;
        info!("Linkam Status: {}", status);
        Ok(status)
    }

    pub async fn read_temperature(&self) -> anyhow::Result<f64> {
        let temperature = self
            .device
            .read_f64(&self.config.ramp.temperature_attribute)
            .await?;
        info!("Linkam Temperature: {:.1}", temperature);
        Ok(temperature)
    }

    pub async fn read_pump_speed(&self) -> anyhow::Result<i64> {
        let speed = self
            .device
            .read_i64(&self.config.ramp.pump_speed_attribute)
            .await?;
        info!("Linkam Pumpspeed: {}", speed);
        Ok(speed)
    }

    pub async fn write_pump_speed(&self, speed: i64) -> anyhow::Result<()> {
        if !(0..=PUMP_SPEED_MAX).contains(&speed) {
            return Err(LinkamError::InvalidValue {
                parameter: "pump speed".to_string(),
                value: speed as f64,
                reason: format!("must be within 0..={}", PUMP_SPEED_MAX),
            }
            .into());
        }
        self.device
            .write(&self.config.ramp.pump_speed_attribute, Value::Int(speed))
            .await
    }

    pub async fn set_pump_mode(&self, mode: PumpMode) -> anyhow::Result<()> {
        self.device
            .write("PumpMode", Value::Int(mode.code()))
            .await
    }

    pub async fn start_ramp(&self, rate: f64, temperature: f64) -> anyhow::Result<()> {
        self.device
            .command(
                &self.config.ramp.start_command,
                vec![Value::Float(rate), Value::Float(temperature)],
            )
            .await?;
        info!("Ramp to {} started, check progress with read_status", temperature);
        Ok(())
    }

    pub async fn stop_ramp(&self) -> anyhow::Result<()> {
        self.device.command("StopRamp", Vec::new()).await?;
        Ok(())
    }

    pub async fn hold_temperature(&self) -> anyhow::Result<()> {
        self.device
            .command(&self.config.ramp.hold_command, Vec::new())
            .await?;
        Ok(())
    }

    /// Stops the ramp and hands the pump back to automatic control.
    pub async fn stop(&self) -> anyhow::Result<()> {
        self.stop_ramp().await?;
        self.write_pump_speed(0).await?;
        self.set_pump_mode(PumpMode::Auto).await
    }

    /// Commands a ramp and returns its progress stream. With a pump profile
    /// the table is loaded before anything is sent to the device.
    pub async fn ramp(
        &self,
        target: f64,
        rate: f64,
        pump_profile: Option<&Path>,
        cancel: CancellationToken,
    ) -> anyhow::Result<ActiveRamp> {
        let mut request = RampRequest::new(target, rate);
        if let Some(path) = pump_profile {
            request = request.with_pump_profile(self.calibrations.get(path).await?);
        }
        self.driver.start(request, cancel).await
    }

    pub async fn run_ramp(
        &self,
        target: f64,
        rate: f64,
        pump_profile: Option<&Path>,
        cancel: CancellationToken,
    ) -> anyhow::Result<RampReport> {
        let started_at = Utc::now();
        let mut ramp = self.ramp(target, rate, pump_profile, cancel.clone()).await?;

        let mut samples = 0;
        let mut last: Option<RampProgress> = None;
        while let Some(item) = ramp.next().await {
            let progress = item?;
            samples += 1;
            self.checkpoint.checkpoint(&progress).await;
            last = Some(progress);
        }

        let outcome = if cancel.is_cancelled() {
            warn!("Ramp {} cancelled after {} samples", ramp.id(), samples);
            RampOutcome::Cancelled
        } else {
            RampOutcome::Completed
        };

        Ok(RampReport {
            ramp_id: ramp.id(),
            started_at,
            finished_at: Utc::now(),
            initial: ramp.initial(),
            target: ramp.target(),
            samples,
            last_progress: last.map(|p| p.percent),
            final_temperature: last.map(|p| p.temperature).unwrap_or(ramp.initial()),
            outcome,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::sim::{DeviceCall, SimulatedDevice, SimulatedServer};
    use std::{io::Write, sync::Mutex};

    fn context(device: &Arc<SimulatedDevice>) -> MacroContext {
        MacroContext::new(MacroConfig::default(), device.clone())
    }

    struct CancelAfter {
        remaining: Mutex<usize>,
        cancel: CancellationToken,
    }

    #[async_trait::async_trait]
    impl Checkpoint for CancelAfter {
        async fn checkpoint(&self, _progress: &RampProgress) {
            let mut remaining = self.remaining.lock().unwrap();
            *remaining -= 1;
            if *remaining == 0 {
                self.cancel.cancel();
            }
        }
    }

    #[tokio::test]
    async fn test_stop_sequence() {
        let device = Arc::new(
            SimulatedDevice::tst350("sim", 20.0).with_attribute("PumpMode", Value::Int(1)),
        );
        context(&device).stop().await.unwrap();

        assert_eq!(
            device.calls().await,
            vec![
                DeviceCall::Command("StopRamp".into(), vec![]),
                DeviceCall::Write("Pumpspeed".into(), Value::Int(0)),
                DeviceCall::Write("PumpMode".into(), Value::Int(0)),
            ]
        );
    }

    #[tokio::test]
    async fn test_pump_speed_range_checked_before_device() {
        let device = Arc::new(SimulatedDevice::tst350("sim", 20.0));
        let ctx = context(&device);

        assert!(ctx.write_pump_speed(31).await.is_err());
        assert!(ctx.write_pump_speed(-1).await.is_err());
        assert!(device.calls().await.is_empty());

        ctx.write_pump_speed(12).await.unwrap();
        assert_eq!(ctx.read_pump_speed().await.unwrap(), 12);
    }

    #[tokio::test]
    async fn test_readouts_and_simple_commands() {
        let device = Arc::new(SimulatedDevice::tst350("sim", -12.5));
        let ctx = context(&device);

        assert_eq!(ctx.read_status().await.unwrap(), "Stopped");
        assert_eq!(ctx.read_temperature().await.unwrap(), -12.5);

        ctx.set_pump_mode(PumpMode::Driven).await.unwrap();
        ctx.start_ramp(10.0, 30.0).await.unwrap();
        ctx.hold_temperature().await.unwrap();

        assert_eq!(device.writes("PumpMode").await, vec![Value::Int(2)]);
        assert_eq!(
            device.commands("StartRamp").await,
            vec![vec![Value::Float(10.0), Value::Float(30.0)]]
        );
        assert_eq!(device.command_count("HoldTemp").await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_ramp_with_pump_profile() {
        let mut profile = tempfile::NamedTempFile::new().unwrap();
        profile
            .write_all(b"temperature pumpspeed\n-50 30\n0 10\n50 0\n")
            .unwrap();
        let device = Arc::new(
            SimulatedDevice::tst350("sim", 50.0).with_temperature_script([50.0, 25.0, 0.0]),
        );

        let report = context(&device)
            .run_ramp(0.0, 20.0, Some(profile.path()), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.outcome, RampOutcome::Completed);
        assert_eq!(report.samples, 2);
        assert_eq!(report.last_progress, Some(100.0));
        assert_eq!(report.final_temperature, 0.0);
        assert!(report.finished_at >= report.started_at);
        assert_eq!(
            device.writes("Pumpspeed").await,
            vec![Value::Int(5), Value::Int(10), Value::Int(10)]
        );
    }

    #[tokio::test]
    async fn test_missing_pump_profile_fails_before_device() {
        let device = Arc::new(SimulatedDevice::tst350("sim", 50.0));
        let result = context(&device)
            .ramp(
                0.0,
                20.0,
                Some(Path::new("/nonexistent/profile.txt")),
                CancellationToken::new(),
            )
            .await;

        assert!(result.is_err());
        assert!(device.calls().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_ramp_cancelled_from_checkpoint() {
        let device = Arc::new(SimulatedDevice::tst350("sim", 20.0).with_ramp_step(1.0));
        let cancel = CancellationToken::new();
        let ctx = context(&device).with_checkpoint(Arc::new(CancelAfter {
            remaining: Mutex::new(3),
            cancel: cancel.clone(),
        }));

        let report = ctx.run_ramp(80.0, 5.0, None, cancel).await.unwrap();

        assert_eq!(report.outcome, RampOutcome::Cancelled);
        assert_eq!(report.samples, 3);
        assert_eq!(report.final_temperature, 23.0);
        assert_eq!(device.command_count("HoldTemp").await, 1);
        assert!(device.read_bool("IdleT").await.unwrap());
    }

    #[tokio::test]
    async fn test_report_serialises() {
        let report = RampReport {
            ramp_id: Uuid::nil(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            initial: 20.0,
            target: 20.0,
            samples: 1,
            last_progress: Some(100.0),
            final_temperature: 20.0,
            outcome: RampOutcome::Completed,
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["outcome"], "completed");
        assert_eq!(json["samples"], 1);
    }

    #[tokio::test]
    async fn test_connect_uses_configured_device() {
        let server = SimulatedServer::new()
            .with_device(Arc::new(SimulatedDevice::tst350("bl13/linkam/1", 20.0)));
        let config = MacroConfig {
            device_name: "bl13/linkam/1".to_string(),
            ..MacroConfig::default()
        };

        let ctx = MacroContext::connect(config, &server).await.unwrap();
        assert_eq!(ctx.read_temperature().await.unwrap(), 20.0);

        assert!(MacroContext::connect(MacroConfig::default(), &server)
            .await
            .is_err());
    }
}
