use std::{
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::Duration,
};

use futures::{
    stream::{self, BoxStream, Fuse, FusedStream},
    Stream, StreamExt,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{calibration::CalibrationTable, config::RampConfig};
use crate::{
    device::{value::Value, DeviceProxy},
    error::LinkamError,
};

pub const PUMP_SPEED_MAX: i64 = 30;

#[derive(Debug, Clone)]
pub struct RampRequest {
    pub target: f64,
    /// Passed to the start command untouched; its unit is the device's.
    pub rate: f64,
    pub pump_profile: Option<Arc<CalibrationTable>>,
}

impl RampRequest {
    pub fn new(target: f64, rate: f64) -> Self {
        Self {
            target,
            rate,
            pump_profile: None,
        }
    }

    pub fn with_pump_profile(mut self, profile: Arc<CalibrationTable>) -> Self {
        self.pump_profile = Some(profile);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RampDirection {
    Up,
    Down,
}

impl RampDirection {
    pub fn between(initial: f64, target: f64) -> Self {
        if target > initial {
            RampDirection::Up
        } else {
            RampDirection::Down
        }
    }

    pub fn reached(&self, current: f64, target: f64) -> bool {
        match self {
            RampDirection::Up => current >= target,
            RampDirection::Down => current <= target,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RampProgress {
    /// Share of the temperature span covered, within `[0, 100]`.
    pub percent: f64,
    pub temperature: f64,
    pub pump_speed: Option<i64>,
}

impl RampProgress {
    pub fn percent(initial: f64, target: f64, current: f64) -> Option<f64> {
        if target == initial {
            return None;
        }
        let percent = 100.0 * (current - initial) / (target - initial);
        Some(percent.clamp(0.0, 100.0))
    }
}

/// Pump setpoint for `temperature`, truncated to the device's integer range.
pub fn pump_speed_for(profile: &CalibrationTable, temperature: f64) -> i64 {
    (profile.interpolate(temperature) as i64).clamp(0, PUMP_SPEED_MAX)
}

pub struct RampDriver {
    device: Arc<dyn DeviceProxy>,
    config: RampConfig,
}

impl RampDriver {
    pub fn new(device: Arc<dyn DeviceProxy>, config: RampConfig) -> Self {
        Self { device, config }
    }

    /// Commands the ramp and returns its progress stream. Fails without
    /// touching the device beyond the initial read if that read fails.
    pub async fn start(
        &self,
        request: RampRequest,
        cancel: CancellationToken,
    ) -> anyhow::Result<ActiveRamp> {
        if !(request.rate.is_finite() && request.rate > 0.0) {
            return Err(LinkamError::InvalidValue {
                parameter: "rate".to_string(),
                value: request.rate,
                reason: "ramp rate must be positive".to_string(),
            }
            .into());
        }
        if !request.target.is_finite() {
            return Err(LinkamError::InvalidValue {
                parameter: "target".to_string(),
                value: request.target,
                reason: "target temperature must be finite".to_string(),
            }
            .into());
        }

        let id = Uuid::new_v4();
        let initial = self
            .device
            .read_f64(&self.config.temperature_attribute)
            .await?;
        let direction = RampDirection::between(initial, request.target);

        let phase = if initial == request.target {
            if self.config.reject_degenerate {
                return Err(LinkamError::DegenerateRamp {
                    temperature: initial,
                }
                .into());
            }
            info!(
                "Ramp {}: already at {:.2}, nothing to do",
                id, request.target
            );
            Phase::Degenerate
        } else {
            if request.pump_profile.is_some() && direction == RampDirection::Up {
                self.device
                    .write(&self.config.pump_speed_attribute, Value::Int(0))
                    .await?;
            }
            self.device
                .command(
                    &self.config.start_command,
                    vec![Value::Float(request.rate), Value::Float(request.target)],
                )
                .await?;
            info!(
                "Ramp {}: {:.2} -> {:.2} at rate {} ({:?}, pump profile: {})",
                id,
                initial,
                request.target,
                request.rate,
                direction,
                request.pump_profile.is_some()
            );
            Phase::Polling
        };

        let run = RampRun {
            id,
            device: self.device.clone(),
            temperature_attribute: self.config.temperature_attribute.clone(),
            pump_speed_attribute: self.config.pump_speed_attribute.clone(),
            hold_command: self.config.hold_command.clone(),
            poll_interval: self.config.poll_interval(),
            pump_profile: request.pump_profile,
            cancel,
            initial,
            target: request.target,
            current: initial,
            direction,
            phase,
        };

        let stream = stream::unfold(run, |mut run| async move {
            let item = run.step().await?;
            Some((item, run))
        })
        .boxed()
        .fuse();

        Ok(ActiveRamp {
            id,
            initial,
            target: request.target,
            direction,
            stream,
        })
    }
}

/// Progress feed of one commanded ramp. Keeps returning `None` once ended.
pub struct ActiveRamp {
    id: Uuid,
    initial: f64,
    target: f64,
    direction: RampDirection,
    stream: Fuse<BoxStream<'static, anyhow::Result<RampProgress>>>,
}

impl ActiveRamp {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn initial(&self) -> f64 {
        self.initial
    }

    pub fn target(&self) -> f64 {
        self.target
    }

    pub fn direction(&self) -> RampDirection {
        self.direction
    }
}

impl Stream for ActiveRamp {
    type Item = anyhow::Result<RampProgress>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.stream.poll_next_unpin(cx)
    }
}

impl FusedStream for ActiveRamp {
    fn is_terminated(&self) -> bool {
        self.stream.is_terminated()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Degenerate,
    Polling,
    Done,
}

struct RampRun {
    id: Uuid,
    device: Arc<dyn DeviceProxy>,
    temperature_attribute: String,
    pump_speed_attribute: String,
    hold_command: String,
    poll_interval: Duration,
    pump_profile: Option<Arc<CalibrationTable>>,
    cancel: CancellationToken,
    initial: f64,
    target: f64,
    current: f64,
    direction: RampDirection,
    phase: Phase,
}

impl RampRun {
    async fn step(&mut self) -> Option<anyhow::Result<RampProgress>> {
        if self.phase == Phase::Done {
            return None;
        }
        if self.cancel.is_cancelled() {
            if self.phase == Phase::Degenerate {
                // no ramp was commanded, nothing to hold
                self.phase = Phase::Done;
                return None;
            }
            return self.hold().await;
        }

        match self.phase {
            Phase::Degenerate => {
                self.phase = Phase::Done;
                Some(Ok(RampProgress {
                    percent: 100.0,
                    temperature: self.current,
                    pump_speed: None,
                }))
            }
            Phase::Polling => {
                if self.direction.reached(self.current, self.target) {
                    return self.settle().await;
                }

                let cancelled = tokio::select! {
                    _ = self.cancel.cancelled() => true,
                    _ = tokio::time::sleep(self.poll_interval) => false,
                };
                if cancelled {
                    return self.hold().await;
                }

                match self.poll().await {
                    Ok(progress) => Some(Ok(progress)),
                    Err(e) => {
                        error!("Ramp {}: polling failed: {:#}", self.id, e);
                        self.phase = Phase::Done;
                        Some(Err(e))
                    }
                }
            }
            Phase::Done => None,
        }
    }

    async fn poll(&mut self) -> anyhow::Result<RampProgress> {
        let temperature = self.device.read_f64(&self.temperature_attribute).await?;
        self.current = temperature;

        let pump_speed = match (&self.pump_profile, self.direction) {
            (Some(profile), RampDirection::Down) => {
                let speed = pump_speed_for(profile, temperature);
                self.write_pump_speed(speed).await?;
                Some(speed)
            }
            _ => None,
        };

        let percent = RampProgress::percent(self.initial, self.target, temperature).unwrap_or(100.0);
        debug!(
            "Ramp {}: {:.4} ({:.1}%, pump {:?})",
            self.id, temperature, percent, pump_speed
        );
        Ok(RampProgress {
            percent,
            temperature,
            pump_speed,
        })
    }

    async fn write_pump_speed(&self, speed: i64) -> anyhow::Result<()> {
        self.device
            .write(&self.pump_speed_attribute, Value::Int(speed))
            .await
    }

    async fn settle(&mut self) -> Option<anyhow::Result<RampProgress>> {
        self.phase = Phase::Done;
        if let Some(profile) = self.pump_profile.clone() {
            let speed = pump_speed_for(&profile, self.current);
            if let Err(e) = self.write_pump_speed(speed).await {
                error!("Ramp {}: final pump speed write failed: {:#}", self.id, e);
                return Some(Err(e));
            }
        }
        info!("Ramp {}: reached {:.2}", self.id, self.current);
        None
    }

    async fn hold(&mut self) -> Option<anyhow::Result<RampProgress>> {
        self.phase = Phase::Done;
        warn!(
            "Ramp {}: cancelled at {:.2}, holding temperature",
            self.id, self.current
        );
        match self.device.command(&self.hold_command, Vec::new()).await {
            Ok(_) => None,
            Err(e) => Some(Err(e)),
        }
    }
}
