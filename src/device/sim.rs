use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::Arc,
};

use anyhow::{anyhow, bail, Result};
use tokio::sync::Mutex;
use tracing::debug;

use super::{value::Value, DeviceConnector, DeviceProxy};
use crate::error::LinkamError;

const STAGE_POSITIONS: [&str; 3] = ["PositionX", "PositionY", "PositionZ"];

#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCall {
    Read(String),
    Write(String, Value),
    Command(String, Vec<Value>),
}

#[derive(Debug)]
struct SimState {
    attributes: HashMap<String, Value>,
    temperature_attribute: String,
    script: VecDeque<f64>,
    ramp_step: f64,
    ramp_target: Option<f64>,
    failing: HashSet<String>,
    calls: Vec<DeviceCall>,
}

pub struct SimulatedDevice {
    name: String,
    state: Mutex<SimState>,
}

impl SimulatedDevice {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: Mutex::new(SimState {
                attributes: HashMap::new(),
                temperature_attribute: "Temperature".to_string(),
                script: VecDeque::new(),
                ramp_step: 0.0,
                ramp_target: None,
                failing: HashSet::new(),
                calls: Vec::new(),
            }),
        }
    }

    pub fn tst350(name: &str, temperature: f64) -> Self {
        Self::new(name)
            .with_attribute("Temperature", Value::Float(temperature))
            .with_attribute("IdleT", Value::Bool(true))
            .with_attribute("ErrorMsg", Value::from("No_error"))
            .with_attribute("Program", Value::from("Idle"))
            .with_attribute("Status", Value::from("Stopped"))
            .with_attribute("Pumpspeed", Value::Int(0))
            .with_attribute("PumpMode", Value::Int(0))
    }

    pub fn t96(name: &str, temperature: f64) -> Self {
        let mut device = Self::new(name)
            .with_attribute("temperature", Value::Float(temperature))
            .with_attribute("heater_ramping", Value::Bool(false))
            .with_attribute("ramp_rate", Value::Float(10.0))
            .with_attribute("tst_gap", Value::Float(0.0))
            .with_attribute("tst_stretching", Value::Bool(false))
            .with_attribute("tst_motor_velocity", Value::Int(100));
        device.state.get_mut().temperature_attribute = "temperature".to_string();
        device
    }

    /// X/Y/Z stage at rest at `positions` (in steps).
    pub fn tst350_stage(name: &str, positions: [i64; 3]) -> Self {
        let mut device = Self::new(name).with_attribute("Idle", Value::BoolArray(vec![true; 3]));
        for (attribute, steps) in STAGE_POSITIONS.iter().zip(positions) {
            device = device.with_attribute(attribute, Value::Int(steps));
        }
        device
    }

    pub fn with_attribute(mut self, name: &str, value: Value) -> Self {
        self.state
            .get_mut()
            .attributes
            .insert(name.to_string(), value);
        self
    }

    /// Each temperature read during a ramp moves this many degrees towards
    /// the target.
    pub fn with_ramp_step(mut self, step: f64) -> Self {
        self.state.get_mut().ramp_step = step.abs();
        self
    }

    /// Temperature reads return these values in order before falling back to
    /// the ramp model.
    pub fn with_temperature_script(mut self, readings: impl IntoIterator<Item = f64>) -> Self {
        self.state.get_mut().script.extend(readings);
        self
    }

    pub async fn set_attribute(&self, name: &str, value: Value) {
        self.state
            .lock()
            .await
            .attributes
            .insert(name.to_string(), value);
    }

    pub async fn attribute(&self, name: &str) -> Option<Value> {
        self.state.lock().await.attributes.get(name).cloned()
    }

    /// Makes every read, write or command with this name fail until restored.
    pub async fn fail(&self, name: &str) {
        self.state.lock().await.failing.insert(name.to_string());
    }

    pub async fn restore(&self, name: &str) {
        self.state.lock().await.failing.remove(name);
    }

    pub async fn calls(&self) -> Vec<DeviceCall> {
        self.state.lock().await.calls.clone()
    }

    pub async fn command_count(&self, name: &str) -> usize {
        self.commands(name).await.len()
    }

    pub async fn commands(&self, name: &str) -> Vec<Vec<Value>> {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .filter_map(|call| match call {
                DeviceCall::Command(cmd, args) if cmd == name => Some(args.clone()),
                _ => None,
            })
            .collect()
    }

    pub async fn writes(&self, name: &str) -> Vec<Value> {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .filter_map(|call| match call {
                DeviceCall::Write(attr, value) if attr == name => Some(value.clone()),
                _ => None,
            })
            .collect()
    }
}

impl SimState {
    fn advance_temperature(&mut self) {
        let next = if let Some(reading) = self.script.pop_front() {
            reading
        } else {
            let Some(target) = self.ramp_target else {
                return;
            };
            if self.ramp_step <= 0.0 {
                return;
            }
            let current = self
                .attributes
                .get(&self.temperature_attribute)
                .and_then(Value::as_f64)
                .unwrap_or(target);
            let step = self.ramp_step.min((target - current).abs());
            let next = current + step * (target - current).signum();
            if next == target {
                self.ramp_target = None;
                self.attributes.insert("IdleT".to_string(), Value::Bool(true));
                self.attributes
                    .insert("Program".to_string(), Value::from("Holding"));
            }
            next
        };
        let attribute = self.temperature_attribute.clone();
        self.attributes.insert(attribute, Value::Float(next));
    }

    fn idle_flags(&self) -> Vec<bool> {
        let mut flags = self
            .attributes
            .get("Idle")
            .and_then(Value::as_flags)
            .unwrap_or_default();
        flags.resize(STAGE_POSITIONS.len(), true);
        flags
    }

    fn check(&self, name: &str) -> Result<()> {
        if self.failing.contains(name) {
            bail!("timeout while accessing {}", name);
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl DeviceProxy for SimulatedDevice {
    fn name(&self) -> &str {
        &self.name
    }

    async fn read_attribute(&self, name: &str) -> Result<Value> {
        let mut state = self.state.lock().await;
        state.calls.push(DeviceCall::Read(name.to_string()));
        state.check(name)?;
        if name == state.temperature_attribute {
            state.advance_temperature();
        }
        state
            .attributes
            .get(name)
            .cloned()
            .ok_or_else(|| anyhow!("attribute {} not found on {}", name, self.name))
    }

    async fn write_attribute(&self, name: &str, value: Value) -> Result<()> {
        let mut state = self.state.lock().await;
        state
            .calls
            .push(DeviceCall::Write(name.to_string(), value.clone()));
        state.check(name)?;
        state.attributes.insert(name.to_string(), value);
        Ok(())
    }

    async fn command_inout(&self, name: &str, args: Vec<Value>) -> Result<Value> {
        let mut state = self.state.lock().await;
        state
            .calls
            .push(DeviceCall::Command(name.to_string(), args.clone()));
        state.check(name)?;
        debug!("Simulated {} executing {} {:?}", self.name, name, args);

        match name {
            "StartRamp" => {
                let target = args
                    .get(1)
                    .and_then(Value::as_f64)
                    .ok_or_else(|| anyhow!("StartRamp expects [rate, target]"))?;
                state.ramp_target = Some(target);
                state
                    .attributes
                    .insert("IdleT".to_string(), Value::Bool(false));
                state
                    .attributes
                    .insert("Program".to_string(), Value::from("Ramping"));
            }
            "HoldTemp" | "StopRamp" => {
                state.ramp_target = None;
                state
                    .attributes
                    .insert("IdleT".to_string(), Value::Bool(true));
                let program = if name == "HoldTemp" {
                    "Holding"
                } else {
                    "Stopped"
                };
                state
                    .attributes
                    .insert("Program".to_string(), Value::from(program));
            }
            "MoveAbsolute" => {
                let mut idle = state.idle_flags();
                for (index, (attribute, steps)) in STAGE_POSITIONS.iter().zip(&args).enumerate() {
                    if state.attributes.get(*attribute) != Some(steps) {
                        idle[index] = false;
                    }
                    state.attributes.insert(attribute.to_string(), steps.clone());
                }
                state
                    .attributes
                    .insert("Idle".to_string(), Value::BoolArray(idle));
            }
            "StopXY" | "StopZ" => {
                let stopped = if name == "StopXY" { 0..2 } else { 2..3 };
                let mut idle = state.idle_flags();
                for flag in &mut idle[stopped] {
                    *flag = true;
                }
                state
                    .attributes
                    .insert("Idle".to_string(), Value::BoolArray(idle));
            }
            _ => {}
        }
        Ok(Value::Void)
    }
}

#[derive(Default)]
pub struct SimulatedServer {
    devices: HashMap<String, Arc<SimulatedDevice>>,
}

impl SimulatedServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(mut self, device: Arc<SimulatedDevice>) -> Self {
        self.devices.insert(device.name().to_string(), device);
        self
    }
}

#[async_trait::async_trait]
impl DeviceConnector for SimulatedServer {
    async fn connect(&self, device_name: &str) -> Result<Arc<dyn DeviceProxy>> {
        let device = self
            .devices
            .get(device_name)
            .cloned()
            .ok_or_else(|| LinkamError::UnknownDevice(device_name.to_string()))?;
        Ok(device as Arc<dyn DeviceProxy>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ramp_model_walks_to_target() {
        let device = SimulatedDevice::tst350("sim", 20.0).with_ramp_step(15.0);
        device
            .command_inout("StartRamp", vec![Value::Float(10.0), Value::Float(50.0)])
            .await
            .unwrap();
        assert!(!device.read_bool("IdleT").await.unwrap());

        let mut readings = Vec::new();
        for _ in 0..3 {
            readings.push(device.read_f64("Temperature").await.unwrap());
        }
        assert_eq!(readings, vec![35.0, 50.0, 50.0]);
        assert!(device.read_bool("IdleT").await.unwrap());
    }

    #[tokio::test]
    async fn test_failing_attribute_is_communication_error() {
        let device = SimulatedDevice::tst350("sim", 20.0);
        device.fail("ErrorMsg").await;

        let err = device.read_string("ErrorMsg").await.unwrap_err();
        let err = err.downcast_ref::<LinkamError>().unwrap();
        assert!(err.is_communication());

        device.restore("ErrorMsg").await;
        assert_eq!(device.read_string("ErrorMsg").await.unwrap(), "No_error");
    }

    #[tokio::test]
    async fn test_server_resolves_known_devices_only() {
        let server = SimulatedServer::new()
            .with_device(Arc::new(SimulatedDevice::tst350("lab/linkam/1", 25.0)));

        let device = server.connect("lab/linkam/1").await.unwrap();
        assert_eq!(device.name(), "lab/linkam/1");

        let err = server.connect("lab/linkam/2").await.err().unwrap();
        assert!(matches!(
            err.downcast_ref::<LinkamError>(),
            Some(LinkamError::UnknownDevice(_))
        ));
    }
}
