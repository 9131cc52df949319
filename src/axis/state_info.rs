use serde::Serialize;

use super::state::AxisState;

pub const COMMUNICATION_PROBLEM: &str = "device server communication problem";
pub const DEADLINE_EXCEEDED: &str = "did not reach desired position";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AxisStateInfo {
    pub state: AxisState,
    pub message: Option<String>,
}

impl AxisStateInfo {
    pub fn new(state: AxisState) -> Self {
        Self {
            state,
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn communication_fault() -> Self {
        Self::new(AxisState::Fault).with_message(COMMUNICATION_PROBLEM)
    }

    pub fn deadline_exceeded() -> Self {
        Self::new(AxisState::Alarm).with_message(DEADLINE_EXCEEDED)
    }

    pub fn is_moving(&self) -> bool {
        self.state == AxisState::Moving
    }

    pub fn is_faulted(&self) -> bool {
        matches!(self.state, AxisState::Alarm | AxisState::Fault)
    }
}
