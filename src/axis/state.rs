use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AxisState {
    On,
    Moving,
    Alarm,
    Fault,
}

impl std::fmt::Display for AxisState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AxisState::On => "ON",
            AxisState::Moving => "MOVING",
            AxisState::Alarm => "ALARM",
            AxisState::Fault => "FAULT",
        };
        f.write_str(name)
    }
}
