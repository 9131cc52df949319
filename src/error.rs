#[derive(Debug)]
pub enum LinkamError {
    Communication { operation: String, reason: String },
    UnsupportedParameter { parameter: String, axis: u32, role: String },
    UnsupportedAxis { axis: u32, controller: String },
    AxisNotAdded(u32),
    InvalidValue { parameter: String, value: f64, reason: String },
    UnexpectedValue { attribute: String, expected: &'static str, found: String },
    DegenerateRamp { temperature: f64 },
    Calibration { line: usize, reason: String },
    UnknownDevice(String),
    Io(std::io::Error),
}

impl LinkamError {
    pub fn communication(operation: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        LinkamError::Communication {
            operation: operation.into(),
            reason: reason.to_string(),
        }
    }

    pub fn is_communication(&self) -> bool {
        matches!(self, LinkamError::Communication { .. })
    }
}

impl std::fmt::Display for LinkamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkamError::Communication { operation, reason } => {
                write!(f, "Device communication error during {}: {}", operation, reason)
            }
            LinkamError::UnsupportedParameter {
                parameter,
                axis,
                role,
            } => write!(
                f,
                "Unsupported parameter: {} is not supported for axis {} ({})",
                parameter, axis, role
            ),
            LinkamError::UnsupportedAxis { axis, controller } => {
                write!(f, "Unsupported axis: {} in controller {}", axis, controller)
            }
            LinkamError::AxisNotAdded(axis) => write!(f, "Axis {} has not been added", axis),
            LinkamError::InvalidValue {
                parameter,
                value,
                reason,
            } => write!(f, "Invalid value {} for {}: {}", value, parameter, reason),
            LinkamError::UnexpectedValue {
                attribute,
                expected,
                found,
            } => write!(
                f,
                "Unexpected value for {}: expected {}, found {}",
                attribute, expected, found
            ),
            LinkamError::DegenerateRamp { temperature } => write!(
                f,
                "Degenerate ramp: target equals current temperature {}",
                temperature
            ),
            LinkamError::Calibration { line, reason } => {
                write!(f, "Calibration table error at line {}: {}", line, reason)
            }
            LinkamError::UnknownDevice(name) => write!(f, "Unknown device: {}", name),
            LinkamError::Io(err) => write!(f, "IO error: {}", err),
        }
    }
}

impl std::error::Error for LinkamError {}

impl From<std::io::Error> for LinkamError {
    fn from(err: std::io::Error) -> Self {
        LinkamError::Io(err)
    }
}
