pub mod axis;
pub mod config;
pub mod device;
pub mod error;
pub mod macros;
pub mod motor_controller;
pub mod ramp;
