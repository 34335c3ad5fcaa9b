//! Command protocol.
//!
//! Per-device-class command catalogues and the builder that turns a logical
//! command into the final wire payload.

pub mod builder;
pub mod commands;

pub use builder::CommandBuilder;
pub use commands::{CommandDescriptor, DeviceCommand, SpirometerCommand};
