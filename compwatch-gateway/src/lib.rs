//! # compwatch-gateway
//!
//! Client for the device gateway fronting the controllers, and the
//! [`DeviceReader`] seam the sync engine reads registers through.
//!
//! Reads come back in device-native integer units. A register the gateway did
//! not report, or reported as something other than an integer, is absent;
//! it is never coerced to zero.

pub mod client;
pub mod error;
pub mod reader;
pub mod wire;

pub use client::{GatewayClient, GatewayTimeouts};
pub use error::GatewayError;
pub use reader::{
    merge_axes, read_coordinates, read_tools, DeviceReader, GatewayReader, ReadMode, ReadOutcome,
};
