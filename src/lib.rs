//! Host-side client for the PSA sensor self-test serial protocol.
//!
//! A device running sensor self-tests (an MLX90640 IR thermal camera
//! and a VL53L0X time-of-flight sensor) speaks a length-prefixed,
//! CRC-8-guarded framing over a byte stream. This crate implements
//! the host side: frame encode/decode, an incremental resynchronising
//! parser, and a request/reply client built on top of it.
//!
//! ```no_run
//! use std::time::Duration;
//! use psa_protocol::{ClientConfig, PsaClient};
//! # #[cfg(feature = "serial")]
//! use psa_protocol::{SerialTransport, Transport};
//!
//! # #[cfg(feature = "serial")]
//! # fn main() -> Result<(), psa_protocol::PsaError> {
//! let mut transport = SerialTransport::new("/dev/ttyUSB0", 115_200);
//! transport.open()?;
//! let mut client = PsaClient::new(transport, ClientConfig {
//!     response_timeout: Duration::from_millis(500),
//! });
//! let (major, minor, patch) = client.ping()?;
//! println!("firmware {major}.{minor}.{patch}");
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "serial"))]
//! # fn main() {}
//! ```

mod client;
mod constants;
mod crc;
mod error;
mod frame;
mod sensors;
mod transport;

#[cfg(feature = "async-client")]
mod async_client;

pub use client::{ClientConfig, PsaClient};
pub use constants::{Command, ErrorCode, Response, SensorId, TestStatus, ETX, MAX_PAYLOAD, STX};
pub use crc::Crc8;
pub use error::PsaError;
pub use frame::{Frame, FrameBuilder, FrameParser, ParseResult};
pub use sensors::{
    MLX90640Result, MLX90640Spec, SensorInfo, SensorResult, SpecKind, TestReport, TestResult,
    VL53L0XResult, VL53L0XSpec,
};
pub use transport::{LoopbackTransport, Transport};

#[cfg(feature = "serial")]
pub use transport::SerialTransport;

#[cfg(feature = "async-client")]
pub use async_client::AsyncPsaClient;
