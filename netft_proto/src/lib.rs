//! netft_proto: wire protocols for ATI NETrs force/torque sensors.
//!
//! Three independent device interfaces:
//! - **RDT over UDP** (port 49152): request/response streaming of 36-byte
//!   sample frames (`rdt` module).
//! - **TCP commands** (port 49151): READCALINFO, WRITETRANSFORM, and the
//!   READFT bias fallback (`tcp` module).
//! - **HTTP calibration** (port 80): one XML document with the calibration
//!   scale factors (`http` module).
//!
//! All multi-byte wire values are big-endian. Decoders return typed errors
//! and never panic on malformed input; the `resolver` module combines the
//! HTTP and TCP calibration paths with fallback and per-endpoint caching.

pub mod error;
pub mod http;
pub mod model;
pub mod rdt;
pub mod resolver;
pub mod tcp;

pub use error::{ProtoError, Result};
pub use model::{CalibrationInfo, SampleRecord, ToolTransform};
pub use rdt::{RdtClient, RdtCommand, RdtFrame};
pub use resolver::CalibrationResolver;
pub use tcp::TcpCommandClient;
