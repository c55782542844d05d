#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Core acquisition pipeline (GUI-agnostic).
//!
//! This crate provides the concurrent data path from UDP socket to plots and
//! log files. The wire protocols live in `netft_proto`; everything here is
//! about moving samples without ever blocking the receive path.
//!
//! ## Architecture
//!
//! - **Receiver**: dedicated UDP thread; sequence-gap accounting; writes into
//!   the raw ring (`receiver` module)
//! - **Ring**: fixed-capacity overwrite-on-full sample store with a consumer
//!   cursor (`ring` module)
//! - **Processing**: soft-zero, counts→SI conversion, optional Butterworth
//!   low-pass, fan-out to visualization and the writer queue (`processing`,
//!   `filter`, `units` modules)
//! - **Visualization**: raw tier plus three min/max bucket tiers covering
//!   1 s to 7 day windows (`viz` module)
//! - **Writer**: bounded-queue batching file writer with rotation (`writer`,
//!   `formats`, `filename` modules)
//! - **Supervisor**: connect → calibrate → stream lifecycle and the public
//!   operation surface (`supervisor` module)
//!
//! ## Data flow
//!
//! receiver → raw ring → processing → (visualization buffer, writer queue)
//!
//! Three owned threads (receiver, processing, writer) plus the invoking
//! control thread. Every queue is bounded and drops rather than blocks; the
//! drops are counted and visible in [`stats::PipelineStats`].

pub mod conversions;
pub mod error;
pub mod filename;
pub mod filter;
pub mod formats;
pub mod processing;
pub mod receiver;
pub mod ring;
pub mod stats;
pub mod supervisor;
pub mod units;
pub mod viz;
pub mod writer;

pub use error::{ErrorCategory, NetftError, RecoveryAction, Result};
pub use netft_proto::{CalibrationInfo, SampleRecord, ToolTransform};
pub use processing::{ProcessingStage, SoftZero};
pub use receiver::Receiver;
pub use ring::RawRing;
pub use stats::PipelineStats;
pub use supervisor::{BiasMode, LinkState, RecordingState, Supervisor, SupervisorCfg};
pub use viz::VizBuffer;
pub use writer::LogWriter;
