//! Lifecycle supervisor: connect → calibrate → stream → stop.
//!
//! The supervisor owns every worker (receiver, processing, writer) and is the
//! single writer of shared parameters: calibration and filter settings change
//! only while streaming is down, soft-zero offsets swap atomically through
//! [`SoftZero`]. All operations run on the control thread with bounded
//! per-call timeouts; nothing here is ever invoked from a worker thread.

use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use eyre::WrapErr;

use netft_proto::rdt::RdtClient;
use netft_proto::resolver::CalibrationResolver;
use netft_proto::{CalibrationInfo, TcpCommandClient, ToolTransform};
use netft_traits::{Clock, MonotonicClock};

use crate::error::NetftError;
use crate::filter::FilterCfg;
use crate::formats::{LogFormat, SessionMeta, TimeRef};
use crate::processing::{ProcessingStage, SoftZero};
use crate::receiver::{Receiver, ReceiverCfg};
use crate::ring::RawRing;
use crate::stats::PipelineStats;
use crate::units::{ForceUnit, TorqueUnit};
use crate::viz::{Series, VizBuffer};
use crate::writer::{LogWriter, WriterCfg};

/// Bounded join applied to every worker on shutdown.
const JOIN_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Calibrating,
    Streaming,
    ErrorRecoverable,
    ErrorFatal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingState {
    Idle,
    Recording,
}

/// Bias operation mode: device tare at the sensor, or local soft zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BiasMode {
    Device,
    Soft,
}

#[derive(Debug, Clone)]
pub struct SupervisorCfg {
    pub udp_port: u16,
    pub tcp_port: u16,
    pub http_port: u16,
    pub connect_timeout: Duration,
    pub auto_reconnect: bool,
    pub reconnect_base_delay: Duration,
    pub reconnect_max_delay: Duration,
    pub reconnect_max_attempts: u32,
    pub receiver: ReceiverCfg,
    pub sample_rate_hz: u32,
    pub filter: FilterCfg,
    pub ring_capacity: usize,
    pub force_unit: ForceUnit,
    pub torque_unit: TorqueUnit,
    pub writer: WriterCfg,
}

impl Default for SupervisorCfg {
    fn default() -> Self {
        Self {
            udp_port: netft_proto::rdt::RDT_PORT,
            tcp_port: netft_proto::tcp::TCP_PORT,
            http_port: netft_proto::http::HTTP_PORT,
            connect_timeout: Duration::from_secs(2),
            auto_reconnect: true,
            reconnect_base_delay: Duration::from_millis(500),
            reconnect_max_delay: Duration::from_secs(30),
            reconnect_max_attempts: 5,
            receiver: ReceiverCfg::default(),
            sample_rate_hz: 1000,
            filter: FilterCfg::default(),
            ring_capacity: crate::ring::DEFAULT_CAPACITY,
            force_unit: ForceUnit::N,
            torque_unit: TorqueUnit::Nm,
            writer: WriterCfg::default(),
        }
    }
}

pub struct Supervisor<C = MonotonicClock>
where
    C: Clock + Clone + Send + 'static,
{
    cfg: SupervisorCfg,
    clock: C,
    state: LinkState,
    recording: RecordingState,
    resolver: CalibrationResolver,
    calibration_override: Option<CalibrationInfo>,
    calibration: Option<CalibrationInfo>,
    sensor_ip: Option<IpAddr>,
    epoch: Instant,
    ring: Option<Arc<RawRing>>,
    viz: Arc<VizBuffer>,
    soft_zero: SoftZero,
    receiver: Option<Receiver>,
    processing: Option<ProcessingStage>,
    writer: Option<LogWriter>,
    rate_probe: Option<(Instant, u64)>,
}

impl Supervisor<MonotonicClock> {
    pub fn new(cfg: SupervisorCfg) -> Self {
        Self::with_clock(cfg, MonotonicClock::new())
    }
}

impl<C> Supervisor<C>
where
    C: Clock + Clone + Send + 'static,
{
    pub fn with_clock(cfg: SupervisorCfg, clock: C) -> Self {
        let resolver =
            CalibrationResolver::new(cfg.http_port, cfg.tcp_port, cfg.connect_timeout);
        let epoch = clock.now();
        Self {
            cfg,
            clock,
            state: LinkState::Disconnected,
            recording: RecordingState::Idle,
            resolver,
            calibration_override: None,
            calibration: None,
            sensor_ip: None,
            epoch,
            ring: None,
            viz: Arc::new(VizBuffer::new()),
            soft_zero: SoftZero::new(),
            receiver: None,
            processing: None,
            writer: None,
            rate_probe: None,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn recording_state(&self) -> RecordingState {
        self.recording
    }

    pub fn calibration(&self) -> Option<&CalibrationInfo> {
        self.calibration.as_ref()
    }

    /// Connect, calibrate, and start streaming. With auto-reconnect enabled,
    /// failed attempts retry with exponential backoff up to the configured
    /// attempt limit; the final failure leaves the supervisor in
    /// ErrorRecoverable.
    pub fn connect(&mut self, ip: IpAddr) -> crate::Result<()> {
        if self.state == LinkState::Streaming {
            return Err(eyre::Report::new(NetftError::State(
                "already streaming; disconnect first".into(),
            )));
        }
        if self.sensor_ip != Some(ip) {
            if let Some(previous) = self.sensor_ip {
                self.resolver.invalidate(previous);
            }
        }
        self.sensor_ip = Some(ip);

        let attempts = if self.cfg.auto_reconnect {
            self.cfg.reconnect_max_attempts.max(1)
        } else {
            1
        };
        let mut delay = self.cfg.reconnect_base_delay;
        let mut last_err = None;

        for attempt in 1..=attempts {
            match self.try_connect_once(ip) {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::warn!(%ip, attempt, error = %e, "connect attempt failed");
                    self.teardown_workers();
                    self.state = LinkState::ErrorRecoverable;
                    last_err = Some(e);
                    if attempt < attempts {
                        self.clock.sleep(delay);
                        delay = (delay * 2).min(self.cfg.reconnect_max_delay);
                    }
                }
            }
        }
        Err(last_err.unwrap_or_else(|| {
            eyre::Report::new(NetftError::State("connect failed without error".into()))
        }))
    }

    fn try_connect_once(&mut self, ip: IpAddr) -> crate::Result<()> {
        self.state = LinkState::Connecting;
        let sensor = SocketAddr::new(ip, self.cfg.udp_port);
        let client = RdtClient::connect(sensor, self.cfg.receiver.receive_timeout)
            .map_err(|e| NetftError::from_proto(&e, &ip.to_string(), self.cfg.udp_port))?;

        self.state = LinkState::Calibrating;
        let calibration = match &self.calibration_override {
            Some(cal) => cal.clone(),
            None => {
                let resolved = self.resolver.resolve(ip).map_err(|e| {
                    let mapped = NetftError::from_proto(&e, &ip.to_string(), self.cfg.tcp_port);
                    match mapped.category() {
                        crate::ErrorCategory::Cal => mapped,
                        _ => NetftError::CalibrationUnavailable(e.to_string()),
                    }
                })?;
                if let Some(http_error) = &resolved.http_error {
                    tracing::info!(%ip, http_error = %http_error, "calibration fell back to tcp");
                }
                resolved.calibration
            }
        };

        let ring = Arc::new(RawRing::new(self.cfg.ring_capacity)?);
        self.viz.clear();
        self.soft_zero.clear();
        self.epoch = self.clock.now();
        self.rate_probe = None;

        let processing = ProcessingStage::spawn(
            Arc::clone(&ring),
            Arc::clone(&self.viz),
            calibration.clone(),
            self.cfg.filter,
            self.cfg.sample_rate_hz,
            self.soft_zero.clone(),
            self.clock.clone(),
        )
        .wrap_err("start processing stage")?;

        let receiver = Receiver::spawn(
            client,
            Arc::clone(&ring),
            self.cfg.receiver.clone(),
            self.clock.clone(),
            self.epoch,
        )
        .wrap_err("start receiver")?;

        self.calibration = Some(calibration);
        self.ring = Some(ring);
        self.processing = Some(processing);
        self.receiver = Some(receiver);
        self.state = LinkState::Streaming;
        tracing::info!(%ip, "streaming");
        Ok(())
    }

    /// Stop recording (if active) and all workers, returning to
    /// Disconnected. A worker that fails its bounded join leaves the
    /// supervisor in ErrorFatal.
    pub fn disconnect(&mut self) -> crate::Result<()> {
        if self.recording == RecordingState::Recording {
            if let Err(e) = self.stop_recording() {
                tracing::warn!(error = %e, "stop recording during disconnect failed");
            }
        }
        self.teardown_workers_checked()?;
        self.calibration = None;
        self.ring = None;
        self.state = LinkState::Disconnected;
        tracing::info!("disconnected");
        Ok(())
    }

    fn teardown_workers(&mut self) {
        if let Some(receiver) = self.receiver.take() {
            let _ = receiver.stop(JOIN_TIMEOUT);
        }
        if let Some(processing) = self.processing.take() {
            let _ = processing.stop(JOIN_TIMEOUT);
        }
        if let Some(writer) = self.writer.take() {
            let _ = writer.stop(JOIN_TIMEOUT);
        }
        self.recording = RecordingState::Idle;
    }

    fn teardown_workers_checked(&mut self) -> crate::Result<()> {
        let mut failed = false;
        if let Some(receiver) = self.receiver.take() {
            if receiver.stop(JOIN_TIMEOUT).is_err() {
                failed = true;
            }
        }
        if let Some(processing) = self.processing.take() {
            if processing.stop(JOIN_TIMEOUT).is_err() {
                failed = true;
            }
        }
        if let Some(writer) = self.writer.take() {
            if writer.stop(JOIN_TIMEOUT).is_err() {
                failed = true;
            }
        }
        self.recording = RecordingState::Idle;
        if failed {
            self.state = LinkState::ErrorFatal;
            return Err(eyre::Report::new(NetftError::State(
                "worker failed to stop within the join timeout".into(),
            )));
        }
        Ok(())
    }

    /// Apply bias. Device mode sends the UDP bias request and falls back to
    /// the TCP READFT form if the send fails; soft mode snapshots the newest
    /// raw counts as local offsets.
    pub fn bias(&mut self, mode: BiasMode) -> crate::Result<()> {
        let ip = self.require_ip()?;
        match mode {
            BiasMode::Device => {
                let sensor = SocketAddr::new(ip, self.cfg.udp_port);
                let udp_result = RdtClient::connect(sensor, Duration::from_millis(100))
                    .and_then(|client| client.send_bias());
                if let Err(udp_err) = udp_result {
                    tracing::warn!(error = %udp_err, "udp bias failed, trying tcp fallback");
                    let tcp = SocketAddr::new(ip, self.cfg.tcp_port);
                    TcpCommandClient::connect(tcp, self.cfg.connect_timeout)
                        .and_then(|mut client| client.send_bias())
                        .map_err(|e| {
                            NetftError::BiasFailed(format!("udp: {udp_err}; tcp: {e}"))
                        })?;
                }
                tracing::info!("device bias applied");
            }
            BiasMode::Soft => {
                let ring = self.ring.as_ref().ok_or_else(|| {
                    NetftError::State("soft bias requires an active stream".into())
                })?;
                let latest = ring.latest(1);
                let rec = latest.first().ok_or_else(|| {
                    NetftError::BiasFailed("no samples received yet".into())
                })?;
                self.soft_zero.capture(rec.counts);
                tracing::info!(counts = ?rec.counts, "soft zero captured");
            }
        }
        Ok(())
    }

    /// Clear local soft-zero offsets.
    pub fn clear_soft_zero(&mut self) {
        self.soft_zero.clear();
    }

    /// Write a tool transform to the sensor. The transform lives in the
    /// sensor; samples are not adjusted locally.
    pub fn set_tool_transform(&mut self, transform: ToolTransform) -> crate::Result<()> {
        let ip = self.require_ip()?;
        let tcp = SocketAddr::new(ip, self.cfg.tcp_port);
        let mut client = TcpCommandClient::connect(tcp, self.cfg.connect_timeout)
            .map_err(|e| NetftError::from_proto(&e, &ip.to_string(), self.cfg.tcp_port))?;
        client
            .write_transform(&transform)
            .map_err(|e| NetftError::from_proto(&e, &ip.to_string(), self.cfg.tcp_port))?;
        tracing::info!(?transform, "tool transform written");
        Ok(())
    }

    /// Override (or clear the override of) the calibration used for
    /// conversion. Only allowed while streaming is down; the processing
    /// stage reads calibration without synchronization by state-machine
    /// convention.
    pub fn set_calibration_override(
        &mut self,
        info: Option<CalibrationInfo>,
    ) -> crate::Result<()> {
        if self.state == LinkState::Streaming {
            return Err(eyre::Report::new(NetftError::State(
                "cannot change calibration while streaming".into(),
            )));
        }
        self.calibration_override = info;
        Ok(())
    }

    /// Start logging to `dir` in `format`. Requires Streaming.
    pub fn start_recording(
        &mut self,
        dir: &Path,
        format: LogFormat,
        prefix: &str,
    ) -> crate::Result<()> {
        if self.state != LinkState::Streaming {
            return Err(eyre::Report::new(NetftError::State(
                "recording requires an active stream".into(),
            )));
        }
        if self.recording == RecordingState::Recording {
            return Err(eyre::Report::new(NetftError::State(
                "already recording".into(),
            )));
        }
        let calibration = self.calibration.clone().ok_or_else(|| {
            NetftError::State("no calibration loaded".into())
        })?;

        let meta = SessionMeta {
            serial: calibration.serial.clone(),
            firmware: calibration.firmware.clone(),
            counts_per_force: calibration.counts_per_force,
            counts_per_torque: calibration.counts_per_torque,
            started_utc: Utc::now(),
            force_unit: self.cfg.force_unit,
            torque_unit: self.cfg.torque_unit,
            filter_cutoff_hz: self.cfg.filter.enabled.then_some(self.cfg.filter.cutoff_hz),
        };
        let time_ref = TimeRef {
            wall: meta.started_utc,
            mono_ns: self.clock.ns_since(self.epoch),
        };
        let mut cfg = self.cfg.writer.clone();
        cfg.format = format;

        let writer = LogWriter::start(dir, prefix, cfg, meta, time_ref)?;
        if let Some(processing) = &self.processing {
            processing.attach_writer(writer.sender());
        }
        self.writer = Some(writer);
        self.recording = RecordingState::Recording;
        Ok(())
    }

    /// Stop logging: detach the queue, drain, flush, close. Returns final
    /// writer statistics.
    pub fn stop_recording(&mut self) -> crate::Result<crate::writer::WriterStats> {
        let writer = self.writer.take().ok_or_else(|| {
            NetftError::State("not recording".into())
        })?;
        if let Some(processing) = &self.processing {
            processing.detach_writer();
        }
        self.recording = RecordingState::Idle;
        writer.stop(JOIN_TIMEOUT)
    }

    /// Snapshot every pipeline counter. The wire rate is estimated from the
    /// packet-count delta since the previous snapshot.
    pub fn snapshot_stats(&mut self) -> PipelineStats {
        let receiver_stats = self
            .receiver
            .as_ref()
            .map(|r| r.stats())
            .unwrap_or_default();

        let now = self.clock.now();
        let samples_per_second = match self.rate_probe {
            Some((then, packets)) => {
                let elapsed = now.saturating_duration_since(then).as_secs_f64();
                if elapsed > 0.0 {
                    (receiver_stats.packets_received.saturating_sub(packets)) as f64 / elapsed
                } else {
                    0.0
                }
            }
            None => 0.0,
        };
        self.rate_probe = Some((now, receiver_stats.packets_received));

        PipelineStats {
            link_state: self.state,
            recording: self.recording,
            receiver: receiver_stats,
            samples_per_second,
            ring: self.ring.as_ref().map(|r| r.stats()),
            processing: self
                .processing
                .as_ref()
                .map(|p| p.stats())
                .unwrap_or_default(),
            writer: self.writer.as_ref().map(|w| w.stats()),
        }
    }

    /// Plot series for the requested window, channels, and point budget.
    pub fn get_series(
        &self,
        window_sec: f64,
        channels: &[usize],
        point_budget: usize,
    ) -> Series {
        self.viz
            .get_series(Duration::from_secs_f64(window_sec.max(0.0)), channels, point_budget)
    }

    fn require_ip(&self) -> crate::Result<IpAddr> {
        self.sensor_ip.ok_or_else(|| {
            eyre::Report::new(NetftError::State("no sensor endpoint configured".into()))
        })
    }
}

impl<C> Drop for Supervisor<C>
where
    C: Clock + Clone + Send + 'static,
{
    fn drop(&mut self) {
        self.teardown_workers();
    }
}
