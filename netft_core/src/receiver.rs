//! UDP receive thread.
//!
//! Owns the RDT client and the hot path: receive, decode, stamp, gap-check,
//! push into the raw ring. One absolute rule holds throughout: nothing on
//! this path blocks on a downstream consumer. The ring overwrites, the
//! statistics are atomics, and the socket timeout (~100 ms) is the only wait.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use netft_proto::rdt::{sequence_gap, RdtClient};
use netft_proto::{ProtoError, SampleRecord};
use netft_traits::Clock;

use crate::error::NetftError;
use crate::ring::RawRing;

/// Pause after a transient socket error before retrying.
const ERROR_BACKOFF: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
pub struct ReceiverCfg {
    /// Socket receive timeout; bounds how quickly stop is observed.
    pub receive_timeout: Duration,
    /// Keep every Nth valid datagram (1 = all). Applies to storage only;
    /// packet statistics count everything on the wire.
    pub decimation_factor: u32,
}

impl Default for ReceiverCfg {
    fn default() -> Self {
        Self {
            receive_timeout: Duration::from_millis(100),
            decimation_factor: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReceiverStats {
    pub packets_received: u64,
    pub packets_lost: u64,
    pub codec_errors: u64,
    pub receive_errors: u64,
}

#[derive(Default)]
struct Shared {
    packets_received: AtomicU64,
    packets_lost: AtomicU64,
    codec_errors: AtomicU64,
    receive_errors: AtomicU64,
}

/// Handle to the receive thread.
pub struct Receiver {
    stop: Arc<AtomicBool>,
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

impl Receiver {
    /// Send the start-infinite request and start the receive loop.
    ///
    /// `epoch` anchors sample timestamps: every record is stamped with
    /// `clock.ns_since(epoch)` at reception.
    pub fn spawn<C>(
        client: RdtClient,
        ring: Arc<RawRing>,
        cfg: ReceiverCfg,
        clock: C,
        epoch: Instant,
    ) -> crate::Result<Self>
    where
        C: Clock + Send + 'static,
    {
        if cfg.decimation_factor == 0 {
            return Err(eyre::Report::new(crate::error::BuildError::InvalidConfig(
                "decimation_factor must be >= 1",
            )));
        }
        let sensor = client.sensor_addr();
        client.start_streaming().map_err(|e| {
            NetftError::from_proto(&e, &sensor.ip().to_string(), sensor.port())
        })?;

        let stop = Arc::new(AtomicBool::new(false));
        let shared = Arc::new(Shared::default());
        let stop_bg = Arc::clone(&stop);
        let shared_bg = Arc::clone(&shared);

        let handle = std::thread::Builder::new()
            .name("netft-receiver".into())
            .spawn(move || {
                let mut last_sequence: Option<u32> = None;
                let mut decim_count: u32 = 0;

                while !stop_bg.load(Ordering::Relaxed) {
                    match client.recv_frame() {
                        Ok(Some(frame)) => {
                            let t_mono_ns = clock.ns_since(epoch);
                            shared_bg.packets_received.fetch_add(1, Ordering::Relaxed);

                            if let Some(last) = last_sequence {
                                let gap = sequence_gap(last, frame.rdt_sequence);
                                if gap > 0 {
                                    shared_bg
                                        .packets_lost
                                        .fetch_add(u64::from(gap), Ordering::Relaxed);
                                }
                            }
                            last_sequence = Some(frame.rdt_sequence);

                            decim_count += 1;
                            if decim_count < cfg.decimation_factor {
                                continue;
                            }
                            decim_count = 0;

                            ring.push(&SampleRecord::raw(
                                t_mono_ns,
                                frame.rdt_sequence,
                                frame.ft_sequence,
                                frame.status,
                                frame.counts,
                            ));
                        }
                        Ok(None) => {} // timeout; loop re-checks stop
                        Err(ProtoError::BadLength { .. } | ProtoError::BadHeader { .. }) => {
                            shared_bg.codec_errors.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(_) => {
                            shared_bg.receive_errors.fetch_add(1, Ordering::Relaxed);
                            if !stop_bg.load(Ordering::Relaxed) {
                                clock.sleep(ERROR_BACKOFF);
                            }
                        }
                    }
                }
                // Ask the sensor to stop; best-effort, the socket may be gone.
                if let Err(e) = client.stop_streaming() {
                    tracing::debug!(error = %e, "stop request failed");
                }
            })
            .map_err(|e| NetftError::State(format!("spawn receiver thread: {e}")))?;

        tracing::info!(%sensor, "streaming started");
        Ok(Self {
            stop,
            shared,
            handle: Some(handle),
        })
    }

    pub fn stats(&self) -> ReceiverStats {
        ReceiverStats {
            packets_received: self.shared.packets_received.load(Ordering::Relaxed),
            packets_lost: self.shared.packets_lost.load(Ordering::Relaxed),
            codec_errors: self.shared.codec_errors.load(Ordering::Relaxed),
            receive_errors: self.shared.receive_errors.load(Ordering::Relaxed),
        }
    }

    /// Cooperative stop: raise the flag, wait out at most one socket timeout
    /// plus slack, then join.
    pub fn stop(mut self, join_timeout: Duration) -> crate::Result<ReceiverStats> {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let deadline = Instant::now() + join_timeout;
            while !handle.is_finished() {
                if Instant::now() >= deadline {
                    return Err(eyre::Report::new(NetftError::State(
                        "receiver thread did not stop in time".into(),
                    )));
                }
                std::thread::sleep(Duration::from_millis(5));
            }
            let _ = handle.join();
        }
        Ok(self.stats())
    }
}

impl Drop for Receiver {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
