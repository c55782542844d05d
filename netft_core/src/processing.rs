//! Processing stage: soft zero, counts→SI conversion, filtering, fan-out.
//!
//! Single consumer of the raw ring. Each drained record is optionally
//! soft-zeroed, divided by the calibration factors into newtons and
//! newton-meters, optionally low-pass filtered, then fanned out: the
//! visualization buffer first (in-memory, cannot fail), the writer queue
//! second (try-send, counted drop). The stage never blocks the receiver; if
//! it falls behind far enough for the ring to lap the cursor, the lapped
//! records are counted in `dropped_input`.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel as xch;

use netft_proto::{CalibrationInfo, SampleRecord};
use netft_traits::Clock;

use crate::error::NetftError;
use crate::filter::{butterworth_lowpass, FilterCfg, LowPass};
use crate::ring::RawRing;
use crate::viz::VizBuffer;

/// Records drained from the ring per wakeup.
const DRAIN_BATCH: usize = 256;
/// Idle pause when the ring has nothing new.
const IDLE_SLEEP: Duration = Duration::from_millis(1);

/// Soft-zero offsets shared between the supervisor (writer) and the
/// processing thread (reader). The bias operation swaps the whole array
/// atomically behind a short-held lock; the thread reads it once per batch.
#[derive(Clone, Default)]
pub struct SoftZero {
    inner: Arc<Mutex<Option<[i32; 6]>>>,
}

impl SoftZero {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot `counts` as the new zero reference.
    pub fn capture(&self, counts: [i32; 6]) {
        if let Ok(mut guard) = self.inner.lock() {
            *guard = Some(counts);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut guard) = self.inner.lock() {
            *guard = None;
        }
    }

    pub fn current(&self) -> Option<[i32; 6]> {
        self.inner.lock().ok().and_then(|g| *g)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessingStats {
    pub samples_processed: u64,
    pub dropped_input: u64,
    pub dropped_writer: u64,
}

#[derive(Default)]
struct Shared {
    samples_processed: AtomicU64,
    dropped_input: AtomicU64,
    dropped_writer: AtomicU64,
}

/// Convert one record: soft-zero subtraction, counts→SI, optional filter.
///
/// Offsets use saturating subtraction so a hostile offset cannot overflow.
/// The returned record carries the adjusted counts and the converted
/// (possibly filtered) SI values.
pub fn process_record(
    mut rec: SampleRecord,
    calibration: &CalibrationInfo,
    soft_zero: Option<&[i32; 6]>,
    filter: Option<&mut LowPass>,
) -> SampleRecord {
    if let Some(offsets) = soft_zero {
        for (c, off) in rec.counts.iter_mut().zip(offsets) {
            *c = c.saturating_sub(*off);
        }
    }
    let (force, torque) = calibration.convert_counts(&rec.counts);
    let values = match filter {
        Some(lp) => lp.process([force[0], force[1], force[2], torque[0], torque[1], torque[2]]),
        None => [force[0], force[1], force[2], torque[0], torque[1], torque[2]],
    };
    rec.force_n = Some([values[0], values[1], values[2]]);
    rec.torque_nm = Some([values[3], values[4], values[5]]);
    rec
}

/// Handle to the processing thread.
pub struct ProcessingStage {
    stop: Arc<AtomicBool>,
    shared: Arc<Shared>,
    writer_hook: Arc<Mutex<Option<xch::Sender<SampleRecord>>>>,
    handle: Option<JoinHandle<()>>,
}

impl ProcessingStage {
    /// Validate the filter configuration and start the thread. Filter state
    /// always starts from zero here, so every stream (re)start is free of
    /// leftover transients.
    pub fn spawn<C>(
        ring: Arc<RawRing>,
        viz: Arc<VizBuffer>,
        calibration: CalibrationInfo,
        filter_cfg: FilterCfg,
        sample_rate_hz: u32,
        soft_zero: SoftZero,
        clock: C,
    ) -> crate::Result<Self>
    where
        C: Clock + Send + 'static,
    {
        let mut filter = if filter_cfg.enabled {
            let coeffs = butterworth_lowpass(filter_cfg.cutoff_hz, f64::from(sample_rate_hz.max(1)))?;
            Some(LowPass::new(coeffs))
        } else {
            None
        };

        let stop = Arc::new(AtomicBool::new(false));
        let shared = Arc::new(Shared::default());
        let writer_hook: Arc<Mutex<Option<xch::Sender<SampleRecord>>>> =
            Arc::new(Mutex::new(None));

        let stop_bg = Arc::clone(&stop);
        let shared_bg = Arc::clone(&shared);
        let hook_bg = Arc::clone(&writer_hook);

        let handle = std::thread::Builder::new()
            .name("netft-processing".into())
            .spawn(move || {
                let mut cursor: u64 = 0;
                loop {
                    if stop_bg.load(Ordering::Relaxed) {
                        break;
                    }
                    let drained = ring.drain_from(cursor, DRAIN_BATCH);
                    cursor = drained.next_cursor;
                    if drained.missed > 0 {
                        shared_bg
                            .dropped_input
                            .fetch_add(drained.missed, Ordering::Relaxed);
                        tracing::warn!(missed = drained.missed, "processing lapped by receiver");
                    }
                    if drained.records.is_empty() {
                        clock.sleep(IDLE_SLEEP);
                        continue;
                    }

                    let offsets = soft_zero.current();
                    let writer = hook_bg.lock().ok().and_then(|g| g.clone());
                    for rec in drained.records {
                        let processed =
                            process_record(rec, &calibration, offsets.as_ref(), filter.as_mut());
                        // Infallible fan-out first.
                        if let (Some(force), Some(torque)) =
                            (processed.force_n, processed.torque_nm)
                        {
                            viz.push(
                                processed.t_mono_ns,
                                [force[0], force[1], force[2], torque[0], torque[1], torque[2]],
                            );
                        }
                        shared_bg.samples_processed.fetch_add(1, Ordering::Relaxed);
                        if let Some(tx) = &writer {
                            if tx.try_send(processed).is_err() {
                                shared_bg.dropped_writer.fetch_add(1, Ordering::Relaxed);
                            }
                        }
                    }
                }
            })
            .map_err(|e| NetftError::State(format!("spawn processing thread: {e}")))?;

        Ok(Self {
            stop,
            shared,
            writer_hook,
            handle: Some(handle),
        })
    }

    /// Route processed samples into a writer queue. Replaces any previous
    /// hook; called by the supervisor on start_recording.
    pub fn attach_writer(&self, tx: xch::Sender<SampleRecord>) {
        if let Ok(mut hook) = self.writer_hook.lock() {
            *hook = Some(tx);
        }
    }

    /// Detach the writer queue; called on stop_recording so the writer can
    /// observe channel disconnect and drain.
    pub fn detach_writer(&self) {
        if let Ok(mut hook) = self.writer_hook.lock() {
            *hook = None;
        }
    }

    pub fn stats(&self) -> ProcessingStats {
        ProcessingStats {
            samples_processed: self.shared.samples_processed.load(Ordering::Relaxed),
            dropped_input: self.shared.dropped_input.load(Ordering::Relaxed),
            dropped_writer: self.shared.dropped_writer.load(Ordering::Relaxed),
        }
    }

    /// Cooperative stop with a bounded join.
    pub fn stop(mut self, join_timeout: Duration) -> crate::Result<()> {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let deadline = Instant::now() + join_timeout;
            while !handle.is_finished() {
                if Instant::now() >= deadline {
                    return Err(eyre::Report::new(NetftError::State(
                        "processing thread did not stop in time".into(),
                    )));
                }
                std::thread::sleep(Duration::from_millis(2));
            }
            let _ = handle.join();
        }
        Ok(())
    }
}

impl Drop for ProcessingStage {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cal(cpf: f64, cpt: f64) -> CalibrationInfo {
        CalibrationInfo::new(cpf, cpt).unwrap()
    }

    #[test]
    fn conversion_divides_by_calibration_factors() {
        let rec = SampleRecord::raw(0, 1, 1, 0, [1000, -1000, 5000, 100, -100, 50]);
        let out = process_record(rec, &cal(1e6, 1e6), None, None);
        assert_eq!(out.force_n, Some([0.001, -0.001, 0.005]));
        assert_eq!(out.torque_nm, Some([0.0001, -0.0001, 0.00005]));
    }

    #[test]
    fn soft_zero_subtracts_before_conversion() {
        let offsets = [100, 200, 300, 10, 20, 30];
        let rec = SampleRecord::raw(0, 1, 1, 0, [100, 200, 300, 10, 20, 30]);
        let out = process_record(rec, &cal(1e6, 1e6), Some(&offsets), None);
        assert_eq!(out.counts, [0; 6]);
        assert_eq!(out.force_n, Some([0.0, 0.0, 0.0]));
        assert_eq!(out.torque_nm, Some([0.0, 0.0, 0.0]));
    }

    #[test]
    fn soft_zero_saturates_on_extreme_offsets() {
        let offsets = [i32::MIN, 0, 0, 0, 0, 0];
        let rec = SampleRecord::raw(0, 1, 1, 0, [1, 0, 0, 0, 0, 0]);
        let out = process_record(rec, &cal(1.0, 1.0), Some(&offsets), None);
        assert_eq!(out.counts[0], i32::MAX);
    }

    #[test]
    fn filter_passes_dc_through_after_priming() {
        let coeffs = butterworth_lowpass(10.0, 1000.0).unwrap();
        let mut lp = LowPass::new(coeffs);
        for i in 0..100 {
            let rec = SampleRecord::raw(i, i as u32, i as u32, 0, [500; 6]);
            let out = process_record(rec, &cal(1000.0, 1000.0), None, Some(&mut lp));
            let force = out.force_n.unwrap();
            assert!((force[0] - 0.5).abs() < 1e-9, "sample {i}: {}", force[0]);
        }
    }

    #[test]
    fn soft_zero_handle_swaps_atomically() {
        let sz = SoftZero::new();
        assert_eq!(sz.current(), None);
        sz.capture([1, 2, 3, 4, 5, 6]);
        assert_eq!(sz.current(), Some([1, 2, 3, 4, 5, 6]));
        sz.clear();
        assert_eq!(sz.current(), None);
    }
}
