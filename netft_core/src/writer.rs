//! Asynchronous buffered log writer with rotation.
//!
//! A bounded queue decouples the processing stage from disk: `write()` is a
//! try-send that drops (and counts) on overflow instead of blocking. The
//! consumer thread drains in batches, serializes rows, and buffers about
//! 64 KB in memory between flushes. Rotation closes the current part at a
//! flush boundary once it exceeds the size or age threshold and opens the
//! next numbered part with a fresh metadata header.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel as xch;

use netft_proto::SampleRecord;

use crate::error::NetftError;
use crate::filename::build_filename;
use crate::formats::{file_header, format_row, LogFormat, SessionMeta, TimeRef};

/// Queue capacity between processing and the writer thread.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1_000;
/// Rows drained per wakeup.
pub const DEFAULT_BATCH_SIZE: usize = 100;
/// In-memory serialization buffer size.
pub const DEFAULT_BUFFER_BYTES: usize = 64 * 1024;
/// Flush cadence when the buffer does not fill first.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    Running,
    Stopping,
    Stopped,
    Error,
}

impl WriterState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => WriterState::Running,
            1 => WriterState::Stopping,
            2 => WriterState::Stopped,
            _ => WriterState::Error,
        }
    }
}

/// Rotation thresholds. Rotation triggers at the next flush boundary after
/// either limit is crossed.
#[derive(Debug, Clone, Copy)]
pub enum RotationPolicy {
    Disabled,
    Enabled { max_bytes: u64, max_age: Duration },
}

#[derive(Debug, Clone)]
pub struct WriterCfg {
    pub format: LogFormat,
    pub queue_capacity: usize,
    pub batch_size: usize,
    pub buffer_bytes: usize,
    pub flush_interval: Duration,
    pub rotation: RotationPolicy,
    /// fsync each part on finalize (rotation and stop).
    pub fsync_on_finalize: bool,
}

impl Default for WriterCfg {
    fn default() -> Self {
        Self {
            format: LogFormat::Csv,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            batch_size: DEFAULT_BATCH_SIZE,
            buffer_bytes: DEFAULT_BUFFER_BYTES,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            rotation: RotationPolicy::Disabled,
            fsync_on_finalize: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WriterStats {
    pub state: WriterState,
    pub samples_written: u64,
    pub samples_dropped: u64,
    pub bytes_written: u64,
    pub flushes: u64,
    pub rotations: u64,
    pub queue_len: usize,
    pub queue_capacity: usize,
    pub flush_latency_avg_ms: f64,
    /// Paths of all parts opened this session, in order.
    pub parts: Vec<PathBuf>,
}

#[derive(Default)]
struct Shared {
    state: AtomicU8,
    samples_written: AtomicU64,
    samples_dropped: AtomicU64,
    bytes_written: AtomicU64,
    flushes: AtomicU64,
    rotations: AtomicU64,
    flush_latency_us_total: AtomicU64,
    parts: Mutex<Vec<PathBuf>>,
}

impl Shared {
    fn snapshot(&self, queue_len: usize, queue_capacity: usize) -> WriterStats {
        let flushes = self.flushes.load(Ordering::Relaxed);
        let latency_total_us = self.flush_latency_us_total.load(Ordering::Relaxed);
        WriterStats {
            state: WriterState::from_u8(self.state.load(Ordering::Acquire)),
            samples_written: self.samples_written.load(Ordering::Relaxed),
            samples_dropped: self.samples_dropped.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            flushes,
            rotations: self.rotations.load(Ordering::Relaxed),
            queue_len,
            queue_capacity,
            flush_latency_avg_ms: if flushes == 0 {
                0.0
            } else {
                latency_total_us as f64 / flushes as f64 / 1000.0
            },
            parts: self.parts.lock().map(|p| p.clone()).unwrap_or_default(),
        }
    }
}

/// Handle to a recording session. Producers call [`LogWriter::write`] (or
/// clone [`LogWriter::sender`] into the processing stage); the owning thread
/// is joined by [`LogWriter::stop`].
pub struct LogWriter {
    tx: xch::Sender<SampleRecord>,
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
    queue_capacity: usize,
}

struct Part {
    file: File,
    path: PathBuf,
    bytes: u64,
    opened_at: Instant,
}

struct WriterThread {
    rx: xch::Receiver<SampleRecord>,
    shared: Arc<Shared>,
    cfg: WriterCfg,
    meta: SessionMeta,
    time_ref: TimeRef,
    dir: PathBuf,
    prefix: String,
    part_index: u32,
    buf: String,
    buf_rows: u64,
    write_retried: bool,
}

impl LogWriter {
    /// Open the first part and start the writer thread.
    ///
    /// The first open happens on the caller's thread so an unwritable
    /// directory surfaces immediately as `IO-001` instead of a dead writer.
    pub fn start(
        dir: &Path,
        prefix: &str,
        cfg: WriterCfg,
        meta: SessionMeta,
        time_ref: TimeRef,
    ) -> crate::Result<Self> {
        std::fs::create_dir_all(dir)
            .map_err(|_| NetftError::DirectoryNotWritable(dir.display().to_string()))?;

        let queue_capacity = cfg.queue_capacity.max(1);
        let shared = Arc::new(Shared::default());
        let (tx, rx) = xch::bounded(queue_capacity);

        let buf_capacity = cfg.buffer_bytes + 1024;
        let mut thread = WriterThread {
            rx,
            shared: Arc::clone(&shared),
            cfg,
            meta,
            time_ref,
            dir: dir.to_path_buf(),
            prefix: prefix.to_string(),
            part_index: 0,
            buf: String::with_capacity(buf_capacity),
            buf_rows: 0,
            write_retried: false,
        };

        let first_part = thread
            .open_next_part()
            .map_err(|e| NetftError::DirectoryNotWritable(format!("{}: {e}", dir.display())))?;
        tracing::info!(path = %first_part.path.display(), "recording started");

        let handle = std::thread::Builder::new()
            .name("netft-writer".into())
            .spawn(move || thread.run(first_part))
            .map_err(|e| NetftError::WriteFailed {
                path: dir.display().to_string(),
                detail: e.to_string(),
            })?;

        Ok(Self {
            tx,
            shared,
            handle: Some(handle),
            queue_capacity,
        })
    }

    /// Non-blocking enqueue. Returns false (and counts the drop) when the
    /// queue is full or the writer is no longer running.
    pub fn write(&self, rec: SampleRecord) -> bool {
        if self.state() != WriterState::Running {
            self.shared.samples_dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        match self.tx.try_send(rec) {
            Ok(()) => true,
            Err(_) => {
                self.shared.samples_dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// A sender the processing stage can hold; drops on its side are counted
    /// by the processing statistics.
    pub fn sender(&self) -> xch::Sender<SampleRecord> {
        self.tx.clone()
    }

    pub fn state(&self) -> WriterState {
        WriterState::from_u8(self.shared.state.load(Ordering::Acquire))
    }

    pub fn stats(&self) -> WriterStats {
        self.shared.snapshot(self.tx.len(), self.queue_capacity)
    }

    /// Stop the session: signal the thread, let it drain the queue, flush,
    /// fsync, and close. Bounded join; a thread that does not finish within
    /// `join_timeout` is reported as an error and left detached.
    pub fn stop(self, join_timeout: Duration) -> crate::Result<WriterStats> {
        let Self {
            tx,
            shared,
            mut handle,
            queue_capacity,
        } = self;
        shared
            .state
            .compare_exchange(
                WriterState::Running as u8,
                WriterState::Stopping as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .ok();
        drop(tx);

        if let Some(h) = handle.take() {
            let deadline = Instant::now() + join_timeout;
            while !h.is_finished() {
                if Instant::now() >= deadline {
                    return Err(eyre::Report::new(NetftError::CloseFailed {
                        path: "log writer".into(),
                        detail: format!("writer thread did not stop within {join_timeout:?}"),
                    }));
                }
                std::thread::sleep(Duration::from_millis(5));
            }
            let _ = h.join();
        }
        Ok(shared.snapshot(0, queue_capacity))
    }
}

impl WriterThread {
    fn next_part_path(&mut self) -> PathBuf {
        let part = match self.cfg.rotation {
            RotationPolicy::Disabled => None,
            RotationPolicy::Enabled { .. } => {
                self.part_index += 1;
                Some(self.part_index)
            }
        };
        let name = build_filename(
            &self.prefix,
            self.meta.started_utc,
            part,
            self.cfg.format.extension(),
        );
        self.dir.join(name)
    }

    /// Open the next part and write its header.
    fn open_next_part(&mut self) -> std::io::Result<Part> {
        let path = self.next_part_path();
        let mut file = File::create(&path)?;
        let header = file_header(self.cfg.format, &self.meta);
        file.write_all(header.as_bytes())?;
        self.shared
            .bytes_written
            .fetch_add(header.len() as u64, Ordering::Relaxed);
        if let Ok(mut parts) = self.shared.parts.lock() {
            parts.push(path.clone());
        }
        Ok(Part {
            file,
            path,
            bytes: header.len() as u64,
            opened_at: Instant::now(),
        })
    }

    fn serialize(&mut self, rec: &SampleRecord) {
        let row = format_row(
            self.cfg.format,
            rec,
            &self.time_ref,
            self.meta.force_unit,
            self.meta.torque_unit,
        );
        self.buf.push_str(&row);
        self.buf_rows += 1;
    }

    fn state(&self) -> WriterState {
        WriterState::from_u8(self.shared.state.load(Ordering::Acquire))
    }

    fn run(mut self, first_part: Part) {
        let mut part = first_part;
        let mut last_flush = Instant::now();
        let mut disconnected = false;

        loop {
            match self.state() {
                WriterState::Error => return,
                WriterState::Stopping => break,
                _ => {}
            }
            if disconnected {
                break;
            }

            let timeout = self
                .cfg
                .flush_interval
                .saturating_sub(last_flush.elapsed())
                .clamp(Duration::from_millis(1), Duration::from_millis(50));

            match self.rx.recv_timeout(timeout) {
                Ok(rec) => {
                    self.serialize(&rec);
                    // Drain the rest of the batch without sleeping.
                    for _ in 1..self.cfg.batch_size {
                        match self.rx.try_recv() {
                            Ok(rec) => self.serialize(&rec),
                            Err(_) => break,
                        }
                    }
                }
                Err(xch::RecvTimeoutError::Timeout) => {}
                Err(xch::RecvTimeoutError::Disconnected) => disconnected = true,
            }

            let due = self.buf.len() >= self.cfg.buffer_bytes
                || last_flush.elapsed() >= self.cfg.flush_interval;
            if due {
                if !self.flush(&mut part) {
                    return; // second failure; state already Error
                }
                last_flush = Instant::now();
                if self.rotation_due(&part) {
                    match self.rotate(part) {
                        Some(next) => part = next,
                        None => return,
                    }
                }
            }
        }

        // Stop requested or producers gone: drain what is queued, flush,
        // finalize, and report Stopped.
        while let Ok(rec) = self.rx.try_recv() {
            self.serialize(&rec);
            if self.buf.len() >= self.cfg.buffer_bytes && !self.flush(&mut part) {
                return;
            }
        }
        if !self.flush(&mut part) {
            return;
        }
        self.finalize(part);
        self.shared
            .state
            .store(WriterState::Stopped as u8, Ordering::Release);
        tracing::info!("recording stopped");
    }

    /// Write and flush the buffer. One retry at the next batch boundary; a
    /// second consecutive failure transitions to Error and stops the thread,
    /// leaving streaming untouched.
    fn flush(&mut self, part: &mut Part) -> bool {
        if self.buf.is_empty() {
            return true;
        }
        let started = Instant::now();
        let result = part
            .file
            .write_all(self.buf.as_bytes())
            .and_then(|()| part.file.flush());
        match result {
            Ok(()) => {
                let bytes = self.buf.len() as u64;
                part.bytes += bytes;
                self.shared.bytes_written.fetch_add(bytes, Ordering::Relaxed);
                self.shared
                    .samples_written
                    .fetch_add(self.buf_rows, Ordering::Relaxed);
                self.shared.flushes.fetch_add(1, Ordering::Relaxed);
                self.shared.flush_latency_us_total.fetch_add(
                    started.elapsed().as_micros().min(u128::from(u64::MAX)) as u64,
                    Ordering::Relaxed,
                );
                self.buf.clear();
                self.buf_rows = 0;
                self.write_retried = false;
                true
            }
            Err(e) => {
                if self.write_retried {
                    tracing::error!(path = %part.path.display(), error = %e,
                        "write failed twice, stopping recording");
                    self.shared
                        .state
                        .store(WriterState::Error as u8, Ordering::Release);
                    false
                } else {
                    tracing::warn!(path = %part.path.display(), error = %e,
                        "write failed, will retry at next batch");
                    self.write_retried = true;
                    true
                }
            }
        }
    }

    fn rotation_due(&self, part: &Part) -> bool {
        match self.cfg.rotation {
            RotationPolicy::Disabled => false,
            RotationPolicy::Enabled { max_bytes, max_age } => {
                part.bytes >= max_bytes || part.opened_at.elapsed() >= max_age
            }
        }
    }

    /// Finalize the full part and open the next one. Returns None (writer in
    /// Error state) when the new part cannot be opened.
    fn rotate(&mut self, part: Part) -> Option<Part> {
        let closed = part.path.clone();
        self.finalize(part);
        match self.open_next_part() {
            Ok(next) => {
                self.shared.rotations.fetch_add(1, Ordering::Relaxed);
                tracing::info!(closed = %closed.display(), next = %next.path.display(),
                    "log rotated");
                Some(next)
            }
            Err(e) => {
                tracing::error!(error = %e, "rotation failed to open next part");
                self.shared
                    .state
                    .store(WriterState::Error as u8, Ordering::Release);
                None
            }
        }
    }

    fn finalize(&mut self, mut part: Part) {
        if let Err(e) = part.file.flush() {
            tracing::warn!(path = %part.path.display(), error = %e, "final flush failed");
        }
        if self.cfg.fsync_on_finalize {
            if let Err(e) = part.file.sync_all() {
                tracing::warn!(path = %part.path.display(), error = %e, "fsync failed");
            }
        }
    }
}
