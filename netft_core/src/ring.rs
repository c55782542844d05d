//! Fixed-capacity ring buffer for raw sample records.
//!
//! Parallel column storage with overwrite-on-full semantics: the receiver
//! appends at full rate and is never blocked; the processing stage follows
//! with a cursor and readers take bounded snapshots. A single short-held lock
//! guards write-pointer advancement and snapshot reads.

use std::sync::Mutex;

use netft_proto::SampleRecord;

/// Default capacity: 60 seconds at 1000 Hz.
pub const DEFAULT_CAPACITY: usize = 60_000;

/// Point-in-time counters for the ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingStats {
    pub capacity: usize,
    pub size: usize,
    pub total_written: u64,
    pub overwrites: u64,
}

impl RingStats {
    pub fn fill_ratio(&self) -> f64 {
        if self.capacity == 0 {
            0.0
        } else {
            self.size as f64 / self.capacity as f64
        }
    }
}

/// Result of a cursor drain: records in reception order, the cursor to pass
/// next time, and how many records were overwritten before they could be
/// drained (counted as `dropped_input` by the processing stage).
#[derive(Debug)]
pub struct Drained {
    pub records: Vec<SampleRecord>,
    pub next_cursor: u64,
    pub missed: u64,
}

struct RingInner {
    t_mono_ns: Vec<u64>,
    rdt_sequence: Vec<u32>,
    ft_sequence: Vec<u32>,
    status: Vec<u32>,
    counts: Vec<[i32; 6]>,
    head: usize,
    size: usize,
    total_written: u64,
    overwrites: u64,
}

impl RingInner {
    /// Slot of the record with global write index `g`.
    /// Valid for g in [total_written - size, total_written).
    fn slot_of(&self, g: u64, capacity: usize) -> usize {
        let back = (self.total_written - g) as usize;
        (self.head + capacity - back) % capacity
    }

    fn record_at(&self, slot: usize) -> SampleRecord {
        SampleRecord::raw(
            self.t_mono_ns[slot],
            self.rdt_sequence[slot],
            self.ft_sequence[slot],
            self.status[slot],
            self.counts[slot],
        )
    }
}

pub struct RawRing {
    capacity: usize,
    inner: Mutex<RingInner>,
}

impl RawRing {
    pub fn new(capacity: usize) -> crate::Result<Self> {
        if capacity == 0 {
            return Err(eyre::Report::new(crate::error::BuildError::InvalidConfig(
                "ring capacity must be > 0",
            )));
        }
        Ok(Self {
            capacity,
            inner: Mutex::new(RingInner {
                t_mono_ns: vec![0; capacity],
                rdt_sequence: vec![0; capacity],
                ft_sequence: vec![0; capacity],
                status: vec![0; capacity],
                counts: vec![[0; 6]; capacity],
                head: 0,
                size: 0,
                total_written: 0,
                overwrites: 0,
            }),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append one record, overwriting the oldest when full. Never blocks
    /// beyond the short slot write.
    pub fn push(&self, rec: &SampleRecord) {
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        let idx = inner.head;
        inner.t_mono_ns[idx] = rec.t_mono_ns;
        inner.rdt_sequence[idx] = rec.rdt_sequence;
        inner.ft_sequence[idx] = rec.ft_sequence;
        inner.status[idx] = rec.status;
        inner.counts[idx] = rec.counts;
        inner.head = (idx + 1) % self.capacity;
        inner.total_written += 1;
        if inner.size < self.capacity {
            inner.size += 1;
        } else {
            inner.overwrites += 1;
        }
    }

    pub fn stats(&self) -> RingStats {
        let inner = match self.inner.lock() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        };
        RingStats {
            capacity: self.capacity,
            size: inner.size,
            total_written: inner.total_written,
            overwrites: inner.overwrites,
        }
    }

    /// Snapshot of the `n` most recent records in reception order.
    pub fn latest(&self, n: usize) -> Vec<SampleRecord> {
        let inner = match self.inner.lock() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        };
        let n = n.min(inner.size);
        let first = inner.total_written - n as u64;
        (0..n)
            .map(|i| {
                let slot = inner.slot_of(first + i as u64, self.capacity);
                inner.record_at(slot)
            })
            .collect()
    }

    /// Drain records written since `cursor`, at most `max` at a time.
    ///
    /// The cursor is a global write index (starts at 0). Records that were
    /// overwritten before the consumer got to them are reported in `missed`
    /// and skipped, so a stalled consumer resynchronizes at the oldest
    /// surviving record instead of reading torn data.
    pub fn drain_from(&self, cursor: u64, max: usize) -> Drained {
        let inner = match self.inner.lock() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        };
        let first_available = inner.total_written - inner.size as u64;
        let missed = first_available.saturating_sub(cursor);
        let start = cursor.max(first_available);
        let available = (inner.total_written - start) as usize;
        let take = available.min(max);
        let records = (0..take)
            .map(|i| {
                let slot = inner.slot_of(start + i as u64, self.capacity);
                inner.record_at(slot)
            })
            .collect();
        Drained {
            records,
            next_cursor: start + take as u64,
            missed,
        }
    }

    /// Reset the buffer and its counters for a new stream.
    pub fn clear(&self) {
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        inner.head = 0;
        inner.size = 0;
        inner.total_written = 0;
        inner.overwrites = 0;
        // Columns are not zeroed; size tracks validity.
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(seq: u32) -> SampleRecord {
        SampleRecord::raw(u64::from(seq) * 1_000_000, seq, seq, 0, [seq as i32; 6])
    }

    #[test]
    fn stores_min_of_n_and_capacity_in_order() {
        let ring = RawRing::new(4).unwrap();
        for s in 1..=3 {
            ring.push(&rec(s));
        }
        let all = ring.latest(10);
        assert_eq!(all.len(), 3);
        assert_eq!(
            all.iter().map(|r| r.rdt_sequence).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );

        for s in 4..=9 {
            ring.push(&rec(s));
        }
        let all = ring.latest(10);
        assert_eq!(all.len(), 4);
        assert_eq!(
            all.iter().map(|r| r.rdt_sequence).collect::<Vec<_>>(),
            vec![6, 7, 8, 9]
        );

        let stats = ring.stats();
        assert_eq!(stats.total_written, 9);
        assert_eq!(stats.overwrites, 5);
        assert_eq!(stats.size, 4);
    }

    #[test]
    fn latest_clamps_to_size() {
        let ring = RawRing::new(8).unwrap();
        ring.push(&rec(1));
        assert_eq!(ring.latest(100).len(), 1);
        assert_eq!(ring.latest(0).len(), 0);
    }

    #[test]
    fn drain_follows_writes() {
        let ring = RawRing::new(8).unwrap();
        let mut cursor = 0;
        for s in 1..=5 {
            ring.push(&rec(s));
        }
        let d = ring.drain_from(cursor, 3);
        assert_eq!(d.missed, 0);
        assert_eq!(
            d.records.iter().map(|r| r.rdt_sequence).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        cursor = d.next_cursor;

        let d = ring.drain_from(cursor, 100);
        assert_eq!(
            d.records.iter().map(|r| r.rdt_sequence).collect::<Vec<_>>(),
            vec![4, 5]
        );
        cursor = d.next_cursor;

        let d = ring.drain_from(cursor, 100);
        assert!(d.records.is_empty());
        assert_eq!(d.next_cursor, cursor);
    }

    #[test]
    fn drain_reports_overwritten_records_as_missed() {
        let ring = RawRing::new(4).unwrap();
        for s in 1..=10 {
            ring.push(&rec(s));
        }
        // Cursor never advanced; records 1..=6 are gone.
        let d = ring.drain_from(0, 100);
        assert_eq!(d.missed, 6);
        assert_eq!(
            d.records.iter().map(|r| r.rdt_sequence).collect::<Vec<_>>(),
            vec![7, 8, 9, 10]
        );
        assert_eq!(d.next_cursor, 10);
    }

    #[test]
    fn clear_resets_counters() {
        let ring = RawRing::new(4).unwrap();
        for s in 1..=6 {
            ring.push(&rec(s));
        }
        ring.clear();
        let stats = ring.stats();
        assert_eq!(stats.size, 0);
        assert_eq!(stats.total_written, 0);
        assert_eq!(stats.overwrites, 0);
        assert!(ring.latest(10).is_empty());
    }

    #[test]
    fn zero_capacity_rejected() {
        assert!(RawRing::new(0).is_err());
    }
}
