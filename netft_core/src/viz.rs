//! Multi-resolution visualization buffer.
//!
//! Four tiers cover six orders of magnitude of time window:
//!
//! | Tier | Bucket span | Buckets | Covers        |
//! |------|-------------|---------|---------------|
//! | Raw  | one sample  | 60,000  | 60 s @ 1 kHz  |
//! | T1   | 100 ms      | 36,000  | 1 h           |
//! | T2   | 10 s        | 8,640   | 24 h          |
//! | T3   | 100 s       | 6,048   | 7 days        |
//!
//! Buckets are keyed by `floor(t / span) * span` and store per-channel
//! min/max plus a sample count, so transient peaks survive any amount of
//! downsampling: a bucket plots as a vertical (min, max) extent.

use std::sync::Mutex;
use std::time::Duration;

pub const CHANNEL_NAMES: [&str; 6] = ["Fx", "Fy", "Fz", "Tx", "Ty", "Tz"];

pub const RAW_CAPACITY: usize = 60_000;
pub const TIER1_SPAN_NS: u64 = 100_000_000; // 100 ms
pub const TIER1_CAPACITY: usize = 36_000;
pub const TIER2_SPAN_NS: u64 = 10_000_000_000; // 10 s
pub const TIER2_CAPACITY: usize = 8_640;
pub const TIER3_SPAN_NS: u64 = 100_000_000_000; // 100 s
pub const TIER3_CAPACITY: usize = 6_048;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierLevel {
    Raw,
    Tier1,
    Tier2,
    Tier3,
}

impl TierLevel {
    pub fn label(self) -> &'static str {
        match self {
            TierLevel::Raw => "raw",
            TierLevel::Tier1 => "tier1",
            TierLevel::Tier2 => "tier2",
            TierLevel::Tier3 => "tier3",
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct RawPoint {
    t_ns: u64,
    values: [f32; 6],
}

#[derive(Debug, Clone, Copy)]
struct Bucket {
    start_ns: u64,
    min: [f32; 6],
    max: [f32; 6],
    count: u32,
}

struct Tier {
    span_ns: u64,
    capacity: usize,
    buckets: std::collections::VecDeque<Bucket>,
    total_buckets: u64,
}

impl Tier {
    fn new(span_ns: u64, capacity: usize) -> Self {
        Self {
            span_ns,
            capacity,
            buckets: std::collections::VecDeque::with_capacity(capacity),
            total_buckets: 0,
        }
    }

    fn fold(&mut self, t_ns: u64, values: &[f32; 6]) {
        let key = (t_ns / self.span_ns) * self.span_ns;
        if let Some(back) = self.buckets.back_mut() {
            if back.start_ns == key {
                for ch in 0..6 {
                    back.min[ch] = back.min[ch].min(values[ch]);
                    back.max[ch] = back.max[ch].max(values[ch]);
                }
                back.count += 1;
                return;
            }
        }
        if self.buckets.len() == self.capacity {
            self.buckets.pop_front();
        }
        self.buckets.push_back(Bucket {
            start_ns: key,
            min: *values,
            max: *values,
            count: 1,
        });
        self.total_buckets += 1;
    }

    /// Number of buckets intersecting [start_ns, end_ns].
    fn count_in(&self, start_ns: u64, end_ns: u64) -> usize {
        let lo = self
            .buckets
            .partition_point(|b| b.start_ns + self.span_ns <= start_ns);
        let hi = self.buckets.partition_point(|b| b.start_ns <= end_ns);
        hi.saturating_sub(lo)
    }

    fn range(&self, start_ns: u64, end_ns: u64) -> impl Iterator<Item = &Bucket> {
        let lo = self
            .buckets
            .partition_point(|b| b.start_ns + self.span_ns <= start_ns);
        let hi = self.buckets.partition_point(|b| b.start_ns <= end_ns);
        self.buckets.range(lo..hi)
    }
}

/// Per-channel series data: one (min, max) pair per emitted point.
#[derive(Debug, Clone)]
pub struct ChannelSeries {
    /// Channel index 0..6 in Fx, Fy, Fz, Tx, Ty, Tz order.
    pub channel: usize,
    pub t_ns: Vec<u64>,
    pub min: Vec<f32>,
    pub max: Vec<f32>,
}

#[derive(Debug, Clone)]
pub struct Series {
    pub tier: TierLevel,
    pub channels: Vec<ChannelSeries>,
}

#[derive(Debug, Clone)]
pub struct TierStats {
    pub name: &'static str,
    pub capacity: usize,
    pub len: usize,
    pub total_buckets: u64,
}

#[derive(Debug, Clone)]
pub struct VizStats {
    pub raw_len: usize,
    pub raw_capacity: usize,
    pub tiers: Vec<TierStats>,
    pub memory_bytes: usize,
}

struct VizInner {
    raw: std::collections::VecDeque<RawPoint>,
    tiers: [Tier; 3],
}

/// Tiered plot buffer. Written by the processing thread, read under the same
/// short-held lock by the control thread.
pub struct VizBuffer {
    inner: Mutex<VizInner>,
}

impl Default for VizBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl VizBuffer {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(VizInner {
                raw: std::collections::VecDeque::with_capacity(RAW_CAPACITY),
                tiers: [
                    Tier::new(TIER1_SPAN_NS, TIER1_CAPACITY),
                    Tier::new(TIER2_SPAN_NS, TIER2_CAPACITY),
                    Tier::new(TIER3_SPAN_NS, TIER3_CAPACITY),
                ],
            }),
        }
    }

    /// Store one converted sample. Timestamps must be monotonic; a sample
    /// whose timestamp matches the newest bucket key folds into it.
    pub fn push(&self, t_ns: u64, values: [f64; 6]) {
        let v = [
            values[0] as f32,
            values[1] as f32,
            values[2] as f32,
            values[3] as f32,
            values[4] as f32,
            values[5] as f32,
        ];
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        if inner.raw.len() == RAW_CAPACITY {
            inner.raw.pop_front();
        }
        inner.raw.push_back(RawPoint { t_ns, values: v });
        for tier in &mut inner.tiers {
            tier.fold(t_ns, &v);
        }
    }

    /// Read a window of data for plotting.
    ///
    /// Selects the finest tier whose point count over `[t_now - window,
    /// t_now]` does not exceed `point_budget`; when even the coarsest tier
    /// exceeds it, the coarsest tier is truncated to the newest
    /// `point_budget` buckets so the contract (≤ budget points per channel)
    /// always holds.
    pub fn get_series(&self, window: Duration, channels: &[usize], point_budget: usize) -> Series {
        let Ok(inner) = self.inner.lock() else {
            return Series {
                tier: TierLevel::Raw,
                channels: Vec::new(),
            };
        };
        let channels: Vec<usize> = channels.iter().copied().filter(|&c| c < 6).collect();

        let t_now = match inner.raw.back() {
            Some(p) => p.t_ns,
            None => {
                return Series {
                    tier: TierLevel::Raw,
                    channels: channels
                        .iter()
                        .map(|&channel| ChannelSeries {
                            channel,
                            t_ns: Vec::new(),
                            min: Vec::new(),
                            max: Vec::new(),
                        })
                        .collect(),
                }
            }
        };
        let window_ns = window.as_nanos().min(u128::from(u64::MAX)) as u64;
        let start_ns = t_now.saturating_sub(window_ns);

        // Raw tier first: emit samples directly when they fit the budget.
        let raw_lo = inner.raw.partition_point(|p| p.t_ns < start_ns);
        let raw_count = inner.raw.len() - raw_lo;
        if raw_count <= point_budget {
            let out = channels
                .iter()
                .map(|&channel| {
                    let mut s = ChannelSeries {
                        channel,
                        t_ns: Vec::with_capacity(raw_count),
                        min: Vec::with_capacity(raw_count),
                        max: Vec::with_capacity(raw_count),
                    };
                    for p in inner.raw.range(raw_lo..) {
                        s.t_ns.push(p.t_ns);
                        s.min.push(p.values[channel]);
                        s.max.push(p.values[channel]);
                    }
                    s
                })
                .collect();
            return Series {
                tier: TierLevel::Raw,
                channels: out,
            };
        }

        let levels = [TierLevel::Tier1, TierLevel::Tier2, TierLevel::Tier3];
        let mut chosen = levels.len() - 1;
        let mut truncate = true;
        for (i, tier) in inner.tiers.iter().enumerate() {
            if tier.count_in(start_ns, t_now) <= point_budget {
                chosen = i;
                truncate = false;
                break;
            }
        }

        let tier = &inner.tiers[chosen];
        let buckets: Vec<&Bucket> = tier.range(start_ns, t_now).collect();
        let skip = if truncate {
            buckets.len().saturating_sub(point_budget)
        } else {
            0
        };
        let out = channels
            .iter()
            .map(|&channel| {
                let mut s = ChannelSeries {
                    channel,
                    t_ns: Vec::with_capacity(buckets.len() - skip),
                    min: Vec::with_capacity(buckets.len() - skip),
                    max: Vec::with_capacity(buckets.len() - skip),
                };
                for b in buckets.iter().skip(skip) {
                    s.t_ns.push(b.start_ns);
                    s.min.push(b.min[channel]);
                    s.max.push(b.max[channel]);
                }
                s
            })
            .collect();
        Series {
            tier: levels[chosen],
            channels: out,
        }
    }

    pub fn stats(&self) -> VizStats {
        let inner = match self.inner.lock() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        };
        let names = ["tier1", "tier2", "tier3"];
        let tiers: Vec<TierStats> = inner
            .tiers
            .iter()
            .zip(names)
            .map(|(t, name)| TierStats {
                name,
                capacity: t.capacity,
                len: t.buckets.len(),
                total_buckets: t.total_buckets,
            })
            .collect();
        // Raw point: 8 + 6*4; bucket: 8 + 2*6*4 + 4.
        let memory_bytes = inner.raw.capacity() * (8 + 24)
            + inner
                .tiers
                .iter()
                .map(|t| t.buckets.capacity() * (8 + 48 + 4))
                .sum::<usize>();
        VizStats {
            raw_len: inner.raw.len(),
            raw_capacity: RAW_CAPACITY,
            tiers,
            memory_bytes,
        }
    }

    pub fn clear(&self) {
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        inner.raw.clear();
        for tier in &mut inner.tiers {
            tier.buckets.clear();
            tier.total_buckets = 0;
        }
    }
}
