use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One day of samples at one per minute.
pub const HISTORY_CAPACITY: usize = 1440;
pub const HISTORY_INTERVAL_MS: u64 = 60_000;
pub const HISTORY_MAGIC: u32 = 0x485A_4737;
pub const HISTORY_VERSION: u16 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistorySample {
    /// Unix seconds, 0 when the clock was not synced.
    pub ts: i64,
    #[serde(rename = "temperatureC")]
    pub temperature_c: Option<f32>,
    #[serde(rename = "humidityRH")]
    pub humidity_rh: Option<f32>,
    pub soil1: u8,
    pub soil2: u8,
    pub light1: bool,
    pub light2: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HistoryError {
    #[error("history magic {0:#010x} does not match")]
    Magic(u32),
    #[error("unsupported history version {0}")]
    Version(u16),
    #[error("history capacity {found} does not match {expected}")]
    Capacity { expected: usize, found: usize },
    #[error("history interval {found}ms does not match {expected}ms")]
    Interval { expected: u64, found: u64 },
    #[error("history holds {found} samples, expected {expected}")]
    Truncated { expected: usize, found: usize },
}

/// Fixed-size ring of samples; the oldest sample is overwritten once full.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryBuffer {
    capacity: usize,
    slots: Vec<HistorySample>,
    next: usize,
    full: bool,
}

impl Default for HistoryBuffer {
    fn default() -> Self {
        Self::with_capacity(HISTORY_CAPACITY)
    }
}

impl HistoryBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            slots: Vec::with_capacity(capacity),
            next: 0,
            full: false,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn push(&mut self, sample: HistorySample) {
        if self.full {
            self.slots[self.next] = sample;
        } else {
            self.slots.push(sample);
        }
        self.next = (self.next + 1) % self.capacity;
        if self.next == 0 {
            self.full = true;
        }
    }

    /// Samples from oldest to newest.
    pub fn samples(&self) -> impl Iterator<Item = &HistorySample> + '_ {
        let split = if self.full { self.next } else { 0 };
        self.slots[split..].iter().chain(self.slots[..split].iter())
    }

    pub fn snapshot(&self) -> HistorySnapshot {
        HistorySnapshot {
            magic: HISTORY_MAGIC,
            version: HISTORY_VERSION,
            capacity: self.capacity,
            interval_ms: HISTORY_INTERVAL_MS,
            index: self.next,
            full: self.full,
            samples: self.slots.clone(),
        }
    }

    /// Rebuilds a buffer of `capacity` slots from a stored snapshot. A write index past
    /// the end yields an empty buffer rather than an error.
    pub fn from_snapshot(
        snapshot: HistorySnapshot,
        capacity: usize,
    ) -> Result<Self, HistoryError> {
        let capacity = capacity.max(1);
        snapshot.check_header(capacity)?;

        if snapshot.index > capacity {
            return Ok(Self::with_capacity(capacity));
        }
        let index = snapshot.index % capacity;
        let full = snapshot.full || (snapshot.index == capacity);
        let expected = if full { capacity } else { index };
        if snapshot.samples.len() != expected {
            return Err(HistoryError::Truncated {
                expected,
                found: snapshot.samples.len(),
            });
        }

        Ok(Self {
            capacity,
            slots: snapshot.samples,
            next: index,
            full,
        })
    }
}

/// Persisted form of a [`HistoryBuffer`]: a header, the ring position and raw slots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistorySnapshot {
    pub magic: u32,
    pub version: u16,
    pub capacity: usize,
    pub interval_ms: u64,
    pub index: usize,
    pub full: bool,
    pub samples: Vec<HistorySample>,
}

impl HistorySnapshot {
    fn check_header(&self, capacity: usize) -> Result<(), HistoryError> {
        if self.magic != HISTORY_MAGIC {
            return Err(HistoryError::Magic(self.magic));
        }
        if self.version != HISTORY_VERSION {
            return Err(HistoryError::Version(self.version));
        }
        if self.capacity != capacity {
            return Err(HistoryError::Capacity {
                expected: capacity,
                found: self.capacity,
            });
        }
        if self.interval_ms != HISTORY_INTERVAL_MS {
            return Err(HistoryError::Interval {
                expected: HISTORY_INTERVAL_MS,
                found: self.interval_ms,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn sample(ts: i64) -> HistorySample {
        HistorySample {
            ts,
            temperature_c: Some(24.0),
            humidity_rh: None,
            soil1: 40,
            soil2: 50,
            light1: true,
            light2: false,
        }
    }

    fn timestamps(buffer: &HistoryBuffer) -> Vec<i64> {
        buffer.samples().map(|s| s.ts).collect()
    }

    #[test]
    fn overwrites_oldest_when_full() {
        let mut buffer = HistoryBuffer::with_capacity(3);
        for ts in 1..=2 {
            buffer.push(sample(ts));
        }
        assert_eq!(timestamps(&buffer), vec![1, 2]);

        for ts in 3..=5 {
            buffer.push(sample(ts));
        }
        assert_eq!(buffer.len(), 3);
        assert_eq!(timestamps(&buffer), vec![3, 4, 5]);
    }

    #[test]
    fn snapshot_restores_ring_position() {
        let mut buffer = HistoryBuffer::with_capacity(4);
        for ts in 1..=6 {
            buffer.push(sample(ts));
        }

        let json = serde_json::to_string(&buffer.snapshot()).unwrap();
        let snapshot: HistorySnapshot = serde_json::from_str(&json).unwrap();
        let mut restored = HistoryBuffer::from_snapshot(snapshot, 4).unwrap();

        assert_eq!(restored, buffer);
        restored.push(sample(7));
        assert_eq!(timestamps(&restored), vec![4, 5, 6, 7]);
    }

    #[test]
    fn header_mismatch_is_rejected() {
        let buffer = HistoryBuffer::with_capacity(4);

        let mut wrong_magic = buffer.snapshot();
        wrong_magic.magic = 0xdead_beef;
        assert_eq!(
            HistoryBuffer::from_snapshot(wrong_magic, 4),
            Err(HistoryError::Magic(0xdead_beef))
        );

        let mut wrong_version = buffer.snapshot();
        wrong_version.version = 2;
        assert_eq!(
            HistoryBuffer::from_snapshot(wrong_version, 4),
            Err(HistoryError::Version(2))
        );

        assert_eq!(
            HistoryBuffer::from_snapshot(buffer.snapshot(), 8),
            Err(HistoryError::Capacity {
                expected: 8,
                found: 4
            })
        );

        let mut wrong_interval = buffer.snapshot();
        wrong_interval.interval_ms = 1_000;
        assert!(matches!(
            HistoryBuffer::from_snapshot(wrong_interval, 4),
            Err(HistoryError::Interval { .. })
        ));
    }

    #[test]
    fn zero_capacity_is_treated_as_one_slot() {
        let mut snapshot = HistoryBuffer::with_capacity(4).snapshot();
        snapshot.capacity = 0;

        assert_eq!(
            HistoryBuffer::from_snapshot(snapshot, 0),
            Err(HistoryError::Capacity {
                expected: 1,
                found: 0
            })
        );

        let mut buffer = HistoryBuffer::with_capacity(0);
        buffer.push(sample(1));
        let restored = HistoryBuffer::from_snapshot(buffer.snapshot(), 0).unwrap();
        assert_eq!(restored, buffer);
    }

    #[test]
    fn out_of_range_index_resets_buffer() {
        let mut buffer = HistoryBuffer::with_capacity(4);
        buffer.push(sample(1));
        let mut snapshot = buffer.snapshot();
        snapshot.index = 9;

        let restored = HistoryBuffer::from_snapshot(snapshot, 4).unwrap();

        assert!(restored.is_empty());
    }

    #[test]
    fn missing_samples_are_rejected() {
        let mut buffer = HistoryBuffer::with_capacity(4);
        buffer.push(sample(1));
        buffer.push(sample(2));
        let mut snapshot = buffer.snapshot();
        snapshot.samples.pop();

        assert_eq!(
            HistoryBuffer::from_snapshot(snapshot, 4),
            Err(HistoryError::Truncated {
                expected: 2,
                found: 1
            })
        );
    }
}
