//! Tare offset bookkeeping.
//!
//! The offset is a single six-element array behind an `RwLock`: it is either
//! all zeros or the mean of one completed tare batch, and it is swapped as a
//! whole so neither the streaming handler nor manual reads ever see half of
//! an update.

use crate::measurement::Measurement;
use rdt_protocol::RawSample;
use std::sync::RwLock;

pub type Offset = [f64; 6];

pub const ZERO_OFFSET: Offset = [0.0; 6];

/// Offset shared between the engine and its streaming handler
#[derive(Debug, Default)]
pub struct Calibration {
    offset: RwLock<Offset>,
}

impl Calibration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Offset {
        *self.offset.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Replace the offset wholesale
    pub fn install(&self, offset: Offset) {
        *self.offset.write().unwrap_or_else(|e| e.into_inner()) = offset;
    }

    pub fn reset(&self) {
        self.install(ZERO_OFFSET);
    }

    /// Subtract the current offset from a raw sample
    pub fn apply(&self, raw: &RawSample) -> Measurement {
        let offset = self.current();
        let mut counts = [0.0; 6];
        for (axis, value) in counts.iter_mut().enumerate() {
            *value = f64::from(raw.counts[axis]) - offset[axis];
        }
        Measurement {
            sequence: raw.sequence,
            status: raw.status,
            counts,
        }
    }
}

/// Running sum for one tare batch
#[derive(Debug)]
pub struct TareAccumulator {
    expected: usize,
    seen: usize,
    sums: [f64; 6],
}

impl TareAccumulator {
    pub fn new(expected: usize) -> Self {
        Self {
            expected,
            seen: 0,
            sums: [0.0; 6],
        }
    }

    pub fn push(&mut self, raw: &RawSample) {
        for (sum, value) in self.sums.iter_mut().zip(raw.counts.iter()) {
            *sum += f64::from(*value);
        }
        self.seen += 1;
    }

    pub fn seen(&self) -> usize {
        self.seen
    }

    /// The per-axis mean, only once exactly `expected` samples were pushed
    pub fn finish(self) -> Option<Offset> {
        if self.expected == 0 || self.seen != self.expected {
            return None;
        }
        let n = self.expected as f64;
        Some(self.sums.map(|sum| sum / n))
    }
}
