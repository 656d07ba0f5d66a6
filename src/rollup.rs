// src/rollup.rs
//! Rollup bucket types and the fixed-width codec that serializes them.

use crate::codec::{decode_f64, encode_f64};
use crate::period::PeriodDuration;
use chrono::{DateTime, Utc};

/// Six aggregate fields tracked per axis in a rollup bucket.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeValue {
    pub volume: f64,
    pub high: f64,
    pub low: f64,
    pub open: f64,
    pub close: f64,
    pub sum: f64,
}

impl RangeValue {
    pub const ZERO: RangeValue = RangeValue {
        volume: 0.0,
        high: 0.0,
        low: 0.0,
        open: 0.0,
        close: 0.0,
        sum: 0.0,
    };

    /// Folds a raw sample `v` into this aggregate, per the rules in
    /// spec.md §4.E: first point seeds Open/High/Low/Sum/Close, later
    /// points extend High/Low, accumulate Sum and Volume, and overwrite
    /// Close.
    fn accumulate(&mut self, v: f64) {
        if self.volume == 0.0 {
            self.open = v;
            self.high = v;
            self.low = v;
            self.sum = v;
        } else {
            self.high = self.high.max(v);
            self.low = self.low.min(v);
            self.sum += v;
        }
        self.close = v;
        self.volume += 1.0;
    }
}

/// An aggregate over `[start_at, start_at + duration)` for every axis of
/// a series.
#[derive(Debug, Clone, PartialEq)]
pub struct Range {
    pub start_at: DateTime<Utc>,
    pub duration: PeriodDuration,
    pub values: Vec<RangeValue>,
}

impl Range {
    /// An empty, all-zero bucket for `arity` axes — the result of
    /// rolling up a window with no raw points in it.
    pub fn empty(start_at: DateTime<Utc>, duration: PeriodDuration, arity: u8) -> Self {
        Self {
            start_at,
            duration,
            values: vec![RangeValue::ZERO; arity as usize],
        }
    }

    /// Folds one raw sample's axes into this range's running aggregates.
    pub fn accumulate(&mut self, sample: &[f64]) {
        for (slot, &v) in self.values.iter_mut().zip(sample.iter()) {
            slot.accumulate(v);
        }
    }
}

/// Byte width of one axis's encoded bucket slot (Volume, High, Low, Open,
/// Close, Sum × 8 bytes).
pub const SLOT_WIDTH: usize = 48;

/// Encodes `values` (length = series arity) into a fresh `arity * 48` byte
/// buffer, per the per-axis slot order in spec.md §4.G.
pub fn encode_bucket(values: &[RangeValue]) -> Vec<u8> {
    let mut buf = vec![0u8; values.len() * SLOT_WIDTH];
    for (i, v) in values.iter().enumerate() {
        let base = i * SLOT_WIDTH;
        encode_f64(&mut buf, base, v.volume);
        encode_f64(&mut buf, base + 8, v.high);
        encode_f64(&mut buf, base + 16, v.low);
        encode_f64(&mut buf, base + 24, v.open);
        encode_f64(&mut buf, base + 32, v.close);
        encode_f64(&mut buf, base + 40, v.sum);
    }
    buf
}

/// Decodes a `bucket` encoded by [`encode_bucket`] back into `arity`
/// `RangeValue`s. As an optimization, when an axis's Volume slot is zero
/// the remaining fields are not read and default to zero.
pub fn decode_bucket(bucket: &[u8], arity: u8) -> Vec<RangeValue> {
    let mut out = Vec::with_capacity(arity as usize);
    for i in 0..arity as usize {
        let base = i * SLOT_WIDTH;
        let volume = decode_f64(bucket, base);
        if volume == 0.0 {
            out.push(RangeValue::ZERO);
            continue;
        }
        out.push(RangeValue {
            volume,
            high: decode_f64(bucket, base + 8),
            low: decode_f64(bucket, base + 16),
            open: decode_f64(bucket, base + 24),
            close: decode_f64(bucket, base + 32),
            sum: decode_f64(bucket, base + 40),
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::period::PeriodType;

    #[test]
    fn bucket_round_trips() {
        let values = vec![
            RangeValue {
                volume: 2.0,
                high: 110.0,
                low: 100.0,
                open: 100.0,
                close: 110.0,
                sum: 210.0,
            },
            RangeValue::ZERO,
        ];
        let encoded = encode_bucket(&values);
        assert_eq!(encoded.len(), 2 * SLOT_WIDTH);
        let decoded = decode_bucket(&encoded, 2);
        assert_eq!(decoded, values);
    }

    #[test]
    fn zero_volume_axis_decodes_to_all_zero() {
        let values = vec![RangeValue::ZERO];
        let encoded = encode_bucket(&values);
        let decoded = decode_bucket(&encoded, 1);
        assert_eq!(decoded[0], RangeValue::ZERO);
    }

    #[test]
    fn accumulate_matches_scenario_1_from_spec() {
        let d = PeriodDuration::new(PeriodType::Minutes, 1).unwrap();
        let mut range = Range::empty(chrono::Utc::now(), d, 1);
        range.accumulate(&[100.0]);
        range.accumulate(&[110.0]);
        let v = range.values[0];
        assert_eq!(v.open, 100.0);
        assert_eq!(v.high, 110.0);
        assert_eq!(v.low, 100.0);
        assert_eq!(v.close, 110.0);
        assert_eq!(v.sum, 210.0);
        assert_eq!(v.volume, 2.0);
    }
}
