// src/reader.rs
//! Raw-point iteration and rollup queries with cache-read and on-demand
//! fill.

use crate::cancellation::CancellationToken;
use crate::codec::decode_f64;
use crate::error::{Error, Result};
use crate::period::{self, PeriodDuration};
use crate::rollup::{decode_bucket, encode_bucket, Range, SLOT_WIDTH};
use crate::storage::{FixedTree, ReadTx, Storage, PERIOD_SEPARATOR};
use crate::ticks;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// One raw sample: an instant plus one value per series axis.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub at: DateTime<Utc>,
    pub values: Vec<f64>,
}

impl Point {
    /// The first axis's value — convenience for arity-1 series.
    pub fn value(&self) -> f64 {
        self.values[0]
    }
}

/// Arguments for a raw-point range query.
#[derive(Debug, Clone)]
pub struct TimeSeriesQuery {
    pub key: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Arguments for a rollup range query.
#[derive(Debug, Clone)]
pub struct TimeSeriesRollupQuery {
    pub key: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration: PeriodDuration,
}

/// Opened against a fixed series arity; holds a read transaction for its
/// lifetime.
pub struct Reader {
    storage: Arc<Storage>,
    read: ReadTx,
    arity: u8,
}

impl Reader {
    pub(crate) fn new(storage: Arc<Storage>, read: ReadTx, arity: u8) -> Self {
        Self { storage, read, arity }
    }

    fn series_tree_name(&self) -> String {
        format!("series-{}", self.arity)
    }

    fn periods_tree_name(&self) -> String {
        format!("periods-{}", self.arity)
    }

    /// Raw-point iteration over `[query.start, query.end]`. Yields empty
    /// if the `series-<arity>` tree has never been written.
    #[tracing::instrument(skip(self, cancel), fields(key = %query.key, arity = self.arity))]
    pub fn query_raw(&self, query: TimeSeriesQuery, cancel: CancellationToken) -> Result<RawPoints> {
        let series_tree = self.read.tree(&self.series_tree_name())?;
        let arity = self.arity;
        let end_tick = ticks::to_ticks(query.end);
        let inner = series_tree.map(|tree| {
            let fixed = tree.fixed_tree_for(query.key.as_bytes(), arity as usize * 8);
            fixed.range_from(ticks::to_ticks(query.start))
        });
        Ok(RawPoints {
            inner,
            end_tick,
            arity,
            cancel,
            done: false,
        })
    }

    /// Rollup range query: validates alignment eagerly, then returns a
    /// lazy sequence that reads cached buckets from `periods-<arity>` and
    /// computes+caches any that are missing.
    #[tracing::instrument(skip(self, cancel), fields(key = %query.key, arity = self.arity))]
    pub fn query_rollup(
        &self,
        query: TimeSeriesRollupQuery,
        cancel: CancellationToken,
    ) -> Result<RollupQuery> {
        period::validate_aligned(query.start, query.end, query.duration)?;

        let Some(raw_tree) = self.read.tree(&self.series_tree_name())? else {
            return Ok(RollupQuery::Empty);
        };

        let write = self.storage.begin_write();
        let periods_tree = write.create_tree(&self.periods_tree_name())?;

        let raw_fixed = raw_tree.fixed_tree_for(query.key.as_bytes(), self.arity as usize * 8);
        let rollup_key = format!("{}{}{}", query.key, PERIOD_SEPARATOR, query.duration);
        let rollup_fixed = periods_tree.fixed_tree_for(rollup_key.as_bytes(), self.arity as usize * SLOT_WIDTH);

        Ok(RollupQuery::Filling(RollupFill {
            raw_fixed,
            rollup_fixed,
            cursor: query.start,
            query_end: query.end,
            duration: query.duration,
            arity: self.arity,
            cancel,
            write: Some(write),
            completed: false,
        }))
    }
}

/// Lazy, single-pass iterator over raw points. `inner == None` means the
/// `series-<arity>` tree does not exist, so iteration yields nothing.
pub struct RawPoints {
    inner: Option<crate::storage::FixedTreeIter>,
    end_tick: i64,
    arity: u8,
    cancel: CancellationToken,
    done: bool,
}

impl Iterator for RawPoints {
    type Item = Result<Point>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if let Err(e) = self.cancel.check() {
            self.done = true;
            return Some(Err(e));
        }
        let inner = self.inner.as_mut()?;
        match inner.next() {
            None => {
                self.done = true;
                None
            }
            Some(Err(e)) => {
                self.done = true;
                Some(Err(e))
            }
            Some(Ok((tick, bytes))) => {
                if tick > self.end_tick {
                    self.done = true;
                    return None;
                }
                Some(Ok(decode_point(tick, &bytes, self.arity)))
            }
        }
    }
}

fn decode_point(tick: i64, bytes: &[u8], arity: u8) -> Point {
    let values = (0..arity as usize).map(|i| decode_f64(bytes, i * 8)).collect();
    Point {
        at: ticks::from_ticks(tick),
        values,
    }
}

/// Lazy, single-pass sequence of rollup buckets.
pub enum RollupQuery {
    /// The raw series has never been written; no buckets exist.
    Empty,
    Filling(RollupFill),
}

impl Iterator for RollupQuery {
    type Item = Result<Range>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            RollupQuery::Empty => None,
            RollupQuery::Filling(fill) => fill.next(),
        }
    }
}

pub struct RollupFill {
    raw_fixed: FixedTree,
    rollup_fixed: FixedTree,
    cursor: DateTime<Utc>,
    query_end: DateTime<Utc>,
    duration: PeriodDuration,
    arity: u8,
    cancel: CancellationToken,
    write: Option<crate::storage::WriteTx>,
    completed: bool,
}

impl RollupFill {
    fn next(&mut self) -> Option<Result<Range>> {
        if self.completed {
            return None;
        }
        if let Err(e) = self.cancel.check() {
            self.completed = true;
            return Some(Err(e));
        }
        if self.cursor == self.query_end {
            self.completed = true;
            if let Some(write) = self.write.take() {
                if let Err(e) = write.commit() {
                    return Some(Err(e));
                }
            }
            return None;
        }

        let next_cursor = period::add(self.cursor, self.duration);
        if next_cursor > self.query_end {
            self.completed = true;
            return Some(Err(Error::MisalignedRange(format!(
                "window starting at {} overshoots query end {}",
                self.cursor, self.query_end
            ))));
        }

        let window_start = self.cursor;
        self.cursor = next_cursor;
        let start_tick = ticks::to_ticks(window_start);

        match self.rollup_fixed.get(start_tick) {
            Err(e) => {
                self.completed = true;
                Some(Err(e))
            }
            Ok(Some(cached)) => {
                let values = decode_bucket(&cached, self.arity);
                Some(Ok(Range {
                    start_at: window_start,
                    duration: self.duration,
                    values,
                }))
            }
            Ok(None) => Some(self.fill(window_start, next_cursor, start_tick)),
        }
    }

    fn fill(&mut self, window_start: DateTime<Utc>, window_end: DateTime<Utc>, start_tick: i64) -> Result<Range> {
        let end_tick = ticks::to_ticks(window_end);
        let mut range = Range::empty(window_start, self.duration, self.arity);

        let mut it = self.raw_fixed.range_from(start_tick);
        loop {
            match it.next() {
                None => break,
                Some(Err(e)) => return Err(e),
                Some(Ok((tick, bytes))) => {
                    if tick >= end_tick {
                        break;
                    }
                    let values: Vec<f64> = (0..self.arity as usize)
                        .map(|i| decode_f64(&bytes, i * 8))
                        .collect();
                    range.accumulate(&values);
                }
            }
        }

        let encoded = encode_bucket(&range.values);
        self.rollup_fixed.add(start_tick, &encoded)?;
        Ok(range)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::period::PeriodType;
    use crate::writer::Writer;
    use chrono::TimeZone;

    fn dt(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    fn open_store() -> (Arc<Storage>, u8) {
        (Arc::new(Storage::open_in_memory().unwrap()), 1)
    }

    fn append(storage: &Arc<Storage>, arity: u8, key: &str, at: DateTime<Utc>, values: &[f64]) {
        let write = storage.begin_write();
        let mut writer = Writer::new(write, arity);
        writer.append(key, at, values).unwrap();
        writer.commit().unwrap();
    }

    #[test]
    fn query_raw_on_absent_series_yields_empty() {
        let (storage, arity) = open_store();
        let reader = Reader::new(storage.clone(), storage.begin_read(), arity);
        let query = TimeSeriesQuery {
            key: "aapl".into(),
            start: dt(2015, 1, 1, 0, 0, 0),
            end: dt(2015, 1, 1, 1, 0, 0),
        };
        let points: Vec<_> = reader.query_raw(query, CancellationToken::new()).unwrap().collect();
        assert!(points.is_empty());
    }

    #[test]
    fn query_raw_returns_points_in_ascending_order() {
        let (storage, arity) = open_store();
        append(&storage, arity, "aapl", dt(2015, 1, 1, 0, 0, 0), &[100.0]);
        append(&storage, arity, "aapl", dt(2015, 1, 1, 0, 0, 30), &[110.0]);

        let reader = Reader::new(storage.clone(), storage.begin_read(), arity);
        let query = TimeSeriesQuery {
            key: "aapl".into(),
            start: dt(2015, 1, 1, 0, 0, 0),
            end: dt(2015, 1, 1, 0, 1, 0),
        };
        let points: Vec<Point> = reader
            .query_raw(query, CancellationToken::new())
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].value(), 100.0);
        assert_eq!(points[1].value(), 110.0);
    }

    #[test]
    fn rollup_query_matches_scenario_1() {
        let (storage, arity) = open_store();
        append(&storage, arity, "aapl", dt(2015, 1, 1, 0, 0, 0), &[100.0]);
        append(&storage, arity, "aapl", dt(2015, 1, 1, 0, 0, 30), &[110.0]);

        let reader = Reader::new(storage.clone(), storage.begin_read(), arity);
        let duration = PeriodDuration::new(PeriodType::Minutes, 1).unwrap();
        let query = TimeSeriesRollupQuery {
            key: "aapl".into(),
            start: dt(2015, 1, 1, 0, 0, 0),
            end: dt(2015, 1, 1, 0, 1, 0),
            duration,
        };
        let ranges: Vec<Range> = reader
            .query_rollup(query, CancellationToken::new())
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(ranges.len(), 1);
        let v = ranges[0].values[0];
        assert_eq!(v.open, 100.0);
        assert_eq!(v.high, 110.0);
        assert_eq!(v.low, 100.0);
        assert_eq!(v.close, 110.0);
        assert_eq!(v.sum, 210.0);
        assert_eq!(v.volume, 2.0);
    }

    #[test]
    fn empty_raw_range_caches_a_zero_volume_bucket() {
        let (storage, arity) = open_store();
        // Force the series-1 tree to exist without any points in range.
        append(&storage, arity, "aapl", dt(2020, 1, 1, 0, 0, 0), &[1.0]);

        let reader = Reader::new(storage.clone(), storage.begin_read(), arity);
        let duration = PeriodDuration::new(PeriodType::Minutes, 1).unwrap();
        let query = TimeSeriesRollupQuery {
            key: "aapl".into(),
            start: dt(2015, 1, 1, 0, 0, 0),
            end: dt(2015, 1, 1, 0, 1, 0),
            duration,
        };
        let ranges: Vec<Range> = reader
            .query_rollup(query, CancellationToken::new())
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].values[0].volume, 0.0);
    }

    #[test]
    fn misaligned_range_fails_without_overshooting_query_end() {
        let (storage, arity) = open_store();
        append(&storage, arity, "aapl", dt(2015, 1, 1, 0, 0, 0), &[1.0]);

        let reader = Reader::new(storage.clone(), storage.begin_read(), arity);
        let duration = PeriodDuration::new(PeriodType::Minutes, 1).unwrap();
        let query = TimeSeriesRollupQuery {
            key: "aapl".into(),
            start: dt(2015, 1, 1, 0, 0, 0),
            end: dt(2015, 1, 1, 0, 1, 30), // not a whole number of minutes
            duration,
        };
        let result: Result<Vec<Range>> = reader
            .query_rollup(query, CancellationToken::new())
            .unwrap()
            .collect();
        assert!(matches!(result, Err(Error::MisalignedRange(_))));
    }

    #[test]
    fn cache_fill_is_idempotent_across_cold_queries() {
        let (storage, arity) = open_store();
        append(&storage, arity, "aapl", dt(2015, 1, 1, 0, 0, 0), &[100.0]);
        append(&storage, arity, "aapl", dt(2015, 1, 1, 0, 0, 30), &[110.0]);
        let duration = PeriodDuration::new(PeriodType::Minutes, 1).unwrap();
        let make_query = || TimeSeriesRollupQuery {
            key: "aapl".into(),
            start: dt(2015, 1, 1, 0, 0, 0),
            end: dt(2015, 1, 1, 0, 1, 0),
            duration,
        };

        let reader1 = Reader::new(storage.clone(), storage.begin_read(), arity);
        let first: Vec<Range> = reader1
            .query_rollup(make_query(), CancellationToken::new())
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();

        let reader2 = Reader::new(storage.clone(), storage.begin_read(), arity);
        let second: Vec<Range> = reader2
            .query_rollup(make_query(), CancellationToken::new())
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn cancellation_stops_iteration_immediately() {
        let (storage, arity) = open_store();
        append(&storage, arity, "aapl", dt(2015, 1, 1, 0, 0, 0), &[1.0]);
        append(&storage, arity, "aapl", dt(2015, 1, 1, 0, 0, 30), &[2.0]);

        let reader = Reader::new(storage.clone(), storage.begin_read(), arity);
        let query = TimeSeriesQuery {
            key: "aapl".into(),
            start: dt(2015, 1, 1, 0, 0, 0),
            end: dt(2015, 1, 1, 0, 1, 0),
        };
        let token = CancellationToken::new();
        token.cancel();
        let result: Vec<_> = reader.query_raw(query, token).unwrap().collect();
        assert_eq!(result.len(), 1);
        assert!(matches!(result[0], Err(Error::Cancelled)));
    }

    #[test]
    fn arity_isolation_hides_data_across_widths() {
        let storage = Arc::new(Storage::open_in_memory().unwrap());
        append(&storage, 1, "shared", dt(2015, 1, 1, 0, 0, 0), &[1.0]);

        let reader = Reader::new(storage.clone(), storage.begin_read(), 2);
        let query = TimeSeriesQuery {
            key: "shared".into(),
            start: dt(2015, 1, 1, 0, 0, 0),
            end: dt(2015, 1, 1, 1, 0, 0),
        };
        let points: Vec<_> = reader.query_raw(query, CancellationToken::new()).unwrap().collect();
        assert!(points.is_empty());
    }
}
