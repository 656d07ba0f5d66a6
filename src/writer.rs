// src/writer.rs
//! Append-only ingestion and rollup cache invalidation.

use crate::codec::encode_f64;
use crate::error::{Error, Result};
use crate::period::PeriodDuration;
use crate::storage::{Tree, WriteTx, PERIOD_SEPARATOR};
use crate::ticks;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// The span of instants touched by one or more appends to a key, grown to
/// contain every append seen before `commit`.
#[derive(Debug, Clone, Copy)]
struct TouchedSpan {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TouchedSpan {
    fn point(at: DateTime<Utc>) -> Self {
        Self { start: at, end: at }
    }

    fn expand(&mut self, at: DateTime<Utc>) {
        if at < self.start {
            self.start = at;
        }
        if at > self.end {
            self.end = at;
        }
    }
}

/// Opened against a fixed series arity; holds the store's single write
/// transaction for its lifetime. Appends accumulate and are only visible
/// to other transactions once [`Writer::commit`] runs.
pub struct Writer {
    write: WriteTx,
    arity: u8,
    series_tree: Option<Tree>,
    value_buffer: Vec<u8>,
    touched: HashMap<String, TouchedSpan>,
}

impl Writer {
    pub(crate) fn new(write: WriteTx, arity: u8) -> Self {
        Self {
            write,
            arity,
            series_tree: None,
            value_buffer: vec![0u8; arity as usize * 8],
            touched: HashMap::new(),
        }
    }

    fn series_tree(&mut self) -> Result<Tree> {
        if let Some(tree) = &self.series_tree {
            return Ok(tree.clone());
        }
        let tree = self.write.create_tree(&format!("series-{}", self.arity))?;
        self.series_tree = Some(tree.clone());
        Ok(tree)
    }

    /// Appends one sample. `values.len()` must equal the writer's arity.
    #[tracing::instrument(skip(self, values), fields(key = %key, arity = self.arity))]
    pub fn append(&mut self, key: &str, at: DateTime<Utc>, values: &[f64]) -> Result<()> {
        if values.len() != self.arity as usize {
            return Err(Error::InvalidArgument(format!(
                "expected {} values, got {}",
                self.arity,
                values.len()
            )));
        }
        for (i, &v) in values.iter().enumerate() {
            encode_f64(&mut self.value_buffer, i * 8, v);
        }

        let series_tree = self.series_tree()?;
        let fixed = series_tree.fixed_tree_for(key.as_bytes(), self.arity as usize * 8);
        fixed.add(ticks::to_ticks(at), &self.value_buffer)?;

        self.touched
            .entry(key.to_string())
            .and_modify(|span| span.expand(at))
            .or_insert_with(|| TouchedSpan::point(at));
        Ok(())
    }

    /// Reserved: point and range deletion are not implemented.
    pub fn delete(&mut self, _key: &str, _at: DateTime<Utc>) -> Result<()> {
        Err(Error::NotImplemented("Writer::delete"))
    }

    pub fn delete_range(&mut self, _key: &str, _start: DateTime<Utc>, _end: DateTime<Utc>) -> Result<()> {
        Err(Error::NotImplemented("Writer::delete_range"))
    }

    /// Invalidates every cached rollup bucket whose window overlaps an
    /// appended span, then commits the underlying write transaction.
    #[tracing::instrument(skip(self))]
    pub fn commit(self) -> Result<()> {
        let Writer {
            write,
            arity,
            touched,
            ..
        } = self;

        if let Some(periods_tree) = write.tree(&format!("periods-{arity}"))? {
            for (key, span) in &touched {
                invalidate_rollups(&periods_tree, key, *span, arity)?;
            }
        }

        write.commit()
    }

    /// Releases the transaction without committing any appends.
    pub fn dispose(self) {
        self.write.dispose();
    }
}

/// For each period duration cached under `key`, deletes every bucket whose
/// window could contain a point in `span`.
fn invalidate_rollups(periods_tree: &Tree, key: &str, span: TouchedSpan, arity: u8) -> Result<()> {
    let mut prefix = key.as_bytes().to_vec();
    prefix.extend_from_slice(PERIOD_SEPARATOR.to_string().as_bytes());

    for suffix in periods_tree.child_suffixes(&prefix)? {
        let suffix_str = match std::str::from_utf8(&suffix) {
            Ok(s) => s,
            Err(_) => continue,
        };
        let duration: PeriodDuration = match suffix_str.parse() {
            Ok(d) => d,
            Err(_) => continue,
        };

        let mut full_key = prefix.clone();
        full_key.extend_from_slice(&suffix);
        let fixed = periods_tree.fixed_tree_for(&full_key, arity as usize * crate::rollup::SLOT_WIDTH);

        let lo = crate::period::start_of_range(span.start, duration);
        let hi = crate::period::start_of_range(span.end, duration);
        let lo_tick = ticks::to_ticks(lo);
        let hi_tick = ticks::to_ticks(hi);

        // Collect first, then delete — deleting while iterating this
        // fixed tree's cursor would invalidate it mid-scan.
        let mut stale = Vec::new();
        for entry in fixed.range_from(lo_tick) {
            let (tick, _) = entry?;
            if tick > hi_tick {
                break;
            }
            stale.push(tick);
        }
        for tick in stale {
            fixed.delete(tick)?;
        }
    }
    Ok(())
}
