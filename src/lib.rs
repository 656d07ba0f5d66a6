// src/lib.rs
//! chronoseries: a durable, embedded time-series store with cached
//! OHLC/Volume/Sum rollups.
//!
//! Raw points are appended per-key under a fixed arity (the number of
//! axes tracked per instant) and read back either verbatim or pre-
//! aggregated into fixed-duration buckets. Rollup buckets are computed
//! on first read and cached; later appends that fall inside an already
//! cached window invalidate it so the next read recomputes it.
//!
//! ```no_run
//! use chronoseries::{Store, StoreConfig};
//! use chrono::Utc;
//!
//! let store = Store::open(StoreConfig::in_memory())?;
//! let mut writer = store.writer(1)?;
//! writer.append("aapl", Utc::now(), &[100.0])?;
//! writer.commit()?;
//! # Ok::<(), chronoseries::Error>(())
//! ```

// `ticks::epoch` and `period`'s calendar-floor/advance helpers call
// `chrono`'s `with_*` constructors on field values already clamped into
// range by the surrounding arithmetic (e.g. `new_day = t.day().min(days_in_new_month)`),
// so those unwraps cannot actually fail; a blanket `deny(clippy::unwrap_used)`
// would otherwise force threading `Result` through calendar math that has
// no real failure mode, so it's left to per-call judgment instead.

pub mod cancellation;
pub mod clock;
pub mod codec;
pub mod config;
pub mod error;
pub mod metadata;
pub mod period;
pub mod reader;
pub mod rollup;
pub mod storage;
pub mod store;
pub mod ticks;
pub mod writer;

pub use cancellation::CancellationToken;
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{RawStoreConfig, StoreConfig};
pub use error::{Error, Result};
pub use metadata::ServerId;
pub use period::{PeriodDuration, PeriodType};
pub use reader::{Point, Reader, TimeSeriesQuery, TimeSeriesRollupQuery};
pub use rollup::{Range, RangeValue};
pub use store::{Store, StoreReader, StoreWriter};
pub use writer::Writer;
