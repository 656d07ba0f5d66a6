// src/store.rs
//! The store: lifecycle, reader/writer factories, and prefix
//! configuration, wired together over the storage substrate.

use crate::clock::{Clock, SystemClock};
use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::metadata::{self, ServerId};
use crate::reader::Reader;
use crate::storage::Storage;
use crate::writer::Writer;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const CLOSE_POLL_INTERVAL: Duration = Duration::from_millis(100);
const CLOSE_TIMEOUT: Duration = Duration::from_secs(3);

/// Tracks one outstanding reader or writer; decrements the shared counter
/// on drop so [`Store::close`] can observe when the store has drained.
struct ActiveGuard(Arc<AtomicUsize>);

impl ActiveGuard {
    fn new(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A [`Reader`] borrowed from a [`Store`]; releasing it (by dropping)
/// tells the store's lifecycle tracking that this request has finished.
pub struct StoreReader {
    inner: Reader,
    _guard: ActiveGuard,
}

impl std::ops::Deref for StoreReader {
    type Target = Reader;

    fn deref(&self) -> &Reader {
        &self.inner
    }
}

/// A [`Writer`] borrowed from a [`Store`].
pub struct StoreWriter {
    inner: Writer,
    _guard: ActiveGuard,
}

impl StoreWriter {
    pub fn append(&mut self, key: &str, at: DateTime<Utc>, values: &[f64]) -> Result<()> {
        self.inner.append(key, at, values)
    }

    pub fn delete(&mut self, key: &str, at: DateTime<Utc>) -> Result<()> {
        self.inner.delete(key, at)
    }

    pub fn delete_range(&mut self, key: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<()> {
        self.inner.delete_range(key, start, end)
    }

    pub fn commit(self) -> Result<()> {
        self.inner.commit()
    }

    pub fn dispose(self) {
        self.inner.dispose()
    }
}

/// The durable time-series store. Bootstraps its server identity on first
/// open and hands out arity-scoped readers and writers.
pub struct Store {
    storage: Arc<Storage>,
    clock: Arc<dyn Clock>,
    server_id: ServerId,
    active: Arc<AtomicUsize>,
    disposed: AtomicBool,
}

impl Store {
    /// Opens (creating on first use) a store backed by `config`, using
    /// the system wall clock.
    pub fn open(config: StoreConfig) -> Result<Self> {
        Self::open_with_clock(config, Arc::new(SystemClock))
    }

    /// Opens a store with an injected [`Clock`] — used by tests that need
    /// a pinned notion of "now".
    pub fn open_with_clock(config: StoreConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let storage = if config.run_in_memory {
            Storage::open_in_memory()?
        } else {
            let dir = config
                .data_directory
                .as_ref()
                .ok_or_else(|| Error::Config("data_directory is required when run_in_memory is false".into()))?;
            Storage::open_on_disk(dir)?
        };
        let storage = Arc::new(storage);

        let write = storage.begin_write();
        let server_id = metadata::bootstrap_server_id(&write)?;
        write.commit()?;

        Ok(Self {
            storage,
            clock,
            server_id,
            active: Arc::new(AtomicUsize::new(0)),
            disposed: AtomicBool::new(false),
        })
    }

    pub fn server_id(&self) -> ServerId {
        self.server_id
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.disposed.load(Ordering::SeqCst) {
            Err(Error::Lifecycle("store is closed".into()))
        } else {
            Ok(())
        }
    }

    fn validate_arity(arity: u8) -> Result<()> {
        if arity == 0 {
            Err(Error::InvalidArgument("arity must be between 1 and 255".into()))
        } else {
            Ok(())
        }
    }

    /// Opens a reader scoped to `arity`. Holds a read transaction for its
    /// lifetime.
    pub fn reader(&self, arity: u8) -> Result<StoreReader> {
        self.ensure_open()?;
        Self::validate_arity(arity)?;
        Ok(StoreReader {
            inner: Reader::new(self.storage.clone(), self.storage.begin_read(), arity),
            _guard: ActiveGuard::new(self.active.clone()),
        })
    }

    /// Opens a writer scoped to `arity`. Blocks until any other writer
    /// has committed or been disposed (spec.md §5's single-writer model).
    pub fn writer(&self, arity: u8) -> Result<StoreWriter> {
        self.ensure_open()?;
        Self::validate_arity(arity)?;
        Ok(StoreWriter {
            inner: Writer::new(self.storage.begin_write(), arity),
            _guard: ActiveGuard::new(self.active.clone()),
        })
    }

    /// Registers `prefix` as carrying series of `arity` values per point.
    pub fn create_prefix_configuration(&self, prefix: &str, arity: u8) -> Result<()> {
        self.ensure_open()?;
        Self::validate_arity(arity)?;
        let write = self.storage.begin_write();
        metadata::create_prefix_configuration(&write, prefix, arity)?;
        write.commit()
    }

    /// Removes `prefix`'s registration, provided no raw data exists under
    /// it in its arity's `series` tree.
    pub fn delete_prefix_configuration(&self, prefix: &str) -> Result<()> {
        self.ensure_open()?;
        let write = self.storage.begin_write();
        let read = self.storage.begin_read();
        metadata::delete_prefix_configuration(&read, &write, prefix)?;
        write.commit()
    }

    /// Reserved: reading back a prefix's registered arity is not yet
    /// implemented.
    pub fn get_prefix_configuration(&self, _prefix: &str) -> Result<u8> {
        Err(Error::NotImplemented("Store::get_prefix_configuration"))
    }

    /// Requests shutdown: marks the store closed to new readers/writers,
    /// then polls for up to three seconds for outstanding ones to finish
    /// before returning.
    pub fn close(&self) -> Result<()> {
        self.disposed.store(true, Ordering::SeqCst);
        let deadline = Instant::now() + CLOSE_TIMEOUT;
        while self.active.load(Ordering::SeqCst) > 0 && Instant::now() < deadline {
            std::thread::sleep(CLOSE_POLL_INTERVAL);
        }
        if self.active.load(Ordering::SeqCst) > 0 {
            tracing::warn!(
                outstanding = self.active.load(Ordering::SeqCst),
                "closing store with outstanding readers or writers"
            );
        }
        Ok(())
    }
}
