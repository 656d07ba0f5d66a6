// src/storage/mod.rs
//! Thin contract over the transactional substrate: named trees, fixed-size
//! trees keyed by tick, and scoped read/write transaction acquisition.
//!
//! Built on `sled`: a "named tree" is a `sled::Tree` opened via
//! `Db::open_tree`; a "fixed-size tree embedded in a parent" is a key range
//! within that tree, the same prefix-scan idiom `LockchainStorage` uses for
//! its cycle-ranged root lookups, generalized into a reusable type.

mod tree;

pub use tree::{FixedTree, FixedTreeIter, Tree};

use crate::error::Result;
use parking_lot::{Condvar, Mutex};
use std::path::Path;
use std::sync::Arc;

/// Separator between a caller's key and the period suffix in rollup tree
/// names — U+F8FF, private-use area, chosen to never appear in caller keys.
pub const PERIOD_SEPARATOR: char = '\u{F8FF}';

/// Serializes write-transaction acquisition: multiple readers may proceed
/// concurrently, but only one writer may hold the lock at a time, matching
/// spec.md §5's single-writer-per-environment model.
#[derive(Clone)]
struct WriteLock(Arc<(Mutex<bool>, Condvar)>);

impl WriteLock {
    fn new() -> Self {
        Self(Arc::new((Mutex::new(false), Condvar::new())))
    }

    fn acquire(&self) -> WriteLockGuard {
        let (lock, cvar) = &*self.0;
        let mut busy = lock.lock();
        while *busy {
            cvar.wait(&mut busy);
        }
        *busy = true;
        WriteLockGuard(self.0.clone())
    }
}

struct WriteLockGuard(Arc<(Mutex<bool>, Condvar)>);

impl Drop for WriteLockGuard {
    fn drop(&mut self) {
        let (lock, cvar) = &*self.0;
        *lock.lock() = false;
        cvar.notify_one();
    }
}

/// A read transaction: a scoped, unconditionally-released handle onto the
/// substrate's current state. Dropping it releases every resource it holds.
pub struct ReadTx {
    db: Arc<sled::Db>,
}

impl ReadTx {
    /// Looks up a named tree, returning `None` without creating it if it
    /// has never been written.
    pub fn tree(&self, name: &str) -> Result<Option<Tree>> {
        if tree_exists(&self.db, name) {
            Ok(Some(Tree::new(self.db.open_tree(name)?)))
        } else {
            Ok(None)
        }
    }
}

/// A write transaction: holds the single-writer lock for its lifetime.
pub struct WriteTx {
    db: Arc<sled::Db>,
    _guard: WriteLockGuard,
}

impl WriteTx {
    /// Looks up a named tree, returning `None` without creating it.
    pub fn tree(&self, name: &str) -> Result<Option<Tree>> {
        if tree_exists(&self.db, name) {
            Ok(Some(Tree::new(self.db.open_tree(name)?)))
        } else {
            Ok(None)
        }
    }

    /// Opens (creating on first use) a named tree.
    pub fn create_tree(&self, name: &str) -> Result<Tree> {
        Ok(Tree::new(self.db.open_tree(name)?))
    }

    /// Commits every write made through this transaction's trees.
    pub fn commit(self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    /// Releases the transaction without committing.
    pub fn dispose(self) {
        // Drop runs the lock-release path; no sled-side rollback is
        // required because individual tree operations are already durable
        // once written — this only discards the writer's exclusivity.
    }
}

fn tree_exists(db: &sled::Db, name: &str) -> bool {
    db.tree_names().iter().any(|n| n.as_ref() == name.as_bytes())
}

/// Owns the `sled::Db` handle and hands out scoped read/write transactions.
pub struct Storage {
    db: Arc<sled::Db>,
    write_lock: WriteLock,
}

impl Storage {
    pub fn open_on_disk(path: &Path) -> Result<Self> {
        let db = sled::open(path)?;
        Ok(Self::from_db(db))
    }

    pub fn open_in_memory() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self::from_db(db))
    }

    fn from_db(db: sled::Db) -> Self {
        Self {
            db: Arc::new(db),
            write_lock: WriteLock::new(),
        }
    }

    pub fn begin_read(&self) -> ReadTx {
        ReadTx { db: self.db.clone() }
    }

    /// Blocks until the prior writer (if any) commits or is disposed.
    pub fn begin_write(&self) -> WriteTx {
        WriteTx {
            db: self.db.clone(),
            _guard: self.write_lock.acquire(),
        }
    }
}
