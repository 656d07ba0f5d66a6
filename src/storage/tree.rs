// src/storage/tree.rs
//! A named tree and the fixed-size, tick-keyed trees embedded within it.

use crate::error::Result;
use dashmap::DashMap;
use std::sync::Arc;

/// A named tree (e.g. `series-1`, `periods-1`, `$metadata`).
#[derive(Clone)]
pub struct Tree {
    inner: sled::Tree,
    fixed_cache: Arc<DashMap<(Vec<u8>, usize), FixedTree>>,
}

impl Tree {
    pub(super) fn new(inner: sled::Tree) -> Self {
        Self {
            inner,
            fixed_cache: Arc::new(DashMap::new()),
        }
    }

    /// Raw key/value access, used by the metadata keeper (component D)
    /// which stores scalar entries rather than tick-keyed series.
    pub fn get(&self, key: &[u8]) -> Result<Option<sled::IVec>> {
        Ok(self.inner.get(key)?)
    }

    pub fn insert(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.inner.insert(key, value)?;
        Ok(())
    }

    /// Removes a scalar entry (as opposed to a tick-keyed fixed-tree
    /// entry, which goes through [`FixedTree::delete`]).
    pub fn remove(&self, key: &[u8]) -> Result<()> {
        self.inner.remove(key)?;
        Ok(())
    }

    /// Returns the lazily-created, cached fixed-size tree for `key` with
    /// the given fixed value width — a per-(parent, key) singleton, as
    /// spec.md §4.C requires.
    pub fn fixed_tree_for(&self, key: &[u8], value_width: usize) -> FixedTree {
        let cache_key = (key.to_vec(), value_width);
        self.fixed_cache
            .entry(cache_key)
            .or_insert_with(|| FixedTree {
                tree: self.inner.clone(),
                prefix: encode_key_prefix(key),
                value_width,
            })
            .clone()
    }

    /// Scans every distinct caller key directly under `prefix` in this
    /// tree. Used by rollup invalidation (component F) to discover every
    /// configured period for a raw key without a separate registry.
    ///
    /// Fixed-tree rows are stored `len(4) || key_bytes || tick(8)`, so a
    /// plain `scan_prefix(prefix)` can't be used here: it would match on
    /// raw stored bytes, which is exactly the ambiguity the length header
    /// exists to avoid (a prefix scan for `"a"` would otherwise also match
    /// rows stored under `"ab"`). Instead this decodes every row's caller
    /// key and filters on the decoded value.
    pub fn child_suffixes(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>> {
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for entry in self.inner.iter() {
            let (k, _v) = entry?;
            let Some((full_key, _tick)) = decode_full_key(&k) else {
                continue;
            };
            if !full_key.starts_with(prefix) {
                continue;
            }
            let suffix = full_key[prefix.len()..].to_vec();
            if seen.insert(suffix.clone()) {
                out.push(suffix);
            }
        }
        Ok(out)
    }
}

/// Prefixes `key` with its own length (4-byte big-endian) so that two
/// caller keys where one is a byte-prefix of the other (e.g. `"a"` and
/// `"ab"`) can never collide once the 8-byte tick suffix is appended: the
/// length header makes the caller-key/tick boundary unambiguous no matter
/// what bytes follow it.
fn encode_key_prefix(key: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + key.len());
    out.extend_from_slice(&(key.len() as u32).to_be_bytes());
    out.extend_from_slice(key);
    out
}

/// Inverse of [`encode_key_prefix`] plus the trailing tick: parses
/// `len(4) || key_bytes || tick(8)`, returning `None` for anything too
/// short or whose declared length doesn't fit the remaining bytes.
fn decode_full_key(raw: &[u8]) -> Option<(Vec<u8>, i64)> {
    if raw.len() < 4 {
        return None;
    }
    let mut len_buf = [0u8; 4];
    len_buf.copy_from_slice(&raw[..4]);
    let key_len = u32::from_be_bytes(len_buf) as usize;
    if raw.len() < 4 + key_len + 8 {
        return None;
    }
    let key = raw[4..4 + key_len].to_vec();
    let tick = decode_tick(&raw[4 + key_len..4 + key_len + 8]);
    Some((key, tick))
}

/// A fixed-size tree: an ordered map from tick (`i64`) to a fixed-width
/// byte blob, realized as a key range within a parent `sled::Tree`. The
/// stored key is `len(caller_key)(4 BE) || caller_key || tick(8 BE)`; the
/// length header keeps two caller keys where one is a byte-prefix of the
/// other (e.g. `"a"` and `"ab"`) from colliding once the tick suffix is
/// appended.
#[derive(Clone)]
pub struct FixedTree {
    tree: sled::Tree,
    prefix: Vec<u8>,
    value_width: usize,
}

impl FixedTree {
    pub fn required_prefix(&self) -> &[u8] {
        &self.prefix
    }

    pub fn value_width(&self) -> usize {
        self.value_width
    }

    fn full_key(&self, tick: i64) -> Vec<u8> {
        let mut key = self.prefix.clone();
        key.extend_from_slice(&(tick as u64).to_be_bytes());
        key
    }

    pub fn add(&self, tick: i64, value: &[u8]) -> Result<()> {
        debug_assert_eq!(value.len(), self.value_width, "fixed tree value width mismatch");
        self.tree.insert(self.full_key(tick), value)?;
        Ok(())
    }

    pub fn delete(&self, tick: i64) -> Result<()> {
        self.tree.remove(self.full_key(tick))?;
        Ok(())
    }

    /// Direct point lookup — used for the rollup cache-hit fast path.
    pub fn get(&self, tick: i64) -> Result<Option<sled::IVec>> {
        Ok(self.tree.get(self.full_key(tick))?)
    }

    /// Ascending iteration starting at the first entry with key `>= from`.
    pub fn range_from(&self, from: i64) -> FixedTreeIter {
        let start = self.full_key(from);
        FixedTreeIter {
            inner: self.tree.range(start..),
            prefix: self.prefix.clone(),
        }
    }

    /// Ascending iteration over the entire fixed tree. Ticks are always
    /// non-negative (the epoch is `0001-01-01T00:00:00Z`), so the scan
    /// starts at 0 rather than `i64::MIN`: keys are stored as
    /// `(tick as u64).to_be_bytes()`, and `i64::MIN as u64` sorts after
    /// every non-negative tick, which would make this yield nothing.
    pub fn iter(&self) -> FixedTreeIter {
        self.range_from(0)
    }
}

/// Strictly-ascending iterator over one fixed tree, bounded to entries
/// whose key starts with the tree's prefix.
pub struct FixedTreeIter {
    inner: sled::Iter,
    prefix: Vec<u8>,
}

impl Iterator for FixedTreeIter {
    type Item = Result<(i64, sled::IVec)>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.inner.next() {
            None => None,
            Some(Err(e)) => Some(Err(e.into())),
            Some(Ok((k, v))) => {
                if !k.starts_with(&self.prefix[..]) {
                    return None;
                }
                let tick = decode_tick(&k[self.prefix.len()..]);
                Some(Ok((tick, v)))
            }
        }
    }
}

fn decode_tick(bytes: &[u8]) -> i64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    u64::from_be_bytes(buf) as i64
}
