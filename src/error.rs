// src/error.rs
//! Error taxonomy for the time-series engine.

use thiserror::Error;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Comprehensive error types for the time-series engine.
#[derive(Debug, Error)]
pub enum Error {
    /// Arity out of `[1, 255]`, or `values.len() != arity`.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A rollup query's boundaries do not satisfy `validateAligned`.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// Range enumeration overshot the query's end boundary.
    #[error("misaligned range: {0}")]
    MisalignedRange(String),

    /// Prefix configuration already registered.
    #[error("prefix {0:?} already has a configuration")]
    AlreadyExists(String),

    /// Prefix configuration, or requested entity, not found.
    #[error("{0} not found")]
    NotFound(String),

    /// Prefix deletion requested but raw data still exists under it.
    #[error("prefix {0:?} still has data")]
    HasData(String),

    /// Reserved operation, not implemented by design.
    #[error("not implemented: {0}")]
    NotImplemented(&'static str),

    /// A cancellation token was observed mid-iteration.
    #[error("operation cancelled")]
    Cancelled,

    /// Propagated from the storage substrate.
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    /// Operation attempted on a disposed store, or double-initialize.
    #[error("lifecycle error: {0}")]
    Lifecycle(String),

    /// Configuration failed to load or validate.
    #[error("configuration error: {0}")]
    Config(String),
}
