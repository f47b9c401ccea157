//! This module provides the key/value storage engine.
//!
//! [`KvStore`] is the engine the servers run against. It is assembled from three parts that can
//! also be used on their own: the in-memory [`Store`], the flat-file [`Snapshot`] it is persisted
//! to, and the [`AdmissionGate`](crate::AdmissionGate) that controls concurrent access.
use crate::Result;

/// A trait for the basic functionality of a key/value storage engine
pub trait KvsEngine: Clone + Send + Sync + 'static {
    /// sets a `key` and `value`
    ///
    /// If the given `key` already exists the previous `value` will be overwritten.
    ///
    /// # Errors
    ///
    /// Returns `KvsError::LineBreak` if the key or the value contains a line break.
    fn set(&self, key: String, value: String) -> Result<()>;

    /// Gets the value associated with the given `key`
    ///
    /// Returns `None` if the given `key` does not exist.
    fn get(&self, key: String) -> Result<Option<String>>;

    /// Removes the given `key` (and associated value) from the store
    ///
    /// # Errors
    ///
    /// Returns `KvsError::KeyNotFound` if the given `key` is not found.
    fn remove(&self, key: String) -> Result<()>;
}

mod kvs;
pub mod snapshot;
mod store;

pub use self::kvs::{Health, KvStore};
pub use self::snapshot::Snapshot;
pub use self::store::Store;
