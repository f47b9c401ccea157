use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tracing::{debug, error, info, instrument};

use super::{KvsEngine, Snapshot, Store};
use crate::config::Config;
use crate::error::{KvsError, Result};
use crate::gate::{AdmissionGate, ExclusiveGuard, GateStats};

/// The primary struct for working with a [`KvStore`].
///
/// All key/value data lives in memory. Reads draw a ticket from the store's
/// [`AdmissionGate`], so at most `read_tickets` of them run at once. Writes take exclusive
/// access and, while still holding it, rewrite the whole [`Snapshot`] file.
///
/// A snapshot that can't be written doesn't fail the write: the in-memory data stays
/// authoritative, the failure is logged and [`health`](KvStore::health) reports durability as
/// degraded until a later snapshot succeeds.
///
/// `KvStore` is a cheap handle; clones share the same data.
#[derive(Debug, Clone)]
pub struct KvStore {
    shared: Arc<Shared>,
}

#[derive(Debug)]
struct Shared {
    gate: AdmissionGate<Store>,
    snapshot: Snapshot,
    // the last persistence failure, cleared by the next successful snapshot
    persist_error: Mutex<Option<String>>,
}

/// A report on the state of a [`KvStore`], suitable for logging or a readiness check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Health {
    /// number of keys currently held
    pub keys: usize,
    /// `false` if the snapshot on disk is known to be behind the in-memory data
    pub durable: bool,
    /// the most recent persistence error, if durability is degraded
    pub last_error: Option<String>,
    /// admission counters of the gate at the time of the report
    pub gate: GateStats,
}

impl KvStore {
    /// opens a [`KvStore`] as described by `config`, loading its data from the snapshot file.
    ///
    /// A snapshot that does not exist yet starts an empty store. A snapshot that exists but
    /// can't be read also starts an empty store, with durability reported as degraded.
    ///
    /// # Errors
    /// returns [`KvsError::Config`] if the configuration is invalid
    #[instrument(skip(config), fields(snapshot = ?config.snapshot_path))]
    pub fn open(config: &Config) -> Result<KvStore> {
        config.validate()?;
        info!("opening KVS engine version {}", env!("CARGO_PKG_VERSION"));
        let snapshot = Snapshot::new(&config.snapshot_path);

        let (store, persist_error) = match snapshot.load() {
            Ok(store) => (store, None),
            Err(e) => {
                error!("could not load snapshot, starting empty: {}", e);
                (Store::new(), Some(e.to_string()))
            }
        };
        info!(keys = store.len(), read_tickets = config.read_tickets, "store ready");

        Ok(KvStore {
            shared: Arc::new(Shared {
                gate: AdmissionGate::new(config.read_tickets, store),
                snapshot,
                persist_error: Mutex::new(persist_error),
            }),
        })
    }

    /// returns a health report on the store's data and durability
    pub fn health(&self) -> Health {
        let keys = self.shared.gate.read().len();
        let last_error = self.persist_error().clone();
        Health {
            keys,
            durable: last_error.is_none(),
            last_error,
            gate: self.shared.gate.stats(),
        }
    }

    /// the snapshot this store persists to
    pub fn snapshot(&self) -> &Snapshot {
        &self.shared.snapshot
    }

    fn persist_error(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.shared
            .persist_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// writes the snapshot. Taking the guard ensures this runs inside the exclusive section of
    /// the mutation being persisted.
    fn persist(&self, store: &ExclusiveGuard<'_, Store>) {
        let mut last_error = self.persist_error();
        match self.shared.snapshot.save(store) {
            Ok(()) => {
                if last_error.take().is_some() {
                    info!("snapshot written, durability restored");
                }
            }
            Err(e) => {
                error!(
                    "failed to save snapshot to {:?}, data is only held in memory: {}",
                    self.shared.snapshot.path(),
                    e
                );
                *last_error = Some(e.to_string());
            }
        }
    }
}

impl KvsEngine for KvStore {
    /// inserts the specified `key` and `value` into this `KvStore`, overriding any existing
    /// key/value entry, then rewrites the snapshot
    fn set(&self, key: String, value: String) -> Result<()> {
        reject_line_breaks("key", &key)?;
        reject_line_breaks("value", &value)?;

        let mut store = self.shared.gate.write();
        debug!(%key, "set");
        store.put(key, value);
        self.persist(&store);
        Ok(())
    }

    /// retrieves the value associated with `key` while holding a read ticket
    fn get(&self, key: String) -> Result<Option<String>> {
        let store = self.shared.gate.read();
        Ok(store.get(&key).cloned())
    }

    /// removes `key` and rewrites the snapshot. A missing key leaves the snapshot untouched.
    fn remove(&self, key: String) -> Result<()> {
        let mut store = self.shared.gate.write();
        if store.delete(&key) {
            debug!(%key, "removed");
            self.persist(&store);
            Ok(())
        } else {
            debug!(%key, "remove of a missing key");
            Err(KvsError::KeyNotFound)
        }
    }
}

fn reject_line_breaks(field: &'static str, text: &str) -> Result<()> {
    if text.contains(|c: char| c == '\n' || c == '\r') {
        Err(KvsError::LineBreak { field })
    } else {
        Ok(())
    }
}
