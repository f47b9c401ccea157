use std::collections::hash_map::Iter;
use std::collections::HashMap;

/// The in-memory key/value map.
///
/// `Store` does no I/O and no locking of its own; the [`KvStore`](crate::KvStore) keeps it behind
/// an [`AdmissionGate`](crate::AdmissionGate) and only touches it while holding a read ticket or
/// exclusive access.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Store {
    entries: HashMap<String, String>,
}

impl Store {
    /// creates an empty store
    pub fn new() -> Self {
        Store::default()
    }

    /// returns the value of `key`, if present
    pub fn get(&self, key: &str) -> Option<&String> {
        self.entries.get(key)
    }

    /// inserts `value` under `key`, overwriting any existing value
    pub fn put(&mut self, key: String, value: String) {
        self.entries.insert(key, value);
    }

    /// removes `key`. Returns `true` if the key was present
    pub fn delete(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// the number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` if the store holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// iterates over the entries in the map's native (unspecified) order
    pub fn iter(&self) -> Iter<'_, String, String> {
        self.entries.iter()
    }

    /// consumes the store, returning the underlying map
    pub fn into_map(self) -> HashMap<String, String> {
        self.entries
    }
}

impl From<HashMap<String, String>> for Store {
    fn from(entries: HashMap<String, String>) -> Self {
        Store { entries }
    }
}

impl FromIterator<(String, String)> for Store {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Store {
            entries: iter.into_iter().collect(),
        }
    }
}
