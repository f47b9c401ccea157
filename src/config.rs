//! Runtime configuration shared by the store, the transports and the binaries.
//!
//! Every field has a default, so a configuration file only needs to name the values it changes:
//!
//! ```json
//! { "snapshot_path": "/var/lib/kvs/database.txt", "read_tickets": 4 }
//! ```
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{KvsError, Result};

/// the snapshot file name used when none is configured
pub const DEFAULT_SNAPSHOT_FILE: &str = "database.txt";

/// the number of reads the admission gate lets through at once
pub const DEFAULT_READ_TICKETS: usize = 10;

/// the byte bound on a single request or response
pub const MAX_MESSAGE_LEN: usize = 512;

/// the smallest usable message bound; every error line the servers produce fits into it
pub const MIN_MESSAGE_LEN: usize = 64;

/// the number of worker threads the dispatcher uses by default
pub const DEFAULT_WORKERS: u32 = 4;

/// Settings for a [`KvStore`](crate::KvStore) and the servers built on top of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// path of the flat snapshot file
    pub snapshot_path: PathBuf,
    /// capacity of the admission gate's ticket pool
    pub read_tickets: usize,
    /// maximum length, in bytes, of a request or a response
    pub max_message_len: usize,
    /// how long a client waits on the channel before giving up, `None` waits forever
    pub response_timeout_ms: Option<u64>,
    /// number of dispatcher worker threads
    pub workers: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            snapshot_path: PathBuf::from(DEFAULT_SNAPSHOT_FILE),
            read_tickets: DEFAULT_READ_TICKETS,
            max_message_len: MAX_MESSAGE_LEN,
            response_timeout_ms: None,
            workers: DEFAULT_WORKERS,
        }
    }
}

impl Config {
    /// reads a JSON configuration file. Fields missing from the file keep their defaults.
    ///
    /// # Errors
    /// returns an IO error if the file can't be read, a JSON error if it can't be parsed and
    /// [`KvsError::Config`] if a value is out of range
    pub fn from_file(path: &Path) -> Result<Config> {
        let text = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&text)?;
        debug!(?config, "loaded configuration from {:?}", path);
        config.validate()?;
        Ok(config)
    }

    /// the client response timeout as a [`Duration`]
    pub fn response_timeout(&self) -> Option<Duration> {
        self.response_timeout_ms.map(Duration::from_millis)
    }

    /// checks that every capacity is usable
    pub fn validate(&self) -> Result<()> {
        if self.read_tickets == 0 {
            return Err(KvsError::Config("read_tickets must be at least 1".into()));
        }
        if self.max_message_len < MIN_MESSAGE_LEN {
            return Err(KvsError::Config(format!(
                "max_message_len must be at least {}",
                MIN_MESSAGE_LEN
            )));
        }
        if self.workers == 0 {
            return Err(KvsError::Config("workers must be at least 1".into()));
        }
        Ok(())
    }
}
