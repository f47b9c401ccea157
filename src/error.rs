use std::io;
use std::time::Duration;

use thiserror::Error;

/// type alias for all operations that could fail with a [`KvsError`]
pub type Result<T> = std::result::Result<T, KvsError>;

/// The Error variants used throughout the store, the mailbox and the dispatcher.
///
/// Domain and protocol failures (a missing key, an unknown command) are normally turned into
/// response text by the [`Processor`](crate::Processor); only transport failures are expected to
/// reach the caller of a client.
#[derive(Debug, Error)]
pub enum KvsError {
    /// variant for errors caused from file IO
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// variant for errors when a key was not found in the store
    #[error("Key not found")]
    KeyNotFound,

    /// a key or value contained a line break, which the snapshot format cannot represent
    #[error("{field} must not contain line breaks")]
    LineBreak {
        /// which part of the entry was rejected, "key" or "value"
        field: &'static str,
    },

    /// a request or response did not fit into the bounded message slot
    #[error("message of {len} bytes exceeds the {max} byte limit")]
    MessageTooLong {
        /// length of the rejected message in bytes
        len: usize,
        /// the configured bound
        max: usize,
    },

    /// the mailbox or dispatcher was shut down
    #[error("channel closed")]
    ChannelClosed,

    /// a blocking wait on the channel exceeded the configured timeout
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// variant for errors that occur when parsing input
    #[error("{0}")]
    Parsing(String),

    /// an invalid configuration value
    #[error("invalid configuration: {0}")]
    Config(String),

    /// (de)serialization of a configuration or health report failed
    #[error("serde error: {0}")]
    Json(#[from] serde_json::Error),

    /// catch-all error carrying a message
    #[error("{0}")]
    StringErr(String),
}
