#![deny(missing_docs)]
//! An in-process key-value service that maps [`String`] keys to [`String`] values and serves
//! them to concurrent clients through a single shared request/response mailbox.
//!
//! ## Supported Operations
//! Clients send one-line text commands:
//!
//! - `CREATE <key> <value>` inserts or overwrites a key
//! - `READ <key>` returns the value of a key
//! - `UPDATE <key> <value>` inserts or overwrites a key (identical to `CREATE`)
//! - `DELETE <key>` removes a key
//!
//! and receive a one-line text result such as `SUCCESS: CREATE for 1`, `READ: 1 => value_A` or
//! `ERROR: Key 1 not found`. See the [`Request`] and [`Response`] types for the full protocol.
//! Requests and responses are bounded to [`MAX_MESSAGE_LEN`] bytes by default; longer messages
//! are rejected with an error instead of being truncated.
//!
//! ## KvStore
//! [`KvStore`] is the implementor of the [`KvsEngine`] trait. It is responsible for:
//! - keeping kv data in an in-memory [`Store`]
//! - bounding concurrent reads with the ticket pool of an [`AdmissionGate`] (10 tickets by
//!   default), and giving writers exclusive access through the same gate
//! - rewriting the whole [`Snapshot`] file after every mutation, inside the writer's exclusive
//!   section
//! - loading kv data from the snapshot file at start-up
//!
//! A snapshot that can't be written is logged, and the in-memory data remains authoritative;
//! [`KvStore::health`] reports the degraded durability.
//!
//! ## Transports
//! Two ways of reaching the store are provided:
//!
//! - [`Mailbox`]: one request slot, one response slot and two ready flags, served by the single
//!   control loop of a [`MailboxServer`]. The raw handshake is only safe for one client at a
//!   time; [`MailboxClient`] serializes whole exchanges with a session lock.
//! - [`KvsServer`]: a dispatcher that gives every request its own reply channel and runs
//!   requests on a [`ThreadPool`], so reads proceed concurrently up to the admission limit.
//!
//! Both transports shut down cleanly: closing them stops new requests and answers the ones
//! already accepted.
//!
//! ## Snapshot File
//! The snapshot is UTF-8 text with one line per key followed by one line per value. Since
//! there is no escaping, keys and values containing line breaks are rejected.
//!
//! ### Executables
//! - `kvs-shell` reads commands from stdin and prints the results
//! - `kvs-bench` runs many concurrent clients issuing random commands
//!
//! [`String`]: https://doc.rust-lang.org/std/string/struct.String.html
//! [`ThreadPool`]: ./thread_pool/trait.ThreadPool.html

pub use client::KvsClient;
pub use command::{Request, Response};
pub use config::{Config, MAX_MESSAGE_LEN};
pub use engine::{Health, KvStore, KvsEngine, Snapshot, Store};
pub use error::{KvsError, Result};
pub use gate::{AdmissionGate, ExclusiveGuard, GateStats, ReadTicket};
pub use mailbox::{Mailbox, MailboxClient, MailboxServer};
pub use processor::Processor;
pub use server::{KvsServer, ServerHandle};
pub use thread_pool::{NaiveThreadPool, RayonThreadPool, SharedQueueThreadPool, ThreadPool};

mod client;
mod command;
pub mod config;
pub mod engine;
mod error;
mod gate;
mod mailbox;
mod processor;
mod server;
pub mod thread_pool;
