use std::time::Duration;

use crossbeam::channel::{self, RecvTimeoutError, Sender};

use crate::command::Request;
use crate::server::Message;
use crate::{KvsError, Result};

/// `KvsClient` is a client session of a [`KvsServer`](crate::KvsServer).
///
/// Each call sends the command line together with a fresh reply channel, so the response that
/// comes back is always the one for that call. Clients are cheap to clone; clones are
/// independent sessions.
#[derive(Debug, Clone)]
pub struct KvsClient {
    requests: Sender<Message>,
    max_len: usize,
    timeout: Option<Duration>,
}

impl KvsClient {
    pub(crate) fn new(requests: Sender<Message>, max_len: usize, timeout: Option<Duration>) -> Self {
        KvsClient {
            requests,
            max_len,
            timeout,
        }
    }

    /// sends one command line to the server and returns the result line
    ///
    /// # Errors
    /// - [`KvsError::MessageTooLong`] if `line` exceeds the server's message bound
    /// - [`KvsError::ChannelClosed`] if the server has shut down
    /// - [`KvsError::Timeout`] if no response arrived within the configured timeout
    pub fn call(&self, line: &str) -> Result<String> {
        if line.len() > self.max_len {
            return Err(KvsError::MessageTooLong {
                len: line.len(),
                max: self.max_len,
            });
        }
        let (reply, response) = channel::bounded(1);
        self.requests
            .send(Message::Request {
                line: line.to_owned(),
                reply,
            })
            .map_err(|_| KvsError::ChannelClosed)?;

        match self.timeout {
            None => response.recv().map_err(|_| KvsError::ChannelClosed),
            Some(limit) => response.recv_timeout(limit).map_err(|e| match e {
                RecvTimeoutError::Timeout => KvsError::Timeout(limit),
                RecvTimeoutError::Disconnected => KvsError::ChannelClosed,
            }),
        }
    }

    /// sends `CREATE key value`
    ///
    /// The typed helpers refuse keys that aren't a single whitespace-free token and values with
    /// line breaks, see [`Request::to_line`].
    pub fn create(&self, key: String, value: String) -> Result<String> {
        self.call(&Request::Create { key, value }.to_line()?)
    }

    /// sends `READ key`
    pub fn read(&self, key: String) -> Result<String> {
        self.call(&Request::Read { key }.to_line()?)
    }

    /// sends `UPDATE key value`
    pub fn update(&self, key: String, value: String) -> Result<String> {
        self.call(&Request::Update { key, value }.to_line()?)
    }

    /// sends `DELETE key`
    pub fn delete(&self, key: String) -> Result<String> {
        self.call(&Request::Delete { key }.to_line()?)
    }
}
