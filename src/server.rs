use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, Sender};
use crossbeam::sync::WaitGroup;
use tracing::{debug, error, info};

use crate::client::KvsClient;
use crate::config::{MAX_MESSAGE_LEN, MIN_MESSAGE_LEN};
use crate::thread_pool::ThreadPool;
use crate::{KvsEngine, KvsError, Processor, Result};

/// the messages a [`KvsServer`] receives on its request queue
pub(crate) enum Message {
    /// a command line together with the channel its response goes back on
    Request { line: String, reply: Sender<String> },
    Shutdown,
}

/// A dispatching server over a key value storage engine.
///
/// Clients don't share a response slot: every request carries its own reply channel, so
/// responses can't be picked up by the wrong client. The server loop receives requests from a
/// single queue and hands each one to a [`ThreadPool`], so reads run concurrently up to the
/// engine's admission limit while writes serialize on its exclusive lock.
///
/// # Example
/// Start a server with 4 worker threads, run a command, and shut it down
/// ```rust
/// use kvs_mailbox::{Config, KvStore, KvsServer};
/// use kvs_mailbox::thread_pool::{SharedQueueThreadPool, ThreadPool};
/// # fn main() -> kvs_mailbox::Result<()> {
/// let engine = KvStore::open(&Config::default())?;
/// let pool = SharedQueueThreadPool::new(4)?;
/// let handle = KvsServer::new(engine, pool).start()?;
/// let client = handle.connect();
/// assert_eq!(client.call("CREATE 1 value_A")?, "SUCCESS: CREATE for 1");
/// handle.shutdown()?;
/// # Ok(())
/// # }
/// ```
pub struct KvsServer<E: KvsEngine, P: ThreadPool> {
    processor: Processor<E>,
    pool: P,
    max_len: usize,
    timeout: Option<Duration>,
}

impl<E: KvsEngine, P: ThreadPool> KvsServer<E, P> {
    /// Create a new `KvsServer` using the given [`KvsEngine`] and [`ThreadPool`] implementation.
    pub fn new(engine: E, pool: P) -> Self {
        KvsServer {
            processor: Processor::new(engine),
            pool,
            max_len: MAX_MESSAGE_LEN,
            timeout: None,
        }
    }

    /// sets the byte bound on requests and responses. Bounds below [`MIN_MESSAGE_LEN`] are
    /// raised to it.
    pub fn max_message_len(mut self, max_len: usize) -> Self {
        self.max_len = max_len.max(MIN_MESSAGE_LEN);
        self
    }

    /// sets how long clients of this server wait for a response
    pub fn response_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// starts the server loop on its own thread and returns a handle for connecting clients and
    /// shutting the server down
    ///
    /// # Errors
    /// returns an IO error if the server thread could not be spawned
    pub fn start(self) -> Result<ServerHandle> {
        let (tx, rx) = channel::unbounded();
        let max_len = self.max_len;
        let timeout = self.timeout;
        let thread = thread::Builder::new()
            .name("kvs-dispatcher".into())
            .spawn(move || self.run(rx))?;
        Ok(ServerHandle {
            tx,
            thread: Some(thread),
            max_len,
            timeout,
        })
    }

    /// receives requests until a shutdown message arrives, then waits for the requests already
    /// handed to the pool to finish. Requests queued behind the shutdown are dropped, their
    /// clients see [`KvsError::ChannelClosed`].
    fn run(self, rx: Receiver<Message>) {
        info!("dispatcher running, waiting for requests");
        let in_flight = WaitGroup::new();
        for message in rx.iter() {
            match message {
                Message::Request { line, reply } => {
                    debug!("received request: {:?}", line);
                    let processor = self.processor.clone();
                    let max_len = self.max_len;
                    let done = in_flight.clone();
                    self.pool.spawn(move || {
                        let response = processor.respond(&line, max_len);
                        if reply.send(response).is_err() {
                            debug!("client went away before its response to {:?}", line);
                        }
                        drop(done);
                    });
                }
                Message::Shutdown => break,
            }
        }
        in_flight.wait();
        info!("dispatcher drained, server stopped");
    }
}

/// A handle to a running [`KvsServer`].
///
/// Dropping the handle shuts the server down as well.
pub struct ServerHandle {
    tx: Sender<Message>,
    thread: Option<JoinHandle<()>>,
    max_len: usize,
    timeout: Option<Duration>,
}

impl ServerHandle {
    /// creates a client session connected to this server
    pub fn connect(&self) -> KvsClient {
        KvsClient::new(self.tx.clone(), self.max_len, self.timeout)
    }

    /// stops the server after the requests it already received have been answered
    ///
    /// # Errors
    /// returns an error if the server thread panicked
    pub fn shutdown(mut self) -> Result<()> {
        self.stop()
    }

    fn stop(&mut self) -> Result<()> {
        match self.thread.take() {
            Some(thread) => {
                // the loop only exits on shutdown, so the receiver is still alive here
                let _ = self.tx.send(Message::Shutdown);
                thread.join().map_err(|_| {
                    error!("dispatcher thread panicked");
                    KvsError::StringErr("dispatcher thread panicked".into())
                })
            }
            None => Ok(()),
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            error!("error stopping server: {}", e);
        }
    }
}
