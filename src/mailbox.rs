//! The single-slot request/response mailbox.
//!
//! A [`Mailbox`] holds exactly one request slot, one response slot and a "ready" flag for each.
//! A client writes a command into the request slot and raises `request_ready`; the server clears
//! the flag, processes the command, writes the result into the response slot and raises
//! `response_ready`; the client takes the result and clears that flag. Waiting on either side
//! blocks on a condition variable instead of polling.
//!
//! The handshake itself is only sound for one client at a time. If two clients use the raw
//! [`submit`](Mailbox::submit) / [`await_response`](Mailbox::await_response) pair concurrently,
//! the second one can submit as soon as the server has picked up the first request, and may
//! then consume the response that was meant for the first. [`Mailbox::call`] (and
//! [`MailboxClient`]) serialize the whole exchange with a session lock to rule that out.
//!
//! Closing the mailbox stops new submissions. A request the server has already been handed, or
//! that is waiting in the slot, is still processed and its response can still be collected.
use std::mem;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, info, instrument, trace};

use crate::config::{MAX_MESSAGE_LEN, MIN_MESSAGE_LEN};
use crate::{KvsEngine, KvsError, Processor, Result};

#[derive(Debug, Default)]
struct Slots {
    request: String,
    response: String,
    request_ready: bool,
    response_ready: bool,
    // the server took a request and hasn't posted its response yet
    in_flight: bool,
    // the client that sent the in-flight request gave up waiting for it
    discard_response: bool,
    closed: bool,
}

impl Slots {
    /// `true` while a client still has a response to wait for
    fn response_pending(&self) -> bool {
        !self.closed || self.request_ready || self.in_flight
    }
}

/// A single-slot request/response channel shared by one server and any number of clients.
#[derive(Debug)]
pub struct Mailbox {
    slots: Mutex<Slots>,
    changed: Condvar,
    // serializes whole submit/await exchanges for `call`
    session: Mutex<()>,
    max_len: usize,
}

impl Default for Mailbox {
    fn default() -> Self {
        Mailbox::new(MAX_MESSAGE_LEN)
    }
}

impl Mailbox {
    /// creates an open, empty mailbox whose slots hold at most `max_len` bytes. Bounds below
    /// [`MIN_MESSAGE_LEN`] are raised to it.
    pub fn new(max_len: usize) -> Self {
        Mailbox {
            slots: Mutex::new(Slots::default()),
            changed: Condvar::new(),
            session: Mutex::new(()),
            max_len: max_len.max(MIN_MESSAGE_LEN),
        }
    }

    /// the byte bound of the request and response slots
    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// deposits `request` into the request slot and raises `request_ready`. Waits for the slot to
    /// be free first.
    ///
    /// # Errors
    /// - [`KvsError::MessageTooLong`] if `request` doesn't fit into the slot
    /// - [`KvsError::ChannelClosed`] if the mailbox is closed
    /// - [`KvsError::Timeout`] if the slot didn't become free within `timeout`
    pub fn submit(&self, request: &str, timeout: Option<Duration>) -> Result<()> {
        self.check_len(request)?;
        let mut slots = self.wait(timeout, |s| s.request_ready && !s.closed)?;
        if slots.closed {
            return Err(KvsError::ChannelClosed);
        }
        slots.request.clear();
        slots.request.push_str(request);
        slots.request_ready = true;
        trace!(%request, "request submitted");
        drop(slots);
        self.changed.notify_all();
        Ok(())
    }

    /// waits for `response_ready`, takes the response and clears the flag
    ///
    /// # Errors
    /// - [`KvsError::ChannelClosed`] if the mailbox was closed with no response left to deliver
    /// - [`KvsError::Timeout`] if no response arrived within `timeout`
    pub fn await_response(&self, timeout: Option<Duration>) -> Result<String> {
        let mut slots = self.wait(timeout, |s| !s.response_ready && s.response_pending())?;
        if !slots.response_ready {
            return Err(KvsError::ChannelClosed);
        }
        let response = mem::take(&mut slots.response);
        slots.response_ready = false;
        drop(slots);
        self.changed.notify_all();
        Ok(response)
    }

    /// submits `request` and waits for its response, holding the session lock for the whole
    /// exchange so concurrent callers can't pick up each other's responses
    ///
    /// If the wait for the response times out the exchange is abandoned: a request the server
    /// hasn't taken yet is withdrawn, and a response that arrives later is thrown away instead of
    /// answering the next call.
    pub fn call(&self, request: &str, timeout: Option<Duration>) -> Result<String> {
        self.check_len(request)?;
        let _session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        self.submit(request, timeout)?;
        match self.await_response(timeout) {
            Err(KvsError::Timeout(limit)) => {
                self.abandon();
                Err(KvsError::Timeout(limit))
            }
            result => result,
        }
    }

    fn abandon(&self) {
        let mut slots = self.lock();
        if slots.request_ready {
            slots.request_ready = false;
            slots.request.clear();
            debug!("withdrew a request the server never took");
        } else if slots.response_ready {
            slots.response_ready = false;
            slots.response.clear();
            debug!("dropped a response that came in after its timeout");
        } else if slots.in_flight {
            slots.discard_response = true;
            debug!("response to the in-flight request will be dropped");
        }
        drop(slots);
        self.changed.notify_all();
    }

    /// server side: waits until a request is ready, clears `request_ready` and returns the
    /// request.
    ///
    /// # Errors
    /// returns [`KvsError::ChannelClosed`] once the mailbox is closed and no request is left
    pub fn take_request(&self) -> Result<String> {
        let mut slots = self.wait(None, |s| !s.request_ready && !s.closed)?;
        if !slots.request_ready {
            return Err(KvsError::ChannelClosed);
        }
        slots.request_ready = false;
        slots.in_flight = true;
        let request = mem::take(&mut slots.request);
        drop(slots);
        self.changed.notify_all();
        Ok(request)
    }

    /// server side: writes `response` into the response slot and raises `response_ready`. Waits
    /// for the previous response to be consumed first. A response whose [`call`](Mailbox::call)
    /// already timed out is dropped.
    ///
    /// # Errors
    /// - [`KvsError::MessageTooLong`] if `response` doesn't fit into the slot
    /// - [`KvsError::ChannelClosed`] if the mailbox was closed while an earlier response was
    ///   still unclaimed
    pub fn post_response(&self, response: &str) -> Result<()> {
        self.check_len(response)?;
        let mut slots = self.wait(None, |s| s.response_ready && !s.closed)?;
        slots.in_flight = false;
        if slots.discard_response {
            slots.discard_response = false;
            trace!(%response, "response dropped, its client gave up");
            drop(slots);
            self.changed.notify_all();
            return Ok(());
        }
        if slots.response_ready {
            drop(slots);
            self.changed.notify_all();
            return Err(KvsError::ChannelClosed);
        }
        slots.response.clear();
        slots.response.push_str(response);
        slots.response_ready = true;
        trace!(%response, "response posted");
        drop(slots);
        self.changed.notify_all();
        Ok(())
    }

    /// stops accepting requests and wakes every waiter. Requests already submitted are still
    /// handed to the server.
    pub fn close(&self) {
        self.lock().closed = true;
        self.changed.notify_all();
        debug!("mailbox closed");
    }

    /// `true` once [`close`](Mailbox::close) was called
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn check_len(&self, message: &str) -> Result<()> {
        if message.len() > self.max_len {
            Err(KvsError::MessageTooLong {
                len: message.len(),
                max: self.max_len,
            })
        } else {
            Ok(())
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// blocks while `blocked` holds, for at most `timeout`
    fn wait<F>(&self, timeout: Option<Duration>, mut blocked: F) -> Result<MutexGuard<'_, Slots>>
    where
        F: FnMut(&mut Slots) -> bool,
    {
        let slots = self.lock();
        match timeout {
            None => Ok(self
                .changed
                .wait_while(slots, blocked)
                .unwrap_or_else(PoisonError::into_inner)),
            Some(limit) => {
                let (slots, result) = self
                    .changed
                    .wait_timeout_while(slots, limit, &mut blocked)
                    .unwrap_or_else(PoisonError::into_inner);
                if result.timed_out() {
                    Err(KvsError::Timeout(limit))
                } else {
                    Ok(slots)
                }
            }
        }
    }
}

/// A client session attached to a shared [`Mailbox`].
///
/// Every [`call`](MailboxClient::call) holds the mailbox's session lock from submission until
/// the response is taken, so any number of `MailboxClient`s can share one mailbox.
#[derive(Debug, Clone)]
pub struct MailboxClient {
    mailbox: Arc<Mailbox>,
    timeout: Option<Duration>,
}

impl MailboxClient {
    /// attaches a client to `mailbox`. Every wait is bounded by `timeout`, if given.
    pub fn attach(mailbox: Arc<Mailbox>, timeout: Option<Duration>) -> Self {
        MailboxClient { mailbox, timeout }
    }

    /// sends one command line and returns the result line
    ///
    /// # Errors
    /// returns an error if the command is too long, the mailbox is closed or a wait timed out
    pub fn call(&self, request: &str) -> Result<String> {
        self.mailbox.call(request, self.timeout)
    }
}

/// The server side of a [`Mailbox`]: a single control loop that takes one request at a time,
/// runs it through a [`Processor`] and posts the result.
#[derive(Debug)]
pub struct MailboxServer<E: KvsEngine> {
    mailbox: Arc<Mailbox>,
    processor: Processor<E>,
}

impl<E: KvsEngine> MailboxServer<E> {
    /// creates a server that answers requests from `mailbox` using `engine`
    pub fn new(mailbox: Arc<Mailbox>, engine: E) -> Self {
        MailboxServer {
            mailbox,
            processor: Processor::new(engine),
        }
    }

    /// serves requests until the mailbox is closed and drained
    ///
    /// # Errors
    /// returns an error only if the mailbox rejects a response the processor produced
    #[instrument(skip(self))]
    pub fn run(&self) -> Result<()> {
        info!("mailbox server running, waiting for requests");
        let max_len = self.mailbox.max_len();
        loop {
            let request = match self.mailbox.take_request() {
                Ok(request) => request,
                Err(KvsError::ChannelClosed) => break,
                Err(e) => return Err(e),
            };
            debug!("received request: {:?}", request);
            let response = self.processor.respond(&request, max_len);
            debug!("sending response: {:?}", response);
            match self.mailbox.post_response(&response) {
                Ok(()) => {}
                Err(KvsError::ChannelClosed) => break,
                Err(e) => return Err(e),
            }
        }
        info!("mailbox closed, server stopped");
        Ok(())
    }
}
