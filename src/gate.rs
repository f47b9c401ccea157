//! The admission gate guarding the in-memory store.
//!
//! The gate combines two things: a counting semaphore that bounds how many reads may run
//! against the data at the same time, and a single-writer lock that excludes every reader and
//! every other writer while a mutation is in progress.
//!
//! Waiting writers take precedence over newly arriving readers: once a writer is queued, no new
//! read ticket is handed out until that writer has been admitted and released. Readers already
//! admitted finish normally. This bounds how stale a read can be under a steady stream of
//! reads, at the cost of stalling readers behind a burst of writes.
//!
//! Read tickets and exclusive access are handed out as guards; dropping a guard returns the
//! ticket (or the lock) on every exit path.
use std::ops::{Deref, DerefMut};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;
use tracing::trace;

/// A point-in-time view of the gate's admission counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GateStats {
    /// size of the ticket pool
    pub capacity: usize,
    /// read tickets currently handed out
    pub readers: usize,
    /// whether a writer currently holds exclusive access
    pub writer: bool,
    /// writers blocked waiting for exclusive access
    pub writers_waiting: usize,
}

#[derive(Debug, Default)]
struct Counters {
    readers: usize,
    writer: bool,
    writers_waiting: usize,
}

/// the admission bookkeeping, independent of the guarded data
#[derive(Debug)]
struct Turnstile {
    capacity: usize,
    counters: Mutex<Counters>,
    changed: Condvar,
}

impl Turnstile {
    fn lock(&self) -> MutexGuard<'_, Counters> {
        // the counters are only updated by simple assignments, a poisoned lock still holds
        // consistent values
        self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_admissible(&self, c: &Counters) -> bool {
        !c.writer && c.writers_waiting == 0 && c.readers < self.capacity
    }

    fn acquire_read(&self) {
        let mut c = self
            .changed
            .wait_while(self.lock(), |c| !self.read_admissible(c))
            .unwrap_or_else(PoisonError::into_inner);
        c.readers += 1;
        trace!(readers = c.readers, "read ticket granted");
    }

    fn try_acquire_read(&self) -> bool {
        let mut c = self.lock();
        if self.read_admissible(&c) {
            c.readers += 1;
            true
        } else {
            false
        }
    }

    fn acquire_exclusive(&self) {
        let mut c = self.lock();
        c.writers_waiting += 1;
        let mut c = self
            .changed
            .wait_while(c, |c| c.writer || c.readers > 0)
            .unwrap_or_else(PoisonError::into_inner);
        c.writers_waiting -= 1;
        c.writer = true;
        trace!("exclusive access granted");
    }

    fn release(&self, kind: Access) {
        let mut c = self.lock();
        match kind {
            Access::Read => c.readers -= 1,
            Access::Exclusive => c.writer = false,
        }
        drop(c);
        self.changed.notify_all();
    }

    fn stats(&self) -> GateStats {
        let c = self.lock();
        GateStats {
            capacity: self.capacity,
            readers: c.readers,
            writer: c.writer,
            writers_waiting: c.writers_waiting,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Access {
    Read,
    Exclusive,
}

/// returns its unit of admission when dropped
#[derive(Debug)]
struct Admission<'a> {
    turnstile: &'a Turnstile,
    kind: Access,
}

impl Drop for Admission<'_> {
    fn drop(&mut self) {
        self.turnstile.release(self.kind);
    }
}

/// Guards a value of type `T` behind a bounded pool of read tickets and an exclusive write lock.
///
/// # Example
/// ```rust
/// use kvs_mailbox::AdmissionGate;
///
/// let gate = AdmissionGate::new(2, Vec::<u32>::new());
/// gate.write().push(7);
/// assert_eq!(gate.read().len(), 1);
/// ```
#[derive(Debug)]
pub struct AdmissionGate<T> {
    turnstile: Turnstile,
    // admission already rules out conflicting access, the lock only hands out the references
    data: RwLock<T>,
}

impl<T> AdmissionGate<T> {
    /// creates a gate that admits at most `capacity` concurrent readers. A capacity of zero is
    /// raised to one.
    pub fn new(capacity: usize, data: T) -> Self {
        AdmissionGate {
            turnstile: Turnstile {
                capacity: capacity.max(1),
                counters: Mutex::new(Counters::default()),
                changed: Condvar::new(),
            },
            data: RwLock::new(data),
        }
    }

    /// blocks until a read ticket is available and no writer holds or awaits the lock
    pub fn read(&self) -> ReadTicket<'_, T> {
        self.turnstile.acquire_read();
        self.read_ticket()
    }

    /// takes a read ticket only if one can be granted right away
    pub fn try_read(&self) -> Option<ReadTicket<'_, T>> {
        if self.turnstile.try_acquire_read() {
            Some(self.read_ticket())
        } else {
            None
        }
    }

    /// blocks until every admitted reader and writer has left, then grants exclusive access
    pub fn write(&self) -> ExclusiveGuard<'_, T> {
        self.turnstile.acquire_exclusive();
        ExclusiveGuard {
            data: self.data.write().unwrap_or_else(PoisonError::into_inner),
            _admission: Admission {
                turnstile: &self.turnstile,
                kind: Access::Exclusive,
            },
        }
    }

    /// returns the current admission counters
    pub fn stats(&self) -> GateStats {
        self.turnstile.stats()
    }

    fn read_ticket(&self) -> ReadTicket<'_, T> {
        ReadTicket {
            data: self.data.read().unwrap_or_else(PoisonError::into_inner),
            _admission: Admission {
                turnstile: &self.turnstile,
                kind: Access::Read,
            },
        }
    }
}

/// Shared access to the gated value. The ticket goes back to the pool when this is dropped.
#[derive(Debug)]
pub struct ReadTicket<'a, T> {
    // fields drop in declaration order: the data borrow ends before the ticket is returned
    data: RwLockReadGuard<'a, T>,
    _admission: Admission<'a>,
}

impl<T> Deref for ReadTicket<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.data
    }
}

/// Exclusive access to the gated value, released when dropped.
#[derive(Debug)]
pub struct ExclusiveGuard<'a, T> {
    data: RwLockWriteGuard<'a, T>,
    _admission: Admission<'a>,
}

impl<T> Deref for ExclusiveGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.data
    }
}

impl<T> DerefMut for ExclusiveGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.data
    }
}
