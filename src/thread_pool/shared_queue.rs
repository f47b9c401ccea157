use std::thread;

use crossbeam::channel::{self, Receiver, Sender};
use tracing::{debug, error, instrument};

use super::ThreadPool;
use crate::Result;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A thread pool implemented with a shared job queue (i.e. channel).
///
/// This implementation uses the MPMC [`channel`] provided by the crossbeam crate.
/// Specifically, we are using it as a single producer, multiple consumer. The single producer
/// is this type itself, and the threads in the pool are the consumers
///
/// If a spawned task panics, the old thread will be destroyed and a new one will be
/// created. A failure to create the replacement thread is only logged, so the number of
/// threads can drop to zero. Jobs spawned after that are logged and dropped unrun.
///
/// Dropping the pool closes the queue; the threads finish the jobs already queued and exit.
///
/// [`channel`]: https://docs.rs/crossbeam/0.8.1/crossbeam/channel/index.html
pub struct SharedQueueThreadPool {
    /// the sending part of the channel
    tx: Sender<Job>,
}

impl ThreadPool for SharedQueueThreadPool {
    /// create a new "thread pool" with the given number of `threads`.
    /// Every thread created will have a handle to the receiving end of the channel
    fn new(threads: u32) -> Result<Self> {
        let (tx, rx) = channel::unbounded::<Job>();
        for i in 0..threads {
            let task_rx = TaskReceiver(rx.clone());
            thread::Builder::new()
                .name(format!("kvs-worker-{}", i))
                .spawn(move || run_tasks(task_rx))?;
        }
        debug!("created shared queue pool with {} threads", threads);
        Ok(SharedQueueThreadPool { tx })
    }

    /// Spawns a function into the thread pool. If no thread is left to run it the job is
    /// dropped, along with everything it captured.
    fn spawn<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if let Err(e) = self.tx.send(Box::new(job)) {
            error!("no threads left in the pool, dropping job");
            drop(e.into_inner());
        }
    }
}

/// A type that can receive tasks (i.e. closures) from a channel and run them.
/// Additionally, this type is responsible for restarting any threads that panicked
#[derive(Clone)]
struct TaskReceiver(Receiver<Job>);

impl Drop for TaskReceiver {
    fn drop(&mut self) {
        if thread::panicking() {
            debug!("thread panicked, starting a new thread");
            let task_rx = self.clone();
            if let Err(e) = thread::Builder::new().spawn(move || run_tasks(task_rx)) {
                error!("Failed to spawn a thread: {}", e);
            }
        }
    }
}

/// this function waits for a task to arrive on its (wrapped) receiver, and then runs the task.
/// Returns once the pool has been dropped and the queue is empty.
#[instrument(skip(rx))]
fn run_tasks(rx: TaskReceiver) {
    while let Ok(task) = rx.0.recv() {
        task();
    }
    debug!("Thread exited because the thread pool was destroyed.");
}
