//! Thread pools the [`KvsServer`](crate::KvsServer) dispatcher runs requests on.
//!
//! Three implementations are provided:
//! - [`NaiveThreadPool`] starts a new thread for every job
//! - [`SharedQueueThreadPool`] feeds a fixed set of threads from a crossbeam channel
//! - [`RayonThreadPool`] hands jobs to a rayon work-stealing pool
use crate::Result;

mod naive;
mod rayon_pool;
mod shared_queue;

pub use self::naive::NaiveThreadPool;
pub use self::rayon_pool::RayonThreadPool;
pub use self::shared_queue::SharedQueueThreadPool;

/// The trait all thread pools implement.
pub trait ThreadPool: Send + 'static {
    /// Creates a new thread pool, immediately spawning the specified number of threads.
    ///
    /// # Errors
    /// Returns an error if any thread fails to spawn. All previously-spawned threads are
    /// terminated.
    fn new(threads: u32) -> Result<Self>
    where
        Self: Sized;

    /// Spawns a function into the thread pool.
    ///
    /// Spawning always succeeds, but if the function panics the thread pool continues to operate
    /// with the same number of threads; the thread count is not reduced nor is the thread pool
    /// destroyed, corrupted or invalidated.
    fn spawn<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static;
}
