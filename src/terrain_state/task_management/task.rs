//! # Task System Core Trait
//!
//! A [`Task`] is a self-contained unit of work shipped to a worker thread. It owns all
//! the data it needs and hands back a typed output that the main thread consumes when it
//! polls the pool.
//!
//! ## Task Lifecycle
//! 1. The main thread publishes a boxed task to a free [`WorkerPool`] slot
//! 2. The worker calls [`Task::process`], consuming the task
//! 3. The output is queued on the slot's result channel
//! 4. The main thread collects it with [`WorkerPool::poll_completed`]
//!
//! ## Thread Safety
//! - Tasks must be `Send` to cross into the worker
//! - Outputs must be `Send` to travel back
//! - Tasks never share mutable state with the main thread; snapshots are copied in
//!
//! [`WorkerPool`]: super::WorkerPool
//! [`WorkerPool::poll_completed`]: super::WorkerPool::poll_completed

/// A unit of work executed on a worker thread.
///
/// # Implementation Guidelines
/// - Own every input, including any scratch buffers, and return them in the output
///   when they should be reused
/// - Keep tasks coarse: one chunk or one column per task
pub trait Task: Send {
    /// The value returned to the main thread.
    type Output: Send + 'static;

    /// Performs the work. Runs on a worker thread.
    fn process(self: Box<Self>) -> Self::Output;
}

/// A type-erased task producing `T`.
pub type BoxedTask<T> = Box<dyn Task<Output = T>>;
