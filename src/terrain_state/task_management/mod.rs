//! # Task Management System
//!
//! A small, fixed-size pool of worker threads that the terrain update loop feeds and
//! polls once per tick. The main thread never blocks on a worker.
//!
//! ## Architecture Overview
//!
//! - [`WorkerPool`]: owns one [`TaskChannel`] per slot and distributes tasks round-robin
//! - [`Task`]: a unit of work with a typed output
//! - [`Completion`]: a finished job, tagged with the slot it ran on
//!
//! Each slot is backed by one OS thread with a dedicated task channel and result
//! channel. A slot holds at most [`MAX_TASKS_IN_FLIGHT`] task, so the number of busy
//! slots is the number of jobs in flight. Callers keep their own ordered request queues
//! and only publish when [`WorkerPool::has_available_slot`] is true.
//!
//! ## Task Lifecycle
//! 1. `try_publish` sends a task to the next free slot
//! 2. The worker runs it inside `catch_unwind`, so a panicking task does not take the
//!    slot down with it
//! 3. `poll_completed` drains every result channel without blocking and frees the slots
//!
//! ## Performance Considerations
//! - Publishing and polling are O(slots) with no locking beyond the channels
//! - Job timings are collected in [`PoolStats`] for diagnostics
//!
//! ## Example Usage
//! ```ignore
//! let mut pool = WorkerPool::new("density", 2)?;
//! if pool.has_available_slot() {
//!     pool.try_publish(Box::new(MyTask::new(...)))?;
//! }
//!
//! // In the update loop:
//! for completion in pool.poll_completed() {
//!     // ...
//! }
//! ```

pub mod task;

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{error, info};
use web_time::Instant;

pub use task::{BoxedTask, Task};

/// Maximum number of tasks that can be in flight per worker channel.
pub const MAX_TASKS_IN_FLIGHT: usize = 1;

/// How a job ended.
#[derive(Debug)]
pub enum JobOutcome<T> {
    /// The task returned normally.
    Finished(T),
    /// The task panicked. Holds the panic message when it was a string.
    Panicked(String),
}

/// A job collected from the pool.
#[derive(Debug)]
pub struct Completion<T> {
    /// Slot the job ran on.
    pub slot: usize,
    /// Result of the job.
    pub outcome: JobOutcome<T>,
    /// Time spent inside [`Task::process`].
    pub elapsed: Duration,
}

/// Aggregate job statistics of a pool.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PoolStats {
    /// Jobs that returned normally.
    pub completed: u64,
    /// Jobs that panicked.
    pub panicked: u64,
    /// Sum of all job durations.
    pub total_time: Duration,
    /// Longest single job.
    pub max_time: Duration,
}

impl PoolStats {
    fn record<T>(&mut self, completion: &Completion<T>) {
        let finished = matches!(completion.outcome, JobOutcome::Finished(_));
        self.record_job(finished, completion.elapsed);
    }

    /// Accounts for one job that ran outside a pool.
    pub fn record_job(&mut self, finished: bool, elapsed: Duration) {
        if finished {
            self.completed += 1;
        } else {
            self.panicked += 1;
        }
        self.total_time += elapsed;
        self.max_time = self.max_time.max(elapsed);
    }

    /// Combined statistics of two pools.
    pub fn merged(self, other: PoolStats) -> PoolStats {
        PoolStats {
            completed: self.completed + other.completed,
            panicked: self.panicked + other.panicked,
            total_time: self.total_time + other.total_time,
            max_time: self.max_time.max(other.max_time),
        }
    }

    /// Mean job duration, zero before the first job.
    pub fn average_time(&self) -> Duration {
        let jobs = self.completed + self.panicked;
        if jobs == 0 {
            Duration::ZERO
        } else {
            self.total_time / jobs as u32
        }
    }
}

struct JobReport<T> {
    outcome: JobOutcome<T>,
    elapsed: Duration,
}

/// A communication channel between the main thread and one worker thread.
///
/// # Implementation Notes
/// - Dropping the sender ends the worker loop; the pool joins the thread on shutdown
struct TaskChannel<T> {
    task_sender: Option<Sender<BoxedTask<T>>>,
    result_receiver: Receiver<JobReport<T>>,
    num_tasks_in_flight: usize,
    worker: Option<JoinHandle<()>>,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// A bounded pool of worker threads polled from the update loop.
pub struct WorkerPool<T: Send + 'static> {
    name: String,
    channels: Vec<TaskChannel<T>>,
    current_channel: usize,
    stats: PoolStats,
}

impl<T: Send + 'static> WorkerPool<T> {
    /// Creates a pool with `num_workers` slots, each backed by its own thread.
    ///
    /// # Arguments
    /// * `name` - Prefix of the worker thread names, also used in log output
    /// * `num_workers` - Number of slots
    ///
    /// # Errors
    /// Returns the OS error if a worker thread cannot be spawned.
    pub fn new(name: &str, num_workers: usize) -> std::io::Result<Self> {
        let mut channels = Vec::with_capacity(num_workers);

        for index in 0..num_workers {
            let (task_tx, task_rx) = channel::<BoxedTask<T>>();
            let (result_tx, result_rx) = channel::<JobReport<T>>();

            let task_closure = move || {
                while let Ok(task) = task_rx.recv() {
                    let start = Instant::now();
                    let outcome = match catch_unwind(AssertUnwindSafe(|| task.process())) {
                        Ok(output) => JobOutcome::Finished(output),
                        Err(payload) => JobOutcome::Panicked(panic_message(payload.as_ref())),
                    };
                    let report = JobReport {
                        outcome,
                        elapsed: start.elapsed(),
                    };
                    if result_tx.send(report).is_err() {
                        break;
                    }
                }
            };

            let worker = thread::Builder::new()
                .name(format!("{name}-worker-{index}"))
                .spawn(task_closure)?;

            channels.push(TaskChannel {
                task_sender: Some(task_tx),
                result_receiver: result_rx,
                num_tasks_in_flight: 0,
                worker: Some(worker),
            });
        }

        info!("Started {name} pool with {num_workers} workers");

        Ok(WorkerPool {
            name: name.to_string(),
            channels,
            current_channel: 0,
            stats: PoolStats::default(),
        })
    }

    /// Name given at construction.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Total number of slots.
    pub fn capacity(&self) -> usize {
        self.channels.len()
    }

    /// Number of jobs currently running or waiting to be polled.
    pub fn in_flight(&self) -> usize {
        self.channels
            .iter()
            .map(|channel| channel.num_tasks_in_flight)
            .sum()
    }

    /// Whether at least one slot can take a task.
    pub fn has_available_slot(&self) -> bool {
        self.find_available_channel().is_some()
    }

    /// Job statistics collected so far.
    pub fn stats(&self) -> PoolStats {
        self.stats
    }

    /// Finds the next free slot, round-robin from the last used one.
    fn find_available_channel(&self) -> Option<usize> {
        let count = self.channels.len();
        (0..count)
            .map(|step| (self.current_channel + step) % count)
            .find(|&index| {
                let channel = &self.channels[index];
                channel.task_sender.is_some() && channel.num_tasks_in_flight < MAX_TASKS_IN_FLIGHT
            })
    }

    /// Sends a task to a free slot.
    ///
    /// # Returns
    /// - `Ok(slot)` with the slot the task was sent to
    /// - `Err(task)` if every slot is busy or the chosen worker is gone, handing the task
    ///   back so the caller can keep it queued
    pub fn try_publish(&mut self, task: BoxedTask<T>) -> Result<usize, BoxedTask<T>> {
        let Some(index) = self.find_available_channel() else {
            return Err(task);
        };
        let channel = &mut self.channels[index];
        let Some(sender) = channel.task_sender.as_ref() else {
            return Err(task);
        };

        match sender.send(task) {
            Ok(()) => {
                channel.num_tasks_in_flight += 1;
                self.current_channel = (index + 1) % self.channels.len();
                Ok(index)
            }
            Err(returned) => {
                error!("{} worker {index} disconnected", self.name);
                channel.task_sender = None;
                Err(returned.0)
            }
        }
    }

    /// Collects every finished job without blocking and frees their slots.
    pub fn poll_completed(&mut self) -> Vec<Completion<T>> {
        let mut completions = Vec::new();
        for (slot, channel) in self.channels.iter_mut().enumerate() {
            while let Ok(report) = channel.result_receiver.try_recv() {
                channel.num_tasks_in_flight = channel.num_tasks_in_flight.saturating_sub(1);
                let completion = Completion {
                    slot,
                    outcome: report.outcome,
                    elapsed: report.elapsed,
                };
                self.stats.record(&completion);
                completions.push(completion);
            }
        }
        completions
    }

    /// Stops accepting work and joins every worker. Jobs still running are allowed to
    /// finish; their results are dropped.
    pub fn shutdown(&mut self) {
        for channel in &mut self.channels {
            channel.task_sender = None;
        }
        for channel in &mut self.channels {
            if let Some(worker) = channel.worker.take() {
                if worker.join().is_err() {
                    error!("{} worker thread panicked during shutdown", self.name);
                }
            }
            channel.num_tasks_in_flight = 0;
        }
    }
}

impl<T: Send + 'static> Drop for WorkerPool<T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    struct Square(u64);

    impl Task for Square {
        type Output = u64;

        fn process(self: Box<Self>) -> u64 {
            self.0 * self.0
        }
    }

    struct Explode;

    impl Task for Explode {
        type Output = u64;

        fn process(self: Box<Self>) -> u64 {
            panic!("boom");
        }
    }

    fn drain(pool: &mut WorkerPool<u64>, expected: usize) -> Vec<Completion<u64>> {
        let mut completions = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(5);
        while completions.len() < expected && Instant::now() < deadline {
            completions.extend(pool.poll_completed());
            thread::sleep(Duration::from_millis(1));
        }
        completions
    }

    #[test]
    fn slots_are_bounded() {
        let mut pool = WorkerPool::new("test", 2).unwrap();
        assert!(pool.try_publish(Box::new(Square(2))).is_ok());
        assert!(pool.try_publish(Box::new(Square(3))).is_ok());
        assert!(!pool.has_available_slot());
        assert!(pool.try_publish(Box::new(Square(4))).is_err());
        assert_eq!(pool.in_flight(), 2);

        let mut results: Vec<u64> = drain(&mut pool, 2)
            .into_iter()
            .map(|completion| match completion.outcome {
                JobOutcome::Finished(value) => value,
                JobOutcome::Panicked(message) => panic!("{message}"),
            })
            .collect();
        results.sort();
        assert_eq!(results, vec![4, 9]);
        assert_eq!(pool.in_flight(), 0);
        assert!(pool.has_available_slot());
        assert_eq!(pool.stats().completed, 2);
    }

    #[test]
    fn panics_free_the_slot() {
        let mut pool = WorkerPool::new("test", 1).unwrap();
        let slot = pool.try_publish(Box::new(Explode)).ok().unwrap();
        let completions = drain(&mut pool, 1);
        assert_eq!(completions.len(), 1);
        assert_eq!(completions[0].slot, slot);
        assert!(matches!(&completions[0].outcome, JobOutcome::Panicked(m) if m == "boom"));

        pool.try_publish(Box::new(Square(5))).ok().unwrap();
        let completions = drain(&mut pool, 1);
        assert!(matches!(completions[0].outcome, JobOutcome::Finished(25)));
        assert_eq!(pool.stats().panicked, 1);
        assert_eq!(pool.stats().completed, 1);
    }

    #[test]
    fn shutdown_rejects_new_work() {
        let mut pool = WorkerPool::<u64>::new("test", 1).unwrap();
        pool.shutdown();
        assert!(!pool.has_available_slot());
        assert!(pool.try_publish(Box::new(Square(1))).is_err());
    }
}
