//! A `TaskPool` runs a batch of deferred, zero-argument tasks over a
//! fixed number of worker threads and hands back their results in
//! submission order, whatever order they finished in.  The first task
//! failure fails the whole batch: it is logged with the failing
//! task's submission index and returned from `execute`; results from
//! tasks still in flight are discarded, not cancelled.
//!
//! A pool of size 1 runs the batch strictly sequentially through the
//! same per-task wrapper, which makes single-threaded debugging
//! deterministic.  A pool is single-use: `execute` consumes it.
use std::panic::AssertUnwindSafe;
use std::sync::mpsc;
use std::sync::Arc;
use std::sync::Mutex;
use std::thread;

use derivative::Derivative;
use tracing::debug;
use tracing::error;

use crate::error::Error;
use crate::error::Result;

type Task<T> = Box<dyn FnOnce() -> Result<T> + Send>;

/// A single-use, fixed-concurrency batch executor.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct TaskPool<T> {
    pool_size: usize,
    #[derivative(Debug = "ignore")]
    tasks: Vec<Task<T>>,
}

/// Runs one task, mapping its error (or panic) to a failure that
/// carries the submission index.
fn run_task<T>(index: usize, task: Task<T>) -> Result<T> {
    match std::panic::catch_unwind(AssertUnwindSafe(|| task())) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            error!(task = index, error = %e, "task failed");
            Err(Error::TaskFailed {
                index,
                source: Box::new(e),
            })
        }
        Err(_) => {
            error!(task = index, "task panicked");
            Err(Error::TaskPanicked { index })
        }
    }
}

impl<T: Send + 'static> TaskPool<T> {
    /// Returns an empty pool that will run its batch over
    /// `pool_size` concurrent workers.
    ///
    /// A zero size makes no sense; treat it as one.
    pub fn new(mut pool_size: usize) -> TaskPool<T> {
        if pool_size == 0 {
            pool_size = 1;
        }

        TaskPool {
            pool_size,
            tasks: Vec::new(),
        }
    }

    /// Appends `task` to the batch.  Nothing runs until `execute`;
    /// the task's submission index determines where its result lands
    /// in the output.
    pub fn add_task(&mut self, task: impl FnOnce() -> Result<T> + Send + 'static) {
        self.tasks.push(Box::new(task));
    }

    /// Number of tasks submitted so far.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Returns whether no task has been submitted yet.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Runs the batch to completion and returns the results in
    /// submission order, or the first failure encountered.
    pub fn execute(self) -> Result<Vec<T>> {
        debug!(tasks = self.tasks.len(), workers = self.pool_size, "processing batch");
        if self.pool_size == 1 {
            return self.execute_sequential();
        }

        let task_count = self.tasks.len();
        let (work_tx, work_rx) = mpsc::channel::<(usize, Task<T>)>();
        let work_rx = Arc::new(Mutex::new(work_rx));
        let (result_tx, result_rx) = mpsc::channel::<(usize, Result<T>)>();

        let mut workers = Vec::new();
        for i in 0..self.pool_size.min(task_count) {
            let work_rx = Arc::clone(&work_rx);
            let result_tx = result_tx.clone();
            let worker = thread::Builder::new()
                .name(format!("pool-worker-{}", i))
                .spawn(move || loop {
                    // Hold the queue lock only to pull the next task.
                    // Task bodies run outside it and their panics are
                    // caught in `run_task`, so the lock cannot be
                    // poisoned; the unwrap is unconditional.
                    let item = { work_rx.lock().unwrap().recv() };
                    let (index, task) = match item {
                        Ok(item) => item,
                        Err(_) => break,
                    };

                    if result_tx.send((index, run_task(index, task))).is_err() {
                        // The collector stopped listening: a failure
                        // was already reported, drain no further.
                        break;
                    }
                })?;
            workers.push(worker);
        }
        drop(result_tx);

        for item in self.tasks.into_iter().enumerate() {
            // Send cannot fail while we hold worker handles: at
            // least one receiver clone is still alive.
            let _ = work_tx.send(item);
        }
        drop(work_tx);

        let mut slots: Vec<Option<T>> = (0..task_count).map(|_| None).collect();
        let mut failure = None;
        for _ in 0..task_count {
            match result_rx.recv() {
                Ok((index, Ok(value))) => slots[index] = Some(value),
                Ok((_, Err(e))) => {
                    failure = Some(e);
                    break;
                }
                Err(_) => break,
            }
        }

        // Unblock and reap the workers before reporting.  In-flight
        // tasks run to completion; their results go nowhere.
        drop(result_rx);
        for worker in workers {
            let _ = worker.join();
        }

        if let Some(e) = failure {
            return Err(e);
        }

        let mut results = Vec::with_capacity(task_count);
        for (index, slot) in slots.into_iter().enumerate() {
            match slot {
                Some(value) => results.push(value),
                // Only reachable if a worker died without reporting.
                None => return Err(Error::TaskPanicked { index }),
            }
        }

        Ok(results)
    }

    /// The strictly sequential size-1 path.
    fn execute_sequential(self) -> Result<Vec<T>> {
        let mut results = Vec::with_capacity(self.tasks.len());
        for (index, task) in self.tasks.into_iter().enumerate() {
            results.push(run_task(index, task)?);
        }

        Ok(results)
    }
}
