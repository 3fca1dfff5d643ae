//! Worker pool used for parallel ingestion.
//!
//! Provides a small thread pool that manages worker lifecycle, task
//! distribution and result collection over bounded `crossbeam_channel`s.
//!
//! # Key features
//! - Bounded channels keep memory flat while workers outpace the writer
//! - Graceful shutdown on drop, even if workers are blocked on a full
//!   output channel
//! - Generic over task and output types

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{bounded, Receiver, RecvError, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

/// Thread pool with one shared task queue and one output queue.
///
/// - Task channel: Main thread -> Workers
/// - Output channel: Workers -> Main thread
/// - Shutdown flag: set on drop; long-running workers should poll it
pub(crate) struct WorkerPool<Task, Output> {
    workers: Vec<thread::JoinHandle<()>>,
    task_tx: Option<Sender<Task>>,
    output_rx: Option<Receiver<Output>>,
    shutdown: Arc<AtomicBool>,
}

impl<Task, Output> WorkerPool<Task, Output>
where
    Task: Send + 'static,
    Output: Send + 'static,
{
    /// Spawns `num_workers` threads running `worker_fn`.
    ///
    /// `task_buffer` bounds the task queue and `output_buffer` the output
    /// queue; both must be > 0.
    pub(crate) fn new<F>(
        name: &str,
        num_workers: usize,
        task_buffer: usize,
        output_buffer: usize,
        worker_fn: F,
    ) -> Result<Self>
    where
        F: Fn(Receiver<Task>, Sender<Output>, Arc<AtomicBool>) + Send + Sync + 'static,
    {
        if num_workers == 0 {
            return Err(anyhow!(
                "Cannot create WorkerPool with 0 workers. \
                Either set num_workers > 0 or use single-threaded mode."
            ));
        }
        if task_buffer == 0 || output_buffer == 0 {
            return Err(anyhow!(
                "Cannot create WorkerPool with a zero-sized buffer. \
                Buffer sizes must be > 0 to prevent deadlocks."
            ));
        }

        let (task_tx, task_rx) = bounded(task_buffer);
        let (output_tx, output_rx) = bounded(output_buffer);
        let shutdown = Arc::new(AtomicBool::new(false));
        let worker_fn = Arc::new(worker_fn);
        let mut workers = Vec::with_capacity(num_workers);

        for worker_id in 0..num_workers {
            let task_rx = task_rx.clone();
            let output_tx = output_tx.clone();
            let shutdown = shutdown.clone();
            let worker_fn = worker_fn.clone();

            let handle = thread::Builder::new()
                .name(format!("{name}-{worker_id}"))
                .spawn(move || worker_fn(task_rx, output_tx, shutdown))
                .with_context(|| format!("Failed to spawn worker thread {worker_id}"))?;
            workers.push(handle);
        }

        Ok(Self {
            workers,
            task_tx: Some(task_tx),
            output_rx: Some(output_rx),
            shutdown,
        })
    }

    /// Queues one task. Blocks while the task queue is full.
    pub(crate) fn submit(&self, task: Task) -> Result<()> {
        self.task_tx
            .as_ref()
            .ok_or_else(|| anyhow!("Task queue already closed"))?
            .send(task)
            .map_err(|_| anyhow!("All workers have exited"))
    }

    /// Closes the task queue so workers exit once it is drained.
    pub(crate) fn close_tasks(&mut self) {
        self.task_tx.take();
    }

    /// Blocks until a worker produces output. Errors once every worker has
    /// exited and the queue is empty.
    pub(crate) fn recv(&self) -> Result<Output, RecvError> {
        match &self.output_rx {
            Some(rx) => rx.recv(),
            None => Err(RecvError),
        }
    }
}

impl<Task, Output> Drop for WorkerPool<Task, Output> {
    fn drop(&mut self) {
        // Signal shutdown to all workers
        self.shutdown.store(true, Ordering::Relaxed);

        // Close both channels: idle workers see the closed task queue, busy
        // ones fail their next send.
        self.task_tx.take();
        self.output_rx.take();

        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}
