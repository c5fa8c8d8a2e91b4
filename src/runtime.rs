//! Partition executor: a bounded worker pool over event batches.
//!
//! Batches are independent. Each worker turns one batch into a partial
//! [`RunAccumulator`]; the caller merges partials in completion order.
//! The merge is the only synchronization point, and because it is
//! associative and commutative the result does not depend on scheduling.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};

use crate::accumulator::{Accumulator, RunAccumulator};
use crate::error::{ExecutionError, MulossError, MulossResult, ValidationError};
use crate::processor::MomentumLossProcessor;
use crate::schema::EventBatch;

const POOL_NAME: &str = "partition";

/// Worker pool sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Number of worker threads.
    pub workers: usize,
    /// Maximum queued batches; submission blocks beyond this.
    pub queue_capacity: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 64,
        }
    }
}

impl ExecutorConfig {
    /// Checks that both sizes are non-zero.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidConfig` otherwise.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.workers == 0 || self.queue_capacity == 0 {
            return Err(ValidationError::InvalidConfig {
                reason: format!(
                    "executor needs workers > 0 and queue_capacity > 0 (got {} / {})",
                    self.workers, self.queue_capacity
                ),
            });
        }
        Ok(())
    }
}

enum Job {
    Process {
        batch: EventBatch,
        reply: Sender<MulossResult<RunAccumulator>>,
    },
}

struct WorkerPool {
    tx: Sender<Job>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    fn start(workers: usize, queue_capacity: usize, processor: &Arc<MomentumLossProcessor>) -> Self {
        let workers = workers.max(1);
        let (tx, rx) = bounded::<Job>(queue_capacity.max(1));

        let mut handles = Vec::with_capacity(workers);
        for idx in 0..workers {
            let rx: Receiver<Job> = rx.clone();
            let processor = Arc::clone(processor);
            let handle = thread::Builder::new()
                .name(format!("muloss-{POOL_NAME}-{idx}"))
                .spawn(move || {
                    while let Ok(Job::Process { batch, reply }) = rx.recv() {
                        let result = processor.process(&batch);
                        let _ = reply.send(result);
                    }
                })
                .expect("failed to spawn muloss worker");
            handles.push(handle);
        }

        Self { tx, workers: handles }
    }

    fn submit(&self, job: Job) -> Result<(), ExecutionError> {
        self.tx.send(job).map_err(|_| ExecutionError::Disconnected {
            pool: POOL_NAME.to_string(),
        })
    }

    fn shutdown(self) {
        // Closing the channel lets workers drain queued jobs and exit.
        drop(self.tx);
        for handle in self.workers {
            let _ = handle.join();
        }
    }
}

/// Processes batches concurrently and merges their partials.
pub struct PartitionExecutor {
    processor: Arc<MomentumLossProcessor>,
    pool: Option<WorkerPool>,
}

impl PartitionExecutor {
    /// Starts the worker pool.
    #[must_use]
    pub fn new(processor: MomentumLossProcessor, config: ExecutorConfig) -> Self {
        let processor = Arc::new(processor);
        let pool = WorkerPool::start(config.workers, config.queue_capacity, &processor);
        Self {
            processor,
            pool: Some(pool),
        }
    }

    /// The processor shared by all workers.
    #[must_use]
    pub fn processor(&self) -> &MomentumLossProcessor {
        &self.processor
    }

    /// Processes every batch and returns the merged accumulator.
    ///
    /// # Errors
    ///
    /// The first failing batch fails the run with its own error. A worker that
    /// goes away mid-run gives `ExecutionError::Disconnected`.
    pub fn run<I>(&self, batches: I) -> MulossResult<RunAccumulator>
    where
        I: IntoIterator<Item = EventBatch>,
    {
        let pool = self.pool.as_ref().ok_or_else(|| ExecutionError::Disconnected {
            pool: POOL_NAME.to_string(),
        })?;
        let (reply_tx, reply_rx) = unbounded::<MulossResult<RunAccumulator>>();
        let mut total = self.processor.identity();
        let mut pending = 0usize;
        let mut batches_seen = 0usize;

        for batch in batches {
            pool.submit(Job::Process {
                batch,
                reply: reply_tx.clone(),
            })?;
            pending += 1;
            batches_seen += 1;
            while let Ok(partial) = reply_rx.try_recv() {
                pending -= 1;
                merge_partial(&mut total, partial)?;
            }
        }
        drop(reply_tx);

        while pending > 0 {
            let partial = reply_rx.recv().map_err(|_| ExecutionError::Disconnected {
                pool: POOL_NAME.to_string(),
            })?;
            pending -= 1;
            merge_partial(&mut total, partial)?;
        }

        log::info!(
            "merged {batches_seen} batches: {} events, {} selected muons",
            total.all_events.total(),
            total.samples.len()
        );
        Ok(total)
    }
}

impl Drop for PartitionExecutor {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.take() {
            pool.shutdown();
        }
    }
}

fn merge_partial(total: &mut RunAccumulator, partial: MulossResult<RunAccumulator>) -> MulossResult<()> {
    match partial {
        Ok(partial) => Ok(total.merge(&partial)?),
        Err(err) => {
            log::warn!("batch failed, aborting run: {err}");
            Err(err)
        }
    }
}

/// Single-threaded reference path: processes batches in order and merges.
///
/// # Errors
///
/// The first failing batch fails the run.
pub fn run_iterative<'a, I>(processor: &MomentumLossProcessor, batches: I) -> MulossResult<RunAccumulator>
where
    I: IntoIterator<Item = &'a EventBatch>,
{
    batches.into_iter().try_fold(processor.identity(), |mut total, batch| {
        total.merge(&processor.process(batch)?)?;
        Ok::<_, MulossError>(total)
    })
}
