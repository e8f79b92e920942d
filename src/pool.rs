//! Fixed-size worker pool with pull-based job assignment.
//!
//! Every idle worker advertises a private slot on a shared registry. The
//! dispatcher takes the next job from a bounded intake, waits for an
//! advertised slot and hands the job over. At most `size` jobs are handled at
//! once; producers wait for intake capacity when the pool falls behind.

use std::sync::{
    Arc,
    atomic::{AtomicU8, Ordering},
};

use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use tokio::{
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

#[async_trait]
pub trait JobHandler<J>: Send + 'static {
    async fn handle(&mut self, job: J);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Busy,
    Stopped,
}

impl WorkerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => WorkerState::Idle,
            1 => WorkerState::Busy,
            _ => WorkerState::Stopped,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            WorkerState::Idle => 0,
            WorkerState::Busy => 1,
            WorkerState::Stopped => 2,
        }
    }
}

type Slot<J> = oneshot::Sender<J>;

/// What a pool looked like once it stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopReport {
    pub states: Vec<WorkerState>,
    /// Jobs accepted by `dispatch` that no worker picked up.
    pub dropped: usize,
}

/// Cheap handle for submitting jobs to a running pool.
pub struct Dispatcher<J> {
    intake: mpsc::Sender<J>,
}

impl<J> Clone for Dispatcher<J> {
    fn clone(&self) -> Self {
        Self {
            intake: self.intake.clone(),
        }
    }
}

impl<J: Send + 'static> Dispatcher<J> {
    /// Waits for intake capacity, then queues the job. Fails once the pool
    /// has stopped.
    pub async fn dispatch(&self, job: J) -> Result<(), Error> {
        self.intake
            .send(job)
            .await
            .map_err(|_| anyhow!("Worker pool is not running"))
    }
}

pub struct WorkerPool<J> {
    name: &'static str,
    dispatcher: Dispatcher<J>,
    shutdown: watch::Sender<bool>,
    states: Arc<Vec<AtomicU8>>,
    workers: Vec<JoinHandle<()>>,
    dispatch_task: Option<JoinHandle<usize>>,
}

impl<J: Send + 'static> WorkerPool<J> {
    /// Spawns `size` workers, each owning the handler `factory` builds for
    /// it, plus the dispatcher task. Dropping the pool stops it.
    pub fn start<H, F>(
        name: &'static str,
        size: usize,
        queue_capacity: usize,
        mut factory: F,
    ) -> Self
    where
        H: JobHandler<J>,
        F: FnMut(usize) -> H,
    {
        let (intake_tx, intake_rx) = mpsc::channel(queue_capacity.max(1));
        let (registry_tx, registry_rx) = mpsc::channel::<Slot<J>>(size.max(1));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let states: Arc<Vec<AtomicU8>> = Arc::new(
            (0..size)
                .map(|_| AtomicU8::new(WorkerState::Idle.as_u8()))
                .collect(),
        );

        let mut workers = Vec::with_capacity(size);

        for worker_id in 0..size {
            workers.push(tokio::spawn(run_worker(
                name,
                worker_id,
                factory(worker_id),
                registry_tx.clone(),
                shutdown_rx.clone(),
                Arc::clone(&states),
            )));
        }

        let dispatch_task = tokio::spawn(run_dispatcher(name, intake_rx, registry_rx, shutdown_rx));

        info!(pool = name, size, queue_capacity, "Worker pool started");

        Self {
            name,
            dispatcher: Dispatcher { intake: intake_tx },
            shutdown: shutdown_tx,
            states,
            workers,
            dispatch_task: Some(dispatch_task),
        }
    }

    pub fn dispatcher(&self) -> Dispatcher<J> {
        self.dispatcher.clone()
    }

    pub fn worker_states(&self) -> Vec<WorkerState> {
        self.states
            .iter()
            .map(|state| WorkerState::from_u8(state.load(Ordering::SeqCst)))
            .collect()
    }

    /// Signals every worker and the dispatcher to stop and waits for them.
    /// Jobs still queued are dropped and counted; a job already handed to a
    /// worker runs to completion.
    pub async fn stop(mut self) -> StopReport {
        let _ = self.shutdown.send(true);

        for handle in self.workers.drain(..) {
            if let Err(e) = handle.await {
                warn!(pool = self.name, error = %e, "Pool worker ended abnormally");
            }
        }

        let dropped = match self.dispatch_task.take() {
            Some(handle) => handle.await.unwrap_or_else(|e| {
                warn!(pool = self.name, error = %e, "Pool dispatcher ended abnormally");
                0
            }),
            None => 0,
        };

        info!(pool = self.name, dropped, "Worker pool stopped");
        StopReport {
            states: self.worker_states(),
            dropped,
        }
    }
}

async fn run_worker<J, H>(
    pool: &'static str,
    worker_id: usize,
    mut handler: H,
    registry: mpsc::Sender<Slot<J>>,
    mut shutdown: watch::Receiver<bool>,
    states: Arc<Vec<AtomicU8>>,
) where
    J: Send + 'static,
    H: JobHandler<J>,
{
    let set_state = |state: WorkerState| states[worker_id].store(state.as_u8(), Ordering::SeqCst);

    loop {
        if *shutdown.borrow() {
            break;
        }

        let (slot, mut assigned) = oneshot::channel();
        if registry.send(slot).await.is_err() {
            break;
        }

        let job = tokio::select! {
            biased;
            job = &mut assigned => job.ok(),
            _ = shutdown.changed() => {
                // Close the slot; a job handed over before that is still ours.
                assigned.close();
                assigned.try_recv().ok()
            }
        };
        let Some(job) = job else { break };

        set_state(WorkerState::Busy);
        handler.handle(job).await;
        set_state(WorkerState::Idle);
    }

    set_state(WorkerState::Stopped);
    // Dropping the handler releases whatever it owns, e.g. its cleanup sink.
    drop(handler);
    debug!(pool, worker_id, "Worker stopped");
}

async fn run_dispatcher<J: Send + 'static>(
    pool: &'static str,
    mut intake: mpsc::Receiver<J>,
    mut registry: mpsc::Receiver<Slot<J>>,
    mut shutdown: watch::Receiver<bool>,
) -> usize {
    let mut dropped = 0;

    'jobs: loop {
        let mut job = tokio::select! {
            job = intake.recv() => match job {
                Some(job) => job,
                None => break,
            },
            _ = shutdown.changed() => break,
        };

        loop {
            let slot = tokio::select! {
                slot = registry.recv() => match slot {
                    Some(slot) => slot,
                    None => {
                        dropped += 1;
                        break 'jobs;
                    }
                },
                _ = shutdown.changed() => {
                    dropped += 1;
                    break 'jobs;
                }
            };

            // A worker that stopped after advertising hands the job back.
            match slot.send(job) {
                Ok(()) => break,
                Err(returned) => job = returned,
            }
        }
    }

    intake.close();
    while intake.try_recv().is_ok() {
        dropped += 1;
    }

    if dropped > 0 {
        warn!(pool, dropped, "Dropped queued jobs on shutdown");
    }
    debug!(pool, "Dispatcher stopped");
    dropped
}
