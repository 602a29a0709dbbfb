//! Dispatch queue: decouples the request path from monitoring I/O.
//!
//! Request handlers enqueue [`RecordGroup`]s through a cloneable
//! [`Dispatcher`] without ever waiting. Exactly one worker, running on a
//! dedicated blocking thread, owns the [`MonitoringSink`] and drains the
//! queue into it. Being the only consumer is what serializes writes to the
//! capture file, and persisted rows follow enqueue order.
//!
//! Shutdown: once every `Dispatcher` clone is dropped the worker drains what
//! is left in the queue, closes the sink and returns its [`SinkSummary`].

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::monitoring::record::RecordGroup;
use crate::monitoring::sink::{MonitoringSink, SinkError, SinkSummary};

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Dispatch queue is full")]
    QueueFull,

    #[error("Dispatch queue is closed")]
    Closed,
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Monitoring worker panicked: {0}")]
    Panicked(String),

    #[error(transparent)]
    Sink(#[from] SinkError),
}

/// Producer handle held by the request path.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    tx: mpsc::Sender<RecordGroup>,
}

impl Dispatcher {
    /// Enqueue a group without waiting for space or for any disk I/O.
    pub fn dispatch(&self, group: RecordGroup) -> Result<(), DispatchError> {
        self.tx.try_send(group).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DispatchError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => DispatchError::Closed,
        })
    }

    /// Free slots left in the queue.
    pub fn capacity(&self) -> usize {
        self.tx.capacity()
    }
}

/// Handle to the single worker consuming the queue.
pub struct DispatchWorker {
    handle: JoinHandle<Result<SinkSummary, SinkError>>,
}

impl DispatchWorker {
    /// Wait for the worker to drain the queue and close the sink.
    ///
    /// Only completes after every [`Dispatcher`] clone has been dropped.
    pub async fn shutdown(self) -> Result<SinkSummary, WorkerError> {
        match self.handle.await {
            Ok(result) => Ok(result?),
            Err(e) => Err(WorkerError::Panicked(e.to_string())),
        }
    }
}

/// Create the queue and spawn its only consumer. Must be called from within
/// a tokio runtime.
pub fn spawn(sink: MonitoringSink, capacity: usize) -> (Dispatcher, DispatchWorker) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let handle = tokio::task::spawn_blocking(move || run_worker(sink, rx));
    (Dispatcher { tx }, DispatchWorker { handle })
}

fn run_worker(
    mut sink: MonitoringSink,
    mut rx: mpsc::Receiver<RecordGroup>,
) -> Result<SinkSummary, SinkError> {
    info!(path = %sink.path().display(), "Monitoring worker started");

    let mut groups = 0u64;
    while let Some(group) = rx.blocking_recv() {
        groups += 1;
        debug!(observations = group.observations(), "Collecting record group");
        sink.collect(group);
    }

    info!(groups, "Dispatch queue drained, closing monitoring sink");
    sink.close().inspect_err(|e| warn!("Error closing monitoring sink: {e}"))
}
