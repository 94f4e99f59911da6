use std::sync::Arc;
use std::time::Duration;

use apikey_core_types::TrafficEvent;
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::TrafficStore;
use crate::metrics;

/// Bounded fire-and-forget queue feeding traffic events to the store.
///
/// `report` never waits. One background task drains the queue; a full or
/// closed queue drops the event.
pub struct TrafficReporter {
    tx: mpsc::Sender<TrafficEvent>,
    shutdown: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl TrafficReporter {
    /// Starts the background writer. Must be called inside a tokio runtime.
    pub fn spawn(store: Arc<dyn TrafficStore>, capacity: usize, write_timeout: Duration) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let shutdown = CancellationToken::new();
        let worker = tokio::spawn(run_writer(store, rx, shutdown.clone(), write_timeout));
        Self {
            tx,
            shutdown,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Queues `event`, returning whether it was accepted.
    pub fn report(&self, event: TrafficEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => {
                metrics::record_reported();
                true
            }
            Err(TrySendError::Full(event)) => {
                warn!(scope = %event.scope, "traffic report queue full; dropping event");
                metrics::record_dropped();
                false
            }
            Err(TrySendError::Closed(event)) => {
                debug!(scope = %event.scope, "traffic reporter shut down; dropping event");
                metrics::record_dropped();
                false
            }
        }
    }

    /// Stops accepting events and waits for queued ones to be written.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            if let Err(err) = worker.await {
                warn!(?err, "traffic writer task failed");
            }
        }
    }
}

impl Drop for TrafficReporter {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn run_writer(
    store: Arc<dyn TrafficStore>,
    mut rx: mpsc::Receiver<TrafficEvent>,
    shutdown: CancellationToken,
    write_timeout: Duration,
) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            next = rx.recv() => match next {
                Some(event) => write(store.as_ref(), event, write_timeout).await,
                None => return,
            },
        }
    }

    rx.close();
    let mut drained = 0usize;
    while let Some(event) = rx.recv().await {
        write(store.as_ref(), event, write_timeout).await;
        drained += 1;
    }
    info!(drained, "traffic reporter drained");
}

async fn write(store: &dyn TrafficStore, event: TrafficEvent, write_timeout: Duration) {
    metrics::record_dequeued();
    let scope = event.scope.clone();
    match timeout(write_timeout, store.record(event)).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            warn!(%scope, %err, "failed to record traffic event");
            metrics::record_write_failure();
        }
        Err(_) => {
            warn!(%scope, "recording traffic event timed out");
            metrics::record_write_failure();
        }
    }
}
