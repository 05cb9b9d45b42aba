//! SinkHandle - manages a sink with isolated queue and worker task

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument, warn};

use contracts::{AggregatedReport, ReportSink};

use crate::error::DispatcherError;
use crate::stats::SinkStats;

/// Handle to a running sink worker
pub struct SinkHandle {
    /// Sink name
    name: String,
    /// Channel to send reports to worker
    tx: mpsc::Sender<Arc<AggregatedReport>>,
    /// Counters shared with the worker
    stats: Arc<SinkStats>,
    /// Worker task handle, yields the artifacts written
    worker_handle: JoinHandle<Vec<PathBuf>>,
}

impl SinkHandle {
    /// Create a new SinkHandle and spawn the worker task
    pub fn spawn<S: ReportSink + Send + 'static>(sink: S, queue_capacity: usize) -> Self {
        let name = sink.name().to_string();
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let stats = Arc::new(SinkStats::new());

        let worker_stats = Arc::clone(&stats);
        let worker_name = name.clone();

        let worker_handle =
            tokio::spawn(async move { sink_worker(sink, rx, worker_stats, worker_name).await });

        Self {
            name,
            tx,
            stats,
            worker_handle,
        }
    }

    /// Get sink name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Delivery counters for this sink
    pub fn stats(&self) -> &Arc<SinkStats> {
        &self.stats
    }

    /// Queue a report for the sink (non-blocking)
    ///
    /// A full queue drops the report for this sink only.
    pub fn try_send(&self, report: Arc<AggregatedReport>) -> Result<(), DispatcherError> {
        match self.tx.try_send(report) {
            Ok(()) => {
                self.stats
                    .set_pending(self.tx.max_capacity() - self.tx.capacity());
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(r)) => {
                self.stats.record_dropped();
                observability::record_report_dispatched(&self.name, false);
                warn!(sink = %self.name, run_id = %r.run.run_id, "Queue full, report dropped");
                Err(DispatcherError::QueueFull {
                    sink_name: self.name.clone(),
                    run_id: r.run.run_id.clone(),
                })
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                error!(sink = %self.name, "Sink worker closed unexpectedly");
                Err(DispatcherError::WorkerClosed {
                    sink_name: self.name.clone(),
                })
            }
        }
    }

    /// Shutdown the sink worker gracefully, returning artifact paths
    #[instrument(name = "sink_handle_shutdown", skip(self), fields(sink = %self.name))]
    pub async fn shutdown(self) -> Vec<PathBuf> {
        // Drop sender to signal worker to stop
        drop(self.tx);
        match self.worker_handle.await {
            Ok(artifacts) => {
                debug!(sink = %self.name, artifacts = artifacts.len(), "SinkHandle shutdown complete");
                artifacts
            }
            Err(e) => {
                error!(sink = %self.name, error = ?e, "Worker task panicked");
                Vec::new()
            }
        }
    }
}

/// Worker task that consumes reports and writes to sink
#[instrument(
    name = "sink_worker_loop",
    skip(sink, rx, stats),
    fields(sink = %name)
)]
async fn sink_worker<S: ReportSink>(
    mut sink: S,
    mut rx: mpsc::Receiver<Arc<AggregatedReport>>,
    stats: Arc<SinkStats>,
    name: String,
) -> Vec<PathBuf> {
    debug!(sink = %name, "Sink worker started");
    let mut artifacts = Vec::new();

    while let Some(report) = rx.recv().await {
        stats.set_pending(rx.len());

        let started = Instant::now();
        match sink.write(&report).await {
            Ok(path) => {
                stats.record_written(path.is_some(), started.elapsed());
                observability::record_report_dispatched(&name, true);
                artifacts.extend(path);
            }
            Err(e) => {
                stats.record_failed();
                observability::record_report_dispatched(&name, false);
                error!(
                    sink = %name,
                    run_id = %report.run.run_id,
                    error = %e,
                    "Write failed"
                );
            }
        }
    }

    if let Err(e) = sink.flush().await {
        error!(sink = %name, error = %e, "Flush failed on shutdown");
    }
    if let Err(e) = sink.close().await {
        error!(sink = %name, error = %e, "Close failed on shutdown");
    }

    debug!(sink = %name, "Sink worker stopped");
    artifacts
}
