//! Dispatcher - main loop for fan-out to sinks

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, instrument};

use contracts::{AggregatedReport, SinkConfig, SinkType};

use crate::error::DispatcherError;
use crate::handle::SinkHandle;
use crate::stats::SinkStatsSnapshot;
use crate::sinks::{JsonSink, LogSink, MarkdownSink, SummarySink};

/// Dispatcher configuration
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Sink configurations
    pub sinks: Vec<SinkConfig>,
}

/// What the dispatcher did before shutting down
#[derive(Debug, Clone, Default)]
pub struct DispatchSummary {
    pub reports: u64,
    /// Files written, in sink order
    pub artifacts: Vec<PathBuf>,
    pub sinks: Vec<(String, SinkStatsSnapshot)>,
}

impl DispatchSummary {
    pub fn dropped(&self) -> u64 {
        self.sinks.iter().map(|(_, m)| m.dropped).sum()
    }

    pub fn failures(&self) -> u64 {
        self.sinks.iter().map(|(_, m)| m.failed).sum()
    }
}

/// Builder for creating a Dispatcher
pub struct DispatcherBuilder {
    config: DispatcherConfig,
    input_rx: mpsc::Receiver<AggregatedReport>,
}

impl DispatcherBuilder {
    /// Create a new DispatcherBuilder
    pub fn new(config: DispatcherConfig, input_rx: mpsc::Receiver<AggregatedReport>) -> Self {
        Self { config, input_rx }
    }

    /// Build and start the dispatcher
    #[instrument(name = "dispatcher_builder_build", skip(self))]
    pub fn build(self) -> Result<Dispatcher, DispatcherError> {
        let mut handles = Vec::with_capacity(self.config.sinks.len());
        for sink_config in &self.config.sinks {
            handles.push(create_sink_handle(sink_config)?);
        }

        Ok(Dispatcher {
            handles,
            input_rx: self.input_rx,
        })
    }
}

/// Create a SinkHandle from configuration
#[instrument(
    name = "dispatcher_create_sink_handle",
    skip(config),
    fields(sink = %config.name, sink_type = ?config.sink_type)
)]
fn create_sink_handle(config: &SinkConfig) -> Result<SinkHandle, DispatcherError> {
    if config.queue_capacity == 0 {
        return Err(DispatcherError::sink_creation(
            &config.name,
            "queue_capacity must be at least 1",
        ));
    }
    let handle = match config.sink_type {
        SinkType::Log => SinkHandle::spawn(LogSink::new(&config.name), config.queue_capacity),
        SinkType::Markdown => SinkHandle::spawn(
            MarkdownSink::from_params(&config.name, &config.params),
            config.queue_capacity,
        ),
        SinkType::Json => SinkHandle::spawn(
            JsonSink::from_params(&config.name, &config.params),
            config.queue_capacity,
        ),
        SinkType::Summary => SinkHandle::spawn(
            SummarySink::from_params(&config.name, &config.params),
            config.queue_capacity,
        ),
    };
    Ok(handle)
}

/// The main Dispatcher that fans out reports to sinks
pub struct Dispatcher {
    handles: Vec<SinkHandle>,
    input_rx: mpsc::Receiver<AggregatedReport>,
}

impl Dispatcher {
    /// Create a dispatcher with custom sink handles (for testing)
    pub fn with_handles(
        handles: Vec<SinkHandle>,
        input_rx: mpsc::Receiver<AggregatedReport>,
    ) -> Self {
        Self { handles, input_rx }
    }

    /// Delivery counters for all sinks
    pub fn stats(&self) -> Vec<(String, SinkStatsSnapshot)> {
        self.handles
            .iter()
            .map(|h| (h.name().to_string(), h.stats().snapshot()))
            .collect()
    }

    /// Run the dispatcher main loop
    ///
    /// Consumes reports from input and fans out to all sinks.
    /// Returns when input channel is closed and every sink has drained.
    #[instrument(name = "dispatcher_run", skip(self))]
    pub async fn run(mut self) -> DispatchSummary {
        info!(sinks = self.handles.len(), "Dispatcher started");

        let mut reports: u64 = 0;
        while let Some(report) = self.input_rx.recv().await {
            reports += 1;
            let report = Arc::new(report);
            for handle in &self.handles {
                // Full queues are counted by the handle
                let _ = handle.try_send(Arc::clone(&report));
            }
        }

        info!(reports, "Dispatcher input closed, shutting down");

        let stats: Vec<_> = self
            .handles
            .iter()
            .map(|h| (h.name().to_string(), Arc::clone(h.stats())))
            .collect();

        let mut artifacts = Vec::new();
        for handle in self.handles {
            artifacts.extend(handle.shutdown().await);
        }

        info!(artifacts = artifacts.len(), "Dispatcher shutdown complete");

        DispatchSummary {
            reports,
            artifacts,
            sinks: stats
                .into_iter()
                .map(|(name, m)| (name, m.snapshot()))
                .collect(),
        }
    }

    /// Spawn the dispatcher as a background task
    pub fn spawn(self) -> JoinHandle<DispatchSummary> {
        tokio::spawn(self.run())
    }
}

/// Convenience function to create a dispatcher from sink configs
#[instrument(name = "dispatcher_create", skip(sink_configs, input_rx))]
pub fn create_dispatcher(
    sink_configs: Vec<SinkConfig>,
    input_rx: mpsc::Receiver<AggregatedReport>,
) -> Result<Dispatcher, DispatcherError> {
    let config = DispatcherConfig {
        sinks: sink_configs,
    };
    DispatcherBuilder::new(config, input_rx).build()
}

/// Send one report through every configured sink and wait for them to finish
pub async fn dispatch_report(
    sink_configs: Vec<SinkConfig>,
    report: AggregatedReport,
) -> Result<DispatchSummary, DispatcherError> {
    let (tx, rx) = mpsc::channel(1);
    let worker = create_dispatcher(sink_configs, rx)?.spawn();
    // Capacity 1 and a live receiver: this cannot fail
    let _ = tx.send(report).await;
    drop(tx);
    worker.await.map_err(|e| {
        DispatcherError::Contract(contracts::ContractError::Other(format!(
            "dispatcher task failed: {e}"
        )))
    })
}
