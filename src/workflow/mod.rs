//! Workflow lifecycle.
//!
//! A [`Workflow`] owns one source, one processing stage and one sink and runs
//! them as a unit. Only this module moves the workflow between states; callers
//! observe transitions through [`Workflow::state`] and
//! [`Workflow::subscribe_state`].

mod controller;
pub mod report;
pub mod state;

pub use report::{FatalError, RunReport};
pub use state::WorkflowState;

use crate::config::{ConfigError, WorkflowConfig};
use crate::pipeline::{Delivery, PipelineError, RetryPolicy};
use crate::processing::{Passthrough, Processor};
use crate::sink::{self, RecordSink};
use crate::source::{self, MemoryHub, RecordSource};
use controller::RunContext;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("source unavailable after {attempts} attempts: {reason}")]
    SourceUnavailable { attempts: u32, reason: String },

    #[error("cannot {op} a workflow in state '{state}'")]
    InvalidState {
        op: &'static str,
        state: WorkflowState,
    },

    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("workflow task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Assembles a [`Workflow`] from a validated config.
///
/// Source and sink are resolved from the config's channel descriptors unless
/// given explicitly. Memory channels resolve against the hub passed to
/// [`WorkflowBuilder::memory_hub`]. The processor defaults to [`Passthrough`].
pub struct WorkflowBuilder {
    config: WorkflowConfig,
    config_version: Option<u64>,
    processor: Option<Box<dyn Processor>>,
    source: Option<Box<dyn RecordSource>>,
    sink: Option<Box<dyn RecordSink>>,
    hub: Option<MemoryHub>,
}

impl WorkflowBuilder {
    pub fn processor(mut self, processor: impl Processor + 'static) -> Self {
        self.processor = Some(Box::new(processor));
        self
    }

    pub fn source(mut self, source: impl RecordSource + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn sink(mut self, sink: impl RecordSink + 'static) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    pub fn memory_hub(mut self, hub: MemoryHub) -> Self {
        self.hub = Some(hub);
        self
    }

    /// Config fingerprint reported alongside the run.
    pub fn config_version(mut self, version: u64) -> Self {
        self.config_version = Some(version);
        self
    }

    pub fn build(self) -> Result<Workflow, WorkflowError> {
        self.config.check()?;

        let source = match self.source {
            Some(source) => source,
            None => source::build(&self.config.source, self.hub.as_ref())?,
        };
        let sink = match self.sink {
            Some(sink) => sink,
            None => sink::build(&self.config.destination, self.hub.as_ref())?,
        };
        let processor = self
            .processor
            .unwrap_or_else(|| Box::new(Passthrough));

        info!(
            name = %self.config.name,
            source = %source.describe(),
            sink = %sink.describe(),
            "Workflow created"
        );

        let delivery = Delivery::new(
            processor,
            sink,
            RetryPolicy::from(&self.config.retry.sink),
            self.config.pipeline.publish_timeout,
        );
        let (state, _) = watch::channel(WorkflowState::Created);

        Ok(Workflow {
            config: Arc::new(self.config),
            config_version: self.config_version,
            state: Arc::new(state),
            stop: CancellationToken::new(),
            parts: Some(Parts { source, delivery }),
            handle: None,
        })
    }
}

struct Parts {
    source: Box<dyn RecordSource>,
    delivery: Delivery,
}

pub struct Workflow {
    config: Arc<WorkflowConfig>,
    config_version: Option<u64>,
    state: Arc<watch::Sender<WorkflowState>>,
    stop: CancellationToken,
    parts: Option<Parts>,
    handle: Option<JoinHandle<Result<RunReport, WorkflowError>>>,
}

impl Workflow {
    pub fn builder(config: WorkflowConfig) -> WorkflowBuilder {
        WorkflowBuilder {
            config,
            config_version: None,
            processor: None,
            source: None,
            sink: None,
            hub: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    pub fn state(&self) -> WorkflowState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<WorkflowState> {
        self.state.subscribe()
    }

    /// Spawn the run loop. Only valid from `Created`.
    pub fn start(&mut self) -> Result<(), WorkflowError> {
        let current = self.state();
        let parts = match (current, self.parts.take()) {
            (WorkflowState::Created, Some(parts)) => parts,
            (state, parts) => {
                self.parts = parts;
                return Err(WorkflowError::InvalidState { op: "start", state });
            }
        };

        self.state.send_replace(WorkflowState::Running);
        let ctx = RunContext {
            config: Arc::clone(&self.config),
            config_version: self.config_version,
            source: parts.source,
            delivery: parts.delivery,
            state: Arc::clone(&self.state),
            stop: self.stop.clone(),
        };
        self.handle = Some(tokio::spawn(controller::run(ctx)));
        Ok(())
    }

    /// Request a cooperative stop and wait for in-flight batches to finish.
    ///
    /// A workflow that was never started moves straight to `Stopped`.
    pub async fn stop(&mut self) -> Result<RunReport, WorkflowError> {
        match self.state() {
            WorkflowState::Created => {
                self.parts = None;
                self.state.send_replace(WorkflowState::Stopped);
                info!(name = %self.config.name, "Workflow stopped before start");
                return Ok(RunReport::new(&self.config.name, self.config_version));
            }
            WorkflowState::Running => {
                self.state.send_replace(WorkflowState::Draining);
            }
            WorkflowState::Draining | WorkflowState::Stopped => {}
        }

        if self.handle.is_none() {
            return Err(WorkflowError::InvalidState {
                op: "stop",
                state: self.state(),
            });
        }
        self.stop.cancel();
        self.join().await
    }

    /// Wait for the run loop to finish on its own (end of stream or fatal
    /// source failure) without requesting a stop.
    pub async fn wait(&mut self) -> Result<RunReport, WorkflowError> {
        if self.handle.is_none() {
            return Err(WorkflowError::InvalidState {
                op: "wait",
                state: self.state(),
            });
        }
        self.join().await
    }

    async fn join(&mut self) -> Result<RunReport, WorkflowError> {
        let state = self.state();
        let handle = self.handle.as_mut().ok_or(WorkflowError::InvalidState {
            op: "join",
            state,
        })?;
        // The handle is only cleared once it resolves, so a dropped `wait`
        // can be followed by `stop`.
        let result = handle.await;
        self.handle = None;
        // A panicked run loop never reached its own final transition.
        self.state.send_replace(WorkflowState::Stopped);
        result?
    }
}

impl Drop for Workflow {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.stop.cancel();
        }
    }
}
