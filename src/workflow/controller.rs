use super::report::{FatalError, RunReport};
use super::state::WorkflowState;
use super::WorkflowError;
use crate::batcher::{BatcherEvent, WindowedBatcher};
use crate::config::WorkflowConfig;
use crate::pipeline::{Delivery, Dispatch, RetryPolicy};
use crate::source::RecordSource;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};

/// Everything the run loop owns once a workflow starts.
pub(crate) struct RunContext {
    pub config: Arc<WorkflowConfig>,
    pub config_version: Option<u64>,
    pub source: Box<dyn RecordSource>,
    pub delivery: Delivery,
    pub state: Arc<watch::Sender<WorkflowState>>,
    pub stop: CancellationToken,
}

pub(crate) async fn run(ctx: RunContext) -> Result<RunReport, WorkflowError> {
    let span = info_span!(
        "workflow",
        name = %ctx.config.name,
        config_version = ?ctx.config_version
    );
    drive(ctx).instrument(span).await
}

async fn drive(ctx: RunContext) -> Result<RunReport, WorkflowError> {
    let RunContext {
        config,
        config_version,
        mut source,
        delivery,
        state,
        stop,
    } = ctx;

    let source_retry = RetryPolicy::from(&config.retry.source);
    let mut batcher = WindowedBatcher::from_descriptor(&config.source, config.pipeline.poll_timeout);
    let sink = delivery.describe_sink();
    let mut dispatch = Dispatch::new(
        config.pipeline.flush_mode,
        config.pipeline.max_in_flight_batches,
        delivery,
    );
    let mut report = RunReport::new(&config.name, config_version);

    info!(
        source = %source.describe(),
        sink = %sink,
        batch_size = config.source.batch_size,
        time_window_ms = config.source.time_window.as_millis() as u64,
        flush_mode = ?config.pipeline.flush_mode,
        "Workflow running"
    );

    let mut consecutive_failures: u32 = 0;
    let mut polls_at_last_failure = 0;
    let mut final_batch = None;

    let submitted = loop {
        match batcher.next_event(source.as_mut(), &stop).await {
            BatcherEvent::Sealed(batch) => {
                if let Err(e) = dispatch.submit(batch).await {
                    break Err(e);
                }
            }
            BatcherEvent::SourceError(e) => {
                report.source_errors += 1;
                if batcher.successful_polls() != polls_at_last_failure {
                    consecutive_failures = 0;
                }
                consecutive_failures += 1;
                polls_at_last_failure = batcher.successful_polls();

                if source_retry.exhausted(consecutive_failures) {
                    error!(
                        attempts = consecutive_failures,
                        error = %e,
                        "Source retries exhausted, draining"
                    );
                    report.fatal = Some(FatalError {
                        attempts: consecutive_failures,
                        reason: e.to_string(),
                    });
                    state.send_replace(WorkflowState::Draining);
                    final_batch = batcher.drain();
                    break Ok(());
                }

                let delay = source_retry.backoff(consecutive_failures - 1);
                warn!(
                    attempt = consecutive_failures,
                    backoff_ms = delay.as_millis() as u64,
                    error = %e,
                    "Source unavailable, retrying"
                );
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = stop.cancelled() => {}
                }
            }
            BatcherEvent::Exhausted(last) => {
                info!("Source exhausted, draining");
                state.send_replace(WorkflowState::Draining);
                final_batch = last;
                break Ok(());
            }
            BatcherEvent::Stopped(last) => {
                info!("Stop requested, draining");
                final_batch = last;
                break Ok(());
            }
        }
    };

    let submitted = match (submitted, final_batch) {
        (Ok(()), Some(batch)) => dispatch.submit(batch).await,
        (result, _) => result,
    };
    let finished = dispatch.finish().await;
    drop(source);
    report.absorb_batcher(batcher.stats());

    let result = match finished {
        Ok(stats) => {
            report.absorb_delivery(stats);
            submitted.map(|()| report).map_err(WorkflowError::from)
        }
        Err(e) => Err(WorkflowError::from(e)),
    };

    state.send_replace(WorkflowState::Stopped);
    match &result {
        Ok(report) => info!(
            batches = report.batches_sealed,
            delivered = report.batches_delivered,
            records = report.records_published,
            "Workflow stopped"
        ),
        Err(e) => error!(error = %e, "Workflow stopped with error"),
    }
    result
}
