//! Workflow scenarios driven end to end through in-process channels.
//!
//! Every test builds an explicit [`Harness`] in setup and stops it explicitly
//! in teardown. Window timing runs on tokio's paused clock.

use async_trait::async_trait;
use cyberflow::batcher::{Batch, TriggerReason};
use cyberflow::config::{load_config_from_str, WorkflowConfig};
use cyberflow::processing::{ProcessingError, Processor};
use cyberflow::sink::{RecordSink, SinkError};
use cyberflow::source::{
    MemoryHub, MemoryOutbox, MemoryProducer, Polled, Record, RecordSource, SourceError,
};
use cyberflow::workflow::{RunReport, Workflow, WorkflowBuilder, WorkflowError, WorkflowState};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

fn memory_config(batch_size: usize, time_window: u64, flush_mode: &str) -> WorkflowConfig {
    load_config_from_str(&format!(
        r#"
name: harness-workflow
source:
  type: memory
  batch_size: {batch_size}
  consumer_topics: [input]
  time_window: {time_window}
destination:
  type: memory
  batch_size: 1
  publisher_topic: output
pipeline:
  flush_mode: {flush_mode}
  poll_timeout: 1s
retry:
  source: {{ max_retries: 2, initial_backoff: 100ms, max_backoff: 1s }}
  sink: {{ max_retries: 3, initial_backoff: 100ms, max_backoff: 1s }}
"#
    ))
    .expect("harness config should be valid")
}

/// Passes records through unchanged and keeps a copy of every batch it saw.
fn recording_processor(seen: Arc<Mutex<Vec<Batch>>>) -> impl Processor {
    move |batch: &Batch| -> Result<Vec<Record>, ProcessingError> {
        seen.lock().unwrap().push(batch.clone());
        Ok(batch.records.clone())
    }
}

struct Harness {
    input: MemoryProducer,
    output: MemoryOutbox,
    batches: Arc<Mutex<Vec<Batch>>>,
    workflow: Workflow,
}

impl Harness {
    fn setup(config: WorkflowConfig) -> Self {
        Self::setup_with(config, |builder| builder)
    }

    /// Build and start a workflow over a fresh hub. `customize` may swap the
    /// processor, source or sink.
    fn setup_with(
        config: WorkflowConfig,
        customize: impl FnOnce(WorkflowBuilder) -> WorkflowBuilder,
    ) -> Self {
        let hub = MemoryHub::new();
        let batches = Arc::new(Mutex::new(Vec::new()));
        let builder = Workflow::builder(config)
            .memory_hub(hub.clone())
            .processor(recording_processor(batches.clone()));
        let mut workflow = customize(builder).build().expect("workflow should build");
        workflow.start().expect("workflow should start");

        Self {
            input: hub.producer("input"),
            output: hub.outbox("output"),
            batches,
            workflow,
        }
    }

    fn send(&self, payloads: &[&str]) {
        for payload in payloads {
            assert!(self.input.send(payload.to_string()));
        }
    }

    fn batches(&self) -> Vec<Batch> {
        self.batches.lock().unwrap().clone()
    }

    async fn teardown(mut self) -> RunReport {
        let report = self.workflow.stop().await.expect("stop should succeed");
        assert_eq!(self.workflow.state(), WorkflowState::Stopped);
        report
    }
}

fn payloads(batch: &Batch) -> Vec<String> {
    batch
        .records
        .iter()
        .map(|r| r.payload_str().unwrap().to_string())
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_size_trigger_publishes_each_record() {
    let harness = Harness::setup(memory_config(1, 5, "pipelined"));
    harness.send(&["cyber test 1", "cyber test 2"]);

    assert!(harness.output.wait_for(2, Duration::from_secs(10)).await);
    let batches = harness.batches();
    assert_eq!(batches.len(), 2);
    for (i, batch) in batches.iter().enumerate() {
        assert_eq!(batch.trigger, TriggerReason::Size);
        assert_eq!(batch.sequence_num, i as u64);
        assert_eq!(batch.len(), 1);
    }
    assert_eq!(
        harness.output.messages_as_strings(),
        vec!["cyber test 1", "cyber test 2"]
    );

    let report = harness.teardown().await;
    assert_eq!(report.batches_sealed, 2);
    assert_eq!(report.records_published, 2);
    assert!(report.is_clean());
}

#[tokio::test(start_paused = true)]
async fn test_time_trigger_after_idle_window() {
    let harness = Harness::setup(memory_config(100, 5, "pipelined"));
    harness.send(&["r0", "r1", "r2"]);

    tokio::time::sleep(Duration::from_secs(6)).await;

    let batches = harness.batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].trigger, TriggerReason::Time);
    assert_eq!(payloads(&batches[0]), vec!["r0", "r1", "r2"]);
    assert_eq!(harness.output.len(), 3);

    let report = harness.teardown().await;
    assert_eq!(report.batches_sealed, 1);
    assert_eq!(report.records_received, 3);
}

#[tokio::test(start_paused = true)]
async fn test_end_of_stream_keeps_order_and_size_bound() {
    for mode in ["pipelined", "synchronous"] {
        let mut harness = Harness::setup(memory_config(4, 5, mode));
        let input: Vec<String> = (0..25).map(|i| format!("record-{}", i)).collect();
        for payload in &input {
            harness.input.send(payload.clone());
        }
        harness.input.close();

        let report = harness.workflow.wait().await.unwrap();
        assert_eq!(harness.workflow.state(), WorkflowState::Stopped);

        let batches = harness.batches();
        assert!(batches.iter().all(|b| !b.is_empty() && b.len() <= 4), "mode {}", mode);
        let sequences: Vec<u64> = batches.iter().map(|b| b.sequence_num).collect();
        assert_eq!(sequences, (0..7).collect::<Vec<u64>>(), "mode {}", mode);
        assert_eq!(batches.last().unwrap().trigger, TriggerReason::Drain);

        let seen: Vec<String> = batches.iter().flat_map(payloads).collect();
        assert_eq!(seen, input, "mode {}", mode);
        assert_eq!(harness.output.messages_as_strings(), input, "mode {}", mode);
        assert_eq!(report.records_published, 25);
    }
}

/// Signals when a publish starts, then takes two seconds to finish it.
struct SlowSink {
    started: Arc<Notify>,
    published: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl RecordSink for SlowSink {
    async fn publish(&mut self, records: &[Record], _timeout: Duration) -> Result<(), SinkError> {
        self.started.notify_one();
        tokio::time::sleep(Duration::from_secs(2)).await;
        self.published.lock().unwrap().extend(
            records
                .iter()
                .map(|r| r.payload_str().unwrap().to_string()),
        );
        Ok(())
    }

    fn describe(&self) -> String {
        "slow".to_string()
    }
}

#[tokio::test(start_paused = true)]
async fn test_stop_waits_for_in_flight_publish() {
    let started = Arc::new(Notify::new());
    let published = Arc::new(Mutex::new(Vec::new()));
    let sink = SlowSink {
        started: started.clone(),
        published: published.clone(),
    };
    let harness = Harness::setup_with(memory_config(1, 5, "pipelined"), |builder| {
        builder.sink(sink)
    });
    let states = harness.workflow.subscribe_state();
    assert_eq!(*states.borrow(), WorkflowState::Running);
    harness.send(&["in flight"]);

    started.notified().await;
    assert!(published.lock().unwrap().is_empty());

    let report = harness.teardown().await;
    assert_eq!(*published.lock().unwrap(), vec!["in flight"]);
    assert_eq!(report.batches_delivered, 1);
    assert_eq!(*states.borrow(), WorkflowState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_failing_processor_never_reaches_sink() {
    let harness = Harness::setup_with(memory_config(1, 5, "pipelined"), |builder| {
        builder.processor(|_: &Batch| -> Result<Vec<Record>, ProcessingError> {
            Err(ProcessingError::new("enrichment unavailable"))
        })
    });
    harness.send(&["a", "b"]);

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(harness.output.is_empty());

    let report = harness.teardown().await;
    assert_eq!(report.processing_failures.len(), 2);
    assert_eq!(report.processing_failures[0].sequence_num, 0);
    assert_eq!(report.processing_failures[1].sequence_num, 1);
    assert_eq!(report.batches_delivered, 0);
}

#[tokio::test(start_paused = true)]
async fn test_batch_after_processing_failure_is_delivered() {
    let harness = Harness::setup_with(memory_config(1, 5, "pipelined"), |builder| {
        builder.processor(|batch: &Batch| -> Result<Vec<Record>, ProcessingError> {
            if batch.sequence_num == 0 {
                return Err(ProcessingError::new("poisoned batch"));
            }
            Ok(batch.records.clone())
        })
    });
    harness.send(&["bad", "good"]);

    assert!(harness.output.wait_for(1, Duration::from_secs(10)).await);
    assert_eq!(harness.output.messages_as_strings(), vec!["good"]);

    let report = harness.teardown().await;
    assert_eq!(report.processing_failures.len(), 1);
    assert_eq!(report.processing_failures[0].trigger, TriggerReason::Size);
    assert_eq!(report.batches_delivered, 1);
}

/// Rejects everything but the first record on the first publish.
#[derive(Clone, Default)]
struct FlakySink {
    calls: Arc<Mutex<Vec<Vec<String>>>>,
}

#[async_trait]
impl RecordSink for FlakySink {
    async fn publish(&mut self, records: &[Record], _timeout: Duration) -> Result<(), SinkError> {
        let mut calls = self.calls.lock().unwrap();
        calls.push(
            records
                .iter()
                .map(|r| r.payload_str().unwrap().to_string())
                .collect(),
        );
        if calls.len() == 1 {
            return Err(SinkError::Partial {
                accepted: vec![0],
                total: records.len(),
                reason: "queue full".to_string(),
            });
        }
        Ok(())
    }

    fn describe(&self) -> String {
        "flaky".to_string()
    }
}

#[tokio::test(start_paused = true)]
async fn test_partial_publish_retries_unacknowledged_records() {
    let sink = FlakySink::default();
    let calls = sink.calls.clone();
    let harness = Harness::setup_with(memory_config(3, 5, "synchronous"), |builder| {
        builder.sink(sink)
    });
    harness.send(&["a", "b", "c"]);

    tokio::time::sleep(Duration::from_secs(2)).await;

    let report = harness.teardown().await;
    assert_eq!(
        *calls.lock().unwrap(),
        vec![vec!["a", "b", "c"], vec!["b", "c"]]
    );
    assert_eq!(report.batches_delivered, 1);
    assert_eq!(report.records_published, 3);
    assert!(report.delivery_failures.is_empty());
}

/// Replays a script of poll results, then fails forever.
struct FailingSource {
    script: VecDeque<Polled>,
}

#[async_trait]
impl RecordSource for FailingSource {
    async fn poll(&mut self, _timeout: Duration) -> Result<Polled, SourceError> {
        match self.script.pop_front() {
            Some(polled) => Ok(polled),
            None => Err(SourceError::Unavailable("connection refused".to_string())),
        }
    }

    fn describe(&self) -> String {
        "failing".to_string()
    }
}

#[tokio::test(start_paused = true)]
async fn test_source_outage_escalates_to_fatal() {
    let source = FailingSource {
        script: VecDeque::from(vec![Polled::Record(Record::new("input", "last words"))]),
    };
    let mut harness = Harness::setup_with(memory_config(10, 5, "pipelined"), |builder| {
        builder.source(source)
    });

    let report = harness.workflow.wait().await.unwrap();
    assert_eq!(harness.workflow.state(), WorkflowState::Stopped);

    let fatal = report.fatal.clone().expect("outage should be fatal");
    assert_eq!(fatal.attempts, 3);
    assert_eq!(report.source_errors, 3);

    // The partial window is drained and delivered before stopping.
    let batches = harness.batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].trigger, TriggerReason::Drain);
    assert_eq!(harness.output.messages_as_strings(), vec!["last words"]);

    match report.into_result() {
        Err(WorkflowError::SourceUnavailable { attempts, reason }) => {
            assert_eq!(attempts, 3);
            assert!(reason.contains("connection refused"));
        }
        other => panic!("expected source unavailable, got {:?}", other),
    }
}

/// Replays a script of poll results, then reports end of stream.
struct FlappingSource {
    script: VecDeque<Result<Polled, SourceError>>,
}

#[async_trait]
impl RecordSource for FlappingSource {
    async fn poll(&mut self, _timeout: Duration) -> Result<Polled, SourceError> {
        self.script.pop_front().unwrap_or(Ok(Polled::Closed))
    }

    fn describe(&self) -> String {
        "flapping".to_string()
    }
}

#[tokio::test(start_paused = true)]
async fn test_successful_poll_resets_source_retry_count() {
    let outage = || -> Result<Polled, SourceError> {
        Err(SourceError::Unavailable("broker restarting".to_string()))
    };
    let source = FlappingSource {
        script: VecDeque::from(vec![
            outage(),
            outage(),
            Ok(Polled::Record(Record::new("input", "r1"))),
            outage(),
            outage(),
            Ok(Polled::Empty),
            outage(),
            outage(),
            Ok(Polled::Record(Record::new("input", "r2"))),
        ]),
    };
    let mut harness = Harness::setup_with(memory_config(10, 5, "pipelined"), |builder| {
        builder.source(source)
    });

    let report = harness.workflow.wait().await.unwrap();
    assert_eq!(harness.workflow.state(), WorkflowState::Stopped);

    // Six failures in total, never more than two in a row.
    assert_eq!(report.source_errors, 6);
    assert!(report.fatal.is_none());
    assert_eq!(report.records_published, 2);
    assert_eq!(harness.output.messages_as_strings(), vec!["r1", "r2"]);
    assert!(report.into_result().is_ok());
}
