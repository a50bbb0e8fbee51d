//! Job Run Monitor Tests
//!
//! Drives the monitor against the mock cluster with a manual clock, so the
//! drain window, backoff and timeouts are checked without real sleeps.

use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use jobwatch::mock::{FailureConfig, ManualClock, MockJobService, MockLogStore, Operation, RecordingSink};
use jobwatch::monitor::{BackoffPolicy, Clock, MonitorConfig, MonitorError, MonitorState};
use jobwatch::protocol::event::{ErrorInfo, StepFailureData, StepSuccessData};
use jobwatch::protocol::{encode, DomainEvent, EventKind, EventPayload};
use jobwatch::{JobRunInfo, JobRunMonitor, JobStatus, LogGroupRef};

const T0: i64 = 1_700_000_000_000;
const POLL: Duration = Duration::from_secs(10);
const MAX_WAIT: Duration = Duration::from_secs(30);

struct Cluster {
    jobs: Arc<MockJobService>,
    store: Arc<MockLogStore>,
    clock: Arc<ManualClock>,
    sink: RecordingSink,
}

impl Cluster {
    fn new(statuses: &[JobStatus]) -> Self {
        let jobs = Arc::new(MockJobService::new());
        jobs.add_job("job-1", statuses);
        let clock = Arc::new(ManualClock::at_millis(T0));
        let store = Arc::new(MockLogStore::new().with_clock(clock.clone()));
        store.create_group("g");
        Self {
            jobs,
            store,
            clock,
            sink: RecordingSink::new(),
        }
    }

    fn config(&self) -> MonitorConfig {
        MonitorConfig::new("job-1", LogGroupRef::new("g"), "job-1/", T0 - 60_000)
            .with_poll_interval(POLL)
            .with_max_wait_after_done(MAX_WAIT)
    }

    fn monitor(&self, config: MonitorConfig) -> JobRunMonitor {
        JobRunMonitor::new(config, self.jobs.clone(), self.store.clone())
            .with_clock(self.clock.clone())
            .with_sink(self.sink.clone())
    }

    fn log(&self, stream: &str, offset_ms: i64, message: &str) {
        self.store
            .put("g", &format!("job-1/{}", stream), T0 + offset_ms, message);
    }
}

fn step_start(step: &str) -> String {
    encode(&DomainEvent::new("etl", EventPayload::StepStart).with_step(step)).unwrap()
}

fn step_success(step: &str) -> String {
    let payload = EventPayload::StepSuccess(StepSuccessData { duration_ms: 1200.0 });
    encode(&DomainEvent::new("etl", payload).with_step(step)).unwrap()
}

fn step_failure(step: &str) -> String {
    let payload = EventPayload::StepFailure(StepFailureData {
        error: ErrorInfo {
            message: "division by zero".to_string(),
            class_name: Some("ZeroDivisionError".to_string()),
            stack: vec![],
        },
        user_failure: false,
    });
    encode(&DomainEvent::new("etl", payload).with_step(step)).unwrap()
}

// =============================================================================
// Ordering and passthrough
// =============================================================================

#[test]
fn test_events_yielded_in_fetch_order() {
    let cluster = Cluster::new(&[JobStatus::Running, JobStatus::Succeeded]);
    cluster.log("stdout", 0, &step_start("extract"));
    cluster.log("stdout", 5, "extracting 10 rows");
    cluster.log("stdout", 10, &step_success("extract"));

    let events: Vec<_> = cluster
        .monitor(cluster.config())
        .map(|item| item.unwrap())
        .collect();

    let kinds: Vec<_> = events.iter().map(|e| e.kind()).collect();
    assert_eq!(kinds, vec![EventKind::StepStart, EventKind::StepSuccess]);
    assert_eq!(events[0].step_key.as_deref(), Some("extract"));
    assert_eq!(cluster.sink.lines_for("stdout"), vec!["extracting 10 rows".to_string()]);
}

#[test]
fn test_plain_lines_tagged_with_relative_stream() {
    let cluster = Cluster::new(&[JobStatus::Succeeded]);
    cluster.log("stdout", 0, "hello");
    cluster.log("stderr", 0, "warning: disk almost full");

    let mut monitor = cluster.monitor(cluster.config().with_max_wait_after_done(Duration::ZERO));
    assert!(monitor.next().is_none());

    assert_eq!(cluster.sink.lines_for("stdout"), vec!["hello".to_string()]);
    assert_eq!(
        cluster.sink.lines_for("stderr"),
        vec!["warning: disk almost full".to_string()]
    );
}

#[test]
fn test_wrapped_event_lines_unwrapped() {
    let cluster = Cluster::new(&[JobStatus::Succeeded]);
    let wrapped = serde_json::json!({ "message": step_success("load") }).to_string();
    cluster.log("stdout", 0, &wrapped);
    cluster.log("stdout", 1, r#"{"message": "plain text inside a wrapper"}"#);

    let events: Vec<_> = cluster.monitor(cluster.config()).collect();

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].as_ref().unwrap().kind(), EventKind::StepSuccess);
    assert_eq!(
        cluster.sink.lines_for("stdout"),
        vec!["plain text inside a wrapper".to_string()]
    );
}

#[test]
fn test_wrapped_lines_left_alone_when_disabled() {
    let cluster = Cluster::new(&[JobStatus::Succeeded]);
    let wrapped = serde_json::json!({ "message": step_success("load") }).to_string();
    cluster.log("stdout", 0, &wrapped);

    let config = cluster.config().with_unwrap_json_messages(false);
    let events: Vec<_> = cluster.monitor(config).collect();

    assert!(events.is_empty());
    assert_eq!(cluster.sink.lines_for("stdout"), vec![wrapped]);
}

#[test]
fn test_malformed_event_lines_forwarded_and_counted() {
    let cluster = Cluster::new(&[JobStatus::Succeeded]);
    cluster.log("stdout", 0, r#"{"event": "!!not base64!!", "eventDescr": "?"}"#);
    cluster.log("stdout", 1, &step_success("load"));

    let mut monitor = cluster.monitor(cluster.config());
    let events: Vec<_> = monitor.by_ref().map(|item| item.unwrap()).collect();

    assert_eq!(events.len(), 1);
    assert_eq!(cluster.sink.lines_for("stdout").len(), 1);
    assert_eq!(monitor.counters().decode_errors, 1);
    assert_eq!(monitor.counters().events_decoded, 1);
}

// =============================================================================
// Drain window
// =============================================================================

#[test]
fn test_drain_lasts_at_least_max_wait() {
    let cluster = Cluster::new(&[JobStatus::Succeeded]);

    let start = cluster.clock.now();
    let mut monitor = cluster.monitor(cluster.config());
    assert!(monitor.next().is_none());

    let elapsed = cluster.clock.now() - start;
    assert!(elapsed >= ChronoDuration::seconds(30));
    assert_eq!(monitor.state(), MonitorState::Done);
    assert_eq!(monitor.final_status(), Some(JobStatus::Succeeded));
    // Ticks at T0, +10s, +20s, +30s
    assert_eq!(cluster.jobs.describe_calls("job-1"), 4);
    assert_eq!(cluster.clock.sleeps(), vec![POLL; 3]);
}

#[test]
fn test_late_logs_arrive_during_drain() {
    let cluster = Cluster::new(&[JobStatus::Running, JobStatus::Failed]);
    let start = cluster.clock.now();
    // Written while the job ran, shipped 25s after it was seen failed
    cluster.store.put_delivered_at(
        "g",
        "job-1/stdout",
        T0 + 5_000,
        &step_failure("transform"),
        start + ChronoDuration::seconds(35),
    );

    let events: Vec<_> = cluster
        .monitor(cluster.config())
        .map(|item| item.unwrap())
        .collect();

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind(), EventKind::StepFailure);
}

#[test]
fn test_zero_wait_ends_on_terminal_tick() {
    let cluster = Cluster::new(&[JobStatus::Cancelled]);
    let mut monitor = cluster.monitor(cluster.config().with_max_wait_after_done(Duration::ZERO));

    assert!(monitor.next().is_none());
    assert!(cluster.clock.sleeps().is_empty());
    assert_eq!(monitor.final_status(), Some(JobStatus::Cancelled));
}

#[test]
fn test_stop_on_final_event_ends_drain_early() {
    let cluster = Cluster::new(&[JobStatus::Succeeded]);
    cluster.log("stdout", 0, &step_success("load"));

    let config = cluster.config().with_stop_on_final_event(true);
    let mut monitor = cluster.monitor(config);

    assert!(monitor.next().unwrap().is_ok());
    assert!(monitor.next().is_none());
    assert_eq!(cluster.clock.total_slept(), Duration::ZERO);
}

#[test]
fn test_final_event_alone_does_not_end_monitoring_by_default() {
    let cluster = Cluster::new(&[JobStatus::Succeeded]);
    cluster.log("stdout", 0, &step_success("load"));

    let mut monitor = cluster.monitor(cluster.config());
    assert_eq!(monitor.by_ref().count(), 1);
    assert_eq!(cluster.clock.total_slept(), MAX_WAIT);
}

// =============================================================================
// Errors
// =============================================================================

#[test]
fn test_unknown_job_is_fatal() {
    let cluster = Cluster::new(&[JobStatus::Running]);
    let config = MonitorConfig::new("no-such-job", LogGroupRef::new("g"), "job-1/", 0);
    let mut monitor = cluster.monitor(config);

    match monitor.next() {
        Some(Err(MonitorError::UnknownJob(id))) => assert_eq!(id, "no-such-job"),
        other => panic!("expected unknown job, got {other:?}"),
    }
    assert!(monitor.next().is_none());
    assert_eq!(monitor.final_status(), None);
    assert!(monitor.summary().error.unwrap().contains("no-such-job"));
}

#[test]
fn test_log_fetch_error_then_recovery_without_duplicates() {
    let cluster = Cluster::new(&[JobStatus::Succeeded]);
    cluster.log("stdout", 0, &step_start("load"));
    cluster.log("stdout", 1, &step_success("load"));
    cluster
        .store
        .inject(Operation::ReadPage, FailureConfig::throttled().with_fail_count(1));

    let items: Vec<_> = cluster.monitor(cluster.config()).collect();

    assert!(matches!(items[0], Err(MonitorError::LogFetch(_))));
    assert!(items[0].as_ref().unwrap_err().is_retryable());
    let events: Vec<_> = items[1..].iter().map(|i| i.as_ref().unwrap().kind()).collect();
    assert_eq!(events, vec![EventKind::StepStart, EventKind::StepSuccess]);
}

#[test]
fn test_drain_deadline_holds_while_store_keeps_failing() {
    let cluster = Cluster::new(&[JobStatus::Succeeded]);
    cluster
        .store
        .inject(Operation::ReadPage, FailureConfig::transport("connection reset"));
    cluster.log("stdout", 0, "never read");

    let items: Vec<_> = cluster.monitor(cluster.config()).collect();

    assert_eq!(items.len(), 4);
    assert!(items.iter().all(|item| item.is_err()));
}

#[test]
fn test_exponential_backoff_after_status_errors() {
    let cluster = Cluster::new(&[JobStatus::Succeeded]);
    cluster.jobs.inject(FailureConfig::throttled().with_fail_count(3));

    let config = cluster
        .config()
        .with_max_wait_after_done(Duration::ZERO)
        .with_backoff(BackoffPolicy::Exponential {
            max: Duration::from_secs(60),
        });
    let items: Vec<_> = cluster.monitor(config).collect();

    assert_eq!(items.iter().filter(|i| i.is_err()).count(), 3);
    assert_eq!(
        cluster.clock.sleeps(),
        vec![
            Duration::from_secs(20),
            Duration::from_secs(40),
            Duration::from_secs(60)
        ]
    );
}

#[test]
fn test_overall_timeout() {
    let cluster = Cluster::new(&[JobStatus::Running]);
    let config = cluster
        .config()
        .with_overall_timeout(Some(Duration::from_secs(25)));
    let mut monitor = cluster.monitor(config);

    match monitor.next() {
        Some(Err(MonitorError::Timeout(limit))) => assert_eq!(limit, Duration::from_secs(25)),
        other => panic!("expected timeout, got {other:?}"),
    }
    assert!(monitor.next().is_none());
    assert_eq!(cluster.jobs.describe_calls("job-1"), 3);
    assert_eq!(monitor.final_status(), None);
}

#[test]
fn test_timeout_while_draining_keeps_final_status() {
    let cluster = Cluster::new(&[JobStatus::Succeeded]);
    let config = cluster
        .config()
        .with_overall_timeout(Some(Duration::from_secs(15)));
    let mut monitor = cluster.monitor(config);

    assert!(matches!(monitor.next(), Some(Err(MonitorError::Timeout(_)))));
    assert!(monitor.next().is_none());
    assert!(matches!(monitor.fatal_error(), Some(MonitorError::Timeout(_))));
    assert_eq!(monitor.final_status(), Some(JobStatus::Succeeded));

    let summary = monitor.summary();
    assert_eq!(summary.final_status, Some(JobStatus::Succeeded));
    assert!(summary.error.is_some());
}

// =============================================================================
// Results
// =============================================================================

#[test]
fn test_failed_job_details_in_summary() {
    let cluster = Cluster::new(&[JobStatus::Running]);
    let mut monitor = cluster.monitor(cluster.config());
    cluster.log("stdout", 0, "starting");

    assert_eq!(monitor.state(), MonitorState::Polling);
    cluster.jobs.set_run_info(
        JobRunInfo::new("job-1", JobStatus::Failed)
            .with_failure("USER_ERROR", "Driver exited with code 1"),
    );
    assert!(monitor.next().is_none());

    let run = monitor.terminal_run().unwrap();
    assert_eq!(run.state_details.as_deref(), Some("Driver exited with code 1"));

    let summary = monitor.summary();
    assert_eq!(summary.final_status, Some(JobStatus::Failed));
    assert_eq!(summary.failure_reason.as_deref(), Some("USER_ERROR"));
    assert_eq!(summary.streams, vec!["job-1/stdout".to_string()]);
    assert_eq!(summary.counters.records_fetched, 1);

    let json = serde_json::to_value(&summary).unwrap();
    assert_eq!(json["schema_id"], "jobwatch/monitor_summary@1");
    assert_eq!(json["final_status"], "FAILED");
}
