//! jobwatch CLI
//!
//! Entry point for the `jobwatch` command-line tool.

use clap::{Parser, Subcommand};
use jobwatch::backend::{AwsCliConfig, AwsJobStatusSource, AwsLogStore, ProcessTransport};
use jobwatch::config::{default_user_config_path, EffectiveConfig};
use jobwatch::protocol::{decode, encode_checked, DomainEvent};
use jobwatch::monitor::{MonitorConfig, TracingSink};
use jobwatch::{
    JobRunMonitor, JobStatus, JobStatusSource, LogGroupRef, LogStore, MonitorError,
};
use std::io::{self, BufRead, Read, Write};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const EXIT_SUCCEEDED: i32 = 0;
const EXIT_FAILED: i32 = 1;
const EXIT_CANCELLED: i32 = 2;
const EXIT_UNKNOWN_JOB: i32 = 3;
const EXIT_TIMEOUT: i32 = 4;
const EXIT_CONFIG: i32 = 10;

#[derive(Parser)]
#[command(name = "jobwatch")]
#[command(about = "Follow a remote job run through its status and logs", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Monitor a job run until it finished and its logs were drained
    Watch {
        /// Job run identifier
        #[arg(long)]
        job_id: String,

        /// Log group the job writes to
        #[arg(long)]
        log_group: String,

        /// Stream name prefix of the job's log streams
        #[arg(long)]
        stream_prefix: String,

        /// Ignore records older than this (epoch millis)
        #[arg(long, default_value_t = 0)]
        start_ms: i64,

        /// Config file layered over ~/.config/jobwatch/config.toml
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,

        #[arg(long)]
        poll_interval_ms: Option<u64>,

        #[arg(long)]
        max_wait_after_done_ms: Option<u64>,

        #[arg(long)]
        region: Option<String>,

        #[arg(long)]
        virtual_cluster_id: Option<String>,

        /// Write the monitor summary JSON to this file
        #[arg(long)]
        summary: Option<PathBuf>,
    },

    /// Read a domain event as JSON on stdin and print its log line
    Encode,

    /// Read log lines on stdin and print the decoded events as JSON
    Decode,

    /// Print the effective configuration
    Config {
        /// Config file layered over ~/.config/jobwatch/config.toml
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
    },
}

fn main() {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Commands::Watch {
            job_id,
            log_group,
            stream_prefix,
            start_ms,
            config,
            poll_interval_ms,
            max_wait_after_done_ms,
            region,
            virtual_cluster_id,
            summary,
        } => {
            let overrides = cli_overrides(
                poll_interval_ms,
                max_wait_after_done_ms,
                region,
                virtual_cluster_id,
            );
            let code = run_watch(
                &job_id,
                &log_group,
                &stream_prefix,
                start_ms,
                config,
                overrides,
                summary,
            );
            process::exit(code);
        }
        Commands::Encode => run_encode(),
        Commands::Decode => run_decode(),
        Commands::Config { config } => run_config(config),
    }
}

/// Human-readable logs on stderr, filtered by `JOBWATCH_LOG` (default `info`)
fn init_logging() {
    let filter = EnvFilter::try_from_env("JOBWATCH_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(true)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to install logger: {}", e);
    }
}

fn cli_overrides(
    poll_interval_ms: Option<u64>,
    max_wait_after_done_ms: Option<u64>,
    region: Option<String>,
    virtual_cluster_id: Option<String>,
) -> serde_json::Value {
    let mut overrides = serde_json::json!({});
    if let Some(ms) = poll_interval_ms {
        overrides["poll_interval_ms"] = ms.into();
    }
    if let Some(ms) = max_wait_after_done_ms {
        overrides["max_wait_after_done_ms"] = ms.into();
    }
    if let Some(region) = region {
        overrides["aws"]["region"] = region.into();
    }
    if let Some(id) = virtual_cluster_id {
        overrides["aws"]["virtual_cluster_id"] = id.into();
    }
    overrides
}

fn run_watch(
    job_id: &str,
    log_group: &str,
    stream_prefix: &str,
    start_ms: i64,
    config_path: Option<PathBuf>,
    overrides: serde_json::Value,
    summary_path: Option<PathBuf>,
) -> i32 {
    let user_config = default_user_config_path();
    let effective =
        match EffectiveConfig::build(user_config.as_deref(), config_path.as_deref(), Some(overrides)) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Configuration error: {}", e);
                return EXIT_CONFIG;
            }
        };
    let settings = match effective.settings() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return EXIT_CONFIG;
        }
    };
    let Some(virtual_cluster_id) = settings.aws.virtual_cluster_id.clone() else {
        eprintln!("Configuration error: aws.virtual_cluster_id is required (or --virtual-cluster-id)");
        return EXIT_CONFIG;
    };

    let transport = Arc::new(ProcessTransport::new(AwsCliConfig {
        region: settings.aws.region.clone(),
        profile: settings.aws.profile.clone(),
        ..Default::default()
    }));
    let jobs = Arc::new(AwsJobStatusSource::new(transport.clone(), virtual_cluster_id));
    let logs = Arc::new(AwsLogStore::new(transport));
    let monitor_config =
        settings.monitor_config(job_id, LogGroupRef::new(log_group), stream_prefix, start_ms);

    let mut monitor = watch_monitor(monitor_config, jobs, logs);
    if let Err(e) = write_events(&mut monitor, &mut io::stdout().lock()) {
        eprintln!("Error writing events: {}", e);
    }

    let summary = monitor.summary();
    tracing::info!("{}", summary.human_summary);
    if let Some(path) = summary_path {
        let written = serde_json::to_string_pretty(&summary)
            .map_err(|e| e.to_string())
            .and_then(|json| std::fs::write(&path, json).map_err(|e| e.to_string()));
        if let Err(e) = written {
            eprintln!("Failed to write summary to {}: {}", path.display(), e);
        }
    }

    match (monitor.fatal_error(), monitor.final_status()) {
        (Some(MonitorError::UnknownJob(_)), _) => EXIT_UNKNOWN_JOB,
        (Some(MonitorError::Timeout(_)), _) => EXIT_TIMEOUT,
        (_, Some(JobStatus::Succeeded)) => EXIT_SUCCEEDED,
        (_, Some(JobStatus::Cancelled)) => EXIT_CANCELLED,
        _ => EXIT_FAILED,
    }
}

/// Plain lines of the remote job go to the log on stderr; stdout carries
/// event JSON only.
fn watch_monitor(
    config: MonitorConfig,
    jobs: Arc<dyn JobStatusSource>,
    logs: Arc<dyn LogStore>,
) -> JobRunMonitor {
    JobRunMonitor::new(config, jobs, logs).with_sink(TracingSink)
}

/// Drain the monitor, one event JSON object per line.
fn write_events<W: Write>(monitor: &mut JobRunMonitor, out: &mut W) -> io::Result<()> {
    for item in monitor.by_ref() {
        match item {
            Ok(event) => {
                serde_json::to_writer(&mut *out, &event)?;
                writeln!(out)?;
                out.flush()?;
            }
            Err(e) if e.is_retryable() => tracing::warn!(error = %e, "Retrying after error"),
            Err(e) => eprintln!("Error: {}", e),
        }
    }
    Ok(())
}

fn print_event(event: &DomainEvent) {
    match serde_json::to_string(event) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error serializing event: {}", e),
    }
}

fn run_encode() {
    let mut input = String::new();
    if let Err(e) = io::stdin().read_to_string(&mut input) {
        eprintln!("Error reading stdin: {}", e);
        process::exit(1);
    }

    let event: DomainEvent = match serde_json::from_str(&input) {
        Ok(event) => event,
        Err(e) => {
            eprintln!("Invalid event JSON: {}", e);
            process::exit(1);
        }
    };

    match encode_checked(&event) {
        Ok(line) => println!("{}", line),
        Err(e) => {
            eprintln!("Error encoding event: {}", e);
            process::exit(1);
        }
    }
}

fn run_decode() {
    let mut failures = 0usize;
    for (index, line) in io::stdin().lock().lines().enumerate() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                eprintln!("Error reading stdin: {}", e);
                process::exit(1);
            }
        };

        match decode(&line) {
            Ok(Some(event)) => print_event(&event),
            Ok(None) => {}
            Err(e) => {
                failures += 1;
                tracing::warn!(line = index + 1, error = %e, "Malformed event line");
            }
        }
    }

    if failures > 0 {
        process::exit(1);
    }
}

fn run_config(config_path: Option<PathBuf>) {
    let user_config = default_user_config_path();
    let effective = match EffectiveConfig::build(user_config.as_deref(), config_path.as_deref(), None)
    {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            process::exit(EXIT_CONFIG);
        }
    };

    match effective.to_redacted_json() {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Error serializing config: {}", e);
            process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobwatch::mock::{ManualClock, MockJobService, MockLogStore};
    use jobwatch::protocol::{encode, EventPayload};
    use std::sync::Mutex;
    use std::time::Duration;

    const T0: i64 = 1_700_000_000_000;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_watch_stdout_carries_only_events() {
        let jobs = Arc::new(MockJobService::new());
        jobs.add_job("job-1", &[JobStatus::Succeeded]);
        let store = Arc::new(MockLogStore::new());
        store.create_group("g");
        let event = DomainEvent::new("etl", EventPayload::StepStart).with_step("load");
        store.put("g", "job-1/stdout", T0, "INFO starting driver");
        store.put("g", "job-1/stdout", T0 + 1, &encode(&event).unwrap());
        store.put("g", "job-1/stderr", T0 + 2, "WARN slow executor");

        let log = SharedBuf::default();
        let writer = log.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();

        let mut stdout = Vec::new();
        tracing::subscriber::with_default(subscriber, || {
            let config = MonitorConfig::new("job-1", LogGroupRef::new("g"), "job-1/", T0)
                .with_max_wait_after_done(Duration::ZERO);
            let mut monitor = watch_monitor(config, jobs, store)
                .with_clock(Arc::new(ManualClock::at_millis(T0)));
            write_events(&mut monitor, &mut stdout).unwrap();
        });

        let stdout = String::from_utf8(stdout).unwrap();
        let printed: Vec<DomainEvent> = stdout
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(printed, vec![event]);

        let log = String::from_utf8(log.0.lock().unwrap().clone()).unwrap();
        assert!(log.contains("INFO starting driver"));
        assert!(log.contains("WARN slow executor"));
    }
}
