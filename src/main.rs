//! rtclog CLI.
//!
//! Reads a JSON-lines event log (one record per line, as produced by the log
//! container decoder), writes the synthetic packet capture and prints or stores
//! the telemetry report as JSON.

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use rtclog::{AnalyzerConfig, LogRecord, TelemetryAnalyzer, start_time_from_file_name};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "WebRTC event log telemetry extractor", long_about = None)]
struct CliArgs {
    /// JSON-lines event log to analyse.
    input: PathBuf,

    /// Capture file to write. Defaults to `<INPUT>.pcap`.
    #[arg(short, long)]
    pcap: Option<PathBuf>,

    /// Report file to write. Defaults to stdout.
    #[arg(short, long)]
    report: Option<PathBuf>,

    /// JSON file with analyzer settings; command-line flags take precedence.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Wall-clock time of the first event, microseconds since the Unix epoch.
    /// Derived from the input file name when omitted.
    #[arg(long)]
    start_time_us: Option<i64>,

    /// Bitrate averaging window in milliseconds.
    #[arg(long)]
    bitrate_window_ms: Option<i64>,
}

fn load_config(args: &CliArgs) -> Result<AnalyzerConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("parsing config {}", path.display()))?
        }
        None => AnalyzerConfig::default(),
    };

    if let Some(start) = args.start_time_us.or_else(|| {
        args.input
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(start_time_from_file_name)
    }) {
        config.absolute_start_time_us = start;
    }
    if let Some(window) = args.bitrate_window_ms {
        config.bitrate_window_ms = window;
    }
    Ok(config)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let args = CliArgs::parse();
    let config = load_config(&args)?;
    info!(
        input = %args.input.display(),
        start_time_us = config.absolute_start_time_us,
        "Analysing event log"
    );

    let input = File::open(&args.input)
        .with_context(|| format!("opening {}", args.input.display()))?;
    let mut analyzer = TelemetryAnalyzer::new(config);
    let mut skipped_lines = 0u64;

    for (index, line) in BufReader::new(input).lines().enumerate() {
        let line = line.with_context(|| format!("reading line {}", index + 1))?;
        if line.trim().is_empty() {
            continue;
        }
        match LogRecord::from_json_line(&line).and_then(|record| record.expand()) {
            Ok(events) => analyzer.process_all(&events),
            Err(err) => {
                warn!(line = index + 1, error = %err, "Skipping record");
                skipped_lines += 1;
            }
        }
    }

    let (report, capture) = analyzer.finish();

    let pcap_path = args
        .pcap
        .clone()
        .unwrap_or_else(|| args.input.with_extension("pcap"));
    fs::write(&pcap_path, &capture)
        .with_context(|| format!("writing capture {}", pcap_path.display()))?;

    match &args.report {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("creating report {}", path.display()))?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, &report)?;
            writer.flush()?;
        }
        None => {
            let mut stdout = io::stdout().lock();
            serde_json::to_writer_pretty(&mut stdout, &report)?;
            writeln!(stdout)?;
        }
    }

    info!(
        events = report.summary.events,
        rtp_packets = report.summary.rtp_packets,
        rtcp_packets = report.summary.rtcp_packets,
        capture_records = report.summary.capture_records,
        skipped_lines,
        capture = %pcap_path.display(),
        "Done"
    );
    Ok(())
}
