//! The measurement log sink.
//!
//! An append-only, tab-separated text stream: `#`-prefixed header lines
//! describing the run, one line per measured operation, and RFC 3339
//! markers around the measurement window. The aggregator is the only
//! writer. Creation refuses to clobber an existing file.

use crate::config::{format_duration, Config};
use crate::engine::Record;
use chrono::{SecondsFormat, Utc};
use std::path::PathBuf;
use thiserror::Error;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};

const WRITE_BUFFER: usize = 64 * 1024;

/// Fatal sink failures, reported before any worker spawns.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("{} already exists", .0.display())]
    AlreadyExists(PathBuf),
    #[error("failed to create stat file '{}': {}", .0.display(), .1)]
    Create(PathBuf, #[source] std::io::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub struct Sink {
    out: BufWriter<File>,
    hostname: String,
    addr: String,
}

impl Sink {
    /// Create the stat file and write the configuration header.
    pub async fn create(config: &Config) -> Result<Self, SinkError> {
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&config.stat_file)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::AlreadyExists => {
                    SinkError::AlreadyExists(config.stat_file.clone())
                }
                _ => SinkError::Create(config.stat_file.clone(), e),
            })?;

        let mut sink = Self {
            out: BufWriter::with_capacity(WRITE_BUFFER, file),
            hostname: hostname(),
            addr: config.addr.clone(),
        };
        sink.out.write_all(header(config).as_bytes()).await?;
        sink.out.flush().await?;
        Ok(sink)
    }

    /// Append an RFC 3339 marker line (`#<timestamp>`). Written once after
    /// the startup barrier releases and once again at shutdown.
    pub async fn mark_timestamp(&mut self) -> std::io::Result<()> {
        let line = format!("#{}\n", Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true));
        self.out.write_all(line.as_bytes()).await?;
        self.out.flush().await
    }

    /// Append one measured operation.
    pub async fn record(&mut self, rec: &Record) -> std::io::Result<()> {
        let line = format_line(&self.hostname, &self.addr, rec);
        self.out.write_all(line.as_bytes()).await
    }

    /// Closing marker, then flush everything to disk.
    pub async fn finish(mut self) -> std::io::Result<()> {
        self.mark_timestamp().await
    }
}

/// The `#`-prefixed run-parameter dump plus the column header.
fn header(config: &Config) -> String {
    let mut h = String::new();
    h.push_str(&format!("#duration: {}\n", format_duration(config.duration)));
    h.push_str(&format!("#address: {}\n", config.addr));
    h.push_str(&format!("#workers: {}\n", config.workers));
    h.push_str(&format!("#connections: {}\n", config.connections));
    h.push_str(&format!("#send: {} per connection\n", config.send_per_conn));
    h.push_str(&format!("#delay: {}\n", format_duration(config.delay)));
    h.push_str(&format!(
        "#connect timeout: {}\n",
        format_duration(config.connect_timeout)
    ));
    h.push_str(&format!(
        "#send/recv timeout: {}\n",
        format_duration(config.io_timeout)
    ));
    h.push_str(
        "#timestamp(ms)\ttesthost\tproto\tremote_address\toper\tduration(us)\tsize\tstatus\n",
    );
    h
}

/// One operation line:
/// `epoch_millis  hostname  proto  remote  oper  duration_us  size  status`.
fn format_line(hostname: &str, addr: &str, rec: &Record) -> String {
    format!(
        "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\n",
        rec.timestamp.timestamp_millis(),
        hostname,
        rec.proto,
        addr,
        rec.op,
        rec.elapsed.as_micros(),
        rec.size,
        rec.status
    )
}

/// Best-effort test-host name for log lines.
fn hostname() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
        .or_else(|| {
            std::fs::read_to_string("/etc/hostname")
                .ok()
                .map(|h| h.trim().to_string())
                .filter(|h| !h.is_empty())
        })
        .unwrap_or_else(|| "localhost".to_string())
}
