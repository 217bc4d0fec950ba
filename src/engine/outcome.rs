//! Operation outcomes: the record type carried from workers to the
//! aggregator, and the classifier that maps raw I/O failures onto the
//! closed status taxonomy.
//!
//! Every attempted operation produces exactly one `Record`. Classification
//! is total: an error that matches no known category still yields
//! `Status::Other` rather than being dropped.

use chrono::{DateTime, Utc};
use std::fmt;
use std::io;
use std::time::Duration;

/// Transport protocol of a measured operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Proto {
    Tcp,
}

impl Proto {
    pub fn as_str(self) -> &'static str {
        match self {
            Proto::Tcp => "TCP",
        }
    }
}

impl fmt::Display for Proto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The operation a record describes.
///
/// `Ended` is a worker-lifecycle sentinel, counted by the aggregator and
/// never written to the measurement log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Connect,
    Send,
    Recv,
    Close,
    Ended,
}

impl Op {
    pub fn as_str(self) -> &'static str {
        match self {
            Op::Connect => "CONNECT",
            Op::Send => "SEND",
            Op::Recv => "RECV",
            Op::Close => "CLOSE",
            Op::Ended => "ENDED",
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed status taxonomy for every I/O outcome.
///
/// The symbolic log names follow the measurement-log format consumed by the
/// downstream analyzer, so they stay short and historic (`ERRLOOKUP`, `EOF`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Operation completed without error.
    Success,
    /// Deadline expired before the operation completed.
    Timeout,
    /// Peer actively refused the connection.
    Refused,
    /// Address resolution failed.
    Lookup,
    /// Peer closed the connection: EOF, reset, or broken pipe.
    Closed,
    /// Echoed bytes diverged from the sent payload (validate mode only).
    Mismatch,
    /// Error that fits no known category.
    Other,
    /// Sentinel: the emitting worker has stopped.
    Ended,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Success => "SUCCESS",
            Status::Timeout => "TIMEOUT",
            Status::Refused => "REFUSED",
            Status::Lookup => "ERRLOOKUP",
            Status::Closed => "EOF",
            Status::Mismatch => "MISMATCH",
            Status::Other => "ERROTHER",
            Status::Ended => "ENDED",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a raw transport error into a `Status`.
///
/// Total and deterministic. Kind-based matching covers the common cases;
/// resolver failures surface as an uncategorized kind, so those fall back to
/// the textual contract of the std resolver, mirroring how the log consumer
/// distinguishes them.
pub fn classify(err: &io::Error) -> Status {
    use io::ErrorKind;

    match err.kind() {
        ErrorKind::TimedOut | ErrorKind::WouldBlock => Status::Timeout,
        ErrorKind::ConnectionRefused => Status::Refused,
        ErrorKind::ConnectionReset
        | ErrorKind::ConnectionAborted
        | ErrorKind::BrokenPipe
        | ErrorKind::UnexpectedEof => Status::Closed,
        _ => {
            let msg = err.to_string();
            if msg.contains("failed to lookup address")
                || msg.contains("Name or service not known")
            {
                Status::Lookup
            } else if msg.ends_with("EOF") {
                Status::Closed
            } else {
                Status::Other
            }
        }
    }
}

/// One measured operation, emitted once by the owning worker and consumed
/// once by the aggregator. Never mutated after creation.
#[derive(Debug, Clone)]
pub struct Record {
    pub worker: usize,
    pub slot: usize,
    pub timestamp: DateTime<Utc>,
    pub proto: Proto,
    pub op: Op,
    pub elapsed: Duration,
    pub size: usize,
    pub status: Status,
}

impl Record {
    pub fn new(
        worker: usize,
        slot: usize,
        timestamp: DateTime<Utc>,
        op: Op,
        elapsed: Duration,
        size: usize,
        status: Status,
    ) -> Self {
        Self {
            worker,
            slot,
            timestamp,
            proto: Proto::Tcp,
            op,
            elapsed,
            size,
            status,
        }
    }

    /// The completion sentinel a worker emits exactly once on exit.
    pub fn ended(worker: usize) -> Self {
        Self::new(
            worker,
            0,
            Utc::now(),
            Op::Ended,
            Duration::ZERO,
            0,
            Status::Ended,
        )
    }

    pub fn is_ended(&self) -> bool {
        self.status == Status::Ended
    }
}
