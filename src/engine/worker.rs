//! Worker execution loop.
//!
//! A worker drives its owned slots round-robin: close on reached quota,
//! connect if idle, then one send/receive exchange, each under its deadline.
//! Every attempted operation emits exactly one record into the result
//! channel. The loop polls the run flag once per visit; a worker may finish
//! one extra cycle after shutdown is requested, which bounds shutdown
//! latency by one cycle plus timeouts.

use crate::config::Config;
use crate::engine::outcome::{classify, Op, Record, Status};
use crate::engine::pool::ConnSlot;
use crate::engine::{payload, RunFlag};
use bytes::BytesMut;
use chrono::Utc;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Barrier};
use tokio::time::timeout;
use tracing::{debug, warn};

/// Poll interval for a worker whose partition came up empty (possible when
/// ceiling division starves trailing workers).
const IDLE_PARK: Duration = Duration::from_millis(50);

pub(crate) struct Worker {
    id: usize,
    config: Arc<Config>,
    flag: RunFlag,
    barrier: Arc<Barrier>,
    tx: mpsc::Sender<Record>,
    payload: Vec<u8>,
    recv_buf: BytesMut,
}

impl Worker {
    pub fn new(
        id: usize,
        config: Arc<Config>,
        flag: RunFlag,
        barrier: Arc<Barrier>,
        tx: mpsc::Sender<Record>,
    ) -> Self {
        let payload = payload::build(config.payload_mode, config.payload_size, id);
        let recv_buf = BytesMut::with_capacity(payload.len().max(64));
        Self {
            id,
            config,
            flag,
            barrier,
            tx,
            payload,
            recv_buf,
        }
    }

    /// Drive the owned slots until shutdown is requested, then release every
    /// connection and emit the `Ended` sentinel.
    pub async fn run(mut self, mut slots: Vec<ConnSlot>) {
        self.barrier.wait().await;
        if self.config.verbose {
            debug!(worker = self.id, slots = slots.len(), "worker started");
        }

        if slots.is_empty() {
            while self.flag.is_running() {
                tokio::time::sleep(IDLE_PARK).await;
            }
        } else {
            let mut pos = 0;
            while self.flag.is_running() {
                if !self.visit(&mut slots[pos]).await {
                    break;
                }
                if !self.config.delay.is_zero() {
                    tokio::time::sleep(self.config.delay).await;
                }
                pos += 1;
                if pos == slots.len() {
                    pos = 0;
                }
            }
        }

        // Drop live connections before reporting completion, so the quorum
        // implies every connection is released.
        slots.clear();
        let _ = self.tx.send(Record::ended(self.id)).await;
        if self.config.verbose {
            debug!(worker = self.id, "worker stopped");
        }
    }

    /// One slot visit. Returns false when the aggregator is gone and the
    /// worker should stop early.
    async fn visit(&mut self, slot: &mut ConnSlot) -> bool {
        if slot.is_connected() && slot.sent >= self.config.send_per_conn {
            let rec = self.close_slot(slot).await;
            if !self.emit(rec).await {
                return false;
            }
        }
        if !slot.is_connected() {
            let rec = self.connect_slot(slot).await;
            if !self.emit(rec).await {
                return false;
            }
        }
        if slot.is_connected() {
            return self.exchange(slot).await;
        }
        true
    }

    async fn connect_slot(&self, slot: &mut ConnSlot) -> Record {
        let timestamp = Utc::now();
        let started = Instant::now();
        let status = match timeout(
            self.config.connect_timeout,
            TcpStream::connect(&self.config.addr),
        )
        .await
        {
            Ok(Ok(stream)) => {
                slot.stream = Some(stream);
                slot.sent = 0;
                Status::Success
            }
            Ok(Err(err)) => self.classified(&err, "connect"),
            Err(_) => Status::Timeout,
        };
        Record::new(
            self.id,
            slot.index,
            timestamp,
            Op::Connect,
            started.elapsed(),
            0,
            status,
        )
    }

    /// Quota reached: shut the connection down and reset the slot.
    async fn close_slot(&self, slot: &mut ConnSlot) -> Record {
        let timestamp = Utc::now();
        let started = Instant::now();
        let status = match slot.stream.take() {
            Some(mut stream) => {
                match timeout(self.config.io_timeout, stream.shutdown()).await {
                    Ok(Ok(())) => Status::Success,
                    Ok(Err(err)) => self.classified(&err, "close"),
                    Err(_) => Status::Timeout,
                }
            }
            // visit() only closes connected slots
            None => Status::Other,
        };
        slot.reset();
        Record::new(
            self.id,
            slot.index,
            timestamp,
            Op::Close,
            started.elapsed(),
            0,
            status,
        )
    }

    /// Write the payload, then read the echo. A failed write skips the read;
    /// any failure resets the slot so the next visit reconnects.
    async fn exchange(&mut self, slot: &mut ConnSlot) -> bool {
        let Some(mut stream) = slot.stream.take() else {
            return true;
        };

        let timestamp = Utc::now();
        let started = Instant::now();
        let status = match timeout(self.config.io_timeout, stream.write_all(&self.payload)).await {
            Ok(Ok(())) => Status::Success,
            Ok(Err(err)) => self.classified(&err, "send"),
            Err(_) => Status::Timeout,
        };
        let size = if status == Status::Success {
            self.payload.len()
        } else {
            0
        };
        let rec = Record::new(
            self.id,
            slot.index,
            timestamp,
            Op::Send,
            started.elapsed(),
            size,
            status,
        );
        if !self.emit(rec).await {
            return false;
        }
        if status != Status::Success {
            slot.reset();
            return true;
        }
        slot.sent += 1;

        self.recv_buf.clear();
        let timestamp = Utc::now();
        let started = Instant::now();
        let (size, mut status) =
            match timeout(self.config.io_timeout, stream.read_buf(&mut self.recv_buf)).await {
                Ok(Ok(0)) => (0, Status::Closed),
                Ok(Ok(n)) => (n, Status::Success),
                Ok(Err(err)) => (0, self.classified(&err, "recv")),
                Err(_) => (0, Status::Timeout),
            };
        if status == Status::Success
            && self.config.validate
            && !payload::matches(&self.payload, &self.recv_buf)
        {
            status = Status::Mismatch;
        }
        if status == Status::Success {
            slot.stream = Some(stream);
        } else {
            slot.reset();
        }
        let rec = Record::new(
            self.id,
            slot.index,
            timestamp,
            Op::Recv,
            started.elapsed(),
            size,
            status,
        );
        self.emit(rec).await
    }

    fn classified(&self, err: &io::Error, oper: &'static str) -> Status {
        let status = classify(err);
        if self.config.verbose && status == Status::Other {
            warn!(worker = self.id, oper, error = %err, "unclassified transport error");
        }
        status
    }

    async fn emit(&self, rec: Record) -> bool {
        self.tx.send(rec).await.is_ok()
    }
}
