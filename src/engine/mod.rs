//! The load-generation engine.
//!
//! Orchestration: partition the connection pool, spawn the workers, release
//! them through a startup barrier, then run the single aggregator loop that
//! multiplexes the result channel with the duration timer and interrupt
//! signals. Shutdown is cooperative: the aggregator flips the run flag once,
//! keeps draining, and exits only after every worker has reported `Ended`.

mod outcome;
mod payload;
mod pool;
mod worker;

pub use outcome::{Op, Record, Status};
pub use pool::{partition, ConnSlot};

use crate::config::{format_duration, Config};
use crate::report::Sink;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Barrier};
use tracing::info;
use worker::Worker;

/// Result-channel backlog per worker. Headroom against a momentarily slow
/// aggregator, not a correctness mechanism.
const RESULT_BACKLOG_PER_WORKER: usize = 10_000;

/// Process-scoped run state: initialized true before any worker spawns,
/// flipped false exactly once by the aggregator.
///
/// Workers poll it once per outer loop iteration. Relaxed ordering is
/// enough: the accepted staleness bound is one extra cycle, and no other
/// state is published through the flag.
#[derive(Clone, Debug)]
pub struct RunFlag(Arc<AtomicBool>);

impl RunFlag {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn request_stop(&self) {
        self.0.store(false, Ordering::Relaxed);
    }

    pub fn is_running(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

impl Default for RunFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// Run the engine to completion: workers spawn, the barrier releases, the
/// aggregator drains until the worker quorum is reached, the sink is
/// stamped and flushed.
pub async fn run(config: Config, mut sink: Sink) -> io::Result<()> {
    let config = Arc::new(config);
    let flag = RunFlag::new();
    let barrier = Arc::new(Barrier::new(config.workers + 1));
    let (tx, mut rx) = mpsc::channel(config.workers.saturating_mul(RESULT_BACKLOG_PER_WORKER));

    for (id, range) in partition(config.connections, config.workers)
        .into_iter()
        .enumerate()
    {
        let slots: Vec<ConnSlot> = range.map(ConnSlot::new).collect();
        let worker = Worker::new(
            id,
            Arc::clone(&config),
            flag.clone(),
            Arc::clone(&barrier),
            tx.clone(),
        );
        tokio::spawn(worker.run(slots));
    }
    // Workers hold the only senders now; the channel closes when all exit.
    drop(tx);

    // The duration clock and the logged start instant only begin once every
    // worker has arrived.
    barrier.wait().await;
    sink.mark_timestamp().await?;
    info!(
        workers = config.workers,
        duration = %format_duration(config.duration),
        "starting workers"
    );

    let timer = tokio::time::sleep(config.duration);
    tokio::pin!(timer);
    let interrupt = shutdown_signal();
    tokio::pin!(interrupt);
    let mut live = config.workers;

    while live > 0 {
        tokio::select! {
            _ = &mut timer, if flag.is_running() => {
                flag.request_stop();
                info!("duration elapsed, shutting down");
            }
            _ = &mut interrupt, if flag.is_running() => {
                flag.request_stop();
                info!("interrupt received, shutting down");
            }
            rec = rx.recv() => match rec {
                Some(rec) if rec.is_ended() => live -= 1,
                Some(rec) => sink.record(&rec).await?,
                // all senders gone without a full quorum (worker panic)
                None => break,
            }
        }
    }

    sink.finish().await
}

/// Resolves on SIGINT, or SIGTERM where available.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
