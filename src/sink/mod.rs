//! Sink dispatch
//!
//! Records leave the bridge through a [`LogSink`]. The [`Dispatcher`] queues
//! them synchronously, in call order, on a bounded queue. A single detached
//! worker starts one delivery per record in that order, keeping up to a fixed
//! number in flight, so a slow transport does not hold back later records.
//! Whatever the sink returns is discarded: a failing diagnostic channel must
//! never produce a diagnostic of its own.

mod channel;
mod http;

pub use channel::{create_channel, ChannelSink, RecordReceiver, RecordSender};
pub use http::HttpSink;

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::debug;

use crate::config::SinkConfig;
use crate::record::LogRecord;

tokio::task_local! {
    static FORWARDING: ();
}

/// Errors a sink can report; the dispatcher swallows all of them
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink channel is full")]
    Full,

    #[error("sink channel is closed")]
    Closed,

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("transport failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("backend answered with status {0}")]
    Status(u16),
}

/// Destination of forwarded records
#[async_trait]
pub trait LogSink: Send + Sync {
    /// Deliver one record
    async fn forward(&self, record: LogRecord) -> Result<(), SinkError>;
}

/// True while the current task is inside [`LogSink::forward`]
///
/// Signal handlers check this so a sink that panics or logs cannot feed
/// itself back into the bridge.
pub fn is_forwarding() -> bool {
    FORWARDING.try_with(|_| ()).is_ok()
}

/// Fire-and-forget front of a sink
#[derive(Debug, Clone)]
pub struct Dispatcher {
    queue: mpsc::Sender<LogRecord>,
}

impl Dispatcher {
    /// Start the dispatch worker on `runtime`, sized by `limits`
    ///
    /// The worker runs until every clone of the dispatcher is dropped and the
    /// deliveries it started have finished.
    pub fn spawn(sink: Arc<dyn LogSink>, runtime: &Handle, limits: &SinkConfig) -> Self {
        let (queue, pending) = mpsc::channel(limits.queue_capacity.max(1));
        // Detached: nothing ever joins the worker or looks at its result.
        let _detached = runtime.spawn(drain(sink, pending, limits.max_in_flight.max(1)));
        Self { queue }
    }

    /// Queue a record; never blocks and never fails
    ///
    /// Records that find the queue full are dropped.
    pub fn dispatch(&self, record: LogRecord) {
        match self.queue.try_send(record) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(record)) => {
                debug!(level = %record.level, "Dispatch queue full, dropping record");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("Dispatch worker has stopped, discarding record");
            }
        }
    }
}

/// Start deliveries in queue order without waiting for earlier ones to finish
async fn drain(
    sink: Arc<dyn LogSink>,
    mut pending: mpsc::Receiver<LogRecord>,
    max_in_flight: usize,
) {
    let mut in_flight = FuturesUnordered::new();
    loop {
        tokio::select! {
            // Completions first, so each new delivery gets polled (started)
            // before the next record is taken off the queue.
            biased;
            Some(()) = in_flight.next(), if !in_flight.is_empty() => {}
            record = pending.recv(), if in_flight.len() < max_in_flight => match record {
                Some(record) => in_flight.push(deliver(Arc::clone(&sink), record)),
                None => break,
            },
        }
    }
    while in_flight.next().await.is_some() {}
}

async fn deliver(sink: Arc<dyn LogSink>, record: LogRecord) {
    let level = record.level;
    let outcome = AssertUnwindSafe(FORWARDING.scope((), sink.forward(record)))
        .catch_unwind()
        .await;

    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!(%level, error = %e, "Sink rejected record"),
        Err(_) => debug!(%level, "Sink panicked while forwarding record"),
    }
}
