//! Interception manager
//!
//! A [`Bridge`] owns the processing pipeline and the registry of original
//! entry points. [`Bridge::install`] wraps a host's log entry points and
//! registers its error signals; [`Bridge::reset`] puts the originals back.
//!
//! Wrapped entry points always call the original first, so host-visible
//! behavior never changes.

mod host;
mod layer;
mod signals;

pub use host::{
    render_args, Console, DevChannel, EntryPoint, ErrorEvent, ErrorListener, Handler, Host,
    PayloadListener,
};
pub use layer::BridgeLayer;

use std::collections::HashMap;
use std::panic;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Once, RwLock, Weak};

use thiserror::Error;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::Config;
use crate::pipeline::{Disposition, Pipeline};
use crate::record::LogLevel;
use crate::sink::{self, Dispatcher, HttpSink, LogSink, SinkError};
use crate::value::{ErrorValue, Reflect, Value};

/// Errors that can occur while building a bridge
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("no tokio runtime is running to drive the sink")]
    NoRuntime,

    #[error("no sink endpoint configured")]
    NoEndpoint,

    #[error("failed to build sink: {0}")]
    Sink(#[from] SinkError),
}

/// Handle to one diagnostic capture bridge; clones share state
#[derive(Clone)]
pub struct Bridge {
    inner: Arc<Inner>,
}

struct Inner {
    config: Config,
    pipeline: Pipeline,
    runtime: Handle,
    installed: AtomicBool,
    /// Bumped by every reset; listeners from older installs go quiet
    generation: AtomicU64,
    originals: RwLock<HashMap<EntryPoint, Handler>>,
    panic_hook: Once,
}

impl Inner {
    fn is_live(&self, generation: u64) -> bool {
        self.installed.load(Ordering::SeqCst) && self.generation.load(Ordering::SeqCst) == generation
    }

    fn submit_error(&self, event: &ErrorEvent) -> Disposition {
        self.pipeline
            .submit(LogLevel::Error, &signals::error_payload(event))
    }
}

impl Bridge {
    /// Create a bridge forwarding to `sink`, driven by the current tokio runtime
    pub fn new(config: Config, sink: Arc<dyn LogSink>) -> Result<Self, BridgeError> {
        let runtime = Handle::try_current().map_err(|_| BridgeError::NoRuntime)?;
        Ok(Self::with_runtime(config, sink, &runtime))
    }

    /// Create a bridge forwarding to `sink`, driven by `runtime`
    pub fn with_runtime(config: Config, sink: Arc<dyn LogSink>, runtime: &Handle) -> Self {
        let dispatcher = Dispatcher::spawn(sink, runtime, &config.sink);
        let pipeline = Pipeline::new(&config, dispatcher);
        Self {
            inner: Arc::new(Inner {
                config,
                pipeline,
                runtime: runtime.clone(),
                installed: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                originals: RwLock::new(HashMap::new()),
                panic_hook: Once::new(),
            }),
        }
    }

    /// Create a bridge that POSTs to the endpoint named in `config.sink`
    pub fn from_config(config: Config) -> Result<Self, BridgeError> {
        let sink = HttpSink::from_config(&config.sink)?.ok_or(BridgeError::NoEndpoint)?;
        Self::new(config, Arc::new(sink))
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn is_installed(&self) -> bool {
        self.inner.installed.load(Ordering::SeqCst)
    }

    /// Wrap the host's entry points and register its error signals
    ///
    /// Does nothing when the host is unavailable or the bridge is already
    /// installed. Returns whether this call installed the bridge.
    pub fn install(&self, host: &dyn Host) -> bool {
        if !host.is_available() {
            debug!("Host unavailable, skipping install");
            return false;
        }
        if self
            .inner
            .installed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }

        let generation = self.inner.generation.load(Ordering::SeqCst);
        let wrapped = self.wrap_entry_points(host, generation);
        self.listen_for_errors(host, generation);
        if let Some(channel) = host.dev_channel() {
            self.listen_on_dev_channel(channel, generation);
        }
        if self.inner.config.capture_panics {
            self.inner.panic_hook.call_once(|| self.chain_panic_hook());
        }

        info!(entry_points = wrapped, "Diagnostic bridge installed");
        true
    }

    /// Restore the original entry points and forget all state
    ///
    /// Signal listeners stay registered with the host but stop forwarding.
    pub fn reset(&self, host: &dyn Host) {
        let originals: Vec<(EntryPoint, Handler)> = self
            .inner
            .originals
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .drain()
            .collect();
        for (entry, original) in originals {
            host.set_entry_point(entry, original);
        }

        self.inner.pipeline.clear_dedup();
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.inner.installed.store(false, Ordering::SeqCst);
        debug!("Diagnostic bridge reset");
    }

    /// The implementation an entry point had before install
    pub fn original(&self, entry: EntryPoint) -> Option<Handler> {
        self.inner
            .originals
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&entry)
            .cloned()
    }

    /// Run `args` through the pipeline directly
    pub fn submit<V: Reflect>(&self, level: LogLevel, args: &[V]) -> Disposition {
        self.inner.pipeline.submit(level, args)
    }

    /// Report an uncaught error as the host's error signal would
    pub fn report_error(&self, event: &ErrorEvent) -> Disposition {
        self.inner.submit_error(event)
    }

    /// Report an unhandled rejection as the host's rejection signal would
    pub fn report_rejection(&self, reason: &Value) -> Disposition {
        self.inner
            .pipeline
            .submit(LogLevel::Error, &signals::rejection_payload(reason))
    }

    /// Report the outcome of a task nobody else awaits
    ///
    /// An `Err` result is reported as an unhandled rejection. A panicked task
    /// is reported too, unless the panic hook already captured it.
    /// Cancelled tasks are ignored.
    pub fn watch_task<T, E>(&self, handle: JoinHandle<Result<T, E>>)
    where
        T: Send + 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        let bridge = self.clone();
        let _detached = self.inner.runtime.spawn(async move {
            let reason = match handle.await {
                Ok(Ok(_)) => return,
                Ok(Err(e)) => Value::Error(ErrorValue::from_std(&e)),
                Err(e) if e.is_panic() && !bridge.inner.config.capture_panics => {
                    Value::Error(ErrorValue::new("JoinError", e.to_string()))
                }
                Err(_) => return,
            };
            bridge.report_rejection(&reason);
        });
    }

    /// A `tracing` layer forwarding events through this bridge
    pub fn layer(&self) -> BridgeLayer {
        BridgeLayer::new(self.clone())
    }

    fn weak(&self) -> Weak<Inner> {
        Arc::downgrade(&self.inner)
    }

    fn wrap_entry_points(&self, host: &dyn Host, generation: u64) -> usize {
        let mut wrapped = 0;
        for entry in EntryPoint::ALL {
            let Some(original) = host.entry_point(entry) else {
                continue;
            };
            // Registry lock is held only for the insert, never across host calls
            self.inner
                .originals
                .write()
                .unwrap_or_else(|e| e.into_inner())
                .insert(entry, Arc::clone(&original));

            let weak = self.weak();
            let level = entry.level();
            host.set_entry_point(
                entry,
                Arc::new(move |args: &[Value]| {
                    original(args);
                    if let Some(inner) = weak.upgrade().filter(|inner| inner.is_live(generation)) {
                        inner.pipeline.submit(level, args);
                    }
                }),
            );
            wrapped += 1;
        }
        wrapped
    }

    fn listen_for_errors(&self, host: &dyn Host, generation: u64) {
        let weak = self.weak();
        host.add_error_listener(Arc::new(move |event: &ErrorEvent| {
            if let Some(inner) = weak.upgrade().filter(|inner| inner.is_live(generation)) {
                inner.submit_error(event);
            }
        }));

        let weak = self.weak();
        host.add_rejection_listener(Arc::new(move |reason: &Value| {
            if let Some(inner) = weak.upgrade().filter(|inner| inner.is_live(generation)) {
                inner
                    .pipeline
                    .submit(LogLevel::Error, &signals::rejection_payload(reason));
            }
        }));
    }

    fn listen_on_dev_channel(&self, channel: &dyn DevChannel, generation: u64) {
        let weak = self.weak();
        let label = self.inner.config.tool_diagnostics.event_label.clone();
        channel.on_error(Arc::new(move |payload: &Value| {
            if let Some(inner) = weak.upgrade().filter(|inner| inner.is_live(generation)) {
                inner
                    .pipeline
                    .submit(LogLevel::Error, &signals::dev_error_payload(&label, payload));
            }
        }));
    }

    /// Install a panic hook that reports panics, then defers to the previous hook
    ///
    /// Chained once per bridge; it reports only while the bridge is installed.
    fn chain_panic_hook(&self) {
        let weak = self.weak();
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            previous(info);

            // A panicking sink must not report itself
            if sink::is_forwarding() {
                return;
            }
            let Some(inner) = weak
                .upgrade()
                .filter(|inner| inner.installed.load(Ordering::SeqCst))
            else {
                return;
            };

            let message = signals::panic_message(info.payload());
            let location = info
                .location()
                .map(|l| (l.file().to_string(), l.line(), l.column()));
            inner.submit_error(&signals::panic_event(message, location));
        }));
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("installed", &self.is_installed())
            .field("generation", &self.inner.generation.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}
