//! Host capability set
//!
//! The bridge never patches globals. A host hands it the entry points and
//! signal registrations it wants intercepted through the [`Host`] trait;
//! [`Console`] is a ready-made host for applications that log through it.

use std::collections::HashMap;
use std::fmt;
use std::io::Write;
use std::sync::{Arc, RwLock};

use chrono::Utc;

use crate::record::LogLevel;
use crate::value::Value;

/// A native logging entry point
pub type Handler = Arc<dyn Fn(&[Value]) + Send + Sync>;

/// Listener for uncaught errors
pub type ErrorListener = Arc<dyn Fn(&ErrorEvent) + Send + Sync>;

/// Listener for unhandled rejections and dev-channel errors
pub type PayloadListener = Arc<dyn Fn(&Value) + Send + Sync>;

/// The fixed set of intercepted entry points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryPoint {
    Debug,
    Info,
    Warn,
    Error,
    Log,
}

impl EntryPoint {
    pub const ALL: [EntryPoint; 5] = [
        EntryPoint::Debug,
        EntryPoint::Info,
        EntryPoint::Warn,
        EntryPoint::Error,
        EntryPoint::Log,
    ];

    /// Level records from this entry point are forwarded at
    pub fn level(self) -> LogLevel {
        match self {
            EntryPoint::Debug => LogLevel::Debug,
            EntryPoint::Info | EntryPoint::Log => LogLevel::Info,
            EntryPoint::Warn => LogLevel::Warn,
            EntryPoint::Error => LogLevel::Error,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EntryPoint::Debug => "debug",
            EntryPoint::Info => "info",
            EntryPoint::Warn => "warn",
            EntryPoint::Error => "error",
            EntryPoint::Log => "log",
        }
    }

    fn writes_to_stderr(self) -> bool {
        matches!(self, EntryPoint::Warn | EntryPoint::Error)
    }
}

impl fmt::Display for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An uncaught error, as delivered to error listeners
#[derive(Debug, Clone)]
pub struct ErrorEvent {
    /// Error message; may be empty
    pub message: String,
    /// Source file the error was raised in
    pub filename: Option<String>,
    pub lineno: u32,
    pub colno: u32,
    /// The error value itself, if the host has one
    pub error: Option<Value>,
    /// Event discriminant (`"error"` for uncaught errors)
    pub event_type: String,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

impl ErrorEvent {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            filename: None,
            lineno: 0,
            colno: 0,
            error: None,
            event_type: "error".to_string(),
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    /// Set the source location
    pub fn with_location(mut self, filename: impl Into<String>, lineno: u32, colno: u32) -> Self {
        self.filename = Some(filename.into());
        self.lineno = lineno;
        self.colno = colno;
        self
    }

    /// Attach the error value
    pub fn with_error(mut self, error: impl Into<Value>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// What the bridge needs from the environment it instruments
pub trait Host {
    /// Whether the host has anything to intercept at all
    fn is_available(&self) -> bool {
        true
    }

    /// Current implementation of an entry point, if the host has it
    fn entry_point(&self, entry: EntryPoint) -> Option<Handler>;

    /// Replace an entry point's implementation
    fn set_entry_point(&self, entry: EntryPoint, handler: Handler);

    fn add_error_listener(&self, listener: ErrorListener);

    fn add_rejection_listener(&self, listener: PayloadListener);

    /// Development-time error channel (hot reload), when present
    fn dev_channel(&self) -> Option<&dyn DevChannel> {
        None
    }
}

/// Development-time error channel
pub trait DevChannel {
    fn on_error(&self, listener: PayloadListener);
}

#[derive(Default)]
struct DevErrors {
    listeners: RwLock<Vec<PayloadListener>>,
}

impl DevChannel for DevErrors {
    fn on_error(&self, listener: PayloadListener) {
        self.listeners
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(listener);
    }
}

/// Stock host: a console with stdout/stderr entry points and signal listeners
#[derive(Default)]
pub struct Console {
    handlers: RwLock<HashMap<EntryPoint, Handler>>,
    error_listeners: RwLock<Vec<ErrorListener>>,
    rejection_listeners: RwLock<Vec<PayloadListener>>,
    dev: Option<DevErrors>,
}

impl Console {
    /// Console whose entry points print to stdout (`debug`, `info`, `log`)
    /// or stderr (`warn`, `error`)
    pub fn stdio() -> Self {
        let console = Self::default();
        for entry in EntryPoint::ALL {
            console.set_entry_point(entry, stdio_handler(entry));
        }
        console
    }

    /// Console without any entry points; add them with [`Console::with_handler`]
    pub fn bare() -> Self {
        Self::default()
    }

    pub fn with_handler(self, entry: EntryPoint, handler: Handler) -> Self {
        self.set_entry_point(entry, handler);
        self
    }

    /// Give the console a development-time error channel
    pub fn with_dev_channel(mut self) -> Self {
        self.dev = Some(DevErrors::default());
        self
    }

    /// Invoke an entry point; missing entry points do nothing
    pub fn call(&self, entry: EntryPoint, args: &[Value]) {
        // Clone out of the lock so the handler may re-enter the console
        if let Some(handler) = self.entry_point(entry) {
            handler(args);
        }
    }

    pub fn debug(&self, args: &[Value]) {
        self.call(EntryPoint::Debug, args);
    }

    pub fn info(&self, args: &[Value]) {
        self.call(EntryPoint::Info, args);
    }

    pub fn warn(&self, args: &[Value]) {
        self.call(EntryPoint::Warn, args);
    }

    pub fn error(&self, args: &[Value]) {
        self.call(EntryPoint::Error, args);
    }

    pub fn log(&self, args: &[Value]) {
        self.call(EntryPoint::Log, args);
    }

    /// Deliver an uncaught error to every error listener
    pub fn raise_error(&self, event: &ErrorEvent) {
        let listeners = self
            .error_listeners
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        for listener in listeners {
            listener(event);
        }
    }

    /// Deliver an unhandled rejection to every rejection listener
    pub fn reject(&self, reason: &Value) {
        let listeners = self
            .rejection_listeners
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        for listener in listeners {
            listener(reason);
        }
    }

    /// Emit an error on the dev channel, if the console has one
    pub fn emit_dev_error(&self, payload: &Value) {
        let Some(dev) = &self.dev else {
            return;
        };
        let listeners = dev
            .listeners
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        for listener in listeners {
            listener(payload);
        }
    }

    /// Number of registered error listeners
    pub fn error_listener_count(&self) -> usize {
        self.error_listeners
            .read()
            .map(|l| l.len())
            .unwrap_or(0)
    }

    /// Number of registered rejection listeners
    pub fn rejection_listener_count(&self) -> usize {
        self.rejection_listeners
            .read()
            .map(|l| l.len())
            .unwrap_or(0)
    }
}

impl Host for Console {
    fn entry_point(&self, entry: EntryPoint) -> Option<Handler> {
        self.handlers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&entry)
            .cloned()
    }

    fn set_entry_point(&self, entry: EntryPoint, handler: Handler) {
        self.handlers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(entry, handler);
    }

    fn add_error_listener(&self, listener: ErrorListener) {
        self.error_listeners
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(listener);
    }

    fn add_rejection_listener(&self, listener: PayloadListener) {
        self.rejection_listeners
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(listener);
    }

    fn dev_channel(&self) -> Option<&dyn DevChannel> {
        self.dev.as_ref().map(|dev| dev as &dyn DevChannel)
    }
}

/// Join arguments the way a console prints them
pub fn render_args(args: &[Value]) -> String {
    args.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

fn stdio_handler(entry: EntryPoint) -> Handler {
    Arc::new(move |args: &[Value]| {
        let line = render_args(args);
        // A closed stdout/stderr must not take the host down
        if entry.writes_to_stderr() {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
        } else {
            let _ = writeln!(std::io::stdout().lock(), "{}", line);
        }
    })
}
