//! diagbridge - diagnostic capture bridge
//!
//! Intercepts an application's log entry points and error signals, turns the
//! arguments into one bounded, cycle-safe message per call, drops noise and
//! duplicate bursts, and forwards the result to a sink without ever waiting
//! on it.
//!
//! ```no_run
//! use std::sync::Arc;
//! use diagbridge::{Bridge, Config, Console, HttpSink, Value};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = Config::load()?;
//! let sink = HttpSink::new("http://127.0.0.1:7777/log", config.sink.timeout())?;
//! let bridge = Bridge::new(config, Arc::new(sink))?;
//!
//! let console = Console::stdio();
//! bridge.install(&console);
//! console.warn(&[Value::from("cache miss rate"), Value::from(0.42)]);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod dedup;
pub mod format;
pub mod intercept;
pub mod logging;
pub mod pipeline;
pub mod record;
pub mod serializer;
pub mod sink;
pub mod value;

pub use config::Config;
pub use intercept::{Bridge, BridgeError, BridgeLayer, Console, EntryPoint, ErrorEvent, Host};
pub use pipeline::Disposition;
pub use record::{LogLevel, LogRecord};
pub use sink::{ChannelSink, HttpSink, LogSink, SinkError};
pub use value::{Array, ErrorValue, EventValue, Object, Value};
