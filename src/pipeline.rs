//! Format → filter → dispatch
//!
//! Every intercepted call ends up in [`Pipeline::submit`], which runs
//! synchronously on the caller's thread up to the point where the record is
//! queued for the sink.

use std::cell::Cell;
use std::sync::{Mutex, MutexGuard};

use tracing::trace;

use crate::config::Config;
use crate::dedup::{DedupCache, NoiseFilter};
use crate::format::Formatter;
use crate::record::{LogLevel, LogRecord};
use crate::sink::Dispatcher;
use crate::value::Reflect;

thread_local! {
    static SUBMITTING: Cell<bool> = const { Cell::new(false) };
}

/// What happened to a submitted call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Queued for the sink
    Forwarded,
    /// All arguments stringified to nothing
    Empty,
    /// Matched the noise denylist
    Ignored,
    /// Identical record accepted inside the dedup window
    Duplicate,
    /// Submitted from inside another submission on the same thread
    Reentrant,
}

/// The bridge's processing chain
#[derive(Debug)]
pub struct Pipeline {
    formatter: Formatter,
    noise: NoiseFilter,
    dedup: Mutex<DedupCache>,
    dispatcher: Dispatcher,
}

impl Pipeline {
    pub fn new(config: &Config, dispatcher: Dispatcher) -> Self {
        Self {
            formatter: Formatter::new(config),
            noise: NoiseFilter::new(&config.ignore_rules),
            dedup: Mutex::new(DedupCache::new(config.dedup_window())),
            dispatcher,
        }
    }

    /// Format `args` and forward the result unless it is empty, noisy or a duplicate
    pub fn submit<V: Reflect>(&self, level: LogLevel, args: &[V]) -> Disposition {
        let Some(_guard) = ReentryGuard::enter() else {
            return Disposition::Reentrant;
        };

        let message = self.formatter.format(args);
        let disposition = if message.is_empty() {
            Disposition::Empty
        } else if self.noise.is_ignored(&message) {
            Disposition::Ignored
        } else if !self.dedup().should_forward(level, &message) {
            Disposition::Duplicate
        } else {
            self.dispatcher.dispatch(LogRecord::new(level, message));
            Disposition::Forwarded
        };

        trace!(%level, ?disposition, "Processed log call");
        disposition
    }

    /// Forget every dedup entry
    pub fn clear_dedup(&self) {
        self.dedup().clear();
    }

    fn dedup(&self) -> MutexGuard<'_, DedupCache> {
        self.dedup.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Marks the current thread as inside `submit` for the guard's lifetime
struct ReentryGuard;

impl ReentryGuard {
    fn enter() -> Option<Self> {
        SUBMITTING.with(|flag| {
            if flag.get() {
                None
            } else {
                flag.set(true);
                Some(ReentryGuard)
            }
        })
    }
}

impl Drop for ReentryGuard {
    fn drop(&mut self) {
        SUBMITTING.with(|flag| flag.set(false));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::ChannelSink;
    use crate::value::{Kind, Object, Value};
    use std::sync::Arc;
    use tokio::runtime::Handle;

    fn pipeline() -> (Pipeline, crate::sink::RecordReceiver) {
        let (sink, rx) = ChannelSink::with_buffer(32);
        let config = Config::default();
        let dispatcher = Dispatcher::spawn(Arc::new(sink), &Handle::current(), &config.sink);
        (Pipeline::new(&config, dispatcher), rx)
    }

    #[tokio::test]
    async fn test_forwarded_record_reaches_sink() {
        let (pipeline, mut rx) = pipeline();
        let object = Object::new().with("a", 1);
        object.set("self", object.clone());

        let disposition = pipeline.submit(LogLevel::Info, &[Value::Object(object)]);
        assert_eq!(disposition, Disposition::Forwarded);

        let record = rx.recv().await.unwrap();
        assert_eq!(record.level, LogLevel::Info);
        assert_eq!(record.message, r#"{"a":1,"self":"[Circular]"}"#);
    }

    #[tokio::test]
    async fn test_duplicates_and_noise_are_dropped() {
        let (pipeline, mut rx) = pipeline();

        assert_eq!(
            pipeline.submit(LogLevel::Warn, &[Value::from("retrying connection")]),
            Disposition::Forwarded
        );
        assert_eq!(
            pipeline.submit(LogLevel::Warn, &[Value::from("retrying connection")]),
            Disposition::Duplicate
        );
        assert_eq!(
            pipeline.submit(
                LogLevel::Error,
                &[Value::from("[vite] failed to reload /src/main.tsx (see errors above)")]
            ),
            Disposition::Ignored
        );
        let nothing: [Value; 0] = [];
        assert_eq!(pipeline.submit(LogLevel::Info, &nothing), Disposition::Empty);

        drop(pipeline);
        let first = rx.recv().await.unwrap();
        assert_eq!(first.message, "retrying connection");
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_clear_dedup() {
        let (pipeline, _rx) = pipeline();
        let args = [Value::from("again")];
        pipeline.submit(LogLevel::Info, &args);
        pipeline.clear_dedup();
        assert_eq!(pipeline.submit(LogLevel::Info, &args), Disposition::Forwarded);
    }

    /// A value whose introspection logs through the pipeline it is being formatted by
    struct Chatty<'a>(&'a Pipeline, std::cell::Cell<Option<Disposition>>);

    impl Reflect for Chatty<'_> {
        fn classify(&self) -> Kind<Self> {
            let nested = self.0.submit(LogLevel::Debug, &[Value::from("from inside")]);
            self.1.set(Some(nested));
            Kind::Primitive(serde_json::Value::from(7))
        }
        fn identity(&self) -> Option<usize> {
            None
        }
        fn elements(&self) -> Vec<Self> {
            Vec::new()
        }
        fn fields(&self) -> Vec<(String, Self)> {
            Vec::new()
        }
        fn text(&self) -> Option<&str> {
            None
        }
        fn coarse(&self) -> String {
            "7".to_string()
        }
    }

    #[tokio::test]
    async fn test_reentrant_submission_is_dropped() {
        let (pipeline, _rx) = pipeline();
        let chatty = Chatty(&pipeline, std::cell::Cell::new(None));

        assert_eq!(
            pipeline.submit(LogLevel::Info, std::slice::from_ref(&chatty)),
            Disposition::Forwarded
        );
        assert_eq!(chatty.1.get(), Some(Disposition::Reentrant));
    }
}
