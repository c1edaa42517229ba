//! `tracing` entry point
//!
//! Events recorded through `tracing` are submitted like calls to a host entry
//! point: the message first, then the structured fields as one object.

use serde_json::{Map, Value as Json};
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::{layer::Context, registry::LookupSpan, Layer};

use super::Bridge;
use crate::record::LogLevel;
use crate::sink;

/// Events from this crate never re-enter the bridge
const OWN_TARGET: &str = env!("CARGO_CRATE_NAME");

/// A `tracing` layer that forwards events through a [`Bridge`]
#[derive(Clone)]
pub struct BridgeLayer {
    bridge: Bridge,
}

impl BridgeLayer {
    pub fn new(bridge: Bridge) -> Self {
        Self { bridge }
    }
}

impl<S> Layer<S> for BridgeLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        // Whatever a sink or its transport logs while delivering stays out
        if is_own_target(metadata.target()) || sink::is_forwarding() {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        let level = LogLevel::from(*metadata.level());
        self.bridge.submit(level, &visitor.into_args());
    }
}

fn is_own_target(target: &str) -> bool {
    target
        .strip_prefix(OWN_TARGET)
        .map_or(false, |rest| rest.is_empty() || rest.starts_with("::"))
}

/// Collects the `message` field and every other field of an event
#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: Map<String, Json>,
}

impl MessageVisitor {
    fn into_args(self) -> Vec<Json> {
        let mut args = Vec::with_capacity(2);
        if !self.message.is_empty() {
            args.push(Json::String(self.message));
        }
        if !self.fields.is_empty() {
            args.push(Json::Object(self.fields));
        }
        args
    }

    fn insert(&mut self, field: &Field, value: Json) {
        self.fields.insert(field.name().to_string(), value);
    }
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        } else {
            self.insert(field, Json::String(format!("{:?}", value)));
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.insert(field, Json::String(value.to_string()));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, Json::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, Json::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field, Json::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, Json::Bool(value));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.insert(field, Json::String(value.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::record::LogRecord;
    use crate::sink::{ChannelSink, LogSink, SinkError};
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::time::timeout;
    use tracing_subscriber::layer::SubscriberExt;

    #[test]
    fn test_own_target_detection() {
        assert!(is_own_target("diagbridge"));
        assert!(is_own_target("diagbridge::sink"));
        assert!(!is_own_target("diagbridge_app"));
        assert!(!is_own_target("my_app::net"));
    }

    #[tokio::test]
    async fn test_events_are_forwarded_with_fields() {
        let (sink, mut rx) = ChannelSink::with_buffer(8);
        let bridge = Bridge::new(Config::default(), Arc::new(sink)).unwrap();
        let subscriber = tracing_subscriber::registry().with(bridge.layer());

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(target: "my_app::net", peer = "10.0.0.2", attempt = 3, "connection reset");
            tracing::info!(target: "diagbridge::pipeline", "internal chatter");
            tracing::error!(target: "my_app", "disk full");
        });

        let first = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        assert_eq!(first.level, LogLevel::Warn);
        assert_eq!(first.message, r#"connection reset {"peer":"10.0.0.2","attempt":3}"#);

        let second = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        assert_eq!(second.level, LogLevel::Error);
        assert_eq!(second.message, "disk full");
    }

    /// Sink whose transport complains through `tracing` on every delivery
    #[derive(Default)]
    struct ComplainingSink {
        delivered: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LogSink for ComplainingSink {
        async fn forward(&self, record: LogRecord) -> Result<(), SinkError> {
            let len = record.message.len();
            self.delivered.lock().unwrap().push(record.message);
            tracing::warn!(target: "transport", "delivery failed for {}", len);
            Err(SinkError::Status(503))
        }
    }

    #[tokio::test]
    async fn test_events_from_inside_the_sink_are_not_forwarded() {
        let sink = Arc::new(ComplainingSink::default());
        let bridge = Bridge::new(Config::default(), sink.clone()).unwrap();
        let subscriber = tracing_subscriber::registry().with(bridge.layer());
        let _guard = tracing::subscriber::set_default(subscriber);

        tracing::error!(target: "my_app", "hello");
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(*sink.delivered.lock().unwrap(), vec!["hello"]);
    }
}
