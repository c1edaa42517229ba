//! Payload assembly for error signals
//!
//! Uncaught errors, unhandled rejections, dev-channel errors and panics all
//! reach the pipeline at error level as an argument list built here.

use std::any::Any;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::thread;

use super::host::ErrorEvent;
use crate::value::{ErrorValue, Object, Value};

const UNCAUGHT_FALLBACK: &str = "Unhandled window error";
const REJECTION_LABEL: &str = "Unhandled promise rejection";

/// `[message, "at file:line:col", error, {type, timeStamp}]`, without the
/// parts that are missing
pub(crate) fn error_payload(event: &ErrorEvent) -> Vec<Value> {
    let message = if event.message.is_empty() {
        UNCAUGHT_FALLBACK.to_string()
    } else {
        event.message.clone()
    };
    let location = event
        .filename
        .as_deref()
        .filter(|f| !f.is_empty())
        .map(|f| format!("at {}:{}:{}", f, event.lineno, event.colno));
    let metadata = Object::new()
        .with("type", event.event_type.as_str())
        .with("timeStamp", event.timestamp);

    [
        Value::from(message),
        Value::from(location),
        event.error.clone().unwrap_or_default(),
        Value::Object(metadata),
    ]
    .into_iter()
    .filter(Value::is_truthy)
    .collect()
}

pub(crate) fn rejection_payload(reason: &Value) -> Vec<Value> {
    vec![Value::from(REJECTION_LABEL), reason.clone()]
}

/// Dev-channel payloads wrap the actual error in an `err` field
pub(crate) fn dev_error_payload(label: &str, payload: &Value) -> Vec<Value> {
    let err = payload.get("err").unwrap_or_else(|| payload.clone());
    vec![Value::from(label), err]
}

/// Text of a panic payload (`&str` or `String`), or a placeholder
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Box<dyn Any>".to_string()
    }
}

/// Describe a panic as an uncaught error event
pub(crate) fn panic_event(message: String, location: Option<(String, u32, u32)>) -> ErrorEvent {
    let thread = thread::current();
    let mut error = ErrorValue::new("panic", message.clone())
        .with("thread", thread.name().unwrap_or("<unnamed>"));

    let backtrace = Backtrace::capture();
    if backtrace.status() == BacktraceStatus::Captured {
        error = error.with_stack(backtrace.to_string());
    }

    let event = ErrorEvent::new(message).with_error(error);
    match location {
        Some((file, line, col)) => event.with_location(file, line, col),
        None => event,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::Formatter;
    use crate::config::Config;

    fn render(args: &[Value]) -> String {
        Formatter::new(&Config::default()).format(args)
    }

    #[test]
    fn test_uncaught_error_payload() {
        let mut event = ErrorEvent::new("x is not defined")
            .with_location("app.js", 10, 5)
            .with_error(ErrorValue::new("ReferenceError", "x is not defined"));
        event.timestamp = 1234;

        let message = render(&error_payload(&event));
        assert!(message.starts_with("x is not defined at app.js:10:5 "));
        assert!(message.contains(r#""name":"ReferenceError""#));
        assert!(message.contains(r#"{"type":"error","timeStamp":1234}"#));
        // The error value carries a message, so it gets a diagnostic block too
        assert!(message.ends_with("\n[vite:error] x is not defined"));
    }

    #[test]
    fn test_empty_error_event_uses_fallback() {
        let mut event = ErrorEvent::new("");
        event.timestamp = 1;

        let payload = error_payload(&event);
        assert_eq!(payload.len(), 2);
        assert_eq!(
            render(&payload),
            r#"Unhandled window error {"type":"error","timeStamp":1}"#
        );
    }

    #[test]
    fn test_rejection_payload() {
        let payload = rejection_payload(&Value::from("timeout"));
        assert_eq!(render(&payload), "Unhandled promise rejection timeout");
    }

    #[test]
    fn test_dev_payload_unwraps_err() {
        let inner = Object::new().with("message", "Transform failed");
        let wrapped = Value::Object(Object::new().with("err", inner.clone()));

        let payload = dev_error_payload("vite:error", &wrapped);
        assert_eq!(payload.len(), 2);
        assert!(matches!(&payload[1], Value::Object(o) if o.ptr_eq(&inner)));

        let bare = dev_error_payload("vite:error", &Value::from("raw"));
        assert_eq!(render(&bare), "vite:error raw");
    }

    #[test]
    fn test_panic_message_downcasts() {
        let s: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(s.as_ref()), "static");

        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(owned.as_ref()), "owned");

        let other: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(other.as_ref()), "Box<dyn Any>");
    }

    #[test]
    fn test_panic_event_carries_location_and_thread() {
        let event = panic_event("index out of bounds".into(), Some(("src/lib.rs".into(), 4, 9)));
        assert_eq!(event.message, "index out of bounds");
        assert_eq!(event.filename.as_deref(), Some("src/lib.rs"));

        let Some(Value::Error(error)) = &event.error else {
            panic!("expected an error value");
        };
        assert_eq!(error.name(), "panic");
        assert!(render(&[Value::Error(error.clone())]).contains(r#""thread":"#));
    }
}
