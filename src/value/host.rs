//! Dynamic host values
//!
//! Arrays, objects, errors and events are reference counted handles, so the
//! same node can be reachable from several places, including itself.

use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;

use super::{ErrorParts, Kind, Reflect};

/// A value passed through a host log entry point
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Integer(i64),
    BigInt(i128),
    String(String),
    /// Callable, with its name if known
    Function(Option<String>),
    Array(Array),
    Object(Object),
    Error(ErrorValue),
    Event(EventValue),
}

impl Value {
    /// Convert any serializable value into a host value tree
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> serde_json::Result<Self> {
        serde_json::to_value(value).map(Value::from)
    }

    /// Whether this value counts as "present" when assembling payloads
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Integer(i) => *i != 0,
            Value::BigInt(i) => *i != 0,
            Value::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    /// Look up a property on an object
    pub fn get(&self, key: &str) -> Option<Value> {
        match self {
            Value::Object(object) => object.get(key),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", n),
            Value::Integer(i) => write!(f, "{}", i),
            Value::BigInt(i) => write!(f, "{}", i),
            Value::String(s) => f.write_str(s),
            Value::Function(name) => {
                write!(f, "[Function {}]", name.as_deref().unwrap_or("anonymous"))
            }
            Value::Array(_) => f.write_str("[object Array]"),
            Value::Object(_) => f.write_str("[object Object]"),
            Value::Error(error) => write!(f, "{}: {}", error.name(), error.message()),
            Value::Event(event) => write!(f, "[object Event {}]", event.event_type()),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{:?}", s),
            Value::Array(array) => fmt::Debug::fmt(array, f),
            Value::Object(object) => fmt::Debug::fmt(object, f),
            Value::Error(error) => fmt::Debug::fmt(error, f),
            Value::Event(event) => fmt::Debug::fmt(event, f),
            other => fmt::Display::fmt(other, f),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i64::from(i))
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Value::Integer(i64::from(i))
    }
}

impl From<i128> for Value {
    fn from(i: i128) -> Self {
        Value::BigInt(i)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<Array> for Value {
    fn from(array: Array) -> Self {
        Value::Array(array)
    }
}

impl From<Object> for Value {
    fn from(object: Object) -> Self {
        Value::Object(object)
    }
}

impl From<ErrorValue> for Value {
    fn from(error: ErrorValue) -> Self {
        Value::Error(error)
    }
}

impl From<EventValue> for Value {
    fn from(event: EventValue) -> Self {
        Value::Event(event)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Undefined)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => match n.as_u64() {
                    Some(u) => Value::BigInt(i128::from(u)),
                    None => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
                },
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                let object = Object::new();
                for (key, value) in map {
                    object.set(key, Value::from(value));
                }
                Value::Object(object)
            }
        }
    }
}

impl From<&(dyn std::error::Error + 'static)> for Value {
    fn from(error: &(dyn std::error::Error + 'static)) -> Self {
        Value::Error(ErrorValue::from_std(error))
    }
}

// Poisoned locks still hold usable data; a panic elsewhere must not make a
// value unreadable to the serializer.
fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

/// Shared, growable sequence
#[derive(Clone, Default)]
pub struct Array(Arc<RwLock<Vec<Value>>>);

impl Array {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an element
    pub fn push(&self, value: impl Into<Value>) {
        write(&self.0).push(value.into());
    }

    /// Snapshot of the current elements
    pub fn items(&self) -> Vec<Value> {
        read(&self.0).clone()
    }

    pub fn len(&self) -> usize {
        read(&self.0).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FromIterator<Value> for Array {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Array(Arc::new(RwLock::new(iter.into_iter().collect())))
    }
}

impl fmt::Debug for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Array({:p}, len={})", Arc::as_ptr(&self.0), self.len())
    }
}

#[derive(Clone)]
struct Property {
    key: String,
    value: Value,
    enumerable: bool,
}

/// Shared keyed record with enumerable and hidden properties
#[derive(Clone, Default)]
pub struct Object(Arc<RwLock<Vec<Property>>>);

impl Object {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`Object::set`]
    pub fn with(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    /// Set an enumerable property, replacing any existing value for the key
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.define(key.into(), value.into(), true);
    }

    /// Set a hidden (non-enumerable) property
    pub fn set_hidden(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.define(key.into(), value.into(), false);
    }

    fn define(&self, key: String, value: Value, enumerable: bool) {
        let mut properties = write(&self.0);
        match properties.iter_mut().find(|p| p.key == key) {
            Some(existing) => {
                existing.value = value;
                existing.enumerable = enumerable;
            }
            None => properties.push(Property {
                key,
                value,
                enumerable,
            }),
        }
    }

    /// Get a property value
    pub fn get(&self, key: &str) -> Option<Value> {
        read(&self.0)
            .iter()
            .find(|p| p.key == key)
            .map(|p| p.value.clone())
    }

    /// Enumerable keys, in insertion order
    pub fn keys(&self) -> Vec<String> {
        read(&self.0)
            .iter()
            .filter(|p| p.enumerable)
            .map(|p| p.key.clone())
            .collect()
    }

    /// Enumerable properties first, then hidden ones
    pub fn entries(&self) -> Vec<(String, Value)> {
        let properties = read(&self.0);
        let visible = properties.iter().filter(|p| p.enumerable);
        let hidden = properties.iter().filter(|p| !p.enumerable);
        visible
            .chain(hidden)
            .map(|p| (p.key.clone(), p.value.clone()))
            .collect()
    }

    /// Identity of this node
    pub fn id(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }

    /// Whether both handles point at the same node
    pub fn ptr_eq(&self, other: &Object) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Object({:#x}, keys={:?})", self.id(), self.keys())
    }
}

#[derive(Debug)]
struct ErrorData {
    name: String,
    message: String,
    stack: Option<String>,
    cause: Option<Value>,
    properties: RwLock<Vec<(String, Value)>>,
}

/// Error-like value
#[derive(Clone)]
pub struct ErrorValue(Arc<ErrorData>);

impl ErrorValue {
    /// Create an error with the given name (e.g. `"TypeError"`) and message
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::build(name.into(), message.into(), None, None)
    }

    fn build(name: String, message: String, stack: Option<String>, cause: Option<Value>) -> Self {
        ErrorValue(Arc::new(ErrorData {
            name,
            message,
            stack,
            cause,
            properties: RwLock::new(Vec::new()),
        }))
    }

    /// Attach a stack trace
    pub fn with_stack(self, stack: impl Into<String>) -> Self {
        let data = &self.0;
        let rebuilt = Self::build(
            data.name.clone(),
            data.message.clone(),
            Some(stack.into()),
            data.cause.clone(),
        );
        *write(&rebuilt.0.properties) = read(&data.properties).clone();
        rebuilt
    }

    /// Attach a cause
    pub fn with_cause(self, cause: impl Into<Value>) -> Self {
        let data = &self.0;
        let rebuilt = Self::build(
            data.name.clone(),
            data.message.clone(),
            data.stack.clone(),
            Some(cause.into()),
        );
        *write(&rebuilt.0.properties) = read(&data.properties).clone();
        rebuilt
    }

    /// Builder form of [`ErrorValue::set`]
    pub fn with(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    /// Set a custom own property (e.g. `code` on a subclassed error)
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        let mut properties = write(&self.0.properties);
        match properties.iter_mut().find(|(k, _)| *k == key) {
            Some(existing) => existing.1 = value,
            None => properties.push((key, value)),
        }
    }

    /// Build an error value from a Rust error, following its `source()` chain
    pub fn from_std(error: &(dyn std::error::Error + 'static)) -> Self {
        let cause = error.source().map(|source| Value::Error(Self::from_std(source)));
        Self::build("Error".to_string(), error.to_string(), None, cause)
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn message(&self) -> &str {
        &self.0.message
    }

    pub fn stack(&self) -> Option<&str> {
        self.0.stack.as_deref()
    }

    pub fn cause(&self) -> Option<&Value> {
        self.0.cause.as_ref()
    }

    fn properties(&self) -> Vec<(String, Value)> {
        read(&self.0.properties).clone()
    }
}

impl fmt::Debug for ErrorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name(), self.message())
    }
}

#[derive(Debug)]
struct EventData {
    event_type: String,
    properties: Vec<(String, Value)>,
}

/// Event-like value: a `type` discriminant plus own properties
#[derive(Clone)]
pub struct EventValue(Arc<EventData>);

impl EventValue {
    pub fn new(event_type: impl Into<String>) -> Self {
        EventValue(Arc::new(EventData {
            event_type: event_type.into(),
            properties: Vec::new(),
        }))
    }

    /// Add an own property
    pub fn with(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut properties = self.0.properties.clone();
        properties.push((key.into(), value.into()));
        EventValue(Arc::new(EventData {
            event_type: self.0.event_type.clone(),
            properties,
        }))
    }

    pub fn event_type(&self) -> &str {
        &self.0.event_type
    }
}

impl fmt::Debug for EventValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Event({})", self.event_type())
    }
}

impl Reflect for Value {
    fn classify(&self) -> Kind<Self> {
        match self {
            Value::Undefined | Value::Null => Kind::Null,
            Value::Bool(b) => Kind::Primitive(serde_json::Value::Bool(*b)),
            Value::Number(n) => Kind::Primitive(
                serde_json::Number::from_f64(*n)
                    .map(serde_json::Value::Number)
                    .unwrap_or(serde_json::Value::Null),
            ),
            Value::Integer(i) => Kind::Primitive(serde_json::Value::from(*i)),
            Value::BigInt(i) => Kind::BigInt(*i),
            Value::String(s) => Kind::Primitive(serde_json::Value::String(s.clone())),
            Value::Function(name) => Kind::Callable(name.clone()),
            Value::Array(_) => Kind::Sequence,
            Value::Object(_) => Kind::Record,
            Value::Error(error) => Kind::Error(ErrorParts {
                name: error.name().to_string(),
                message: error.message().to_string(),
                stack: error.stack().map(str::to_string),
                cause: error.cause().cloned(),
            }),
            Value::Event(event) => Kind::Event(event.event_type().to_string()),
        }
    }

    fn identity(&self) -> Option<usize> {
        match self {
            Value::Object(object) => Some(object.id()),
            _ => None,
        }
    }

    fn elements(&self) -> Vec<Self> {
        match self {
            Value::Array(array) => array.items(),
            _ => Vec::new(),
        }
    }

    fn fields(&self) -> Vec<(String, Self)> {
        match self {
            Value::Object(object) => object.entries(),
            Value::Error(error) => error.properties(),
            Value::Event(event) => event.0.properties.clone(),
            _ => Vec::new(),
        }
    }

    fn text(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    fn coarse(&self) -> String {
        self.to_string()
    }
}
