//! Runtime values and the introspection capability set
//!
//! The serializer never looks at a concrete value type. It walks anything that
//! implements [`Reflect`]: a way to classify a value, enumerate its fields and
//! ask for its identity. Two implementations ship with the crate:
//!
//! - [`Value`], a dynamic graph of shared, mutable (and therefore possibly
//!   cyclic) nodes, which is what hosts pass through their log entry points
//! - `serde_json::Value`, for plain trees of already-serialized data

mod host;
mod json;

pub use host::{Array, ErrorValue, EventValue, Object, Value};

/// Classification of a value, as seen by the serializer
#[derive(Debug, Clone)]
pub enum Kind<V> {
    /// `null` or an absent value
    Null,
    /// Booleans, numbers and strings, already in JSON form
    Primitive(serde_json::Value),
    /// Integer that does not fit a JSON number without precision loss
    BigInt(i128),
    /// Something callable, with its name if it has one
    Callable(Option<String>),
    /// Ordered elements, see [`Reflect::elements`]
    Sequence,
    /// Error-like value; extra own properties come from [`Reflect::fields`]
    Error(ErrorParts<V>),
    /// Event-like value carrying a discriminant `type`
    Event(String),
    /// Keyed record; fields come from [`Reflect::fields`]
    Record,
}

/// The fixed part of an error-like value
#[derive(Debug, Clone)]
pub struct ErrorParts<V> {
    pub name: String,
    pub message: String,
    pub stack: Option<String>,
    pub cause: Option<V>,
}

/// Capability set the serializer needs from a value type
///
/// Children are handed out as owned values; implementations are expected to
/// be cheap handles (reference counted nodes) or small trees.
pub trait Reflect: Sized {
    /// Classify this value
    fn classify(&self) -> Kind<Self>;

    /// Stable identity of a keyed record, used for cycle detection.
    ///
    /// Values without identity (trees) are never reported as circular.
    fn identity(&self) -> Option<usize>;

    /// Elements of a [`Kind::Sequence`], in order
    fn elements(&self) -> Vec<Self>;

    /// Own fields of a record, event or error.
    ///
    /// For records this is the union of enumerable and hidden properties,
    /// each key reported once.
    fn fields(&self) -> Vec<(String, Self)>;

    /// Borrow the value as text if it is a string
    fn text(&self) -> Option<&str>;

    /// Best-effort rendering that cannot fail
    fn coarse(&self) -> String;
}
