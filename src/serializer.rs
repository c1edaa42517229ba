//! Bounded, cycle-safe conversion of arbitrary values into JSON
//!
//! `serialize` is total: whatever the shape of the input, it returns a
//! `serde_json::Value`. Depth overflow and revisited records collapse into
//! fixed sentinel strings instead of recursing.

use std::collections::HashSet;

use serde_json::{Map, Value as Json};

use crate::value::{Kind, Reflect};

/// Default nesting ceiling
pub const DEFAULT_MAX_DEPTH: usize = 5;

/// Returned in place of anything at or below the depth ceiling
pub const MAX_DEPTH_SENTINEL: &str = "[MaxDepth]";

/// Returned for a record that was already visited in the same call tree
pub const CIRCULAR_SENTINEL: &str = "[Circular]";

/// State of one serialization call tree
#[derive(Debug)]
pub struct SerializationContext {
    depth: usize,
    max_depth: usize,
    visited: HashSet<usize>,
}

impl SerializationContext {
    /// Fresh context starting at depth 0
    pub fn new(max_depth: usize) -> Self {
        Self {
            depth: 0,
            max_depth,
            visited: HashSet::new(),
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
        self.depth += 1;
        let out = f(self);
        self.depth -= 1;
        out
    }
}

impl Default for SerializationContext {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DEPTH)
    }
}

/// Convert `value` into a JSON-safe tree
pub fn serialize<V: Reflect>(value: &V, ctx: &mut SerializationContext) -> Json {
    let kind = value.classify();
    if matches!(kind, Kind::Null) {
        return Json::Null;
    }
    if ctx.depth >= ctx.max_depth {
        return Json::String(MAX_DEPTH_SENTINEL.to_string());
    }

    match kind {
        Kind::Null => Json::Null,
        Kind::Primitive(json) => json,
        Kind::BigInt(n) => Json::String(format!("{}n", n)),
        Kind::Callable(name) => Json::String(format!(
            "[Function {}]",
            name.as_deref().filter(|n| !n.is_empty()).unwrap_or("anonymous")
        )),
        Kind::Error(parts) => {
            let mut out = Map::new();
            out.insert("name".to_string(), Json::String(parts.name));
            out.insert("message".to_string(), Json::String(parts.message));
            if let Some(stack) = parts.stack {
                out.insert("stack".to_string(), Json::String(stack));
            }
            if let Some(cause) = parts.cause {
                let cause = ctx.nested(|ctx| serialize(&cause, ctx));
                out.insert("cause".to_string(), cause);
            }
            serialize_fields(value, &mut out, ctx);
            Json::Object(out)
        }
        Kind::Sequence => {
            let items = value.elements();
            ctx.nested(|ctx| {
                Json::Array(items.iter().map(|item| serialize(item, ctx)).collect())
            })
        }
        Kind::Event(event_type) => {
            let mut out = Map::new();
            out.insert("type".to_string(), Json::String(event_type));
            serialize_fields(value, &mut out, ctx);
            Json::Object(out)
        }
        Kind::Record => {
            if let Some(id) = value.identity() {
                if !ctx.visited.insert(id) {
                    return Json::String(CIRCULAR_SENTINEL.to_string());
                }
            }
            let mut out = Map::new();
            serialize_fields(value, &mut out, ctx);
            Json::Object(out)
        }
    }
}

fn serialize_fields<V: Reflect>(value: &V, out: &mut Map<String, Json>, ctx: &mut SerializationContext) {
    for (key, field) in value.fields() {
        let json = ctx.nested(|ctx| serialize(&field, ctx));
        out.insert(key, json);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{Array, ErrorValue, EventValue, Object, Value};
    use serde_json::json;

    fn ser(value: &Value) -> Json {
        serialize(value, &mut SerializationContext::default())
    }

    #[test]
    fn test_primitives_pass_through() {
        assert_eq!(ser(&Value::Null), Json::Null);
        assert_eq!(ser(&Value::Undefined), Json::Null);
        assert_eq!(ser(&Value::from(true)), json!(true));
        assert_eq!(ser(&Value::from(1.5)), json!(1.5));
        assert_eq!(ser(&Value::from("hi")), json!("hi"));
        assert_eq!(ser(&Value::Number(f64::INFINITY)), Json::Null);
    }

    #[test]
    fn test_big_int_and_callables() {
        assert_eq!(
            ser(&Value::BigInt(12345678901234567890123)),
            json!("12345678901234567890123n")
        );
        assert_eq!(
            ser(&Value::Function(Some("onClick".into()))),
            json!("[Function onClick]")
        );
        assert_eq!(ser(&Value::Function(None)), json!("[Function anonymous]"));
    }

    #[test]
    fn test_self_reference_is_circular() {
        let object = Object::new().with("a", 1);
        object.set("self", object.clone());

        let out = ser(&Value::Object(object));
        assert_eq!(out, json!({"a": 1, "self": "[Circular]"}));
    }

    #[test]
    fn test_visited_set_is_shared_across_branches() {
        let shared = Object::new().with("x", 1);
        let root = Object::new()
            .with("left", shared.clone())
            .with("right", shared);

        let out = ser(&Value::Object(root));
        assert_eq!(out, json!({"left": {"x": 1}, "right": "[Circular]"}));
    }

    #[test]
    fn test_depth_ceiling() {
        let deep = json!({"a": {"b": {"c": {"d": {"e": {"f": 1}}}}}});
        let out = serialize(&Value::from(deep), &mut SerializationContext::default());
        assert_eq!(out, json!({"a": {"b": {"c": {"d": {"e": "[MaxDepth]"}}}}}));
    }

    #[test]
    fn test_shallow_structure_is_exact() {
        let tree = json!({"a": [1, 2, {"b": "c"}], "d": null, "e": false});
        let out = serialize(&tree, &mut SerializationContext::default());
        assert_eq!(out, tree);
    }

    #[test]
    fn test_self_containing_array_terminates() {
        let array = Array::new();
        array.push(1);
        array.push(Value::Array(array.clone()));

        let out = ser(&Value::Array(array));
        assert_eq!(
            out,
            json!([1, [1, [1, [1, ["[MaxDepth]", "[MaxDepth]"]]]]])
        );
    }

    #[test]
    fn test_null_wins_over_depth() {
        let mut ctx = SerializationContext::new(0);
        assert_eq!(serialize(&Value::Null, &mut ctx), Json::Null);
        assert_eq!(serialize(&Value::from(1), &mut ctx), json!("[MaxDepth]"));
    }

    #[test]
    fn test_error_shape() {
        let error = ErrorValue::new("TypeError", "x is not a function")
            .with_stack("TypeError: x is not a function\n    at main.js:1:1")
            .with_cause(ErrorValue::new("Error", "root cause"))
            .with("code", "E_X");

        let out = ser(&Value::Error(error));
        assert_eq!(
            out,
            json!({
                "name": "TypeError",
                "message": "x is not a function",
                "stack": "TypeError: x is not a function\n    at main.js:1:1",
                "cause": {"name": "Error", "message": "root cause"},
                "code": "E_X",
            })
        );
    }

    #[test]
    fn test_error_cycle_through_property_is_bounded() {
        let holder = Object::new();
        let error = ErrorValue::new("Error", "loop").with("holder", holder.clone());
        holder.set("error", error.clone());

        let out = ser(&Value::Error(error));
        // error -> holder -> error (not identity tracked) -> holder (circular)
        assert_eq!(out["holder"]["error"]["holder"], json!("[Circular]"));
    }

    #[test]
    fn test_event_shape() {
        let event = EventValue::new("click").with("button", 0).with("target", "ok");
        let out = ser(&Value::Event(event));
        assert_eq!(out, json!({"type": "click", "button": 0, "target": "ok"}));
    }

    #[test]
    fn test_hidden_fields_are_kept() {
        let object = Object::new().with("visible", 1);
        object.set_hidden("hidden", 2);
        assert_eq!(ser(&Value::Object(object)), json!({"visible": 1, "hidden": 2}));
    }

    #[test]
    fn test_depth_restored_after_call() {
        let mut ctx = SerializationContext::default();
        let value = Value::from(json!({"a": {"b": 1}}));
        serialize(&value, &mut ctx);
        assert_eq!(ctx.depth(), 0);
    }
}
