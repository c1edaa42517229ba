//! Message formatting
//!
//! Turns the argument list of one log call into a single bounded string.

use serde_json::{Map, Value as Json};

use crate::config::{Config, ToolDiagnostics};
use crate::serializer::{serialize, SerializationContext};
use crate::value::Reflect;

/// Fields that make an object look like a dev-tool build diagnostic
const DIAGNOSTIC_FIELDS: &[&str] = &["message", "stack", "frame", "plugin", "id", "loc"];

/// Joins, annotates and truncates log arguments
#[derive(Debug, Clone)]
pub struct Formatter {
    max_length: usize,
    max_depth: usize,
    truncation_marker: String,
    diagnostics: ToolDiagnostics,
}

impl Formatter {
    pub fn new(config: &Config) -> Self {
        Self {
            max_length: config.max_message_length,
            max_depth: config.max_depth,
            truncation_marker: config.truncation_marker.clone(),
            diagnostics: config.tool_diagnostics.clone(),
        }
    }

    /// Format one call's arguments into a message
    pub fn format<V: Reflect>(&self, args: &[V]) -> String {
        let rendered: Vec<Rendered<'_>> = args.iter().map(|arg| self.render(arg)).collect();

        let base = rendered
            .iter()
            .zip(args)
            .map(|(rendered, arg)| match rendered {
                Rendered::Text(text) => (*text).to_string(),
                Rendered::Json(json) => {
                    serde_json::to_string(json).unwrap_or_else(|_| arg.coarse())
                }
            })
            .collect::<Vec<_>>()
            .join(" ");

        let message = match self.tool_diagnostic(&rendered) {
            Some(details) => format!("{}\n{}", base, details),
            None => base,
        };

        truncate(message, self.max_length, &self.truncation_marker)
    }

    /// Serialize an argument once; text passes through untouched
    fn render<'a, V: Reflect>(&self, arg: &'a V) -> Rendered<'a> {
        match arg.text() {
            Some(text) => Rendered::Text(text),
            None => Rendered::Json(serialize(arg, &mut SerializationContext::new(self.max_depth))),
        }
    }

    /// Render the first diagnostic-looking argument, if the call carries one
    fn tool_diagnostic(&self, rendered: &[Rendered<'_>]) -> Option<String> {
        let tagged = rendered.iter().any(|r| match r {
            Rendered::Text(text) => text.contains(&self.diagnostics.marker),
            Rendered::Json(_) => false,
        });

        let candidate = rendered.iter().find_map(|r| match r {
            Rendered::Json(Json::Object(map)) if looks_like_diagnostic(map) => Some(map),
            _ => None,
        });

        if !tagged && candidate.is_none() {
            return None;
        }
        let details = render_diagnostic(candidate?, &self.diagnostics.line_prefix);
        (!details.is_empty()).then_some(details)
    }
}

/// One argument after serialization
enum Rendered<'a> {
    Text(&'a str),
    Json(Json),
}

fn truthy(value: &Json) -> bool {
    match value {
        Json::Null => false,
        Json::Bool(b) => *b,
        Json::Number(n) => n.as_f64().map_or(true, |f| f != 0.0),
        Json::String(s) => !s.is_empty(),
        Json::Array(_) | Json::Object(_) => true,
    }
}

fn looks_like_diagnostic(map: &Map<String, Json>) -> bool {
    DIAGNOSTIC_FIELDS.iter().any(|field| match (*field, map.get(*field)) {
        ("loc", Some(loc)) => loc.is_object(),
        (_, Some(value)) => truthy(value),
        _ => false,
    })
}

fn text_of(value: &Json) -> String {
    match value {
        Json::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn present<'a>(map: &'a Map<String, Json>, key: &str) -> Option<&'a Json> {
    map.get(key).filter(|v| truthy(v))
}

fn render_diagnostic(map: &Map<String, Json>, prefix: &str) -> String {
    let mut lines = Vec::new();

    if let Some(message) = present(map, "message") {
        lines.push(format!("{} {}", prefix, text_of(message)));
    }
    if let Some(plugin) = present(map, "plugin") {
        lines.push(format!("{} plugin: {}", prefix, text_of(plugin)));
    }
    if let Some(id) = present(map, "id") {
        lines.push(format!("{} file: {}", prefix, text_of(id)));
    }
    if let Some(Json::Object(loc)) = map.get("loc") {
        let parts: Vec<String> = ["file", "line", "column"]
            .iter()
            .filter_map(|key| loc.get(*key).filter(|v| !v.is_null()).map(text_of))
            .collect();
        if !parts.is_empty() {
            lines.push(format!("{} loc: {}", prefix, parts.join(":")));
        }
    }
    if let Some(frame) = present(map, "frame").map(text_of) {
        if !frame.trim().is_empty() {
            lines.push(format!("{} frame:\n{}", prefix, frame.trim()));
        }
    }
    if let Some(stack) = present(map, "stack").map(text_of) {
        if !stack.trim().is_empty() {
            lines.push(format!("{} stack:\n{}", prefix, stack.trim()));
        }
    }

    lines.join("\n")
}

/// Cut `message` to `max` characters and append the marker when it is longer
pub fn truncate(message: String, max: usize, marker: &str) -> String {
    match message.char_indices().nth(max) {
        Some((cut, _)) => {
            let mut out = message[..cut].to_string();
            out.push_str(marker);
            out
        }
        None => message,
    }
}
