use super::{Kind, Reflect};

/// JSON trees are acyclic, so no node has an identity.
impl Reflect for serde_json::Value {
    fn classify(&self) -> Kind<Self> {
        match self {
            serde_json::Value::Null => Kind::Null,
            serde_json::Value::Array(_) => Kind::Sequence,
            serde_json::Value::Object(_) => Kind::Record,
            primitive => Kind::Primitive(primitive.clone()),
        }
    }

    fn identity(&self) -> Option<usize> {
        None
    }

    fn elements(&self) -> Vec<Self> {
        match self {
            serde_json::Value::Array(items) => items.clone(),
            _ => Vec::new(),
        }
    }

    fn fields(&self) -> Vec<(String, Self)> {
        match self {
            serde_json::Value::Object(map) => {
                map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
            }
            _ => Vec::new(),
        }
    }

    fn text(&self) -> Option<&str> {
        self.as_str()
    }

    fn coarse(&self) -> String {
        self.to_string()
    }
}
