//! The intermediate value tree shared by the XML parser, the engines and the renderer.
//!
//! Parsing never interprets text: every leaf is kept as a string and typed
//! conversion happens only when a value is unboxed into a Rust type.

use indexmap::IndexMap;

/// Reserved child key holding the character data of an element that also
/// carries attributes or child elements.
pub const TEXT_KEY: &str = "$text";

/// A node of the value tree.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum Value {
    /// An empty element (`<a/>`) or an explicit nil.
    #[default]
    Null,
    /// Leaf text.
    Scalar(String),
    /// Leaf text that renders as a CDATA section. Decodes exactly like `Scalar`.
    CData(String),
    /// Ordered elements sharing one tag name.
    Sequence(Vec<Value>),
    /// An element with named children and attributes.
    Keyed(Keyed),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The leaf text of a `Scalar` or `CData` node.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Scalar(text) | Value::CData(text) => Some(text),
            _ => None,
        }
    }

    /// Short description of the node kind for mismatch messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Scalar(_) | Value::CData(_) => "a string",
            Value::Sequence(_) => "an unkeyed container",
            Value::Keyed(_) => "a keyed container",
        }
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Value::Scalar(text.to_string())
    }
}

impl From<String> for Value {
    fn from(text: String) -> Self {
        Value::Scalar(text)
    }
}

impl From<Keyed> for Value {
    fn from(keyed: Keyed) -> Self {
        Value::Keyed(keyed)
    }
}

/// Children of an element in document order, plus its attributes.
///
/// Attributes live in their own map so an attribute and a child element with
/// the same name never collide. The map is only allocated once the first
/// attribute is inserted.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct Keyed {
    children: IndexMap<String, Value>,
    attributes: Option<IndexMap<String, Value>>,
}

impl Keyed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a child, keeping the original position on replace.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.children.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.children.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.children.get_mut(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.children.contains_key(key)
    }

    pub fn insert_attribute(&mut self, key: impl Into<String>, value: Value) {
        self.attributes
            .get_or_insert_with(IndexMap::new)
            .insert(key.into(), value);
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.as_ref().and_then(|attributes| attributes.get(key))
    }

    pub fn children(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.children.iter()
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.attributes.iter().flat_map(|attributes| attributes.iter())
    }

    pub fn has_attributes(&self) -> bool {
        self.attributes.as_ref().is_some_and(|attributes| !attributes.is_empty())
    }

    /// Number of child elements, not counting attributes.
    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty() && !self.has_attributes()
    }

    /// Appends `value` under `key`, turning a repeated key into a sequence.
    pub(crate) fn append(&mut self, key: String, value: Value) {
        match self.children.get_mut(&key) {
            Some(Value::Sequence(items)) => items.push(value),
            Some(existing) => {
                let first = std::mem::take(existing);
                *existing = Value::Sequence(vec![first, value]);
            }
            None => {
                self.children.insert(key, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_groups_repeated_keys() {
        let mut keyed = Keyed::new();
        keyed.append("book".to_string(), Value::from("a"));
        keyed.append("title".to_string(), Value::from("t"));
        keyed.append("book".to_string(), Value::from("b"));
        keyed.append("book".to_string(), Value::from("c"));

        assert_eq!(keyed.len(), 2);
        assert_eq!(
            keyed.get("book"),
            Some(&Value::Sequence(vec![
                Value::from("a"),
                Value::from("b"),
                Value::from("c")
            ]))
        );
    }

    #[test]
    fn test_attributes_do_not_collide_with_children() {
        let mut keyed = Keyed::new();
        assert!(!keyed.has_attributes());
        keyed.insert("id", Value::from("child"));
        keyed.insert_attribute("id", Value::from("attr"));

        assert_eq!(keyed.get("id").and_then(Value::as_str), Some("child"));
        assert_eq!(keyed.attribute("id").and_then(Value::as_str), Some("attr"));
        assert_eq!(keyed.len(), 1);
    }
}
