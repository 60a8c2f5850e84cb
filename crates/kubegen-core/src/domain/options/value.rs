use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value as Json;

use super::path::DottedPath;

/// Which store a deferred reference is resolved against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefScope {
    /// The store holding the reference.
    Local,
    /// The root store a builder-options store was derived from. Falls back to
    /// the holding store when it has no root.
    Root,
}

/// A deferred reference: a dotted path resolved at read time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OptionRef {
    pub path: DottedPath,
    pub scope: RefScope,
}

impl fmt::Display for OptionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.scope {
            RefScope::Local => write!(f, "!ref {}", self.path),
            RefScope::Root => write!(f, "!root {}", self.path),
        }
    }
}

/// A node of the option tree.
#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Seq(Vec<OptionValue>),
    Map(BTreeMap<String, OptionValue>),
    Ref(OptionRef),
}

impl OptionValue {
    /// An empty mapping node.
    pub fn empty_map() -> Self {
        Self::Map(BTreeMap::new())
    }

    /// A mapping node from `(key, value)` pairs.
    pub fn map<K, V, I>(entries: I) -> Self
    where
        K: Into<String>,
        V: Into<OptionValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// A local deferred reference.
    ///
    /// # Panics
    /// Panics if `path` contains an empty segment; use [`DottedPath::parse`]
    /// with [`OptionValue::Ref`] for fallible construction.
    pub fn reference(path: &str) -> Self {
        Self::Ref(OptionRef {
            path: DottedPath::parse(path).expect("reference path must be well-formed"),
            scope: RefScope::Local,
        })
    }

    /// A deferred reference into the root store.
    ///
    /// # Panics
    /// Same as [`OptionValue::reference`].
    pub fn root_reference(path: &str) -> Self {
        Self::Ref(OptionRef {
            path: DottedPath::parse(path).expect("reference path must be well-formed"),
            scope: RefScope::Root,
        })
    }

    pub fn is_map(&self) -> bool {
        matches!(self, Self::Map(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub(crate) fn child(&self, segment: &str) -> Option<&OptionValue> {
        match self {
            Self::Map(map) => map.get(segment),
            Self::Seq(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        }
    }

    /// Deep-merge `overlay` into `self`: mapping keys merge recursively,
    /// anything else is replaced by the overlay.
    pub fn merge(&mut self, overlay: OptionValue) {
        match (self, overlay) {
            (Self::Map(base), Self::Map(overlay)) => {
                for (key, value) in overlay {
                    match base.get_mut(&key) {
                        Some(existing) => existing.merge(value),
                        None => {
                            base.insert(key, value);
                        }
                    }
                }
            }
            (slot, overlay) => *slot = overlay,
        }
    }

    /// Convert into a JSON document value.
    ///
    /// Unresolved references serialize as their `!ref path` display form;
    /// values returned by `OptionStore::get` never contain any.
    pub fn into_json(self) -> Json {
        match self {
            Self::Null => Json::Null,
            Self::Bool(b) => Json::Bool(b),
            Self::Int(i) => Json::from(i),
            Self::Float(f) => serde_json::Number::from_f64(f)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Self::Str(s) => Json::String(s),
            Self::Seq(items) => Json::Array(items.into_iter().map(Self::into_json).collect()),
            Self::Map(map) => Json::Object(
                map.into_iter()
                    .map(|(k, v)| (k, v.into_json()))
                    .collect(),
            ),
            Self::Ref(reference) => Json::String(reference.to_string()),
        }
    }
}

impl From<Json> for OptionValue {
    fn from(value: Json) -> Self {
        match value {
            Json::Null => Self::Null,
            Json::Bool(b) => Self::Bool(b),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or_default()),
            },
            Json::String(s) => Self::Str(s),
            Json::Array(items) => Self::Seq(items.into_iter().map(Self::from).collect()),
            Json::Object(map) => {
                Self::Map(map.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

impl From<&str> for OptionValue {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<bool> for OptionValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for OptionValue {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<i32> for OptionValue {
    fn from(i: i32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<u16> for OptionValue {
    fn from(i: u16) -> Self {
        Self::Int(i64::from(i))
    }
}

impl<T: Into<OptionValue>> From<Vec<T>> for OptionValue {
    fn from(items: Vec<T>) -> Self {
        Self::Seq(items.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merge_combines_mappings_and_replaces_leaves() {
        let mut base = OptionValue::from(json!({"a": {"b": 1, "c": 2}, "d": [1, 2]}));
        base.merge(OptionValue::from(json!({"a": {"c": 3, "e": 4}, "d": [9]})));

        assert_eq!(
            base.into_json(),
            json!({"a": {"b": 1, "c": 3, "e": 4}, "d": [9]})
        );
    }

    #[test]
    fn merge_replaces_scalar_with_mapping() {
        let mut base = OptionValue::from(json!({"a": 1}));
        base.merge(OptionValue::from(json!({"a": {"b": 2}})));
        assert_eq!(base.into_json(), json!({"a": {"b": 2}}));
    }

    #[test]
    fn child_indexes_sequences() {
        let value = OptionValue::from(json!({"ports": [80, 443]}));
        let ports = value.child("ports").unwrap();
        assert_eq!(ports.child("1"), Some(&OptionValue::Int(443)));
        assert_eq!(ports.child("x"), None);
    }

    #[test]
    fn references_display_with_scope() {
        assert_eq!(
            OptionValue::root_reference("namespaces.mon").into_json(),
            json!("!root namespaces.mon")
        );
    }
}
