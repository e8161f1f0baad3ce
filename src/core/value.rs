//! RG-002: Attribute values and references.
//!
//! An attribute value is a tagged union of literals and deferred references.
//! References are written in declarations as a single-key map
//! `{"$ref": "type.local_name.attribute"}` and may be nested anywhere inside
//! lists and maps.

use super::error::{GraphError, Result};
use super::types::ResourceId;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Key that marks a map as a reference in serialized form.
pub const REF_KEY: &str = "$ref";

/// A pointer to "attribute X of resource Y", usable before Y exists.
///
/// Equality is structural: two references are equal when they name the same
/// target and attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct AttributeReference {
    pub target: ResourceId,
    pub attribute: String,
}

/// Construct a reference without requiring the target to exist yet.
pub fn reference(target: ResourceId, attribute: impl Into<String>) -> AttributeReference {
    AttributeReference::new(target, attribute)
}

impl AttributeReference {
    pub fn new(target: ResourceId, attribute: impl Into<String>) -> Self {
        Self {
            target,
            attribute: attribute.into(),
        }
    }

    /// Parse `type.local_name.attribute`.
    pub fn parse(s: &str) -> Result<Self> {
        let invalid = |message: &str| GraphError::InvalidReference {
            value: s.to_string(),
            message: message.to_string(),
        };
        let (ty, rest) = s
            .split_once('.')
            .ok_or_else(|| invalid("expected 'type.name.attribute'"))?;
        let (name, attribute) = rest
            .rsplit_once('.')
            .ok_or_else(|| invalid("expected 'type.name.attribute'"))?;
        if ty.is_empty() || name.is_empty() || attribute.is_empty() {
            return Err(invalid("empty segment"));
        }
        if name.contains('.') {
            return Err(invalid("resource name must not contain '.'"));
        }
        Ok(Self::new(ResourceId::new(ty, name), attribute))
    }
}

impl fmt::Display for AttributeReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.target, self.attribute)
    }
}

impl From<AttributeReference> for String {
    fn from(r: AttributeReference) -> Self {
        r.to_string()
    }
}

impl TryFrom<String> for AttributeReference {
    type Error = String;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        Self::parse(&s).map_err(|e| e.to_string())
    }
}

/// A declared attribute value: a literal, or a deferred reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "serde_json::Value", try_from = "serde_json::Value")]
pub enum Value {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    List(Vec<Value>),
    Map(IndexMap<String, Value>),
    Ref(AttributeReference),
}

impl Value {
    /// Every reference embedded in this value, depth first.
    pub fn references(&self) -> Vec<&AttributeReference> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references<'a>(&'a self, out: &mut Vec<&'a AttributeReference>) {
        match self {
            Self::Ref(r) => out.push(r),
            Self::List(items) => items.iter().for_each(|v| v.collect_references(out)),
            Self::Map(map) => map.values().for_each(|v| v.collect_references(out)),
            _ => {}
        }
    }

    /// True when no reference appears anywhere inside the value.
    pub fn is_static(&self) -> bool {
        match self {
            Self::Ref(_) => false,
            Self::List(items) => items.iter().all(Value::is_static),
            Self::Map(map) => map.values().all(Value::is_static),
            _ => true,
        }
    }

    /// Rewrite every embedded reference in place.
    pub fn rewrite_references(&mut self, f: &mut impl FnMut(&mut AttributeReference)) {
        match self {
            Self::Ref(r) => f(r),
            Self::List(items) => items.iter_mut().for_each(|v| v.rewrite_references(f)),
            Self::Map(map) => map.values_mut().for_each(|v| v.rewrite_references(f)),
            _ => {}
        }
    }

    /// Rebuild the value, replacing each string with the value `f` returns.
    pub fn map_strings<E>(
        &self,
        f: &mut impl FnMut(&str) -> std::result::Result<Value, E>,
    ) -> std::result::Result<Value, E> {
        Ok(match self {
            Self::String(s) => f(s)?,
            Self::List(items) => Self::List(
                items
                    .iter()
                    .map(|v| v.map_strings(f))
                    .collect::<std::result::Result<_, _>>()?,
            ),
            Self::Map(map) => {
                let mut out = IndexMap::with_capacity(map.len());
                for (k, v) in map {
                    out.insert(k.clone(), v.map_strings(f)?);
                }
                Self::Map(out)
            }
            other => other.clone(),
        })
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Short type name used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::List(_) => "list",
            Self::Map(_) => "map",
            Self::Ref(_) => "reference",
        }
    }

    /// Deterministic JSON with map keys sorted, for hashing.
    pub fn canonical_json(&self) -> String {
        let mut out = String::new();
        self.write_canonical(&mut out);
        out
    }

    fn write_canonical(&self, out: &mut String) {
        match self {
            Self::Map(map) => {
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                out.push('{');
                for (i, k) in keys.into_iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    out.push_str(&serde_json::Value::String(k.clone()).to_string());
                    out.push(':');
                    map[k].write_canonical(out);
                }
                out.push('}');
            }
            Self::List(items) => {
                out.push('[');
                for (i, v) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    v.write_canonical(out);
                }
                out.push(']');
            }
            other => out.push_str(&serde_json::Value::from(other.clone()).to_string()),
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => Self::Number(n),
            Value::String(s) => Self::String(s),
            Value::List(items) => Self::Array(items.into_iter().map(Into::into).collect()),
            Value::Map(map) => Self::Object(map.into_iter().map(|(k, v)| (k, v.into())).collect()),
            Value::Ref(r) => {
                let mut obj = serde_json::Map::new();
                obj.insert(REF_KEY.to_string(), Self::String(r.to_string()));
                Self::Object(obj)
            }
        }
    }
}

impl TryFrom<serde_json::Value> for Value {
    type Error = GraphError;

    fn try_from(value: serde_json::Value) -> Result<Self> {
        Ok(match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => Self::Number(n),
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(items) => Self::List(
                items
                    .into_iter()
                    .map(Value::try_from)
                    .collect::<Result<_>>()?,
            ),
            serde_json::Value::Object(obj) => {
                if obj.len() == 1 {
                    if let Some(serde_json::Value::String(s)) = obj.get(REF_KEY) {
                        return Ok(Self::Ref(AttributeReference::parse(s)?));
                    }
                }
                let mut map = IndexMap::with_capacity(obj.len());
                for (k, v) in obj {
                    map.insert(k, Value::try_from(v)?);
                }
                Self::Map(map)
            }
        })
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Number(n.into())
    }
}

impl From<AttributeReference> for Value {
    fn from(r: AttributeReference) -> Self {
        Self::Ref(r)
    }
}

impl<V: Into<Value>> From<Vec<V>> for Value {
    fn from(items: Vec<V>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }
}

impl<V: Into<Value>> FromIterator<(String, V)> for Value {
    fn from_iter<I: IntoIterator<Item = (String, V)>>(iter: I) -> Self {
        Self::Map(iter.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}
