//! Property values stored on entity and state nodes.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// Declared type of a property.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PropertyKind {
    #[default]
    Str,
    Int,
    Float,
    Bool,
}

impl fmt::Display for PropertyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Str => "str",
            Self::Int => "int",
            Self::Float => "float",
            Self::Bool => "bool",
        };
        f.write_str(name)
    }
}

/// A single property value.
///
/// Values are totally ordered (variant first, then value) so they can key
/// the diff tree and sort query results deterministically.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    #[default]
    Null,
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

/// Property name to value, ordered by name.
pub type PropertyMap = BTreeMap<String, PropertyValue>;

impl PropertyValue {
    /// The kind of this value, or `None` for null.
    pub fn kind(&self) -> Option<PropertyKind> {
        match self {
            Self::Null => None,
            Self::Str(_) => Some(PropertyKind::Str),
            Self::Int(_) => Some(PropertyKind::Int),
            Self::Float(_) => Some(PropertyKind::Float),
            Self::Bool(_) => Some(PropertyKind::Bool),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Lift a JSON value from a snapshot document.
    ///
    /// Arrays and objects have no property representation and are kept as
    /// their compact JSON text.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or_default()),
            },
            serde_json::Value::String(s) => Self::Str(s.clone()),
            other => Self::Str(other.to_string()),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Bool(_) => 1,
            Self::Int(_) => 2,
            Self::Float(_) => 3,
            Self::Str(_) => 4,
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Str(s) => f.write_str(s),
            Self::Int(n) => write!(f, "{n}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Bool(true) => f.write_str("True"),
            Self::Bool(false) => f.write_str("False"),
        }
    }
}

impl PartialEq for PropertyValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PropertyValue {}

impl PartialOrd for PropertyValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PropertyValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Null, Self::Null) => Ordering::Equal,
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Int(a), Self::Int(b)) => a.cmp(b),
            (Self::Float(a), Self::Float(b)) => a.total_cmp(b),
            (Self::Str(a), Self::Str(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl Hash for PropertyValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            Self::Null => {}
            Self::Bool(b) => b.hash(state),
            Self::Int(n) => n.hash(state),
            Self::Float(x) => x.to_bits().hash(state),
            Self::Str(s) => s.hash(state),
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<i64> for PropertyValue {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<f64> for PropertyValue {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<bool> for PropertyValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl<T: Into<PropertyValue>> From<Option<T>> for PropertyValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Self::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untagged_json_shape() {
        let map: PropertyMap = [
            ("a".to_string(), PropertyValue::from("x")),
            ("b".to_string(), PropertyValue::from(3)),
            ("c".to_string(), PropertyValue::Null),
            ("d".to_string(), PropertyValue::from(true)),
        ]
        .into_iter()
        .collect();
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"a":"x","b":3,"c":null,"d":true}"#);

        let back: PropertyMap = serde_json::from_str(&json).unwrap();
        assert_eq!(back, map);
    }

    #[test]
    fn ordering_is_total_across_variants() {
        let mut values = vec![
            PropertyValue::from("b"),
            PropertyValue::from(2.5),
            PropertyValue::Null,
            PropertyValue::from(7),
            PropertyValue::from("a"),
            PropertyValue::from(false),
        ];
        values.sort();
        assert_eq!(
            values,
            vec![
                PropertyValue::Null,
                PropertyValue::from(false),
                PropertyValue::from(7),
                PropertyValue::from(2.5),
                PropertyValue::from("a"),
                PropertyValue::from("b"),
            ]
        );
    }

    #[test]
    fn from_json_keeps_nested_values_as_text() {
        let v = serde_json::json!(["8.8.8.8", "8.8.4.4"]);
        assert_eq!(
            PropertyValue::from_json(&v),
            PropertyValue::from(r#"["8.8.8.8","8.8.4.4"]"#)
        );
        assert_eq!(
            PropertyValue::from_json(&serde_json::json!(4096)),
            PropertyValue::Int(4096)
        );
    }

    #[test]
    fn display_matches_text_form() {
        assert_eq!(PropertyValue::from(true).to_string(), "True");
        assert_eq!(PropertyValue::from(12).to_string(), "12");
        assert_eq!(PropertyValue::from("web-01").to_string(), "web-01");
    }
}
