use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::behavior::OnError;

/// Evaluated property dictionary of one configuration object.
pub type Properties = BTreeMap<String, PropertyValue>;

/// A typed, evaluated attribute value.
///
/// `Array` and `Vector` differ only in the declared cardinality sign of the
/// attribute that produced them; consumers that care about the collection
/// shape can match on the variant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PropertyValue {
    String(String),
    Boolean(bool),
    Byte(i8),
    Char(char),
    Short(i16),
    Integer(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    /// Duration expressed in the attribute's declared unit.
    Duration(i64),
    Password(ProtectedString),
    OnError(OnError),
    Array(Vec<PropertyValue>),
    Vector(Vec<PropertyValue>),
}

impl PropertyValue {
    /// The string payload, if this is a plain string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// The elements of an array or vector value.
    pub fn as_list(&self) -> Option<&[PropertyValue]> {
        match self {
            PropertyValue::Array(v) | PropertyValue::Vector(v) => Some(v),
            _ => None,
        }
    }

    /// Integral payload of any integer-like variant.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PropertyValue::Byte(v) => Some(i64::from(*v)),
            PropertyValue::Short(v) => Some(i64::from(*v)),
            PropertyValue::Integer(v) => Some(i64::from(*v)),
            PropertyValue::Long(v) | PropertyValue::Duration(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns `true` for array and vector values.
    pub fn is_list(&self) -> bool {
        matches!(self, PropertyValue::Array(_) | PropertyValue::Vector(_))
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::String(s) => f.write_str(s),
            PropertyValue::Boolean(b) => write!(f, "{}", b),
            PropertyValue::Byte(v) => write!(f, "{}", v),
            PropertyValue::Char(c) => write!(f, "{}", c),
            PropertyValue::Short(v) => write!(f, "{}", v),
            PropertyValue::Integer(v) => write!(f, "{}", v),
            PropertyValue::Long(v) | PropertyValue::Duration(v) => write!(f, "{}", v),
            PropertyValue::Float(v) => write!(f, "{}", v),
            PropertyValue::Double(v) => write!(f, "{}", v),
            PropertyValue::Password(p) => write!(f, "{}", p),
            PropertyValue::OnError(o) => write!(f, "{}", o),
            PropertyValue::Array(values) | PropertyValue::Vector(values) => {
                let parts: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                f.write_str(&parts.join(","))
            }
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        PropertyValue::String(s.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        PropertyValue::String(s)
    }
}

/// A password value.
///
/// The contents never appear in `Debug`, `Display` or serialized output;
/// use [`ProtectedString::expose`] where the clear text is genuinely needed.
#[derive(Clone, PartialEq, Eq)]
pub struct ProtectedString(String);

const REDACTED: &str = "*****";

impl ProtectedString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The clear-text value.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ProtectedString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProtectedString({})", REDACTED)
    }
}

impl fmt::Display for ProtectedString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl Serialize for ProtectedString {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(REDACTED)
    }
}

impl<'de> Deserialize<'de> for ProtectedString {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(ProtectedString)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_is_redacted() {
        let p = ProtectedString::new("hunter2");
        assert_eq!(p.to_string(), "*****");
        assert!(!format!("{:?}", p).contains("hunter2"));
        assert_eq!(p.expose(), "hunter2");
        let json = serde_json::to_string(&PropertyValue::Password(p)).unwrap();
        assert!(!json.contains("hunter2"));
    }

    #[test]
    fn list_display_joins_with_commas() {
        let v = PropertyValue::Array(vec![
            PropertyValue::Integer(1),
            PropertyValue::String("b".into()),
        ]);
        assert_eq!(v.to_string(), "1,b");
        assert!(v.is_list());
        assert_eq!(v.as_list().map(|l| l.len()), Some(2));
    }

    #[test]
    fn integer_accessors() {
        assert_eq!(PropertyValue::Short(7).as_i64(), Some(7));
        assert_eq!(PropertyValue::Duration(1500).as_i64(), Some(1500));
        assert_eq!(PropertyValue::Boolean(true).as_i64(), None);
    }

    #[test]
    fn tagged_serde_shape() {
        let json = serde_json::to_value(PropertyValue::Long(5)).unwrap();
        assert_eq!(json["type"], "long");
        assert_eq!(json["value"], 5);
    }
}
