use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum DataType {
    String,
    Integer,
    Number,
    Boolean,
    Object,
    Array,
}

impl DataType {
    /// Whether a JSON value can be stored in an attribute of this type.
    /// `null` is accepted by every type and clears the attribute.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (DataType::String, Value::String(_)) => true,
            (DataType::Integer, Value::Number(n)) => n.is_i64() || n.is_u64(),
            (DataType::Number, Value::Number(_)) => true,
            (DataType::Boolean, Value::Bool(_)) => true,
            (DataType::Object, Value::Object(_)) => true,
            (DataType::Array, Value::Array(_)) => true,
            _ => false,
        }
    }

    /// Only these types can back an identifying attribute.
    pub fn is_identifier_type(&self) -> bool {
        matches!(self, DataType::Integer | DataType::String)
    }
}

/// Externally visible identifier of an instance.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResourceId {
    Integer(u64),
    Text(String),
}

impl ResourceId {
    /// Parse a path segment according to the identifying attribute's type.
    pub fn parse(segment: &str, data_type: DataType) -> Option<Self> {
        match data_type {
            DataType::Integer => segment.parse::<u64>().ok().map(ResourceId::Integer),
            DataType::String if !segment.is_empty() => Some(ResourceId::Text(segment.to_string())),
            _ => None,
        }
    }

    /// Interpret a JSON value (as found in relationship payloads) as an identifier.
    pub fn from_json(value: &Value, data_type: DataType) -> Option<Self> {
        match (data_type, value) {
            (DataType::Integer, Value::Number(n)) => n.as_u64().map(ResourceId::Integer),
            (DataType::String, Value::String(s)) if !s.is_empty() => {
                Some(ResourceId::Text(s.clone()))
            }
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            ResourceId::Integer(n) => Value::from(*n),
            ResourceId::Text(s) => Value::String(s.clone()),
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceId::Integer(n) => write!(f, "{}", n),
            ResourceId::Text(s) => f.write_str(s),
        }
    }
}

pub fn generate_text_id() -> ResourceId {
    ResourceId::Text(Uuid::new_v4().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_resource_id_by_type() {
        assert_eq!(
            ResourceId::parse("42", DataType::Integer),
            Some(ResourceId::Integer(42))
        );
        assert_eq!(ResourceId::parse("abc", DataType::Integer), None);
        assert_eq!(ResourceId::parse("-1", DataType::Integer), None);
        assert_eq!(
            ResourceId::parse("abc", DataType::String),
            Some(ResourceId::Text("abc".to_string()))
        );
        assert_eq!(ResourceId::parse("1", DataType::Boolean), None);
    }

    #[test]
    fn test_data_type_accepts() {
        assert!(DataType::Integer.accepts(&json!(3)));
        assert!(!DataType::Integer.accepts(&json!(3.5)));
        assert!(DataType::Number.accepts(&json!(3.5)));
        assert!(DataType::String.accepts(&Value::Null));
        assert!(!DataType::String.accepts(&json!(true)));
    }

    #[test]
    fn test_resource_id_serializes_untagged() {
        assert_eq!(serde_json::to_value(ResourceId::Integer(7)).unwrap(), json!(7));
        assert_eq!(
            serde_json::to_value(ResourceId::Text("x".into())).unwrap(),
            json!("x")
        );
    }
}
