//! Event - upstream pipeline output
//!
//! Events are produced by the stream-processing engine and are read-only here.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use validator::Validate;

/// Attribute type declared in a stream definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeType {
    Bool,
    Int,
    Long,
    Float,
    Double,
    String,
}

/// Typed attribute value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    Null,
}

impl AttributeValue {
    /// Declared type of this value (`None` for null)
    pub fn attribute_type(&self) -> Option<AttributeType> {
        match self {
            Self::Bool(_) => Some(AttributeType::Bool),
            Self::Int(_) => Some(AttributeType::Int),
            Self::Long(_) => Some(AttributeType::Long),
            Self::Float(_) => Some(AttributeType::Float),
            Self::Double(_) => Some(AttributeType::Double),
            Self::String(_) => Some(AttributeType::String),
            Self::Null => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Long(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::String(v) => f.write_str(v),
            Self::Null => f.write_str("null"),
        }
    }
}

impl From<bool> for AttributeValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for AttributeValue {
    fn from(v: i32) -> Self {
        Self::Int(v)
    }
}

impl From<i64> for AttributeValue {
    fn from(v: i64) -> Self {
        Self::Long(v)
    }
}

impl From<f32> for AttributeValue {
    fn from(v: f32) -> Self {
        Self::Float(v)
    }
}

impl From<f64> for AttributeValue {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

/// Named, typed attribute of a stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct Attribute {
    #[validate(length(min = 1))]
    pub name: String,

    #[serde(rename = "type")]
    pub attribute_type: AttributeType,
}

impl Attribute {
    pub fn new(name: impl Into<String>, attribute_type: AttributeType) -> Self {
        Self {
            name: name.into(),
            attribute_type,
        }
    }
}

/// Output stream definition
///
/// Gives positional event values their names, which routing-key expressions
/// and serializers refer to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct StreamDefinition {
    /// Stream identifier
    #[validate(length(min = 1))]
    pub id: String,

    /// Ordered attribute list
    #[validate(nested)]
    pub attributes: Vec<Attribute>,
}

impl StreamDefinition {
    pub fn new(id: impl Into<String>, attributes: Vec<Attribute>) -> Self {
        Self {
            id: id.into(),
            attributes,
        }
    }

    /// Position of an attribute by name
    pub fn attribute_index(&self, name: &str) -> Option<usize> {
        self.attributes.iter().position(|a| a.name == name)
    }

    pub fn attribute_names(&self) -> impl Iterator<Item = &str> {
        self.attributes.iter().map(|a| a.name.as_str())
    }
}

/// Immutable event: ordered attribute values plus a logical timestamp
///
/// Values live behind an `Arc`, so fanning one event out to many transports
/// only bumps a reference count.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Logical timestamp (epoch milliseconds)
    pub timestamp: i64,

    data: Arc<[AttributeValue]>,
}

impl Event {
    pub fn new(timestamp: i64, data: Vec<AttributeValue>) -> Self {
        Self {
            timestamp,
            data: Arc::from(data),
        }
    }

    /// Attribute values in stream-definition order
    pub fn data(&self) -> &[AttributeValue] {
        &self.data
    }

    pub fn get(&self, index: usize) -> Option<&AttributeValue> {
        self.data.get(index)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
