//! Property-bag entities.
//!
//! The record store persists an [`Entity`]: a flat map of named, typed
//! [`Value`]s. Domain types convert to and from entities through an explicit
//! mapping table in the service crate, so the store never needs to know about
//! conference or profile structs.

use crate::operator::Operator;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors raised while reading typed properties from an entity.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EntityError {
    /// A required property is absent.
    #[error("missing property: {property}")]
    Missing {
        /// Property name.
        property: String,
    },

    /// A property holds a value of the wrong kind.
    #[error("property {property} is not a {expected}")]
    TypeMismatch {
        /// Property name.
        property: String,
        /// Expected value kind.
        expected: &'static str,
    },
}

/// A typed property value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Value {
    /// Signed integer.
    Int(i64),
    /// UTF-8 text.
    Text(String),
    /// Multi-valued text; a filter matches if any element matches.
    TextList(Vec<String>),
    /// UTC timestamp.
    Date(DateTime<Utc>),
}

impl Value {
    /// Name of the value kind, used in error messages.
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Int(_) => "integer",
            Self::Text(_) => "text",
            Self::TextList(_) => "text list",
            Self::Date(_) => "date",
        }
    }

    /// Compare two scalar values of the same kind.
    ///
    /// Returns `None` for mismatched kinds; a list compares through
    /// [`Value::matches`] instead.
    #[must_use]
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(b)),
            (Self::Text(a), Self::Text(b)) => Some(a.cmp(b)),
            (Self::Date(a), Self::Date(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Whether this value satisfies `self <op> operand`.
    ///
    /// A [`Value::TextList`] is multi-valued: it matches if any element does,
    /// and an empty list matches nothing.
    #[must_use]
    pub fn matches(&self, operator: Operator, operand: &Self) -> bool {
        match (self, operand) {
            (Self::TextList(items), Self::Text(needle)) => items
                .iter()
                .any(|item| operator.accepts(item.as_str().cmp(needle.as_str()))),
            _ => self
                .compare(operand)
                .is_some_and(|ordering| operator.accepts(ordering)),
        }
    }

    /// Sort key used when ordering query results by this value.
    ///
    /// Lists order by their smallest element, matching how multi-valued
    /// properties sort in an ordered index.
    #[must_use]
    pub fn sort_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::TextList(a), Self::TextList(b)) => a.iter().min().cmp(&b.iter().min()),
            _ => self.compare(other).unwrap_or(Ordering::Equal),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<String>> for Value {
    fn from(value: Vec<String>) -> Self {
        Self::TextList(value)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Date(value)
    }
}

/// A stored record: named properties.
///
/// # Examples
///
/// ```
/// use conference_central_core::entity::{Entity, Value};
///
/// let entity = Entity::new()
///     .with("NAME", "dotGo")
///     .with("MAX_ATTENDEES", 1_i64);
///
/// assert_eq!(entity.text("NAME").unwrap(), "dotGo");
/// assert_eq!(entity.int("MAX_ATTENDEES").unwrap(), 1);
/// assert!(entity.int("NAME").is_err());
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    properties: BTreeMap<String, Value>,
}

impl Entity {
    /// Empty entity.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style property setter.
    #[must_use]
    pub fn with(mut self, property: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(property, value);
        self
    }

    /// Set a property, replacing any previous value.
    pub fn set(&mut self, property: impl Into<String>, value: impl Into<Value>) {
        self.properties.insert(property.into(), value.into());
    }

    /// Remove a property.
    pub fn remove(&mut self, property: &str) -> Option<Value> {
        self.properties.remove(property)
    }

    /// Raw property access.
    #[must_use]
    pub fn get(&self, property: &str) -> Option<&Value> {
        self.properties.get(property)
    }

    /// All properties in name order.
    pub fn properties(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.properties.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Required integer property.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] if the property is absent or not an integer.
    pub fn int(&self, property: &str) -> Result<i64, EntityError> {
        match self.required(property)? {
            Value::Int(v) => Ok(*v),
            _ => Err(mismatch(property, "integer")),
        }
    }

    /// Required text property.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] if the property is absent or not text.
    pub fn text(&self, property: &str) -> Result<&str, EntityError> {
        match self.required(property)? {
            Value::Text(v) => Ok(v),
            _ => Err(mismatch(property, "text")),
        }
    }

    /// Text property, defaulting to empty when absent.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError::TypeMismatch`] if present but not text.
    pub fn text_or_empty(&self, property: &str) -> Result<String, EntityError> {
        match self.get(property) {
            None => Ok(String::new()),
            Some(Value::Text(v)) => Ok(v.clone()),
            Some(_) => Err(mismatch(property, "text")),
        }
    }

    /// Text list property, defaulting to empty when absent.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError::TypeMismatch`] if present but not a list.
    pub fn text_list(&self, property: &str) -> Result<Vec<String>, EntityError> {
        match self.get(property) {
            None => Ok(Vec::new()),
            Some(Value::TextList(v)) => Ok(v.clone()),
            Some(_) => Err(mismatch(property, "text list")),
        }
    }

    /// Optional date property.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError::TypeMismatch`] if present but not a date.
    pub fn date(&self, property: &str) -> Result<Option<DateTime<Utc>>, EntityError> {
        match self.get(property) {
            None => Ok(None),
            Some(Value::Date(v)) => Ok(Some(*v)),
            Some(_) => Err(mismatch(property, "date")),
        }
    }

    fn required(&self, property: &str) -> Result<&Value, EntityError> {
        self.get(property).ok_or_else(|| EntityError::Missing {
            property: property.to_string(),
        })
    }
}

fn mismatch(property: &str, expected: &'static str) -> EntityError {
    EntityError::TypeMismatch {
        property: property.to_string(),
        expected,
    }
}
