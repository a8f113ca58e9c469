//! Filter parsing: wire shape to typed [`Filter`].
//!
//! Each filter is resolved once, here. Operators are normalized to the six
//! canonical symbols and values are coerced by the field's [`FieldKind`], so
//! the compiler only ever matches over [`FilterValue`].

use crate::schema::{FieldKind, QueryField};
use chrono::{DateTime, NaiveDate, Utc};
use conference_central_core::entity::Value;
use conference_central_core::{Key, Operator};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while parsing or combining filters.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FilterError {
    /// The field is not in the mapping table.
    #[error("unknown filter field: {0}")]
    UnknownField(String),

    /// The operator is neither a symbol nor a known alias.
    #[error("unknown operator {operator:?} on {field}")]
    UnknownOperator {
        /// Offending field.
        field: QueryField,
        /// Raw operator.
        operator: String,
    },

    /// The operator is valid but not on this field.
    #[error("operator {operator} is not supported on {field}")]
    UnsupportedOperator {
        /// Offending field.
        field: QueryField,
        /// Operator.
        operator: Operator,
    },

    /// The value does not coerce to the field's kind.
    #[error("invalid value for {field}: {reason}")]
    InvalidValue {
        /// Offending field.
        field: QueryField,
        /// What was wrong.
        reason: String,
    },

    /// Two distinct fields carry non-equality operators.
    #[error("only one inequality filter is allowed ({first}, {second})")]
    MultipleInequalities {
        /// Field of the first inequality.
        first: QueryField,
        /// Field of the conflicting inequality.
        second: QueryField,
    },

    /// A text value has nothing left to search for after sanitizing.
    #[error("filter on {0} has no searchable characters")]
    EmptyTokens(QueryField),
}

/// One restriction as sent by clients.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FilterForm {
    /// Field name, any accepted spelling.
    pub field: String,
    /// Operator symbol or alias.
    #[serde(alias = "op")]
    pub operator: String,
    /// String or number.
    pub value: serde_json::Value,
}

impl FilterForm {
    /// Convenience constructor.
    pub fn new(
        field: impl Into<String>,
        operator: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        Self {
            field: field.into(),
            operator: operator.into(),
            value: value.into(),
        }
    }
}

/// A conference query as sent by clients.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConferenceQueryForm {
    /// Conjunctive filters.
    pub filters: Vec<FilterForm>,
}

impl ConferenceQueryForm {
    /// Form with the given filters.
    #[must_use]
    pub const fn new(filters: Vec<FilterForm>) -> Self {
        Self { filters }
    }
}

/// A coerced filter value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FilterValue {
    /// Integer fields.
    Integer(i64),
    /// Date fields.
    Date(DateTime<Utc>),
    /// Text fields and encoded keys.
    Text(String),
}

impl FilterValue {
    /// The equivalent stored value.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Integer(n) => Value::Int(*n),
            Self::Date(d) => Value::Date(*d),
            Self::Text(s) => Value::Text(s.clone()),
        }
    }
}

/// A typed restriction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Filter {
    /// Field.
    pub field: QueryField,
    /// Canonical operator.
    pub operator: Operator,
    /// Coerced value.
    pub value: FilterValue,
}

impl Filter {
    /// Build a filter from already-typed parts.
    #[must_use]
    pub const fn new(field: QueryField, operator: Operator, value: FilterValue) -> Self {
        Self {
            field,
            operator,
            value,
        }
    }

    /// Parse one wire filter.
    ///
    /// # Errors
    ///
    /// Returns [`FilterError`] for an unknown field or operator, an operator
    /// the field does not support, or a value that does not coerce.
    pub fn parse(form: &FilterForm) -> Result<Self, FilterError> {
        let field =
            QueryField::parse(&form.field).ok_or_else(|| FilterError::UnknownField(form.field.clone()))?;
        let operator = parse_operator(&form.operator).ok_or_else(|| FilterError::UnknownOperator {
            field,
            operator: form.operator.clone(),
        })?;
        let value = coerce(field, &form.value)?;

        if field.kind() == FieldKind::Key && !matches!(operator, Operator::Eq | Operator::Ne) {
            return Err(FilterError::UnsupportedOperator { field, operator });
        }

        Ok(Self::new(field, operator, value))
    }
}

/// Normalize an operator symbol or alias.
#[must_use]
pub fn parse_operator(raw: &str) -> Option<Operator> {
    let raw = raw.trim();
    Operator::from_symbol(raw).or_else(|| match raw.to_ascii_uppercase().as_str() {
        "EQ" | "==" => Some(Operator::Eq),
        "LT" => Some(Operator::Lt),
        "GT" => Some(Operator::Gt),
        "LTE" | "LTEQ" | "LE" => Some(Operator::Le),
        "GTE" | "GTEQ" | "GE" => Some(Operator::Ge),
        "NE" | "NEQ" | "<>" => Some(Operator::Ne),
        _ => None,
    })
}

fn coerce(field: QueryField, raw: &serde_json::Value) -> Result<FilterValue, FilterError> {
    let invalid = |reason: String| FilterError::InvalidValue { field, reason };

    match field.kind() {
        FieldKind::Integer => parse_integer(raw)
            .map(FilterValue::Integer)
            .ok_or_else(|| invalid(format!("{raw} is not an integer"))),
        FieldKind::Date => raw
            .as_str()
            .and_then(parse_date)
            .map(FilterValue::Date)
            .ok_or_else(|| invalid(format!("{raw} is not an RFC-3339 or YYYY-MM-DD date"))),
        FieldKind::Key => raw
            .as_str()
            .ok_or_else(|| invalid("key must be a string".to_string()))
            .and_then(|s| Key::decode(s).map_err(|err| invalid(err.to_string())))
            .map(|key| FilterValue::Text(key.encode())),
        FieldKind::Text | FieldKind::TextList => match raw {
            serde_json::Value::String(s) => Ok(FilterValue::Text(s.clone())),
            serde_json::Value::Number(n) => Ok(FilterValue::Text(n.to_string())),
            other => Err(invalid(format!("{other} is not a string"))),
        },
    }
}

/// Integer from a JSON number (integral floats included) or numeric string.
#[must_use]
pub fn parse_integer(raw: &serde_json::Value) -> Option<i64> {
    match raw {
        serde_json::Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < 9.0e15)
                .map(|f| {
                    #[allow(clippy::cast_possible_truncation)] // integral and in range
                    let n = f as i64;
                    n
                })
        }),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Date from RFC-3339 or `YYYY-MM-DD` (midnight UTC).
#[must_use]
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|d| d.and_utc())
        })
}
