//! Full-text search index abstraction.
//!
//! The search index holds a denormalized, best-effort projection of stored
//! entities. It is never authoritative: documents may lag behind, or be
//! missing, and a reconciliation pass repairs drift.
//!
//! Queries are expressed as a [`SearchQuery`]: a conjunction of [`Clause`]s.
//! Its [`Display`](std::fmt::Display) form is the textual query expression
//! understood by search engines with the familiar `field op value` syntax:
//!
//! ```
//! use conference_central_core::search::{Clause, Operand, SearchQuery};
//! use conference_central_core::Operator;
//!
//! let query = SearchQuery::new()
//!     .clause(Clause::new("CITY", Operator::Eq, Operand::tokens(["Paris"])))
//!     .clause(Clause::new("MONTH", Operator::Gt, Operand::Number(3)))
//!     .clause(Clause::new("TOPIC", Operator::Eq, Operand::tokens(["Go"])).negate());
//!
//! assert_eq!(query.to_string(), "CITY = (Paris) MONTH > 3 NOT TOPIC = (Go)");
//! ```

use crate::operator::Operator;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

/// Boxed future returned by [`SearchIndex`] methods.
pub type SearchFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, SearchError>> + Send + 'a>>;

/// Errors that can occur during search index operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SearchError {
    /// The index could not be reached.
    #[error("search index unavailable: {0}")]
    Unavailable(String),

    /// The query expression was rejected.
    #[error("invalid search query: {0}")]
    InvalidQuery(String),

    /// The document was rejected.
    #[error("invalid document: {0}")]
    InvalidDocument(String),
}

/// A typed document field.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldValue {
    /// Exact-match string, not tokenized.
    Atom(String),
    /// Tokenized free text.
    Text(String),
    /// Integer.
    Number(i64),
    /// Timestamp; searched at day granularity.
    Date(DateTime<Utc>),
}

/// A searchable document: named fields.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    fields: BTreeMap<String, FieldValue>,
}

impl Document {
    /// Empty document.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style field setter.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, value: FieldValue) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    /// Field lookup.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// All fields in name order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// The right-hand side of a clause.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Operand {
    /// Tokens that must all appear in a text field.
    Tokens(Vec<String>),
    /// Exact atom value.
    Atom(String),
    /// Integer comparison.
    Number(i64),
    /// Day-granularity date comparison.
    Date(NaiveDate),
}

impl Operand {
    /// Token operand from any string iterator.
    pub fn tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Tokens(tokens.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tokens(tokens) => write!(f, "({})", tokens.join(" ")),
            Self::Atom(atom) => write!(f, "\"{}\"", atom.replace('"', "")),
            Self::Number(n) => write!(f, "{n}"),
            Self::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
        }
    }
}

/// One restriction in a [`SearchQuery`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Clause {
    /// Document field name.
    pub field: String,
    /// Comparison.
    pub operator: Operator,
    /// Operand.
    pub operand: Operand,
    /// Whether the clause is negated with `NOT`.
    pub negated: bool,
}

impl Clause {
    /// A positive clause.
    #[must_use]
    pub fn new(field: impl Into<String>, operator: Operator, operand: Operand) -> Self {
        Self {
            field: field.into(),
            operator,
            operand,
            negated: false,
        }
    }

    /// Negate the clause.
    #[must_use]
    pub const fn negate(mut self) -> Self {
        self.negated = !self.negated;
        self
    }
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negated {
            f.write_str("NOT ")?;
        }
        write!(f, "{} {} {}", self.field, self.operator, self.operand)
    }
}

/// A conjunction of clauses.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SearchQuery {
    /// Clauses; all must hold.
    pub clauses: Vec<Clause>,
}

impl SearchQuery {
    /// Query matching every document.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a clause.
    #[must_use]
    pub fn clause(mut self, clause: Clause) -> Self {
        self.clauses.push(clause);
        self
    }

    /// Whether the query has no clauses.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }
}

impl fmt::Display for SearchQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, clause) in self.clauses.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{clause}")?;
        }
        Ok(())
    }
}

/// A named document index.
pub trait SearchIndex: Send + Sync {
    /// Index name.
    fn name(&self) -> &str;

    /// Insert or replace a document.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError`] if the index is unreachable or rejects the
    /// document.
    fn put(&self, doc_id: String, document: Document) -> SearchFuture<'_, ()>;

    /// Delete a document. Deleting a missing document succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Unavailable`] if the index is unreachable.
    fn delete<'a>(&'a self, doc_id: &'a str) -> SearchFuture<'a, ()>;

    /// Documents matching every clause, with their ids.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError`] if the index is unreachable or rejects the
    /// query.
    fn search<'a>(&'a self, query: &'a SearchQuery) -> SearchFuture<'a, Vec<(String, Document)>>;

    /// Every document in the index.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Unavailable`] if the index is unreachable.
    fn list(&self) -> SearchFuture<'_, Vec<(String, Document)>>;
}

/// Opens named indexes.
pub trait SearchEngine: Send + Sync {
    /// Open (creating if needed) the index called `name`.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Unavailable`] if the engine is unreachable.
    fn open(&self, name: &str) -> Result<Arc<dyn SearchIndex>, SearchError>;
}
