//! Comparison operators.
//!
//! The six operators a filter may carry. Both the record store filters and
//! the search index clauses use this type, so the query compiler lowers to a
//! single vocabulary.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A comparison operator.
///
/// Every operator except [`Operator::Eq`] is an *inequality*: the record store
/// permits at most one distinct property carrying an inequality per query.
///
/// # Examples
///
/// ```
/// use conference_central_core::Operator;
/// use std::cmp::Ordering;
///
/// assert!(Operator::Ge.is_inequality());
/// assert!(!Operator::Eq.is_inequality());
/// assert!(Operator::Ge.accepts(Ordering::Equal));
/// assert_eq!(Operator::Ne.symbol(), "!=");
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    /// `=`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl Operator {
    /// All operators, in canonical order.
    pub const ALL: [Self; 6] = [Self::Eq, Self::Ne, Self::Lt, Self::Le, Self::Gt, Self::Ge];

    /// The canonical symbol.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }

    /// Parse a canonical symbol. Aliases are handled by the filter parser.
    #[must_use]
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.symbol() == symbol)
    }

    /// Whether this operator restricts a range rather than a single value.
    #[must_use]
    pub const fn is_inequality(self) -> bool {
        !matches!(self, Self::Eq)
    }

    /// Whether `actual.cmp(operand)` satisfies this operator.
    #[must_use]
    pub const fn accepts(self, ordering: Ordering) -> bool {
        match self {
            Self::Eq => matches!(ordering, Ordering::Equal),
            Self::Ne => !matches!(ordering, Ordering::Equal),
            Self::Lt => matches!(ordering, Ordering::Less),
            Self::Le => !matches!(ordering, Ordering::Greater),
            Self::Gt => matches!(ordering, Ordering::Greater),
            Self::Ge => !matches!(ordering, Ordering::Less),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbols_round_trip() {
        for op in Operator::ALL {
            assert_eq!(Operator::from_symbol(op.symbol()), Some(op));
        }
        assert_eq!(Operator::from_symbol("=="), None);
    }

    #[test]
    fn test_accepts_orderings() {
        assert!(Operator::Lt.accepts(Ordering::Less));
        assert!(!Operator::Lt.accepts(Ordering::Equal));
        assert!(Operator::Le.accepts(Ordering::Equal));
        assert!(!Operator::Gt.accepts(Ordering::Less));
        assert!(Operator::Ne.accepts(Ordering::Greater));
        assert!(!Operator::Ne.accepts(Ordering::Equal));
    }
}
