//! Lowering of a validated [`ConferenceQuery`] into an executable plan.

use super::filter::{ConferenceQueryForm, Filter, FilterError, FilterValue};
use crate::config::QueryBackend;
use crate::schema::{FieldKind, NAME, QueryField, START_DATE};
use crate::types::CONFERENCE_KIND;
use conference_central_core::Operator;
use conference_central_core::search::{Clause, Operand, SearchQuery};
use conference_central_core::store::StoreQuery;

/// A conjunction of filters with at most one inequality field.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConferenceQuery {
    filters: Vec<Filter>,
    inequality_field: Option<QueryField>,
}

impl ConferenceQuery {
    /// Combine typed filters, enforcing the single-inequality-field rule.
    ///
    /// # Errors
    ///
    /// Returns [`FilterError::MultipleInequalities`] if two distinct fields
    /// carry non-equality operators.
    pub fn new(filters: Vec<Filter>) -> Result<Self, FilterError> {
        let mut inequality_field: Option<QueryField> = None;
        for filter in filters.iter().filter(|f| f.operator.is_inequality()) {
            match inequality_field {
                Some(first) if first != filter.field => {
                    return Err(FilterError::MultipleInequalities {
                        first,
                        second: filter.field,
                    });
                }
                Some(_) => {}
                None => inequality_field = Some(filter.field),
            }
        }
        Ok(Self {
            filters,
            inequality_field,
        })
    }

    /// Parse and validate a wire query.
    ///
    /// Filters are checked one by one (operator, then value) before the
    /// inequality rule is applied to the whole set.
    ///
    /// # Errors
    ///
    /// Returns the first [`FilterError`] found.
    pub fn parse(form: &ConferenceQueryForm) -> Result<Self, FilterError> {
        let filters = form
            .filters
            .iter()
            .map(Filter::parse)
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(filters)
    }

    /// The filters, in the order given.
    #[must_use]
    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    /// The single field carrying non-equality operators, if any.
    #[must_use]
    pub const fn inequality_field(&self) -> Option<QueryField> {
        self.inequality_field
    }

    /// Whether the query has no filters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Compile to an executable plan.
    ///
    /// Without filters the plan is always the cacheable default listing;
    /// otherwise `backend` picks the search or store lowering.
    ///
    /// # Errors
    ///
    /// Returns [`FilterError::EmptyTokens`] if a text value has no
    /// alphanumeric characters for the search lowering.
    pub fn compile(&self, backend: QueryBackend) -> Result<QueryPlan, FilterError> {
        if self.is_empty() {
            return Ok(QueryPlan::Listing(listing_query()));
        }
        match backend {
            QueryBackend::Search => self.to_search().map(QueryPlan::Search),
            QueryBackend::Store => Ok(QueryPlan::Store(self.to_store())),
        }
    }

    /// Lower to a search expression, one clause per filter.
    ///
    /// `!=` becomes a negated equality. Text values become sanitized token
    /// matches; ordering operators on text have no lexical meaning in the
    /// index and degrade to a token match too.
    ///
    /// # Errors
    ///
    /// See [`ConferenceQuery::compile`].
    pub fn to_search(&self) -> Result<SearchQuery, FilterError> {
        self.filters
            .iter()
            .try_fold(SearchQuery::new(), |query, filter| {
                Ok(query.clause(search_clause(filter)?))
            })
    }

    /// Lower to an ordered store query.
    ///
    /// Sorted by the inequality field first when there is one, then by
    /// name, so the first sort order is always legal.
    #[must_use]
    pub fn to_store(&self) -> StoreQuery {
        let mut query = self
            .filters
            .iter()
            .fold(StoreQuery::new(CONFERENCE_KIND), |query, filter| {
                query.filter(
                    filter.field.spec().store_property(),
                    filter.operator,
                    filter.value.to_value(),
                )
            });
        if let Some(field) = self.inequality_field {
            query = query.order(field.spec().store_property());
        }
        if self.inequality_field != Some(QueryField::Name) {
            query = query.order(NAME);
        }
        query
    }
}

/// What [`ConferenceQuery::compile`] produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QueryPlan {
    /// Unfiltered listing ordered by start date; eligible for the cache.
    Listing(StoreQuery),
    /// Search index expression.
    Search(SearchQuery),
    /// Filtered ordered store query.
    Store(StoreQuery),
}

/// The default listing: every conference, by start date then name.
#[must_use]
pub fn listing_query() -> StoreQuery {
    StoreQuery::new(CONFERENCE_KIND).order(START_DATE).order(NAME)
}

fn search_clause(filter: &Filter) -> Result<Clause, FilterError> {
    let spec = filter.field.spec();
    let (operator, negated) = match filter.operator {
        Operator::Ne => (Operator::Eq, true),
        op => (op, false),
    };

    let clause = match (&filter.value, spec.kind) {
        (FilterValue::Text(key), FieldKind::Key) => {
            Clause::new(spec.column, Operator::Eq, Operand::Atom(key.clone()))
        }
        (FilterValue::Text(text), _) => {
            let tokens = sanitize(text);
            if tokens.is_empty() {
                return Err(FilterError::EmptyTokens(filter.field));
            }
            Clause::new(spec.column, Operator::Eq, Operand::Tokens(tokens))
        }
        (FilterValue::Integer(n), _) => Clause::new(spec.column, operator, Operand::Number(*n)),
        (FilterValue::Date(d), _) => {
            Clause::new(spec.column, operator, Operand::Date(d.date_naive()))
        }
    };

    Ok(if negated { clause.negate() } else { clause })
}

/// Split on anything that is not a letter or digit.
fn sanitize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::query::FilterForm;
    use crate::schema::{CITY, MAX_ATTENDEES, MONTH};

    fn query(filters: Vec<FilterForm>) -> Result<ConferenceQuery, FilterError> {
        ConferenceQuery::parse(&ConferenceQueryForm::new(filters))
    }

    #[test]
    fn test_two_inequality_fields_are_rejected() {
        let err = query(vec![
            FilterForm::new("Month", ">", 3),
            FilterForm::new("MaxAttendees", "<", 10),
        ])
        .unwrap_err();
        assert_eq!(
            err,
            FilterError::MultipleInequalities {
                first: QueryField::Month,
                second: QueryField::MaxAttendees,
            }
        );
        assert!(err.to_string().starts_with("only one inequality filter is allowed"));
    }

    #[test]
    fn test_same_field_range_is_accepted() {
        let q = query(vec![
            FilterForm::new("StartDate", ">=", "2016-01-01"),
            FilterForm::new("StartDate", "<=", "2016-12-31"),
            FilterForm::new("City", "=", "Paris"),
            FilterForm::new("Topic", "=", "Go"),
        ])
        .unwrap();
        assert_eq!(q.inequality_field(), Some(QueryField::StartDate));

        let search = q.to_search().unwrap();
        assert_eq!(
            search.to_string(),
            "START_DATE >= 2016-01-01 START_DATE <= 2016-12-31 CITY = (Paris) TOPIC = (Go)"
        );
    }

    #[test]
    fn test_empty_query_is_the_listing() {
        let q = query(Vec::new()).unwrap();
        assert_eq!(
            q.compile(QueryBackend::Search).unwrap(),
            QueryPlan::Listing(listing_query())
        );
    }

    #[test]
    fn test_not_equal_uses_negation() {
        let q = query(vec![
            FilterForm::new("City", "!=", "New York"),
            FilterForm::new("Month", "NE", 6),
        ])
        .unwrap();
        assert_eq!(
            q.to_search().unwrap().to_string(),
            "NOT CITY = (New York) NOT MONTH = 6"
        );
    }

    #[test]
    fn test_text_is_sanitized() {
        let q = query(vec![FilterForm::new("Name", "=", "dot-Go!")]).unwrap();
        assert_eq!(q.to_search().unwrap().to_string(), "NAME = (dot Go)");

        let q = query(vec![FilterForm::new("Name", "=", "!!!")]).unwrap();
        assert_eq!(
            q.compile(QueryBackend::Search),
            Err(FilterError::EmptyTokens(QueryField::Name))
        );
        assert!(q.compile(QueryBackend::Store).is_ok());
    }

    #[test]
    fn test_key_clause_is_quoted() {
        let key = conference_central_core::Key::with_id(CONFERENCE_KIND, 2);
        let q = query(vec![FilterForm::new("Key", "=", key.encode())]).unwrap();
        assert_eq!(
            q.to_search().unwrap().to_string(),
            format!("KEY = \"{}\"", key.encode())
        );
    }

    #[test]
    fn test_store_lowering_orders_by_inequality_first() {
        let q = query(vec![
            FilterForm::new("City", "=", "Paris"),
            FilterForm::new("MaxAttendees", "<", 10),
        ])
        .unwrap();
        let store = q.to_store();
        assert!(store.validate().is_ok());
        let orders: Vec<&str> = store.orders.iter().map(|o| o.property.as_str()).collect();
        assert_eq!(orders, vec![MAX_ATTENDEES, NAME]);
        assert_eq!(store.filters[0].property, CITY);

        let q = query(vec![FilterForm::new("Name", ">", "m")]).unwrap();
        let orders: Vec<String> = q.to_store().orders.into_iter().map(|o| o.property).collect();
        assert_eq!(orders, vec![NAME.to_string()]);

        let q = query(vec![FilterForm::new("Month", "=", 3)]).unwrap();
        let store = q.to_store();
        assert_eq!(store.filters[0].property, MONTH);
        assert_eq!(store.orders.len(), 1);
    }
}
