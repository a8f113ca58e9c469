//! Query filter compiler.
//!
//! Turns a client's list of `{field, operator, value}` restrictions into a
//! plan that the record store or search index can execute without tripping
//! over the ordered index's single-inequality-field limit:
//!
//! ```text
//! FilterForm ──parse──► Filter ──combine──► ConferenceQuery ──compile──► QueryPlan
//!  (wire)         field/op/value      inequality rule          Listing | Search | Store
//! ```
//!
//! Nothing here performs I/O.
//!
//! # Example
//!
//! ```
//! use conference_central::config::QueryBackend;
//! use conference_central::query::{ConferenceQuery, ConferenceQueryForm, FilterForm, QueryPlan};
//!
//! let form = ConferenceQueryForm::new(vec![FilterForm::new("City", "=", "Paris")]);
//! let query = ConferenceQuery::parse(&form).unwrap();
//! let QueryPlan::Search(search) = query.compile(QueryBackend::Search).unwrap() else {
//!     unreachable!()
//! };
//! assert_eq!(search.to_string(), "CITY = (Paris)");
//! ```

/// Wire filters and value coercion
pub mod filter;

/// Plan lowering
pub mod compiler;

pub use compiler::{ConferenceQuery, QueryPlan, listing_query};
pub use filter::{ConferenceQueryForm, Filter, FilterError, FilterForm, FilterValue};
