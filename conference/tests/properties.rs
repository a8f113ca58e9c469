//! Property tests for query compilation and seat accounting.

#![allow(clippy::unwrap_used)] // Tests can unwrap
#![allow(clippy::expect_used)] // Tests can expect

mod common;

use common::{Harness, attendee, conference_form};
use conference_central::config::QueryBackend;
use conference_central::query::{ConferenceQuery, FilterError};
use conference_central::{ConferenceQueryForm, ErrorKind, FilterForm};
use proptest::prelude::*;
use std::collections::{BTreeSet, HashSet};

const FIELDS: [&str; 3] = ["month", "maxAttendees", "seatsAvailable"];
const OPERATORS: [&str; 6] = ["=", "<", "<=", ">", ">=", "!="];

fn filter() -> impl Strategy<Value = (usize, usize, i64)> {
    (0..FIELDS.len(), 0..OPERATORS.len(), 0_i64..2000)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn compiles_iff_inequalities_share_one_field(
        filters in prop::collection::vec(filter(), 0..6)
    ) {
        let inequality_fields: HashSet<usize> = filters
            .iter()
            .filter(|(_, op, _)| OPERATORS[*op] != "=")
            .map(|(field, _, _)| *field)
            .collect();
        let form = ConferenceQueryForm::new(
            filters
                .iter()
                .map(|(field, op, value)| FilterForm::new(FIELDS[*field], OPERATORS[*op], *value))
                .collect(),
        );

        match ConferenceQuery::parse(&form) {
            Ok(query) => {
                prop_assert!(inequality_fields.len() <= 1);
                prop_assert_eq!(query.inequality_field().is_some(), inequality_fields.len() == 1);
                prop_assert!(query.compile(QueryBackend::Search).is_ok());
                prop_assert!(query.compile(QueryBackend::Store).is_ok());
            }
            Err(err) => {
                prop_assert!(inequality_fields.len() > 1);
                let is_multiple = matches!(err, FilterError::MultipleInequalities { .. });
                prop_assert!(is_multiple, "unexpected {}", err);
            }
        }
    }
}

#[derive(Clone, Copy, Debug)]
enum Step {
    Register(usize),
    Cancel(usize),
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        (0_usize..5).prop_map(Step::Register),
        (0_usize..5).prop_map(Step::Cancel),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn seat_accounting_matches_a_simple_model(
        capacity in 1_u32..4,
        steps in prop::collection::vec(step(), 1..20)
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let h = Harness::new();
            let key = h.create(conference_form("PropConf", "Lyon", capacity, "2016-06-01")).await;
            let mut registered = BTreeSet::new();

            for step in steps {
                match step {
                    Step::Register(n) => {
                        let outcome = h.api.register(Some(&attendee(n)), &key).await;
                        let seats_left = usize::try_from(capacity).unwrap() > registered.len();
                        if !registered.contains(&n) && seats_left {
                            prop_assert!(outcome.is_ok(), "{:?}", outcome);
                            registered.insert(n);
                        } else {
                            prop_assert_eq!(outcome.unwrap_err().kind(), ErrorKind::Conflict);
                        }
                    }
                    Step::Cancel(n) => {
                        let outcome = h.api.cancel(Some(&attendee(n)), &key).await;
                        if registered.remove(&n) {
                            prop_assert!(outcome.is_ok(), "{:?}", outcome);
                        } else {
                            prop_assert_eq!(outcome.unwrap_err().kind(), ErrorKind::Conflict);
                        }
                    }
                }

                let conference = h.api.get_conference(&key).await.unwrap();
                prop_assert_eq!(
                    usize::try_from(conference.seats_taken()).unwrap(),
                    registered.len()
                );
                prop_assert!(conference.seats_available <= capacity);
            }
            Ok::<(), TestCaseError>(())
        })?;
    }
}
