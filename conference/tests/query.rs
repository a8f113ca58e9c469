//! Filtered and unfiltered conference queries.

#![allow(clippy::unwrap_used)] // Tests can unwrap
#![allow(clippy::expect_used)] // Tests can expect

mod common;

use common::{Harness, attendee, conference_form, dotgo, organizer};
use conference_central::config::QueryBackend;
use conference_central::sync::LISTING_CACHE_KEY;
use conference_central::{
    Conference, ConferenceForm, ConferenceQueryForm, Config, ErrorKind, FilterForm, ServiceError,
};

fn names(conferences: &[Conference]) -> Vec<&str> {
    conferences.iter().map(|c| c.name.as_str()).collect()
}

fn query(filters: Vec<FilterForm>) -> ConferenceQueryForm {
    ConferenceQueryForm::new(filters)
}

async fn seed(h: &Harness) {
    h.create(dotgo()).await;
    h.create(ConferenceForm {
        topics: vec!["Rust".into()],
        ..conference_form("RustConf", "Portland", 500, "2016-09-09")
    })
    .await;
    h.create(ConferenceForm {
        topics: vec!["Python".into()],
        ..conference_form("PyCon", "Montreal", 3000, "2016-05-28")
    })
    .await;
}

#[tokio::test]
async fn city_filter_finds_the_paris_conference() {
    let h = Harness::new();
    seed(&h).await;

    let paris = h
        .api
        .query_conferences(&query(vec![FilterForm::new("City", "=", "Paris")]))
        .await
        .unwrap();
    assert_eq!(names(&paris), ["dotGo"]);
    assert_eq!(paris[0].seats_available, 1);
    assert_eq!(paris[0].topics, ["Go", "Systems"]);

    let london = h
        .api
        .query_conferences(&query(vec![FilterForm::new("CITY", "EQ", "London")]))
        .await
        .unwrap();
    assert!(london.is_empty());
}

#[tokio::test]
async fn two_inequality_fields_are_rejected_before_running() {
    let h = Harness::new();
    seed(&h).await;

    let err = h
        .api
        .query_conferences(&query(vec![
            FilterForm::new("month", ">", 3),
            FilterForm::new("maxAttendees", "<", 10),
        ]))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(err.to_string().contains("only one inequality filter"), "{err}");
}

#[tokio::test]
async fn range_on_one_field_is_accepted() {
    let h = Harness::new();
    seed(&h).await;

    let autumn = h
        .api
        .query_conferences(&query(vec![
            FilterForm::new("startDate", ">=", "2016-09-01"),
            FilterForm::new("START_DATE", "<=", "2016-12-31"),
            FilterForm::new("maxAttendees", "=", 500),
        ]))
        .await
        .unwrap();
    assert_eq!(names(&autumn), ["RustConf"]);
}

#[tokio::test]
async fn search_results_are_ordered_by_start_date() {
    let h = Harness::new();
    seed(&h).await;

    let busy = h
        .api
        .query_conferences(&query(vec![FilterForm::new("month", ">=", 5)]))
        .await
        .unwrap();
    assert_eq!(names(&busy), ["PyCon", "RustConf", "dotGo"]);

    let elsewhere = h
        .api
        .query_conferences(&query(vec![FilterForm::new("city", "!=", "Paris")]))
        .await
        .unwrap();
    assert_eq!(names(&elsewhere), ["PyCon", "RustConf"]);
}

#[tokio::test]
async fn malformed_filters_are_validation_errors() {
    let h = Harness::new();
    for form in [
        FilterForm::new("venue", "=", "Paris"),
        FilterForm::new("city", "~", "Paris"),
        FilterForm::new("month", "=", "October"),
        FilterForm::new("startDate", ">", "yesterday"),
        FilterForm::new("city", "=", "!!!"),
    ] {
        let err = h.api.query_conferences(&query(vec![form])).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation, "{err}");
    }
}

#[tokio::test]
async fn key_filter_selects_one_conference() {
    let h = Harness::new();
    seed(&h).await;
    let key = h.create(conference_form("GopherCon", "Denver", 1500, "2016-07-11")).await;

    let found = h
        .api
        .query_conferences(&query(vec![FilterForm::new("websafeKey", "=", key.as_str())]))
        .await
        .unwrap();
    assert_eq!(names(&found), ["GopherCon"]);
}

#[tokio::test]
async fn store_backend_answers_filtered_queries() {
    let mut config = Config::for_tests();
    config.query.filtered_backend = QueryBackend::Store;
    let h = Harness::with_config(&config);
    seed(&h).await;
    let key = h.create(conference_form("GopherCon", "Denver", 1500, "2016-07-11")).await;

    let large = h
        .api
        .query_conferences(&query(vec![FilterForm::new("maxAttendees", ">", 100)]))
        .await
        .unwrap();
    assert_eq!(names(&large), ["RustConf", "GopherCon", "PyCon"]);

    let go = h
        .api
        .query_conferences(&query(vec![FilterForm::new("topic", "=", "Go")]))
        .await
        .unwrap();
    assert_eq!(names(&go), ["dotGo"]);

    let by_key = h
        .api
        .query_conferences(&query(vec![FilterForm::new("websafeKey", "=", key.as_str())]))
        .await
        .unwrap();
    assert_eq!(names(&by_key), ["GopherCon"]);

    let err = h
        .api
        .query_conferences(&query(vec![
            FilterForm::new("month", ">", 3),
            FilterForm::new("seatsAvailable", "<", 10),
        ]))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn unfiltered_listing_is_cached_and_refreshed() {
    let h = Harness::new();
    seed(&h).await;

    let listing = h
        .api
        .query_conferences(&ConferenceQueryForm::default())
        .await
        .unwrap();
    assert_eq!(names(&listing), ["PyCon", "RustConf", "dotGo"]);
    assert!(h.cache.contains_key(LISTING_CACHE_KEY));

    let again = h
        .api
        .query_conferences(&ConferenceQueryForm::default())
        .await
        .unwrap();
    assert_eq!(again, listing);

    let dotgo_key = listing[2].key.encode();
    h.api.register(Some(&attendee(1)), &dotgo_key).await.unwrap();
    assert!(!h.cache.contains_key(LISTING_CACHE_KEY));

    let fresh = h
        .api
        .query_conferences(&ConferenceQueryForm::default())
        .await
        .unwrap();
    assert_eq!(fresh[2].seats_available, 0);
}

#[tokio::test]
async fn conferences_created_lists_only_the_callers_by_name() {
    let h = Harness::new();
    seed(&h).await;
    let other = attendee(7);
    h.api
        .create_conference(Some(&other), &conference_form("Strange Loop", "St. Louis", 1000, "2016-09-15"))
        .await
        .unwrap();

    let mine = h.api.conferences_created(Some(&organizer())).await.unwrap();
    assert_eq!(names(&mine), ["PyCon", "RustConf", "dotGo"]);
    assert!(mine.iter().all(|c| c.organizer_display_name == "organizer@example.com"));

    let theirs = h.api.conferences_created(Some(&other)).await.unwrap();
    assert_eq!(names(&theirs), ["Strange Loop"]);

    assert_eq!(
        h.api.conferences_created(None).await.unwrap_err(),
        ServiceError::Unauthorized
    );
}

#[tokio::test]
async fn get_conference_distinguishes_malformed_from_missing() {
    let h = Harness::new();
    let key = h.create(dotgo()).await;

    let conference = h.api.get_conference(&key).await.unwrap();
    assert_eq!(conference.name, "dotGo");
    assert_eq!(conference.month, 10);

    let malformed = h.api.get_conference("%%%").await.unwrap_err();
    assert_eq!(malformed.kind(), ErrorKind::Validation);

    let profile_key = organizer().profile_key().encode();
    let wrong_kind = h.api.get_conference(&profile_key).await.unwrap_err();
    assert_eq!(wrong_kind.kind(), ErrorKind::NotFound);
}
