//! Search projection of a conference.
//!
//! Document fields reuse the stored column names from [`crate::schema`].
//! Topics are flattened into one space-joined text field; counters are
//! numbers; the key is an atom so it only matches exactly.

use crate::schema::{
    CITY, DESCRIPTION, END_DATE, KEY, MAX_ATTENDEES, MONTH, NAME, ORGANIZER, SEATS_AVAILABLE,
    START_DATE, TOPIC,
};
use crate::types::Conference;
use conference_central_core::Key;
use conference_central_core::search::{Document, FieldValue, SearchError};

/// Build the search document for a conference.
#[must_use]
pub fn conference_document(conference: &Conference) -> Document {
    let mut document = Document::new()
        .field(KEY, FieldValue::Atom(conference.key.encode()))
        .field(NAME, FieldValue::Text(conference.name.clone()))
        .field(DESCRIPTION, FieldValue::Text(conference.description.clone()))
        .field(
            ORGANIZER,
            FieldValue::Text(conference.organizer_display_name.clone()),
        )
        .field(TOPIC, FieldValue::Text(conference.topics.join(" ")))
        .field(CITY, FieldValue::Text(conference.city.clone()))
        .field(MONTH, FieldValue::Number(i64::from(conference.month)))
        .field(
            MAX_ATTENDEES,
            FieldValue::Number(i64::from(conference.max_attendees)),
        )
        .field(
            SEATS_AVAILABLE,
            FieldValue::Number(i64::from(conference.seats_available)),
        );
    if let Some(start) = conference.start_date {
        document = document.field(START_DATE, FieldValue::Date(start));
    }
    if let Some(end) = conference.end_date {
        document = document.field(END_DATE, FieldValue::Date(end));
    }
    document
}

/// Rebuild a conference from its search document.
///
/// Topics come back split on whitespace, so multi-word topics lose their
/// grouping; callers that need exact topics read the record store.
///
/// # Errors
///
/// Returns [`SearchError::InvalidDocument`] if a field is missing, mistyped,
/// or the key does not decode.
pub fn conference_from_document(document: &Document) -> Result<Conference, SearchError> {
    let key = match document.get(KEY) {
        Some(FieldValue::Atom(encoded)) => {
            Key::decode(encoded).map_err(|err| SearchError::InvalidDocument(err.to_string()))?
        }
        _ => return Err(missing(KEY)),
    };

    Ok(Conference {
        key,
        name: text(document, NAME)?,
        description: text(document, DESCRIPTION)?,
        organizer_display_name: text(document, ORGANIZER)?,
        topics: text(document, TOPIC)?
            .split_whitespace()
            .map(str::to_string)
            .collect(),
        city: text(document, CITY)?,
        start_date: date(document, START_DATE)?,
        end_date: date(document, END_DATE)?,
        month: number(document, MONTH)?,
        max_attendees: number(document, MAX_ATTENDEES)?,
        seats_available: number(document, SEATS_AVAILABLE)?,
    })
}

/// Document id of a conference: its encoded key.
#[must_use]
pub fn document_id(key: &Key) -> String {
    key.encode()
}

fn missing(field: &str) -> SearchError {
    SearchError::InvalidDocument(format!("missing or mistyped field {field}"))
}

fn text(document: &Document, field: &str) -> Result<String, SearchError> {
    match document.get(field) {
        Some(FieldValue::Text(s) | FieldValue::Atom(s)) => Ok(s.clone()),
        None => Ok(String::new()),
        Some(_) => Err(missing(field)),
    }
}

fn number(document: &Document, field: &str) -> Result<u32, SearchError> {
    match document.get(field) {
        Some(FieldValue::Number(n)) => u32::try_from(*n).map_err(|_| missing(field)),
        _ => Err(missing(field)),
    }
}

fn date(
    document: &Document,
    field: &str,
) -> Result<Option<chrono::DateTime<chrono::Utc>>, SearchError> {
    match document.get(field) {
        Some(FieldValue::Date(d)) => Ok(Some(*d)),
        None => Ok(None),
        Some(_) => Err(missing(field)),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::{CONFERENCE_KIND, PROFILE_KIND};
    use chrono::{TimeZone, Utc};

    fn conference() -> Conference {
        Conference {
            key: Key::with_id(CONFERENCE_KIND, 3).with_parent(Key::named(PROFILE_KIND, "u")),
            name: "dotGo".into(),
            description: "Go in Paris".into(),
            organizer_display_name: "Ada".into(),
            topics: vec!["Go".into(), "Systems".into()],
            city: "Paris".into(),
            start_date: Some(Utc.with_ymd_and_hms(2016, 10, 10, 0, 0, 0).unwrap()),
            end_date: None,
            month: 10,
            max_attendees: 1,
            seats_available: 1,
        }
    }

    #[test]
    fn test_document_round_trip_for_single_word_topics() {
        let document = conference_document(&conference());
        assert_eq!(
            document.get(TOPIC),
            Some(&FieldValue::Text("Go Systems".into()))
        );
        assert_eq!(conference_from_document(&document).unwrap(), conference());
    }

    #[test]
    fn test_document_without_key_is_invalid() {
        let document = Document::new().field(NAME, FieldValue::Text("x".into()));
        assert!(matches!(
            conference_from_document(&document),
            Err(SearchError::InvalidDocument(_))
        ));
    }
}
